//! Outbound link attempts.
//!
//! Resolution runs on the resolver's own tasks, so a slow DNS server only
//! delays the attempt that needs it. The whole attempt (lookup, connect
//! and any transport hook) shares the link block's timeout.

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use async_trait::async_trait;
use hickory_resolver::TokioResolver;
use hickory_resolver::config::ResolverConfig;
use hickory_resolver::name_server::TokioConnectionProvider;
use tokio::net::{TcpSocket, TcpStream};
use tracing::{Instrument, debug};

use crate::config::LinkBlock;
use crate::error::TransportError;
use crate::telemetry::spans;

use super::stream::LinkStream;
use super::tls;

/// Name lookup for link hostnames.
#[async_trait]
pub trait Resolve: Send + Sync {
    async fn resolve(&self, host: &str) -> Result<Vec<IpAddr>, TransportError>;
}

/// System DNS through hickory.
#[derive(Clone)]
pub struct DnsResolver {
    inner: TokioResolver,
}

impl DnsResolver {
    pub fn new() -> Self {
        let inner = TokioResolver::builder_tokio()
            .map(|b| b.build())
            .unwrap_or_else(|_| {
                TokioResolver::builder_with_config(ResolverConfig::default(), TokioConnectionProvider::default())
                    .build()
            });
        Self { inner }
    }
}

impl Default for DnsResolver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Resolve for DnsResolver {
    async fn resolve(&self, host: &str) -> Result<Vec<IpAddr>, TransportError> {
        let lookup = self
            .inner
            .lookup_ip(host)
            .await
            .map_err(|e| TransportError::Resolve(e.to_string()))?;
        Ok(lookup.iter().collect())
    }
}

/// Connect to `block`, applying its transport hook.
pub async fn connect(block: &LinkBlock, resolver: &dyn Resolve) -> Result<(LinkStream, SocketAddr), TransportError> {
    let attempt = async {
        let ip = match block.hostname.parse::<IpAddr>() {
            Ok(ip) => ip,
            Err(_) => pick_address(resolver.resolve(&block.hostname).await?, block.bind)
                .ok_or_else(|| TransportError::Resolve(format!("no addresses for {}", block.hostname)))?,
        };
        let addr = SocketAddr::new(ip, block.port);
        debug!(addr = %addr, "connecting");
        let tcp = open(addr, block.bind).await?;
        let stream = if block.uses_tls() {
            tls::upgrade(tcp, block).await?
        } else {
            LinkStream::Plain(tcp)
        };
        Ok::<_, TransportError>((stream, addr))
    };
    let limit = Duration::from_secs(block.timeout.max(1));
    tokio::time::timeout(limit, attempt.instrument(spans::connect(&block.name)))
        .await
        .map_err(|_| TransportError::Timeout)?
}

/// Prefer an address of the same family as the bind address.
fn pick_address(addrs: Vec<IpAddr>, bind: Option<IpAddr>) -> Option<IpAddr> {
    match bind {
        Some(bind) => addrs
            .iter()
            .copied()
            .find(|a| a.is_ipv4() == bind.is_ipv4())
            .or_else(|| addrs.first().copied()),
        None => addrs.first().copied(),
    }
}

async fn open(addr: SocketAddr, bind: Option<IpAddr>) -> Result<TcpStream, TransportError> {
    let Some(bind) = bind else {
        return Ok(TcpStream::connect(addr).await?);
    };
    let socket = if addr.is_ipv4() {
        TcpSocket::new_v4()?
    } else {
        TcpSocket::new_v6()?
    };
    socket.bind(SocketAddr::new(bind, 0))?;
    Ok(socket.connect(addr).await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    struct Fixed(Vec<IpAddr>);

    #[async_trait]
    impl Resolve for Fixed {
        async fn resolve(&self, host: &str) -> Result<Vec<IpAddr>, TransportError> {
            if self.0.is_empty() {
                return Err(TransportError::Resolve(format!("{host}: NXDOMAIN")));
            }
            Ok(self.0.clone())
        }
    }

    fn block(hostname: &str, port: u16) -> LinkBlock {
        toml::from_str(&format!(
            r#"
            name = "leaf.example.net"
            hostname = "{hostname}"
            port = {port}
            send_password = "out"
            recv_password = "in"
            timeout = 2
            "#
        ))
        .unwrap()
    }

    #[tokio::test]
    async fn connects_through_resolver() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let resolver = Fixed(vec!["127.0.0.1".parse().unwrap()]);

        let (stream, addr) = connect(&block("leaf.example.net", port), &resolver).await.unwrap();
        assert!(!stream.is_tls());
        assert_eq!(addr.port(), port);
        assert!(listener.accept().await.is_ok());
    }

    #[tokio::test]
    async fn literal_address_skips_lookup() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let resolver = Fixed(Vec::new());
        assert!(connect(&block("127.0.0.1", port), &resolver).await.is_ok());
    }

    #[tokio::test]
    async fn lookup_failure_is_reported() {
        let err = connect(&block("nowhere.invalid", 7000), &Fixed(Vec::new()))
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Resolve(_)));
    }

    #[test]
    fn bind_family_is_preferred() {
        let v6: IpAddr = "2001:db8::1".parse().unwrap();
        let v4: IpAddr = "192.0.2.1".parse().unwrap();
        assert_eq!(pick_address(vec![v6, v4], Some("0.0.0.0".parse().unwrap())), Some(v4));
        assert_eq!(pick_address(vec![v6, v4], None), Some(v6));
        assert_eq!(pick_address(Vec::new(), None), None);
    }
}
