//! The `tls` transport hook.
//!
//! Inbound: a listener configured with `transport = "tls"` wraps every
//! accepted socket with the certificate from `[tls]`. Outbound: a link block
//! with the hook is wrapped after connect, verifying the peer against the
//! system roots and/or a pinned SHA-256 fingerprint.

use std::io::{BufReader, Cursor};
use std::sync::Arc;

use rustls_pemfile::{certs, private_key};
use sha2::{Digest, Sha256};
use tokio::net::TcpStream;
use tokio_rustls::rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use tokio_rustls::rustls::crypto::{CryptoProvider, verify_tls12_signature, verify_tls13_signature};
use tokio_rustls::rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName, UnixTime};
use tokio_rustls::rustls::{ClientConfig, DigitallySignedStruct, RootCertStore, ServerConfig, SignatureScheme};
use tokio_rustls::{TlsAcceptor, TlsConnector};
use tracing::{info, warn};

use crate::config::{LinkBlock, TlsConfig};
use crate::error::TransportError;

use super::stream::LinkStream;

/// Build the acceptor for TLS listeners.
pub fn load_acceptor(config: &TlsConfig) -> anyhow::Result<TlsAcceptor> {
    let cert_file = std::fs::read(&config.cert_path)?;
    let chain: Vec<CertificateDer<'static>> =
        certs(&mut BufReader::new(Cursor::new(cert_file))).collect::<Result<_, _>>()?;
    if chain.is_empty() {
        anyhow::bail!("No certificates found in {}", config.cert_path);
    }

    let key_file = std::fs::read(&config.key_path)?;
    let key: PrivateKeyDer<'static> = private_key(&mut BufReader::new(Cursor::new(key_file)))?
        .ok_or_else(|| anyhow::anyhow!("No private key found in {}", config.key_path))?;

    let server = ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(chain, key)?;
    Ok(TlsAcceptor::from(Arc::new(server)))
}

/// Complete the server side of the handshake on an accepted socket.
pub async fn accept(acceptor: &TlsAcceptor, tcp: TcpStream) -> Result<LinkStream, TransportError> {
    let stream = acceptor
        .accept(tcp)
        .await
        .map_err(|e| TransportError::Tls(e.to_string()))?;
    Ok(LinkStream::TlsServer(Box::new(stream)))
}

/// Wrap an outbound socket for `block`.
pub async fn upgrade(tcp: TcpStream, block: &LinkBlock) -> Result<LinkStream, TransportError> {
    let config = if block.verify_cert {
        ClientConfig::builder()
            .with_root_certificates(native_roots())
            .with_no_client_auth()
    } else {
        ClientConfig::builder()
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(AcceptAnyCert::new()))
            .with_no_client_auth()
    };

    let server_name =
        ServerName::try_from(block.hostname.clone()).map_err(|e| TransportError::Tls(e.to_string()))?;
    let stream = TlsConnector::from(Arc::new(config))
        .connect(server_name, tcp)
        .await
        .map_err(|e| TransportError::Tls(e.to_string()))?;

    if let Some(expected) = &block.cert_fingerprint {
        let (_, session) = stream.get_ref();
        let actual = session
            .peer_certificates()
            .and_then(|chain| chain.first())
            .map(|cert| fingerprint(cert.as_ref()))
            .unwrap_or_default();
        if !fingerprint_matches(expected, &actual) {
            return Err(TransportError::Fingerprint {
                expected: expected.clone(),
                actual,
            });
        }
        info!(peer = %block.name, fingerprint = %actual, "certificate fingerprint verified");
    }
    info!(peer = %block.name, verify = block.verify_cert, "TLS established");
    Ok(LinkStream::TlsClient(Box::new(stream)))
}

fn native_roots() -> RootCertStore {
    let mut roots = RootCertStore::empty();
    let loaded = rustls_native_certs::load_native_certs();
    for cert in loaded.certs {
        if let Err(e) = roots.add(cert) {
            warn!(error = %e, "skipping unusable root certificate");
        }
    }
    for e in &loaded.errors {
        warn!(error = %e, "error loading native certificates");
    }
    roots
}

/// Colon-separated uppercase SHA-256 of a DER certificate.
pub fn fingerprint(der: &[u8]) -> String {
    Sha256::digest(der)
        .iter()
        .map(|b| format!("{b:02X}"))
        .collect::<Vec<_>>()
        .join(":")
}

/// Compare fingerprints ignoring case and separators.
pub fn fingerprint_matches(expected: &str, actual: &str) -> bool {
    let normalize = |s: &str| {
        s.chars()
            .filter(char::is_ascii_hexdigit)
            .map(|c| c.to_ascii_uppercase())
            .collect::<String>()
    };
    let expected = normalize(expected);
    !expected.is_empty() && expected == normalize(actual)
}

/// Certificate check used when `verify_cert = false`. Signatures are still
/// checked so the session is bound to the presented certificate, which is
/// what fingerprint pinning relies on.
#[derive(Debug)]
struct AcceptAnyCert {
    provider: Arc<CryptoProvider>,
}

impl AcceptAnyCert {
    fn new() -> Self {
        let provider = CryptoProvider::get_default()
            .cloned()
            .unwrap_or_else(|| Arc::new(tokio_rustls::rustls::crypto::aws_lc_rs::default_provider()));
        Self { provider }
    }
}

impl ServerCertVerifier for AcceptAnyCert {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, tokio_rustls::rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, tokio_rustls::rustls::Error> {
        verify_tls12_signature(message, cert, dss, &self.provider.signature_verification_algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, tokio_rustls::rustls::Error> {
        verify_tls13_signature(message, cert, dss, &self.provider.signature_verification_algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.provider.signature_verification_algorithms.supported_schemes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_is_colon_hex() {
        let fp = fingerprint(b"");
        assert_eq!(fp.len(), 32 * 3 - 1);
        assert!(fp.starts_with("E3:B0:C4:42"));
    }

    #[test]
    fn fingerprints_compare_loosely() {
        let actual = fingerprint(b"cert");
        let bare: String = actual.chars().filter(|c| *c != ':').collect();
        assert!(fingerprint_matches(&bare.to_lowercase(), &actual));
        assert!(fingerprint_matches(&actual, &actual));
        assert!(!fingerprint_matches("00:11", &actual));
        assert!(!fingerprint_matches("", &actual));
    }

    #[test]
    fn missing_certificate_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let config = TlsConfig {
            cert_path: dir.path().join("missing.pem").display().to_string(),
            key_path: dir.path().join("missing.key").display().to_string(),
        };
        assert!(load_acceptor(&config).is_err());
    }

    #[test]
    fn empty_certificate_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let cert = dir.path().join("cert.pem");
        std::fs::write(&cert, "").unwrap();
        let config = TlsConfig {
            cert_path: cert.display().to_string(),
            key_path: cert.display().to_string(),
        };
        let Err(err) = load_acceptor(&config) else {
            panic!("empty certificate file was accepted");
        };
        assert!(err.to_string().starts_with("No certificates found in"));
    }
}
