//! The event loop.
//!
//! Everything that touches link state runs here, one event at a time:
//! accepted sockets, outbound connect results, lines from peers, closures,
//! control requests and the one-second tick. Sockets live in their own
//! tasks and only exchange messages with this loop, so the `SyncManager`
//! needs no locking.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};
use tokio::time::MissedTickBehavior;
use tokio_rustls::TlsAcceptor;
use tracing::{error, info, warn};

use crate::clock::NetClock;
use crate::config::{Config, TransportHook, validation};
use crate::error::{LinkError, TransportError};
use crate::store::EntityStore;
use crate::sync::{Action, ConnId, LinkState, SyncManager};

use super::connector::{self, DnsResolver, Resolve};
use super::peer::{self, LinkEvent, Outbound, Writer};
use super::stream::LinkStream;
use super::throttle::AcceptThrottle;
use super::tls;

/// Requests from outside the loop.
pub enum Control<S: EntityStore> {
    /// Start an outbound attempt to a configured link.
    Connect(String),
    /// Reload the configuration file.
    Rehash,
    /// Run a closure against the manager, e.g. to report a local event.
    Apply(Box<dyn FnOnce(&mut SyncManager<S>) + Send>),
    Snapshot(oneshot::Sender<Snapshot>),
    Shutdown,
}

/// Point-in-time view of the network, for tooling and tests.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    /// Every server with its distance from us, tree order.
    pub servers: Vec<(String, usize)>,
    pub users: Vec<String>,
    pub channels: Vec<String>,
    pub clock: i64,
}

/// Cloneable sender for [`Control`] requests.
pub struct DaemonHandle<S: EntityStore> {
    tx: mpsc::Sender<Control<S>>,
}

impl<S: EntityStore> Clone for DaemonHandle<S> {
    fn clone(&self) -> Self {
        Self { tx: self.tx.clone() }
    }
}

impl<S: EntityStore> DaemonHandle<S> {
    pub async fn send(&self, control: Control<S>) -> bool {
        self.tx.send(control).await.is_ok()
    }

    pub async fn connect(&self, name: &str) -> bool {
        self.send(Control::Connect(name.to_string())).await
    }

    pub async fn apply<F>(&self, f: F) -> bool
    where
        F: FnOnce(&mut SyncManager<S>) + Send + 'static,
    {
        self.send(Control::Apply(Box::new(f))).await
    }

    pub async fn snapshot(&self) -> Option<Snapshot> {
        let (tx, rx) = oneshot::channel();
        if !self.send(Control::Snapshot(tx)).await {
            return None;
        }
        rx.await.ok()
    }

    pub async fn shutdown(&self) -> bool {
        self.send(Control::Shutdown).await
    }
}

/// Sockets arriving from listener and connector tasks.
enum Incoming {
    Accepted { stream: LinkStream, addr: SocketAddr },
    Outbound {
        conn: ConnId,
        result: Result<(LinkStream, SocketAddr), TransportError>,
    },
}

struct BoundListener {
    listener: TcpListener,
    acceptor: Option<TlsAcceptor>,
}

pub struct Daemon<S: EntityStore> {
    manager: SyncManager<S>,
    config_path: Option<PathBuf>,
    listeners: Vec<BoundListener>,
    resolver: Arc<dyn Resolve>,
    throttle: Arc<AcceptThrottle>,
    control_tx: mpsc::Sender<Control<S>>,
    control_rx: mpsc::Receiver<Control<S>>,
    writers: HashMap<ConnId, Writer>,
}

impl<S: EntityStore + Send + 'static> Daemon<S> {
    /// Bind every configured listener.
    pub async fn bind(config: Config, store: S, clock: NetClock) -> anyhow::Result<Self> {
        let acceptor = match &config.tls {
            Some(tls_config) if config.listen.iter().any(|l| l.transport == Some(TransportHook::Tls)) => {
                Some(tls::load_acceptor(tls_config)?)
            }
            _ => None,
        };

        let mut listeners = Vec::new();
        for listen in &config.listen {
            let listener = TcpListener::bind(listen.address).await?;
            let acceptor = match listen.transport {
                Some(TransportHook::Tls) => match &acceptor {
                    Some(acceptor) => Some(acceptor.clone()),
                    None => anyhow::bail!("listener {} needs a [tls] section", listen.address),
                },
                None => None,
            };
            info!(address = %listener.local_addr()?, tls = acceptor.is_some(), "link listener bound");
            listeners.push(BoundListener { listener, acceptor });
        }

        let (control_tx, control_rx) = mpsc::channel(64);
        Ok(Self {
            manager: SyncManager::new(config, store, clock),
            config_path: None,
            listeners,
            resolver: Arc::new(DnsResolver::new()),
            throttle: Arc::new(AcceptThrottle::default()),
            control_tx,
            control_rx,
            writers: HashMap::new(),
        })
    }

    /// File to read on `REHASH`.
    pub fn with_config_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_path = Some(path.into());
        self
    }

    pub fn with_resolver(mut self, resolver: Arc<dyn Resolve>) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn manager_mut(&mut self) -> &mut SyncManager<S> {
        &mut self.manager
    }

    /// Addresses actually bound, in configuration order.
    pub fn local_addrs(&self) -> Vec<SocketAddr> {
        self.listeners
            .iter()
            .filter_map(|l| l.listener.local_addr().ok())
            .collect()
    }

    pub fn handle(&self) -> DaemonHandle<S> {
        DaemonHandle {
            tx: self.control_tx.clone(),
        }
    }

    /// Run until [`Control::Shutdown`].
    pub async fn run(mut self) -> anyhow::Result<()> {
        let (incoming_tx, mut incoming) = mpsc::channel::<Incoming>(64);
        let (link_tx, mut link_events) = mpsc::channel::<LinkEvent>(1024);

        for bound in std::mem::take(&mut self.listeners) {
            let addr = bound.listener.local_addr()?;
            self.manager.register_listener(addr);
            tokio::spawn(accept_loop(bound, Arc::clone(&self.throttle), incoming_tx.clone()));
        }

        let mut tick = tokio::time::interval(Duration::from_secs(1));
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(server = %self.manager.server_name(), "link daemon running");

        loop {
            tokio::select! {
                Some(event) = link_events.recv() => self.on_link_event(event),
                Some(incoming) = incoming.recv() => self.on_incoming(incoming, &link_tx),
                Some(control) = self.control_rx.recv() => {
                    if !self.on_control(control) {
                        break;
                    }
                }
                _ = tick.tick() => self.manager.tick(),
            }
            self.flush(&incoming_tx);
        }

        self.shutdown();
        info!("link daemon stopped");
        Ok(())
    }

    fn on_link_event(&mut self, event: LinkEvent) {
        match event {
            LinkEvent::Line { conn, line } => self.manager.handle_line(conn, &line),
            LinkEvent::Violation { conn, reason } => self.manager.close_link(conn, LinkError::Protocol(reason)),
            LinkEvent::Closed { conn, reason } => {
                self.writers.remove(&conn);
                self.manager.closed(conn, &reason);
            }
        }
    }

    fn on_incoming(&mut self, incoming: Incoming, link_tx: &mpsc::Sender<LinkEvent>) {
        let max_line = self.manager.config().limits.max_line;
        match incoming {
            Incoming::Accepted { stream, addr } => {
                if let Some(conn) = self.manager.accept(addr) {
                    let writer = peer::spawn(conn, stream, addr.to_string(), max_line, link_tx.clone());
                    self.writers.insert(conn, writer);
                }
            }
            Incoming::Outbound { conn, result } => match result {
                Ok((stream, addr)) => {
                    // The attempt may have timed out or been abandoned meanwhile.
                    if self
                        .manager
                        .connection(conn)
                        .is_none_or(|c| c.state != LinkState::Connecting)
                    {
                        return;
                    }
                    let writer = peer::spawn(conn, stream, addr.to_string(), max_line, link_tx.clone());
                    self.writers.insert(conn, writer);
                    self.manager.transport_ready(conn, Some(addr));
                }
                Err(e) => self.manager.connect_failed(conn, &e.to_string()),
            },
        }
    }

    /// Returns false when the loop should stop.
    fn on_control(&mut self, control: Control<S>) -> bool {
        match control {
            Control::Connect(name) => {
                if let Err(e) = self.manager.connect(&name) {
                    warn!(link = %name, error = %e, "connect request refused");
                }
            }
            Control::Rehash => self.rehash(),
            Control::Apply(f) => f(&mut self.manager),
            Control::Snapshot(reply) => {
                let _ = reply.send(self.snapshot());
            }
            Control::Shutdown => return false,
        }
        true
    }

    fn snapshot(&self) -> Snapshot {
        let topology = self.manager.topology();
        Snapshot {
            servers: topology
                .walk()
                .into_iter()
                .filter_map(|(id, depth)| topology.get(id).map(|n| (n.name.clone(), depth)))
                .collect(),
            users: self.manager.store().users().iter().map(|u| u.nick.clone()).collect(),
            channels: self.manager.store().channels().iter().map(|c| c.name.clone()).collect(),
            clock: self.manager.now(),
        }
    }

    fn rehash(&mut self) {
        let Some(path) = self.config_path.clone() else {
            warn!("rehash requested but no configuration file is known");
            return;
        };
        let config = match Config::load(&path) {
            Ok(config) => config,
            Err(e) => {
                error!(path = %path.display(), error = %e, "rehash failed");
                return;
            }
        };
        if let Err(errors) = validation::validate(&config) {
            for e in errors {
                error!(error = %e, "rehash rejected");
            }
            return;
        }
        self.manager.reload(config);
    }

    /// Perform every action the manager queued.
    fn flush(&mut self, incoming_tx: &mpsc::Sender<Incoming>) {
        loop {
            let actions = self.manager.take_actions();
            if actions.is_empty() {
                return;
            }
            for action in actions {
                match action {
                    Action::Send { conn, line } => {
                        if let Some(writer) = self.writers.get(&conn) {
                            let _ = writer.send(Outbound::Line(line));
                        }
                    }
                    Action::Close { conn } => {
                        if let Some(writer) = self.writers.remove(&conn) {
                            let _ = writer.send(Outbound::Close);
                        }
                    }
                    Action::Connect { conn, link } => {
                        let resolver = Arc::clone(&self.resolver);
                        let tx = incoming_tx.clone();
                        tokio::spawn(async move {
                            let result = connector::connect(&link, resolver.as_ref()).await;
                            let _ = tx.send(Incoming::Outbound { conn, result }).await;
                        });
                    }
                    // Runs after this batch; reload may queue more actions.
                    Action::Rehash => self.rehash(),
                }
            }
        }
    }

    fn shutdown(&mut self) {
        for (_, writer) in self.writers.drain() {
            let _ = writer.send(Outbound::Line("ERROR :Server shutting down".into()));
            let _ = writer.send(Outbound::Close);
        }
    }
}

async fn accept_loop(bound: BoundListener, throttle: Arc<AcceptThrottle>, tx: mpsc::Sender<Incoming>) {
    loop {
        let (tcp, addr) = match bound.listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                error!(error = %e, "accept failed");
                continue;
            }
        };
        if !throttle.check(addr.ip()) {
            warn!(%addr, "inbound link rate limit exceeded, rejecting");
            continue;
        }
        let Some(acceptor) = bound.acceptor.clone() else {
            if tx.send(Incoming::Accepted { stream: LinkStream::Plain(tcp), addr }).await.is_err() {
                return;
            }
            continue;
        };
        let tx = tx.clone();
        tokio::spawn(async move {
            match tls::accept(&acceptor, tcp).await {
                Ok(stream) => {
                    let _ = tx.send(Incoming::Accepted { stream, addr }).await;
                }
                Err(e) => warn!(%addr, error = %e, "inbound TLS handshake failed"),
            }
        });
    }
}
