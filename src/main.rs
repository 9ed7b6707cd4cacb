//! slircd-link daemon entry point.

use slircd_link::config::validation;
use slircd_link::{Config, Daemon, MemoryStore, NetClock, telemetry};
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.toml".to_string());

    let config = Config::load(&config_path)?;
    telemetry::init(config.logging.format);

    if let Err(errors) = validation::validate(&config) {
        for e in &errors {
            error!(path = %config_path, error = %e, "invalid configuration");
        }
        anyhow::bail!("{} configuration error(s) in {config_path}", errors.len());
    }

    info!(
        server = %config.server.name,
        links = config.links.len(),
        listeners = config.listen.len(),
        "Starting slircd-link"
    );

    let store = MemoryStore::new(config.server.name.clone());
    let daemon = Daemon::bind(config, store, NetClock::system())
        .await?
        .with_config_path(&config_path);
    let handle = daemon.handle();

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, shutting down");
            handle.shutdown().await;
        }
    });

    daemon.run().await
}
