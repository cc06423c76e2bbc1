//! locshare-relay binary entry point.
//!
//! Usage:
//! ```bash
//! locshare-relay --config relay.toml
//! ```

use locshare_relay::config::Config;
use locshare_relay::http::health::mark_started;
use locshare_relay::server::{self, LocationRelay};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let path = get_config_path();
    let config = if path.exists() {
        Config::from_file(&path)?
    } else {
        warn!(path = %path.display(), "config file not found, using defaults");
        Config::default()
    };

    mark_started();
    info!(version = env!("CARGO_PKG_VERSION"), "starting locshare-relay");

    let relay = Arc::new(LocationRelay::new(config)?);
    server::run(relay).await?;
    Ok(())
}

fn get_config_path() -> PathBuf {
    std::env::args()
        .skip_while(|arg| arg != "--config")
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("relay.toml"))
}
