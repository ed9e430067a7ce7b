//! Tracking server: accepts landmark producers over TCP, one session per connection.

use std::sync::Arc;

use anyhow::{Context, Result};
use rep_tracker::catalog::Catalog;
use rep_tracker::config::Config;
use rep_tracker::server;

const CONFIG_PATH: &str = "config.toml";

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Config::load_or_default(CONFIG_PATH);
    let listen_addr = std::env::args()
        .nth(1)
        .unwrap_or_else(|| config.server.listen_addr.clone());

    let catalog = match &config.catalog.path {
        Some(path) => Catalog::load(path).with_context(|| format!("failed to load catalog {}", path))?,
        None => Catalog::builtin(),
    };
    log::info!(
        "exercises: {}",
        catalog.names().collect::<Vec<_>>().join(", ")
    );

    server::run(&listen_addr, Arc::new(catalog)).await
}
