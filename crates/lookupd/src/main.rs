use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use lookupd::{AppState, Config, ServerHandle, router, shutdown_on, shutdown_signal};
use tracing_subscriber::EnvFilter;

/// HTTP lookup service for IP information and app store metadata.
#[derive(Debug, Parser)]
#[command(name = "lookupd", version, about)]
struct Cli {
    /// Configuration file. Defaults to `<LOOKUPD_ENV>.toml`, or
    /// `development.toml` when LOOKUPD_ENV is unset.
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let path = cli.config.unwrap_or_else(Config::default_path);
    let config = Config::load(&path).with_context(|| format!("loading {}", path.display()))?;

    let state = AppState::from_config(&config).context("building lookup handlers")?;
    let addr = config.listen_addr()?;
    let listener = lookupd_net::listener::bind(addr)
        .await
        .with_context(|| format!("listening on {addr}"))?;

    let mut server = ServerHandle::spawn(listener, router(state))?;
    tracing::info!(
        target: "lookupd",
        version = env!("CARGO_PKG_VERSION"),
        addr = %server.local_addr(),
        "serving"
    );

    shutdown_on(&mut server, shutdown_signal(), config.graceful_timeout()).await;
    Ok(())
}
