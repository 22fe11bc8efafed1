//! Coordinator entrypoint: opens the state store, builds the HTTP surface,
//! and serves until interrupted.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use spacesaver::api::{AppState, build_router};
use spacesaver::store::StateStore;

#[derive(Debug, Parser)]
#[command(name = "spacesaver-server", about = "Batch transcoding coordinator")]
struct Args {
    /// Address to bind.
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    /// Port to bind.
    #[arg(long, default_value_t = 8856)]
    port: u16,

    /// Path of the persisted state document.
    #[arg(long, default_value = "data/state.json")]
    state_path: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    let store = StateStore::open(&args.state_path)
        .with_context(|| format!("failed to open state store at {}", args.state_path.display()))?;
    let app = build_router(AppState::new(store));

    let listener = tokio::net::TcpListener::bind((args.host.as_str(), args.port))
        .await
        .with_context(|| format!("failed to bind {}:{}", args.host, args.port))?;
    info!("coordinator listening on http://{}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("shutting down");
    }
}
