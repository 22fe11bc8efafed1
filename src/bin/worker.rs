//! Worker entrypoint: loads the worker config and runs the poll loop.

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use spacesaver::runner::{self, RunnerOptions};

#[derive(Debug, Parser)]
#[command(name = "spacesaver-worker", about = "Batch transcoding worker")]
struct Args {
    /// Path of the worker config file.
    #[arg(long, default_value = "config.json")]
    config: PathBuf,

    /// Coordinator base URL; overrides the config file.
    #[arg(long)]
    server: Option<String>,

    /// Exit after one idle poll; re-raise the first job failure.
    #[arg(long)]
    once: bool,

    /// Force-enable the read-only status UI.
    #[arg(long)]
    ui: bool,

    /// Disable the read-only status UI.
    #[arg(long, conflicts_with = "ui")]
    no_ui: bool,

    #[arg(long)]
    ui_host: Option<String>,

    #[arg(long)]
    ui_port: Option<u16>,
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let force_ui = if args.ui {
        Some(true)
    } else if args.no_ui {
        Some(false)
    } else {
        None
    };

    runner::run(RunnerOptions {
        config_path: args.config,
        server_url: args.server,
        once: args.once,
        force_ui,
        ui_host: args.ui_host,
        ui_port: args.ui_port,
    })
}
