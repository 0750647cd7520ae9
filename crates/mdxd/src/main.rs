//! mdxd - MDict dictionary server
//!
//! Discovers dictionaries under --dir, serves each on its own port, and
//! exposes the client shell on --port.

use anyhow::Result;
use clap::Parser;
use mdx_common::SourceArchiveOpener;
use mdxd::cli::Cli;
use mdxd::config::Config;
use mdxd::{logging, shutdown, Orchestrator, Settings};
use std::sync::Arc;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;
    logging::init(&config.log.level);

    info!("mdxd v{} starting", env!("CARGO_PKG_VERSION"));

    let settings = Settings::from_cli(&cli, &config)?;
    let mut orchestrator = Orchestrator::new(settings, Arc::new(SourceArchiveOpener));
    if let Err(e) = orchestrator.start().await {
        error!("Startup failed: {}", e);
        return Err(e.into());
    }
    info!("mdxd ready");

    shutdown::wait_for_termination().await;
    let watcher = tokio::spawn(shutdown::log_repeated_signals());
    orchestrator.shutdown().await;
    watcher.abort();

    Ok(())
}
