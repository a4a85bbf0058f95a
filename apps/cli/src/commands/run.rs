//! `hurricane run`: serve until interrupted.

use anyhow::Context;
use hurricane_orchestrator::Orchestrator;
use tracing::info;

/// Starts monitoring and waits for Ctrl-C. The caller shuts down afterwards.
pub async fn execute(orchestrator: &Orchestrator) -> anyhow::Result<()> {
    orchestrator.start_monitoring().await.context("failed to start monitoring")?;
    info!(root = %orchestrator.root().display(), "Hurricane running, press Ctrl-C to stop");

    tokio::signal::ctrl_c().await.context("failed to listen for Ctrl-C")?;
    info!("Interrupt received, shutting down");
    Ok(())
}
