//! `hurricane status`.

use hurricane_orchestrator::Orchestrator;

/// Prints the status snapshot as pretty JSON.
pub async fn execute(orchestrator: &Orchestrator) -> anyhow::Result<()> {
    let snapshot = orchestrator.status().await;
    println!("{}", serde_json::to_string_pretty(&snapshot)?);
    Ok(())
}
