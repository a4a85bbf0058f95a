//! `hurricane notifications`.

use hurricane_orchestrator::Orchestrator;

/// Lists unacknowledged notifications, or acknowledges one.
pub async fn execute(orchestrator: &Orchestrator, ack: Option<&str>) -> anyhow::Result<()> {
    if let Some(id) = ack {
        if orchestrator.acknowledge_notification(id).await {
            println!("acknowledged {}", id);
            return Ok(());
        }
        anyhow::bail!("no notification with id {}", id);
    }

    let pending = orchestrator.get_unacknowledged_notifications().await;
    if pending.is_empty() {
        println!("no unacknowledged notifications");
        return Ok(());
    }
    for n in pending {
        println!("{}  [{:?}] {}: {}", n.id, n.severity, n.title, n.message);
    }
    Ok(())
}
