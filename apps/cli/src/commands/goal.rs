//! `hurricane goal`.

use anyhow::Context;
use chrono::{DateTime, Utc};
use hurricane_core::{GoalRequest, Priority};
use hurricane_orchestrator::Orchestrator;

/// Parses an RFC 3339 deadline.
fn parse_deadline(raw: &str) -> anyhow::Result<DateTime<Utc>> {
    let parsed = DateTime::parse_from_rfc3339(raw)
        .with_context(|| format!("invalid deadline '{}', expected RFC 3339", raw))?;
    Ok(parsed.with_timezone(&Utc))
}

/// Submits a goal and prints its id plus the suggested next task.
pub async fn execute(
    orchestrator: &Orchestrator,
    title: String,
    description: String,
    outcome: String,
    priority: &str,
    deadline: Option<&str>,
) -> anyhow::Result<()> {
    let priority: Priority = priority.parse().map_err(|e: String| anyhow::anyhow!(e))?;
    let mut request = GoalRequest::new(title, description, outcome).with_priority(priority);
    if let Some(raw) = deadline {
        request = request.with_deadline(parse_deadline(raw)?);
    }

    let goal_id = orchestrator.submit_goal(request).await?;
    println!("{}", goal_id);

    let tasks = orchestrator.get_tasks_for_goal(&goal_id).await;
    println!("{} task(s) planned", tasks.len());
    if let Some(next) = orchestrator.get_next_ready_task().await {
        println!("next: {} ({}) [{}]", next.title, next.role, next.id);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_deadline() {
        let deadline = parse_deadline("2026-12-01T17:00:00+02:00").unwrap();
        assert_eq!(deadline.to_rfc3339(), "2026-12-01T15:00:00+00:00");
        assert!(parse_deadline("next friday").is_err());
    }
}
