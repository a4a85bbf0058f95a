//! Read-only next-step suggestions.

use std::cmp::Ordering;

use crate::board::TaskBoard;
use crate::models::Task;

/// Dispatch order: highest priority, then oldest, then lowest sequence.
pub fn dispatch_order(a: &Task, b: &Task) -> Ordering {
    b.priority
        .cmp(&a.priority)
        .then_with(|| a.created_at.cmp(&b.created_at))
        .then_with(|| a.sequence.cmp(&b.sequence))
}

/// Up to `limit` planned, non-manual tasks with no unmet dependencies, best first.
///
/// Nothing on the board is changed.
pub fn suggest_next(board: &TaskBoard, limit: usize) -> Vec<&Task> {
    let mut ready: Vec<&Task> = board.ready_tasks().into_iter().filter(|t| !t.manual).collect();
    ready.sort_by(|a, b| dispatch_order(a, b));
    ready.truncate(limit);
    ready
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AgentRole, Priority, TaskStatus};

    #[test]
    fn test_priority_then_creation() {
        let mut board = TaskBoard::new();
        let low = board.insert_task(Task::new("low", "", AgentRole::Coder).with_priority(Priority::Low)).unwrap();
        let high_old = board.insert_task(Task::new("high-a", "", AgentRole::Coder).with_priority(Priority::High)).unwrap();
        let high_new = board.insert_task(Task::new("high-b", "", AgentRole::Tester).with_priority(Priority::High)).unwrap();

        let ids: Vec<&str> = suggest_next(&board, 3).iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec![high_old.as_str(), high_new.as_str(), low.as_str()]);
        assert_eq!(board.task(&low).unwrap().status, TaskStatus::Planned);
    }

    #[test]
    fn test_skips_unmet_and_manual() {
        let mut board = TaskBoard::new();
        let first = board.insert_task(Task::new("first", "", AgentRole::Coder)).unwrap();
        board
            .insert_task(
                Task::new("second", "", AgentRole::Coder)
                    .with_priority(Priority::Critical)
                    .with_dependencies(vec![first.clone()]),
            )
            .unwrap();
        board.insert_task(Task::new("manual", "", AgentRole::Coder).manual(true).with_priority(Priority::Critical)).unwrap();

        let suggestions = suggest_next(&board, 5);
        assert_eq!(suggestions.len(), 1);
        assert_eq!(suggestions[0].id, first);
    }
}
