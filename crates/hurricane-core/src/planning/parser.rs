//! Parsing of task breakdowns returned by the model.
//!
//! Responses are expected to be a JSON array of task objects, but models
//! routinely wrap it in Markdown fences or prose, use numeric priorities, or
//! refer to dependencies by title or position. The parser accepts all of
//! those and normalizes them into [`Task`]s whose role advertises their
//! required capabilities.

use petgraph::algo::is_cyclic_directed;
use petgraph::graph::DiGraph;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use tracing::debug;

use super::error::{PlanningError, Result};
use crate::models::{AgentRole, Goal, Priority, SHARED_TOOLS, Task};

/// One task as written by the model.
#[derive(Debug, Clone, Deserialize)]
pub struct RawTask {
    /// Optional local id used by other entries' dependencies.
    #[serde(default)]
    pub id: Option<Value>,
    /// Task title.
    pub title: String,
    /// Task description.
    #[serde(default)]
    pub description: String,
    /// Name or 1-5 score.
    #[serde(default)]
    pub priority: Option<Value>,
    /// Explicit role.
    #[serde(default, alias = "agent")]
    pub role: Option<String>,
    /// Effort in minutes.
    #[serde(default, alias = "estimated_duration")]
    pub estimated_minutes: Option<u32>,
    /// References to other entries: id, title or 1-based index.
    #[serde(default)]
    pub dependencies: Vec<Value>,
    /// Capabilities or tools.
    #[serde(default, alias = "required_tools")]
    pub required_capabilities: Vec<String>,
    /// Completion criteria; a single string is accepted.
    #[serde(default)]
    pub success_criteria: Option<Value>,
    /// May run unattended.
    #[serde(default)]
    pub autonomous: Option<bool>,
    /// Inverse of `autonomous`.
    #[serde(default)]
    pub human_approval_required: Option<bool>,
}

/// Extracts the task array from a model response.
pub fn extract_tasks(content: &str) -> Result<Vec<RawTask>> {
    let trimmed = strip_fences(content);

    let value = match serde_json::from_str::<Value>(trimmed) {
        Ok(value) => value,
        Err(_) => {
            let start = trimmed.find('[');
            let end = trimmed.rfind(']');
            match (start, end) {
                (Some(start), Some(end)) if end > start => {
                    serde_json::from_str::<Value>(&trimmed[start..=end]).map_err(|e| {
                        PlanningError::MalformedResponse(format!("invalid JSON array: {}", e))
                    })?
                }
                _ => {
                    return Err(PlanningError::MalformedResponse(
                        "no JSON array found in response".to_string(),
                    ));
                }
            }
        }
    };

    let array = match value {
        Value::Array(items) => items,
        Value::Object(mut map) => match map.remove("tasks") {
            Some(Value::Array(items)) => items,
            _ => {
                return Err(PlanningError::MalformedResponse(
                    "expected an array of tasks".to_string(),
                ));
            }
        },
        _ => {
            return Err(PlanningError::MalformedResponse("expected an array of tasks".to_string()));
        }
    };

    let tasks: Vec<RawTask> = array
        .into_iter()
        .enumerate()
        .map(|(i, item)| {
            serde_json::from_value(item).map_err(|e| {
                PlanningError::MalformedResponse(format!("task {} does not match schema: {}", i + 1, e))
            })
        })
        .collect::<Result<_>>()?;

    if tasks.is_empty() {
        return Err(PlanningError::MalformedResponse("empty task list".to_string()));
    }
    if let Some(i) = tasks.iter().position(|t| t.title.trim().is_empty()) {
        return Err(PlanningError::MalformedResponse(format!("task {} has no title", i + 1)));
    }
    Ok(tasks)
}

fn strip_fences(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the language tag on the opening fence
    let body = rest.split_once('\n').map_or("", |(_, body)| body);
    body.rfind("```").map_or(body, |end| &body[..end]).trim()
}

fn parse_priority(value: Option<&Value>, default: Priority) -> Priority {
    match value {
        Some(Value::String(s)) => s.parse().unwrap_or(default),
        Some(Value::Number(n)) => n.as_u64().map_or(default, |n| Priority::from(n.min(5) as u8)),
        _ => default,
    }
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::String(s)) if !s.trim().is_empty() => vec![s.clone()],
        Some(Value::Array(items)) => {
            items.iter().filter_map(Value::as_str).map(ToString::to_string).collect()
        }
        _ => Vec::new(),
    }
}

fn is_known_capability(capability: &str) -> bool {
    SHARED_TOOLS.contains(&capability)
        || AgentRole::ALL.iter().any(|role| role.capabilities().contains(&capability))
}

/// Picks the role for a task and trims capabilities to what that role advertises.
///
/// Returns the role, the kept capabilities and the dropped ones.
pub fn resolve_role(
    explicit: Option<&str>,
    capabilities: &[String],
) -> (AgentRole, Vec<String>, Vec<String>) {
    let (mut kept, mut dropped): (Vec<String>, Vec<String>) =
        capabilities.iter().cloned().partition(|c| is_known_capability(c));

    let explicit = explicit.and_then(|r| r.parse::<AgentRole>().ok());
    let role = match explicit {
        Some(role) if role.supports_all(&kept) => role,
        _ => AgentRole::infer(&kept).or(explicit).unwrap_or(AgentRole::Coordinator),
    };

    if !role.supports_all(&kept) {
        let (supported, unsupported): (Vec<String>, Vec<String>) =
            kept.into_iter().partition(|c| role.supports(c));
        kept = supported;
        dropped.extend(unsupported);
    }
    (role, kept, dropped)
}

/// Converts raw entries into tasks for `goal`, wiring dependencies.
///
/// The returned tasks are ordered so every task follows its dependencies,
/// keeping the model's order wherever dependencies allow.
pub fn build_tasks(goal: &Goal, raw: &[RawTask]) -> Result<Vec<Task>> {
    let mut tasks: Vec<Task> = raw
        .iter()
        .map(|r| {
            let (role, required, dropped) =
                resolve_role(r.role.as_deref(), &r.required_capabilities);
            let autonomous = r
                .autonomous
                .or_else(|| r.human_approval_required.map(|required| !required))
                .unwrap_or(false);

            let mut task = Task::new(r.title.trim(), r.description.trim(), role)
                .for_goal(&goal.id)
                .with_priority(parse_priority(r.priority.as_ref(), goal.priority))
                .autonomous(autonomous);
            task.estimated_minutes = r.estimated_minutes.unwrap_or(30);
            task.required_capabilities = required;
            task.success_criteria = string_list(r.success_criteria.as_ref());
            if !dropped.is_empty() {
                task.context.insert("unrecognized_capabilities".to_string(), dropped.into());
            }
            task
        })
        .collect();

    let edges = resolve_dependencies(raw);
    let mut graph = DiGraph::<usize, ()>::new();
    let nodes: Vec<_> = (0..tasks.len()).map(|i| graph.add_node(i)).collect();
    for &(from, to) in &edges {
        graph.add_edge(nodes[to], nodes[from], ());
    }
    if is_cyclic_directed(&graph) {
        return Err(PlanningError::DependencyCycle(
            raw.iter().map(|t| t.title.as_str()).collect::<Vec<_>>().join(", "),
        ));
    }

    let ids: Vec<String> = tasks.iter().map(|t| t.id.clone()).collect();
    for &(from, to) in &edges {
        if !tasks[from].dependencies.contains(&ids[to]) {
            tasks[from].dependencies.push(ids[to].clone());
        }
    }

    Ok(stable_order(tasks, &edges))
}

/// Resolves dependency references to `(dependent, dependency)` index pairs.
fn resolve_dependencies(raw: &[RawTask]) -> Vec<(usize, usize)> {
    let mut by_key: HashMap<String, usize> = HashMap::new();
    for (i, task) in raw.iter().enumerate() {
        by_key.entry(task.title.trim().to_lowercase()).or_insert(i);
        if let Some(id) = &task.id {
            let key = match id {
                Value::String(s) => s.trim().to_lowercase(),
                other => other.to_string(),
            };
            by_key.insert(key, i);
        }
    }

    let mut edges = Vec::new();
    for (i, task) in raw.iter().enumerate() {
        for reference in &task.dependencies {
            let target = match reference {
                Value::Number(n) => n.as_u64().and_then(|n| usize::try_from(n).ok()).and_then(|n| {
                    by_key.get(&n.to_string()).copied().or_else(|| n.checked_sub(1))
                }),
                Value::String(s) => {
                    let key = s.trim().to_lowercase();
                    by_key.get(&key).copied().or_else(|| {
                        key.parse::<usize>().ok().and_then(|n| n.checked_sub(1))
                    })
                }
                _ => None,
            };
            match target {
                Some(target) if target < raw.len() && target != i => edges.push((i, target)),
                _ => debug!(task = %task.title, reference = %reference, "Dropping unresolved dependency"),
            }
        }
    }
    edges
}

fn stable_order(tasks: Vec<Task>, edges: &[(usize, usize)]) -> Vec<Task> {
    let n = tasks.len();
    let mut placed = vec![false; n];
    let mut order = Vec::with_capacity(n);
    while order.len() < n {
        let next = (0..n).find(|&i| {
            !placed[i] && edges.iter().filter(|(from, _)| *from == i).all(|(_, to)| placed[*to])
        });
        // The graph is acyclic, so some unplaced task always has its dependencies placed
        let Some(next) = next else { break };
        placed[next] = true;
        order.push(next);
    }
    let mut slots: Vec<Option<Task>> = tasks.into_iter().map(Some).collect();
    order.into_iter().filter_map(|i| slots[i].take()).collect()
}
