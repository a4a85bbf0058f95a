//! Goal decomposition and next-step suggestions.

mod error;
mod parser;
mod planner;
mod suggest;

pub use error::{PlanningError, Result};
pub use parser::{RawTask, build_tasks, extract_tasks, resolve_role};
pub use planner::{Breakdown, GoalRequest, PLANNER_SYSTEM_PROMPT, Planner};
pub use suggest::{dispatch_order, suggest_next};
