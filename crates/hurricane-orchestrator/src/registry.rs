//! Strategy registry.
//!
//! Maps each worker role to the strategy that executes its tasks. A role
//! without a strategy cannot run anything; its tasks fail as unsupported.

use hurricane_abstraction::Model;
use hurricane_core::AgentRole;
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::strategy::{CommandStrategy, ExecutionStrategy, ModelStrategy, RoutedStrategy};

/// Registry of execution strategies keyed by role.
#[derive(Clone, Default)]
pub struct StrategyRegistry {
    strategies: HashMap<AgentRole, Arc<dyn ExecutionStrategy>>,
}

impl fmt::Debug for StrategyRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut roles: Vec<(&str, &str)> =
            self.strategies.iter().map(|(role, s)| (role.as_str(), s.name())).collect();
        roles.sort_unstable();
        f.debug_struct("StrategyRegistry").field("strategies", &roles).finish()
    }
}

impl StrategyRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a [`RoutedStrategy`] for every role.
    ///
    /// # Arguments
    /// * `model` - Model used for tasks without a command
    /// * `root` - Working directory for commands
    /// * `command_timeout` - Upper bound on one command
    pub fn with_defaults(model: Arc<dyn Model>, root: &Path, command_timeout: Duration) -> Self {
        let routed: Arc<dyn ExecutionStrategy> = Arc::new(RoutedStrategy::new(
            ModelStrategy::new(model),
            CommandStrategy::new(root, command_timeout),
        ));
        let mut registry = Self::new();
        for role in AgentRole::ALL {
            registry.register(role, Arc::clone(&routed));
        }
        registry
    }

    /// Registers a strategy for a role.
    ///
    /// # Returns
    /// The strategy previously registered for the role, if any.
    pub fn register(
        &mut self,
        role: AgentRole,
        strategy: Arc<dyn ExecutionStrategy>,
    ) -> Option<Arc<dyn ExecutionStrategy>> {
        debug!(role = %role, strategy = strategy.name(), "Registering strategy");
        let previous = self.strategies.insert(role, strategy);
        if previous.is_some() {
            warn!(role = %role, "Strategy replaced in registry");
        }
        previous
    }

    /// Removes a role's strategy.
    pub fn unregister(&mut self, role: AgentRole) -> Option<Arc<dyn ExecutionStrategy>> {
        self.strategies.remove(&role)
    }

    /// Looks up the strategy for a role.
    pub fn get(&self, role: AgentRole) -> Option<Arc<dyn ExecutionStrategy>> {
        self.strategies.get(&role).cloned()
    }

    /// Whether a role has a strategy.
    pub fn supports(&self, role: AgentRole) -> bool {
        self.strategies.contains_key(&role)
    }

    /// Number of registered roles.
    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    /// Whether no role has a strategy.
    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hurricane_models::MockModel;

    #[test]
    fn test_defaults_cover_every_role() {
        let model = Arc::new(MockModel::new("mock"));
        let registry = StrategyRegistry::with_defaults(model, Path::new("."), Duration::from_secs(1));
        assert_eq!(registry.len(), AgentRole::ALL.len());
        for role in AgentRole::ALL {
            assert!(registry.supports(role));
            assert_eq!(registry.get(role).unwrap().name(), "routed");
        }
    }

    #[test]
    fn test_register_replace_unregister() {
        let mut registry = StrategyRegistry::new();
        assert!(registry.is_empty());
        let command: Arc<dyn ExecutionStrategy> =
            Arc::new(CommandStrategy::new(".", Duration::from_secs(1)));

        assert!(registry.register(AgentRole::Tester, Arc::clone(&command)).is_none());
        assert!(registry.register(AgentRole::Tester, command).is_some());
        assert!(registry.supports(AgentRole::Tester));
        assert!(!registry.supports(AgentRole::Coder));

        assert!(registry.unregister(AgentRole::Tester).is_some());
        assert!(registry.get(AgentRole::Tester).is_none());
    }
}
