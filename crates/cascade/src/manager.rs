//! Name-keyed registry of actions.

use std::any::{type_name, Any};
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::RwLock;
use tracing::debug;

use crate::action::Action;
use crate::error::CascadeError;

/// Type-erased view of an [`Action`], used to keep actions of different
/// target and context types in one [`Manager`].
pub trait AnyAction: Send + Sync + 'static {
    /// Number of rules currently registered.
    fn rule_count(&self) -> usize;

    fn target_type(&self) -> &'static str;

    fn context_type(&self) -> &'static str;

    /// Upcast for downcasting back to the concrete `Action<T, C>`.
    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

impl<T, C> AnyAction for Action<T, C>
where
    T: Send + Sync + 'static,
    C: Send + Sync + 'static,
{
    fn rule_count(&self) -> usize {
        self.len()
    }

    fn target_type(&self) -> &'static str {
        type_name::<T>()
    }

    fn context_type(&self) -> &'static str {
        type_name::<C>()
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

impl std::fmt::Debug for dyn AnyAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnyAction")
            .field("target", &self.target_type())
            .field("context", &self.context_type())
            .field("rules", &self.rule_count())
            .finish()
    }
}

/// Aggregates actions by name so that unrelated parts of a program can reach
/// each other's workflows.
///
/// The manager takes no part in dispatch; it only hands out actions. Names are
/// unique, registering a name again replaces the previous action. Enumeration
/// follows registration order.
#[derive(Default)]
pub struct Manager {
    actions: RwLock<IndexMap<String, Arc<dyn AnyAction>>>,
}

impl Manager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an action under `name`, replacing any previous one.
    pub fn register_action<T, C>(&self, name: impl Into<String>, action: Arc<Action<T, C>>) -> &Self
    where
        T: Send + Sync + 'static,
        C: Send + Sync + 'static,
    {
        let name = name.into();
        debug!(action = %name, rules = action.len(), "registering action");
        self.actions.write().insert(name, action);
        self
    }

    /// Returns the action registered under `name`.
    ///
    /// `None` when nothing is registered under the name, or when the action
    /// there has different target or context types.
    pub fn get_action<T, C>(&self, name: &str) -> Option<Arc<Action<T, C>>>
    where
        T: Send + Sync + 'static,
        C: Send + Sync + 'static,
    {
        let action = self.actions.read().get(name).cloned()?;
        action.into_any().downcast::<Action<T, C>>().ok()
    }

    /// Returns action if exists. Otherwise returns an error.
    pub fn assert_action<T, C>(&self, name: &str) -> Result<Arc<Action<T, C>>, CascadeError>
    where
        T: Send + Sync + 'static,
        C: Send + Sync + 'static,
    {
        let action = self
            .actions
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| CascadeError::unknown_action(name))?;

        action
            .into_any()
            .downcast::<Action<T, C>>()
            .map_err(|_| CascadeError::ActionTypeMismatch {
                name: name.to_string(),
                expected: type_name::<Action<T, C>>(),
            })
    }

    /// Checks if an action with the given name exists.
    pub fn has_action(&self, name: &str) -> bool {
        self.actions.read().contains_key(name)
    }

    /// Snapshot of every registered action, in registration order.
    pub fn actions(&self) -> IndexMap<String, Arc<dyn AnyAction>> {
        self.actions.read().clone()
    }

    pub fn action_names(&self) -> Vec<String> {
        self.actions.read().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.actions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.read().is_empty()
    }
}

impl std::fmt::Debug for Manager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map().entries(self.actions.read().iter()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_then_get_returns_same_action() {
        let manager = Manager::new();
        let action = Arc::new(Action::<String>::new());
        manager.register_action("x", action.clone());

        let found = manager.get_action::<String, ()>("x").unwrap();
        assert!(Arc::ptr_eq(&found, &action));
        assert!(manager.has_action("x"));
    }

    #[test]
    fn test_get_missing_is_none() {
        let manager = Manager::new();
        assert!(manager.get_action::<String, ()>("missing").is_none());
        assert!(!manager.has_action("missing"));
    }

    #[test]
    fn test_assert_missing_fails_with_name() {
        let manager = Manager::new();
        let err = manager.assert_action::<String, ()>("missing").unwrap_err();
        assert_eq!(err.to_string(), "Action \"missing\" does not exist");
    }

    #[test]
    fn test_assert_wrong_types() {
        let manager = Manager::new();
        manager.register_action("numbers", Arc::new(Action::<u64>::new()));

        assert!(manager.get_action::<String, ()>("numbers").is_none());
        let err = manager.assert_action::<u64, String>("numbers").unwrap_err();
        assert!(matches!(
            err,
            CascadeError::ActionTypeMismatch { ref name, .. } if name == "numbers"
        ));
    }

    #[test]
    fn test_register_overwrites() {
        let manager = Manager::new();
        let first = Arc::new(Action::<u8>::new());
        let second = Arc::new(Action::<u8>::new());
        manager
            .register_action("a", first.clone())
            .register_action("a", second.clone());

        let found = manager.assert_action::<u8, ()>("a").unwrap();
        assert!(Arc::ptr_eq(&found, &second));
        assert_eq!(manager.len(), 1);
    }

    #[test]
    fn test_actions_in_registration_order() {
        let manager = Manager::new();
        manager
            .register_action("action2", Arc::new(Action::<u8>::new()))
            .register_action("action1", Arc::new(Action::<u8, String>::new()))
            .register_action("action3", Arc::new(Action::<u8>::new()));

        assert_eq!(manager.action_names(), vec!["action2", "action1", "action3"]);

        let actions = manager.actions();
        assert_eq!(actions["action1"].context_type(), type_name::<String>());
        assert_eq!(actions["action2"].rule_count(), 0);
    }
}
