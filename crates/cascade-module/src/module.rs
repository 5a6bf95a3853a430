//! Explicit bootstrap: tagged rules in, wired actions and manager out.

use std::sync::Arc;

use cascade_core::{Action, ContextRule, Manager, Rule, RuleHandle};
use indexmap::IndexSet;
use tracing::{debug, info};

use crate::config::ModuleConfig;
use crate::container::{action_service_name, manager_service_name, Container};
use crate::error::ModuleError;

/// A rule tagged with the name of the action it belongs to.
pub struct ActionRule<T, C = ()> {
    action_name: String,
    rule: RuleHandle<T, C>,
}

impl<T: 'static> ActionRule<T, ()> {
    pub fn new<R: Rule<T> + 'static>(action_name: impl Into<String>, rule: Arc<R>) -> Self {
        Self {
            action_name: action_name.into(),
            rule: RuleHandle::plain(rule),
        }
    }
}

impl<T: 'static, C: 'static> ActionRule<T, C> {
    pub fn contextual<R: ContextRule<T, C> + 'static>(
        action_name: impl Into<String>,
        rule: Arc<R>,
    ) -> Self {
        Self {
            action_name: action_name.into(),
            rule: RuleHandle::contextual(rule),
        }
    }
}

impl<T, C> ActionRule<T, C> {
    pub fn action_name(&self) -> &str {
        &self.action_name
    }

    pub fn rule(&self) -> &RuleHandle<T, C> {
        &self.rule
    }
}

/// Builds one [`Action`] per action name and registers it in a [`Manager`]
/// and a [`Container`].
///
/// Action names come from the config first, then from the tagged rules in the
/// order they were added. Every action receives the rules tagged for it, in the
/// order they were added.
///
/// # Example
///
/// ```ignore
/// let container = Container::new();
/// let manager = Module::<Entity>::new()
///     .with_rule("archive", Arc::new(ArchiveOrder))
///     .with_rule("archive", Arc::new(ArchiveInvoice))
///     .with_rule("notify", Arc::new(SendEmail))
///     .init(&container)?;
///
/// let archive = ActionReference::<Entity>::new("archive").resolve(&container)?;
/// ```
pub struct Module<T, C = ()> {
    config: ModuleConfig,
    manager: Option<Arc<Manager>>,
    rules: Vec<ActionRule<T, C>>,
}

impl<T, C> Module<T, C>
where
    T: Send + Sync + 'static,
    C: Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self::with_config(ModuleConfig::default())
    }

    pub fn with_config(config: ModuleConfig) -> Self {
        Self {
            config,
            manager: None,
            rules: Vec::new(),
        }
    }

    /// Register actions into this manager instead of the container's (or a
    /// fresh) one.
    pub fn with_manager(mut self, manager: Arc<Manager>) -> Self {
        self.manager = Some(manager);
        self
    }

    /// Create the action even if no rule is tagged for it.
    pub fn with_action(mut self, name: impl Into<String>) -> Self {
        self.config.actions.push(name.into());
        self
    }

    pub fn with_tagged(mut self, rule: ActionRule<T, C>) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn with_context_rule<R>(self, action_name: impl Into<String>, rule: Arc<R>) -> Self
    where
        R: ContextRule<T, C> + 'static,
    {
        self.with_tagged(ActionRule::contextual(action_name, rule))
    }

    pub fn config(&self) -> &ModuleConfig {
        &self.config
    }

    /// Every action name this module wires, in wiring order.
    pub fn action_names(&self) -> Vec<String> {
        let names: IndexSet<&str> = self
            .config
            .actions
            .iter()
            .map(String::as_str)
            .chain(self.rules.iter().map(ActionRule::action_name))
            .collect();
        names.into_iter().map(str::to_string).collect()
    }

    /// Wire every action and the manager into `container`.
    ///
    /// The manager is, in order of preference: the one passed to
    /// [`Module::with_manager`], the one already in the container, a new one.
    ///
    /// Action keys are claimed atomically. If any of them is taken, including
    /// by another `init` racing on the same container, the keys this call
    /// already claimed are released and the manager is left untouched.
    pub fn init(self, container: &Container) -> Result<Arc<Manager>, ModuleError> {
        let prefix = self.config.service_prefix.as_str();
        let names = self.action_names();

        for name in &names {
            if name.is_empty() {
                return Err(ModuleError::EmptyActionName);
            }
            if container.contains(&action_service_name(prefix, name)) {
                return Err(ModuleError::DuplicateAction { name: name.clone() });
            }
        }

        let manager_key = manager_service_name(prefix);
        let manager = match &self.manager {
            Some(custom) => {
                let registered =
                    container.get_or_register_with(&manager_key, || custom.clone())?;
                if !Arc::ptr_eq(&registered, custom) {
                    return Err(ModuleError::ManagerConflict { key: manager_key });
                }
                registered
            }
            None => container.get_or_register_with(&manager_key, || Arc::new(Manager::new()))?,
        };

        let mut claimed: Vec<(String, Arc<Action<T, C>>)> = Vec::with_capacity(names.len());
        for name in names {
            let action = Arc::new(Action::<T, C>::new());
            for tagged in self.rules.iter().filter(|tagged| tagged.action_name == name) {
                action.register(tagged.rule.clone());
            }

            if !container.try_register(action_service_name(prefix, &name), action.clone()) {
                for (claimed_name, _) in &claimed {
                    container.remove(&action_service_name(prefix, claimed_name));
                }
                return Err(ModuleError::DuplicateAction { name });
            }
            claimed.push((name, action));
        }

        for (name, action) in claimed {
            debug!(action = %name, rules = action.len(), "action wired");
            manager.register_action(name, action);
        }

        info!(prefix, actions = manager.len(), "cascade module initialized");
        Ok(manager)
    }
}

impl<T> Module<T, ()>
where
    T: Send + Sync + 'static,
{
    pub fn with_rule<R>(self, action_name: impl Into<String>, rule: Arc<R>) -> Self
    where
        R: Rule<T> + 'static,
    {
        self.with_tagged(ActionRule::new(action_name, rule))
    }
}

impl<T, C> Default for Module<T, C>
where
    T: Send + Sync + 'static,
    C: Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}
