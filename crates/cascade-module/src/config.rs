//! Module configuration.

use serde::{Deserialize, Serialize};

use crate::error::ModuleError;

/// Prefix of every container key the module writes.
pub const DEFAULT_SERVICE_PREFIX: &str = "cascade";

/// What a [`Module`](crate::Module) wires besides the actions its rules name.
///
/// ```json
/// { "actions": ["archive", "notify"], "service_prefix": "billing" }
/// ```
///
/// Both fields are optional.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModuleConfig {
    /// Actions created up front, even when no rule is tagged for them.
    pub actions: Vec<String>,

    /// Prefix for the container keys of actions and the manager.
    pub service_prefix: String,
}

impl Default for ModuleConfig {
    fn default() -> Self {
        Self {
            actions: Vec::new(),
            service_prefix: DEFAULT_SERVICE_PREFIX.to_string(),
        }
    }
}

impl ModuleConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ModuleError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn with_actions<I, S>(mut self, actions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.actions.extend(actions.into_iter().map(Into::into));
        self
    }

    pub fn with_service_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.service_prefix = prefix.into();
        self
    }
}
