//! Error types for cascade lookups.
//!
//! Rule failures are not represented here: whatever error a rule returns
//! reaches the caller of the top-level run unchanged, as an [`anyhow::Error`].

use thiserror::Error;

/// Raised when a manager cannot hand out the action a caller asserted on.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CascadeError {
    /// No action is registered under the name.
    #[error("Action \"{name}\" does not exist")]
    UnknownAction { name: String },

    /// An action is registered under the name, but for other target or
    /// context types than the ones requested.
    #[error("Action \"{name}\" is not an {expected}")]
    ActionTypeMismatch { name: String, expected: &'static str },
}

impl CascadeError {
    pub fn unknown_action(name: impl Into<String>) -> Self {
        Self::UnknownAction { name: name.into() }
    }

    /// The action name the failed lookup was made for.
    pub fn action_name(&self) -> &str {
        match self {
            Self::UnknownAction { name } | Self::ActionTypeMismatch { name, .. } => name,
        }
    }
}
