use thiserror::Error;

/// Errors raised while wiring actions or resolving services.
#[derive(Debug, Error)]
pub enum ModuleError {
    /// Module configuration could not be parsed
    #[error("invalid module config: {0}")]
    Config(#[from] serde_json::Error),

    /// Action names must be non-empty
    #[error("action name must not be empty")]
    EmptyActionName,

    /// Another module already wired an action under the same key
    #[error("action \"{name}\" is already registered in the container")]
    DuplicateAction { name: String },

    /// The container holds a different manager than the one the module was given
    #[error("container already holds another manager under \"{key}\"")]
    ManagerConflict { key: String },

    /// Nothing registered under the key
    #[error("service \"{key}\" is not registered")]
    MissingService { key: String },

    /// Something is registered under the key, but of another type
    #[error("service \"{key}\" is not a {expected}")]
    ServiceTypeMismatch { key: String, expected: &'static str },
}
