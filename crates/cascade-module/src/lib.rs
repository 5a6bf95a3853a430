//! Bootstrap wiring for cascade.
//!
//! Rules are tagged with the name of the action they belong to. A [`Module`]
//! collects tagged rules, builds one [`Action`](cascade_core::Action) per
//! action name, registers the tagged rules on it and publishes every action,
//! plus the [`Manager`](cascade_core::Manager) aggregating them, in a
//! [`Container`] under well-known keys:
//!
//! ```text
//! <prefix>/action/<name>   Arc<Action<T, C>>
//! <prefix>/manager         Arc<Manager>
//! ```
//!
//! Consumers get what they need through [`ActionReference`] and
//! [`ManagerReference`].

mod config;
mod container;
mod error;
mod module;

pub use config::{ModuleConfig, DEFAULT_SERVICE_PREFIX};
pub use container::{
    action_service_name, manager_service_name, ActionReference, Container, ManagerReference,
};
pub use error::ModuleError;
pub use module::{ActionRule, Module};
