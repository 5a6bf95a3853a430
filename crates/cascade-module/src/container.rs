//! Keyed service container and typed references into it.

use std::any::{type_name, Any};
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use cascade_core::{Action, Manager};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::config::DEFAULT_SERVICE_PREFIX;
use crate::error::ModuleError;

type Service = Arc<dyn Any + Send + Sync>;

/// Container key of the action named `action_name`.
pub fn action_service_name(prefix: &str, action_name: &str) -> String {
    format!("{prefix}/action/{action_name}")
}

/// Container key of the manager.
pub fn manager_service_name(prefix: &str) -> String {
    format!("{prefix}/manager")
}

/// Services by well-known key.
///
/// Consumers ask for an action or the manager by key (or through an
/// [`ActionReference`] / [`ManagerReference`]) instead of being handed one.
#[derive(Default)]
pub struct Container {
    services: DashMap<String, Service>,
}

impl Container {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a service, returning whatever was registered under the key before.
    pub fn register<S>(&self, key: impl Into<String>, service: Arc<S>) -> Option<Service>
    where
        S: Any + Send + Sync,
    {
        self.services.insert(key.into(), service)
    }

    /// Stores a service only if the key is free. Returns `false`, leaving the
    /// container untouched, when something is already registered under it.
    pub fn try_register<S>(&self, key: impl Into<String>, service: Arc<S>) -> bool
    where
        S: Any + Send + Sync,
    {
        match self.services.entry(key.into()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(vacant) => {
                vacant.insert(service);
                true
            }
        }
    }

    /// The service of type `S` under `key`, registering the one built by `init`
    /// if the key is free. The check and the insert happen under one shard lock.
    pub fn get_or_register_with<S, F>(&self, key: &str, init: F) -> Result<Arc<S>, ModuleError>
    where
        S: Any + Send + Sync,
        F: FnOnce() -> Arc<S>,
    {
        let service = self
            .services
            .entry(key.to_string())
            .or_insert_with(|| -> Service { init() })
            .value()
            .clone();

        service
            .downcast::<S>()
            .map_err(|_| ModuleError::ServiceTypeMismatch {
                key: key.to_string(),
                expected: type_name::<S>(),
            })
    }

    pub fn remove(&self, key: &str) -> Option<Service> {
        self.services.remove(key).map(|(_, service)| service)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.services.contains_key(key)
    }

    /// The service under `key`, if present and of type `S`.
    pub fn get<S>(&self, key: &str) -> Option<Arc<S>>
    where
        S: Any + Send + Sync,
    {
        let service = self.services.get(key)?.value().clone();
        service.downcast::<S>().ok()
    }

    /// Like [`Container::get`], but says why the lookup failed.
    pub fn resolve<S>(&self, key: &str) -> Result<Arc<S>, ModuleError>
    where
        S: Any + Send + Sync,
    {
        let service = self
            .services
            .get(key)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| ModuleError::MissingService {
                key: key.to_string(),
            })?;

        service
            .downcast::<S>()
            .map_err(|_| ModuleError::ServiceTypeMismatch {
                key: key.to_string(),
                expected: type_name::<S>(),
            })
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.services.iter().map(|entry| entry.key().clone()).collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}

/// Typed handle on an action wired by a [`Module`](crate::Module).
pub struct ActionReference<T, C = ()> {
    prefix: String,
    name: String,
    _marker: PhantomData<fn() -> (T, C)>,
}

impl<T, C> ActionReference<T, C>
where
    T: Send + Sync + 'static,
    C: Send + Sync + 'static,
{
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            prefix: DEFAULT_SERVICE_PREFIX.to_string(),
            name: name.into(),
            _marker: PhantomData,
        }
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn key(&self) -> String {
        action_service_name(&self.prefix, &self.name)
    }

    pub fn resolve(&self, container: &Container) -> Result<Arc<Action<T, C>>, ModuleError> {
        container.resolve(&self.key())
    }
}

impl<T, C> Clone for ActionReference<T, C> {
    fn clone(&self) -> Self {
        Self {
            prefix: self.prefix.clone(),
            name: self.name.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T, C> fmt::Debug for ActionReference<T, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionReference")
            .field("prefix", &self.prefix)
            .field("name", &self.name)
            .field("target", &type_name::<T>())
            .field("context", &type_name::<C>())
            .finish()
    }
}

/// Handle on the manager wired by a [`Module`](crate::Module).
#[derive(Debug, Clone)]
pub struct ManagerReference {
    prefix: String,
}

impl Default for ManagerReference {
    fn default() -> Self {
        Self {
            prefix: DEFAULT_SERVICE_PREFIX.to_string(),
        }
    }
}

impl ManagerReference {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn key(&self) -> String {
        manager_service_name(&self.prefix)
    }

    pub fn resolve(&self, container: &Container) -> Result<Arc<Manager>, ModuleError> {
        container.resolve(&self.key())
    }
}
