//! Name-keyed factories for pluggable strategies.
//!
//! Every capability (protocol, registry factory, cluster strategy, load
//! balancer, serializer) gets its own [ExtensionLoader], filled at startup from
//! a static table and read-only afterwards. A [Scope::Singleton] entry is built
//! by the first `load()` and shared after that, a [Scope::Prototype] entry is
//! built on every `load()`.

use crate::error::ExtensionError;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Scope {
    Singleton,
    Prototype,
}

pub type Factory<T> = Arc<dyn Fn() -> Arc<T> + Send + Sync>;

struct Entry<T: ?Sized> {
    scope: Scope,
    factory: Factory<T>,
    instance: OnceLock<Arc<T>>,
}

/// One row of a static extension table
pub type ExtensionRow<T> = (&'static str, Scope, fn() -> Arc<T>);

pub struct ExtensionLoader<T: ?Sized> {
    capability: &'static str,
    entries: HashMap<String, Entry<T>>,
    default: Option<String>,
}

impl<T: ?Sized + Send + Sync + 'static> ExtensionLoader<T> {
    pub fn new(capability: &'static str) -> Self {
        Self { capability, entries: HashMap::new(), default: None }
    }

    /// Build a loader from a static table, the first row becomes the default.
    pub fn from_table(
        capability: &'static str, table: &[ExtensionRow<T>],
    ) -> Result<Self, ExtensionError> {
        let mut loader = Self::new(capability);
        for (name, scope, factory) in table {
            let factory = *factory;
            loader.register(name, *scope, move || factory())?;
        }
        if let Some((name, _, _)) = table.first() {
            loader.default = Some(name.to_string());
        }
        Ok(loader)
    }

    /// Register an implementation under `name`.
    ///
    /// A name can only be taken once, a second registration is a configuration error.
    pub fn register<F>(&mut self, name: &str, scope: Scope, factory: F) -> Result<(), ExtensionError>
    where
        F: Fn() -> Arc<T> + Send + Sync + 'static,
    {
        if name.is_empty() {
            return Err(self.config_err(name, "empty extension name"));
        }
        if self.entries.contains_key(name) {
            return Err(self.config_err(name, "registered more than once"));
        }
        self.entries.insert(
            name.to_string(),
            Entry { scope, factory: Arc::new(factory), instance: OnceLock::new() },
        );
        Ok(())
    }

    /// Swap the implementation behind an existing `name`, used to override a
    /// built-in before the loader is shared.
    pub fn replace<F>(&mut self, name: &str, scope: Scope, factory: F) -> Result<(), ExtensionError>
    where
        F: Fn() -> Arc<T> + Send + Sync + 'static,
    {
        match self.entries.get_mut(name) {
            Some(entry) => {
                *entry = Entry { scope, factory: Arc::new(factory), instance: OnceLock::new() };
                Ok(())
            }
            None => Err(self.not_found(name)),
        }
    }

    pub fn load(&self, name: &str) -> Result<Arc<T>, ExtensionError> {
        let Some(entry) = self.entries.get(name) else {
            return Err(self.not_found(name));
        };
        match entry.scope {
            Scope::Singleton => Ok(entry.instance.get_or_init(|| (entry.factory)()).clone()),
            Scope::Prototype => Ok((entry.factory)()),
        }
    }

    pub fn load_default(&self) -> Result<Arc<T>, ExtensionError> {
        match self.default.as_deref() {
            Some(name) => self.load(name),
            None => Err(ExtensionError::NotFound {
                capability: self.capability,
                name: "<default>".to_string(),
            }),
        }
    }

    pub fn set_default(&mut self, name: &str) -> Result<(), ExtensionError> {
        if !self.entries.contains_key(name) {
            return Err(self.not_found(name));
        }
        self.default = Some(name.to_string());
        Ok(())
    }

    /// The raw constructor of `name`, bypassing the singleton cache.
    ///
    /// For callers that manage instances themselves, like a codec pool.
    pub fn factory(&self, name: &str) -> Result<Factory<T>, ExtensionError> {
        self.entries.get(name).map(|e| e.factory.clone()).ok_or_else(|| self.not_found(name))
    }

    #[inline]
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn scope(&self, name: &str) -> Option<Scope> {
        self.entries.get(name).map(|e| e.scope)
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.entries.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    #[inline]
    pub fn capability(&self) -> &'static str {
        self.capability
    }

    fn not_found(&self, name: &str) -> ExtensionError {
        ExtensionError::NotFound { capability: self.capability, name: name.to_string() }
    }

    fn config_err(&self, name: &str, reason: &str) -> ExtensionError {
        ExtensionError::Config {
            capability: self.capability,
            name: name.to_string(),
            reason: reason.to_string(),
        }
    }
}

impl<T: ?Sized> fmt::Debug for ExtensionLoader<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut names: Vec<&String> = self.entries.keys().collect();
        names.sort_unstable();
        f.debug_struct("ExtensionLoader")
            .field("capability", &self.capability)
            .field("names", &names)
            .field("default", &self.default)
            .finish()
    }
}
