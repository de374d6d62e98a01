//! Method registry keyed by `(namespace, name)`.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use super::Handler;

/// A `Namespace.name` pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MethodName {
    namespace: String,
    name: String,
}

impl MethodName {
    /// Splits `method` at its first `.`.
    ///
    /// Returns `None` when there is no `.` or either side is empty.
    #[must_use]
    pub fn parse(method: &str) -> Option<Self> {
        let (namespace, name) = method.split_once('.')?;
        if namespace.is_empty() || name.is_empty() {
            return None;
        }
        Some(Self {
            namespace: namespace.to_owned(),
            name: name.to_owned(),
        })
    }

    /// Namespace part.
    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Method part.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for MethodName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.namespace, self.name)
    }
}

/// Errors raised while registering handlers.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    /// A handler already exists for the method.
    #[error("method {method} is already registered")]
    Duplicate {
        /// Offending method.
        method: String,
    },
    /// The namespace or name cannot form a resolvable method.
    #[error("invalid method name {namespace:?}.{name:?}")]
    InvalidName {
        /// Supplied namespace.
        namespace: String,
        /// Supplied name.
        name: String,
    },
}

/// Maps method names to handlers. Frozen behind an `Arc` once the server
/// starts.
#[derive(Default)]
pub struct MethodRegistry {
    handlers: HashMap<MethodName, Arc<dyn Handler>>,
}

impl MethodRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `handler` under `namespace.name`.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::InvalidName`] when either part is empty or
    /// the namespace contains a `.`, and [`RegistryError::Duplicate`] when
    /// the method is already registered.
    pub fn register<H>(&mut self, namespace: &str, name: &str, handler: H) -> Result<(), RegistryError>
    where
        H: Handler,
    {
        if namespace.is_empty() || name.is_empty() || namespace.contains('.') {
            return Err(RegistryError::InvalidName {
                namespace: namespace.to_owned(),
                name: name.to_owned(),
            });
        }
        let method = MethodName {
            namespace: namespace.to_owned(),
            name: name.to_owned(),
        };
        if self.handlers.contains_key(&method) {
            return Err(RegistryError::Duplicate {
                method: method.to_string(),
            });
        }
        self.handlers.insert(method, Arc::new(handler));
        Ok(())
    }

    /// Looks up the handler for `method`.
    #[must_use]
    pub fn resolve(&self, method: &MethodName) -> Option<Arc<dyn Handler>> {
        self.handlers.get(method).cloned()
    }

    /// Registered method names, sorted.
    #[must_use]
    pub fn methods(&self) -> Vec<String> {
        let mut names: Vec<_> = self.handlers.keys().cloned().collect();
        names.sort();
        names.into_iter().map(|method| method.to_string()).collect()
    }

    /// Number of registered methods.
    #[must_use]
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Whether no methods are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl fmt::Debug for MethodRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodRegistry")
            .field("methods", &self.methods())
            .finish()
    }
}
