//! Handler Registry
//!
//! Name-to-handler mapping built once at startup and shared read-only by
//! every request afterwards.

use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

use super::handler::Handler;
use super::types::{HandlerName, SubQuery};
use crate::{Error, Result};

/// Name and description of a handler, as shown to the classifier
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerDescriptor {
    pub name: HandlerName,
    pub description: String,
}

/// Frozen set of handlers addressable by name
#[derive(Clone)]
pub struct HandlerRegistry {
    handlers: BTreeMap<HandlerName, Arc<dyn Handler>>,
}

impl HandlerRegistry {
    /// Start building a registry
    pub fn builder() -> HandlerRegistryBuilder {
        HandlerRegistryBuilder::default()
    }

    /// Get a handler by name
    pub fn get(&self, name: &HandlerName) -> Option<Arc<dyn Handler>> {
        self.handlers.get(name).cloned()
    }

    /// Look up a handler, failing with the list of known names
    pub fn resolve(&self, name: &str) -> Result<Arc<dyn Handler>> {
        self.handlers
            .get(&HandlerName::new(name.trim()))
            .cloned()
            .ok_or_else(|| self.invalid_reference(name))
    }

    /// Bind question text to a registered handler
    pub fn sub_query(&self, text: impl Into<String>, handler: &str) -> Result<SubQuery> {
        let name = HandlerName::new(handler.trim());
        if !self.handlers.contains_key(&name) {
            return Err(self.invalid_reference(handler));
        }
        Ok(SubQuery::new_checked(text.into(), name))
    }

    pub fn contains(&self, name: &HandlerName) -> bool {
        self.handlers.contains_key(name)
    }

    /// Descriptors for every handler, ordered by name
    pub fn catalog(&self) -> Vec<HandlerDescriptor> {
        self.handlers.values().map(|h| h.descriptor()).collect()
    }

    /// Registered names, ordered
    pub fn names(&self) -> Vec<String> {
        self.handlers.keys().map(|n| n.to_string()).collect()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    fn invalid_reference(&self, name: &str) -> Error {
        Error::InvalidHandlerReference {
            name: name.to_string(),
            known: self.names(),
        }
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("handlers", &self.names())
            .finish()
    }
}

/// Builder for [`HandlerRegistry`]
#[derive(Default)]
pub struct HandlerRegistryBuilder {
    handlers: BTreeMap<HandlerName, Arc<dyn Handler>>,
}

impl HandlerRegistryBuilder {
    /// Register a handler; names must be unique
    pub fn register(mut self, handler: Arc<dyn Handler>) -> Result<Self> {
        let name = handler.name().clone();
        if self.handlers.contains_key(&name) {
            return Err(Error::Domain(format!("Duplicate handler name: {}", name)));
        }

        debug!("Registering handler: {}", name);
        self.handlers.insert(name, handler);
        Ok(self)
    }

    /// Freeze the registry
    pub fn build(self) -> Result<HandlerRegistry> {
        if self.handlers.is_empty() {
            return Err(Error::Domain("Handler registry is empty".to_string()));
        }

        info!("Handler registry frozen with {} handlers", self.handlers.len());
        Ok(HandlerRegistry {
            handlers: self.handlers,
        })
    }
}
