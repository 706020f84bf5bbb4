//! Named handler registry.
//!
//! Handlers are registered by name when the application is assembled; the
//! configured `middleware` list picks and orders them.

use std::collections::HashMap;
use std::sync::Arc;

use crate::middleware::chain::Chain;
use crate::middleware::handler::Handler;

/// Unknown name in the configured handler list.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("no middleware handler registered under '{0}'")]
pub struct UnknownHandler(pub String);

#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn Handler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` under `name`, replacing any previous entry.
    pub fn register(&mut self, name: impl Into<String>, handler: Arc<dyn Handler>) {
        self.handlers.insert(name.into(), handler);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Handler>> {
        self.handlers.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    /// Build a chain in the order given by `names`.
    pub fn build_chain(&self, names: &[String]) -> Result<Chain, UnknownHandler> {
        let mut chain = Chain::new();
        for name in names {
            let handler = self
                .get(name)
                .ok_or_else(|| UnknownHandler(name.clone()))?;
            chain.push(name.clone(), handler);
        }
        Ok(chain)
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.handlers.keys()).finish()
    }
}
