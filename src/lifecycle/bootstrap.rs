//! Named bootstrap routines.
//!
//! A routine runs once per request, right after the context is built and
//! with the session open. The configured `app.bootstrap` list selects and
//! orders them; the controller calls each one directly.

use crate::error::BridgeError;
use crate::lifecycle::context::RequestContext;

pub trait Bootstrap: Send + Sync {
    fn name(&self) -> &str;
    fn bootstrap(&self, ctx: &mut RequestContext) -> Result<(), BridgeError>;
}

/// Bootstrap routine backed by a closure.
pub struct FnBootstrap<F> {
    name: String,
    f: F,
}

impl<F> FnBootstrap<F>
where
    F: Fn(&mut RequestContext) -> Result<(), BridgeError> + Send + Sync,
{
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self { name: name.into(), f }
    }
}

impl<F> Bootstrap for FnBootstrap<F>
where
    F: Fn(&mut RequestContext) -> Result<(), BridgeError> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn bootstrap(&self, ctx: &mut RequestContext) -> Result<(), BridgeError> {
        (self.f)(ctx)
    }
}
