//! Chain handler contract.
//!
//! A handler either finishes the request (`Flow::Final`) or defers to the
//! next stage (`Flow::Continue`). Continuing is an explicit variant, never a
//! reserved status code, so a real response can't be mistaken for it.

use std::collections::BTreeMap;
use std::fmt;

use serde_json::Value;

use crate::error::BridgeError;
use crate::http::message::InboundMessage;
use crate::http::request::{Identity, RequestState};
use crate::http::response::ResponseState;

/// Values a continuing handler passes forward.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Carried {
    /// Merged into the inbound message attributes.
    pub attributes: BTreeMap<String, Value>,
    /// Stored on the request state.
    pub identity: Option<Identity>,
}

impl Carried {
    pub fn attribute(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    pub fn identity(mut self, identity: Identity) -> Self {
        self.identity = Some(identity);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty() && self.identity.is_none()
    }
}

/// Result of one chain stage.
#[derive(Debug)]
pub enum Flow {
    Continue(Carried),
    Final(ResponseState),
}

impl Flow {
    pub fn is_continue(&self) -> bool {
        matches!(self, Flow::Continue(_))
    }
}

/// Capability handed to each handler for deferring to the next stage.
///
/// Whatever message the handler passes to [`Continuation::handle`] becomes
/// the request every later stage (and the dispatcher) sees.
#[derive(Debug, Default)]
pub struct Continuation {
    forwarded: Option<InboundMessage>,
}

impl Continuation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forward `request` and continue.
    pub fn handle(&mut self, request: InboundMessage) -> Flow {
        self.handle_with(request, Carried::default())
    }

    /// Forward `request` and continue, passing extra values along.
    pub fn handle_with(&mut self, request: InboundMessage, carried: Carried) -> Flow {
        self.forwarded = Some(request);
        Flow::Continue(carried)
    }

    pub fn forwarded(&self) -> Option<&InboundMessage> {
        self.forwarded.as_ref()
    }

    pub(crate) fn into_forwarded(self) -> Option<InboundMessage> {
        self.forwarded
    }
}

/// One stage of the chain.
pub trait Handler: Send + Sync {
    fn process(&self, request: &RequestState, next: &mut Continuation) -> Result<Flow, BridgeError>;
}

/// Adapter that lets a plain function act as a [`Handler`].
pub struct FnHandler<F> {
    f: F,
}

impl<F> Handler for FnHandler<F>
where
    F: Fn(&RequestState, &mut Continuation) -> Result<Flow, BridgeError> + Send + Sync,
{
    fn process(&self, request: &RequestState, next: &mut Continuation) -> Result<Flow, BridgeError> {
        (self.f)(request, next)
    }
}

impl<F> fmt::Debug for FnHandler<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FnHandler")
    }
}

/// Wrap a closure as a handler.
pub fn from_fn<F>(f: F) -> FnHandler<F>
where
    F: Fn(&RequestState, &mut Continuation) -> Result<Flow, BridgeError> + Send + Sync,
{
    FnHandler { f }
}
