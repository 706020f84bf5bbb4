//! Sequential chain runner.
//!
//! # Algorithm
//! For each handler, in order:
//! 1. Invoke it with the current request state and a fresh continuation
//! 2. Propagate the forwarded message (if any) into the request state,
//!    whatever the handler returned
//! 3. `Continue` merges carried values and moves on; `Final` stops the chain
//!
//! An empty chain is a no-op.

use std::sync::Arc;

use crate::error::BridgeError;
use crate::http::request::RequestState;
use crate::http::response::ResponseState;
use crate::middleware::handler::{Carried, Continuation, Flow, Handler};

/// What the controller does after the chain ran.
#[derive(Debug)]
pub enum ChainOutcome {
    /// Every handler continued; dispatch the request.
    Proceed,
    /// A handler produced the final response.
    Respond(ResponseState),
}

/// Ordered handlers.
#[derive(Clone, Default)]
pub struct Chain {
    handlers: Vec<(String, Arc<dyn Handler>)>,
}

impl Chain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, name: impl Into<String>, handler: Arc<dyn Handler>) {
        self.handlers.push((name.into(), handler));
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.handlers.iter().map(|(name, _)| name.as_str())
    }

    pub fn run(&self, request: &mut RequestState) -> Result<ChainOutcome, BridgeError> {
        for (name, handler) in &self.handlers {
            let mut next = Continuation::new();
            let result = handler.process(request, &mut next);

            if let Some(forwarded) = next.into_forwarded() {
                request.replace_inbound(forwarded);
            }

            match result? {
                Flow::Continue(carried) => {
                    tracing::trace!(handler = %name, "Chain handler continued");
                    apply_carried(request, carried);
                }
                Flow::Final(response) => {
                    tracing::debug!(
                        handler = %name,
                        status = response.status().as_u16(),
                        "Chain handler produced final response"
                    );
                    return Ok(ChainOutcome::Respond(response));
                }
            }
        }
        Ok(ChainOutcome::Proceed)
    }
}

fn apply_carried(request: &mut RequestState, carried: Carried) {
    if !carried.attributes.is_empty() {
        let mut message = request.inbound().clone();
        for (name, value) in carried.attributes {
            message = message.with_attribute(name, value);
        }
        request.replace_inbound(message);
    }
    if let Some(identity) = carried.identity {
        request.set_identity(identity);
    }
}

impl std::fmt::Debug for Chain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::message::InboundMessage;
    use crate::http::request::RequestSettings;
    use crate::middleware::handler::from_fn;
    use axum::http::{HeaderName, HeaderValue, StatusCode, Uri};
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn request() -> RequestState {
        RequestState::new(
            InboundMessage::get(Uri::from_static("/site/index")),
            Arc::new(RequestSettings::default()),
        )
    }

    #[test]
    fn empty_chain_proceeds() {
        let mut req = request();
        assert!(matches!(Chain::new().run(&mut req).unwrap(), ChainOutcome::Proceed));
    }

    #[test]
    fn continue_then_final() {
        let mut chain = Chain::new();
        chain.push(
            "a",
            Arc::new(from_fn(|req: &RequestState, next: &mut Continuation| {
                let forwarded = req.inbound().clone().with_header(
                    HeaderName::from_static("x-user"),
                    HeaderValue::from_static("alice"),
                );
                Ok(next.handle(forwarded))
            })),
        );
        chain.push(
            "b",
            Arc::new(from_fn(|req: &RequestState, _next: &mut Continuation| {
                let mut response = ResponseState::new();
                response.set_data(req.headers().get("x-user").unwrap_or("nobody").to_string());
                Ok(Flow::Final(response))
            })),
        );

        let mut req = request();
        let ChainOutcome::Respond(response) = chain.run(&mut req).unwrap() else {
            panic!("expected a final response");
        };
        assert_eq!(response.data(), Some(&json!("alice")));
        assert_eq!(req.headers().get("x-user"), Some("alice"));
    }

    #[test]
    fn final_short_circuits() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();

        let mut chain = Chain::new();
        chain.push(
            "deny",
            Arc::new(from_fn(|_req: &RequestState, _next: &mut Continuation| {
                Ok(Flow::Final(ResponseState::with_status(StatusCode::FORBIDDEN)))
            })),
        );
        chain.push(
            "never",
            Arc::new(from_fn(move |req: &RequestState, next: &mut Continuation| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(next.handle(req.inbound().clone()))
            })),
        );

        let mut req = request();
        let ChainOutcome::Respond(response) = chain.run(&mut req).unwrap() else {
            panic!("expected a final response");
        };
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn informational_final_is_still_final() {
        let mut chain = Chain::new();
        chain.push(
            "early-hints",
            Arc::new(from_fn(|_req: &RequestState, _next: &mut Continuation| {
                Ok(Flow::Final(ResponseState::with_status(StatusCode::from_u16(103).unwrap_or(StatusCode::OK))))
            })),
        );
        let mut req = request();
        assert!(matches!(chain.run(&mut req).unwrap(), ChainOutcome::Respond(_)));
    }

    #[test]
    fn forwarded_request_survives_failure() {
        let mut chain = Chain::new();
        chain.push(
            "fails",
            Arc::new(from_fn(|req: &RequestState, next: &mut Continuation| {
                next.handle(req.inbound().clone().with_attribute("seen", true));
                Err(BridgeError::internal("boom"))
            })),
        );
        let mut req = request();
        assert!(chain.run(&mut req).is_err());
        assert_eq!(req.attribute("seen", Value::Null), json!(true));
    }

    #[test]
    fn carried_attributes_are_merged() {
        let mut chain = Chain::new();
        chain.push(
            "tag",
            Arc::new(from_fn(|_req: &RequestState, _next: &mut Continuation| {
                Ok(Flow::Continue(Carried::default().attribute("tenant", "acme")))
            })),
        );
        let mut req = request();
        chain.run(&mut req).unwrap();
        assert_eq!(req.attribute("tenant", Value::Null), json!("acme"));
    }
}
