//! Token authentication stage.
//!
//! # Responsibilities
//! - Run an inner handler (typically one that extracts a token from a header
//!   and forwards it as a request attribute)
//! - Resolve the forwarded token to an [`Identity`]
//! - Reject the request with 401 when the token is missing or unknown
//!
//! # Data Flow
//! ```text
//! inner.process → Continue → token attribute → IdentityResolver
//!     → Some(identity) → continue with identity attached
//!     → None           → Final(401)
//! ```

use std::sync::Arc;

use axum::http::{header, HeaderValue, StatusCode};
use serde_json::Value;

use crate::error::BridgeError;
use crate::http::request::{Identity, RequestState};
use crate::http::response::ResponseState;
use crate::middleware::handler::{Continuation, Flow, Handler};

/// Maps a token to an identity.
pub trait IdentityResolver: Send + Sync {
    fn resolve(&self, token: &str) -> Option<Identity>;
}

impl<F> IdentityResolver for F
where
    F: Fn(&str) -> Option<Identity> + Send + Sync,
{
    fn resolve(&self, token: &str) -> Option<Identity> {
        self(token)
    }
}

/// Default token attribute name.
pub const TOKEN_ATTRIBUTE: &str = "auth_token";

pub struct TokenAuth {
    inner: Arc<dyn Handler>,
    resolver: Arc<dyn IdentityResolver>,
    attribute: String,
}

impl TokenAuth {
    pub fn new(inner: Arc<dyn Handler>, resolver: Arc<dyn IdentityResolver>) -> Self {
        Self {
            inner,
            resolver,
            attribute: TOKEN_ATTRIBUTE.to_string(),
        }
    }

    /// Read the token from a different attribute.
    pub fn with_attribute(mut self, attribute: impl Into<String>) -> Self {
        self.attribute = attribute.into();
        self
    }

    fn unauthorized() -> Result<Flow, BridgeError> {
        let mut response = ResponseState::with_status(StatusCode::UNAUTHORIZED);
        response
            .set_header(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"))
            .set_data("Unauthorized");
        Ok(Flow::Final(response))
    }
}

impl Handler for TokenAuth {
    fn process(&self, request: &RequestState, next: &mut Continuation) -> Result<Flow, BridgeError> {
        let mut inner_next = Continuation::new();
        let mut carried = match self.inner.process(request, &mut inner_next)? {
            Flow::Final(response) => return Ok(Flow::Final(response)),
            Flow::Continue(carried) => carried,
        };

        let forwarded = inner_next
            .into_forwarded()
            .unwrap_or_else(|| request.inbound().clone());

        let token = forwarded
            .attribute(&self.attribute)
            .or_else(|| carried.attributes.get(&self.attribute))
            .and_then(Value::as_str)
            .map(str::to_string);

        let Some(token) = token else {
            tracing::debug!(attribute = %self.attribute, "No auth token forwarded");
            return Self::unauthorized();
        };

        match self.resolver.resolve(&token) {
            Some(identity) => {
                tracing::debug!(identity = %identity.id, "Token resolved");
                carried.identity = Some(identity);
                Ok(next.handle_with(forwarded, carried))
            }
            None => {
                tracing::warn!("Rejected unknown auth token");
                Self::unauthorized()
            }
        }
    }
}

/// Inner handler that copies a bearer token from `Authorization` into the
/// token attribute.
pub fn bearer_extractor() -> impl Handler {
    crate::middleware::handler::from_fn(|request: &RequestState, next: &mut Continuation| {
        let message = request.inbound().clone();
        let token = request
            .headers()
            .get(header::AUTHORIZATION.as_str())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(|t| t.trim().to_string());
        Ok(match token {
            Some(token) => next.handle(message.with_attribute(TOKEN_ATTRIBUTE, token)),
            None => next.handle(message),
        })
    })
}
