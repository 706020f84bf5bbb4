//! Rule-based dispatcher.
//!
//! # Responsibilities
//! - Resolve the request's path info to `(route, params)` using the
//!   configured rules (first match wins)
//! - Fall back to the default route for an empty path
//! - Ask for a redirect when trailing-slash normalisation applies
//! - Run the action registered for a route
//!
//! # Design Decisions
//! - Rules are compiled once at startup and never change
//! - Rule captures take precedence over query parameters of the same name

use std::collections::HashMap;
use std::sync::Arc;

use axum::http::StatusCode;
use serde_json::Value;

use crate::config::RoutingConfig;
use crate::error::BridgeError;
use crate::http::params::Params;
use crate::http::request::RequestState;
use crate::http::response::ResponseState;
use crate::lifecycle::RequestContext;
use crate::routing::matcher::UrlRule;

/// What an action produced.
#[derive(Debug)]
pub enum ActionResult {
    /// Serializable payload assigned to the response.
    Data(Value),
    /// A complete response, used verbatim.
    Response(ResponseState),
    /// The action wrote to the context response itself.
    Empty,
}

impl From<Value> for ActionResult {
    fn from(value: Value) -> Self {
        ActionResult::Data(value)
    }
}

impl From<ResponseState> for ActionResult {
    fn from(response: ResponseState) -> Self {
        ActionResult::Response(response)
    }
}

/// Routing/action layer seen by the lifecycle controller.
pub trait Dispatcher: Send + Sync {
    /// Map the request to a route; `NotFound` when nothing matches.
    fn resolve(&self, request: &RequestState) -> Result<(String, Params), BridgeError>;

    /// Run the action behind `route`.
    fn run_action(
        &self,
        ctx: &mut RequestContext,
        route: &str,
        params: &Params,
    ) -> Result<ActionResult, BridgeError>;
}

/// Action callback.
pub type Action =
    Arc<dyn Fn(&mut RequestContext, &Params) -> Result<ActionResult, BridgeError> + Send + Sync>;

/// Default [`Dispatcher`].
#[derive(Clone)]
pub struct Router {
    rules: Vec<UrlRule>,
    actions: HashMap<String, Action>,
    default_route: String,
    normalize_trailing_slash: bool,
}

impl Router {
    pub fn from_config(config: &RoutingConfig, default_route: impl Into<String>) -> Self {
        let rules = config
            .rules
            .iter()
            .map(|rule| UrlRule::new(rule.pattern.clone(), rule.route.clone()))
            .collect::<Vec<_>>();

        tracing::debug!(rules = rules.len(), "Router compiled");

        Self {
            rules,
            actions: HashMap::new(),
            default_route: default_route.into(),
            normalize_trailing_slash: config.normalize_trailing_slash,
        }
    }

    /// Register the action for `route`.
    pub fn action<F>(mut self, route: impl Into<String>, action: F) -> Self
    where
        F: Fn(&mut RequestContext, &Params) -> Result<ActionResult, BridgeError> + Send + Sync + 'static,
    {
        self.actions.insert(route.into(), Arc::new(action));
        self
    }

    pub fn has_action(&self, route: &str) -> bool {
        self.actions.contains_key(route)
    }

    fn with_query(request: &RequestState, mut params: Params) -> Params {
        for (name, value) in request.query_params() {
            params.entry(name.clone()).or_insert_with(|| value.clone());
        }
        params
    }
}

impl Dispatcher for Router {
    fn resolve(&self, request: &RequestState) -> Result<(String, Params), BridgeError> {
        let path = request.path_info();

        if path.is_empty() {
            return Ok((self.default_route.clone(), Self::with_query(request, Params::new())));
        }

        if self.normalize_trailing_slash && path.ends_with('/') {
            // One leading slash only: `//host` would leave the site.
            let trimmed = request
                .uri()
                .path()
                .trim_end_matches('/')
                .trim_start_matches(['/', '\\']);
            let mut location = format!("/{}", trimmed);
            if let Some(query) = request.uri().query() {
                location.push('?');
                location.push_str(query);
            }
            return Err(BridgeError::Redirect {
                location,
                status: StatusCode::MOVED_PERMANENTLY,
            });
        }

        for rule in &self.rules {
            if let Some((route, params)) = rule.matches(path) {
                tracing::trace!(pattern = %rule.pattern(), route = %route, "Rule matched");
                return Ok((route, Self::with_query(request, params)));
            }
        }

        Err(BridgeError::NotFound)
    }

    fn run_action(
        &self,
        ctx: &mut RequestContext,
        route: &str,
        params: &Params,
    ) -> Result<ActionResult, BridgeError> {
        let action = self.actions.get(route).ok_or(BridgeError::NotFound)?;
        action(ctx, params)
    }
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("rules", &self.rules)
            .field("actions", &self.actions.keys().collect::<Vec<_>>())
            .field("default_route", &self.default_route)
            .finish()
    }
}
