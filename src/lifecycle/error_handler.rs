//! Error rendering.
//!
//! # Responsibilities
//! - Turn any [`BridgeError`] into the context response, following the
//!   response format (JSON, HTML, raw)
//! - Hide internal details outside debug mode; log them instead
//! - Optionally render through a configured error route
//! - Fall back to a minimal plain-text 500 when rendering itself fails
//!
//! # Design Decisions
//! - `handle` never fails and never panics on its own
//! - The fallback path uses none of the normal rendering code

use axum::http::{header, HeaderValue, StatusCode};
use serde_json::{json, Value};

use crate::config::AppConfig;
use crate::error::BridgeError;
use crate::http::params::Params;
use crate::http::response::{ResponseFormat, ResponseState};
use crate::lifecycle::context::RequestContext;
use crate::routing::{ActionResult, Dispatcher};

/// Shown to clients instead of internal error details.
pub const GENERIC_MESSAGE: &str = "An internal server error occurred.";

#[derive(Debug, Clone, Default)]
pub struct ErrorHandler {
    debug: bool,
    error_route: Option<String>,
}

impl ErrorHandler {
    pub fn new(debug: bool, error_route: Option<String>) -> Self {
        Self { debug, error_route }
    }

    pub fn from_config(app: &AppConfig) -> Self {
        Self::new(app.debug, app.error_route.clone())
    }

    /// Render `error` into `ctx.response`.
    pub fn handle(&self, error: &BridgeError, ctx: &mut RequestContext, dispatcher: &dyn Dispatcher) {
        log_error(error, ctx);
        if let Err(secondary) = self.render(error, ctx, dispatcher) {
            fallback(error, &secondary, ctx);
        }
    }

    fn message(&self, error: &BridgeError) -> String {
        if self.debug || error.is_user_facing() {
            error.to_string()
        } else {
            GENERIC_MESSAGE.to_string()
        }
    }

    fn render(
        &self,
        error: &BridgeError,
        ctx: &mut RequestContext,
        dispatcher: &dyn Dispatcher,
    ) -> Result<(), BridgeError> {
        ctx.response.reset_for_error();

        if let BridgeError::Redirect { location, status } = error {
            ctx.response.redirect(location, Some(*status))?;
            return Ok(());
        }
        ctx.response.set_status_code(error.status());

        if let Some(route) = &self.error_route {
            if ctx.response.format() == ResponseFormat::Html {
                return self.render_route(route, error, ctx, dispatcher);
            }
        }

        let message = self.message(error);
        let response = &mut ctx.response;
        match response.format() {
            ResponseFormat::Json => {
                let mut data = json!({
                    "name": error.kind(),
                    "message": message,
                    "code": 0,
                    "status": error.status().as_u16(),
                });
                if self.debug {
                    data["type"] = Value::from(variant_name(error));
                    data["causes"] = Value::from(error.chain().into_iter().skip(1).collect::<Vec<_>>());
                }
                response.set_data(data);
            }
            ResponseFormat::Html => {
                let body = if self.debug {
                    format!("<pre>{}</pre>", escape_html(&error.chain().join("\n")))
                } else {
                    format!(
                        "<h1>{}</h1>\n<p>{}</p>",
                        escape_html(error.kind()),
                        escape_html(&message)
                    )
                };
                response.set_data(body);
            }
            ResponseFormat::Raw => {
                response.set_data(message);
            }
        }
        response.finalize()?;
        Ok(())
    }

    fn render_route(
        &self,
        route: &str,
        error: &BridgeError,
        ctx: &mut RequestContext,
        dispatcher: &dyn Dispatcher,
    ) -> Result<(), BridgeError> {
        let mut params = Params::new();
        params.insert("name".into(), Value::from(error.kind()));
        params.insert("message".into(), Value::from(self.message(error)));
        params.insert("status".into(), Value::from(error.status().as_u16()));

        let status = error.status();
        match dispatcher.run_action(ctx, route, &params)? {
            ActionResult::Data(data) => {
                ctx.response.set_data(data);
            }
            ActionResult::Response(mut response) => {
                if !response.is_status_set() {
                    response.set_status_code(status);
                }
                ctx.response = response;
            }
            ActionResult::Empty => {}
        }
        ctx.response.finalize()?;
        Ok(())
    }
}

fn variant_name(error: &BridgeError) -> &'static str {
    match error {
        BridgeError::NotFound => "NotFound",
        BridgeError::Redirect { .. } => "Redirect",
        BridgeError::Http { .. } => "Http",
        BridgeError::BadRequest(_) => "BadRequest",
        BridgeError::Internal { .. } => "Internal",
        BridgeError::Panic(_) => "Panic",
    }
}

fn log_error(error: &BridgeError, ctx: &RequestContext) {
    let status = error.status().as_u16();
    match error {
        BridgeError::NotFound | BridgeError::Redirect { .. } => {
            tracing::debug!(request_id = %ctx.request_id(), status, error = %error, "Request not dispatched");
        }
        BridgeError::Http { .. } | BridgeError::BadRequest(_) => {
            tracing::warn!(request_id = %ctx.request_id(), status, error = %error, "Request failed");
        }
        BridgeError::Internal { .. } | BridgeError::Panic(_) => {
            tracing::error!(
                request_id = %ctx.request_id(),
                status,
                chain = ?error.chain(),
                "Unhandled error"
            );
        }
    }
}

/// Minimal emergency response. Logs both errors with request diagnostics.
fn fallback(original: &BridgeError, secondary: &BridgeError, ctx: &mut RequestContext) {
    tracing::error!(
        request_id = %ctx.request_id(),
        method = %ctx.request.method(),
        uri = %ctx.request.uri(),
        remote = ctx.request.remote_ip().unwrap_or("-"),
        server = ?ctx.request.inbound().server_params(),
        original = ?original.chain(),
        secondary = ?secondary.chain(),
        "Error while handling an error"
    );

    let mut response = ResponseState::with_status(StatusCode::INTERNAL_SERVER_ERROR);
    response
        .set_format(ResponseFormat::Raw)
        .set_header(
            header::CONTENT_TYPE,
            HeaderValue::from_static("text/plain; charset=UTF-8"),
        )
        .set_body(GENERIC_MESSAGE);
    ctx.response = response;
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#039;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BridgeConfig;
    use crate::http::message::InboundMessage;
    use crate::http::request::{RequestSettings, RequestState};
    use crate::lifecycle::events::EventBus;
    use crate::routing::Router;
    use axum::http::Uri;
    use std::sync::Arc;

    fn context() -> RequestContext {
        RequestContext::new(
            RequestState::new(InboundMessage::get(Uri::from_static("/x")), Arc::new(RequestSettings::default())),
            Arc::new(BridgeConfig::default()),
            Arc::new(EventBus::new()),
            None,
        )
    }

    fn router() -> Router {
        Router::from_config(&Default::default(), "site/index")
    }

    #[test]
    fn production_hides_internal_details() {
        let mut ctx = context();
        ctx.response.set_format(ResponseFormat::Json);
        let handler = ErrorHandler::new(false, None);

        handler.handle(&BridgeError::internal("db password is hunter2"), &mut ctx, &router());

        assert_eq!(ctx.response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = String::from_utf8(ctx.response.content().unwrap().to_vec()).unwrap();
        assert!(body.contains(GENERIC_MESSAGE));
        assert!(!body.contains("hunter2"));
        assert!(!body.contains("causes"));
    }

    #[test]
    fn debug_mode_shows_causes() {
        let mut ctx = context();
        ctx.response.set_format(ResponseFormat::Json);
        let handler = ErrorHandler::new(true, None);
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk gone");

        handler.handle(&BridgeError::from_source("write failed", io), &mut ctx, &router());

        let data = ctx.response.data().unwrap();
        assert_eq!(data["type"], json!("Internal"));
        assert_eq!(data["causes"], json!(["disk gone"]));
    }

    #[test]
    fn html_escapes_user_facing_messages() {
        let mut ctx = context();
        let handler = ErrorHandler::new(false, None);
        handler.handle(
            &BridgeError::http(StatusCode::FORBIDDEN, "<script>no</script>"),
            &mut ctx,
            &router(),
        );
        assert_eq!(ctx.response.status(), StatusCode::FORBIDDEN);
        let body = String::from_utf8(ctx.response.content().unwrap().to_vec()).unwrap();
        assert!(body.contains("&lt;script&gt;"));
    }

    #[test]
    fn failing_error_route_falls_back_to_plain_text() {
        let mut ctx = context();
        let router = router().action("site/error", |_ctx, _params| {
            Err(BridgeError::internal("error page broke"))
        });
        let handler = ErrorHandler::new(false, Some("site/error".to_string()));

        handler.handle(&BridgeError::NotFound, &mut ctx, &router);

        assert_eq!(ctx.response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(ctx.response.header("content-type"), Some("text/plain; charset=UTF-8"));
        assert_eq!(ctx.response.content().map(|b| b.as_ref()), Some(GENERIC_MESSAGE.as_bytes()));
    }

    #[test]
    fn error_route_renders_user_facing_errors() {
        let mut ctx = context();
        let router = router().action("site/error", |_ctx, params| {
            Ok(ActionResult::Data(json!(format!(
                "Oops: {}",
                params.get("message").and_then(Value::as_str).unwrap_or_default()
            ))))
        });
        let handler = ErrorHandler::new(false, Some("site/error".to_string()));

        handler.handle(&BridgeError::NotFound, &mut ctx, &router);

        assert_eq!(ctx.response.status(), StatusCode::NOT_FOUND);
        assert_eq!(ctx.response.content().map(|b| b.as_ref()), Some(&b"Oops: Page not found."[..]));
    }

    #[test]
    fn redirect_sets_location() {
        let mut ctx = context();
        ErrorHandler::default().handle(
            &BridgeError::Redirect {
                location: "/site/get".into(),
                status: StatusCode::MOVED_PERMANENTLY,
            },
            &mut ctx,
            &router(),
        );
        assert_eq!(ctx.response.status(), StatusCode::MOVED_PERMANENTLY);
        assert_eq!(ctx.response.header("location"), Some("/site/get"));
    }
}
