//! Error taxonomy for request handling.
//!
//! # Categories
//! - Not-Found: no route matched, rendered as 404
//! - Redirect: routing asked for a normalised URL, rendered as 3xx + `Location`
//! - Http: user-facing error carrying its own status code
//! - BadRequest: the request body could not be parsed
//! - Internal: anything else, rendered as 500
//! - Panic: a handler or action panicked; treated like Internal
//!
//! Every variant is caught at the lifecycle controller boundary and turned
//! into a response by [`crate::lifecycle::ErrorHandler`].

use axum::http::StatusCode;

/// Boxed source error carried by [`BridgeError::Internal`].
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors raised while handling a single request.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("Page not found.")]
    NotFound,

    #[error("Redirecting to {location}")]
    Redirect { location: String, status: StatusCode },

    #[error("{message}")]
    Http { status: StatusCode, message: String },

    #[error("Invalid request body: {0}")]
    BadRequest(String),

    #[error("{message}")]
    Internal {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    #[error("Handler panicked: {0}")]
    Panic(String),
}

impl BridgeError {
    /// A user-facing error with an explicit status code.
    pub fn http(status: StatusCode, message: impl Into<String>) -> Self {
        BridgeError::Http {
            status,
            message: message.into(),
        }
    }

    /// An internal error without an underlying source.
    pub fn internal(message: impl Into<String>) -> Self {
        BridgeError::Internal {
            message: message.into(),
            source: None,
        }
    }

    /// Wrap any error as an internal failure.
    pub fn from_source(message: impl Into<String>, source: impl Into<BoxError>) -> Self {
        BridgeError::Internal {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// HTTP status this error renders with.
    pub fn status(&self) -> StatusCode {
        match self {
            BridgeError::NotFound => StatusCode::NOT_FOUND,
            BridgeError::Redirect { status, .. } => *status,
            BridgeError::Http { status, .. } => *status,
            BridgeError::BadRequest(_) => StatusCode::BAD_REQUEST,
            BridgeError::Internal { .. } | BridgeError::Panic(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Whether the message is safe to show to clients in production.
    pub fn is_user_facing(&self) -> bool {
        !matches!(self, BridgeError::Internal { .. } | BridgeError::Panic(_))
    }

    /// Short type name used in rendered error payloads.
    pub fn kind(&self) -> &'static str {
        match self {
            BridgeError::NotFound => "Not Found",
            BridgeError::Redirect { .. } => "Redirect",
            BridgeError::Http { status, .. } => status.canonical_reason().unwrap_or("Error"),
            BridgeError::BadRequest(_) => "Bad Request",
            BridgeError::Internal { .. } => "Exception",
            BridgeError::Panic(_) => "Panic",
        }
    }

    /// Messages of the error and every source below it.
    pub fn chain(&self) -> Vec<String> {
        let mut out = vec![self.to_string()];
        let mut current = std::error::Error::source(self);
        while let Some(err) = current {
            out.push(err.to_string());
            current = err.source();
        }
        out
    }
}

impl From<std::io::Error> for BridgeError {
    fn from(err: std::io::Error) -> Self {
        BridgeError::from_source("I/O failure", err)
    }
}

impl From<serde_json::Error> for BridgeError {
    fn from(err: serde_json::Error) -> Self {
        BridgeError::from_source("JSON serialization failed", err)
    }
}
