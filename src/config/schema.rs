//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the bridge.
//! All types derive Serde traits for deserialization from config files.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration for the worker bridge.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct BridgeConfig {
    /// Application identity and rendering defaults.
    pub app: AppConfig,

    /// Request parsing and cookie integrity.
    pub request: RequestConfig,

    /// Session settings.
    pub session: SessionConfig,

    /// Worker process settings (memory ceiling, worker count).
    pub worker: WorkerConfig,

    /// Ordered chain handler names, run before dispatch.
    pub middleware: Vec<String>,

    /// URL matching rules.
    pub routing: RoutingConfig,

    /// Front server listener.
    pub listener: ListenerConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Application-level settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AppConfig {
    /// Application identifier for logs.
    pub id: String,

    /// Debug mode renders error details to clients.
    pub debug: bool,

    /// Charset appended to textual content types.
    pub charset: String,

    /// Route used when the path info is empty.
    pub default_route: String,

    /// Bootstrap components to run after the context is built.
    pub bootstrap: Vec<String>,

    /// Route rendering user-facing errors as HTML (optional).
    pub error_route: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            id: "worker-bridge".to_string(),
            debug: false,
            charset: "UTF-8".to_string(),
            default_route: "site/index".to_string(),
            bootstrap: Vec::new(),
            error_route: None,
        }
    }
}

/// Body parser selected by content type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ParserKind {
    Json,
    Form,
}

/// Request handling configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RequestConfig {
    /// Verify cookie signatures on read and sign cookies on write.
    pub enable_cookie_validation: bool,

    /// Server-held secret for cookie signatures.
    pub cookie_validation_key: String,

    /// Content type (or `*`) to parser mapping.
    pub parsers: BTreeMap<String, ParserKind>,

    /// Headers whose value marks a connection as secure (e.g. X-Forwarded-Proto = https).
    pub secure_protocol_headers: BTreeMap<String, Vec<String>>,
}

impl Default for RequestConfig {
    fn default() -> Self {
        let mut secure_protocol_headers = BTreeMap::new();
        secure_protocol_headers.insert("x-forwarded-proto".to_string(), vec!["https".to_string()]);
        secure_protocol_headers.insert("front-end-https".to_string(), vec!["on".to_string()]);

        let mut parsers = BTreeMap::new();
        parsers.insert("application/json".to_string(), ParserKind::Json);

        Self {
            enable_cookie_validation: false,
            cookie_validation_key: String::new(),
            parsers,
            secure_protocol_headers,
        }
    }
}

/// Session configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Open a session per request.
    pub enabled: bool,

    /// Cookie carrying the session id.
    pub name: String,

    /// Idle seconds after which a stored session expires.
    pub timeout_secs: u64,
}

impl SessionConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            name: "BRIDGESESSID".to_string(),
            timeout_secs: 1440,
        }
    }
}

/// Worker process configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Memory ceiling with optional K/M/G suffix; `-1` disables recycling.
    pub memory_limit: String,

    /// Number of worker instances behind the front server.
    pub workers: usize,

    /// Maximum accepted request body in bytes.
    pub max_body_bytes: usize,

    /// Request timeout enforced by the front server, in seconds.
    pub request_timeout_secs: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            memory_limit: "128M".to_string(),
            workers: 2,
            max_body_bytes: 2 * 1024 * 1024, // 2MB
            request_timeout_secs: 30,
        }
    }
}

/// A single URL rule.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RuleConfig {
    /// Pattern such as `/<controller>/<action>`.
    pub pattern: String,

    /// Route template such as `<controller>/<action>`.
    pub route: String,
}

/// Routing configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RoutingConfig {
    /// Rules checked in order.
    pub rules: Vec<RuleConfig>,

    /// Redirect `/a/b/` to `/a/b` with 301.
    pub normalize_trailing_slash: bool,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            rules: vec![RuleConfig {
                pattern: "/<controller>/<action>".to_string(),
                route: "<controller>/<action>".to_string(),
            }],
            normalize_trailing_slash: false,
        }
    }
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
