//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Memory limit must parse
//! - Cookie validation requires a secret
//! - Middleware names unique, URL patterns rooted
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: BridgeConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;

use crate::config::schema::BridgeConfig;
use crate::lifecycle::memory::MemoryLimit;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Check a parsed configuration for semantic errors.
pub fn validate_config(config: &BridgeConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if let Err(e) = MemoryLimit::parse(&config.worker.memory_limit) {
        errors.push(ValidationError::new("worker.memory_limit", e.to_string()));
    }

    if config.worker.workers == 0 {
        errors.push(ValidationError::new("worker.workers", "must be at least 1"));
    }

    if config.request.enable_cookie_validation && config.request.cookie_validation_key.is_empty() {
        errors.push(ValidationError::new(
            "request.cookie_validation_key",
            "must be configured with a secret key when cookie validation is enabled",
        ));
    }

    let mut seen = HashSet::new();
    for name in &config.middleware {
        if !seen.insert(name.as_str()) {
            errors.push(ValidationError::new(
                "middleware",
                format!("handler '{}' listed more than once", name),
            ));
        }
    }

    for (i, rule) in config.routing.rules.iter().enumerate() {
        if !rule.pattern.starts_with('/') {
            errors.push(ValidationError::new(
                format!("routing.rules[{}].pattern", i),
                "must start with '/'",
            ));
        }
    }

    if config.session.enabled && config.session.name.is_empty() {
        errors.push(ValidationError::new("session.name", "must not be empty"));
    }

    if config.session.enabled && config.session.timeout_secs == 0 {
        errors.push(ValidationError::new("session.timeout_secs", "must be at least 1"));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
