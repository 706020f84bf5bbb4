//! URL rule matching.
//!
//! # Responsibilities
//! - Compile a pattern such as `/<controller>/<action>` into segments
//! - Match a path (relative to the base URL, no leading slash) and capture
//!   the named segments
//! - Substitute captured names into the rule's route template
//!
//! # Design Decisions
//! - Segment-wise comparison, no regex
//! - Placeholders match exactly one non-empty segment
//! - Captured names used in the route template are not passed on as
//!   parameters

use serde_json::Value;

use crate::http::params::Params;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Param(String),
}

/// A compiled URL rule.
#[derive(Debug, Clone)]
pub struct UrlRule {
    pattern: String,
    route: String,
    segments: Vec<Segment>,
}

impl UrlRule {
    pub fn new(pattern: impl Into<String>, route: impl Into<String>) -> Self {
        let pattern = pattern.into();
        let segments = pattern
            .trim_matches('/')
            .split('/')
            .filter(|s| !s.is_empty())
            .map(|s| match s.strip_prefix('<').and_then(|s| s.strip_suffix('>')) {
                Some(name) => Segment::Param(name.to_string()),
                None => Segment::Literal(s.to_string()),
            })
            .collect();

        Self {
            pattern,
            route: route.into(),
            segments,
        }
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Match `path` and return the concrete route and captured parameters.
    pub fn matches(&self, path: &str) -> Option<(String, Params)> {
        let parts: Vec<&str> = path.trim_matches('/').split('/').filter(|s| !s.is_empty()).collect();
        if parts.len() != self.segments.len() {
            return None;
        }

        let mut captured = Vec::new();
        for (segment, part) in self.segments.iter().zip(parts) {
            match segment {
                Segment::Literal(lit) if lit == part => {}
                Segment::Literal(_) => return None,
                Segment::Param(name) => captured.push((name.as_str(), part)),
            }
        }

        let mut route = self.route.clone();
        let mut params = Params::new();
        for (name, value) in captured {
            let placeholder = format!("<{}>", name);
            if route.contains(&placeholder) {
                route = route.replace(&placeholder, value);
            } else {
                params.insert(name.to_string(), Value::String(value.to_string()));
            }
        }
        Some((route, params))
    }
}
