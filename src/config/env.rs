//! Environment-supplied path aliases.
//!
//! Missing variables are tolerated and read as empty strings.

/// Variable holding the filesystem web root.
pub const WEBROOT_VAR: &str = "WORKER_ALIAS_WEBROOT";

/// Variable holding the public base URL.
pub const WEB_VAR: &str = "WORKER_ALIAS_WEB";

/// Base URL / webroot aliases read once at startup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Aliases {
    pub webroot: String,
    pub web: String,
}

impl Aliases {
    /// Read aliases from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read aliases through an arbitrary lookup (used by tests).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            webroot: lookup(WEBROOT_VAR).unwrap_or_default(),
            web: lookup(WEB_VAR)
                .map(|v| v.trim_end_matches('/').to_string())
                .unwrap_or_default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_variables_are_empty() {
        let aliases = Aliases::from_lookup(|_| None);
        assert_eq!(aliases, Aliases::default());
    }

    #[test]
    fn web_alias_loses_trailing_slash() {
        let aliases = Aliases::from_lookup(|key| match key {
            WEB_VAR => Some("/app/".to_string()),
            WEBROOT_VAR => Some("/srv/www".to_string()),
            _ => None,
        });
        assert_eq!(aliases.web, "/app");
        assert_eq!(aliases.webroot, "/srv/www");
    }
}
