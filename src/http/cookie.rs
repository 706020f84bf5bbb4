//! Cookies and cookie collections.
//!
//! # Responsibilities
//! - Model a cookie with its attributes (expiry, path, domain, flags)
//! - Parse the inbound `Cookie` header into name/value pairs
//! - Serialize outbound cookies as `Set-Cookie` lines
//!
//! # Design Decisions
//! - New cookies default to `Path=/`, `HttpOnly` and `SameSite=Lax`
//! - An expiry of `1` marks a deletion; such cookies are never signed
//! - Collections keep insertion order and replace by name

use chrono::DateTime;
use serde::{Deserialize, Serialize};

/// Expiry value used to delete a cookie on the client.
pub const EXPIRE_DELETE: i64 = 1;

/// `SameSite` cookie attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SameSite {
    Strict,
    Lax,
    None,
}

impl SameSite {
    pub fn as_str(&self) -> &'static str {
        match self {
            SameSite::Strict => "Strict",
            SameSite::Lax => "Lax",
            SameSite::None => "None",
        }
    }
}

/// A single cookie.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cookie {
    pub name: String,
    pub value: String,
    pub domain: String,
    /// Unix timestamp; `None` is a session cookie.
    pub expire: Option<i64>,
    pub path: String,
    pub secure: bool,
    pub http_only: bool,
    pub same_site: Option<SameSite>,
}

impl Cookie {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            domain: String::new(),
            expire: None,
            path: "/".to_string(),
            secure: false,
            http_only: true,
            same_site: Some(SameSite::Lax),
        }
    }

    pub fn http_only(mut self, http_only: bool) -> Self {
        self.http_only = http_only;
        self
    }

    pub fn secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    pub fn domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = domain.into();
        self
    }

    pub fn expire(mut self, timestamp: i64) -> Self {
        self.expire = Some(timestamp);
        self
    }

    pub fn same_site(mut self, same_site: Option<SameSite>) -> Self {
        self.same_site = same_site;
        self
    }

    /// A cookie that instructs the client to drop `name`.
    pub fn removal(name: impl Into<String>) -> Self {
        Self::new(name, "").expire(EXPIRE_DELETE)
    }

    pub fn is_removal(&self) -> bool {
        self.expire == Some(EXPIRE_DELETE)
    }

    /// Render as a `Set-Cookie` header value using `value` as the payload.
    pub fn to_header_value(&self, value: &str) -> String {
        let mut out = format!("{}={}", self.name, value);

        if let Some(ts) = self.expire {
            match DateTime::from_timestamp(ts, 0) {
                Some(at) => {
                    out.push_str("; Expires=");
                    out.push_str(&at.format("%a, %d %b %Y %H:%M:%S GMT").to_string());
                }
                None => tracing::warn!(cookie = %self.name, expire = ts, "Cookie expiry out of range, omitted"),
            }
        }
        if !self.path.is_empty() {
            out.push_str("; Path=");
            out.push_str(&self.path);
        }
        if !self.domain.is_empty() {
            out.push_str("; Domain=");
            out.push_str(&self.domain);
        }
        if self.secure {
            out.push_str("; Secure");
        }
        if self.http_only {
            out.push_str("; HttpOnly");
        }
        if let Some(same_site) = self.same_site {
            out.push_str("; SameSite=");
            out.push_str(same_site.as_str());
        }
        out
    }
}

/// Ordered cookie collection keyed by name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CookieJar {
    cookies: Vec<Cookie>,
}

impl CookieJar {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace by name.
    pub fn add(&mut self, cookie: Cookie) {
        match self.cookies.iter_mut().find(|c| c.name == cookie.name) {
            Some(existing) => *existing = cookie,
            None => self.cookies.push(cookie),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Cookie> {
        self.cookies.iter().find(|c| c.name == name)
    }

    pub fn value(&self, name: &str) -> Option<&str> {
        self.get(name).map(|c| c.value.as_str())
    }

    pub fn has(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn remove(&mut self, name: &str) -> Option<Cookie> {
        let pos = self.cookies.iter().position(|c| c.name == name)?;
        Some(self.cookies.remove(pos))
    }

    pub fn len(&self) -> usize {
        self.cookies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Cookie> {
        self.cookies.iter()
    }
}

impl Serialize for CookieJar {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeMap;
        let mut map = serializer.serialize_map(Some(self.cookies.len()))?;
        for cookie in &self.cookies {
            map.serialize_entry(&cookie.name, cookie)?;
        }
        map.end()
    }
}

/// Split a `Cookie` request header into name/value pairs.
pub fn parse_cookie_header(header: &str) -> Vec<(String, String)> {
    header
        .split(';')
        .filter_map(|part| {
            let (name, value) = part.trim().split_once('=')?;
            let name = name.trim();
            if name.is_empty() {
                return None;
            }
            let value = value.trim().trim_matches('"');
            Some((name.to_string(), value.to_string()))
        })
        .collect()
}
