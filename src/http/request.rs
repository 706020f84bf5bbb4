//! Per-request view over the inbound message.
//!
//! # Responsibilities
//! - Lazily derive headers, query/body params, raw body, cookies, path info
//!   and basic-auth credentials from the current [`InboundMessage`]
//! - Accept a replacement message from the middleware chain and drop every
//!   derived value with it
//!
//! # Design Decisions
//! - Every derived value is memoized in a `OnceCell`; repeated calls return
//!   the same cached value until `replace_inbound`
//! - `replace_inbound` resets all caches in one place (`invalidate`), so a
//!   new derived field only has to be added there to be covered
//! - Forged cookies and malformed credentials are dropped, never raised

use std::cell::OnceCell;
use std::collections::BTreeMap;
use std::sync::Arc;

use axum::http::{header, Method, Uri};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::Serialize;
use serde_json::Value;

use crate::config::{Aliases, RequestConfig};
use crate::error::BridgeError;
use crate::http::cookie::{Cookie, CookieJar};
use crate::http::message::InboundMessage;
use crate::http::params::{parse_query, Params};
use crate::http::parsers::{media_type, parse_body, ParserSet};
use crate::security::CookieSigner;

/// Request handling settings derived once from configuration.
#[derive(Debug, Clone, Default)]
pub struct RequestSettings {
    parsers: ParserSet,
    signer: Option<CookieSigner>,
    secure_protocol_headers: BTreeMap<String, Vec<String>>,
    base_url: String,
}

impl RequestSettings {
    pub fn from_config(config: &RequestConfig, aliases: &Aliases) -> Self {
        let signer = config
            .enable_cookie_validation
            .then(|| CookieSigner::new(&config.cookie_validation_key));

        Self {
            parsers: ParserSet::new(&config.parsers),
            signer,
            secure_protocol_headers: config
                .secure_protocol_headers
                .iter()
                .map(|(k, v)| (k.to_ascii_lowercase(), v.clone()))
                .collect(),
            base_url: aliases.web.clone(),
        }
    }

    /// Signer used for cookie integrity, when enabled.
    pub fn signer(&self) -> Option<&CookieSigner> {
        self.signer.as_ref()
    }
}

/// Authenticated principal attached by a chain stage.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Identity {
    pub id: String,
    pub claims: Value,
}

/// Lowercased, multi-valued header view.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Headers {
    entries: BTreeMap<String, Vec<String>>,
}

impl Headers {
    fn from_message(message: &InboundMessage) -> Self {
        let mut entries: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for (name, value) in message.headers() {
            entries
                .entry(name.as_str().to_string())
                .or_default()
                .push(String::from_utf8_lossy(value.as_bytes()).into_owned());
        }
        Self { entries }
    }

    /// First value of `name` (case-insensitive).
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .get(&name.to_ascii_lowercase())
            .and_then(|v| v.first())
            .map(String::as_str)
    }

    pub fn get_all(&self, name: &str) -> &[String] {
        self.entries
            .get(&name.to_ascii_lowercase())
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn has(&self, name: &str) -> bool {
        self.entries.contains_key(&name.to_ascii_lowercase())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Vec<String>)> {
        self.entries.iter()
    }
}

/// Basic-auth username/password pair; both `None` when absent or malformed.
pub type Credentials = (Option<String>, Option<String>);

/// Parse an `Authorization: Basic ...` header value.
pub fn parse_basic_auth(value: &str) -> Credentials {
    let parsed = (|| {
        let (scheme, payload) = value.trim().split_once(' ')?;
        if !scheme.eq_ignore_ascii_case("basic") {
            return None;
        }
        let decoded = STANDARD.decode(payload.trim()).ok()?;
        let decoded = String::from_utf8(decoded).ok()?;
        let (user, password) = decoded.split_once(':')?;
        Some((user.to_string(), password.to_string()))
    })();

    match parsed {
        Some((user, password)) => (Some(user), Some(password)),
        None => (None, None),
    }
}

/// Mutable per-request wrapper around the current inbound message.
#[derive(Debug)]
pub struct RequestState {
    inbound: InboundMessage,
    settings: Arc<RequestSettings>,
    headers: OnceCell<Headers>,
    query_params: OnceCell<Params>,
    body_params: OnceCell<Params>,
    raw_body: OnceCell<String>,
    cookies: OnceCell<CookieJar>,
    path_info: OnceCell<String>,
    credentials: OnceCell<Credentials>,
    resolved: Option<(String, Params)>,
    identity: Option<Identity>,
}

impl RequestState {
    pub fn new(inbound: InboundMessage, settings: Arc<RequestSettings>) -> Self {
        Self {
            inbound,
            settings,
            headers: OnceCell::new(),
            query_params: OnceCell::new(),
            body_params: OnceCell::new(),
            raw_body: OnceCell::new(),
            cookies: OnceCell::new(),
            path_info: OnceCell::new(),
            credentials: OnceCell::new(),
            resolved: None,
            identity: None,
        }
    }

    /// The message every accessor currently derives from.
    pub fn inbound(&self) -> &InboundMessage {
        &self.inbound
    }

    /// Swap in a new inbound message and drop every derived value.
    pub fn replace_inbound(&mut self, inbound: InboundMessage) {
        self.inbound = inbound;
        self.invalidate();
    }

    fn invalidate(&mut self) {
        self.headers.take();
        self.query_params.take();
        self.body_params.take();
        self.raw_body.take();
        self.cookies.take();
        self.path_info.take();
        self.credentials.take();
        self.resolved = None;
    }

    pub fn method(&self) -> &Method {
        self.inbound.method()
    }

    pub fn uri(&self) -> &Uri {
        self.inbound.uri()
    }

    /// Raw query string without the leading `?`.
    pub fn query_string(&self) -> &str {
        self.inbound.uri().query().unwrap_or_default()
    }

    pub fn headers(&self) -> &Headers {
        self.headers
            .get_or_init(|| Headers::from_message(&self.inbound))
    }

    pub fn query_params(&self) -> &Params {
        self.query_params.get_or_init(|| match self.inbound.query_params() {
            Some(explicit) => explicit.clone(),
            None => parse_query(self.query_string()),
        })
    }

    /// Single query parameter.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.query_params().get(name)
    }

    pub fn raw_body(&self) -> &str {
        self.raw_body
            .get_or_init(|| String::from_utf8_lossy(self.inbound.body()).into_owned())
    }

    /// Body parameters, parsed according to the content type.
    pub fn body_params(&self) -> Result<&Params, BridgeError> {
        if let Some(params) = self.body_params.get() {
            return Ok(params);
        }
        let params = self.parse_body_params()?;
        Ok(self.body_params.get_or_init(|| params))
    }

    /// Single body parameter; parse failures read as absent.
    pub fn post(&self, name: &str) -> Option<&Value> {
        self.body_params().ok()?.get(name)
    }

    fn parse_body_params(&self) -> Result<Params, BridgeError> {
        let content_type = media_type(self.headers().get(header::CONTENT_TYPE.as_str()).unwrap_or_default());

        if let Some(kind) = self.settings.parsers.select(&content_type) {
            return parse_body(kind, self.raw_body());
        }

        if self.method() == Method::POST {
            return Ok(self.inbound.parsed_body().cloned().unwrap_or_default());
        }

        if content_type.is_empty() || content_type == "application/x-www-form-urlencoded" {
            return Ok(parse_query(self.raw_body()));
        }

        Ok(Params::new())
    }

    /// Request cookies; with validation enabled, only correctly signed ones.
    pub fn cookies(&self) -> &CookieJar {
        self.cookies.get_or_init(|| {
            let mut jar = CookieJar::new();
            for (name, value) in self.inbound.cookie_params() {
                let value = match self.settings.signer() {
                    Some(signer) => match signer.verify(name, value) {
                        Some(v) => v,
                        None => continue,
                    },
                    None => value.clone(),
                };
                jar.add(Cookie::new(name.as_str(), value));
            }
            jar
        })
    }

    /// Attribute set by the transport or a chain handler.
    pub fn attribute(&self, name: &str, default: Value) -> Value {
        self.inbound.attribute(name).cloned().unwrap_or(default)
    }

    /// Basic-auth credentials from the `Authorization` header.
    pub fn auth_credentials(&self) -> &Credentials {
        self.credentials.get_or_init(|| {
            self.headers()
                .get(header::AUTHORIZATION.as_str())
                .map(parse_basic_auth)
                .unwrap_or((None, None))
        })
    }

    pub fn auth_user(&self) -> Option<&str> {
        self.auth_credentials().0.as_deref()
    }

    pub fn auth_password(&self) -> Option<&str> {
        self.auth_credentials().1.as_deref()
    }

    /// Decoded path relative to the base URL, without the leading slash.
    pub fn path_info(&self) -> &str {
        self.path_info.get_or_init(|| {
            let decoded = percent_encoding::percent_decode_str(self.inbound.uri().path())
                .decode_utf8_lossy()
                .into_owned();
            let base = self.settings.base_url.as_str();
            let relative = if !base.is_empty() && decoded.starts_with(base) {
                &decoded[base.len()..]
            } else {
                decoded.as_str()
            };
            relative.strip_prefix('/').unwrap_or(relative).to_string()
        })
    }

    /// HTTPS scheme, `HTTPS=on`, or a configured forwarded-protocol header.
    pub fn is_secure_connection(&self) -> bool {
        if self.inbound.uri().scheme_str() == Some("https") {
            return true;
        }
        if self
            .inbound
            .server_param("HTTPS")
            .is_some_and(|v| v.eq_ignore_ascii_case("on"))
        {
            return true;
        }
        self.settings
            .secure_protocol_headers
            .iter()
            .any(|(name, values)| match self.headers().get(name) {
                Some(actual) => values.iter().any(|v| v.eq_ignore_ascii_case(actual)),
                None => false,
            })
    }

    /// Host name from the URI, the `Host` header or `SERVER_NAME`.
    pub fn host_name(&self) -> Option<&str> {
        if let Some(host) = self.inbound.uri().host() {
            return Some(host);
        }
        if let Some(host) = self.headers().get(header::HOST.as_str()) {
            return host.split(':').next();
        }
        self.inbound.server_param("SERVER_NAME")
    }

    pub fn remote_ip(&self) -> Option<&str> {
        self.inbound.server_param("REMOTE_ADDR")
    }

    /// Route and parameters recorded by the dispatcher.
    pub fn resolved(&self) -> Option<&(String, Params)> {
        self.resolved.as_ref()
    }

    pub fn set_resolved(&mut self, route: String, params: Params) {
        self.resolved = Some((route, params));
    }

    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    pub fn set_identity(&mut self, identity: Identity) {
        self.identity = Some(identity);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderName, HeaderValue};
    use serde_json::json;

    fn state(message: InboundMessage) -> RequestState {
        RequestState::new(message, Arc::new(RequestSettings::from_config(&RequestConfig::default(), &Aliases::default())))
    }

    fn with_content_type(message: InboundMessage, value: &'static str) -> InboundMessage {
        message.with_header(header::CONTENT_TYPE, HeaderValue::from_static(value))
    }

    #[test]
    fn accessors_are_memoized() {
        let req = state(
            InboundMessage::get(Uri::from_static("/site/get?foo=bar"))
                .with_header(HeaderName::from_static("x-a"), HeaderValue::from_static("1"))
                .with_cookie_param("c", "v"),
        );

        assert!(std::ptr::eq(req.headers(), req.headers()));
        assert!(std::ptr::eq(req.query_params(), req.query_params()));
        assert!(std::ptr::eq(req.cookies(), req.cookies()));
        assert!(std::ptr::eq(req.body_params().unwrap(), req.body_params().unwrap()));
        assert!(std::ptr::eq(req.raw_body(), req.raw_body()));
        assert_eq!(req.headers().get("X-A"), Some("1"));
    }

    #[test]
    fn replace_inbound_invalidates_everything() {
        let first = with_content_type(
            InboundMessage::new(Method::PUT, Uri::from_static("/a?x=1"))
                .with_header(HeaderName::from_static("x-a"), HeaderValue::from_static("old"))
                .with_cookie_param("c", "old")
                .with_body(r#"{"k":"old"}"#),
            "application/json",
        );
        let mut req = state(first);
        req.set_resolved("site/a".into(), Params::new());

        assert_eq!(req.headers().get("x-a"), Some("old"));
        assert_eq!(req.query_params().get("x"), Some(&json!("1")));
        assert_eq!(req.body_params().unwrap().get("k"), Some(&json!("old")));
        assert_eq!(req.cookies().value("c"), Some("old"));
        assert_eq!(req.path_info(), "a");

        let second = with_content_type(
            InboundMessage::new(Method::PUT, Uri::from_static("/b?x=2"))
                .with_header(HeaderName::from_static("x-a"), HeaderValue::from_static("new"))
                .with_cookie_param("c", "new")
                .with_body(r#"{"k":"new"}"#),
            "application/json",
        );
        req.replace_inbound(second);

        assert_eq!(req.headers().get("x-a"), Some("new"));
        assert_eq!(req.query_params().get("x"), Some(&json!("2")));
        assert_eq!(req.body_params().unwrap().get("k"), Some(&json!("new")));
        assert_eq!(req.raw_body(), r#"{"k":"new"}"#);
        assert_eq!(req.cookies().value("c"), Some("new"));
        assert_eq!(req.path_info(), "b");
        assert!(req.resolved().is_none());
    }

    #[test]
    fn body_parser_selection() {
        // Unknown content type, non-POST: empty.
        let req = state(with_content_type(
            InboundMessage::new(Method::PUT, Uri::from_static("/")).with_body("<x/>"),
            "application/xml",
        ));
        assert!(req.body_params().unwrap().is_empty());

        // POST without a parser: transport's pre-parsed form.
        let mut form = Params::new();
        form.insert("foo".into(), json!("bar"));
        let req = state(with_content_type(
            InboundMessage::new(Method::POST, Uri::from_static("/"))
                .with_body("foo=bar")
                .with_parsed_body(form.clone()),
            "application/x-www-form-urlencoded",
        ));
        assert_eq!(req.body_params().unwrap(), &form);

        // Non-POST form body: generic query decode.
        let req = state(with_content_type(
            InboundMessage::new(Method::PATCH, Uri::from_static("/")).with_body("a%5Bb%5D=c"),
            "application/x-www-form-urlencoded",
        ));
        assert_eq!(req.post("a"), Some(&json!({"b": "c"})));

        // Invalid JSON is a bad request.
        let req = state(with_content_type(
            InboundMessage::new(Method::POST, Uri::from_static("/")).with_body("{"),
            "application/json; charset=UTF-8",
        ));
        assert!(matches!(req.body_params(), Err(BridgeError::BadRequest(_))));
    }

    #[test]
    fn basic_auth_parsing() {
        assert_eq!(
            parse_basic_auth("Basic Zm9vOmJhcg=="),
            (Some("foo".to_string()), Some("bar".to_string()))
        );
        assert_eq!(parse_basic_auth("Basic foo:bar"), (None, None));
        assert_eq!(parse_basic_auth("Bearer Zm9vOmJhcg=="), (None, None));
        assert_eq!(parse_basic_auth("Basic Zm9v"), (None, None));
        assert_eq!(parse_basic_auth("Basic"), (None, None));
        // Only the first colon splits.
        assert_eq!(
            parse_basic_auth("basic dTpwOnE="),
            (Some("u".to_string()), Some("p:q".to_string()))
        );
    }

    #[test]
    fn credentials_from_header() {
        let req = state(InboundMessage::get(Uri::from_static("/")).with_header(
            header::AUTHORIZATION,
            HeaderValue::from_static("Basic Zm9vOmJhcg=="),
        ));
        assert_eq!(req.auth_user(), Some("foo"));
        assert_eq!(req.auth_password(), Some("bar"));
    }

    #[test]
    fn signed_cookies_drop_forgeries() {
        let config = RequestConfig {
            enable_cookie_validation: true,
            cookie_validation_key: "k".into(),
            ..RequestConfig::default()
        };
        let settings = Arc::new(RequestSettings::from_config(&config, &Aliases::default()));
        let signed = CookieSigner::new("k").sign("good", "yes");

        let req = RequestState::new(
            InboundMessage::get(Uri::from_static("/"))
                .with_cookie_param("good", signed)
                .with_cookie_param("bad", "plain"),
            settings,
        );
        assert_eq!(req.cookies().value("good"), Some("yes"));
        assert!(!req.cookies().has("bad"));
    }

    #[test]
    fn path_info_strips_base_url() {
        let aliases = Aliases {
            webroot: String::new(),
            web: "/app".into(),
        };
        let settings = Arc::new(RequestSettings::from_config(&RequestConfig::default(), &aliases));
        let req = RequestState::new(InboundMessage::get(Uri::from_static("/app/site/hello%20world")), settings);
        assert_eq!(req.path_info(), "site/hello world");
    }

    #[test]
    fn secure_connection_detection() {
        let req = state(InboundMessage::get(Uri::from_static("/")).with_header(
            HeaderName::from_static("x-forwarded-proto"),
            HeaderValue::from_static("HTTPS"),
        ));
        assert!(req.is_secure_connection());

        let req = state(InboundMessage::get(Uri::from_static("/")));
        assert!(!req.is_secure_connection());
    }
}
