//! Wire-level request and response messages.
//!
//! # Responsibilities
//! - `InboundMessage`: immutable request as handed over by the transport
//! - `OutboundMessage`: serialized response handed back to the transport
//!
//! # Design Decisions
//! - Inbound messages are never mutated in place; `with_*` methods return a
//!   modified copy, which is how chain handlers forward request changes
//! - Outbound header names are already case-normalized (`Content-Type`)

use std::collections::BTreeMap;
use std::io;

use axum::body::Bytes;
use axum::http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode, Uri};
use serde_json::Value;

use crate::http::params::Params;
use crate::http::stream::FileStream;

/// Immutable inbound request.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
    server_params: BTreeMap<String, String>,
    cookie_params: Vec<(String, String)>,
    query_params: Option<Params>,
    parsed_body: Option<Params>,
    attributes: BTreeMap<String, Value>,
}

impl InboundMessage {
    pub fn new(method: Method, uri: Uri) -> Self {
        Self {
            method,
            uri,
            headers: HeaderMap::new(),
            body: Bytes::new(),
            server_params: BTreeMap::new(),
            cookie_params: Vec::new(),
            query_params: None,
            parsed_body: None,
            attributes: BTreeMap::new(),
        }
    }

    /// Convenience constructor for a GET request.
    pub fn get(uri: Uri) -> Self {
        Self::new(Method::GET, uri)
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// First value of a header, if it is valid UTF-8.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn server_params(&self) -> &BTreeMap<String, String> {
        &self.server_params
    }

    pub fn server_param(&self, name: &str) -> Option<&str> {
        self.server_params.get(name).map(String::as_str)
    }

    pub fn cookie_params(&self) -> &[(String, String)] {
        &self.cookie_params
    }

    pub fn cookie_param(&self, name: &str) -> Option<&str> {
        self.cookie_params
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Query parameters set explicitly by the transport or a handler.
    pub fn query_params(&self) -> Option<&Params> {
        self.query_params.as_ref()
    }

    /// Body parameters pre-parsed by the transport (form posts).
    pub fn parsed_body(&self) -> Option<&Params> {
        self.parsed_body.as_ref()
    }

    pub fn attributes(&self) -> &BTreeMap<String, Value> {
        &self.attributes
    }

    pub fn attribute(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name)
    }

    pub fn with_method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    pub fn with_uri(mut self, uri: Uri) -> Self {
        self.uri = uri;
        self
    }

    /// Replace every value of `name`.
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Append a value to `name`.
    pub fn with_added_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }

    pub fn without_header(mut self, name: &str) -> Self {
        self.headers.remove(name);
        self
    }

    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub fn with_server_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.server_params.insert(name.into(), value.into());
        self
    }

    pub fn with_cookie_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let name = name.into();
        let value = value.into();
        match self.cookie_params.iter_mut().find(|(k, _)| *k == name) {
            Some(entry) => entry.1 = value,
            None => self.cookie_params.push((name, value)),
        }
        self
    }

    pub fn with_cookie_params(mut self, cookies: Vec<(String, String)>) -> Self {
        self.cookie_params = cookies;
        self
    }

    pub fn with_query_params(mut self, params: Params) -> Self {
        self.query_params = Some(params);
        self
    }

    pub fn with_parsed_body(mut self, params: Params) -> Self {
        self.parsed_body = Some(params);
        self
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    pub fn without_attribute(mut self, name: &str) -> Self {
        self.attributes.remove(name);
        self
    }
}

/// Outbound body.
#[derive(Debug, Clone)]
pub enum OutboundBody {
    Bytes(Bytes),
    File(FileStream),
}

impl OutboundBody {
    /// Materialize the whole body.
    pub fn to_bytes(&self) -> io::Result<Bytes> {
        match self {
            OutboundBody::Bytes(b) => Ok(b.clone()),
            OutboundBody::File(stream) => stream.read_all().map(Bytes::from),
        }
    }
}

/// Serialized response ready for the transport.
#[derive(Debug, Clone)]
pub struct OutboundMessage {
    pub status: StatusCode,
    pub headers: Vec<(String, String)>,
    pub body: OutboundBody,
}

impl OutboundMessage {
    /// Minimal plain-text response, used when normal rendering is unavailable.
    pub fn plain(status: StatusCode, text: impl Into<String>) -> Self {
        Self {
            status,
            headers: vec![(
                "Content-Type".to_string(),
                "text/plain; charset=UTF-8".to_string(),
            )],
            body: OutboundBody::Bytes(Bytes::from(text.into())),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// First header value, matched case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn header_values(&self, name: &str) -> Vec<&str> {
        self.headers
            .iter()
            .filter(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
            .collect()
    }

    /// Body as UTF-8 text (lossy).
    pub fn body_text(&self) -> io::Result<String> {
        let bytes = self.body.to_bytes()?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}
