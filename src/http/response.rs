//! Per-request response buffer.
//!
//! # Responsibilities
//! - Collect status, headers, cookies and body for one request
//! - Serialize the payload according to the response format, exactly once
//! - Wrap file downloads in a re-readable stream
//!
//! # Design Decisions
//! - An unset status goes out as 200
//! - `finalize` is idempotent; `reset_for_error` is the only way to
//!   re-render after it ran
//! - Conversion to the wire (see `http::adapter`) marks the response sent;
//!   a second conversion is refused and later mutations are ignored with a
//!   warning (fallible mutators return an error instead)

use std::fs::File;
use std::path::Path;

use axum::body::Bytes;
use axum::http::header::{self, HeaderMap, HeaderName, HeaderValue};
use axum::http::StatusCode;
use serde_json::Value;

use crate::error::BridgeError;
use crate::http::cookie::{Cookie, CookieJar};
use crate::http::stream::FileStream;

/// How the payload is serialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResponseFormat {
    #[default]
    Html,
    Json,
    Raw,
}

/// Options for file responses.
#[derive(Debug, Clone, Default)]
pub struct SendFileOptions {
    /// Defaults to `application/octet-stream`.
    pub mime_type: Option<String>,
    /// `inline` instead of `attachment` disposition.
    pub inline: bool,
}

/// Mutable response for a single request.
#[derive(Debug, Clone)]
pub struct ResponseState {
    status: Option<StatusCode>,
    headers: HeaderMap,
    cookies: CookieJar,
    format: ResponseFormat,
    charset: String,
    data: Option<Value>,
    content: Option<Bytes>,
    stream: Option<FileStream>,
    prepared: bool,
    sent: bool,
}

impl Default for ResponseState {
    fn default() -> Self {
        Self::new()
    }
}

impl ResponseState {
    pub fn new() -> Self {
        Self {
            status: None,
            headers: HeaderMap::new(),
            cookies: CookieJar::new(),
            format: ResponseFormat::default(),
            charset: "UTF-8".to_string(),
            data: None,
            content: None,
            stream: None,
            prepared: false,
            sent: false,
        }
    }

    /// Response with the given status and no body.
    pub fn with_status(status: StatusCode) -> Self {
        let mut response = Self::new();
        response.status = Some(status);
        response
    }

    pub fn set_charset(&mut self, charset: impl Into<String>) -> &mut Self {
        self.charset = charset.into();
        self
    }

    /// Effective status (200 when unset).
    pub fn status(&self) -> StatusCode {
        self.status.unwrap_or(StatusCode::OK)
    }

    pub fn is_status_set(&self) -> bool {
        self.status.is_some()
    }

    /// Set a numeric status; only 100-599 are accepted.
    pub fn set_status(&mut self, code: u16) -> Result<&mut Self, BridgeError> {
        self.ensure_unsent()?;
        if !(100..600).contains(&code) {
            return Err(BridgeError::internal(format!("The HTTP status code is invalid: {}", code)));
        }
        let status = StatusCode::from_u16(code)
            .map_err(|e| BridgeError::from_source("The HTTP status code is invalid", e))?;
        self.status = Some(status);
        Ok(self)
    }

    pub fn set_status_code(&mut self, status: StatusCode) -> &mut Self {
        if !self.writable("set_status_code") {
            return self;
        }
        self.status = Some(status);
        self
    }

    /// Back to "unset".
    pub fn clear_status(&mut self) -> &mut Self {
        if !self.writable("clear_status") {
            return self;
        }
        self.status = None;
        self
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Replace every value of `name`.
    pub fn set_header(&mut self, name: HeaderName, value: HeaderValue) -> &mut Self {
        if !self.writable("set_header") {
            return self;
        }
        self.headers.insert(name, value);
        self
    }

    /// Append a value to `name`.
    pub fn add_header(&mut self, name: HeaderName, value: HeaderValue) -> &mut Self {
        if !self.writable("add_header") {
            return self;
        }
        self.headers.append(name, value);
        self
    }

    pub fn remove_header(&mut self, name: &str) -> &mut Self {
        if !self.writable("remove_header") {
            return self;
        }
        self.headers.remove(name);
        self
    }

    pub fn format(&self) -> ResponseFormat {
        self.format
    }

    pub fn set_format(&mut self, format: ResponseFormat) -> &mut Self {
        if !self.writable("set_format") {
            return self;
        }
        self.format = format;
        self
    }

    pub fn data(&self) -> Option<&Value> {
        self.data.as_ref()
    }

    /// Serializable payload, rendered by `finalize`.
    pub fn set_data(&mut self, data: impl Into<Value>) -> &mut Self {
        if !self.writable("set_data") {
            return self;
        }
        self.data = Some(data.into());
        self
    }

    pub fn content(&self) -> Option<&Bytes> {
        self.content.as_ref()
    }

    /// Pre-serialized body; bypasses format rendering when no data is set.
    pub fn set_body(&mut self, body: impl Into<Bytes>) -> &mut Self {
        if !self.writable("set_body") {
            return self;
        }
        self.content = Some(body.into());
        self
    }

    pub fn stream(&self) -> Option<&FileStream> {
        self.stream.as_ref()
    }

    pub fn cookies(&self) -> &CookieJar {
        &self.cookies
    }

    /// Direct jar access; unlike `add_cookie` this is not checked against `is_sent`.
    pub fn cookies_mut(&mut self) -> &mut CookieJar {
        &mut self.cookies
    }

    pub fn add_cookie(&mut self, cookie: Cookie) -> &mut Self {
        if !self.writable("add_cookie") {
            return self;
        }
        self.cookies.add(cookie);
        self
    }

    /// Redirect to `url`; `status` defaults to 302.
    pub fn redirect(&mut self, url: &str, status: Option<StatusCode>) -> Result<&mut Self, BridgeError> {
        self.ensure_unsent()?;
        let location = HeaderValue::from_str(url)
            .map_err(|e| BridgeError::from_source("Invalid redirect location", e))?;
        self.headers.insert(header::LOCATION, location);
        self.status = Some(status.unwrap_or(StatusCode::FOUND));
        Ok(self)
    }

    /// Redirect back to `current_url` with an optional fragment.
    pub fn refresh(&mut self, current_url: &str, anchor: &str) -> Result<&mut Self, BridgeError> {
        let target = format!("{}{}", current_url, anchor);
        self.redirect(&target, None)
    }

    /// Send the file at `path` as a download.
    pub fn send_file(
        &mut self,
        path: impl AsRef<Path>,
        attachment_name: Option<&str>,
        options: SendFileOptions,
    ) -> Result<&mut Self, BridgeError> {
        self.ensure_unsent()?;
        let path = path.as_ref();
        let stream = FileStream::open(path).map_err(|e| {
            tracing::error!(path = %path.display(), error = %e, "Unable to open file for download");
            BridgeError::http(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
        })?;
        let name = match attachment_name {
            Some(name) => name.to_string(),
            None => path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "download".to_string()),
        };
        self.attach_stream(stream, &name, options)
    }

    /// Send an open handle as a download; the handle is wrapped in a
    /// re-readable stream.
    pub fn send_stream_as_file(
        &mut self,
        file: File,
        attachment_name: &str,
        options: SendFileOptions,
    ) -> Result<&mut Self, BridgeError> {
        self.ensure_unsent()?;
        let stream = FileStream::from_file(file)?;
        self.attach_stream(stream, attachment_name, options)
    }

    fn attach_stream(
        &mut self,
        stream: FileStream,
        attachment_name: &str,
        options: SendFileOptions,
    ) -> Result<&mut Self, BridgeError> {

        let mime = options
            .mime_type
            .as_deref()
            .unwrap_or("application/octet-stream");
        let disposition = format!(
            "{}; filename=\"{}\"",
            if options.inline { "inline" } else { "attachment" },
            attachment_name.replace('"', "\\\"")
        );

        self.headers.insert(header::CONTENT_TYPE, header_value(mime)?);
        self.headers
            .insert(header::CONTENT_DISPOSITION, header_value(&disposition)?);
        self.headers
            .insert(header::CONTENT_LENGTH, HeaderValue::from(stream.len()));
        self.headers
            .insert(header::ACCEPT_RANGES, HeaderValue::from_static("bytes"));

        self.format = ResponseFormat::Raw;
        self.data = None;
        self.content = None;
        self.stream = Some(stream);
        self.prepared = false;
        Ok(self)
    }

    pub fn is_prepared(&self) -> bool {
        self.prepared
    }

    /// Apply format-specific serialization once.
    pub fn finalize(&mut self) -> Result<&mut Self, BridgeError> {
        if self.prepared {
            return Ok(self);
        }
        if self.stream.is_some() {
            self.prepared = true;
            return Ok(self);
        }

        match self.format {
            ResponseFormat::Json => {
                let content_type = format!("application/json; charset={}", self.charset);
                self.headers.insert(header::CONTENT_TYPE, header_value(&content_type)?);
                if let Some(data) = &self.data {
                    self.content = Some(Bytes::from(serde_json::to_vec(data)?));
                }
            }
            ResponseFormat::Html => {
                let content_type = format!("text/html; charset={}", self.charset);
                if !self.headers.contains_key(header::CONTENT_TYPE) {
                    self.headers.insert(header::CONTENT_TYPE, header_value(&content_type)?);
                }
                if let Some(text) = scalar_text(self.data.as_ref())? {
                    self.content = Some(Bytes::from(text));
                }
            }
            ResponseFormat::Raw => {
                if let Some(text) = scalar_text(self.data.as_ref())? {
                    self.content = Some(Bytes::from(text));
                }
            }
        }

        self.prepared = true;
        Ok(self)
    }

    /// Clear body state so an error page can be rendered into this response.
    pub fn reset_for_error(&mut self) -> &mut Self {
        if !self.writable("reset_for_error") {
            return self;
        }
        self.data = None;
        self.content = None;
        self.stream = None;
        self.prepared = false;
        self.headers.remove(header::CONTENT_DISPOSITION);
        self.headers.remove(header::CONTENT_LENGTH);
        self.headers.remove(header::ACCEPT_RANGES);
        self.headers.remove(header::CONTENT_TYPE);
        self.headers.remove(header::LOCATION);
        self
    }

    /// Whether the response was already converted for the wire.
    pub fn is_sent(&self) -> bool {
        self.sent
    }

    pub(crate) fn mark_sent(&mut self) {
        self.sent = true;
    }

    /// False (and a warning) once the response went out; the mutation is dropped.
    fn writable(&self, operation: &'static str) -> bool {
        if self.sent {
            tracing::warn!(operation, "Ignoring change to a response that was already sent");
        }
        !self.sent
    }

    fn ensure_unsent(&self) -> Result<(), BridgeError> {
        if self.sent {
            return Err(BridgeError::internal("Response was already sent"));
        }
        Ok(())
    }
}

fn header_value(value: &str) -> Result<HeaderValue, BridgeError> {
    HeaderValue::from_str(value).map_err(|e| BridgeError::from_source("Invalid header value", e))
}

fn scalar_text(data: Option<&Value>) -> Result<Option<String>, BridgeError> {
    match data {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(Value::Bool(b)) => Ok(Some(if *b { "1".into() } else { String::new() })),
        Some(_) => Err(BridgeError::internal("Response content must not be an array or object.")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;

    #[test]
    fn json_finalize_is_idempotent() {
        let mut response = ResponseState::new();
        response.set_format(ResponseFormat::Json).set_data(json!({"hello": "world"}));

        response.finalize().unwrap();
        let first = response.content().cloned();
        response.finalize().unwrap();

        assert_eq!(first, response.content().cloned());
        assert_eq!(response.content().unwrap().as_ref(), br#"{"hello":"world"}"#);
        assert_eq!(
            response.header("content-type"),
            Some("application/json; charset=UTF-8")
        );
    }

    #[test]
    fn html_rejects_structured_data() {
        let mut response = ResponseState::new();
        response.set_data(json!(["a"]));
        assert!(response.finalize().is_err());

        response.reset_for_error().set_data("<p>ok</p>");
        response.finalize().unwrap();
        assert_eq!(response.content().unwrap().as_ref(), b"<p>ok</p>");
        assert_eq!(response.header("content-type"), Some("text/html; charset=UTF-8"));
    }

    #[test]
    fn status_validation() {
        let mut response = ResponseState::new();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(!response.is_status_set());

        response.set_status(201).unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        assert!(response.set_status(99).is_err());
        assert!(response.set_status(600).is_err());

        response.clear_status();
        assert!(!response.is_status_set());
    }

    #[test]
    fn redirect_and_refresh() {
        let mut response = ResponseState::new();
        response.redirect("/site/index", None).unwrap();
        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(response.header("location"), Some("/site/index"));

        response.refresh("site/refresh", "#foo").unwrap();
        assert_eq!(response.header("location"), Some("site/refresh#foo"));
    }

    #[test]
    fn stream_file_headers() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        write!(tmp, "key: value\n").unwrap();

        let mut response = ResponseState::new();
        response
            .send_file(
                tmp.path(),
                Some("config.yaml"),
                SendFileOptions {
                    mime_type: Some("text/yaml".into()),
                    inline: false,
                },
            )
            .unwrap();
        response.finalize().unwrap();

        assert_eq!(response.header("content-type"), Some("text/yaml"));
        assert_eq!(
            response.header("content-disposition"),
            Some("attachment; filename=\"config.yaml\"")
        );
        assert_eq!(response.header("content-length"), Some("11"));
        assert_eq!(response.stream().unwrap().read_all().unwrap(), b"key: value\n");
        assert_eq!(response.format(), ResponseFormat::Raw);
    }

    #[test]
    fn missing_file_is_server_error() {
        let mut response = ResponseState::new();
        let err = response
            .send_file("/definitely/not/here", None, SendFileOptions::default())
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn sent_response_is_frozen() {
        let mut response = ResponseState::new();
        response.set_data("first");
        response.finalize().unwrap();
        response.mark_sent();

        response
            .set_data("second")
            .set_status_code(StatusCode::IM_A_TEAPOT)
            .add_cookie(Cookie::new("late", "1"))
            .set_header(header::ETAG, HeaderValue::from_static("x"));

        assert_eq!(response.data(), Some(&json!("first")));
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.cookies().iter().next().is_none());
        assert!(response.header("etag").is_none());
        assert!(response.redirect("/elsewhere", None).is_err());
        assert!(response.set_status(404).is_err());
    }
}
