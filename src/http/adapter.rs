//! Wire adapter.
//!
//! # Responsibilities
//! - Bind an [`InboundMessage`] to a fresh [`RequestState`]
//! - Serialize a [`ResponseState`] into an [`OutboundMessage`]: header
//!   casing, `Set-Cookie` lines (signed when cookie validation is on), body
//! - Convert between axum requests/responses and the wire messages for the
//!   front server
//!
//! # Data Flow
//! ```text
//! axum Request → inbound_from_http → InboundMessage → to_internal → RequestState
//! ResponseState → to_wire → OutboundMessage → outbound_into_http → axum Response
//! ```

use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::{Body, Bytes};
use axum::http::{header, HeaderName, HeaderValue, Method, Request, Response, StatusCode};
use tokio_util::io::ReaderStream;

use crate::error::BridgeError;
use crate::http::cookie::parse_cookie_header;
use crate::http::message::{InboundMessage, OutboundBody, OutboundMessage};
use crate::http::params::parse_query;
use crate::http::parsers::media_type;
use crate::http::request::{RequestSettings, RequestState};
use crate::http::response::ResponseState;
use crate::security::CookieSigner;

/// Attribute carrying the front server's request id.
pub const REQUEST_ID_ATTRIBUTE: &str = "request_id";

/// Bind `message` to a new request state. Never fails; malformed input is
/// passed through as-is.
pub fn to_internal(message: InboundMessage, settings: Arc<RequestSettings>) -> RequestState {
    RequestState::new(message, settings)
}

/// Serialize `response` for the transport and mark it sent.
pub fn to_wire(
    response: &mut ResponseState,
    signer: Option<&CookieSigner>,
) -> Result<OutboundMessage, BridgeError> {
    if response.is_sent() {
        return Err(BridgeError::internal("Response was already sent"));
    }
    response.finalize()?;

    let mut status = response.status();
    if status.is_informational() {
        tracing::warn!(status = status.as_u16(), "Informational status reached the wire, sending 200");
        status = StatusCode::OK;
    }

    let mut headers: Vec<(String, String)> = Vec::with_capacity(response.headers().len());
    for (name, value) in response.headers() {
        match value.to_str() {
            Ok(v) => headers.push((title_case(name.as_str()), v.to_string())),
            Err(_) => tracing::warn!(header = %name, "Dropping non-text response header"),
        }
    }

    for cookie in response.cookies().iter() {
        let value = match signer {
            Some(signer) if !cookie.is_removal() => signer.sign(&cookie.name, &cookie.value),
            _ => cookie.value.clone(),
        };
        headers.push(("Set-Cookie".to_string(), cookie.to_header_value(&value)));
    }

    let body = match (response.stream(), response.content()) {
        (Some(stream), _) => OutboundBody::File(stream.clone()),
        (None, Some(content)) => OutboundBody::Bytes(content.clone()),
        (None, None) => OutboundBody::Bytes(Bytes::new()),
    };

    response.mark_sent();
    Ok(OutboundMessage {
        status,
        headers,
        body,
    })
}

/// `content-type` → `Content-Type`.
pub fn title_case(name: &str) -> String {
    name.split('-')
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_ascii_uppercase().to_string() + &chars.as_str().to_ascii_lowercase(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join("-")
}

/// Buffer an axum request into an inbound message.
pub async fn inbound_from_http(
    request: Request<Body>,
    remote: Option<SocketAddr>,
    max_body_bytes: usize,
) -> Result<InboundMessage, BridgeError> {
    let (parts, body) = request.into_parts();
    let body = axum::body::to_bytes(body, max_body_bytes)
        .await
        .map_err(|_| BridgeError::http(StatusCode::PAYLOAD_TOO_LARGE, "Request body too large"))?;

    let request_id = parts
        .headers
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let cookies = parts
        .headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(parse_cookie_header)
        .collect::<Vec<_>>();

    let host = parts
        .headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .and_then(|h| h.split(':').next())
        .unwrap_or_default()
        .to_string();

    let https = parts.uri.scheme_str() == Some("https");
    let content_type = parts
        .headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(media_type)
        .unwrap_or_default();

    let mut message = InboundMessage::new(parts.method.clone(), parts.uri.clone())
        .with_headers(parts.headers)
        .with_server_param("REQUEST_METHOD", parts.method.as_str())
        .with_server_param("REQUEST_URI", parts.uri.to_string())
        .with_server_param("QUERY_STRING", parts.uri.query().unwrap_or_default())
        .with_server_param("SERVER_PROTOCOL", format!("{:?}", parts.version))
        .with_server_param("SERVER_NAME", host)
        .with_cookie_params(cookies);

    if https {
        message = message.with_server_param("HTTPS", "on");
    }
    if let Some(addr) = remote {
        message = message.with_server_param("REMOTE_ADDR", addr.ip().to_string());
    }
    if parts.method == Method::POST && content_type == "application/x-www-form-urlencoded" {
        message = message.with_parsed_body(parse_query(&String::from_utf8_lossy(&body)));
    }
    if let Some(id) = request_id {
        message = message.with_attribute(REQUEST_ID_ATTRIBUTE, id);
    }

    Ok(message.with_body(body))
}

/// Turn an outbound message into an axum response. File bodies are
/// streamed from a fresh handle.
pub fn outbound_into_http(message: OutboundMessage) -> Response<Body> {
    let body = match message.body {
        OutboundBody::Bytes(bytes) => Body::from(bytes),
        OutboundBody::File(stream) => match stream.reader() {
            Ok(file) => Body::from_stream(ReaderStream::new(tokio::fs::File::from_std(file))),
            Err(e) => {
                tracing::error!(error = %e, "Unable to reopen file body");
                return plain_error(StatusCode::INTERNAL_SERVER_ERROR);
            }
        },
    };

    let mut response = Response::new(body);
    *response.status_mut() = message.status;
    for (name, value) in message.headers {
        let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(&value),
        ) else {
            tracing::warn!(header = %name, "Skipping invalid outbound header");
            continue;
        };
        response.headers_mut().append(name, value);
    }
    response
}

/// Bare status response used when the bridge itself cannot answer.
pub fn plain_error(status: StatusCode) -> Response<Body> {
    let mut response = Response::new(Body::from(
        status.canonical_reason().unwrap_or("Error").to_string(),
    ));
    *response.status_mut() = status;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=UTF-8"),
    );
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::cookie::Cookie;
    use crate::http::response::ResponseFormat;
    use serde_json::json;

    #[test]
    fn header_names_are_title_cased() {
        assert_eq!(title_case("content-type"), "Content-Type");
        assert_eq!(title_case("x-request-id"), "X-Request-Id");
        assert_eq!(title_case("etag"), "Etag");
    }

    #[test]
    fn to_wire_serializes_everything_once() {
        let mut response = ResponseState::new();
        response
            .set_format(ResponseFormat::Json)
            .set_data(json!({"ok": true}))
            .add_cookie(Cookie::new("test", "test").http_only(false));

        let out = to_wire(&mut response, None).unwrap();
        assert_eq!(out.status(), StatusCode::OK);
        assert_eq!(out.header("Content-Type"), Some("application/json; charset=UTF-8"));
        assert_eq!(out.header_values("set-cookie"), vec!["test=test; Path=/; SameSite=Lax"]);
        assert_eq!(out.body_text().unwrap(), r#"{"ok":true}"#);
        assert!(response.is_sent());
        assert!(to_wire(&mut response, None).is_err());
    }

    #[test]
    fn signed_cookies_except_removals() {
        let signer = CookieSigner::new("key");
        let mut response = ResponseState::new();
        response
            .add_cookie(Cookie::new("theme", "dark"))
            .add_cookie(Cookie::removal("old"));

        let out = to_wire(&mut response, Some(&signer)).unwrap();
        let lines = out.header_values("set-cookie");
        let signed = lines[0].split("; ").next().unwrap().strip_prefix("theme=").unwrap();
        assert_eq!(signer.verify("theme", signed).as_deref(), Some("dark"));
        assert!(lines[1].starts_with("old=; Expires=Thu, 01 Jan 1970 00:00:01 GMT"));
    }

    #[test]
    fn informational_status_never_reaches_the_wire() {
        let mut response = ResponseState::new();
        response.set_status(103).unwrap();
        let out = to_wire(&mut response, None).unwrap();
        assert_eq!(out.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn inbound_conversion_collects_request_data() {
        let request = Request::builder()
            .method(Method::POST)
            .uri("/site/post?x=1")
            .header(header::HOST, "example.com:8080")
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .header(header::COOKIE, "a=1; b=2")
            .header("x-request-id", "req-1")
            .body(Body::from("foo=bar"))
            .unwrap();
        let addr: SocketAddr = "10.0.0.1:5555".parse().unwrap();

        let message = inbound_from_http(request, Some(addr), 1024).await.unwrap();
        assert_eq!(message.server_param("SERVER_NAME"), Some("example.com"));
        assert_eq!(message.server_param("REMOTE_ADDR"), Some("10.0.0.1"));
        assert_eq!(message.server_param("QUERY_STRING"), Some("x=1"));
        assert_eq!(message.cookie_param("b"), Some("2"));
        assert_eq!(message.parsed_body().and_then(|p| p.get("foo")), Some(&json!("bar")));
        assert_eq!(message.attribute(REQUEST_ID_ATTRIBUTE), Some(&json!("req-1")));
        assert_eq!(message.body().as_ref(), b"foo=bar");
    }

    #[tokio::test]
    async fn oversized_body_is_rejected() {
        let request = Request::builder()
            .method(Method::POST)
            .uri("/")
            .body(Body::from(vec![b'x'; 64]))
            .unwrap();
        let err = inbound_from_http(request, None, 8).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }
}
