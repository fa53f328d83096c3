//! Conversation forwarding: buffer the inbound body, stamp it with the
//! validated client id and relay it to the upstream conversation service.

use std::time::Duration;

use axum::body::Body;
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use bytes::Bytes;
use http_body_util::{BodyExt, LengthLimitError, Limited};

#[derive(Debug, thiserror::Error)]
pub enum ForwardError {
    #[error("request body exceeded {0} bytes")]
    BodyTooLarge(usize),
    #[error("request body not received within {0:?}")]
    BodyTimeout(Duration),
    #[error("failed to read request body: {0}")]
    BodyRead(String),
    #[error("request body is not a JSON object")]
    InvalidJson,
    #[error("no upstream conversation url configured")]
    NoUpstream,
    #[error("api key is not a valid header value")]
    InvalidApiKey,
    #[error("upstream request failed: {0}")]
    Upstream(#[from] reqwest::Error),
}

impl ForwardError {
    pub fn status(&self) -> StatusCode {
        match self {
            ForwardError::BodyTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ForwardError::BodyTimeout(_) => StatusCode::REQUEST_TIMEOUT,
            ForwardError::InvalidJson => StatusCode::BAD_REQUEST,
            ForwardError::BodyRead(_)
            | ForwardError::NoUpstream
            | ForwardError::InvalidApiKey
            | ForwardError::Upstream(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message returned to the caller.  Internal detail stays in the logs.
    pub fn public_message(&self) -> &'static str {
        match self {
            ForwardError::BodyTooLarge(_) => "Request body too large",
            ForwardError::BodyTimeout(_) => "Request body timeout",
            ForwardError::BodyRead(_) => "Server error",
            ForwardError::InvalidJson => "Invalid JSON format",
            ForwardError::NoUpstream | ForwardError::InvalidApiKey | ForwardError::Upstream(_) => {
                "Proxy request failed"
            }
        }
    }
}

impl IntoResponse for ForwardError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({ "error": self.public_message() });
        (self.status(), Json(body)).into_response()
    }
}

/// Headers that describe a single connection or are rewritten by the
/// forwarder and must not be copied across.
fn is_hop_by_hop(name: &HeaderName) -> bool {
    matches!(
        name.as_str(),
        "connection"
            | "keep-alive"
            | "proxy-authenticate"
            | "proxy-authorization"
            | "te"
            | "trailer"
            | "transfer-encoding"
            | "upgrade"
            | "host"
            | "content-length"
    )
}

/// Read the whole body, bounded by `limit` bytes and `timeout`.
pub async fn read_body(body: Body, limit: usize, timeout: Duration) -> Result<Bytes, ForwardError> {
    let limited = Limited::new(body, limit);
    match tokio::time::timeout(timeout, limited.collect()).await {
        Err(_) => Err(ForwardError::BodyTimeout(timeout)),
        Ok(Err(err)) if err.downcast_ref::<LengthLimitError>().is_some() => {
            Err(ForwardError::BodyTooLarge(limit))
        }
        Ok(Err(err)) => Err(ForwardError::BodyRead(err.to_string())),
        Ok(Ok(collected)) => Ok(collected.to_bytes()),
    }
}

/// Parse the body as a JSON object and set `client_id`.  Key order of the
/// original body is kept; an existing `client_id` is overwritten in place.
pub fn inject_client_id(raw: &[u8], client_id: &str) -> Result<Vec<u8>, ForwardError> {
    let mut value: serde_json::Value =
        serde_json::from_slice(raw).map_err(|_| ForwardError::InvalidJson)?;
    let object = value.as_object_mut().ok_or(ForwardError::InvalidJson)?;
    object.insert(
        "client_id".to_string(),
        serde_json::Value::String(client_id.to_string()),
    );
    serde_json::to_vec(&value).map_err(|_| ForwardError::InvalidJson)
}

/// Upstream target: the configured url with the inbound query string
/// carried over.  The inbound path itself is dropped.
pub fn upstream_target(upstream_url: &str, query: Option<&str>) -> String {
    match query.filter(|q| !q.is_empty()) {
        Some(q) if upstream_url.contains('?') => format!("{}&{}", upstream_url, q),
        Some(q) => format!("{}?{}", upstream_url, q),
        None => upstream_url.to_string(),
    }
}

pub struct Forward<'a> {
    pub method: Method,
    pub target: String,
    pub headers: &'a HeaderMap,
    pub body: Vec<u8>,
    pub api_key: &'a str,
}

/// Send the rewritten request and relay the upstream response as-is.
pub async fn send_upstream(client: &reqwest::Client, fwd: Forward<'_>) -> Result<Response, ForwardError> {
    let mut headers = HeaderMap::new();
    for (name, value) in fwd.headers {
        if !is_hop_by_hop(name) && *name != header::CONTENT_TYPE && name.as_str() != "x-api-key" {
            headers.append(name.clone(), value.clone());
        }
    }
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(fwd.body.len()));
    let api_key = HeaderValue::from_str(fwd.api_key).map_err(|_| ForwardError::InvalidApiKey)?;
    headers.insert(HeaderName::from_static("x-api-key"), api_key);

    let upstream = client
        .request(fwd.method, &fwd.target)
        .headers(headers)
        .body(fwd.body)
        .send()
        .await?;

    let status = upstream.status();
    let mut relayed = HeaderMap::new();
    for (name, value) in upstream.headers() {
        if !is_hop_by_hop(name) {
            relayed.append(name.clone(), value.clone());
        }
    }
    tracing::debug!(status = status.as_u16(), "upstream responded");

    let mut response = Response::new(Body::from_stream(upstream.bytes_stream()));
    *response.status_mut() = status;
    *response.headers_mut() = relayed;
    Ok(response)
}
