//! Request dispatcher.  Every request is credential-checked first; then the
//! path decides between conversation forwarding, the two metadata
//! endpoints, or handing the request on to the host's next handler.

use axum::extract::{Query, Request, State};
use axum::http::{HeaderMap, StatusCode, Uri};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::metadata::MetadataError;
use crate::proxy::{self, Forward, ForwardError};
use crate::{ClientCredentials, GatewayState};

pub const CONVERSATION_PATH: &str = "/api/conversation";
pub const METADATA_TEXTS_PATH: &str = "/api/metadata/texts";
pub const METADATA_IMAGES_PATH: &str = "/api/metadata/images";

const API_KEY_HEADER: &str = "x-api-key";
const CLIENT_ID_PARAM: &str = "clientid";

fn message(status: StatusCode, text: &str) -> Response {
    (status, Json(serde_json::json!({ "message": text }))).into_response()
}

fn metadata_failure(status: StatusCode, text: &str) -> Response {
    (
        status,
        Json(serde_json::json!({ "success": false, "message": text })),
    )
        .into_response()
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

/// First `clientid` value in the query string.  Repeated parameters do not
/// void the lookup.
fn query_client_id(uri: &Uri) -> Option<String> {
    match Query::<Vec<(String, String)>>::try_from_uri(uri) {
        Ok(Query(pairs)) => pairs
            .into_iter()
            .find(|(name, _)| name == CLIENT_ID_PARAM)
            .map(|(_, value)| value),
        Err(err) => {
            tracing::debug!(error = %err, "query string rejected");
            None
        }
    }
}

/// Credentials for this request: host-provided extension first, then the
/// `clientid` query parameter with the `x-api-key` header, then the
/// embedding's configured defaults.
pub fn resolve_credentials(
    request: &Request,
    fallback: Option<&ClientCredentials>,
) -> Option<ClientCredentials> {
    if let Some(creds) = request.extensions().get::<ClientCredentials>() {
        return Some(creds.clone());
    }
    let client_id = query_client_id(request.uri());
    let api_key = header_value(request.headers(), API_KEY_HEADER);
    if client_id.is_some() || api_key.is_some() {
        return Some(ClientCredentials::new(
            client_id.unwrap_or_default(),
            api_key.unwrap_or_default(),
        ));
    }
    fallback.cloned()
}

/// Middleware entry point.  Mount with
/// `axum::middleware::from_fn_with_state(state, gateway_middleware)` or via
/// [`crate::attach`].
pub async fn gateway_middleware(
    State(state): State<GatewayState>,
    request: Request,
    next: Next,
) -> Response {
    let creds = match resolve_credentials(&request, state.default_credentials.as_ref()) {
        Some(creds) if !creds.is_blank() => creds,
        _ => {
            tracing::info!(path = %request.uri().path(), "missing client credentials");
            return message(StatusCode::BAD_REQUEST, "Clientid and apikey are required.");
        }
    };

    if !state.validator.is_valid(&creds.client_id, &creds.api_key).await {
        tracing::info!(client_id = %creds.client_id, path = %request.uri().path(), "credential validation failed");
        return message(StatusCode::FORBIDDEN, "Invalid clientid or apikey.");
    }

    let path = request.uri().path().to_string();
    match path.as_str() {
        CONVERSATION_PATH => forward_conversation(&state, &creds, request).await,
        METADATA_TEXTS_PATH => metadata_texts(&state, &creds.client_id).await,
        METADATA_IMAGES_PATH => metadata_images(&state, &creds.client_id).await,
        _ => next.run(request).await,
    }
}

async fn forward_conversation(
    state: &GatewayState,
    creds: &ClientCredentials,
    request: Request,
) -> Response {
    match try_forward(state, creds, request).await {
        Ok(response) => response,
        Err(err) => {
            match &err {
                ForwardError::InvalidJson => {
                    tracing::info!(client_id = %creds.client_id, "conversation body is not valid JSON")
                }
                other => {
                    tracing::warn!(client_id = %creds.client_id, error = %other, "conversation forwarding failed")
                }
            }
            err.into_response()
        }
    }
}

async fn try_forward(
    state: &GatewayState,
    creds: &ClientCredentials,
    request: Request,
) -> Result<Response, ForwardError> {
    let (parts, body) = request.into_parts();

    // Reject early when the declared length already exceeds the limit.
    if let Some(declared) = parts
        .headers
        .get(axum::http::header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<usize>().ok())
    {
        if declared > state.max_body_bytes {
            return Err(ForwardError::BodyTooLarge(state.max_body_bytes));
        }
    }

    let raw = proxy::read_body(body, state.max_body_bytes, state.body_timeout).await?;
    let rewritten = proxy::inject_client_id(&raw, &creds.client_id)?;
    let upstream_url = state.upstream_url.as_deref().ok_or(ForwardError::NoUpstream)?;

    let fwd = Forward {
        method: parts.method.clone(),
        target: proxy::upstream_target(upstream_url, parts.uri.query()),
        headers: &parts.headers,
        body: rewritten,
        api_key: &creds.api_key,
    };
    tracing::debug!(client_id = %creds.client_id, target = %fwd.target, bytes = fwd.body.len(), "forwarding conversation");
    proxy::send_upstream(&state.upstream, fwd).await
}

async fn metadata_texts(state: &GatewayState, client_id: &str) -> Response {
    match state.metadata.fetch_bot_properties(client_id).await {
        Ok(properties) => (
            StatusCode::OK,
            Json(serde_json::json!({ "success": true, "properties": properties })),
        )
            .into_response(),
        Err(err) => {
            // Store failures answer the same 404 as a missing record.
            if matches!(err, MetadataError::Store(_)) {
                tracing::warn!(client_id = %client_id, error = %err, "error fetching bot properties");
            } else {
                tracing::info!(client_id = %client_id, error = %err, "bot properties unavailable");
            }
            metadata_failure(StatusCode::NOT_FOUND, "Bot properties not found")
        }
    }
}

async fn metadata_images(state: &GatewayState, client_id: &str) -> Response {
    // fetch_images degrades per key and cannot fail, so there is no
    // not-found or error branch here.
    let images = state.metadata.fetch_images(client_id).await;
    (
        StatusCode::OK,
        Json(serde_json::json!({ "success": true, "images": images })),
    )
        .into_response()
}
