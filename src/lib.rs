//! Core library for botgate.  This module defines the metadata shapes
//! served to the chat widget, the shared gateway state and the router
//! helpers used to mount the credential-gated middleware in a host server.

mod config;
pub mod convert;
pub mod gateway;
pub mod metadata;
pub mod proxy;
pub mod store;
pub mod validator;

pub use config::{AppConfig, StoreBackend, StoreSettings};
pub use gateway::gateway_middleware;
pub use metadata::{MetadataClient, MetadataError};
pub use validator::CredentialValidator;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::{routing::get, Json, Router};
use serde::Serialize;
use tower_http::trace::TraceLayer;

use crate::store::memory::{MemorySigner, MemoryStore};
use crate::store::{KeyValueStore, ObjectSigner};

/// Credentials presented by a caller.  Hosts that authenticate callers
/// themselves can insert this into the request extensions before the
/// gateway runs.
#[derive(Clone, PartialEq, Eq)]
pub struct ClientCredentials {
    pub client_id: String,
    pub api_key: String,
}

impl ClientCredentials {
    pub fn new(client_id: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            api_key: api_key.into(),
        }
    }

    /// True when either part is empty after trimming.
    pub fn is_blank(&self) -> bool {
        self.client_id.trim().is_empty() || self.api_key.trim().is_empty()
    }
}

impl std::fmt::Debug for ClientCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientCredentials")
            .field("client_id", &self.client_id)
            .field("api_key", &"<redacted>")
            .finish()
    }
}

/// A secrets-table entry.  `api_key` is `None` when the record carries no
/// usable key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredSecret {
    pub client_id: String,
    pub api_key: Option<String>,
}

/// Display properties of a client's bot.
#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BotProperties {
    pub color: String,
    pub accent_color: String,
    pub name: String,
    pub description: String,
    pub launcher_icon_path: String,
    pub agent_image_path: String,
    pub agent_avatar_path: String,
    /// Always taken from the client table.
    pub company_name: String,
}

#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ClientInfo {
    pub company_name: String,
}

/// Presigned image URLs per role; empty strings mark images that could not
/// be signed.
#[derive(Debug, Serialize, Default, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ImageSet {
    pub agent_avatar: String,
    pub agent_image: String,
    pub launcher_icon: String,
}

/// Immutable state shared by every request passing through the gateway.
#[derive(Clone)]
pub struct GatewayState {
    pub metadata: MetadataClient,
    pub validator: CredentialValidator,
    pub upstream: reqwest::Client,
    pub upstream_url: Option<Arc<str>>,
    pub default_credentials: Option<ClientCredentials>,
    pub max_body_bytes: usize,
    pub body_timeout: Duration,
}

impl GatewayState {
    pub fn new(
        config: &AppConfig,
        kv: Arc<dyn KeyValueStore>,
        signer: Arc<dyn ObjectSigner>,
    ) -> anyhow::Result<Self> {
        let metadata = MetadataClient::new(config, kv, signer);
        let upstream = reqwest::Client::builder()
            .build()
            .context("failed to build upstream http client")?;
        Ok(Self {
            validator: CredentialValidator::new(metadata.clone()),
            metadata,
            upstream,
            upstream_url: config.upstream_url.as_deref().map(Arc::from),
            default_credentials: config.default_credentials.clone(),
            max_body_bytes: config.max_body_bytes,
            body_timeout: Duration::from_millis(config.body_timeout_ms),
        })
    }
}

/// Build the stores selected by `config` and the gateway state around them.
pub async fn build_state(config: &AppConfig) -> anyhow::Result<GatewayState> {
    for key in config.missing_keys() {
        tracing::warn!(key, "configuration key unset; dependent gateway features are disabled");
    }

    let backend = config.store.backend.unwrap_or(if cfg!(feature = "aws") {
        StoreBackend::Aws
    } else {
        StoreBackend::Memory
    });

    let (kv, signer): (Arc<dyn KeyValueStore>, Arc<dyn ObjectSigner>) = match backend {
        StoreBackend::Memory => {
            let store = match config.store.memory_seed.as_deref() {
                Some(path) => MemoryStore::from_seed_file(path)?,
                None => MemoryStore::new(),
            };
            tracing::info!("using in-memory store backend");
            (Arc::new(store), Arc::new(MemorySigner::new("memory://objects")))
        }
        StoreBackend::Aws => aws_stores(config).await?,
    };

    GatewayState::new(config, kv, signer)
}

#[cfg(feature = "aws")]
async fn aws_stores(
    config: &AppConfig,
) -> anyhow::Result<(Arc<dyn KeyValueStore>, Arc<dyn ObjectSigner>)> {
    let sdk = store::aws::load_sdk_config(&config.store).await;
    tracing::info!(region = ?sdk.region(), "using AWS store backend");
    Ok((
        Arc::new(store::aws::DynamoStore::new(&sdk)),
        Arc::new(store::aws::S3Signer::new(&sdk)),
    ))
}

#[cfg(not(feature = "aws"))]
async fn aws_stores(
    _config: &AppConfig,
) -> anyhow::Result<(Arc<dyn KeyValueStore>, Arc<dyn ObjectSigner>)> {
    anyhow::bail!("STORE_BACKEND=aws requires the 'aws' feature")
}

/// Build state from environment variables; see [`AppConfig::from_env`].
pub async fn build_state_from_env() -> anyhow::Result<GatewayState> {
    let config = AppConfig::from_env()?;
    build_state(&config).await
}

/// Mount the gateway in front of every route of a host router.  Requests on
/// paths the gateway does not own continue to the host's handlers once
/// their credentials have been validated.
pub fn attach<S>(router: Router<S>, state: GatewayState) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    router.layer(axum::middleware::from_fn_with_state(
        state,
        gateway::gateway_middleware,
    ))
}

/// Standalone router: `/healthz` outside the gate, everything else through
/// the gateway with a 404 fallback as the next handler.
pub fn app(state: GatewayState) -> Router {
    let gated = attach(Router::new().fallback(not_found_handler), state);
    Router::new()
        .route("/healthz", get(healthz_handler))
        .fallback_service(gated)
        .layer(TraceLayer::new_for_http())
}

async fn not_found_handler() -> axum::response::Response {
    (
        StatusCode::NOT_FOUND,
        Json(serde_json::json!({ "message": "Not found" })),
    )
        .into_response()
}

async fn healthz_handler() -> axum::response::Response {
    let json = serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    });
    (StatusCode::OK, Json(json)).into_response()
}
