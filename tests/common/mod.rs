use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::Router;
use botgate::store::memory::{MemorySigner, MemoryStore};
use botgate::store::{KeyValueStore, ObjectSigner, Record, StoreError};
use botgate::{AppConfig, GatewayState};
use serde_json::json;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

/// Every variable `AppConfig::from_env` reads.
#[allow(dead_code)]
pub const GATEWAY_ENV_KEYS: &[&str] = &[
    "CLIENT_TABLE",
    "BOT_PROPERTIES_TABLE",
    "CLIENT_SECRETS_TABLE",
    "CHAT_BOT_SRC_BUCKET",
    "BOT_CONVERSATION_UPSTREAM_URL",
    "CLIENT_ID",
    "CLIENT_API_KEY",
    "STORE_BACKEND",
    "STORE_REGION",
    "STORE_ACCESS_KEY_ID",
    "STORE_SECRET_ACCESS_KEY",
    "MEMORY_STORE_SEED",
    "GATEWAY_MAX_BODY_BYTES",
    "GATEWAY_BODY_TIMEOUT_MS",
    "PORT",
];

/// Clears the gateway's environment for the lifetime of a test and puts the
/// previous values back on drop.
#[allow(dead_code)]
pub struct GatewayEnv {
    saved: Vec<(&'static str, Option<String>)>,
}

#[allow(dead_code)]
impl GatewayEnv {
    pub fn cleared() -> Self {
        let saved = GATEWAY_ENV_KEYS
            .iter()
            .map(|key| (*key, std::env::var(key).ok()))
            .collect();
        for key in GATEWAY_ENV_KEYS {
            std::env::remove_var(key);
        }
        Self { saved }
    }

    pub fn set(&mut self, key: &str, value: &str) -> &mut Self {
        assert!(
            GATEWAY_ENV_KEYS.contains(&key),
            "{} is not a gateway variable",
            key
        );
        std::env::set_var(key, value);
        self
    }
}

impl Drop for GatewayEnv {
    fn drop(&mut self) {
        for (key, value) in &self.saved {
            match value {
                Some(value) => std::env::set_var(key, value),
                None => std::env::remove_var(key),
            }
        }
    }
}

#[allow(dead_code)]
pub fn test_config(upstream_url: Option<String>) -> AppConfig {
    AppConfig {
        client_table: Some("clients".into()),
        bot_properties_table: Some("bot-properties".into()),
        client_secrets_table: Some("secrets".into()),
        image_bucket: Some("bot-assets".into()),
        upstream_url,
        ..AppConfig::default()
    }
}

/// acme/k1 is a valid pair; acme has bot properties and client info.
#[allow(dead_code)]
pub fn seeded_store() -> MemoryStore {
    MemoryStore::new()
        .with_table("clients")
        .with_table("bot-properties")
        .with_table("secrets")
        .with_json("secrets", json!({"clientid": "acme", "apikey": ["k1"]}))
        .with_json("secrets", json!({"clientid": "bare", "apikey": ["k2"]}))
        .with_json("bot-properties", json!({"id": "acme", "name": "Acme Bot"}))
        .with_json("clients", json!({"clientid": "acme", "companyname": "Acme Corp"}))
}

#[allow(dead_code)]
pub fn state_with<K, S>(config: &AppConfig, kv: K, signer: S) -> GatewayState
where
    K: KeyValueStore + 'static,
    S: ObjectSigner + 'static,
{
    GatewayState::new(config, Arc::new(kv), Arc::new(signer)).unwrap()
}

#[allow(dead_code)]
pub fn default_state(upstream_url: Option<String>) -> GatewayState {
    state_with(
        &test_config(upstream_url),
        seeded_store(),
        MemorySigner::new("http://objects.test"),
    )
}

/// Counts every store call before delegating.
#[allow(dead_code)]
pub struct CountingStore {
    pub inner: MemoryStore,
    pub calls: Arc<AtomicUsize>,
}

#[async_trait::async_trait]
impl KeyValueStore for CountingStore {
    async fn get_item(
        &self,
        table: &str,
        key_name: &str,
        key_value: &str,
    ) -> Result<Option<Record>, StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.get_item(table, key_name, key_value).await
    }

    async fn query(
        &self,
        table: &str,
        key_name: &str,
        key_value: &str,
    ) -> Result<Vec<Record>, StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.query(table, key_name, key_value).await
    }
}

/// Fails every lookup against one table; other tables pass through.
#[allow(dead_code)]
pub struct BrokenTableStore {
    pub inner: MemoryStore,
    pub broken_table: &'static str,
}

#[async_trait::async_trait]
impl KeyValueStore for BrokenTableStore {
    async fn get_item(
        &self,
        table: &str,
        key_name: &str,
        key_value: &str,
    ) -> Result<Option<Record>, StoreError> {
        if table == self.broken_table {
            return Err(StoreError::new("GetItem", "access denied"));
        }
        self.inner.get_item(table, key_name, key_value).await
    }

    async fn query(
        &self,
        table: &str,
        key_name: &str,
        key_value: &str,
    ) -> Result<Vec<Record>, StoreError> {
        if table == self.broken_table {
            return Err(StoreError::new("Query", "access denied"));
        }
        self.inner.query(table, key_name, key_value).await
    }
}

#[allow(dead_code)]
#[derive(Debug, Clone)]
pub struct CapturedRequest {
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

#[allow(dead_code)]
pub type Captured = Arc<Mutex<Vec<CapturedRequest>>>;

/// Spin up a stand-in conversation service that records every request and
/// answers 201 with a fixed JSON reply.
#[allow(dead_code)]
pub async fn start_mock_upstream() -> (SocketAddr, Captured, JoinHandle<()>) {
    async fn record(State(captured): State<Captured>, req: Request) -> Response {
        let (parts, body) = req.into_parts();
        let body = axum::body::to_bytes(body, usize::MAX).await.unwrap();
        captured.lock().await.push(CapturedRequest {
            method: parts.method,
            uri: parts.uri,
            headers: parts.headers,
            body: body.to_vec(),
        });
        (
            StatusCode::CREATED,
            [("x-upstream", "conversation")],
            axum::Json(json!({"reply": "hello from upstream"})),
        )
            .into_response()
    }

    let captured: Captured = Arc::new(Mutex::new(Vec::new()));
    let app = Router::new().fallback(record).with_state(captured.clone());
    let listener = tokio::net::TcpListener::bind((std::net::Ipv4Addr::LOCALHOST, 0))
        .await
        .unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, captured, handle)
}

#[allow(dead_code)]
pub async fn body_json(response: Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[allow(dead_code)]
pub fn gated_request(method: Method, uri: &str, api_key: Option<&str>, body: Body) -> Request {
    let mut builder = axum::http::Request::builder().method(method).uri(uri);
    if let Some(key) = api_key {
        builder = builder.header("x-api-key", key);
    }
    builder.body(body).unwrap()
}
