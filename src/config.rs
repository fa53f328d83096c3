use std::env;

use anyhow::{anyhow, bail, Result};

use crate::ClientCredentials;

const DEFAULT_MAX_BODY_BYTES: usize = 1024 * 1024;
const DEFAULT_BODY_TIMEOUT_MS: u64 = 10_000;

/// Which store implementation backs the metadata client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Aws,
    Memory,
}

/// Connection parameters consumed only by the store transport layer.
#[derive(Debug, Clone, Default)]
pub struct StoreSettings {
    pub backend: Option<StoreBackend>,
    pub region: Option<String>,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    /// JSON fixture loaded by the memory backend.
    pub memory_seed: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub client_table: Option<String>,
    pub bot_properties_table: Option<String>,
    pub client_secrets_table: Option<String>,
    pub image_bucket: Option<String>,
    pub upstream_url: Option<String>,
    pub default_credentials: Option<ClientCredentials>,
    pub max_body_bytes: usize,
    pub body_timeout_ms: u64,
    pub store: StoreSettings,
    pub port: u16,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            client_table: None,
            bot_properties_table: None,
            client_secrets_table: None,
            image_bucket: None,
            upstream_url: None,
            default_credentials: None,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            body_timeout_ms: DEFAULT_BODY_TIMEOUT_MS,
            store: StoreSettings::default(),
            port: 8080,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let default_credentials = match (optional_var("CLIENT_ID")?, optional_var("CLIENT_API_KEY")?) {
            (Some(client_id), Some(api_key)) => Some(ClientCredentials::new(client_id, api_key)),
            (None, None) => None,
            _ => bail!("CLIENT_ID and CLIENT_API_KEY must be set together"),
        };

        let backend = match optional_var("STORE_BACKEND")? {
            None => None,
            Some(raw) => Some(parse_backend(&raw)?),
        };
        let store = StoreSettings {
            backend,
            region: optional_var("STORE_REGION")?,
            access_key_id: optional_var("STORE_ACCESS_KEY_ID")?,
            secret_access_key: optional_var("STORE_SECRET_ACCESS_KEY")?,
            memory_seed: optional_var("MEMORY_STORE_SEED")?,
        };

        let max_body_bytes = match parse_optional_u64("GATEWAY_MAX_BODY_BYTES")? {
            Some(v) => usize::try_from(v)
                .map_err(|_| anyhow!("GATEWAY_MAX_BODY_BYTES does not fit this platform's usize"))?,
            None => DEFAULT_MAX_BODY_BYTES,
        };
        let body_timeout_ms =
            parse_optional_u64("GATEWAY_BODY_TIMEOUT_MS")?.unwrap_or(DEFAULT_BODY_TIMEOUT_MS);
        let port = match parse_optional_u64("PORT")? {
            Some(p) => u16::try_from(p).map_err(|_| anyhow!("PORT must fit in 16 bits"))?,
            None => 8080,
        };

        Ok(Self {
            client_table: optional_var("CLIENT_TABLE")?,
            bot_properties_table: optional_var("BOT_PROPERTIES_TABLE")?,
            client_secrets_table: optional_var("CLIENT_SECRETS_TABLE")?,
            image_bucket: optional_var("CHAT_BOT_SRC_BUCKET")?,
            upstream_url: optional_var("BOT_CONVERSATION_UPSTREAM_URL")?,
            default_credentials,
            max_body_bytes,
            body_timeout_ms,
            store,
            port,
        })
    }

    /// Names of unset keys that disable part of the gateway.
    pub fn missing_keys(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.client_table.is_none() {
            missing.push("CLIENT_TABLE");
        }
        if self.bot_properties_table.is_none() {
            missing.push("BOT_PROPERTIES_TABLE");
        }
        if self.client_secrets_table.is_none() {
            missing.push("CLIENT_SECRETS_TABLE");
        }
        if self.image_bucket.is_none() {
            missing.push("CHAT_BOT_SRC_BUCKET");
        }
        if self.upstream_url.is_none() {
            missing.push("BOT_CONVERSATION_UPSTREAM_URL");
        }
        missing
    }
}

fn optional_var(var: &str) -> Result<Option<String>> {
    match env::var(var) {
        Ok(value) if !value.trim().is_empty() => Ok(Some(value.trim().to_string())),
        Ok(_) => Ok(None),
        Err(env::VarError::NotPresent) => Ok(None),
        Err(err) => Err(anyhow!("{} is not valid unicode: {}", var, err)),
    }
}

fn parse_optional_u64(var: &str) -> Result<Option<u64>> {
    match optional_var(var)? {
        Some(value) => value
            .parse::<u64>()
            .map(Some)
            .map_err(|_| anyhow!("{} must be a positive integer", var)),
        None => Ok(None),
    }
}

fn parse_backend(value: &str) -> Result<StoreBackend> {
    match value.to_ascii_lowercase().as_str() {
        "aws" => Ok(StoreBackend::Aws),
        "memory" => Ok(StoreBackend::Memory),
        other => Err(anyhow!("STORE_BACKEND must be 'aws' or 'memory', got '{}'", other)),
    }
}
