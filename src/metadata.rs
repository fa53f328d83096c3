//! Metadata store client.
//!
//! Wraps the key-value lookups for bot properties, client info and client
//! secrets, plus presigned URL issuance for the bot's images.  Store
//! failures are turned into [`MetadataError`] values here; only
//! [`MetadataClient::issue_presigned_url`] hands a raw [`StoreError`] to its
//! caller, and the image fetch degrades that to an empty string.

use std::sync::Arc;
use std::time::Duration;

use crate::config::AppConfig;
use crate::convert;
use crate::store::{KeyValueStore, ObjectSigner, Record, StoreError};
use crate::{BotProperties, ClientInfo, ImageSet, StoredSecret};

/// Lifetime of every issued image URL.  URLs are never renewed.
pub const PRESIGNED_URL_TTL: Duration = Duration::from_secs(3600);

/// Image roles in response order.
pub const IMAGE_ROLES: [&str; 3] = ["agentAvatar", "agentImage", "launcherIcon"];

#[derive(Debug, thiserror::Error)]
pub enum MetadataError {
    #[error("client id is required")]
    MissingClientId,
    #[error("{0} is not configured")]
    Config(&'static str),
    #[error("no record found for client '{0}'")]
    NotFound(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Clone)]
pub struct MetadataClient {
    kv: Arc<dyn KeyValueStore>,
    signer: Arc<dyn ObjectSigner>,
    client_table: Option<String>,
    bot_properties_table: Option<String>,
    client_secrets_table: Option<String>,
    image_bucket: Option<String>,
}

/// Object key for one of a client's images.
pub fn image_key(client_id: &str, role: &str) -> String {
    format!("{}/{}-{}", client_id, client_id, role)
}

fn require<'a>(value: &'a Option<String>, key: &'static str) -> Result<&'a str, MetadataError> {
    value.as_deref().ok_or(MetadataError::Config(key))
}

impl MetadataClient {
    pub fn new(
        config: &AppConfig,
        kv: Arc<dyn KeyValueStore>,
        signer: Arc<dyn ObjectSigner>,
    ) -> Self {
        Self {
            kv,
            signer,
            client_table: config.client_table.clone(),
            bot_properties_table: config.bot_properties_table.clone(),
            client_secrets_table: config.client_secrets_table.clone(),
            image_bucket: config.image_bucket.clone(),
        }
    }

    /// Bot display properties with the company name merged in from the
    /// client table.
    pub async fn fetch_bot_properties(&self, client_id: &str) -> Result<BotProperties, MetadataError> {
        if client_id.is_empty() {
            return Err(MetadataError::MissingClientId);
        }
        let table = require(&self.bot_properties_table, "BOT_PROPERTIES_TABLE")?;
        let record = self
            .kv
            .get_item(table, "id", client_id)
            .await?
            .ok_or_else(|| MetadataError::NotFound(client_id.to_string()))?;

        let mut properties = convert::to_bot_properties(&record);
        properties.company_name = match self.fetch_client_info(client_id).await {
            Ok(info) => info.company_name,
            Err(err) => {
                tracing::warn!(client_id = %client_id, error = %err, "client info unavailable; company name left empty");
                String::new()
            }
        };
        Ok(properties)
    }

    pub async fn fetch_client_info(&self, client_id: &str) -> Result<ClientInfo, MetadataError> {
        if client_id.is_empty() {
            return Err(MetadataError::MissingClientId);
        }
        let table = require(&self.client_table, "CLIENT_TABLE")?;
        let record = self
            .kv
            .get_item(table, "clientid", client_id)
            .await?
            .ok_or_else(|| MetadataError::NotFound(client_id.to_string()))?;
        Ok(convert::to_client_info(&record))
    }

    /// All secret records for a client, in store order.
    pub async fn fetch_client_secrets(
        &self,
        client_id: &str,
    ) -> Result<Vec<StoredSecret>, MetadataError> {
        let records = self.query_secrets(client_id).await?;
        Ok(records.iter().map(convert::decode_secret).collect())
    }

    /// The secret consulted for validation: the first record returned.
    pub async fn fetch_client_secret(&self, client_id: &str) -> Result<StoredSecret, MetadataError> {
        let records = self.query_secrets(client_id).await?;
        convert::to_client_secret(&records)
            .ok_or_else(|| MetadataError::NotFound(client_id.to_string()))
    }

    async fn query_secrets(&self, client_id: &str) -> Result<Vec<Record>, MetadataError> {
        if client_id.is_empty() {
            return Err(MetadataError::MissingClientId);
        }
        let table = require(&self.client_secrets_table, "CLIENT_SECRETS_TABLE")?;
        let records = self.kv.query(table, "clientid", client_id).await?;
        if records.is_empty() {
            return Err(MetadataError::NotFound(client_id.to_string()));
        }
        Ok(records)
    }

    pub async fn issue_presigned_url(&self, bucket: &str, key: &str) -> Result<String, StoreError> {
        self.signer
            .presign_get(bucket, key, PRESIGNED_URL_TTL)
            .await
            .inspect_err(|err| {
                tracing::warn!(bucket = %bucket, key = %key, error = %err, "presigned url generation failed");
            })
    }

    /// Presigned URLs for the three image roles, issued concurrently.  Any
    /// individual failure yields an empty string for that role.
    pub async fn fetch_images(&self, client_id: &str) -> ImageSet {
        let [avatar, image, launcher] = IMAGE_ROLES.map(|role| image_key(client_id, role));
        let (agent_avatar, agent_image, launcher_icon) = tokio::join!(
            self.fetch_image_url(&avatar),
            self.fetch_image_url(&image),
            self.fetch_image_url(&launcher),
        );
        ImageSet {
            agent_avatar,
            agent_image,
            launcher_icon,
        }
    }

    async fn fetch_image_url(&self, key: &str) -> String {
        let bucket = match self.image_bucket.as_deref() {
            Some(bucket) if !key.is_empty() => bucket,
            _ => {
                tracing::warn!(key = %key, "image bucket or key missing");
                return String::new();
            }
        };
        self.issue_presigned_url(bucket, key)
            .await
            .unwrap_or_default()
    }
}
