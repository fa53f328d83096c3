use subtle::ConstantTimeEq;

use crate::metadata::{MetadataClient, MetadataError};

/// Checks client credentials against the secrets table.  Fails closed:
/// every error or ambiguous condition is a denial.
#[derive(Clone)]
pub struct CredentialValidator {
    metadata: MetadataClient,
}

impl CredentialValidator {
    pub fn new(metadata: MetadataClient) -> Self {
        Self { metadata }
    }

    pub async fn is_valid(&self, client_id: &str, api_key: &str) -> bool {
        if client_id.is_empty() || api_key.is_empty() {
            return false;
        }
        let secret = match self.metadata.fetch_client_secret(client_id).await {
            Ok(secret) => secret,
            Err(MetadataError::NotFound(_)) => {
                tracing::info!(client_id = %client_id, "no stored secret for client");
                return false;
            }
            Err(err) => {
                tracing::warn!(client_id = %client_id, error = %err, "secret lookup failed");
                return false;
            }
        };
        match secret.api_key.as_deref() {
            Some(stored) => stored.as_bytes().ct_eq(api_key.as_bytes()).into(),
            None => false,
        }
    }
}
