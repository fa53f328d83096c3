//! DynamoDB and S3 backends.

use std::collections::HashMap;
use std::time::Duration;

use aws_sdk_dynamodb::config::{Credentials, Region};
use aws_sdk_dynamodb::error::DisplayErrorContext;
use aws_sdk_dynamodb::types::AttributeValue;
use aws_sdk_s3::presigning::PresigningConfig;

use super::{AttrValue, KeyValueStore, ObjectSigner, Record, StoreError};
use crate::config::StoreSettings;

/// Load the shared SDK configuration.  Region and static credentials are
/// applied when configured; otherwise the default provider chain decides.
pub async fn load_sdk_config(settings: &StoreSettings) -> aws_config::SdkConfig {
    let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest());
    if let Some(region) = &settings.region {
        loader = loader.region(Region::new(region.clone()));
    }
    if let (Some(key_id), Some(secret)) = (&settings.access_key_id, &settings.secret_access_key) {
        loader = loader.credentials_provider(Credentials::new(
            key_id.clone(),
            secret.clone(),
            None,
            None,
            "botgate-static",
        ));
    }
    loader.load().await
}

pub struct DynamoStore {
    client: aws_sdk_dynamodb::Client,
}

impl DynamoStore {
    pub fn new(sdk: &aws_config::SdkConfig) -> Self {
        Self {
            client: aws_sdk_dynamodb::Client::new(sdk),
        }
    }
}

fn convert_value(value: &AttributeValue) -> AttrValue {
    match value {
        AttributeValue::S(s) => AttrValue::S(s.clone()),
        AttributeValue::N(n) => AttrValue::N(n.clone()),
        AttributeValue::Bool(b) => AttrValue::Bool(*b),
        AttributeValue::Ss(items) => AttrValue::Ss(items.clone()),
        AttributeValue::Ns(items) => AttrValue::L(items.iter().cloned().map(AttrValue::N).collect()),
        AttributeValue::L(items) => AttrValue::L(items.iter().map(convert_value).collect()),
        AttributeValue::M(map) => AttrValue::M(convert_record(map)),
        // binary and future variants carry nothing the gateway reads
        _ => AttrValue::Null,
    }
}

fn convert_record(item: &HashMap<String, AttributeValue>) -> Record {
    item.iter()
        .map(|(k, v)| (k.clone(), convert_value(v)))
        .collect()
}

#[async_trait::async_trait]
impl KeyValueStore for DynamoStore {
    async fn get_item(
        &self,
        table: &str,
        key_name: &str,
        key_value: &str,
    ) -> Result<Option<Record>, StoreError> {
        let output = self
            .client
            .get_item()
            .table_name(table)
            .key(key_name, AttributeValue::S(key_value.to_string()))
            .send()
            .await
            .map_err(|err| StoreError::new("GetItem", DisplayErrorContext(err).to_string()))?;
        Ok(output.item().map(convert_record))
    }

    async fn query(
        &self,
        table: &str,
        key_name: &str,
        key_value: &str,
    ) -> Result<Vec<Record>, StoreError> {
        let output = self
            .client
            .query()
            .table_name(table)
            .key_condition_expression("#k = :v")
            .expression_attribute_names("#k", key_name)
            .expression_attribute_values(":v", AttributeValue::S(key_value.to_string()))
            .send()
            .await
            .map_err(|err| StoreError::new("Query", DisplayErrorContext(err).to_string()))?;
        Ok(output.items().iter().map(convert_record).collect())
    }
}

pub struct S3Signer {
    client: aws_sdk_s3::Client,
}

impl S3Signer {
    pub fn new(sdk: &aws_config::SdkConfig) -> Self {
        Self {
            client: aws_sdk_s3::Client::new(sdk),
        }
    }
}

#[async_trait::async_trait]
impl ObjectSigner for S3Signer {
    async fn presign_get(
        &self,
        bucket: &str,
        key: &str,
        expires_in: Duration,
    ) -> Result<String, StoreError> {
        let presign = PresigningConfig::expires_in(expires_in)
            .map_err(|err| StoreError::new("PresignGetObject", err.to_string()))?;
        let request = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .presigned(presign)
            .await
            .map_err(|err| {
                StoreError::new(
                    "PresignGetObject",
                    aws_sdk_s3::error::DisplayErrorContext(err).to_string(),
                )
            })?;
        Ok(request.uri().to_string())
    }
}
