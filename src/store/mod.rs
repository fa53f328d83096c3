//! Store seams for the gateway.
//!
//! The gateway only ever needs three opaque operations from its backing
//! services: a primary-key lookup and a partition query against the
//! key-value store, and a presigned read URL from the object store.  Each
//! backend translates its own wire records into [`Record`] so the
//! converters never see vendor types.

use std::collections::HashMap;
use std::time::Duration;

#[cfg(feature = "aws")]
pub mod aws;
pub mod memory;

/// A single attribute value as stored in the key-value store.
#[derive(Clone, Debug, PartialEq)]
pub enum AttrValue {
    S(String),
    N(String),
    Bool(bool),
    Ss(Vec<String>),
    L(Vec<AttrValue>),
    M(Record),
    Null,
}

impl AttrValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttrValue::S(s) => Some(s),
            _ => None,
        }
    }

    /// First scalar string held by a list-shaped attribute. Plain strings are
    /// returned as-is.
    pub fn first_str(&self) -> Option<&str> {
        match self {
            AttrValue::S(s) => Some(s),
            AttrValue::Ss(items) => items.first().map(String::as_str),
            AttrValue::L(items) => items.first().and_then(AttrValue::as_str),
            _ => None,
        }
    }

    /// Map a plain JSON value onto the attribute model.  Used to seed the
    /// in-memory backend from fixture files.
    pub fn from_json(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => AttrValue::Null,
            serde_json::Value::Bool(b) => AttrValue::Bool(*b),
            serde_json::Value::Number(n) => AttrValue::N(n.to_string()),
            serde_json::Value::String(s) => AttrValue::S(s.clone()),
            serde_json::Value::Array(items) => {
                AttrValue::L(items.iter().map(AttrValue::from_json).collect())
            }
            serde_json::Value::Object(map) => AttrValue::M(
                map.iter()
                    .map(|(k, v)| (k.clone(), AttrValue::from_json(v)))
                    .collect(),
            ),
        }
    }
}

/// Raw attribute map for one item.
pub type Record = HashMap<String, AttrValue>;

/// Transport or permission failure talking to a store.
#[derive(Debug, thiserror::Error)]
#[error("{operation} failed: {message}")]
pub struct StoreError {
    pub operation: &'static str,
    pub message: String,
}

impl StoreError {
    pub fn new(operation: &'static str, message: impl Into<String>) -> Self {
        Self {
            operation,
            message: message.into(),
        }
    }
}

/// Key-value lookups.  `key_name`/`key_value` address the partition key.
#[async_trait::async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get_item(
        &self,
        table: &str,
        key_name: &str,
        key_value: &str,
    ) -> Result<Option<Record>, StoreError>;

    async fn query(
        &self,
        table: &str,
        key_name: &str,
        key_value: &str,
    ) -> Result<Vec<Record>, StoreError>;
}

/// Issues time-limited read URLs for objects.
#[async_trait::async_trait]
pub trait ObjectSigner: Send + Sync {
    async fn presign_get(
        &self,
        bucket: &str,
        key: &str,
        expires_in: Duration,
    ) -> Result<String, StoreError>;
}
