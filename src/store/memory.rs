//! In-process store backends.  Handy for local runs (`STORE_BACKEND=memory`)
//! and for exercising the gateway without AWS.

use std::collections::HashMap;
use std::fs;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use super::{AttrValue, KeyValueStore, ObjectSigner, Record, StoreError};

/// Tables of records held in memory.  Lookups scan the table for records
/// whose key attribute is the given string.  Unknown tables behave like a
/// missing remote table and fail with a [`StoreError`].
#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    tables: HashMap<String, Vec<Record>>,
    offline: bool,
}

#[derive(Debug, Deserialize)]
struct SeedFile {
    #[serde(default)]
    tables: HashMap<String, Vec<serde_json::Map<String, serde_json::Value>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store whose every call fails, standing in for an unreachable backend.
    pub fn offline() -> Self {
        Self {
            tables: HashMap::new(),
            offline: true,
        }
    }

    /// Create an empty table if it does not exist yet.
    pub fn with_table(mut self, table: &str) -> Self {
        self.tables.entry(table.to_string()).or_default();
        self
    }

    pub fn insert(&mut self, table: &str, record: Record) {
        self.tables.entry(table.to_string()).or_default().push(record);
    }

    /// Builder form of [`MemoryStore::insert`] taking plain JSON.
    pub fn with_json(mut self, table: &str, value: serde_json::Value) -> Self {
        let record = match AttrValue::from_json(&value) {
            AttrValue::M(map) => map,
            _ => Record::new(),
        };
        self.insert(table, record);
        self
    }

    /// Load tables from a JSON fixture of the form
    /// `{"tables": {"<name>": [{"attr": value, ...}, ...]}}`.
    pub fn from_seed_file(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read MEMORY_STORE_SEED '{}'", path))?;
        Self::from_seed_str(&content)
            .with_context(|| format!("Failed to parse MEMORY_STORE_SEED '{}'", path))
    }

    pub fn from_seed_str(content: &str) -> Result<Self> {
        let seed: SeedFile = serde_json::from_str(content)?;
        let mut store = MemoryStore::new();
        for (table, items) in seed.tables {
            store = store.with_table(&table);
            for item in items {
                let record = item
                    .iter()
                    .map(|(k, v)| (k.clone(), AttrValue::from_json(v)))
                    .collect();
                store.insert(&table, record);
            }
        }
        Ok(store)
    }

    fn table(&self, operation: &'static str, table: &str) -> Result<&[Record], StoreError> {
        if self.offline {
            return Err(StoreError::new(operation, "store unreachable"));
        }
        self.tables
            .get(table)
            .map(Vec::as_slice)
            .ok_or_else(|| StoreError::new(operation, format!("table '{}' not found", table)))
    }
}

fn matches(record: &Record, key_name: &str, key_value: &str) -> bool {
    record.get(key_name).and_then(AttrValue::as_str) == Some(key_value)
}

#[async_trait::async_trait]
impl KeyValueStore for MemoryStore {
    async fn get_item(
        &self,
        table: &str,
        key_name: &str,
        key_value: &str,
    ) -> Result<Option<Record>, StoreError> {
        let records = self.table("GetItem", table)?;
        Ok(records
            .iter()
            .find(|r| matches(r, key_name, key_value))
            .cloned())
    }

    async fn query(
        &self,
        table: &str,
        key_name: &str,
        key_value: &str,
    ) -> Result<Vec<Record>, StoreError> {
        let records = self.table("Query", table)?;
        Ok(records
            .iter()
            .filter(|r| matches(r, key_name, key_value))
            .cloned()
            .collect())
    }
}

/// Produces deterministic pseudo-presigned URLs under `base_url`.
#[derive(Clone, Debug)]
pub struct MemorySigner {
    base_url: String,
    offline: bool,
}

impl MemorySigner {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            offline: false,
        }
    }

    /// A signer whose every call fails.
    pub fn offline() -> Self {
        Self {
            base_url: String::new(),
            offline: true,
        }
    }
}

#[async_trait::async_trait]
impl ObjectSigner for MemorySigner {
    async fn presign_get(
        &self,
        bucket: &str,
        key: &str,
        expires_in: Duration,
    ) -> Result<String, StoreError> {
        if self.offline {
            return Err(StoreError::new("PresignGetObject", "object store unreachable"));
        }
        Ok(format!(
            "{}/{}/{}?expires={}",
            self.base_url,
            bucket,
            key,
            expires_in.as_secs()
        ))
    }
}
