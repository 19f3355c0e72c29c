//! In-memory storage backend for testing.
//!
//! Stores one `BTreeMap` per owner behind a `RwLock`, mirroring the redb
//! adapter's layout: segments joined by `:` are the native key, and an
//! owner's map is dropped as soon as it becomes empty. Nothing is persisted.

use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::{Client, Key, StorageError};

const DELIMITER: char = ':';

type Tables = BTreeMap<String, BTreeMap<String, String>>;

/// An in-memory backend with per-owner sorted tables.
///
/// # Examples
///
/// ```
/// # use semverd_storage::{Client, Key, MemoryBackend};
/// # #[tokio::main]
/// # async fn main() {
/// let backend = MemoryBackend::new();
/// let key = Key::new("p1", ["version"]);
/// backend.set("1.0.0", &[key.clone()]).await.unwrap();
/// assert_eq!(backend.get(&[key]).await.unwrap(), vec!["1.0.0"]);
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    tables: Arc<RwLock<Tables>>,
}

impl MemoryBackend {
    /// Create a new empty in-memory backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl Client for MemoryBackend {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn path(&self, key: &Key) -> String {
        key.join(DELIMITER)
    }

    async fn exists(&self, key: &Key) -> Result<bool, StorageError> {
        let tables = self.tables.read().await;
        Ok(tables.contains_key(key.owner()))
    }

    async fn set(&self, value: &str, keys: &[Key]) -> Result<(), StorageError> {
        for key in keys {
            key.ensure_encodable(DELIMITER, false)?;
        }
        let mut tables = self.tables.write().await;
        for key in keys {
            tables
                .entry(key.owner().to_owned())
                .or_default()
                .insert(self.path(key), value.to_owned());
        }
        Ok(())
    }

    async fn get(&self, keys: &[Key]) -> Result<Vec<String>, StorageError> {
        let tables = self.tables.read().await;
        keys.iter()
            .map(|key| {
                tables
                    .get(key.owner())
                    .and_then(|table| table.get(&self.path(key)))
                    .cloned()
                    .ok_or_else(|| StorageError::NotFound {
                        key: key.to_string(),
                    })
            })
            .collect()
    }

    async fn list(&self, key: &Key) -> Result<Vec<Key>, StorageError> {
        let tables = self.tables.read().await;
        let Some(table) = tables.get(key.owner()) else {
            return Ok(Vec::new());
        };
        let prefix = self.path(key);
        let keys = table
            .range(prefix.clone()..)
            .take_while(|(k, _)| k.starts_with(&prefix))
            .map(|(k, _)| Key::split(key.owner(), k, DELIMITER))
            .filter(|k| k.is_descendant_of(key))
            .collect();
        Ok(keys)
    }

    async fn delete(&self, keys: &[Key]) -> Result<(), StorageError> {
        let mut tables = self.tables.write().await;
        for key in keys {
            if key.is_owner_scope() {
                tables.remove(key.owner());
                continue;
            }
            let Some(table) = tables.get_mut(key.owner()) else {
                continue;
            };
            table.remove(&self.path(key));
            if table.is_empty() {
                tables.remove(key.owner());
            }
        }
        Ok(())
    }
}
