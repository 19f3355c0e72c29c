//! Pure-Rust redb storage backend: the embedded single-file adapter.
//!
//! Each owner gets its own redb table, created lazily on first write and
//! dropped once its last record is removed. Segments joined by `:` form the
//! native key inside that table, so prefix listing is an ordered range scan.
//!
//! redb allows one write transaction at a time and any number of readers.
//! Every `set`/`delete` call runs in a single write transaction, which makes
//! multi-key writes atomic. Blocking redb calls are offloaded to the Tokio
//! blocking thread pool.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use redb::{Database, ReadableTable, ReadableTableMetadata, TableDefinition, TableError};
use tracing::{debug, info};

use crate::{Client, Key, RedbConfig, StorageError};

const DELIMITER: char = ':';

/// Table holding every record of one owner.
fn owner_table(owner: &str) -> TableDefinition<'_, &'static str, &'static str> {
    TableDefinition::new(owner)
}

fn transaction_error(e: impl std::fmt::Display) -> StorageError {
    StorageError::Transaction {
        reason: e.to_string(),
    }
}

/// A storage backend backed by redb (pure Rust, B-tree based).
///
/// Thread-safe via `Arc<Database>`.
///
/// # Examples
///
/// ```no_run
/// # use semverd_storage::RedbBackend;
/// let backend = RedbBackend::open("/var/lib/semverd/local.db").unwrap();
/// ```
#[derive(Clone)]
pub struct RedbBackend {
    db: Arc<Database>,
    path: PathBuf,
}

impl std::fmt::Debug for RedbBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbBackend")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl RedbBackend {
    /// Open or create a redb database at the given path.
    ///
    /// No schema is needed up front: owner tables are created on first write.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Connection`] if redb fails to open or create
    /// the database file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref();
        let db = Database::create(path).map_err(|e| StorageError::Connection {
            backend: "redb",
            addr: path.display().to_string(),
            reason: e.to_string(),
        })?;

        info!(path = %path.display(), "redb database opened");

        Ok(Self {
            db: Arc::new(db),
            path: path.to_path_buf(),
        })
    }

    /// Open the database described by `config`.
    ///
    /// # Errors
    ///
    /// See [`RedbBackend::open`].
    pub fn from_config(config: &RedbConfig) -> Result<Self, StorageError> {
        Self::open(&config.path)
    }

    /// Filesystem path of the database file.
    #[must_use]
    pub fn file_path(&self) -> &Path {
        &self.path
    }
}

#[async_trait::async_trait]
impl Client for RedbBackend {
    fn name(&self) -> &'static str {
        "redb"
    }

    fn path(&self, key: &Key) -> String {
        key.join(DELIMITER)
    }

    async fn exists(&self, key: &Key) -> Result<bool, StorageError> {
        key.ensure_owner()?;
        let db = Arc::clone(&self.db);
        let owner = key.owner().to_owned();
        tokio::task::spawn_blocking(move || {
            let txn = db.begin_read().map_err(transaction_error)?;
            match txn.open_table(owner_table(&owner)) {
                Ok(table) => {
                    let empty = table.is_empty().map_err(|e| StorageError::Read {
                        key: owner.clone(),
                        reason: e.to_string(),
                    })?;
                    Ok(!empty)
                }
                Err(TableError::TableDoesNotExist(_)) => Ok(false),
                Err(e) => Err(StorageError::Read {
                    key: owner,
                    reason: e.to_string(),
                }),
            }
        })
        .await
        .map_err(|e| StorageError::Read {
            key: String::new(),
            reason: format!("blocking task panicked: {e}"),
        })?
    }

    async fn set(&self, value: &str, keys: &[Key]) -> Result<(), StorageError> {
        let mut by_owner: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for key in keys {
            key.ensure_encodable(DELIMITER, false)?;
            by_owner
                .entry(key.owner().to_owned())
                .or_default()
                .push(self.path(key));
        }
        debug!(backend = "redb", owners = by_owner.len(), keys = keys.len(), "set");

        let db = Arc::clone(&self.db);
        let value = value.to_owned();
        tokio::task::spawn_blocking(move || {
            let txn = db.begin_write().map_err(transaction_error)?;
            for (owner, paths) in &by_owner {
                let mut table =
                    txn.open_table(owner_table(owner))
                        .map_err(|e| StorageError::Write {
                            key: owner.clone(),
                            reason: e.to_string(),
                        })?;
                for path in paths {
                    table
                        .insert(path.as_str(), value.as_str())
                        .map_err(|e| StorageError::Write {
                            key: format!("{owner}/{path}"),
                            reason: e.to_string(),
                        })?;
                }
            }
            txn.commit().map_err(transaction_error)
        })
        .await
        .map_err(|e| StorageError::Write {
            key: String::new(),
            reason: format!("blocking task panicked: {e}"),
        })?
    }

    async fn get(&self, keys: &[Key]) -> Result<Vec<String>, StorageError> {
        for key in keys {
            key.ensure_owner()?;
        }
        let db = Arc::clone(&self.db);
        let requests: Vec<(Key, String)> =
            keys.iter().map(|k| (k.clone(), self.path(k))).collect();
        tokio::task::spawn_blocking(move || {
            let txn = db.begin_read().map_err(transaction_error)?;
            let mut values = Vec::with_capacity(requests.len());
            for (key, path) in requests {
                let table = match txn.open_table(owner_table(key.owner())) {
                    Ok(table) => table,
                    Err(TableError::TableDoesNotExist(_)) => {
                        return Err(StorageError::NotFound {
                            key: key.to_string(),
                        });
                    }
                    Err(e) => {
                        return Err(StorageError::Read {
                            key: key.to_string(),
                            reason: e.to_string(),
                        });
                    }
                };
                let value = table
                    .get(path.as_str())
                    .map_err(|e| StorageError::Read {
                        key: key.to_string(),
                        reason: e.to_string(),
                    })?
                    .map(|v| v.value().to_owned())
                    .ok_or_else(|| StorageError::NotFound {
                        key: key.to_string(),
                    })?;
                values.push(value);
            }
            Ok(values)
        })
        .await
        .map_err(|e| StorageError::Read {
            key: String::new(),
            reason: format!("blocking task panicked: {e}"),
        })?
    }

    async fn list(&self, key: &Key) -> Result<Vec<Key>, StorageError> {
        key.ensure_owner()?;
        let db = Arc::clone(&self.db);
        let key = key.clone();
        let prefix = self.path(&key);
        tokio::task::spawn_blocking(move || {
            let txn = db.begin_read().map_err(transaction_error)?;
            let table = match txn.open_table(owner_table(key.owner())) {
                Ok(table) => table,
                Err(TableError::TableDoesNotExist(_)) => return Ok(Vec::new()),
                Err(e) => {
                    return Err(StorageError::List {
                        prefix: key.to_string(),
                        reason: e.to_string(),
                    });
                }
            };

            let list_error = |e: redb::StorageError| StorageError::List {
                prefix: key.to_string(),
                reason: e.to_string(),
            };
            let mut keys = Vec::new();
            for item in table.range(prefix.as_str()..).map_err(list_error)? {
                let (k, _) = item.map_err(list_error)?;
                let native = k.value();
                if !native.starts_with(&prefix) {
                    break;
                }
                let found = Key::split(key.owner(), native, DELIMITER);
                if found.is_descendant_of(&key) {
                    keys.push(found);
                }
            }
            Ok(keys)
        })
        .await
        .map_err(|e| StorageError::List {
            prefix: String::new(),
            reason: format!("blocking task panicked: {e}"),
        })?
    }

    async fn delete(&self, keys: &[Key]) -> Result<(), StorageError> {
        for key in keys {
            key.ensure_owner()?;
        }
        debug!(backend = "redb", keys = keys.len(), "delete");
        let db = Arc::clone(&self.db);
        let requests: Vec<(Key, String)> =
            keys.iter().map(|k| (k.clone(), self.path(k))).collect();
        tokio::task::spawn_blocking(move || {
            let txn = db.begin_write().map_err(transaction_error)?;
            let delete_error = |key: &Key, e: &dyn std::fmt::Display| StorageError::Delete {
                key: key.to_string(),
                reason: e.to_string(),
            };
            for (key, path) in &requests {
                if !key.is_owner_scope() {
                    // Opening creates a missing table; it is dropped again below.
                    let mut table = txn
                        .open_table(owner_table(key.owner()))
                        .map_err(|e| delete_error(key, &e))?;
                    table
                        .remove(path.as_str())
                        .map_err(|e| delete_error(key, &e))?;
                    if !table.is_empty().map_err(|e| delete_error(key, &e))? {
                        continue;
                    }
                }
                txn.delete_table(owner_table(key.owner()))
                    .map_err(|e| delete_error(key, &e))?;
            }
            txn.commit().map_err(transaction_error)
        })
        .await
        .map_err(|e| StorageError::Delete {
            key: String::new(),
            reason: format!("blocking task panicked: {e}"),
        })?
    }
}
