//! `MongoDB` storage backend: the document-store adapter.
//!
//! Every owner is one document:
//!
//! ```json
//! { "_id": "<owner>", "version": "1.1.0",
//!   "archive": [ { "key": "archive:1.0.0", "value": "1.0.0" }, ... ] }
//! ```
//!
//! The canonical slot (`version`, or an owner-scope key) lives in the
//! `version` field; every other key is an archive entry addressed by its
//! segments joined with `:`. All writes are fetch, mutate, then replace the
//! whole document once per owner. There is no compare-and-swap, so two
//! concurrent writers to the same owner can lose an update.

use std::collections::BTreeMap;

use mongodb::bson::doc;
use mongodb::error::ErrorKind as MongoErrorKind;
use mongodb::{Collection, Database};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{CANONICAL_SLOT, Client, Key, MongoConfig, StorageError};

const DELIMITER: char = ':';

/// Where a key lives inside a [`ProjectDocument`].
#[derive(Debug, Clone, PartialEq, Eq)]
enum Slot {
    Canonical,
    Entry(String),
}

impl Slot {
    fn of(key: &Key) -> Self {
        match key.segments() {
            [] => Self::Canonical,
            [only] if only == CANONICAL_SLOT => Self::Canonical,
            _ => Self::Entry(key.join(DELIMITER)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct ArchiveEntry {
    key: String,
    value: String,
}

/// One owner's records as stored in the collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct ProjectDocument {
    #[serde(rename = "_id")]
    owner: String,
    #[serde(default)]
    version: String,
    #[serde(default)]
    archive: Vec<ArchiveEntry>,
}

impl ProjectDocument {
    fn new(owner: &str) -> Self {
        Self {
            owner: owner.to_owned(),
            version: String::new(),
            archive: Vec::new(),
        }
    }

    fn is_empty(&self) -> bool {
        self.version.is_empty() && self.archive.is_empty()
    }

    fn get(&self, slot: &Slot) -> Option<&str> {
        match slot {
            Slot::Canonical => (!self.version.is_empty()).then_some(self.version.as_str()),
            Slot::Entry(path) => self
                .archive
                .iter()
                .find(|e| &e.key == path)
                .map(|e| e.value.as_str()),
        }
    }

    fn set(&mut self, slot: Slot, value: &str) {
        match slot {
            Slot::Canonical => value.clone_into(&mut self.version),
            Slot::Entry(path) => {
                if let Some(entry) = self.archive.iter_mut().find(|e| e.key == path) {
                    value.clone_into(&mut entry.value);
                } else {
                    self.archive.push(ArchiveEntry {
                        key: path,
                        value: value.to_owned(),
                    });
                }
            }
        }
    }

    fn remove(&mut self, slot: &Slot) {
        match slot {
            Slot::Canonical => self.version.clear(),
            Slot::Entry(path) => self.archive.retain(|e| &e.key != path),
        }
    }

    /// Every key held by this document.
    fn keys(&self) -> Vec<Key> {
        let canonical = (!self.version.is_empty())
            .then(|| Key::new(self.owner.as_str(), [CANONICAL_SLOT]));
        canonical
            .into_iter()
            .chain(
                self.archive
                    .iter()
                    .map(|e| Key::split(self.owner.as_str(), &e.key, DELIMITER)),
            )
            .collect()
    }
}

fn classify(e: &mongodb::error::Error, key: &str, op: &'static str) -> StorageError {
    let key = key.to_owned();
    let reason = e.to_string();
    match (e.kind.as_ref(), op) {
        (MongoErrorKind::BsonDeserialization(_) | MongoErrorKind::BsonSerialization(_), _) => {
            StorageError::Serialization { key, reason }
        }
        (_, "write") => StorageError::Write { key, reason },
        (_, "delete") => StorageError::Delete { key, reason },
        _ => StorageError::Read { key, reason },
    }
}

/// A storage backend backed by `MongoDB` (or a compatible document store).
///
/// # Examples
///
/// ```no_run
/// # use semverd_storage::{MongoBackend, MongoConfig};
/// # #[tokio::main]
/// # async fn main() {
/// let backend = MongoBackend::connect(&MongoConfig::default()).await.unwrap();
/// # }
/// ```
#[derive(Clone)]
pub struct MongoBackend {
    client: mongodb::Client,
    collection: Collection<ProjectDocument>,
    database_name: String,
}

impl std::fmt::Debug for MongoBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MongoBackend")
            .field("database", &self.database_name)
            .field("collection", &self.collection.name())
            .finish_non_exhaustive()
    }
}

impl MongoBackend {
    /// Connect and verify the server answers a `ping`.
    ///
    /// No schema is created; the collection appears with its first document.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Connection`] if the URI is invalid or the
    /// server does not respond.
    pub async fn connect(config: &MongoConfig) -> Result<Self, StorageError> {
        let connection_error = |e: mongodb::error::Error| StorageError::Connection {
            backend: "mongodb",
            addr: config.database.clone(),
            reason: e.to_string(),
        };

        let client = mongodb::Client::with_uri_str(&config.uri)
            .await
            .map_err(connection_error)?;
        let database: Database = client.database(&config.database);
        database
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(connection_error)?;

        info!(database = %config.database, collection = %config.collection, "connected to mongodb");

        Ok(Self {
            collection: database.collection(&config.collection),
            client,
            database_name: config.database.clone(),
        })
    }

    async fn fetch(&self, owner: &str) -> Result<Option<ProjectDocument>, StorageError> {
        self.collection
            .find_one(doc! { "_id": owner })
            .await
            .map_err(|e| classify(&e, owner, "read"))
    }

    /// Write back every touched document, removing the empty ones.
    async fn persist(
        &self,
        documents: BTreeMap<String, ProjectDocument>,
    ) -> Result<(), StorageError> {
        for (owner, document) in documents {
            if document.is_empty() {
                self.collection
                    .delete_one(doc! { "_id": owner.as_str() })
                    .await
                    .map_err(|e| classify(&e, &owner, "delete"))?;
            } else {
                self.collection
                    .replace_one(doc! { "_id": owner.as_str() }, &document)
                    .upsert(true)
                    .await
                    .map_err(|e| classify(&e, &owner, "write"))?;
            }
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl Client for MongoBackend {
    fn name(&self) -> &'static str {
        "mongodb"
    }

    fn path(&self, key: &Key) -> String {
        key.join(DELIMITER)
    }

    async fn exists(&self, key: &Key) -> Result<bool, StorageError> {
        let count = self
            .collection
            .count_documents(doc! { "_id": key.owner() })
            .await
            .map_err(|e| classify(&e, key.owner(), "read"))?;
        Ok(count > 0)
    }

    async fn set(&self, value: &str, keys: &[Key]) -> Result<(), StorageError> {
        let mut documents: BTreeMap<String, ProjectDocument> = BTreeMap::new();
        for key in keys {
            key.ensure_encodable(DELIMITER, false)?;
            if !documents.contains_key(key.owner()) {
                let document = self
                    .fetch(key.owner())
                    .await?
                    .unwrap_or_else(|| ProjectDocument::new(key.owner()));
                documents.insert(key.owner().to_owned(), document);
            }
            if let Some(document) = documents.get_mut(key.owner()) {
                document.set(Slot::of(key), value);
            }
        }
        debug!(backend = "mongodb", owners = documents.len(), keys = keys.len(), "set");
        self.persist(documents).await
    }

    async fn get(&self, keys: &[Key]) -> Result<Vec<String>, StorageError> {
        let mut documents: BTreeMap<String, ProjectDocument> = BTreeMap::new();
        let mut values = Vec::with_capacity(keys.len());
        for key in keys {
            let not_found = || StorageError::NotFound {
                key: key.to_string(),
            };
            if !documents.contains_key(key.owner()) {
                let document = self.fetch(key.owner()).await?.ok_or_else(not_found)?;
                documents.insert(key.owner().to_owned(), document);
            }
            let value = documents
                .get(key.owner())
                .and_then(|d| d.get(&Slot::of(key)))
                .ok_or_else(not_found)?;
            values.push(value.to_owned());
        }
        Ok(values)
    }

    async fn list(&self, key: &Key) -> Result<Vec<Key>, StorageError> {
        let Some(document) = self.fetch(key.owner()).await? else {
            return Ok(Vec::new());
        };
        Ok(document
            .keys()
            .into_iter()
            .filter(|k| k.is_descendant_of(key))
            .collect())
    }

    async fn delete(&self, keys: &[Key]) -> Result<(), StorageError> {
        let mut documents: BTreeMap<String, ProjectDocument> = BTreeMap::new();
        for key in keys {
            if key.is_owner_scope() {
                documents.insert(key.owner().to_owned(), ProjectDocument::new(key.owner()));
                continue;
            }
            if !documents.contains_key(key.owner()) {
                // A missing document has nothing to delete.
                let Some(document) = self.fetch(key.owner()).await? else {
                    continue;
                };
                documents.insert(key.owner().to_owned(), document);
            }
            if let Some(document) = documents.get_mut(key.owner()) {
                document.remove(&Slot::of(key));
            }
        }
        debug!(backend = "mongodb", owners = documents.len(), keys = keys.len(), "delete");
        self.persist(documents).await
    }

    async fn close(&self) -> Result<(), StorageError> {
        self.client.clone().shutdown().await;
        info!("mongodb client shut down");
        Ok(())
    }
}
