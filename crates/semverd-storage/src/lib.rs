//! Storage abstraction for `semverd`.
//!
//! This crate defines the [`Client`] trait, one contract for storing string
//! records under hierarchical [`Key`]s, and adapters that satisfy it on top
//! of engines with very different native data models:
//!
//! - [`RedbBackend`] — embedded single-file store, one table per owner (feature `redb-backend`)
//! - [`RedisBackend`] — flat networked cache with glob key scans (feature `redis-backend`)
//! - [`CassandraBackend`] — wide-column store with logged batches (feature `cassandra-backend`)
//! - [`MongoBackend`] — one document per owner with an embedded archive (feature `mongodb-backend`)
//! - [`MemoryBackend`] — in-memory, for testing only
//!
//! Service code never talks to an adapter directly: it builds a [`Backend`]
//! from a [`StorageConfig`] and hands it to a [`Manager`].

mod backend;
#[cfg(feature = "cassandra-backend")]
mod cassandra_backend;
mod config;
mod error;
mod key;
mod manager;
mod memory;
#[cfg(feature = "mongodb-backend")]
mod mongodb_backend;
#[cfg(feature = "redb-backend")]
mod redb_backend;
#[cfg(feature = "redis-backend")]
mod redis_backend;

pub use backend::Backend;
#[cfg(feature = "cassandra-backend")]
pub use cassandra_backend::CassandraBackend;
pub use config::{
    CassandraConfig, Consistency, MongoConfig, RedbConfig, RedisConfig, StorageConfig,
};
pub use error::{ErrorKind, StorageError};
pub use key::Key;
pub use manager::Manager;
pub use memory::MemoryBackend;
#[cfg(feature = "mongodb-backend")]
pub use mongodb_backend::MongoBackend;
#[cfg(feature = "redb-backend")]
pub use redb_backend::RedbBackend;
#[cfg(feature = "redis-backend")]
pub use redis_backend::RedisBackend;

/// Segment addressing an owner's current value.
pub const CANONICAL_SLOT: &str = "version";

/// A backend adapter for hierarchical string records.
///
/// Every adapter owns its native encoding of [`Key`] segments and inverts it
/// losslessly when decoding listing results. Writes touching the same owner
/// within one call are merged into a single physical update.
///
/// Adapters are constructed through their own async `open`/`connect`
/// functions, which perform all initialization (schema creation, connection
/// checks). Implementations must be safe to share across async tasks.
#[async_trait::async_trait]
pub trait Client: Send + Sync + 'static {
    /// Short backend identifier used in logs.
    fn name(&self) -> &'static str;

    /// Encode a key's segments into this backend's native address.
    fn path(&self, key: &Key) -> String;

    /// Check whether a record (or owner, depending on the backend) exists.
    ///
    /// # Errors
    ///
    /// Returns a backend error if the check itself fails. Absence is never
    /// an error.
    async fn exists(&self, key: &Key) -> Result<bool, StorageError>;

    /// Write `value` to every key in `keys`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::InvalidKey`] for keys the backend cannot
    /// encode, or a backend error if the write fails.
    async fn set(&self, value: &str, keys: &[Key]) -> Result<(), StorageError>;

    /// Read one value per key, in request order.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::NotFound`] if any addressed owner or record is
    /// absent.
    async fn get(&self, keys: &[Key]) -> Result<Vec<String>, StorageError>;

    /// List every key strictly below `key` under the same owner.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::List`] if the underlying scan fails.
    async fn list(&self, key: &Key) -> Result<Vec<Key>, StorageError>;

    /// Remove the records at `keys`. A key with no segments removes the whole
    /// owner. Removing absent records is not an error.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Delete`] if the underlying backend fails.
    async fn delete(&self, keys: &[Key]) -> Result<(), StorageError>;

    /// Release connections held by this adapter.
    ///
    /// # Errors
    ///
    /// Returns a backend error if shutdown fails.
    async fn close(&self) -> Result<(), StorageError> {
        Ok(())
    }
}
