//! Runtime backend selection.
//!
//! [`Backend`] is a closed set of adapters, chosen once at startup from a
//! [`StorageConfig`]. Adapters compiled out by feature flags are reported as
//! connection errors rather than silently falling back to another engine.

use tracing::info;

use crate::{Client, Key, MemoryBackend, StorageConfig, StorageError};

#[cfg(feature = "cassandra-backend")]
use crate::CassandraBackend;
#[cfg(feature = "mongodb-backend")]
use crate::MongoBackend;
#[cfg(feature = "redb-backend")]
use crate::RedbBackend;
#[cfg(feature = "redis-backend")]
use crate::RedisBackend;

/// One configured storage adapter.
#[derive(Debug, Clone)]
pub enum Backend {
    Memory(MemoryBackend),
    #[cfg(feature = "redb-backend")]
    Redb(RedbBackend),
    #[cfg(feature = "redis-backend")]
    Redis(RedisBackend),
    #[cfg(feature = "cassandra-backend")]
    Cassandra(CassandraBackend),
    #[cfg(feature = "mongodb-backend")]
    Mongo(MongoBackend),
}

/// Forward a call to whichever adapter is inside.
macro_rules! dispatch {
    ($self:ident, $inner:ident => $call:expr) => {
        match $self {
            Backend::Memory($inner) => $call,
            #[cfg(feature = "redb-backend")]
            Backend::Redb($inner) => $call,
            #[cfg(feature = "redis-backend")]
            Backend::Redis($inner) => $call,
            #[cfg(feature = "cassandra-backend")]
            Backend::Cassandra($inner) => $call,
            #[cfg(feature = "mongodb-backend")]
            Backend::Mongo($inner) => $call,
        }
    };
}

#[cfg(not(all(
    feature = "redb-backend",
    feature = "redis-backend",
    feature = "cassandra-backend",
    feature = "mongodb-backend"
)))]
fn disabled(config: &StorageConfig, feature: &str) -> StorageError {
    StorageError::Connection {
        backend: config.name(),
        addr: String::new(),
        reason: format!("backend not compiled in (enable feature '{feature}')"),
    }
}

impl Backend {
    /// Build and initialize the adapter described by `config`.
    ///
    /// Initialization is whatever the engine needs before serving: opening
    /// the database file, connecting, creating the keyspace and table.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Connection`] if the engine cannot be reached
    /// or its feature is not enabled in this build.
    pub async fn init(config: &StorageConfig) -> Result<Self, StorageError> {
        let backend = match config {
            StorageConfig::Memory => Self::Memory(MemoryBackend::new()),
            #[cfg(feature = "redb-backend")]
            StorageConfig::Redb(redb) => Self::Redb(RedbBackend::from_config(redb)?),
            #[cfg(not(feature = "redb-backend"))]
            StorageConfig::Redb(_) => return Err(disabled(config, "redb-backend")),
            #[cfg(feature = "redis-backend")]
            StorageConfig::Redis(redis) => Self::Redis(RedisBackend::connect(redis).await?),
            #[cfg(not(feature = "redis-backend"))]
            StorageConfig::Redis(_) => return Err(disabled(config, "redis-backend")),
            #[cfg(feature = "cassandra-backend")]
            StorageConfig::Cassandra(cassandra) => {
                Self::Cassandra(CassandraBackend::connect(cassandra).await?)
            }
            #[cfg(not(feature = "cassandra-backend"))]
            StorageConfig::Cassandra(_) => return Err(disabled(config, "cassandra-backend")),
            #[cfg(feature = "mongodb-backend")]
            StorageConfig::Mongo(mongo) => Self::Mongo(MongoBackend::connect(mongo).await?),
            #[cfg(not(feature = "mongodb-backend"))]
            StorageConfig::Mongo(_) => return Err(disabled(config, "mongodb-backend")),
        };
        info!(backend = backend.name(), "storage backend initialized");
        Ok(backend)
    }
}

impl From<MemoryBackend> for Backend {
    fn from(backend: MemoryBackend) -> Self {
        Self::Memory(backend)
    }
}

#[cfg(feature = "redb-backend")]
impl From<RedbBackend> for Backend {
    fn from(backend: RedbBackend) -> Self {
        Self::Redb(backend)
    }
}

#[cfg(feature = "redis-backend")]
impl From<RedisBackend> for Backend {
    fn from(backend: RedisBackend) -> Self {
        Self::Redis(backend)
    }
}

#[cfg(feature = "cassandra-backend")]
impl From<CassandraBackend> for Backend {
    fn from(backend: CassandraBackend) -> Self {
        Self::Cassandra(backend)
    }
}

#[cfg(feature = "mongodb-backend")]
impl From<MongoBackend> for Backend {
    fn from(backend: MongoBackend) -> Self {
        Self::Mongo(backend)
    }
}

#[async_trait::async_trait]
impl Client for Backend {
    fn name(&self) -> &'static str {
        dispatch!(self, b => b.name())
    }

    fn path(&self, key: &Key) -> String {
        dispatch!(self, b => b.path(key))
    }

    async fn exists(&self, key: &Key) -> Result<bool, StorageError> {
        dispatch!(self, b => b.exists(key).await)
    }

    async fn set(&self, value: &str, keys: &[Key]) -> Result<(), StorageError> {
        dispatch!(self, b => b.set(value, keys).await)
    }

    async fn get(&self, keys: &[Key]) -> Result<Vec<String>, StorageError> {
        dispatch!(self, b => b.get(keys).await)
    }

    async fn list(&self, key: &Key) -> Result<Vec<Key>, StorageError> {
        dispatch!(self, b => b.list(key).await)
    }

    async fn delete(&self, keys: &[Key]) -> Result<(), StorageError> {
        dispatch!(self, b => b.delete(keys).await)
    }

    async fn close(&self) -> Result<(), StorageError> {
        dispatch!(self, b => b.close().await)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn accepts_adapter<T: Into<Backend>>() {}

    #[test]
    fn every_compiled_adapter_converts_into_backend() {
        accepts_adapter::<MemoryBackend>();
        #[cfg(feature = "redb-backend")]
        accepts_adapter::<RedbBackend>();
        #[cfg(feature = "redis-backend")]
        accepts_adapter::<RedisBackend>();
        #[cfg(feature = "cassandra-backend")]
        accepts_adapter::<CassandraBackend>();
        #[cfg(feature = "mongodb-backend")]
        accepts_adapter::<MongoBackend>();
    }

    #[tokio::test]
    async fn memory_config_builds_memory_backend() {
        let backend = Backend::init(&StorageConfig::Memory).await.unwrap();
        assert_eq!(backend.name(), "memory");
        assert!(matches!(backend, Backend::Memory(_)));
    }

    #[tokio::test]
    async fn dispatch_reaches_inner_adapter() {
        let inner = MemoryBackend::new();
        let backend = Backend::from(inner.clone());
        let key = Key::new("p1", ["version"]);

        backend.set("1.0.0", &[key.clone()]).await.unwrap();
        assert_eq!(inner.get(&[key.clone()]).await.unwrap(), vec!["1.0.0"]);
        assert_eq!(backend.path(&key), "version");
        backend.close().await.unwrap();
    }

    #[cfg(feature = "redb-backend")]
    #[tokio::test]
    async fn redb_config_opens_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = StorageConfig::Redb(crate::RedbConfig {
            path: dir.path().join("init.db"),
        });
        let backend = Backend::init(&config).await.unwrap();
        assert_eq!(backend.name(), "redb");
        assert!(dir.path().join("init.db").exists());
    }
}
