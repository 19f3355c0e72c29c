//! Backend selection and per-adapter connection settings.
//!
//! These types carry no I/O; the server fills them from the environment and
//! [`Backend::init`](crate::Backend::init) turns them into live adapters.

use std::path::PathBuf;
use std::str::FromStr;

/// Which adapter to build, together with its settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageConfig {
    /// In-memory (development only, data lost on restart).
    Memory,
    /// Embedded single-file store.
    Redb(RedbConfig),
    /// Networked key-value cache.
    Redis(RedisConfig),
    /// Wide-column cluster store.
    Cassandra(CassandraConfig),
    /// Document store.
    Mongo(MongoConfig),
}

impl StorageConfig {
    /// Backend identifier, matching [`Client::name`](crate::Client::name).
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::Redb(_) => "redb",
            Self::Redis(_) => "redis",
            Self::Cassandra(_) => "cassandra",
            Self::Mongo(_) => "mongodb",
        }
    }
}

/// Settings for the redb adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedbConfig {
    /// Database file, created if missing.
    pub path: PathBuf,
}

impl Default for RedbConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("local.db"),
        }
    }
}

/// Settings for the Redis adapter.
#[derive(Clone, PartialEq, Eq)]
pub struct RedisConfig {
    /// `host:port` of the server.
    pub addr: String,
    /// Logical database index.
    pub db: i64,
    /// Optional `AUTH` password.
    pub password: Option<String>,
    /// Reconnect attempts made by the connection manager.
    pub retries: usize,
    /// Prefix of every key written by the adapter.
    pub namespace: String,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            addr: "localhost:6379".to_owned(),
            db: 0,
            password: None,
            retries: 5,
            namespace: "semver:db".to_owned(),
        }
    }
}

impl std::fmt::Debug for RedisConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisConfig")
            .field("addr", &self.addr)
            .field("db", &self.db)
            .field("password", &self.password.as_ref().map(|_| "[redacted]"))
            .field("retries", &self.retries)
            .field("namespace", &self.namespace)
            .finish()
    }
}

/// Read/write consistency for the Cassandra adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Consistency {
    One,
    #[default]
    Quorum,
    LocalQuorum,
    All,
}

impl FromStr for Consistency {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "one" => Ok(Self::One),
            "quorum" => Ok(Self::Quorum),
            "local_quorum" => Ok(Self::LocalQuorum),
            "all" => Ok(Self::All),
            other => Err(format!("unknown consistency level '{other}'")),
        }
    }
}

/// Settings for the Cassandra adapter.
#[derive(Clone, PartialEq, Eq)]
pub struct CassandraConfig {
    /// Contact points, `host` or `host:port`.
    pub hosts: Vec<String>,
    /// Keyspace holding the `entries` table.
    pub keyspace: String,
    /// Optional username for password authentication.
    pub username: Option<String>,
    /// Optional password for password authentication.
    pub password: Option<String>,
    /// Default consistency for statements.
    pub consistency: Consistency,
    /// Replication factor used when the keyspace is created.
    pub replication_factor: u32,
}

impl Default for CassandraConfig {
    fn default() -> Self {
        Self {
            hosts: vec!["localhost".to_owned()],
            keyspace: "semver".to_owned(),
            username: None,
            password: None,
            consistency: Consistency::Quorum,
            replication_factor: 3,
        }
    }
}

impl std::fmt::Debug for CassandraConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CassandraConfig")
            .field("hosts", &self.hosts)
            .field("keyspace", &self.keyspace)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "[redacted]"))
            .field("consistency", &self.consistency)
            .field("replication_factor", &self.replication_factor)
            .finish()
    }
}

/// Settings for the MongoDB adapter.
#[derive(Clone, PartialEq, Eq)]
pub struct MongoConfig {
    /// Connection string, credentials included.
    pub uri: String,
    /// Database name.
    pub database: String,
    /// Collection holding one document per owner.
    pub collection: String,
}

impl Default for MongoConfig {
    fn default() -> Self {
        Self {
            uri: "mongodb://localhost:27017".to_owned(),
            database: "semver".to_owned(),
            collection: "projects".to_owned(),
        }
    }
}

impl std::fmt::Debug for MongoConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MongoConfig")
            .field("uri", &"[redacted]")
            .field("database", &self.database)
            .field("collection", &self.collection)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn consistency_parses_case_insensitively() {
        assert_eq!("QUORUM".parse::<Consistency>(), Ok(Consistency::Quorum));
        assert_eq!("local-quorum".parse::<Consistency>(), Ok(Consistency::LocalQuorum));
        assert_eq!("one".parse::<Consistency>(), Ok(Consistency::One));
        assert!("eventually".parse::<Consistency>().is_err());
    }

    #[test]
    fn debug_redacts_secrets() {
        let config = RedisConfig {
            password: Some("hunter2".to_owned()),
            ..RedisConfig::default()
        };
        assert!(!format!("{config:?}").contains("hunter2"));

        let config = MongoConfig {
            uri: "mongodb://admin:hunter2@db:27017".to_owned(),
            ..MongoConfig::default()
        };
        assert!(!format!("{config:?}").contains("hunter2"));
    }
}
