//! Server configuration for `semverd`.
//!
//! Loads configuration from environment variables with sensible defaults.
//! All settings can be overridden via `SEMVER_*` environment variables.

use std::net::SocketAddr;
use std::path::PathBuf;

use semverd_storage::{
    CassandraConfig, Consistency, MongoConfig, RedbConfig, RedisConfig, StorageConfig,
};

/// Invalid configuration value.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// `SEMVER_BACKEND_STORAGE` names no known backend.
    #[error("unknown storage backend '{name}'")]
    UnknownStorage { name: String },

    /// A variable is set but cannot be parsed.
    #[error("invalid value for {var}: {reason}")]
    InvalidValue { var: &'static str, reason: String },
}

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind the HTTP listener to.
    pub bind_addr: SocketAddr,
    /// Log level filter (e.g., `info`, `debug`, `warn`).
    pub log_level: String,
    /// Maximum number of concurrent project creations.
    pub create_concurrency: usize,
    /// Storage backend and its connection settings.
    pub storage: StorageConfig,
}

impl ServerConfig {
    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `SEMVER_BIND_ADDR` — listen address (default: `0.0.0.0:4000`)
    /// - `SEMVER_LOG_LEVEL` — log filter (default: `info`)
    /// - `SEMVER_CREATE_CONCURRENCY` — concurrent `/v1/new` requests (default: `64`)
    /// - `SEMVER_BACKEND_STORAGE` — `redb`, `redis`, `cassandra`, `mongodb`, or `memory` (default: `redb`)
    /// - `SEMVER_BACKEND_ADDR` — file path, `host:port`, host list, or URI depending on backend
    /// - `SEMVER_BACKEND_DB` — Redis db index, Cassandra keyspace, or `MongoDB` database
    /// - `SEMVER_BACKEND_NAMESPACE` — Redis key prefix or `MongoDB` collection
    /// - `SEMVER_BACKEND_USER` / `SEMVER_BACKEND_TOKEN` — credentials
    /// - `SEMVER_BACKEND_RETRIES` — Redis reconnect attempts (default: `5`)
    /// - `SEMVER_BACKEND_CONSISTENCY` — Cassandra consistency (default: `quorum`)
    /// - `SEMVER_BACKEND_REPLICATION` — Cassandra replication factor (default: `3`)
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if a variable is set to an unusable value.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Same as [`from_env`](Self::from_env), reading variables through `lookup`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if a variable is set to an unusable value.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let bind_addr = parse_or(var("SEMVER_BIND_ADDR"), "SEMVER_BIND_ADDR", || {
            SocketAddr::from(([0, 0, 0, 0], 4000))
        })?;
        let log_level = var("SEMVER_LOG_LEVEL").unwrap_or_else(|| "info".to_owned());
        let create_concurrency = parse_or(
            var("SEMVER_CREATE_CONCURRENCY"),
            "SEMVER_CREATE_CONCURRENCY",
            || 64,
        )?;

        let addr = var("SEMVER_BACKEND_ADDR");
        let db = var("SEMVER_BACKEND_DB");
        let namespace = var("SEMVER_BACKEND_NAMESPACE");
        let user = var("SEMVER_BACKEND_USER");
        let token = var("SEMVER_BACKEND_TOKEN");

        let name = var("SEMVER_BACKEND_STORAGE").unwrap_or_else(|| "redb".to_owned());
        let storage = match name.to_lowercase().as_str() {
            "redb" | "bolt" | "embedded" | "embedded-file" => StorageConfig::Redb(RedbConfig {
                path: addr.map_or_else(|| RedbConfig::default().path, PathBuf::from),
            }),
            "redis" | "cache" | "networked-cache" => {
                let defaults = RedisConfig::default();
                StorageConfig::Redis(RedisConfig {
                    addr: addr.unwrap_or(defaults.addr),
                    db: parse_or(db, "SEMVER_BACKEND_DB", || defaults.db)?,
                    password: token,
                    retries: parse_or(
                        var("SEMVER_BACKEND_RETRIES"),
                        "SEMVER_BACKEND_RETRIES",
                        || defaults.retries,
                    )?,
                    namespace: namespace.unwrap_or(defaults.namespace),
                })
            }
            "cassandra" | "scylla" | "wide-column" => {
                let defaults = CassandraConfig::default();
                let hosts = addr.map_or(defaults.hosts, |list| {
                    list.split(',')
                        .map(str::trim)
                        .filter(|h| !h.is_empty())
                        .map(str::to_owned)
                        .collect()
                });
                let consistency = match var("SEMVER_BACKEND_CONSISTENCY") {
                    Some(raw) => raw.parse::<Consistency>().map_err(|reason| {
                        ConfigError::InvalidValue {
                            var: "SEMVER_BACKEND_CONSISTENCY",
                            reason,
                        }
                    })?,
                    None => defaults.consistency,
                };
                StorageConfig::Cassandra(CassandraConfig {
                    hosts,
                    keyspace: db.unwrap_or(defaults.keyspace),
                    username: user,
                    password: token,
                    consistency,
                    replication_factor: parse_or(
                        var("SEMVER_BACKEND_REPLICATION"),
                        "SEMVER_BACKEND_REPLICATION",
                        || defaults.replication_factor,
                    )?,
                })
            }
            "mongodb" | "mongo" | "document" | "document-store" => {
                let defaults = MongoConfig::default();
                StorageConfig::Mongo(MongoConfig {
                    uri: addr.unwrap_or(defaults.uri),
                    database: db.unwrap_or(defaults.database),
                    collection: namespace.unwrap_or(defaults.collection),
                })
            }
            "memory" => StorageConfig::Memory,
            _ => return Err(ConfigError::UnknownStorage { name }),
        };

        Ok(Self {
            bind_addr,
            log_level,
            create_concurrency,
            storage,
        })
    }
}

fn parse_or<T>(
    raw: Option<String>,
    var: &'static str,
    default: impl FnOnce() -> T,
) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match raw {
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            var,
            reason: format!("'{raw}': {e}"),
        }),
        None => Ok(default()),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn load(vars: &[(&str, &str)]) -> Result<ServerConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        ServerConfig::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn defaults_to_redb_on_port_4000() {
        let config = load(&[]).unwrap();
        assert_eq!(config.bind_addr, SocketAddr::from(([0, 0, 0, 0], 4000)));
        assert_eq!(config.log_level, "info");
        assert_eq!(config.storage, StorageConfig::Redb(RedbConfig::default()));
    }

    #[test]
    fn storage_aliases_resolve() {
        for (alias, name) in [
            ("bolt", "redb"),
            ("embedded-file", "redb"),
            ("cache", "redis"),
            ("Scylla", "cassandra"),
            ("document-store", "mongodb"),
            ("MEMORY", "memory"),
        ] {
            let config = load(&[("SEMVER_BACKEND_STORAGE", alias)]).unwrap();
            assert_eq!(config.storage.name(), name, "alias {alias}");
        }
    }

    #[test]
    fn redis_settings_come_from_shared_variables() {
        let config = load(&[
            ("SEMVER_BACKEND_STORAGE", "redis"),
            ("SEMVER_BACKEND_ADDR", "cache:6380"),
            ("SEMVER_BACKEND_DB", "2"),
            ("SEMVER_BACKEND_TOKEN", "secret"),
            ("SEMVER_BACKEND_RETRIES", "9"),
        ])
        .unwrap();
        let StorageConfig::Redis(redis) = config.storage else {
            panic!("expected redis config");
        };
        assert_eq!(redis.addr, "cache:6380");
        assert_eq!(redis.db, 2);
        assert_eq!(redis.password.as_deref(), Some("secret"));
        assert_eq!(redis.retries, 9);
        assert_eq!(redis.namespace, "semver:db");
    }

    #[test]
    fn cassandra_hosts_split_on_commas() {
        let config = load(&[
            ("SEMVER_BACKEND_STORAGE", "cassandra"),
            ("SEMVER_BACKEND_ADDR", "n1:9042, n2:9042,"),
            ("SEMVER_BACKEND_CONSISTENCY", "local_quorum"),
            ("SEMVER_BACKEND_USER", "cassandra"),
        ])
        .unwrap();
        let StorageConfig::Cassandra(cassandra) = config.storage else {
            panic!("expected cassandra config");
        };
        assert_eq!(cassandra.hosts, vec!["n1:9042", "n2:9042"]);
        assert_eq!(cassandra.consistency, Consistency::LocalQuorum);
        assert_eq!(cassandra.keyspace, "semver");
        assert_eq!(cassandra.username.as_deref(), Some("cassandra"));
        assert_eq!(cassandra.replication_factor, 3);
    }

    #[test]
    fn mongo_uses_namespace_as_collection() {
        let config = load(&[
            ("SEMVER_BACKEND_STORAGE", "mongo"),
            ("SEMVER_BACKEND_NAMESPACE", "versions"),
        ])
        .unwrap();
        let StorageConfig::Mongo(mongo) = config.storage else {
            panic!("expected mongo config");
        };
        assert_eq!(mongo.uri, "mongodb://localhost:27017");
        assert_eq!(mongo.collection, "versions");
    }

    #[test]
    fn bad_values_are_rejected() {
        assert!(matches!(
            load(&[("SEMVER_BACKEND_STORAGE", "etcd")]),
            Err(ConfigError::UnknownStorage { .. })
        ));
        assert!(matches!(
            load(&[("SEMVER_BIND_ADDR", "nowhere")]),
            Err(ConfigError::InvalidValue { var: "SEMVER_BIND_ADDR", .. })
        ));
        assert!(matches!(
            load(&[
                ("SEMVER_BACKEND_STORAGE", "redis"),
                ("SEMVER_BACKEND_DB", "zero")
            ]),
            Err(ConfigError::InvalidValue { var: "SEMVER_BACKEND_DB", .. })
        ));
    }
}
