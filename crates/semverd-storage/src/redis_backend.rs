//! Redis storage backend: the networked-cache adapter.
//!
//! Redis has no hierarchy, so every key becomes one flat string
//! `<namespace>:<owner>[:<segment>]*`. Listing cannot walk an ordered
//! keyspace; it asks Redis for every key matching `<encoded key>:*` and
//! re-splits the part after the owner prefix. Multi-key calls map onto
//! `MSET`, `MGET`, and `DEL`.
//!
//! The connection is a [`ConnectionManager`], which reconnects on its own
//! using the configured retry count. The adapter itself never retries.

use redis::aio::{ConnectionManager, ConnectionManagerConfig};
use redis::{ConnectionAddr, ConnectionInfo, RedisConnectionInfo, RedisError};
use tracing::{debug, info};

use crate::{Client, Key, RedisConfig, StorageError};

const DELIMITER: char = ':';
const DEFAULT_PORT: u16 = 6379;

/// Connection settings for `config`.
///
/// Built field by field so credentials never pass through URL parsing.
fn connection_info(config: &RedisConfig) -> Result<ConnectionInfo, String> {
    let (host, port) = match config.addr.rsplit_once(':') {
        Some((host, port)) if !host.ends_with(':') => {
            let port = port
                .parse::<u16>()
                .map_err(|e| format!("invalid port '{port}': {e}"))?;
            (host, port)
        }
        _ => (config.addr.as_str(), DEFAULT_PORT),
    };
    let host = host.trim_start_matches('[').trim_end_matches(']');
    if host.is_empty() {
        return Err(format!("missing host in '{}'", config.addr));
    }

    Ok(ConnectionInfo {
        addr: ConnectionAddr::Tcp(host.to_owned(), port),
        redis: RedisConnectionInfo {
            db: config.db,
            password: config.password.clone(),
            ..RedisConnectionInfo::default()
        },
    })
}

/// Escape Redis glob metacharacters so `s` only matches itself.
fn escape_glob(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Flat Redis key for `key`.
fn encode(namespace: &str, key: &Key) -> String {
    let mut out = format!("{namespace}{DELIMITER}{}", key.owner());
    for segment in key.segments() {
        out.push(DELIMITER);
        out.push_str(segment);
    }
    out
}

/// Glob matching every key strictly below `key`.
fn descendants_pattern(namespace: &str, key: &Key) -> String {
    let mut out = escape_glob(namespace);
    out.push(DELIMITER);
    out.push_str(&escape_glob(key.owner()));
    for segment in key.segments() {
        out.push(DELIMITER);
        out.push_str(&escape_glob(segment));
    }
    out.push(DELIMITER);
    out.push('*');
    out
}

/// Turn a raw Redis key returned by a scan back into a [`Key`] below `parent`.
fn decode(namespace: &str, parent: &Key, raw: &str) -> Option<Key> {
    let owner_prefix = format!("{}{DELIMITER}", encode(namespace, &Key::owner_scope(parent.owner())));
    let rest = raw.strip_prefix(&owner_prefix)?;
    let key = Key::split(parent.owner(), rest, DELIMITER);
    key.is_descendant_of(parent).then_some(key)
}

/// A storage backend backed by Redis.
///
/// Cheap to clone; all clones share one multiplexed connection.
///
/// # Examples
///
/// ```no_run
/// # use semverd_storage::{RedisBackend, RedisConfig};
/// # #[tokio::main]
/// # async fn main() {
/// let backend = RedisBackend::connect(&RedisConfig::default()).await.unwrap();
/// # }
/// ```
#[derive(Clone)]
pub struct RedisBackend {
    conn: ConnectionManager,
    namespace: String,
    addr: String,
}

impl std::fmt::Debug for RedisBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisBackend")
            .field("addr", &self.addr)
            .field("namespace", &self.namespace)
            .finish_non_exhaustive()
    }
}

impl RedisBackend {
    /// Connect to Redis.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Connection`] if the URL is invalid or the
    /// server cannot be reached.
    pub async fn connect(config: &RedisConfig) -> Result<Self, StorageError> {
        let connection_error = |reason: String| StorageError::Connection {
            backend: "redis",
            addr: config.addr.clone(),
            reason,
        };

        let info = connection_info(config).map_err(connection_error)?;
        let client =
            redis::Client::open(info).map_err(|e| connection_error(e.to_string()))?;
        let manager_config =
            ConnectionManagerConfig::new().set_number_of_retries(config.retries);
        let conn = ConnectionManager::new_with_config(client, manager_config)
            .await
            .map_err(|e| connection_error(e.to_string()))?;

        info!(addr = %config.addr, db = config.db, namespace = %config.namespace, "connected to redis");

        Ok(Self {
            conn,
            namespace: config.namespace.clone(),
            addr: config.addr.clone(),
        })
    }

    async fn scan(&self, key: &Key) -> Result<Vec<String>, RedisError> {
        let mut conn = self.conn.clone();
        redis::cmd("KEYS")
            .arg(descendants_pattern(&self.namespace, key))
            .query_async(&mut conn)
            .await
    }
}

#[async_trait::async_trait]
impl Client for RedisBackend {
    fn name(&self) -> &'static str {
        "redis"
    }

    fn path(&self, key: &Key) -> String {
        encode(&self.namespace, key)
    }

    async fn exists(&self, key: &Key) -> Result<bool, StorageError> {
        let read_error = |e: RedisError| StorageError::Read {
            key: key.to_string(),
            reason: e.to_string(),
        };

        if key.is_owner_scope() {
            let found = self.scan(key).await.map_err(read_error)?;
            return Ok(!found.is_empty());
        }

        let mut conn = self.conn.clone();
        let value: Option<String> = redis::cmd("GET")
            .arg(self.path(key))
            .query_async(&mut conn)
            .await
            .map_err(read_error)?;
        Ok(value.is_some())
    }

    async fn set(&self, value: &str, keys: &[Key]) -> Result<(), StorageError> {
        if keys.is_empty() {
            return Ok(());
        }
        let mut cmd = redis::cmd("MSET");
        for key in keys {
            key.ensure_encodable(DELIMITER, true)?;
            cmd.arg(self.path(key)).arg(value);
        }
        debug!(backend = "redis", keys = keys.len(), "set");

        let mut conn = self.conn.clone();
        let () = cmd
            .query_async(&mut conn)
            .await
            .map_err(|e| StorageError::Write {
                key: keys[0].to_string(),
                reason: e.to_string(),
            })?;
        Ok(())
    }

    async fn get(&self, keys: &[Key]) -> Result<Vec<String>, StorageError> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let mut cmd = redis::cmd("MGET");
        for key in keys {
            cmd.arg(self.path(key));
        }

        let mut conn = self.conn.clone();
        let values: Vec<Option<String>> =
            cmd.query_async(&mut conn)
                .await
                .map_err(|e| StorageError::Read {
                    key: keys[0].to_string(),
                    reason: e.to_string(),
                })?;

        keys.iter()
            .zip(values)
            .map(|(key, value)| {
                value.ok_or_else(|| StorageError::NotFound {
                    key: key.to_string(),
                })
            })
            .collect()
    }

    async fn list(&self, key: &Key) -> Result<Vec<Key>, StorageError> {
        let raw = self.scan(key).await.map_err(|e| StorageError::List {
            prefix: key.to_string(),
            reason: e.to_string(),
        })?;
        Ok(raw
            .iter()
            .filter_map(|r| decode(&self.namespace, key, r))
            .collect())
    }

    async fn delete(&self, keys: &[Key]) -> Result<(), StorageError> {
        let mut targets = Vec::with_capacity(keys.len());
        for key in keys {
            if key.is_owner_scope() {
                let found = self.scan(key).await.map_err(|e| StorageError::Delete {
                    key: key.to_string(),
                    reason: e.to_string(),
                })?;
                targets.extend(found);
            }
            targets.push(self.path(key));
        }
        if targets.is_empty() {
            return Ok(());
        }
        debug!(backend = "redis", keys = targets.len(), "delete");

        let mut conn = self.conn.clone();
        let _removed: i64 = redis::cmd("DEL")
            .arg(&targets)
            .query_async(&mut conn)
            .await
            .map_err(|e| StorageError::Delete {
                key: targets.first().cloned().unwrap_or_default(),
                reason: e.to_string(),
            })?;
        Ok(())
    }
}
