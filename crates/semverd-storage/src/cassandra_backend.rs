//! Cassandra / `ScyllaDB` storage backend: the wide-column adapter.
//!
//! One partition per owner in a single table:
//!
//! ```text
//! CREATE TABLE entries (owner text, path text, value text, PRIMARY KEY (owner, path))
//! ```
//!
//! `path` is the key's segments joined by `/`. Every `set` and `delete` call
//! is sent as one LOGGED batch, so all mutations of a call apply together.
//! Listing reads every `path` of the partition and filters client-side.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use scylla::batch::{Batch, BatchType};
use scylla::frame::response::result::CqlValue;
use scylla::query::Query;
use scylla::statement::Consistency as CqlConsistency;
use scylla::transport::ExecutionProfile;
use scylla::{Session, SessionBuilder};
use tracing::{debug, info};

use crate::{CassandraConfig, Client, Consistency, Key, StorageError};

const DELIMITER: char = '/';

const CREATE_TABLE: &str = "CREATE TABLE IF NOT EXISTS entries (\
    owner text, \
    path  text, \
    value text, \
    PRIMARY KEY (owner, path)\
)";
const INSERT: &str = "INSERT INTO entries (owner, path, value) VALUES (?, ?, ?)";
const DELETE_PATH: &str = "DELETE FROM entries WHERE owner = ? AND path = ?";
const DELETE_OWNER: &str = "DELETE FROM entries WHERE owner = ?";
const SELECT_VALUES: &str = "SELECT path, value FROM entries WHERE owner = ? AND path IN ?";
const SELECT_PATHS: &str = "SELECT path FROM entries WHERE owner = ?";
const COUNT_OWNER: &str = "SELECT COUNT(*) FROM entries WHERE owner = ?";

impl From<Consistency> for CqlConsistency {
    fn from(c: Consistency) -> Self {
        match c {
            Consistency::One => Self::One,
            Consistency::Quorum => Self::Quorum,
            Consistency::LocalQuorum => Self::LocalQuorum,
            Consistency::All => Self::All,
        }
    }
}

/// Keyspace names are interpolated into DDL, so only plain identifiers pass.
fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        && name.len() <= 48
}

fn create_keyspace_statement(keyspace: &str, replication_factor: u32) -> String {
    format!(
        "CREATE KEYSPACE IF NOT EXISTS {keyspace} WITH replication = \
         {{'class': 'SimpleStrategy', 'replication_factor': {replication_factor}}}"
    )
}

fn encode(key: &Key) -> String {
    key.join(DELIMITER)
}

/// Group keys by owner, keeping each key next to its encoded path.
fn group_by_owner(keys: &[Key]) -> BTreeMap<&str, Vec<(&Key, String)>> {
    let mut groups: BTreeMap<&str, Vec<(&Key, String)>> = BTreeMap::new();
    for key in keys {
        groups.entry(key.owner()).or_default().push((key, encode(key)));
    }
    groups
}

/// Decode partition paths and keep the ones strictly below `parent`.
fn descendants(parent: &Key, paths: impl IntoIterator<Item = String>) -> Vec<Key> {
    paths
        .into_iter()
        .map(|p| Key::split(parent.owner(), &p, DELIMITER))
        .filter(|k| k.is_descendant_of(parent))
        .collect()
}

/// Build the single logged batch for a `delete` call.
fn delete_batch(keys: &[Key]) -> (Batch, Vec<Vec<CqlValue>>) {
    let mut batch = Batch::new(BatchType::Logged);
    let mut values = Vec::with_capacity(keys.len());
    for (owner, entries) in group_by_owner(keys) {
        if entries.iter().any(|(k, _)| k.is_owner_scope()) {
            batch.append_statement(DELETE_OWNER);
            values.push(vec![CqlValue::Text(owner.to_owned())]);
            continue;
        }
        for (_, path) in entries {
            batch.append_statement(DELETE_PATH);
            values.push(vec![CqlValue::Text(owner.to_owned()), CqlValue::Text(path)]);
        }
    }
    (batch, values)
}

/// A storage backend backed by Cassandra or `ScyllaDB`.
///
/// # Examples
///
/// ```no_run
/// # use semverd_storage::{CassandraBackend, CassandraConfig};
/// # #[tokio::main]
/// # async fn main() {
/// let backend = CassandraBackend::connect(&CassandraConfig::default()).await.unwrap();
/// # }
/// ```
#[derive(Clone)]
pub struct CassandraBackend {
    session: Arc<Session>,
    keyspace: String,
}

impl std::fmt::Debug for CassandraBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CassandraBackend")
            .field("keyspace", &self.keyspace)
            .finish_non_exhaustive()
    }
}

impl CassandraBackend {
    /// Connect to the cluster and create the keyspace and table if missing.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Connection`] if the keyspace name is not a
    /// plain identifier, the cluster cannot be reached, or schema creation
    /// fails.
    pub async fn connect(config: &CassandraConfig) -> Result<Self, StorageError> {
        let addr = config.hosts.join(",");
        let connection_error = |reason: String| StorageError::Connection {
            backend: "cassandra",
            addr: addr.clone(),
            reason,
        };

        if !is_identifier(&config.keyspace) {
            return Err(connection_error(format!(
                "invalid keyspace name '{}'",
                config.keyspace
            )));
        }

        let profile = ExecutionProfile::builder()
            .consistency(config.consistency.into())
            .build();
        let mut builder = SessionBuilder::new()
            .known_nodes(&config.hosts)
            .default_execution_profile_handle(profile.into_handle());
        if let (Some(user), Some(password)) = (&config.username, &config.password) {
            builder = builder.user(user, password);
        }
        let session = builder
            .build()
            .await
            .map_err(|e| connection_error(e.to_string()))?;

        session
            .query_unpaged(
                create_keyspace_statement(&config.keyspace, config.replication_factor),
                (),
            )
            .await
            .map_err(|e| connection_error(format!("keyspace creation failed: {e}")))?;
        session
            .use_keyspace(config.keyspace.as_str(), false)
            .await
            .map_err(|e| connection_error(format!("use keyspace failed: {e}")))?;
        session
            .query_unpaged(CREATE_TABLE, ())
            .await
            .map_err(|e| connection_error(format!("table creation failed: {e}")))?;

        info!(hosts = %addr, keyspace = %config.keyspace, "connected to cassandra");

        Ok(Self {
            session: Arc::new(session),
            keyspace: config.keyspace.clone(),
        })
    }
}

#[async_trait::async_trait]
impl Client for CassandraBackend {
    fn name(&self) -> &'static str {
        "cassandra"
    }

    fn path(&self, key: &Key) -> String {
        encode(key)
    }

    async fn exists(&self, key: &Key) -> Result<bool, StorageError> {
        let read_error = |reason: String| StorageError::Read {
            key: key.owner().to_owned(),
            reason,
        };
        let mut query = Query::new(COUNT_OWNER);
        query.set_consistency(CqlConsistency::One);
        let (count,) = self
            .session
            .query_unpaged(query, (key.owner(),))
            .await
            .map_err(|e| read_error(e.to_string()))?
            .single_row_typed::<(i64,)>()
            .map_err(|e| read_error(e.to_string()))?;
        Ok(count > 0)
    }

    async fn set(&self, value: &str, keys: &[Key]) -> Result<(), StorageError> {
        if keys.is_empty() {
            return Ok(());
        }
        let mut batch = Batch::new(BatchType::Logged);
        let mut values = Vec::with_capacity(keys.len());
        for key in keys {
            key.ensure_encodable(DELIMITER, false)?;
            batch.append_statement(INSERT);
            values.push((key.owner().to_owned(), encode(key), value.to_owned()));
        }
        debug!(backend = "cassandra", keys = keys.len(), "set");

        self.session
            .batch(&batch, values)
            .await
            .map_err(|e| StorageError::Transaction {
                reason: format!("batch insert failed: {e}"),
            })?;
        Ok(())
    }

    async fn get(&self, keys: &[Key]) -> Result<Vec<String>, StorageError> {
        let mut found: HashMap<(&str, String), String> = HashMap::with_capacity(keys.len());
        for (owner, entries) in group_by_owner(keys) {
            let read_error = |reason: String| StorageError::Read {
                key: owner.to_owned(),
                reason,
            };
            let paths: Vec<String> = entries.into_iter().map(|(_, p)| p).collect();
            let result = self
                .session
                .query_unpaged(SELECT_VALUES, (owner, paths))
                .await
                .map_err(|e| read_error(e.to_string()))?;
            for row in result
                .rows_typed::<(String, String)>()
                .map_err(|e| read_error(e.to_string()))?
            {
                let (path, value) = row.map_err(|e| read_error(e.to_string()))?;
                found.insert((owner, path), value);
            }
        }

        keys.iter()
            .map(|key| {
                found
                    .get(&(key.owner(), encode(key)))
                    .cloned()
                    .ok_or_else(|| StorageError::NotFound {
                        key: key.to_string(),
                    })
            })
            .collect()
    }

    async fn list(&self, key: &Key) -> Result<Vec<Key>, StorageError> {
        let list_error = |reason: String| StorageError::List {
            prefix: key.to_string(),
            reason,
        };
        let result = self
            .session
            .query_unpaged(SELECT_PATHS, (key.owner(),))
            .await
            .map_err(|e| list_error(e.to_string()))?;
        let mut paths = Vec::new();
        for row in result
            .rows_typed::<(String,)>()
            .map_err(|e| list_error(e.to_string()))?
        {
            let (path,) = row.map_err(|e| list_error(e.to_string()))?;
            paths.push(path);
        }
        Ok(descendants(key, paths))
    }

    async fn delete(&self, keys: &[Key]) -> Result<(), StorageError> {
        if keys.is_empty() {
            return Ok(());
        }
        let (batch, values) = delete_batch(keys);
        debug!(backend = "cassandra", statements = values.len(), "delete");

        self.session
            .batch(&batch, values)
            .await
            .map_err(|e| StorageError::Transaction {
                reason: format!("batch delete failed: {e}"),
            })?;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn key(owner: &str, segments: &[&str]) -> Key {
        Key::new(owner, segments.iter().copied())
    }

    #[test]
    fn identifiers_are_validated() {
        assert!(is_identifier("semver"));
        assert!(is_identifier("semver_prod2"));
        assert!(!is_identifier("2semver"));
        assert!(!is_identifier("semver; DROP KEYSPACE x"));
        assert!(!is_identifier(""));
    }

    #[test]
    fn keyspace_statement_embeds_replication() {
        assert_eq!(
            create_keyspace_statement("semver", 3),
            "CREATE KEYSPACE IF NOT EXISTS semver WITH replication = \
             {'class': 'SimpleStrategy', 'replication_factor': 3}"
        );
    }

    #[test]
    fn paths_join_with_slash() {
        assert_eq!(encode(&key("p1", &["archive", "1.0.0"])), "archive/1.0.0");
        assert_eq!(encode(&Key::owner_scope("p1")), "");
    }

    #[test]
    fn grouping_merges_same_owner() {
        let keys = [
            key("p1", &["version"]),
            key("p2", &["version"]),
            key("p1", &["archive", "1.0.0"]),
        ];
        let groups = group_by_owner(&keys);
        assert_eq!(groups.len(), 2);
        let p1: Vec<&str> = groups["p1"].iter().map(|(_, p)| p.as_str()).collect();
        assert_eq!(p1, vec!["version", "archive/1.0.0"]);
    }

    #[test]
    fn descendants_filter_client_side() {
        let paths = ["a", "a/1", "b", "ab"].map(str::to_owned);
        assert_eq!(
            descendants(&key("p1", &["a"]), paths.clone()),
            vec![key("p1", &["a", "1"])]
        );
        assert_eq!(descendants(&Key::owner_scope("p1"), paths).len(), 4);
    }

    #[test]
    fn delete_batch_collapses_owner_scope() {
        let keys = [
            key("p1", &["version"]),
            Key::owner_scope("p1"),
            key("p2", &["version"]),
            key("p2", &["archive", "1.0.0"]),
        ];
        let (_batch, values) = delete_batch(&keys);
        assert_eq!(values.len(), 3);
        assert_eq!(values[0], vec![CqlValue::Text("p1".to_owned())]);
        assert_eq!(
            values[2],
            vec![
                CqlValue::Text("p2".to_owned()),
                CqlValue::Text("archive/1.0.0".to_owned())
            ]
        );
    }

    /// Runs against a live node: `SEMVER_TEST_CASSANDRA_HOSTS=127.0.0.1`.
    #[tokio::test]
    #[ignore = "requires a running Cassandra or ScyllaDB node"]
    async fn live_batch_roundtrip() {
        let hosts = std::env::var("SEMVER_TEST_CASSANDRA_HOSTS")
            .unwrap_or_else(|_| "127.0.0.1".to_owned());
        let backend = CassandraBackend::connect(&CassandraConfig {
            hosts: hosts.split(',').map(str::to_owned).collect(),
            keyspace: "semverd_test".to_owned(),
            replication_factor: 1,
            consistency: Consistency::One,
            ..CassandraConfig::default()
        })
        .await
        .unwrap();

        let owner = format!("owner-{}", std::process::id());
        let keys = [key(&owner, &["version"]), key(&owner, &["archive", "1.0.0"])];
        assert!(!backend.exists(&keys[0]).await.unwrap());

        backend.set("1.0.0", &keys).await.unwrap();
        assert!(backend.exists(&keys[0]).await.unwrap());
        assert_eq!(backend.get(&keys).await.unwrap(), vec!["1.0.0", "1.0.0"]);
        assert_eq!(
            backend.list(&key(&owner, &["archive"])).await.unwrap(),
            vec![keys[1].clone()]
        );

        backend.delete(&keys).await.unwrap();
        backend.delete(&keys).await.unwrap();
        assert!(!backend.exists(&Key::owner_scope(&owner)).await.unwrap());
    }
}
