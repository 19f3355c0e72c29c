//! The single entry point service code uses for storage.

use crate::{Backend, Client, Key, StorageConfig, StorageError};

/// Forwards every operation to the registered [`Backend`].
///
/// A manager may be created empty and given a backend later with
/// [`use_backend`](Self::use_backend). Calling any operation before that is a
/// programming error and panics.
///
/// # Examples
///
/// ```
/// # use semverd_storage::{Manager, MemoryBackend};
/// # #[tokio::main]
/// # async fn main() {
/// let manager = Manager::new(MemoryBackend::new());
/// let key = manager.path("p1", ["version"]);
/// manager.set("1.0.0", &[key.clone()]).await.unwrap();
/// assert_eq!(manager.get(&[key]).await.unwrap(), vec!["1.0.0"]);
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct Manager {
    client: Option<Backend>,
}

impl Manager {
    /// Create a manager with `backend` registered.
    pub fn new(backend: impl Into<Backend>) -> Self {
        Self {
            client: Some(backend.into()),
        }
    }

    /// Initialize the backend described by `config` and register it.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Connection`] if the backend cannot be
    /// initialized.
    pub async fn init(config: &StorageConfig) -> Result<Self, StorageError> {
        Ok(Self::new(Backend::init(config).await?))
    }

    /// Register `backend`, replacing any previous one.
    pub fn use_backend(&mut self, backend: impl Into<Backend>) {
        self.client = Some(backend.into());
    }

    #[allow(clippy::panic)]
    fn client(&self) -> &Backend {
        match &self.client {
            Some(client) => client,
            None => panic!("storage client has not been registered"),
        }
    }

    /// Name of the registered backend.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.client().name()
    }

    /// Build a key. Pure; touches no storage.
    #[must_use]
    pub fn path<I, S>(&self, owner: impl Into<String>, segments: I) -> Key
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let _ = self.client();
        Key::new(owner, segments)
    }

    /// # Errors
    ///
    /// Propagates backend failures.
    pub async fn exists(&self, key: &Key) -> Result<bool, StorageError> {
        self.client().exists(key).await
    }

    /// # Errors
    ///
    /// Propagates backend failures and [`StorageError::InvalidKey`].
    pub async fn set(&self, value: &str, keys: &[Key]) -> Result<(), StorageError> {
        self.client().set(value, keys).await
    }

    /// # Errors
    ///
    /// Returns [`StorageError::NotFound`] if any key is absent.
    pub async fn get(&self, keys: &[Key]) -> Result<Vec<String>, StorageError> {
        self.client().get(keys).await
    }

    /// # Errors
    ///
    /// Propagates backend failures.
    pub async fn list(&self, key: &Key) -> Result<Vec<Key>, StorageError> {
        self.client().list(key).await
    }

    /// # Errors
    ///
    /// Propagates backend failures.
    pub async fn delete(&self, keys: &[Key]) -> Result<(), StorageError> {
        self.client().delete(keys).await
    }

    /// Release the backend's connections.
    ///
    /// # Errors
    ///
    /// Propagates backend failures.
    pub async fn close(&self) -> Result<(), StorageError> {
        self.client().close().await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::MemoryBackend;

    #[tokio::test]
    async fn forwards_to_registered_backend() {
        let manager = Manager::new(MemoryBackend::new());
        assert_eq!(manager.name(), "memory");

        let key = manager.path("p1", ["version"]);
        assert!(!manager.exists(&key).await.unwrap());
        manager.set("1.0.0", &[key.clone()]).await.unwrap();
        assert!(manager.exists(&key).await.unwrap());
        assert_eq!(manager.get(&[key]).await.unwrap(), vec!["1.0.0"]);
        manager.close().await.unwrap();
    }

    #[tokio::test]
    async fn bump_scenario_keeps_history() {
        let manager = Manager::init(&StorageConfig::Memory).await.unwrap();
        let version = manager.path("p1", ["version"]);

        manager
            .set("1.0.0", &[version.clone(), manager.path("p1", ["archive", "1.0.0"])])
            .await
            .unwrap();
        manager
            .set("1.1.0", &[version.clone(), manager.path("p1", ["archive", "1.1.0"])])
            .await
            .unwrap();

        assert_eq!(manager.get(&[version]).await.unwrap(), vec!["1.1.0"]);
        let archive = manager
            .list(&manager.path("p1", ["archive"]))
            .await
            .unwrap();
        assert_eq!(archive.len(), 2);
        let mut history = manager.get(&archive).await.unwrap();
        history.sort();
        assert_eq!(history, vec!["1.0.0", "1.1.0"]);

        let all = manager.list(&manager.path("p1", Vec::<String>::new())).await.unwrap();
        assert_eq!(all.len(), 3);
        manager.delete(&all).await.unwrap();
        manager.delete(&all).await.unwrap();
        assert!(!manager.exists(&Key::owner_scope("p1")).await.unwrap());
    }

    #[tokio::test]
    async fn use_backend_replaces_client() {
        let mut manager = Manager::default();
        manager.use_backend(MemoryBackend::new());
        assert_eq!(manager.name(), "memory");
    }

    #[test]
    #[should_panic(expected = "has not been registered")]
    fn unregistered_manager_panics() {
        let manager = Manager::default();
        let _ = manager.name();
    }
}
