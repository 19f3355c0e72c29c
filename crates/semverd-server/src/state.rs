//! Shared application state for the `semverd` server.
//!
//! A single [`AppState`] is constructed at startup and shared across all
//! Axum handlers via `Arc`.

use semverd_storage::Manager;

use crate::service::VersionService;

/// Shared application state passed to all HTTP handlers.
#[derive(Debug)]
pub struct AppState {
    /// Project version operations.
    pub versions: VersionService,
}

impl AppState {
    pub fn new(manager: Manager) -> Self {
        Self {
            versions: VersionService::new(manager),
        }
    }

    /// The storage manager, for shutdown.
    pub fn manager(&self) -> &Manager {
        self.versions.manager()
    }
}
