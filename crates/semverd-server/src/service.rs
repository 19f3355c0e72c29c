//! Project versioning on top of the storage [`Manager`].
//!
//! A project is an owner in storage. Its current version sits in the
//! canonical `version` slot and every version it ever had is archived under
//! `archive/<version>`. Each write updates both in a single `set` call.

use std::fmt;

use semver::{BuildMetadata, Prerelease, Version};
use serde::Serialize;
use tracing::{debug, info};
use uuid::Uuid;

use semverd_storage::{CANONICAL_SLOT, Key, Manager, StorageError};

/// Version given to projects created without one.
pub const DEFAULT_VERSION: &str = "0.0.1";

const ARCHIVE: &str = "archive";

/// Errors from project operations.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// The project id is not a UUID.
    #[error("invalid uuid")]
    InvalidUuid { id: String },

    /// A version string is not valid semantic versioning.
    #[error("invalid semantic versioning format")]
    InvalidVersion { input: String, reason: String },

    /// No project with this id.
    #[error("project id does not match any records in our database")]
    ProjectNotFound { id: String },

    /// The storage backend failed.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Which component a bump increments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BumpKind {
    Major,
    Minor,
    #[default]
    Patch,
}

impl BumpKind {
    /// Parse a `type` query value. Anything unrecognized bumps the patch.
    pub fn from_query(raw: Option<&str>) -> Self {
        match raw.map(str::trim) {
            Some(t) if t.eq_ignore_ascii_case("major") => Self::Major,
            Some(t) if t.eq_ignore_ascii_case("minor") => Self::Minor,
            _ => Self::Patch,
        }
    }

    /// Apply this bump. Pre-release identifiers are dropped; build metadata
    /// is kept.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::InvalidVersion`] if the bumped component is
    /// already at `u64::MAX`.
    pub fn apply(self, version: &Version) -> Result<Version, ServiceError> {
        let overflow = || ServiceError::InvalidVersion {
            input: version.to_string(),
            reason: format!("{} component cannot be incremented", self.component()),
        };
        let mut next = version.clone();
        match self {
            Self::Major => {
                next.major = next.major.checked_add(1).ok_or_else(overflow)?;
                next.minor = 0;
                next.patch = 0;
            }
            Self::Minor => {
                next.minor = next.minor.checked_add(1).ok_or_else(overflow)?;
                next.patch = 0;
            }
            Self::Patch => next.patch = next.patch.checked_add(1).ok_or_else(overflow)?,
        }
        next.pre = Prerelease::EMPTY;
        Ok(next)
    }

    fn component(self) -> &'static str {
        match self {
            Self::Major => "major",
            Self::Minor => "minor",
            Self::Patch => "patch",
        }
    }
}

/// A version as returned to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Versioning {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
    pub version: String,
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub build: Vec<String>,
}

impl Versioning {
    fn new(version: &Version) -> Self {
        Self {
            project: None,
            version: version.to_string(),
            major: version.major,
            minor: version.minor,
            patch: version.patch,
            build: build_identifiers(&version.build),
        }
    }

    fn with_project(mut self, id: String) -> Self {
        self.project = Some(id);
        self
    }
}

/// Plain-text form: the project id when present, otherwise the version.
impl fmt::Display for Versioning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.project {
            Some(project) => f.write_str(project),
            None => f.write_str(&self.version),
        }
    }
}

/// Every archived version of a project, oldest first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Archive {
    pub versions: Vec<Versioning>,
}

impl fmt::Display for Archive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for version in &self.versions {
            writeln!(f, "{version}")?;
        }
        Ok(())
    }
}

fn build_identifiers(build: &BuildMetadata) -> Vec<String> {
    if build.is_empty() {
        return Vec::new();
    }
    build.as_str().split('.').map(str::to_owned).collect()
}

fn parse_version(input: &str) -> Result<Version, ServiceError> {
    Version::parse(input.trim()).map_err(|e| ServiceError::InvalidVersion {
        input: input.to_owned(),
        reason: e.to_string(),
    })
}

fn parse_uuid(id: &str) -> Result<(), ServiceError> {
    Uuid::parse_str(id)
        .map(|_| ())
        .map_err(|_| ServiceError::InvalidUuid { id: id.to_owned() })
}

/// Project operations backed by a storage [`Manager`].
#[derive(Debug, Clone)]
pub struct VersionService {
    manager: Manager,
}

impl VersionService {
    pub fn new(manager: Manager) -> Self {
        Self { manager }
    }

    /// The storage manager behind this service.
    pub fn manager(&self) -> &Manager {
        &self.manager
    }

    fn canonical(&self, id: &str) -> Key {
        self.manager.path(id, [CANONICAL_SLOT])
    }

    /// Store `version` as current and archive it, in one call.
    async fn write(&self, id: &str, version: &Version) -> Result<(), ServiceError> {
        let value = version.to_string();
        let archived = self.manager.path(id, [ARCHIVE, value.as_str()]);
        self.manager
            .set(&value, &[self.canonical(id), archived])
            .await?;
        debug!(project = %id, version = %value, "version stored");
        Ok(())
    }

    async fn ensure_exists(&self, id: &str) -> Result<(), ServiceError> {
        parse_uuid(id)?;
        if self.manager.exists(&self.canonical(id)).await? {
            Ok(())
        } else {
            Err(ServiceError::ProjectNotFound { id: id.to_owned() })
        }
    }

    /// Generate a project id not yet known to storage.
    async fn unique_id(&self) -> Result<String, ServiceError> {
        self.first_unused(|| Uuid::new_v4().to_string()).await
    }

    /// First candidate without a canonical version record. Only the canonical
    /// slot is checked, since owner-scope `exists` is a keyspace scan on Redis.
    async fn first_unused(
        &self,
        mut candidate: impl FnMut() -> String,
    ) -> Result<String, ServiceError> {
        loop {
            let id = candidate();
            if !self.manager.exists(&self.canonical(&id)).await? {
                return Ok(id);
            }
        }
    }

    /// Create a project at `version` (default [`DEFAULT_VERSION`]).
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::InvalidVersion`] or a storage error.
    pub async fn create(&self, version: Option<&str>) -> Result<Versioning, ServiceError> {
        let input = version
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .unwrap_or(DEFAULT_VERSION);
        let version = parse_version(input)?;
        let id = self.unique_id().await?;
        self.write(&id, &version).await?;
        info!(project = %id, version = %version, "project created");
        Ok(Versioning::new(&version).with_project(id))
    }

    /// Current version of project `id`.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::ProjectNotFound`] if nothing is stored for `id`.
    pub async fn current(&self, id: &str) -> Result<Versioning, ServiceError> {
        parse_uuid(id)?;
        let stored = match self.manager.get(&[self.canonical(id)]).await {
            Ok(values) => values,
            Err(e) if e.is_not_found() => {
                return Err(ServiceError::ProjectNotFound { id: id.to_owned() });
            }
            Err(e) => return Err(e.into()),
        };
        let raw = stored
            .first()
            .ok_or_else(|| ServiceError::ProjectNotFound { id: id.to_owned() })?;
        Ok(Versioning::new(&parse_version(raw)?))
    }

    /// Replace the current version of an existing project.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::ProjectNotFound`] for unknown projects and
    /// [`ServiceError::InvalidVersion`] for malformed input.
    pub async fn set(&self, id: &str, version: &str) -> Result<Versioning, ServiceError> {
        self.ensure_exists(id).await?;
        let version = parse_version(version)?;
        self.write(id, &version).await?;
        Ok(Versioning::new(&version))
    }

    /// Bump the current version of an existing project.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::ProjectNotFound`] for unknown projects and
    /// [`ServiceError::InvalidVersion`] when the component would overflow.
    pub async fn bump(&self, id: &str, kind: BumpKind) -> Result<Versioning, ServiceError> {
        self.ensure_exists(id).await?;
        let current = self.current(id).await?;
        let next = kind.apply(&parse_version(&current.version)?)?;
        self.write(id, &next).await?;
        info!(project = %id, from = %current.version, to = %next, "version bumped");
        Ok(Versioning::new(&next))
    }

    /// Every version project `id` has had, in ascending version order.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::ProjectNotFound`] for unknown projects.
    pub async fn history(&self, id: &str) -> Result<Archive, ServiceError> {
        self.ensure_exists(id).await?;
        let keys = self.manager.list(&self.manager.path(id, [ARCHIVE])).await?;
        let values = self.manager.get(&keys).await?;
        let mut versions = values
            .iter()
            .map(|raw| parse_version(raw))
            .collect::<Result<Vec<_>, _>>()?;
        versions.sort();
        Ok(Archive {
            versions: versions.iter().map(Versioning::new).collect(),
        })
    }

    /// Remove project `id` and its whole history.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::ProjectNotFound`] for unknown projects.
    pub async fn delete(&self, id: &str) -> Result<(), ServiceError> {
        self.ensure_exists(id).await?;
        let keys = self
            .manager
            .list(&Key::owner_scope(id))
            .await?;
        self.manager.delete(&keys).await?;
        info!(project = %id, records = keys.len(), "project deleted");
        Ok(())
    }
}
