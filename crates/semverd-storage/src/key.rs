//! Hierarchical record keys.

use std::fmt;

use crate::StorageError;

/// Address of one record: an owner plus an ordered list of path segments.
///
/// An empty segment list addresses the owner scope as a whole. Segment order
/// is significant and encodes hierarchy, so `("p1", ["archive"])` is the
/// parent of `("p1", ["archive", "1.0.0"])`.
///
/// # Examples
///
/// ```
/// # use semverd_storage::Key;
/// let parent = Key::new("p1", ["archive"]);
/// let child = parent.child("1.0.0");
/// assert!(child.is_descendant_of(&parent));
/// assert_eq!(child.to_string(), "p1/archive/1.0.0");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Key {
    owner: String,
    segments: Vec<String>,
}

impl Key {
    /// Build a key from an owner and its path segments.
    pub fn new<I, S>(owner: impl Into<String>, segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            owner: owner.into(),
            segments: segments.into_iter().map(Into::into).collect(),
        }
    }

    /// Key addressing the whole owner scope.
    pub fn owner_scope(owner: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            segments: Vec::new(),
        }
    }

    /// The owning identifier.
    #[must_use]
    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// The path segments below the owner.
    #[must_use]
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// True when this key addresses the owner scope rather than one record.
    #[must_use]
    pub fn is_owner_scope(&self) -> bool {
        self.segments.is_empty()
    }

    /// A new key one level below this one.
    #[must_use]
    pub fn child(&self, segment: impl Into<String>) -> Self {
        let mut segments = self.segments.clone();
        segments.push(segment.into());
        Self {
            owner: self.owner.clone(),
            segments,
        }
    }

    /// True when `self` lies strictly below `ancestor` under the same owner.
    #[must_use]
    pub fn is_descendant_of(&self, ancestor: &Key) -> bool {
        self.owner == ancestor.owner
            && self.segments.len() > ancestor.segments.len()
            && self.segments.starts_with(&ancestor.segments)
    }

    /// Join the segments with `delimiter`.
    #[must_use]
    pub fn join(&self, delimiter: char) -> String {
        let mut buf = [0u8; 4];
        self.segments.join(delimiter.encode_utf8(&mut buf))
    }

    /// Rebuild a key from a delimiter-joined path.
    ///
    /// The empty string decodes to the owner scope.
    pub fn split(owner: impl Into<String>, path: &str, delimiter: char) -> Self {
        if path.is_empty() {
            return Self::owner_scope(owner);
        }
        Self::new(owner, path.split(delimiter))
    }

    /// Reject keys the given delimiter cannot encode losslessly.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::InvalidKey`] if a segment (or the owner, when
    /// `check_owner` is set) is empty or contains `delimiter`.
    pub fn ensure_encodable(&self, delimiter: char, check_owner: bool) -> Result<(), StorageError> {
        self.ensure_owner()?;
        if check_owner && self.owner.contains(delimiter) {
            return Err(self.invalid(format!("owner must not contain '{delimiter}'")));
        }
        for segment in &self.segments {
            if segment.is_empty() {
                return Err(self.invalid("segments must not be empty".to_owned()));
            }
            if segment.contains(delimiter) {
                return Err(self.invalid(format!(
                    "segment '{segment}' must not contain '{delimiter}'"
                )));
            }
        }
        Ok(())
    }

    /// Reject keys with an empty owner.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::InvalidKey`] if the owner is empty.
    pub fn ensure_owner(&self) -> Result<(), StorageError> {
        if self.owner.is_empty() {
            return Err(self.invalid("owner must not be empty".to_owned()));
        }
        Ok(())
    }

    fn invalid(&self, reason: String) -> StorageError {
        StorageError::InvalidKey {
            key: self.to_string(),
            reason,
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.owner)?;
        for segment in &self.segments {
            write!(f, "/{segment}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equality_is_element_wise() {
        assert_eq!(Key::new("p1", ["a", "b"]), Key::new("p1", vec!["a", "b"]));
        assert_ne!(Key::new("p1", ["a", "b"]), Key::new("p1", ["b", "a"]));
        assert_ne!(Key::new("p1", ["a"]), Key::new("p2", ["a"]));
    }

    #[test]
    fn descendant_is_segment_wise() {
        let a = Key::new("p1", ["a"]);
        assert!(Key::new("p1", ["a", "1"]).is_descendant_of(&a));
        assert!(!a.is_descendant_of(&a));
        assert!(!Key::new("p1", ["ab"]).is_descendant_of(&a));
        assert!(!Key::new("p2", ["a", "1"]).is_descendant_of(&a));
        assert!(a.is_descendant_of(&Key::owner_scope("p1")));
    }

    #[test]
    fn join_and_split_invert() {
        let key = Key::new("p1", ["archive", "1.2.0"]);
        let path = key.join(':');
        assert_eq!(path, "archive:1.2.0");
        assert_eq!(Key::split("p1", &path, ':'), key);
        assert_eq!(Key::split("p1", "", ':'), Key::owner_scope("p1"));
        assert_eq!(Key::owner_scope("p1").join('/'), "");
    }

    #[test]
    fn ensure_encodable_rejects_delimiters() {
        assert!(Key::new("p1", ["archive", "1.0.0"]).ensure_encodable(':', true).is_ok());
        assert!(Key::new("p1", ["a:b"]).ensure_encodable(':', false).is_err());
        assert!(Key::new("p:1", ["a"]).ensure_encodable(':', false).is_ok());
        assert!(Key::new("p:1", ["a"]).ensure_encodable(':', true).is_err());
        assert!(Key::new("p1", [""]).ensure_encodable(':', false).is_err());
        assert!(Key::new("", ["a"]).ensure_encodable(':', false).is_err());
        assert!(Key::owner_scope("").ensure_owner().is_err());
        assert!(Key::owner_scope("p1").ensure_owner().is_ok());
    }

    #[test]
    fn display_uses_slashes() {
        assert_eq!(Key::owner_scope("p1").to_string(), "p1");
        assert_eq!(Key::new("p1", ["version"]).to_string(), "p1/version");
    }
}
