//! The append-only object store capability
//!
//! Containers hold named append objects. An append object must be created,
//! empty, before its first append; once created it only ever grows. Creation
//! is conditional so that concurrent writers racing on the same object can
//! both proceed: the loser of the race observes [`CreateOutcome::AlreadyExists`]
//! and that is a success, not an error.

use async_trait::async_trait;
use bytes::Bytes;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("container {container:?} does not exist")]
    ContainerNotFound { container: String },

    #[error("append object {key:?} does not exist in container {container:?}")]
    ObjectNotFound { container: String, key: String },

    #[error("invalid container or object name: {name:?}")]
    InvalidName { name: String },

    #[error("object store I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T, E = StoreError> = std::result::Result<T, E>;

/// Outcome of a conditional create
///
/// `AlreadyExists` means another writer, or a prior page of the same drain,
/// created the object first. Callers treat it the same as `Created`.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum CreateOutcome {
    Created,
    AlreadyExists,
}

/// Capability to create containers and append objects, and to append bytes
///
/// Implementations must make `append_bytes` atomic per call relative to other
/// appends to the same object from this process: concurrent blocks may land in
/// either order but never interleave.
#[async_trait]
pub trait AppendStore: std::fmt::Debug + Send + Sync {
    /// Create the container if it does not exist; a no-op if it does
    async fn create_container_if_absent(&self, container: &str) -> Result<()>;

    /// Create the append object, empty, only if it does not already exist
    async fn create_append_object_if_absent(
        &self,
        container: &str,
        key: &str,
    ) -> Result<CreateOutcome>;

    /// Append one block of bytes to the object's tail
    async fn append_bytes(&self, container: &str, key: &str, data: Bytes) -> Result<()>;
}

/// Container and object names become storage paths, so path metacharacters
/// are rejected up front.
pub(crate) fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() || name.contains(['/', '\\']) || name.contains("..") {
        return Err(StoreError::InvalidName {
            name: name.to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_metacharacters_are_rejected() {
        assert!(validate_name("").is_err());
        assert!(validate_name("a/b").is_err());
        assert!(validate_name("a\\b").is_err());
        assert!(validate_name("..").is_err());
        assert!(validate_name("auditlogs-2024-3-1.json").is_ok());
    }
}
