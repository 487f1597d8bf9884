//! In-memory [`AppendStore`] for tests
//!
//! Objects are stored as the list of appended blocks rather than one flat
//! buffer, so tests can assert on block boundaries as well as contents. A
//! failure-injection knob simulates transient creation errors to exercise the
//! sink's retry policy.

use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;

use crate::store::{AppendStore, CreateOutcome, Result, StoreError, validate_name};

type Container = HashMap<String, Vec<Bytes>>;

#[derive(Debug, Default)]
pub struct InMemoryAppendStore {
    containers: Mutex<HashMap<String, Container>>,
    create_failures: AtomicUsize,
    create_attempts: AtomicUsize,
}

impl InMemoryAppendStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `n` object-creation calls with a transient I/O error
    pub fn inject_create_failures(&self, n: usize) {
        self.create_failures.store(n, Ordering::SeqCst);
    }

    /// Number of object-creation calls made so far
    pub fn create_attempts(&self) -> usize {
        self.create_attempts.load(Ordering::SeqCst)
    }

    pub fn container_names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.containers.lock().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn object_keys(&self, container: &str) -> Vec<String> {
        let containers = self.containers.lock();
        let mut keys: Vec<_> = containers
            .get(container)
            .map(|c| c.keys().cloned().collect())
            .unwrap_or_default();
        keys.sort();
        keys
    }

    /// The blocks appended to an object, in order
    pub fn object_blocks(&self, container: &str, key: &str) -> Option<Vec<Bytes>> {
        self.containers.lock().get(container)?.get(key).cloned()
    }

    /// The object's contents with all blocks concatenated
    pub fn object_contents(&self, container: &str, key: &str) -> Option<Vec<u8>> {
        let blocks = self.object_blocks(container, key)?;
        Some(blocks.iter().flat_map(|b| b.iter().copied()).collect())
    }
}

#[async_trait]
impl AppendStore for InMemoryAppendStore {
    async fn create_container_if_absent(&self, container: &str) -> Result<()> {
        validate_name(container)?;
        self.containers
            .lock()
            .entry(container.to_string())
            .or_default();
        Ok(())
    }

    async fn create_append_object_if_absent(
        &self,
        container: &str,
        key: &str,
    ) -> Result<CreateOutcome> {
        validate_name(container)?;
        validate_name(key)?;
        self.create_attempts.fetch_add(1, Ordering::SeqCst);
        if self
            .create_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(StoreError::Io(io::Error::new(
                io::ErrorKind::Other,
                "injected create failure",
            )));
        }

        let mut containers = self.containers.lock();
        let objects = containers
            .get_mut(container)
            .ok_or_else(|| StoreError::ContainerNotFound {
                container: container.to_string(),
            })?;
        if objects.contains_key(key) {
            Ok(CreateOutcome::AlreadyExists)
        } else {
            objects.insert(key.to_string(), Vec::new());
            Ok(CreateOutcome::Created)
        }
    }

    async fn append_bytes(&self, container: &str, key: &str, data: Bytes) -> Result<()> {
        validate_name(container)?;
        validate_name(key)?;
        let mut containers = self.containers.lock();
        let objects = containers
            .get_mut(container)
            .ok_or_else(|| StoreError::ContainerNotFound {
                container: container.to_string(),
            })?;
        let blocks = objects.get_mut(key).ok_or_else(|| StoreError::ObjectNotFound {
            container: container.to_string(),
            key: key.to_string(),
        })?;
        blocks.push(data);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn conditional_create_is_idempotent_and_preserves_content() {
        let store = InMemoryAppendStore::new();
        store.create_container_if_absent("auditlogs").await.unwrap();

        let first = store
            .create_append_object_if_absent("auditlogs", "k.json")
            .await
            .unwrap();
        assert_eq!(first, CreateOutcome::Created);

        store
            .append_bytes("auditlogs", "k.json", Bytes::from_static(b"line\n"))
            .await
            .unwrap();

        let second = store
            .create_append_object_if_absent("auditlogs", "k.json")
            .await
            .unwrap();
        assert_eq!(second, CreateOutcome::AlreadyExists);
        assert_eq!(
            store.object_contents("auditlogs", "k.json").unwrap(),
            b"line\n"
        );
    }

    #[tokio::test]
    async fn container_creation_is_idempotent() {
        let store = InMemoryAppendStore::new();
        store.create_container_if_absent("auditlogs").await.unwrap();
        store.create_container_if_absent("auditlogs").await.unwrap();
        assert_eq!(store.container_names(), vec!["auditlogs"]);
    }

    #[tokio::test]
    async fn appends_accumulate_as_ordered_blocks() {
        let store = InMemoryAppendStore::new();
        store.create_container_if_absent("c").await.unwrap();
        store
            .create_append_object_if_absent("c", "k.json")
            .await
            .unwrap();
        store
            .append_bytes("c", "k.json", Bytes::from_static(b"a\n"))
            .await
            .unwrap();
        store
            .append_bytes("c", "k.json", Bytes::from_static(b"b\n"))
            .await
            .unwrap();

        let blocks = store.object_blocks("c", "k.json").unwrap();
        assert_eq!(blocks.len(), 2);
        assert_eq!(store.object_contents("c", "k.json").unwrap(), b"a\nb\n");
    }

    #[tokio::test]
    async fn append_to_missing_object_errors() {
        let store = InMemoryAppendStore::new();
        store.create_container_if_absent("c").await.unwrap();
        let err = store
            .append_bytes("c", "k.json", Bytes::from_static(b"a"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::ObjectNotFound { .. }));
    }

    #[tokio::test]
    async fn injected_failures_fail_creation_then_clear() {
        let store = InMemoryAppendStore::new();
        store.create_container_if_absent("c").await.unwrap();
        store.inject_create_failures(1);

        assert!(store
            .create_append_object_if_absent("c", "k.json")
            .await
            .is_err());
        assert_eq!(
            store
                .create_append_object_if_absent("c", "k.json")
                .await
                .unwrap(),
            CreateOutcome::Created
        );
        assert_eq!(store.create_attempts(), 2);
    }
}
