//! [`AppendStore`] backed by the local filesystem
//!
//! Containers are directories under a root and append objects are regular
//! files opened with `O_APPEND`. Each append issues a single `write_all`, so
//! blocks from concurrent appenders in this process do not interleave.

use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;

use crate::store::{AppendStore, CreateOutcome, Result, StoreError, validate_name};

#[derive(Debug)]
pub struct LocalFsAppendStore {
    root: PathBuf,
}

impl LocalFsAppendStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn container_path(&self, container: &str) -> PathBuf {
        self.root.join(container)
    }

    fn object_path(&self, container: &str, key: &str) -> PathBuf {
        self.container_path(container).join(key)
    }
}

#[async_trait]
impl AppendStore for LocalFsAppendStore {
    async fn create_container_if_absent(&self, container: &str) -> Result<()> {
        validate_name(container)?;
        tokio::fs::create_dir_all(self.container_path(container)).await?;
        Ok(())
    }

    async fn create_append_object_if_absent(
        &self,
        container: &str,
        key: &str,
    ) -> Result<CreateOutcome> {
        validate_name(container)?;
        validate_name(key)?;
        if !tokio::fs::try_exists(self.container_path(container)).await? {
            return Err(StoreError::ContainerNotFound {
                container: container.to_string(),
            });
        }

        match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(self.object_path(container, key))
            .await
        {
            Ok(_) => Ok(CreateOutcome::Created),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Ok(CreateOutcome::AlreadyExists),
            Err(e) => Err(e.into()),
        }
    }

    async fn append_bytes(&self, container: &str, key: &str, data: Bytes) -> Result<()> {
        validate_name(container)?;
        validate_name(key)?;
        let mut file = OpenOptions::new()
            .append(true)
            .open(self.object_path(container, key))
            .await
            .map_err(|e| {
                if e.kind() == io::ErrorKind::NotFound {
                    StoreError::ObjectNotFound {
                        container: container.to_string(),
                        key: key.to_string(),
                    }
                } else {
                    StoreError::Io(e)
                }
            })?;
        file.write_all(&data).await?;
        file.flush().await?;
        Ok(())
    }
}
