//! [`PartitionedAppendSink`]: idempotent target creation plus tail appends
//!
//! The sink owns the "make sure the target exists, then append" sequence for
//! one (container, key) pair at a time. Creation is the only operation that is
//! retried anywhere in the pipeline; the append itself is attempted once and a
//! failure there surfaces to the caller.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use tracing::{debug, error, warn};

use auditflow_types::PartitionKey;

use crate::store::{AppendStore, CreateOutcome, Result};

/// Bounded linear retry applied to the object-creation call only
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CreateRetryPolicy {
    /// Fixed delay between attempts
    pub interval: Duration,
    /// Total attempts, including the first
    pub max_attempts: usize,
}

impl Default for CreateRetryPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            max_attempts: 10,
        }
    }
}

#[derive(Debug)]
pub struct PartitionedAppendSink {
    store: Arc<dyn AppendStore>,
    retry: CreateRetryPolicy,
}

impl PartitionedAppendSink {
    pub fn new(store: Arc<dyn AppendStore>) -> Self {
        Self {
            store,
            retry: CreateRetryPolicy::default(),
        }
    }

    pub fn with_create_retry(mut self, retry: CreateRetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Append one block of bytes to the object named by `key`
    ///
    /// Ensures the container and the append object exist first. A concurrent
    /// creator winning the race on either is fine; any other failure aborts
    /// the append and propagates unchanged.
    pub async fn append(&self, container: &str, key: &PartitionKey, data: Bytes) -> Result<()> {
        timed(
            "create_container_if_absent",
            self.store.create_container_if_absent(container),
        )
        .await?;
        self.ensure_append_object(container, key).await?;
        timed(
            "append_bytes",
            self.store.append_bytes(container, key.as_str(), data),
        )
        .await?;
        Ok(())
    }

    async fn ensure_append_object(&self, container: &str, key: &PartitionKey) -> Result<()> {
        let mut attempt = 1;
        loop {
            match timed(
                "create_append_object_if_absent",
                self.store
                    .create_append_object_if_absent(container, key.as_str()),
            )
            .await
            {
                Ok(CreateOutcome::Created) => {
                    debug!(container, key = %key, "created append object");
                    return Ok(());
                }
                // Another writer got there first; the object is usable as-is
                Ok(CreateOutcome::AlreadyExists) => return Ok(()),
                Err(e) if attempt < self.retry.max_attempts => {
                    warn!(
                        container,
                        key = %key,
                        attempt,
                        error = %e,
                        "append object creation failed, retrying",
                    );
                    attempt += 1;
                    tokio::time::sleep(self.retry.interval).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Run one store call, logging its duration on success and the error on
/// failure. Errors pass through unchanged.
async fn timed<T>(operation: &'static str, call: impl Future<Output = Result<T>>) -> Result<T> {
    let start = Instant::now();
    match call.await {
        Ok(value) => {
            debug!(
                operation,
                elapsed_ms = start.elapsed().as_millis() as u64,
                "object store call completed",
            );
            Ok(value)
        }
        Err(e) => {
            error!(operation, error = %e, "object store call failed");
            Err(e)
        }
    }
}
