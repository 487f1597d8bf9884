//! The pagination-drain loop
//!
//! [`AuditDrainer`] drives one audit-log session to completion: it strips the
//! protocol-reserved keys from the caller's query parameters, attaches a fresh
//! session identifier plus the fixed pagination parameters, and fetches pages
//! until the source returns an empty one. Each non-empty page is grouped by
//! UTC calendar day and every group is appended to its day-named object.
//!
//! The loop is strictly sequential: one page in flight at a time, one group's
//! append finishing before the next begins. The session identifier alone
//! advances the server-side cursor, so pages cannot be fetched in parallel.

use std::num::NonZeroUsize;
use std::sync::Arc;

use bytes::Bytes;
use indexmap::IndexMap;
use tracing::{debug, error, info};
use uuid::Uuid;

use auditflow_client::AuditLogSource;
use auditflow_types::{
    AuditLogPage, AuditRecord, DEFAULT_CONTAINER, DrainSummary, PartitionKey, RecordError,
};

use crate::sink::PartitionedAppendSink;
use crate::store::StoreError;

/// Page-size hint sent to the source on every request
pub const DEFAULT_PAGE_SIZE: usize = 300;

/// Session command instructing the source to return the next page
const SESSION_COMMAND: &str = "ReturnNextPreviewPage";

/// Query keys owned by the loop. Caller-supplied values for these are
/// discarded and replaced with loop-controlled ones.
const RESERVED_KEYS: &[&str] = &["container", "sessioncommand", "sessionid", "resultsize"];

#[derive(Debug, thiserror::Error)]
pub enum DrainError {
    #[error("fetching audit log page failed: {0}")]
    Source(#[from] auditflow_client::Error),

    #[error("malformed audit record: {0}")]
    Record(#[from] RecordError),

    #[error("writing audit records failed: {0}")]
    Sink(#[from] StoreError),

    #[error("source did not return an empty page within {limit} page fetches")]
    PageLimitExceeded { limit: usize },
}

pub type Result<T, E = DrainError> = std::result::Result<T, E>;

/// One step of the drain loop
///
/// `Fetching` asks the source for a page; `Processing` writes one non-empty
/// page out; `Done` and `Failed` are terminal.
#[derive(Debug)]
enum DrainState {
    Fetching,
    Processing(AuditLogPage),
    Done,
    Failed(DrainError),
}

#[derive(Debug)]
pub struct AuditDrainer {
    source: Arc<dyn AuditLogSource>,
    sink: PartitionedAppendSink,
    page_size: usize,
    max_pages: Option<NonZeroUsize>,
}

impl AuditDrainer {
    pub fn new(source: Arc<dyn AuditLogSource>, sink: PartitionedAppendSink) -> Self {
        Self {
            source,
            sink,
            page_size: DEFAULT_PAGE_SIZE,
            max_pages: None,
        }
    }

    /// Override the page-size hint sent to the source
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    /// Bound the number of page fetches per drain
    ///
    /// The protocol's only termination signal is an empty page, so a
    /// malfunctioning source can otherwise hold the loop open forever. With a
    /// bound set, exceeding it fails the drain instead.
    pub fn with_max_pages(mut self, max_pages: Option<NonZeroUsize>) -> Self {
        self.max_pages = max_pages;
        self
    }

    /// Drain the audit log into `container`, one session start to finish
    ///
    /// Returns the total record count once the source reports an empty page.
    /// Any page fetch failure, malformed record, or append failure aborts the
    /// whole drain; progress already appended stays appended but is not
    /// reported.
    pub async fn drain(
        &self,
        container: &str,
        caller_params: &[(String, String)],
    ) -> Result<DrainSummary> {
        let session_id = Uuid::new_v4();
        let params = self.build_params(caller_params, session_id);
        info!(%session_id, container, "starting audit log drain");
        for (key, value) in &params {
            debug!(%key, %value, "audit log query parameter");
        }

        let mut summary = DrainSummary::default();
        let mut fetches = 0usize;
        let mut state = DrainState::Fetching;
        loop {
            state = match state {
                DrainState::Fetching => {
                    fetches += 1;
                    match self.max_pages {
                        Some(limit) if fetches > limit.get() => {
                            DrainState::Failed(DrainError::PageLimitExceeded { limit: limit.get() })
                        }
                        _ => match self.source.fetch_page(&params).await {
                            Ok(page) if page.is_empty() => DrainState::Done,
                            Ok(page) => DrainState::Processing(page),
                            Err(e) => DrainState::Failed(e.into()),
                        },
                    }
                }
                DrainState::Processing(page) => match self.process_page(container, &page).await {
                    Ok(count) => {
                        summary.records_written += count;
                        summary.pages_processed += 1;
                        DrainState::Fetching
                    }
                    Err(e) => DrainState::Failed(e),
                },
                DrainState::Done => {
                    info!(
                        records = summary.records_written,
                        pages = summary.pages_processed,
                        "audit log drain finished",
                    );
                    return Ok(summary);
                }
                DrainState::Failed(e) => {
                    error!(%session_id, error = %e, "audit log drain aborted");
                    return Err(e);
                }
            };
        }
    }

    /// Group one page by partition key and append every group
    async fn process_page(&self, container: &str, page: &AuditLogPage) -> Result<u64> {
        info!(records = page.records.len(), "writing audit records");
        let groups = group_by_partition_key(&page.records)?;
        for (key, records) in &groups {
            self.sink
                .append(container, key, join_payloads(records))
                .await?;
        }
        Ok(page.records.len() as u64)
    }

    /// Lowercase the caller's keys, drop the reserved ones, and attach the
    /// pagination parameters. The result is fixed for the whole session.
    fn build_params(
        &self,
        caller_params: &[(String, String)],
        session_id: Uuid,
    ) -> Vec<(String, String)> {
        let mut params: Vec<(String, String)> = caller_params
            .iter()
            .map(|(key, value)| (key.to_ascii_lowercase(), value.clone()))
            .filter(|(key, _)| !RESERVED_KEYS.contains(&key.as_str()))
            .collect();
        params.push(("ResultSize".to_string(), self.page_size.to_string()));
        params.push(("SessionId".to_string(), session_id.to_string()));
        params.push(("SessionCommand".to_string(), SESSION_COMMAND.to_string()));
        params
    }
}

/// Resolve the target container from caller query parameters
///
/// A non-blank `container` value wins; anything else falls back to
/// [`DEFAULT_CONTAINER`].
pub fn container_from_params(params: &[(String, String)]) -> String {
    params
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case("container"))
        .map(|(_, value)| value.trim())
        .filter(|value| !value.is_empty())
        .map_or_else(|| DEFAULT_CONTAINER.to_string(), ToString::to_string)
}

/// Partition records by their day key, preserving first-seen group order and
/// record order within each group
fn group_by_partition_key(
    records: &[AuditRecord],
) -> Result<IndexMap<PartitionKey, Vec<&AuditRecord>>, RecordError> {
    let mut groups: IndexMap<PartitionKey, Vec<&AuditRecord>> = IndexMap::new();
    for record in records {
        groups.entry(record.partition_key()?).or_default().push(record);
    }
    Ok(groups)
}

/// Newline-join the group's payloads, with a trailing newline
fn join_payloads(records: &[&AuditRecord]) -> Bytes {
    let mut joined = String::new();
    for record in records {
        joined.push_str(&record.audit_data());
        joined.push('\n');
    }
    Bytes::from(joined)
}
