//! Core of the auditflow pipeline: the pagination-drain loop and the
//! partitioned append sink
//!
//! [`AuditDrainer`] pulls pages from an [`AuditLogSource`], groups each page's
//! records by UTC calendar day, and hands every group to the
//! [`PartitionedAppendSink`], which guarantees the day-named append object
//! exists before writing to its tail. Store access goes through the
//! [`AppendStore`] trait; [`LocalFsAppendStore`] backs real deployments and
//! [`InMemoryAppendStore`] backs tests.
//!
//! [`AuditLogSource`]: auditflow_client::AuditLogSource

pub mod drain;
pub mod local;
pub mod memory;
pub mod sink;
pub mod store;

pub use drain::{AuditDrainer, DEFAULT_PAGE_SIZE, DrainError, container_from_params};
pub use local::LocalFsAppendStore;
pub use memory::InMemoryAppendStore;
pub use sink::{CreateRetryPolicy, PartitionedAppendSink};
pub use store::{AppendStore, CreateOutcome, StoreError};
