//! Derivation of the object keys that name append targets in the store.

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use std::fmt::Display;
use std::ops::Deref;

/// File extension for append objects
pub const OBJECT_FILE_EXTENSION: &str = "json";

/// Fixed prefix for append object keys. This stays `auditlogs` even when the
/// records are written into a different container.
pub const OBJECT_KEY_PREFIX: &str = "auditlogs";

/// The key that both groups records and names their destination object.
///
/// Keys are day-granular: every record whose creation timestamp falls on the
/// same UTC calendar day maps to the same key. Month and day are not
/// zero-padded, so existing objects written by prior deployments keep their
/// names.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PartitionKey(String);

impl PartitionKey {
    pub fn for_date(date: NaiveDate) -> Self {
        Self(format!(
            "{OBJECT_KEY_PREFIX}-{}-{}-{}.{OBJECT_FILE_EXTENSION}",
            date.year(),
            date.month(),
            date.day()
        ))
    }

    pub fn from_timestamp(timestamp: DateTime<Utc>) -> Self {
        Self::for_date(timestamp.date_naive())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Deref for PartitionKey {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl AsRef<str> for PartitionKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Display for PartitionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}
