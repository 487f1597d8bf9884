//! Shared types for the auditflow pipeline: audit log pages, records, and the
//! keys that partition them into append objects.

pub mod paths;

use std::borrow::Cow;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Deserialize;
use serde_json::{Map, Value};

pub use paths::PartitionKey;

/// Container that drained records land in unless the caller overrides it
pub const DEFAULT_CONTAINER: &str = "auditlogs";

/// Record field carrying the creation timestamp
pub const CREATION_DATE_FIELD: &str = "CreationDate";

/// Record field carrying the payload that is written to the append object
pub const AUDIT_DATA_FIELD: &str = "AuditData";

#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    #[error("record is missing the {CREATION_DATE_FIELD} field")]
    MissingCreationDate,

    #[error("{CREATION_DATE_FIELD} is not a timestamp string: {0}")]
    NonStringCreationDate(Value),

    #[error("could not parse {CREATION_DATE_FIELD} {value:?}: {source}")]
    InvalidCreationDate {
        value: String,
        source: chrono::ParseError,
    },
}

/// One page of the audit log API response. Records arrive under the `value`
/// field; a missing or empty list is the drain's termination signal.
#[derive(Debug, Default, Deserialize)]
pub struct AuditLogPage {
    #[serde(default, rename = "value")]
    pub records: Vec<AuditRecord>,
}

impl AuditLogPage {
    pub fn new(records: Vec<AuditRecord>) -> Self {
        Self { records }
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// One event from the audit log source: an open field mapping of which only
/// `CreationDate` and `AuditData` matter to the pipeline.
#[derive(Debug, Clone, Deserialize)]
#[serde(transparent)]
pub struct AuditRecord {
    fields: Map<String, Value>,
}

impl AuditRecord {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self { fields }
    }

    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Creation timestamp of the record. Timestamps without an explicit
    /// offset are interpreted as UTC.
    pub fn creation_date(&self) -> Result<DateTime<Utc>, RecordError> {
        let value = self
            .fields
            .get(CREATION_DATE_FIELD)
            .ok_or(RecordError::MissingCreationDate)?;
        let raw = value
            .as_str()
            .ok_or_else(|| RecordError::NonStringCreationDate(value.clone()))?;
        parse_creation_date(raw).map_err(|source| RecordError::InvalidCreationDate {
            value: raw.to_string(),
            source,
        })
    }

    /// The object key this record is grouped under
    pub fn partition_key(&self) -> Result<PartitionKey, RecordError> {
        Ok(PartitionKey::from_timestamp(self.creation_date()?))
    }

    /// Payload line for the append object. A string payload is taken as-is,
    /// any other JSON value is rendered compactly, and an absent payload
    /// contributes an empty line.
    pub fn audit_data(&self) -> Cow<'_, str> {
        match self.fields.get(AUDIT_DATA_FIELD) {
            Some(Value::String(s)) => Cow::Borrowed(s),
            Some(other) => Cow::Owned(other.to_string()),
            None => Cow::Borrowed(""),
        }
    }
}

fn parse_creation_date(raw: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    if let Ok(with_offset) = DateTime::parse_from_rfc3339(raw) {
        return Ok(with_offset.with_timezone(&Utc));
    }
    // The audit log API reports timestamps without an offset
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f").map(|naive| naive.and_utc())
}

/// The externally observable result of one drain: how much was written
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainSummary {
    /// Total records written across all pages
    pub records_written: u64,
    /// Number of non-empty pages processed
    pub pages_processed: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn record(fields: Value) -> AuditRecord {
        serde_json::from_value(fields).unwrap()
    }

    #[test]
    fn creation_date_accepts_offsetless_timestamps_as_utc() {
        let r = record(json!({"CreationDate": "2024-03-01T10:15:30", "AuditData": "{}"}));
        assert_eq!(
            r.creation_date().unwrap(),
            Utc.with_ymd_and_hms(2024, 3, 1, 10, 15, 30).unwrap()
        );
    }

    #[test]
    fn creation_date_accepts_rfc3339() {
        let r = record(json!({"CreationDate": "2024-03-01T10:15:30+02:00"}));
        assert_eq!(
            r.creation_date().unwrap(),
            Utc.with_ymd_and_hms(2024, 3, 1, 8, 15, 30).unwrap()
        );
    }

    #[test]
    fn missing_creation_date_is_an_error() {
        let r = record(json!({"AuditData": "{}"}));
        assert!(matches!(
            r.creation_date(),
            Err(RecordError::MissingCreationDate)
        ));
    }

    #[test]
    fn numeric_creation_date_is_an_error() {
        let r = record(json!({"CreationDate": 1709287200}));
        assert!(matches!(
            r.creation_date(),
            Err(RecordError::NonStringCreationDate(_))
        ));
    }

    #[test]
    fn audit_data_string_is_passed_through_verbatim() {
        let r = record(json!({"AuditData": "{\"Operation\":\"FileAccessed\"}"}));
        assert_eq!(r.audit_data(), "{\"Operation\":\"FileAccessed\"}");
    }

    #[test]
    fn structured_audit_data_is_rendered_compactly() {
        let r = record(json!({"AuditData": {"Operation": "FileAccessed"}}));
        assert_eq!(r.audit_data(), "{\"Operation\":\"FileAccessed\"}");
    }

    #[test]
    fn absent_audit_data_becomes_an_empty_line() {
        let r = record(json!({"CreationDate": "2024-03-01T10:15:30"}));
        assert_eq!(r.audit_data(), "");
    }

    #[test]
    fn page_deserializes_records_from_the_value_field() {
        let page: AuditLogPage = serde_json::from_value(json!({
            "value": [
                {"CreationDate": "2024-03-01T10:15:30", "AuditData": "a"},
                {"CreationDate": "2024-03-01T11:15:30", "AuditData": "b"},
            ]
        }))
        .unwrap();
        assert_eq!(page.records.len(), 2);
    }

    #[test]
    fn page_without_value_field_is_empty() {
        let page: AuditLogPage = serde_json::from_value(json!({})).unwrap();
        assert!(page.is_empty());
    }
}
