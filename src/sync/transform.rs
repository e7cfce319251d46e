// ABOUTME: Maps CentOS CI source records onto Fedora ResultsDB submissions
// ABOUTME: Pure outcome translation plus provenance metadata for dedup

use std::fmt;

use super::record::{MessageId, SourceRecord};
use crate::error::{SyncError, SyncResult};
use crate::resultsdb::{CreateResult, ResultData, Testcase};

/// Marks a destination result as copied from CentOS CI.
pub const SYNCED_FLAG_KEY: &str = "centos_ci_resultsdb";
/// Source result id of the copied result.
pub const SOURCE_ID_KEY: &str = "centos_ci_resultsdb_id";
/// Source submit time, queried to bootstrap the start point.
pub const SOURCE_SUBMIT_TIME_KEY: &str = "centos_ci_resultsdb_submit_time";
/// Source message id, queried for idempotent submission.
pub const SOURCE_MSG_ID_KEY: &str = "centos_ci_resultsdb_msg_id";

/// Outcome vocabulary accepted by the destination ResultsDB.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Passed,
    Failed,
    Info,
    NeedsInspection,
    Error,
    Running,
    Queued,
    NotApplicable,
}

impl Outcome {
    /// Translate a source outcome, ignoring case and surrounding whitespace.
    pub fn from_source(value: &str) -> Option<Self> {
        let outcome = match value.trim().to_ascii_uppercase().as_str() {
            "PASSED" | "PASS" | "SUCCESS" => Outcome::Passed,
            "FAILED" | "FAIL" | "FAILURE" => Outcome::Failed,
            "INFO" => Outcome::Info,
            "NEEDS_INSPECTION" | "WARN" | "WARNING" => Outcome::NeedsInspection,
            "ERROR" => Outcome::Error,
            "RUNNING" => Outcome::Running,
            "QUEUED" => Outcome::Queued,
            "NOT_APPLICABLE" | "SKIPPED" | "SKIP" => Outcome::NotApplicable,
            _ => return None,
        };
        Some(outcome)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Passed => "PASSED",
            Outcome::Failed => "FAILED",
            Outcome::Info => "INFO",
            Outcome::NeedsInspection => "NEEDS_INSPECTION",
            Outcome::Error => "ERROR",
            Outcome::Running => "RUNNING",
            Outcome::Queued => "QUEUED",
            Outcome::NotApplicable => "NOT_APPLICABLE",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A source record reshaped for the destination API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DestinationRecord {
    pub source_message_id: MessageId,
    /// Result id in the source ResultsDB
    pub source_result_id: u64,
    pub outcome: Outcome,
    pub testcase: String,
    pub testcase_ref_url: Option<String>,
    pub groups: Vec<String>,
    pub submit_time: String,
    pub ref_url: Option<String>,
    pub note: Option<String>,
    /// Source metadata plus the provenance keys
    pub data: ResultData,
}

impl DestinationRecord {
    /// Request body for `POST /v2.0/results`.
    pub fn to_create_request(&self) -> CreateResult {
        CreateResult {
            outcome: self.outcome.as_str().to_string(),
            testcase: Testcase {
                name: self.testcase.clone(),
                ref_url: self.testcase_ref_url.clone(),
            },
            groups: self.groups.clone(),
            note: self.note.clone().filter(|note| !note.is_empty()),
            ref_url: self.ref_url.clone(),
            data: self.data.clone(),
        }
    }
}

/// Transform a source record into its destination shape. No I/O.
pub fn transform(record: &SourceRecord) -> SyncResult<DestinationRecord> {
    let outcome =
        Outcome::from_source(&record.outcome).ok_or_else(|| SyncError::UnmappableOutcome {
            message_id: record.message_id.clone(),
            outcome: record.outcome.clone(),
        })?;

    let mut data = record.data.clone();
    data.insert(SYNCED_FLAG_KEY.to_string(), vec!["true".to_string()]);
    data.insert(
        SOURCE_ID_KEY.to_string(),
        vec![record.result_id.to_string()],
    );
    data.insert(
        SOURCE_SUBMIT_TIME_KEY.to_string(),
        vec![record.submit_time.clone()],
    );
    data.insert(
        SOURCE_MSG_ID_KEY.to_string(),
        vec![record.message_id.to_string()],
    );

    Ok(DestinationRecord {
        source_message_id: record.message_id.clone(),
        source_result_id: record.result_id,
        outcome,
        testcase: record.testcase.clone(),
        testcase_ref_url: record.testcase_ref_url.clone(),
        groups: record.groups.clone(),
        submit_time: record.submit_time.clone(),
        ref_url: record.ref_url.clone(),
        note: record.note.clone(),
        data,
    })
}
