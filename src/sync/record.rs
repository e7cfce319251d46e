// ABOUTME: Source-side record types for ResultsDB replication
// ABOUTME: MessageId identity and the read-only SourceRecord fetched each pass

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::resultsdb::{ResultData, ResultsDbResult};

/// Identifier of the message a result was emitted with.
///
/// Opaque: only compared for equality. Emission order comes from the source query.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(String);

impl MessageId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Id used for results that were stored without a message id.
    pub fn for_result(result_id: u64) -> Self {
        Self(format!("result-{}", result_id))
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A result as read from the source ResultsDB. Never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceRecord {
    pub message_id: MessageId,
    /// The source instance's own result id
    pub result_id: u64,
    pub outcome: String,
    pub testcase: String,
    pub testcase_ref_url: Option<String>,
    pub groups: Vec<String>,
    pub submit_time: String,
    pub data: ResultData,
    /// Link to the logs / job that produced the result
    pub ref_url: Option<String>,
    pub note: Option<String>,
}

impl SourceRecord {
    /// Build a record from an API result, reading the message id from `data[message_id_key]`.
    pub fn from_result(result: ResultsDbResult, message_id_key: &str) -> Self {
        let message_id = result
            .data_value(message_id_key)
            .filter(|id| !id.is_empty())
            .map(MessageId::new)
            .unwrap_or_else(|| MessageId::for_result(result.id));

        Self {
            message_id,
            result_id: result.id,
            outcome: result.outcome,
            testcase: result.testcase.name,
            testcase_ref_url: result.testcase.ref_url,
            groups: result.groups,
            submit_time: result.submit_time,
            data: result.data,
            ref_url: result.ref_url,
            note: result.note,
        }
    }
}
