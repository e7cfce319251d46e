// ABOUTME: Error taxonomy for the ResultsDB sync loop
// ABOUTME: Separates transient, skippable, pass-halting and fatal failures

use thiserror::Error;

use crate::sync::MessageId;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors raised while talking to a ResultsDB HTTP API.
#[derive(Error, Debug)]
pub enum ResultsDbError {
    /// Request never produced a response (DNS, connect, timeout, TLS).
    #[error("request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// Server answered with a non-success status.
    #[error("{url} returned {status}: {body}")]
    Status {
        url: String,
        status: reqwest::StatusCode,
        body: String,
    },

    /// Response body was not the JSON we expected.
    #[error("failed to decode response from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: reqwest::Error,
    },
}

impl ResultsDbError {
    /// HTTP status code, if the server answered at all.
    pub fn status(&self) -> Option<reqwest::StatusCode> {
        match self {
            ResultsDbError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Errors that can occur during a sync pass.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Fetching from the source failed. Retried on the next pass.
    #[error("source unavailable: {0}")]
    SourceUnavailable(String),

    /// Source outcome has no destination equivalent. The record is skipped.
    #[error("record {message_id}: outcome {outcome:?} has no destination mapping")]
    UnmappableOutcome {
        message_id: MessageId,
        outcome: String,
    },

    /// Destination rejected the record or could not be reached.
    #[error("submitting {message_id} failed: {reason}")]
    SubmitFailed {
        message_id: MessageId,
        reason: String,
    },

    /// Cursor could not be read or written. The process must stop.
    #[error("cursor store error: {0}")]
    CursorStore(String),
}

impl SyncError {
    /// True for errors that end the whole process rather than the pass.
    pub fn is_fatal(&self) -> bool {
        matches!(self, SyncError::CursorStore(_))
    }

    /// True for errors that only delay work until the next pass.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            SyncError::SourceUnavailable(_) | SyncError::SubmitFailed { .. }
        )
    }
}
