// ABOUTME: Sink adapter - submits transformed results to the Fedora ResultsDB
// ABOUTME: Treats records already present on the destination as success

use super::transform::{
    DestinationRecord, SOURCE_ID_KEY, SOURCE_MSG_ID_KEY, SOURCE_SUBMIT_TIME_KEY, SYNCED_FLAG_KEY,
};
use crate::error::{ResultsDbError, SyncError, SyncResult};
use crate::resultsdb::ResultsDbClient;

/// How a successful submission landed on the destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    Created,
    AlreadyExists,
}

/// Somewhere transformed results are written to.
#[allow(async_fn_in_trait)]
pub trait ResultSink {
    /// Submit one record. Resubmitting a record already present is not an error.
    async fn submit(&self, record: &DestinationRecord) -> SyncResult<SubmitOutcome>;

    /// Source submit time of the newest record previously copied here, if the
    /// destination can tell. Used to pick a start point when no cursor exists.
    async fn last_synced_submit_time(&self) -> SyncResult<Option<String>> {
        Ok(None)
    }
}

/// Writes results to a ResultsDB instance.
pub struct ResultsDbSink {
    client: ResultsDbClient,
    dry_run: bool,
}

impl ResultsDbSink {
    pub fn new(client: ResultsDbClient, dry_run: bool) -> Self {
        Self { client, dry_run }
    }

    /// Whether this record is already on the destination.
    ///
    /// Looks up the message id first, then the source result id. Results copied
    /// by older tooling only carry the latter.
    async fn exists(&self, record: &DestinationRecord) -> Result<bool, ResultsDbError> {
        let lookups = [
            (SOURCE_MSG_ID_KEY, record.source_message_id.to_string()),
            (SOURCE_ID_KEY, record.source_result_id.to_string()),
        ];
        for (key, value) in lookups {
            let params = vec![
                (key.to_string(), value),
                ("limit".to_string(), "1".to_string()),
            ];
            if !self.client.get_results_page(&params).await?.data.is_empty() {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

impl ResultSink for ResultsDbSink {
    async fn submit(&self, record: &DestinationRecord) -> SyncResult<SubmitOutcome> {
        let submit_failed = |reason: String| SyncError::SubmitFailed {
            message_id: record.source_message_id.clone(),
            reason,
        };

        // Up to two lookups per record before anything is posted
        if self
            .exists(record)
            .await
            .map_err(|e| submit_failed(format!("duplicate check failed: {}", e)))?
        {
            tracing::debug!(
                "Skipping {} as it appears to be in the destination ResultsDB",
                record.source_message_id
            );
            return Ok(SubmitOutcome::AlreadyExists);
        }

        let request = record.to_create_request();
        if self.dry_run {
            let payload = serde_json::to_string(&request)
                .map_err(|e| submit_failed(format!("cannot serialize payload: {}", e)))?;
            tracing::info!(
                "[dry-run] would create result for {}: {}",
                record.source_message_id,
                payload
            );
            return Ok(SubmitOutcome::Created);
        }

        match self.client.create_result(&request).await {
            Ok(id) => {
                tracing::debug!(
                    "Created destination result {:?} for {}",
                    id,
                    record.source_message_id
                );
                Ok(SubmitOutcome::Created)
            }
            Err(e) if e.status() == Some(reqwest::StatusCode::CONFLICT) => {
                tracing::debug!(
                    "Destination reported {} as already present",
                    record.source_message_id
                );
                Ok(SubmitOutcome::AlreadyExists)
            }
            Err(e) => Err(submit_failed(e.to_string())),
        }
    }

    async fn last_synced_submit_time(&self) -> SyncResult<Option<String>> {
        let params = vec![
            (SYNCED_FLAG_KEY.to_string(), "true".to_string()),
            ("_sort".to_string(), "desc:submit_time".to_string()),
            ("limit".to_string(), "1".to_string()),
        ];
        let page = self
            .client
            .get_results_page(&params)
            .await
            .map_err(|e| SyncError::SourceUnavailable(format!("destination query failed: {}", e)))?;

        Ok(page
            .data
            .first()
            .and_then(|result| result.data_value(SOURCE_SUBMIT_TIME_KEY))
            .map(str::to_string))
    }
}
