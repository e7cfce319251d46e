// ABOUTME: Sync engine - runs fetch/transform/submit/advance passes
// ABOUTME: One-shot or polling, strictly sequential, cursor advanced per record

use futures::StreamExt;
use std::time::{Duration, Instant};
use tokio::sync::broadcast::{self, error::TryRecvError};

use super::cursor::{Cursor, CursorStore};
use super::record::MessageId;
use super::sink::{ResultSink, SubmitOutcome};
use super::source::ResultSource;
use super::transform::transform;
use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};

/// Where the engine currently is in its cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    Idle,
    Fetching,
    Processing,
    Advancing,
    Sleeping,
}

/// Statistics from a single pass.
#[derive(Debug, Clone, Default)]
pub struct PassStats {
    pub fetched: u64,
    pub created: u64,
    pub already_existed: u64,
    pub skipped_unmappable: u64,
    /// Record the pass halted on, with the reason
    pub failed: Option<(MessageId, String)>,
    /// Why fetching stopped early, if it did
    pub source_error: Option<String>,
    /// Shutdown was requested before the pass finished
    pub cancelled: bool,
    pub duration_ms: u64,
}

impl PassStats {
    /// Records handled (submitted, already present, or skipped).
    pub fn handled(&self) -> u64 {
        self.created + self.already_existed + self.skipped_unmappable
    }

    /// Check if the pass got through everything without errors.
    pub fn is_clean(&self) -> bool {
        self.failed.is_none() && self.source_error.is_none()
    }
}

/// Copies results from a source to a sink, tracking progress in a cursor store.
///
/// Each pass:
/// 1. Fetches records after the stored cursor, oldest first
/// 2. Transforms each one, skipping records with unmappable outcomes
/// 3. Submits it to the sink
/// 4. Saves it as the new cursor before moving on
///
/// A submit failure ends the pass at that record so the next pass retries it.
pub struct SyncEngine<S, K, C> {
    config: SyncConfig,
    source: S,
    sink: K,
    store: C,
    cursor: Option<Cursor>,
    cursor_loaded: bool,
    start_point: Option<String>,
    phase: SyncPhase,
}

impl<S, K, C> SyncEngine<S, K, C>
where
    S: ResultSource,
    K: ResultSink,
    C: CursorStore,
{
    pub fn new(config: SyncConfig, source: S, sink: K, store: C) -> Self {
        let start_point = config.start_since.clone();
        Self {
            config,
            source,
            sink,
            store,
            cursor: None,
            cursor_loaded: false,
            start_point,
            phase: SyncPhase::Idle,
        }
    }

    pub fn phase(&self) -> SyncPhase {
        self.phase
    }

    pub fn cursor(&self) -> Option<&Cursor> {
        self.cursor.as_ref()
    }

    pub fn store(&self) -> &C {
        &self.store
    }

    pub fn sink(&self) -> &K {
        &self.sink
    }

    /// Run a single pass.
    ///
    /// Only fatal errors (cursor store failures) are returned as `Err`. Source and
    /// submit failures end the pass early and are reported in the stats.
    pub async fn run_pass(&mut self, shutdown: &mut broadcast::Receiver<()>) -> SyncResult<PassStats> {
        let start = Instant::now();
        let mut stats = PassStats::default();

        if !self.cursor_loaded {
            self.cursor = self.store.load().await?;
            self.cursor_loaded = true;
        }

        if self.cursor.is_none() && self.start_point.is_none() && self.config.bootstrap_from_destination {
            match self.sink.last_synced_submit_time().await {
                Ok(Some(since)) => {
                    tracing::info!("Resuming from the newest result already in the destination: {}", since);
                    self.start_point = Some(since);
                }
                Ok(None) => {
                    tracing::info!("This appears to be the first sync; starting from the dawn of time");
                }
                Err(e) => {
                    tracing::warn!("Could not discover the last sync time: {}", e);
                    stats.source_error = Some(e.to_string());
                    stats.duration_ms = start.elapsed().as_millis() as u64;
                    return Ok(stats);
                }
            }
        }

        let position = self.cursor.clone();
        let start_point = if position.is_none() {
            self.start_point.clone()
        } else {
            None
        };
        match (&position, &start_point) {
            (Some(cursor), _) => tracing::info!(
                "Querying {} for results after {} ({})",
                self.config.source_url,
                cursor.message_id,
                cursor.submit_time
            ),
            (None, Some(since)) => tracing::info!(
                "Querying {} for all results since {}",
                self.config.source_url,
                since
            ),
            (None, None) => tracing::info!(
                "Querying {} for all results since the dawn of time",
                self.config.source_url
            ),
        }

        self.phase = SyncPhase::Fetching;
        let mut records = self
            .source
            .fetch_since(position.as_ref(), start_point.as_deref());

        loop {
            if shutdown_requested(shutdown) {
                stats.cancelled = true;
                break;
            }

            self.phase = SyncPhase::Fetching;
            let next = tokio::select! {
                biased;
                Ok(()) = shutdown.recv() => {
                    stats.cancelled = true;
                    break;
                }
                next = records.next() => next,
            };

            let record = match next {
                None => break,
                Some(Ok(record)) => record,
                Some(Err(e)) => {
                    tracing::warn!("{}; will retry on the next pass", e);
                    stats.source_error = Some(e.to_string());
                    break;
                }
            };
            stats.fetched += 1;

            self.phase = SyncPhase::Processing;
            match transform(&record) {
                Ok(destination) => match self.sink.submit(&destination).await {
                    Ok(SubmitOutcome::Created) => {
                        tracing::debug!("Synced {} ({})", record.message_id, destination.outcome);
                        stats.created += 1;
                    }
                    Ok(SubmitOutcome::AlreadyExists) => {
                        stats.already_existed += 1;
                    }
                    Err(e) => {
                        // Leave the cursor on the previous record so the next pass retries this one
                        tracing::error!("{}; stopping this pass", e);
                        stats.failed = Some((record.message_id.clone(), e.to_string()));
                        break;
                    }
                },
                Err(e @ SyncError::UnmappableOutcome { .. }) => {
                    tracing::warn!("Skipping record: {}", e);
                    stats.skipped_unmappable += 1;
                }
                Err(e) => return Err(e),
            }

            self.phase = SyncPhase::Advancing;
            let cursor = Cursor::from_record(&record);
            self.store.save(&cursor).await?;
            self.cursor = Some(cursor);
        }

        drop(records);
        self.phase = SyncPhase::Idle;
        stats.duration_ms = start.elapsed().as_millis() as u64;
        Ok(stats)
    }

    /// Run passes until shutdown, sleeping `poll_interval` between them.
    ///
    /// Without a poll interval this runs exactly one pass. Returns the stats of the
    /// last pass that ran.
    pub async fn run(&mut self, mut shutdown: broadcast::Receiver<()>) -> SyncResult<PassStats> {
        let interval = self.config.poll_interval;
        let mut passes = 0u64;

        if let Some(interval) = interval {
            tracing::info!("Starting sync loop with poll_interval={:?}", interval);
        }

        loop {
            passes += 1;
            let stats = self.run_pass(&mut shutdown).await?;
            log_pass(passes, &stats);

            let Some(interval) = interval else {
                return Ok(stats);
            };
            if stats.cancelled {
                tracing::info!("Shutdown signal received, stopping sync loop");
                return Ok(stats);
            }

            self.phase = SyncPhase::Sleeping;
            tracing::info!("Sleeping for {} seconds before the next sync", interval.as_secs());
            if sleep_or_shutdown(interval, &mut shutdown).await {
                tracing::info!("Shutdown signal received while sleeping, stopping sync loop");
                self.phase = SyncPhase::Idle;
                return Ok(stats);
            }
        }
    }
}

/// Sleep for `interval`; returns true if shutdown was requested first.
async fn sleep_or_shutdown(interval: Duration, shutdown: &mut broadcast::Receiver<()>) -> bool {
    tokio::select! {
        biased;
        Ok(()) = shutdown.recv() => true,
        _ = tokio::time::sleep(interval) => false,
    }
}

fn shutdown_requested(shutdown: &mut broadcast::Receiver<()>) -> bool {
    match shutdown.try_recv() {
        Ok(()) | Err(TryRecvError::Lagged(_)) => true,
        Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => false,
    }
}

fn log_pass(pass: u64, stats: &PassStats) {
    tracing::info!(
        "Sync pass {} complete: {} fetched, {} created, {} already present, {} skipped in {}ms",
        pass,
        stats.fetched,
        stats.created,
        stats.already_existed,
        stats.skipped_unmappable,
        stats.duration_ms
    );
    if let Some((message_id, reason)) = &stats.failed {
        tracing::warn!("Pass halted at {}: {}", message_id, reason);
    }
    if let Some(reason) = &stats.source_error {
        tracing::warn!("Pass ended early: {}", reason);
    }
}
