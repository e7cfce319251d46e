// ABOUTME: Source adapter - streams new results from the CentOS CI ResultsDB
// ABOUTME: Transparent pagination and gap-free resume from the stored cursor

use chrono::NaiveDateTime;
use futures::stream::{self, BoxStream, StreamExt};
use std::cmp::Ordering;
use std::collections::VecDeque;

use super::cursor::Cursor;
use super::record::SourceRecord;
use crate::error::{SyncError, SyncResult};
use crate::resultsdb::{ResultsDbClient, ResultsDbResult};

/// Default number of results requested per page.
pub const DEFAULT_PAGE_SIZE: u32 = 50;

/// Somewhere results can be read from, in emission order.
pub trait ResultSource {
    /// Stream every record emitted after `cursor`.
    ///
    /// With no cursor, starts at `start_since` or at the beginning of time.
    /// Errors surface as `SourceUnavailable` items; the stream ends after one.
    fn fetch_since<'a>(
        &'a self,
        cursor: Option<&'a Cursor>,
        start_since: Option<&'a str>,
    ) -> BoxStream<'a, SyncResult<SourceRecord>>;
}

/// Reads results from a ResultsDB instance.
pub struct ResultsDbSource {
    client: ResultsDbClient,
    page_size: u32,
    message_id_key: String,
}

impl ResultsDbSource {
    pub fn new(client: ResultsDbClient, page_size: u32, message_id_key: &str) -> Self {
        Self {
            client,
            page_size: page_size.max(1),
            message_id_key: message_id_key.to_string(),
        }
    }

    fn first_page_params(&self, since: Option<&str>) -> Vec<(String, String)> {
        let mut params = vec![
            ("_sort".to_string(), "asc:submit_time".to_string()),
            ("limit".to_string(), self.page_size.to_string()),
        ];
        if let Some(since) = since {
            params.push(("since".to_string(), since.to_string()));
        }
        params
    }
}

enum NextPage {
    First(Vec<(String, String)>),
    Link(String),
    Done,
}

struct PageState<'a> {
    client: &'a ResultsDbClient,
    message_id_key: &'a str,
    next: NextPage,
    pending: VecDeque<ResultsDbResult>,
    resume: Option<ResumeFilter>,
}

impl ResultSource for ResultsDbSource {
    fn fetch_since<'a>(
        &'a self,
        cursor: Option<&'a Cursor>,
        start_since: Option<&'a str>,
    ) -> BoxStream<'a, SyncResult<SourceRecord>> {
        let since = match cursor {
            Some(cursor) => Some(cursor.submit_time.as_str()),
            None => start_since,
        };
        let state = PageState {
            client: &self.client,
            message_id_key: &self.message_id_key,
            next: NextPage::First(self.first_page_params(since)),
            pending: VecDeque::new(),
            resume: cursor.cloned().map(ResumeFilter::new),
        };

        stream::try_unfold(state, next_record).boxed()
    }
}

async fn next_record(
    mut state: PageState<'_>,
) -> SyncResult<Option<(SourceRecord, PageState<'_>)>> {
    loop {
        if let Some(result) = state.pending.pop_front() {
            let record = SourceRecord::from_result(result, state.message_id_key);
            let admitted = match state.resume.as_mut() {
                Some(filter) => {
                    let admitted = filter.admit(record);
                    if filter.is_finished() {
                        state.resume = None;
                    }
                    admitted
                }
                None => Some(record),
            };
            match admitted {
                Some(record) => return Ok(Some((record, state))),
                None => continue,
            }
        }

        let page = match std::mem::replace(&mut state.next, NextPage::Done) {
            NextPage::First(params) => state.client.get_results_page(&params).await,
            NextPage::Link(url) => state.client.get_next_page(&url).await,
            NextPage::Done => return Ok(None),
        }
        .map_err(|e| SyncError::SourceUnavailable(e.to_string()))?;

        tracing::debug!(
            "Fetched page of {} results (more: {})",
            page.data.len(),
            page.next.is_some()
        );
        state.next = page.next.map(NextPage::Link).unwrap_or(NextPage::Done);
        state.pending.extend(page.data);
    }
}

/// Drops the records at the head of a resumed fetch that the cursor already covers.
///
/// The source's `since` filter is inclusive and only has submit-time precision, so a
/// resumed query can return records at or before the cursor. Records strictly older
/// than the cursor are dropped, as is the cursor's own record. Other records sharing
/// the cursor's submit time are passed through: ResultsDB does not order ties, so
/// there is no telling which of them were synced before. The sink absorbs the
/// duplicates.
#[derive(Debug)]
pub struct ResumeFilter {
    cursor: Cursor,
    finished: bool,
}

impl ResumeFilter {
    pub fn new(cursor: Cursor) -> Self {
        Self {
            cursor,
            finished: false,
        }
    }

    /// True once a record newer than the cursor has gone through.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Feed the next record in emission order; returns it if it should be emitted.
    pub fn admit(&mut self, record: SourceRecord) -> Option<SourceRecord> {
        if self.finished {
            return Some(record);
        }

        match compare_submit_times(&record.submit_time, &self.cursor.submit_time) {
            Ordering::Less => {
                tracing::debug!(
                    "Dropping {} from before the cursor ({} < {})",
                    record.message_id,
                    record.submit_time,
                    self.cursor.submit_time
                );
                None
            }
            Ordering::Equal if record.message_id == self.cursor.message_id => {
                tracing::debug!("Dropping cursor record {}", record.message_id);
                None
            }
            Ordering::Equal => {
                tracing::debug!(
                    "Re-delivering {} which shares the cursor's submit time",
                    record.message_id
                );
                Some(record)
            }
            Ordering::Greater => {
                self.finished = true;
                Some(record)
            }
        }
    }
}

/// Compare two ResultsDB timestamps chronologically, falling back to text order.
fn compare_submit_times(a: &str, b: &str) -> Ordering {
    match (parse_submit_time(a), parse_submit_time(b)) {
        (Some(a), Some(b)) => a.cmp(&b),
        _ => a.cmp(b),
    }
}

fn parse_submit_time(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim().trim_end_matches('Z');
    NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S%.f"))
        .ok()
}
