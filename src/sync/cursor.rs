// ABOUTME: Sync cursor persistence - tracks the last synced source message
// ABOUTME: JSON state file with atomic replace, plus an in-memory store for tests and dry runs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

use super::record::{MessageId, SourceRecord};
use crate::error::{SyncError, SyncResult};

/// Current version of the on-disk cursor format.
const STATE_VERSION: u32 = 1;

/// Bookmark of the last record that was fully handled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cursor {
    pub message_id: MessageId,
    /// Submit time of that record, used as the source query's lower bound
    pub submit_time: String,
}

impl Cursor {
    pub fn new(message_id: MessageId, submit_time: impl Into<String>) -> Self {
        Self {
            message_id,
            submit_time: submit_time.into(),
        }
    }

    pub fn from_record(record: &SourceRecord) -> Self {
        Self::new(record.message_id.clone(), record.submit_time.clone())
    }
}

/// Durable storage for the sync cursor.
#[allow(async_fn_in_trait)]
pub trait CursorStore {
    /// Read the stored cursor. `None` means nothing has been synced yet.
    async fn load(&mut self) -> SyncResult<Option<Cursor>>;

    /// Persist `cursor`. Only called after the record it names is handled.
    async fn save(&mut self, cursor: &Cursor) -> SyncResult<()>;
}

/// Serialized form of the cursor file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CursorState {
    /// Version of the state format for future migrations
    pub version: u32,
    /// Source ResultsDB URL (sanitized - no password)
    pub source_url: String,
    pub last_message_id: MessageId,
    pub last_submit_time: String,
    /// Total records handled since this state was created
    pub records_synced: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CursorState {
    pub fn new(source_url: &str, cursor: &Cursor) -> Self {
        let now = Utc::now();
        Self {
            version: STATE_VERSION,
            source_url: sanitize_url(source_url),
            last_message_id: cursor.message_id.clone(),
            last_submit_time: cursor.submit_time.clone(),
            records_synced: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Move the bookmark forward by one handled record.
    pub fn advance(&mut self, cursor: &Cursor) {
        self.last_message_id = cursor.message_id.clone();
        self.last_submit_time = cursor.submit_time.clone();
        self.records_synced += 1;
        self.updated_at = Utc::now();
    }

    pub fn cursor(&self) -> Cursor {
        Cursor::new(self.last_message_id.clone(), self.last_submit_time.clone())
    }
}

/// Cursor persisted as a JSON file.
pub struct FileCursorStore {
    path: PathBuf,
    source_url: String,
    state: Option<CursorState>,
}

impl FileCursorStore {
    pub fn new(path: impl Into<PathBuf>, source_url: &str) -> Self {
        Self {
            path: path.into(),
            source_url: source_url.to_string(),
            state: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Last state read or written by this store.
    pub fn state(&self) -> Option<&CursorState> {
        self.state.as_ref()
    }

    /// Default cursor location: ~/.rdbsync/cursor.json
    pub fn default_path() -> SyncResult<PathBuf> {
        let home = dirs::home_dir()
            .ok_or_else(|| SyncError::CursorStore("Could not find home directory".to_string()))?;
        Ok(home.join(".rdbsync").join("cursor.json"))
    }

    async fn read_state(&self) -> SyncResult<Option<CursorState>> {
        let contents = match fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(SyncError::CursorStore(format!(
                    "Failed to read cursor from {:?}: {}",
                    self.path, e
                )))
            }
        };

        let state: CursorState = serde_json::from_str(&contents).map_err(|e| {
            SyncError::CursorStore(format!(
                "Failed to parse cursor from {:?}: {}",
                self.path, e
            ))
        })?;

        if state.version != STATE_VERSION {
            return Err(SyncError::CursorStore(format!(
                "Unsupported cursor format version {} in {:?}",
                state.version, self.path
            )));
        }

        Ok(Some(state))
    }

    async fn write_state(&self, state: &CursorState) -> SyncResult<()> {
        // Ensure parent directory exists
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await.map_err(|e| {
                    SyncError::CursorStore(format!("Failed to create directory {:?}: {}", parent, e))
                })?;
            }
        }

        let contents = serde_json::to_string_pretty(state)
            .map_err(|e| SyncError::CursorStore(format!("Failed to serialize cursor: {}", e)))?;

        // Write then rename so a crash never leaves a half-written cursor
        let tmp_path = self.path.with_extension("json.tmp");
        let write_err = |e: std::io::Error| {
            SyncError::CursorStore(format!("Failed to write cursor to {:?}: {}", tmp_path, e))
        };
        let mut file = fs::File::create(&tmp_path).await.map_err(write_err)?;
        file.write_all(contents.as_bytes()).await.map_err(write_err)?;
        // Contents must be on disk before the rename makes them the cursor
        file.sync_all().await.map_err(write_err)?;
        drop(file);
        fs::rename(&tmp_path, &self.path).await.map_err(|e| {
            SyncError::CursorStore(format!(
                "Failed to move cursor into place at {:?}: {}",
                self.path, e
            ))
        })?;
        Ok(())
    }
}

impl CursorStore for FileCursorStore {
    async fn load(&mut self) -> SyncResult<Option<Cursor>> {
        let state = self.read_state().await?;
        if let Some(ref state) = state {
            let expected = sanitize_url(&self.source_url);
            if state.source_url.trim_end_matches('/') != expected.trim_end_matches('/') {
                return Err(SyncError::CursorStore(format!(
                    "Cursor in {:?} was recorded for {} but the source is {}; \
                     remove it or pass a different --cursor-file",
                    self.path, state.source_url, expected
                )));
            }
            tracing::info!(
                "Loaded sync cursor {} ({} records synced so far)",
                state.last_message_id,
                state.records_synced
            );
        }
        let cursor = state.as_ref().map(CursorState::cursor);
        self.state = state;
        Ok(cursor)
    }

    async fn save(&mut self, cursor: &Cursor) -> SyncResult<()> {
        let mut state = self
            .state
            .clone()
            .unwrap_or_else(|| CursorState::new(&self.source_url, cursor));
        state.advance(cursor);
        self.write_state(&state).await?;
        self.state = Some(state);
        Ok(())
    }
}

/// Cursor kept in memory only. Records every save for inspection.
#[derive(Debug, Default)]
pub struct MemoryCursorStore {
    cursor: Option<Cursor>,
    history: Vec<Cursor>,
}

impl MemoryCursorStore {
    pub fn new(cursor: Option<Cursor>) -> Self {
        Self {
            cursor,
            history: Vec::new(),
        }
    }

    pub fn current(&self) -> Option<&Cursor> {
        self.cursor.as_ref()
    }

    /// Every cursor saved, oldest first.
    pub fn history(&self) -> &[Cursor] {
        &self.history
    }
}

impl CursorStore for MemoryCursorStore {
    async fn load(&mut self) -> SyncResult<Option<Cursor>> {
        Ok(self.cursor.clone())
    }

    async fn save(&mut self, cursor: &Cursor) -> SyncResult<()> {
        self.cursor = Some(cursor.clone());
        self.history.push(cursor.clone());
        Ok(())
    }
}

/// Sanitize a URL by masking the password component
pub fn sanitize_url(url: &str) -> String {
    if let Ok(mut parsed) = url::Url::parse(url) {
        if parsed.password().is_some() {
            let _ = parsed.set_password(Some("***"));
        }
        parsed.to_string()
    } else {
        url.to_string()
    }
}
