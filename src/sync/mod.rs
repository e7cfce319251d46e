// ABOUTME: ResultsDB replication - source, transformer, sink, cursor and engine
// ABOUTME: Copies results one at a time in emission order, resuming from a persisted cursor

pub mod cursor;
pub mod engine;
pub mod record;
pub mod sink;
pub mod source;
pub mod transform;

pub use cursor::{sanitize_url, Cursor, CursorState, CursorStore, FileCursorStore, MemoryCursorStore};
pub use engine::{PassStats, SyncEngine, SyncPhase};
pub use record::{MessageId, SourceRecord};
pub use sink::{ResultSink, ResultsDbSink, SubmitOutcome};
pub use source::{ResultSource, ResultsDbSource, ResumeFilter};
pub use transform::{transform, DestinationRecord, Outcome};
