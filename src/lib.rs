// ABOUTME: Library root for rdbsync
// ABOUTME: Exports the ResultsDB client, sync engine, configuration and error types

pub mod config;
pub mod error;
pub mod resultsdb;
pub mod sync;

pub use config::SyncConfig;
pub use error::{ResultsDbError, SyncError, SyncResult};
