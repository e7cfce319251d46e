// ABOUTME: ResultsDB REST API client and wire models
// ABOUTME: Shared by the source (CentOS CI) and sink (Fedora) adapters

mod client;
mod models;

pub use client::{ResultsDbClient, DEFAULT_TIMEOUT_SECS};
pub use models::{CreateResult, ResultData, ResultsDbResult, ResultsPage, Testcase};
