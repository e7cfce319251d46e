// ABOUTME: Configuration for a ResultsDB sync run
// ABOUTME: Built from CLI flags and passed explicitly into the sync engine

use std::time::Duration;

use crate::sync::source::DEFAULT_PAGE_SIZE;

/// The CentOS CI ResultsDB API.
pub const DEFAULT_CENTOS_URL: &str = "https://resultsdb.ci.centos.org/resultsdb_api/api";
/// The Fedora ResultsDB API.
pub const DEFAULT_FEDORA_URL: &str = "https://taskotron.fedoraproject.org/resultsdb_api/api";
/// Data key the CentOS CI pipeline stores the message id under.
pub const DEFAULT_MESSAGE_ID_KEY: &str = "msg_id";

#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub source_url: String,
    pub destination_url: String,
    /// Sleep between passes. `None` runs a single pass.
    pub poll_interval: Option<Duration>,
    /// Results requested per source page
    pub page_size: u32,
    /// Submit time to start from when there is no cursor
    pub start_since: Option<String>,
    pub message_id_key: String,
    /// Ask the destination for the newest copied result when there is no cursor
    pub bootstrap_from_destination: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            source_url: DEFAULT_CENTOS_URL.to_string(),
            destination_url: DEFAULT_FEDORA_URL.to_string(),
            poll_interval: None,
            page_size: DEFAULT_PAGE_SIZE,
            start_since: None,
            message_id_key: DEFAULT_MESSAGE_ID_KEY.to_string(),
            bootstrap_from_destination: false,
        }
    }
}

impl SyncConfig {
    pub fn is_polling(&self) -> bool {
        self.poll_interval.is_some()
    }
}
