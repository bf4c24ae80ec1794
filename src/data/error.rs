use std::time::Duration;

use thiserror::Error;

/// Failures at the edge of the system: the live feed, the REST history API
/// and the store. Detection code never produces these.
#[derive(Error, Debug)]
pub enum FeedError {
    /// Socket or HTTP failure. The connection is retried after the fixed delay.
    #[error("transient network error: {0}")]
    TransientNetwork(String),

    /// Payload that does not decode to a valid kline. Dropped and counted.
    #[error("malformed message: {0}")]
    MalformedMessage(String),

    /// Store write or read failed. Logged, never surfaced to ingestion.
    #[error("persistence failure: {0}")]
    Persistence(String),

    /// Exchange asked us to slow down.
    #[error("upstream rate limit, retry after {retry_after:?}")]
    UpstreamRateLimit { retry_after: Duration },
}

impl From<tokio_tungstenite::tungstenite::Error> for FeedError {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        FeedError::TransientNetwork(e.to_string())
    }
}

impl From<serde_json::Error> for FeedError {
    fn from(e: serde_json::Error) -> Self {
        FeedError::MalformedMessage(e.to_string())
    }
}
