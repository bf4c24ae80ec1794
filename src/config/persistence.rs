//! Storage, write-queue and warm-up configuration

use serde::{Deserialize, Serialize};

/// SQLite database settings
pub struct DatabaseConfig {
    /// Default database file, overridable with `--db`
    pub path: &'static str,
    pub max_connections: u32,
    pub busy_timeout_ms: u64,
    /// Rows per multi-value INSERT (SQLite caps bound parameters)
    pub insert_chunk_rows: usize,
}

/// Background write queue
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    pub capacity: usize,
    /// How long shutdown waits for queued writes to land.
    pub flush_timeout_ms: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        PERSISTENCE.queue
    }
}

/// The Master Persistence Configuration
pub struct PersistenceConfig {
    pub database: DatabaseConfig,
    pub queue: QueueConfig,
}

pub const PERSISTENCE: PersistenceConfig = PersistenceConfig {
    database: DatabaseConfig {
        path: "sentinel.sqlite",
        max_connections: 5,
        busy_timeout_ms: 5000,
        insert_chunk_rows: 500,
    },
    queue: QueueConfig {
        capacity: 10_000,
        flush_timeout_ms: 10_000,
    },
};

/// Cold-start warm-up
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct BackfillConfig {
    /// Fraction of the window that must come from the store to skip the REST fetch.
    pub min_coverage: f64,
    pub batch_size: usize,
    pub batch_delay_ms: u64,
    /// Attempts per symbol when the exchange reports a rate limit.
    pub max_rate_limit_retries: u32,
}

impl Default for BackfillConfig {
    fn default() -> Self {
        BACKFILL
    }
}

pub const BACKFILL: BackfillConfig = BackfillConfig {
    min_coverage: 0.8,
    batch_size: 10,
    batch_delay_ms: 1000,
    max_rate_limit_retries: 3,
};
