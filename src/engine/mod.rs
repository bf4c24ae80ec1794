mod backtest;
mod core;
mod dedup;
mod messages;
mod publisher;
mod state;
mod worker;

pub use backtest::{BacktestReport, run_backtest};
pub use core::{IngestionRouter, RouterStats};
pub use dedup::{AlertDeduplicator, CooldownEntry, CooldownKey};
pub use messages::{AlertEnvelope, PersistJob};
pub use publisher::{AlertBus, log_alerts};
pub use worker::{PersistSummary, spawn_persistence_worker};
