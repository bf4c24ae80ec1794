//! Configuration module for the breakout sentinel.

// Can all be private now because we have a public re-export.
mod alerts;
mod binance;
mod breakout;
mod debug;
mod detection;
mod persistence;
mod settings;
mod types;

// Re-export commonly used items
pub use alerts::{ALERTS, AlertConfig, OverrideMetric};
pub use binance::{BINANCE, BINANCE_PAIRS_FILENAME, BINANCE_QUOTE_ASSETS, BinanceApiConfig, WsConfig};
pub use breakout::{
    ATR_AMPLITUDE, AmplitudeRule, BREAKOUT, BreakoutConfig, DirectionFilter, VolumeProfile,
};
pub use debug::DF;
pub use detection::{
    DETECTION, DetectionConfig, ScoringConfig, SegmentSplitConfig, StrategyKind,
    TightRangeConfig, TrendFilterConfig, WindowScan,
};
pub use persistence::{BACKFILL, BackfillConfig, PERSISTENCE, QueueConfig};
pub use settings::{DEFAULT_INTERVAL, SentinelSettings};
pub use types::{Pct, VolRatio};
