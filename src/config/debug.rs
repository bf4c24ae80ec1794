//! Debugging feature flags.

pub struct LogFlags {
    /// Emit verbose logging for live stream connections and ticks.
    pub log_price_stream_updates: bool,

    /// Every forming/finalized bar applied to a window.
    pub log_candle_update: bool,

    /// Ranges found per detection pass.
    pub log_detection: bool,

    /// Suppressed alerts and cooldown overrides.
    pub log_dedup: bool,

    pub log_backfill: bool,

    /// Activate trace_time macro (for cool scope-level timing)
    pub log_performance: bool,

    // Limit how many symbols are loaded in Debug mode.
    pub max_pairs_load: usize,
}

pub const DF: LogFlags = LogFlags {
    log_backfill: true,

    log_price_stream_updates: false,
    log_candle_update: false,
    log_detection: false,
    log_dedup: false,
    log_performance: false,

    max_pairs_load: 500,
};
