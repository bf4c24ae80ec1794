use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter, EnumString};

use crate::config::{Pct, VolRatio};
use crate::models::StructuralRange;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, EnumIter,
)]
#[strum(serialize_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    Up,
    Down,
}

/// Which confirmation checks held when the event was created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Confirmations {
    pub amplitude: bool,
    pub volume: bool,
    /// Backtest mode: closes beyond the bound persisted. Live mode: not yet disproved.
    pub persistence: bool,
}

/// A finalized candle that closed outside a structural range. Never mutated
/// after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreakoutEvent {
    pub symbol: String,
    pub direction: Direction,
    pub breakout_price: f64,
    /// Distance past the broken bound, in percent of that bound.
    pub magnitude_pct: Pct,
    pub volume_ratio: VolRatio,
    pub range: StructuralRange,
    pub confirmed: Confirmations,
    pub candle_open_time: i64,
    /// Close time of the breakout candle (ms). Cooldowns are measured on this clock.
    pub detected_at: i64,
}

impl std::fmt::Display for BreakoutEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {} @ {:.6} ({}, vol {}) range [{:.6}, {:.6}] x{} score {:.1}",
            self.symbol,
            self.direction,
            self.breakout_price,
            self.magnitude_pct,
            self.volume_ratio,
            self.range.lower_bound,
            self.range.upper_bound,
            self.range.candle_count,
            self.range.score.total
        )
    }
}
