//! Breakout confirmation thresholds

use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter, EnumString};

use crate::models::Direction;

/// Volume multiplier presets. Sensitive fires earliest, Strict demands the heaviest bar.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, EnumIter, Default,
)]
pub enum VolumeProfile {
    #[default]
    Sensitive,
    Standard,
    Strict,
}

impl VolumeProfile {
    pub const fn multiplier(self) -> f64 {
        match self {
            Self::Sensitive => 1.5,
            Self::Standard => 2.0,
            Self::Strict => 2.5,
        }
    }
}

/// How far beyond the bound a close must land.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum AmplitudeRule {
    /// Distance past the bound divided by range width.
    RangeRatio(f64),
    /// Distance past the bound measured in ATRs over the recent candles.
    AtrMultiple { multiple: f64, period: usize },
}

impl Default for AmplitudeRule {
    fn default() -> Self {
        BREAKOUT.amplitude
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DirectionFilter {
    pub up: bool,
    pub down: bool,
}

impl Default for DirectionFilter {
    fn default() -> Self {
        BREAKOUT.directions
    }
}

impl DirectionFilter {
    pub fn allows(&self, direction: Direction) -> bool {
        match direction {
            Direction::Up => self.up,
            Direction::Down => self.down,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct BreakoutConfig {
    /// Maximum bars between the range's last candle and the breakout candle.
    pub recency_bars: i64,
    pub amplitude: AmplitudeRule,
    pub volume_profile: VolumeProfile,
    /// Candles averaged for the volume baseline.
    pub volume_lookback: usize,
    /// Subsequent closes required beyond the bound (backtest only).
    pub persistence_bars: usize,
    pub directions: DirectionFilter,
}

impl Default for BreakoutConfig {
    fn default() -> Self {
        BREAKOUT
    }
}

pub const BREAKOUT: BreakoutConfig = BreakoutConfig {
    recency_bars: 3,
    amplitude: AmplitudeRule::RangeRatio(0.3),
    volume_profile: VolumeProfile::Sensitive,
    volume_lookback: 20,
    persistence_bars: 2,
    directions: DirectionFilter { up: true, down: true },
};

/// ATR variant used when configured as `AmplitudeRule::AtrMultiple`.
pub const ATR_AMPLITUDE: AmplitudeRule = AmplitudeRule::AtrMultiple {
    multiple: 1.0,
    period: 14,
};
