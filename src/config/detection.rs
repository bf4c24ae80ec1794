//! Range detection configuration (Immutable Blueprints)

use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

/// Which detector implementation drives the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, Default)]
pub enum StrategyKind {
    /// Sliding windows scored on overlap, touches, duration, volume and shape.
    #[default]
    OverlapScore,
    /// Windows anchored at the latest bar whose width is small relative to ATR.
    TightRange,
}

/// Sliding window scan geometry.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowScan {
    /// Rolling buffer capacity per symbol (finalized bars).
    pub capacity: usize,
    pub min_size: usize,
    pub max_size: usize,
    pub size_stride: usize,
    /// Step between trial start offsets, counted back from the latest bar.
    pub offset_stride: usize,
}

impl Default for WindowScan {
    fn default() -> Self {
        DETECTION.window
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    /// Candidates below this total (0-100) are discarded.
    pub min_total_score: f64,
    /// Maximum number of ranges returned per detection pass.
    pub top_k: usize,
    /// Upper bound is this quantile of highs, lower bound the mirrored quantile of lows.
    pub bound_quantile: f64,
    /// Width of the touch band around each bound, as a fraction of range width.
    pub touch_tolerance_pct: f64,
    /// Touches beyond this per side add nothing.
    pub touch_cap_per_side: usize,
    /// Candle count at which the duration score saturates.
    pub duration_target: usize,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        DETECTION.scoring
    }
}

/// A candidate is rejected as a trend only if all three thresholds are met.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct TrendFilterConfig {
    pub min_r_squared: f64,
    /// Absolute first-to-last close change, in percent.
    pub min_change_pct: f64,
    /// Absolute regression slope per bar, in percent of mean close.
    pub min_slope_pct: f64,
}

impl Default for TrendFilterConfig {
    fn default() -> Self {
        DETECTION.trend
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentSplitConfig {
    /// Close-to-open jump between consecutive candles, in percent.
    pub max_price_gap_pct: f64,
    /// Missing bars between consecutive candles.
    pub max_time_gap_bars: i64,
}

impl Default for SegmentSplitConfig {
    fn default() -> Self {
        DETECTION.split
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct TightRangeConfig {
    pub atr_period: usize,
    /// Window qualifies when its width is at most this many ATRs.
    pub max_width_atr: f64,
}

impl Default for TightRangeConfig {
    fn default() -> Self {
        DETECTION.tight
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    pub strategy: StrategyKind,
    pub window: WindowScan,
    pub scoring: ScoringConfig,
    pub trend: TrendFilterConfig,
    pub split: SegmentSplitConfig,
    pub tight: TightRangeConfig,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        DETECTION
    }
}

pub const DETECTION: DetectionConfig = DetectionConfig {
    strategy: StrategyKind::OverlapScore,
    window: WindowScan {
        capacity: 150,
        min_size: 20,
        max_size: 80,
        size_stride: 10,
        offset_stride: 5,
    },
    scoring: ScoringConfig {
        min_total_score: 50.0,
        top_k: 3,
        bound_quantile: 0.95,
        touch_tolerance_pct: 0.20,
        touch_cap_per_side: 3,
        duration_target: 60,
    },
    trend: TrendFilterConfig {
        min_r_squared: 0.6,
        min_change_pct: 1.5,
        min_slope_pct: 0.05,
    },
    split: SegmentSplitConfig {
        max_price_gap_pct: 2.0,
        max_time_gap_bars: 3,
    },
    tight: TightRangeConfig {
        atr_period: 14,
        max_width_atr: 3.0,
    },
};
