use serde::{Deserialize, Serialize};
use strum_macros::Display;

/// Sub-scores of a candidate consolidation. Each is bounded by its own cap and
/// `total` is their sum, capped at 100.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct RangeScore {
    /// 0-30: how much consecutive bars overlap.
    pub overlap: f64,
    /// 0-25: entries into the band around either bound.
    pub touches: f64,
    /// 0-20: saturating function of candle count.
    pub duration: f64,
    /// 0-15: share of volume traded inside the bounds.
    pub volume: f64,
    /// 0-10: balance between upper and lower touches.
    pub shape: f64,
    pub total: f64,
}

impl RangeScore {
    pub const OVERLAP_MAX: f64 = 30.0;
    pub const TOUCHES_MAX: f64 = 25.0;
    pub const DURATION_MAX: f64 = 20.0;
    pub const VOLUME_MAX: f64 = 15.0;
    pub const SHAPE_MAX: f64 = 10.0;
    pub const TOTAL_MAX: f64 = 100.0;

    pub fn from_parts(overlap: f64, touches: f64, duration: f64, volume: f64, shape: f64) -> Self {
        let overlap = overlap.clamp(0.0, Self::OVERLAP_MAX);
        let touches = touches.clamp(0.0, Self::TOUCHES_MAX);
        let duration = duration.clamp(0.0, Self::DURATION_MAX);
        let volume = volume.clamp(0.0, Self::VOLUME_MAX);
        let shape = shape.clamp(0.0, Self::SHAPE_MAX);
        let total = (overlap + touches + duration + volume + shape).min(Self::TOTAL_MAX);
        Self {
            overlap,
            touches,
            duration,
            volume,
            shape,
            total,
        }
    }
}

/// Outcome of the trend filter for a surviving candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, Default)]
pub enum TrendVerdict {
    #[default]
    Sideways,
    MildUptrend,
    MildDowntrend,
}

/// A price band judged to be consolidation.
///
/// `start_time` and `end_time` are the open times of the first and last candle.
/// Always `upper_bound > lower_bound > 0`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructuralRange {
    pub upper_bound: f64,
    pub lower_bound: f64,
    pub center_price: f64,
    pub start_time: i64,
    pub end_time: i64,
    pub candle_count: usize,
    pub score: RangeScore,
    pub trend_verdict: TrendVerdict,
}

impl StructuralRange {
    #[inline]
    pub fn width(&self) -> f64 {
        self.upper_bound - self.lower_bound
    }

    /// Width as a percentage of the center price. Smaller is tighter.
    pub fn width_pct(&self) -> f64 {
        if self.center_price > 0.0 {
            self.width() / self.center_price * 100.0
        } else {
            f64::INFINITY
        }
    }

    /// Number of bars the two ranges share, given the bar interval.
    pub fn overlap_bars(&self, other: &StructuralRange, interval_ms: i64) -> usize {
        let start = self.start_time.max(other.start_time);
        let end = self.end_time.min(other.end_time);
        if end < start || interval_ms <= 0 {
            return 0;
        }
        ((end - start) / interval_ms + 1) as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn range(start_bar: i64, count: usize) -> StructuralRange {
        StructuralRange {
            upper_bound: 101.0,
            lower_bound: 99.0,
            center_price: 100.0,
            start_time: start_bar * 60_000,
            end_time: (start_bar + count as i64 - 1) * 60_000,
            candle_count: count,
            score: RangeScore::default(),
            trend_verdict: TrendVerdict::Sideways,
        }
    }

    #[test]
    fn total_is_capped_and_parts_clamped() {
        let s = RangeScore::from_parts(40.0, 30.0, 25.0, 20.0, 15.0);
        assert_eq!(s.overlap, 30.0);
        assert_eq!(s.total, 100.0);
        let s = RangeScore::from_parts(-5.0, 10.0, 10.0, 5.0, 5.0);
        assert_eq!(s.overlap, 0.0);
        assert_eq!(s.total, 30.0);
    }

    #[test]
    fn raising_one_part_never_lowers_total() {
        let base = [12.0, 9.0, 14.0, 6.0, 3.0];
        let before = RangeScore::from_parts(base[0], base[1], base[2], base[3], base[4]).total;
        for i in 0..5 {
            let mut parts = base;
            parts[i] += 7.5;
            let after = RangeScore::from_parts(parts[0], parts[1], parts[2], parts[3], parts[4]).total;
            assert!(after >= before);
        }
    }

    #[test]
    fn overlap_bars_counts_shared_candles() {
        let a = range(0, 20);
        let b = range(10, 20);
        assert_eq!(a.overlap_bars(&b, 60_000), 10);
        assert_eq!(a.overlap_bars(&range(20, 5), 60_000), 0);
        assert!((a.width_pct() - 2.0).abs() < 1e-9);
    }
}
