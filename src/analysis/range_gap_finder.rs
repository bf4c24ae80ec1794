use crate::config::SegmentSplitConfig;
use crate::domain::Candle;
use crate::utils::format_duration;

#[derive(Debug, Clone, PartialEq)]
pub enum GapReason {
    None,        // Start of data
    PriceJump,   // Open jumped away from the previous close
    MissingBars, // Time jumped (exchange down, feed hole)
}

#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    /// Inclusive index into the analysed slice
    pub start_idx: usize,
    /// Exclusive index into the analysed slice
    pub end_idx: usize,

    // Gap *preceding* this segment
    pub gap_reason: GapReason,
    pub gap_duration_str: String,
}

impl Segment {
    pub fn len(&self) -> usize {
        self.end_idx - self.start_idx
    }

    pub fn is_empty(&self) -> bool {
        self.end_idx == self.start_idx
    }
}

pub struct RangeGapFinder;

impl RangeGapFinder {
    /// Splits `candles` wherever consecutive bars are separated by a price jump
    /// of at least `max_price_gap_pct` or by at least `max_time_gap_bars` missing bars.
    /// A slice without gaps comes back as a single segment.
    pub fn analyze(candles: &[Candle], cfg: &SegmentSplitConfig, interval_ms: i64) -> Vec<Segment> {
        if candles.is_empty() {
            return Vec::new();
        }

        let mut segments = Vec::new();
        let mut current_start = 0;
        let mut pending_reason = GapReason::None;
        let mut pending_duration = String::new();

        for i in 1..candles.len() {
            let prev = &candles[i - 1];
            let curr = &candles[i];

            let reason = Self::gap_between(prev, curr, cfg, interval_ms);
            if reason == GapReason::None {
                continue;
            }

            segments.push(Segment {
                start_idx: current_start,
                end_idx: i,
                gap_reason: pending_reason,
                gap_duration_str: pending_duration,
            });
            current_start = i;
            pending_reason = reason;
            pending_duration = format_duration(curr.open_time - prev.open_time);
        }

        segments.push(Segment {
            start_idx: current_start,
            end_idx: candles.len(),
            gap_reason: pending_reason,
            gap_duration_str: pending_duration,
        });

        segments
    }

    fn gap_between(prev: &Candle, curr: &Candle, cfg: &SegmentSplitConfig, interval_ms: i64) -> GapReason {
        if interval_ms > 0 {
            let missing_bars = (curr.open_time - prev.open_time) / interval_ms - 1;
            if missing_bars >= cfg.max_time_gap_bars {
                return GapReason::MissingBars;
            }
        }
        if prev.close > 0.0 {
            let jump_pct = (curr.open - prev.close).abs() / prev.close * 100.0;
            if jump_pct >= cfg.max_price_gap_pct {
                return GapReason::PriceJump;
            }
        }
        GapReason::None
    }
}

/// Smallest positive spacing between consecutive open times, or 0 if unknown.
pub(crate) fn infer_interval_ms(candles: &[Candle]) -> i64 {
    candles
        .windows(2)
        .map(|p| p[1].open_time - p[0].open_time)
        .filter(|d| *d > 0)
        .min()
        .unwrap_or(0)
}
