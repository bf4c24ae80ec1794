//! Primary consolidation detector.
//!
//! Slides windows of several sizes back from the newest bar, scores each one,
//! drops trends, splits windows that straddle gaps and keeps the best
//! non-overlapping survivors.

use crate::analysis::range_gap_finder::{RangeGapFinder, infer_interval_ms};
use crate::analysis::range_scoring::{quantile_bounds, score_window};
use crate::analysis::strategy::{Candidate, DetectionStrategy, select_top};
use crate::analysis::trend_filter;
use crate::config::{DF, DetectionConfig};
use crate::domain::Candle;
use crate::models::StructuralRange;
use crate::trace_time;

pub struct OverlapScoreDetector {
    config: DetectionConfig,
}

impl OverlapScoreDetector {
    pub fn new(config: DetectionConfig) -> Self {
        Self { config }
    }

    /// Trial windows as `(start, end)` pairs, end exclusive. Every size is
    /// anchored at the newest bar and stepped back by the offset stride.
    fn trial_windows(&self, len: usize) -> Vec<(usize, usize)> {
        let w = &self.config.window;
        let max_size = w.max_size.min(len);
        let mut windows = Vec::new();
        if w.min_size == 0 || w.size_stride == 0 || w.offset_stride == 0 {
            return windows;
        }

        for size in (w.min_size..=max_size).step_by(w.size_stride) {
            let mut end = len;
            while end >= size {
                windows.push((end - size, end));
                if end < size + w.offset_stride {
                    break;
                }
                end -= w.offset_stride;
            }
        }
        windows
    }

    /// Score, threshold and trend-check one slice. None if it does not qualify.
    fn qualify(&self, candles: &[Candle], start: usize, end: usize) -> Option<Candidate> {
        let slice = &candles[start..end];
        if slice.len() < self.config.window.min_size {
            return None;
        }
        let scoring = &self.config.scoring;

        let (upper, lower) = quantile_bounds(slice, scoring.bound_quantile)?;
        let score = score_window(slice, upper, lower, scoring);
        if score.total < scoring.min_total_score {
            return None;
        }
        let trend_verdict = trend_filter::evaluate(slice, &self.config.trend)?;

        Some(Candidate {
            start,
            end,
            range: StructuralRange {
                upper_bound: upper,
                lower_bound: lower,
                center_price: (upper + lower) / 2.0,
                start_time: slice[0].open_time,
                end_time: slice[slice.len() - 1].open_time,
                candle_count: slice.len(),
                score,
                trend_verdict,
            },
        })
    }
}

impl DetectionStrategy for OverlapScoreDetector {
    fn name(&self) -> &'static str {
        "overlap-score"
    }

    fn detect(&self, candles: &[Candle]) -> Vec<StructuralRange> {
        if candles.len() < self.config.window.min_size {
            return Vec::new();
        }

        trace_time!("OverlapScoreDetector::detect", 5_000, {
            let interval_ms = infer_interval_ms(candles);
            let mut candidates = Vec::new();

            for (start, end) in self.trial_windows(candles.len()) {
                let Some(whole) = self.qualify(candles, start, end) else {
                    continue;
                };

                let segments = RangeGapFinder::analyze(&candles[start..end], &self.config.split, interval_ms);
                if segments.len() <= 1 {
                    candidates.push(whole);
                    continue;
                }

                // Each piece must qualify on its own.
                for seg in segments {
                    if let Some(piece) = self.qualify(candles, start + seg.start_idx, start + seg.end_idx) {
                        candidates.push(piece);
                    }
                }
            }

            let ranges = select_top(candidates, self.config.scoring.top_k);
            if DF.log_detection {
                log::info!(
                    "overlap-score: {} candles -> {} ranges",
                    candles.len(),
                    ranges.len()
                );
            }
            ranges
        })
    }
}

#[cfg(test)]
mod tests {
    use std::f64::consts::PI;

    use super::*;
    use crate::config::DETECTION;

    const MIN: i64 = 60_000;

    /// Mid price oscillates around 100; bars span [99.5, 100.5] overall.
    fn oscillating(n: usize) -> Vec<Candle> {
        let mid = |i: usize| 100.0 + 0.4 * (2.0 * PI * i as f64 / 8.0).sin();
        (0..n)
            .map(|i| {
                let open = if i == 0 { mid(0) } else { mid(i - 1) };
                let close = mid(i);
                Candle::new(
                    i as i64 * MIN,
                    MIN,
                    open,
                    open.max(close) + 0.1,
                    open.min(close) - 0.1,
                    close,
                    10.0,
                    true,
                )
            })
            .collect()
    }

    fn detector() -> OverlapScoreDetector {
        OverlapScoreDetector::new(DETECTION)
    }

    #[test]
    fn too_few_candles_yield_nothing() {
        assert!(detector().detect(&oscillating(19)).is_empty());
        assert!(detector().detect(&[]).is_empty());
    }

    #[test]
    fn trial_windows_are_anchored_at_latest_bar() {
        let windows = detector().trial_windows(30);
        assert!(windows.contains(&(10, 30)));
        assert!(windows.contains(&(0, 30)));
        assert!(windows.contains(&(5, 25)));
        assert!(windows.iter().all(|(s, e)| e - s >= 20 && *e <= 30));
    }

    #[test]
    fn oscillation_is_detected_with_tight_bounds() {
        let ranges = detector().detect(&oscillating(100));
        assert!(!ranges.is_empty());
        let best = &ranges[0];
        assert!(best.score.total >= 50.0);
        assert!((best.upper_bound - 100.5).abs() < 0.1, "upper {}", best.upper_bound);
        assert!((best.lower_bound - 99.5).abs() < 0.1, "lower {}", best.lower_bound);
        assert!(best.upper_bound > best.lower_bound);
    }

    #[test]
    fn results_are_sorted_capped_and_mostly_disjoint() {
        let ranges = detector().detect(&oscillating(150));
        assert!(ranges.len() <= DETECTION.scoring.top_k);
        for pair in ranges.windows(2) {
            assert!(pair[0].score.total >= pair[1].score.total);
        }
        for (i, a) in ranges.iter().enumerate() {
            for b in ranges.iter().skip(i + 1) {
                let shared = a.overlap_bars(b, MIN);
                assert!(shared * 2 <= a.candle_count && shared * 2 <= b.candle_count);
            }
        }
    }

    /// Two oscillating segments; the second is lifted by `lift` and starts
    /// `skipped` bars after the first one ends.
    fn two_segments(lift: f64, skipped: i64) -> (Vec<Candle>, i64) {
        let first = oscillating(60);
        let resume = (60 + skipped) * MIN;
        let second = first.iter().map(|c| {
            Candle::new(
                c.open_time + resume,
                MIN,
                c.open + lift,
                c.high + lift,
                c.low + lift,
                c.close + lift,
                c.volume,
                true,
            )
        });
        let mut candles = first.clone();
        candles.extend(second);
        (candles, resume)
    }

    fn assert_no_range_straddles(ranges: &[StructuralRange], resume: i64) {
        assert!(!ranges.is_empty());
        for r in ranges {
            assert!(
                r.end_time < resume || r.start_time >= resume,
                "range [{}, {}] straddles the gap at {}",
                r.start_time,
                r.end_time,
                resume
            );
        }
    }

    #[test]
    fn ranges_never_straddle_a_price_gap() {
        let (candles, resume) = two_segments(3.0, 0);
        let ranges = detector().detect(&candles);
        assert_no_range_straddles(&ranges, resume);
        // Bounds stay with one price level.
        for r in &ranges {
            assert!(r.upper_bound < 101.0 || r.lower_bound > 102.0, "{:?}", r);
        }
    }

    #[test]
    fn ranges_never_straddle_missing_bars() {
        let (candles, resume) = two_segments(0.0, 5);
        let ranges = detector().detect(&candles);
        assert_no_range_straddles(&ranges, resume);
        for r in &ranges {
            let span = (r.end_time - r.start_time) / MIN + 1;
            assert_eq!(span as usize, r.candle_count);
        }
    }

    #[test]
    fn steady_trend_is_not_a_range() {
        let candles: Vec<Candle> = (0..100)
            .map(|i| {
                let c = 100.0 * (1.0 + 0.003 * i as f64);
                Candle::new(i * MIN, MIN, c * 0.999, c * 1.001, c * 0.998, c, 10.0, true)
            })
            .collect();
        assert!(detector().detect(&candles).is_empty());
    }

    #[test]
    fn identical_prices_are_discarded() {
        let candles: Vec<Candle> = (0..60)
            .map(|i| Candle::new(i * MIN, MIN, 50.0, 50.0, 50.0, 50.0, 1.0, true))
            .collect();
        assert!(detector().detect(&candles).is_empty());
    }
}
