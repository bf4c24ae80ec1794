//! Sub-scores for a candidate consolidation window.
//!
//! Every function here is total: empty or degenerate input scores zero
//! instead of dividing by zero.

use statrs::statistics::{Data, OrderStatistics};

use crate::config::ScoringConfig;
use crate::domain::Candle;
use crate::models::RangeScore;

/// Upper bound from the `q` quantile of highs, lower bound from the `1 - q`
/// quantile of lows. Outlier wicks are ignored this way.
/// None when the band is empty, inverted or non-positive.
pub(crate) fn quantile_bounds(candles: &[Candle], q: f64) -> Option<(f64, f64)> {
    if candles.is_empty() {
        return None;
    }
    let mut highs = Data::new(candles.iter().map(|c| c.high).collect::<Vec<f64>>());
    let mut lows = Data::new(candles.iter().map(|c| c.low).collect::<Vec<f64>>());

    let upper = highs.quantile(q);
    let lower = lows.quantile(1.0 - q);

    if !upper.is_finite() || !lower.is_finite() || lower <= 0.0 || upper <= lower {
        return None;
    }
    Some((upper, lower))
}

/// 0-30. Mean intersection-over-union of consecutive bars' high/low spans.
pub(crate) fn overlap_score(candles: &[Candle]) -> f64 {
    if candles.len() < 2 {
        return 0.0;
    }
    let sum: f64 = candles
        .windows(2)
        .map(|pair| {
            let (a, b) = (&pair[0], &pair[1]);
            let inter = (a.high.min(b.high) - a.low.max(b.low)).max(0.0);
            let union = a.high.max(b.high) - a.low.min(b.low);
            // Two flat bars at the same price overlap completely.
            if union <= f64::EPSILON {
                if (a.high - b.high).abs() <= f64::EPSILON { 1.0 } else { 0.0 }
            } else {
                inter / union
            }
        })
        .sum();
    let mean = sum / (candles.len() - 1) as f64;
    RangeScore::OVERLAP_MAX * mean
}

/// Entries into the band around each bound.
///
/// A bar "touches" the upper bound when its high reaches `upper - tolerance`.
/// Consecutive touching bars count once: a new touch needs a bar outside the
/// band first.
pub(crate) fn count_touches(candles: &[Candle], upper: f64, lower: f64, tolerance: f64) -> (usize, usize) {
    let upper_band = upper - tolerance;
    let lower_band = lower + tolerance;

    let mut upper_touches = 0;
    let mut lower_touches = 0;
    let mut in_upper = false;
    let mut in_lower = false;

    for c in candles {
        let at_upper = c.high >= upper_band;
        let at_lower = c.low <= lower_band;

        if at_upper && !in_upper {
            upper_touches += 1;
        }
        if at_lower && !in_lower {
            lower_touches += 1;
        }
        in_upper = at_upper;
        in_lower = at_lower;
    }

    (upper_touches, lower_touches)
}

/// 0-25. Both sides count up to `cap` touches each.
pub(crate) fn touch_score(upper_touches: usize, lower_touches: usize, cap: usize) -> f64 {
    if cap == 0 {
        return 0.0;
    }
    let counted = upper_touches.min(cap) + lower_touches.min(cap);
    RangeScore::TOUCHES_MAX * counted as f64 / (2 * cap) as f64
}

/// 0-20. Linear in candle count up to `target`, flat afterwards.
pub(crate) fn duration_score(candle_count: usize, target: usize) -> f64 {
    if target == 0 {
        return RangeScore::DURATION_MAX;
    }
    RangeScore::DURATION_MAX * (candle_count as f64 / target as f64).min(1.0)
}

/// 0-15. Share of volume from bars that closed inside the bounds.
pub(crate) fn volume_score(candles: &[Candle], upper: f64, lower: f64) -> f64 {
    let total: f64 = candles.iter().map(|c| c.volume).sum();
    if total <= f64::EPSILON {
        return 0.0;
    }
    let inside: f64 = candles
        .iter()
        .filter(|c| c.close >= lower && c.close <= upper)
        .map(|c| c.volume)
        .sum();
    RangeScore::VOLUME_MAX * (inside / total)
}

/// 0-10. Full marks when both bounds were tested equally often.
pub(crate) fn shape_score(upper_touches: usize, lower_touches: usize) -> f64 {
    let hi = upper_touches.max(lower_touches);
    if hi == 0 {
        return 0.0;
    }
    let lo = upper_touches.min(lower_touches);
    RangeScore::SHAPE_MAX * lo as f64 / hi as f64
}

/// All five sub-scores for `candles` against the given bounds.
pub(crate) fn score_window(candles: &[Candle], upper: f64, lower: f64, cfg: &ScoringConfig) -> RangeScore {
    let tolerance = (upper - lower) * cfg.touch_tolerance_pct;
    let (ut, lt) = count_touches(candles, upper, lower, tolerance);

    RangeScore::from_parts(
        overlap_score(candles),
        touch_score(ut, lt, cfg.touch_cap_per_side),
        duration_score(candles.len(), cfg.duration_target),
        volume_score(candles, upper, lower),
        shape_score(ut, lt),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DETECTION;

    const MIN: i64 = 60_000;

    fn bar(i: i64, high: f64, low: f64, close: f64, volume: f64) -> Candle {
        Candle::new(i * MIN, MIN, close, high, low, close, volume, true)
    }

    #[test]
    fn identical_bars_overlap_fully() {
        let candles: Vec<Candle> = (0..5).map(|i| bar(i, 101.0, 99.0, 100.0, 1.0)).collect();
        assert!((overlap_score(&candles) - 30.0).abs() < 1e-9);
    }

    #[test]
    fn disjoint_bars_do_not_overlap() {
        let candles: Vec<Candle> = (0..5)
            .map(|i| {
                let base = 100.0 + i as f64 * 10.0;
                bar(i, base + 1.0, base, base + 0.5, 1.0)
            })
            .collect();
        assert_eq!(overlap_score(&candles), 0.0);
    }

    #[test]
    fn touches_use_hysteresis() {
        // Highs: in, in, out, in, out, in -> three separate touches.
        let highs = [110.0, 110.0, 105.0, 110.0, 105.0, 110.0];
        let candles: Vec<Candle> = highs
            .iter()
            .enumerate()
            .map(|(i, &h)| bar(i as i64, h, 104.0, 105.0, 1.0))
            .collect();
        let (ut, lt) = count_touches(&candles, 110.0, 100.0, 1.0);
        assert_eq!(ut, 3);
        assert_eq!(lt, 0);
    }

    #[test]
    fn touch_and_shape_scores_cap() {
        assert_eq!(touch_score(10, 10, 3), 25.0);
        assert!((touch_score(3, 0, 3) - 12.5).abs() < 1e-9);
        assert_eq!(shape_score(4, 4), 10.0);
        assert_eq!(shape_score(4, 0), 0.0);
        assert_eq!(shape_score(0, 0), 0.0);
    }

    #[test]
    fn duration_saturates() {
        assert_eq!(duration_score(30, 60), 10.0);
        assert_eq!(duration_score(120, 60), 20.0);
    }

    #[test]
    fn volume_share_inside_bounds() {
        let candles = vec![
            bar(0, 101.0, 99.0, 100.0, 3.0),
            bar(1, 106.0, 99.0, 105.0, 1.0),
        ];
        assert!((volume_score(&candles, 101.0, 99.0) - 15.0 * 0.75).abs() < 1e-9);
        let silent = vec![bar(0, 101.0, 99.0, 100.0, 0.0)];
        assert_eq!(volume_score(&silent, 101.0, 99.0), 0.0);
    }

    #[test]
    fn flat_prices_have_no_bounds() {
        let candles: Vec<Candle> = (0..30).map(|i| bar(i, 100.0, 100.0, 100.0, 1.0)).collect();
        assert_eq!(quantile_bounds(&candles, 0.95), None);
        assert_eq!(quantile_bounds(&[], 0.95), None);
    }

    #[test]
    fn window_total_stays_within_limits() {
        let candles: Vec<Candle> = (0..40)
            .map(|i| {
                let close = 100.0 + if i % 2 == 0 { 0.5 } else { -0.5 };
                bar(i, close + 0.2, close - 0.2, close, 1.0 + (i % 3) as f64)
            })
            .collect();
        let (upper, lower) = quantile_bounds(&candles, 0.95).unwrap();
        let score = score_window(&candles, upper, lower, &DETECTION.scoring);
        assert!(score.total >= 0.0 && score.total <= 100.0);
        assert!(score.touches > 0.0);
    }
}
