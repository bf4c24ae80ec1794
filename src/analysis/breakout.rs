//! Decides whether a finalized candle broke out of a structural range.

use crate::config::{AmplitudeRule, BreakoutConfig, Pct, VolRatio};
use crate::domain::Candle;
use crate::models::{BreakoutEvent, Confirmations, Direction, StructuralRange};
use crate::utils::average_true_range;

/// How the persistence check is evaluated.
#[derive(Debug, Clone, Copy)]
pub enum ConfirmMode<'a> {
    /// Streaming: later bars do not exist yet, so persistence counts as held.
    Live,
    /// Offline: the bars that followed the candle are known and must keep
    /// closing beyond the bound.
    Backtest { subsequent: &'a [Candle] },
}

pub struct BreakoutConfirmer {
    config: BreakoutConfig,
    interval_ms: i64,
}

impl BreakoutConfirmer {
    pub fn new(config: BreakoutConfig, interval_ms: i64) -> Self {
        Self {
            config,
            interval_ms,
        }
    }

    /// `recent` are the finalized bars before `candle`, oldest first.
    /// Returns None unless every check for `mode` passes.
    pub fn confirm(
        &self,
        symbol: &str,
        range: &StructuralRange,
        candle: &Candle,
        recent: &[Candle],
        mode: ConfirmMode<'_>,
    ) -> Option<BreakoutEvent> {
        // 1. Recency: only fresh ranges can be broken
        if self.interval_ms <= 0 || candle.open_time <= range.end_time {
            return None;
        }
        if candle.open_time - range.end_time > self.config.recency_bars * self.interval_ms {
            return None;
        }

        // 2. Side and body: close beyond a bound with a body pointing the same way
        let (direction, bound, distance) = if candle.close > range.upper_bound {
            (Direction::Up, range.upper_bound, candle.close - range.upper_bound)
        } else if candle.close < range.lower_bound {
            (Direction::Down, range.lower_bound, range.lower_bound - candle.close)
        } else {
            return None;
        };
        let body_ok = match direction {
            Direction::Up => candle.is_bullish(),
            Direction::Down => candle.is_bearish(),
        };
        if !body_ok || !self.config.directions.allows(direction) {
            return None;
        }

        // 3. Amplitude
        let amplitude = self.amplitude_ok(distance, range, recent)?;

        // 4. Volume against the recent baseline
        let volume_ratio = self.volume_ratio(candle, recent)?;
        let volume = volume_ratio.value() >= self.config.volume_profile.multiplier();

        // 5. Persistence
        let persistence = match mode {
            ConfirmMode::Live => true,
            ConfirmMode::Backtest { subsequent } => self.persisted(direction, bound, subsequent),
        };

        if !(amplitude && volume && persistence) {
            return None;
        }

        Some(BreakoutEvent {
            symbol: symbol.to_string(),
            direction,
            breakout_price: candle.close,
            magnitude_pct: Pct::of(distance, bound)?,
            volume_ratio,
            range: range.clone(),
            confirmed: Confirmations {
                amplitude,
                volume,
                persistence,
            },
            candle_open_time: candle.open_time,
            detected_at: candle.close_time,
        })
    }

    /// None when the ATR variant has too little history to judge.
    fn amplitude_ok(&self, distance: f64, range: &StructuralRange, recent: &[Candle]) -> Option<bool> {
        match self.config.amplitude {
            AmplitudeRule::RangeRatio(ratio) => {
                let width = range.width();
                if width <= 0.0 {
                    return None;
                }
                Some(distance / width >= ratio)
            }
            AmplitudeRule::AtrMultiple { multiple, period } => {
                let atr = average_true_range(recent, period)?;
                if atr <= 0.0 {
                    return None;
                }
                Some(distance / atr >= multiple)
            }
        }
    }

    fn volume_ratio(&self, candle: &Candle, recent: &[Candle]) -> Option<VolRatio> {
        let lookback = self.config.volume_lookback.min(recent.len());
        if lookback == 0 {
            return None;
        }
        let tail = &recent[recent.len() - lookback..];
        let avg = tail.iter().map(|c| c.volume).sum::<f64>() / lookback as f64;
        VolRatio::calculate(candle.volume, avg)
    }

    fn persisted(&self, direction: Direction, bound: f64, subsequent: &[Candle]) -> bool {
        let needed = self.config.persistence_bars;
        if subsequent.len() < needed {
            return false;
        }
        subsequent[..needed].iter().all(|c| match direction {
            Direction::Up => c.close > bound,
            Direction::Down => c.close < bound,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ATR_AMPLITUDE, BREAKOUT, DirectionFilter};
    use crate::models::{RangeScore, TrendVerdict};

    const MIN: i64 = 60_000;

    fn range() -> StructuralRange {
        StructuralRange {
            upper_bound: 100.5,
            lower_bound: 99.5,
            center_price: 100.0,
            start_time: 0,
            end_time: 99 * MIN,
            candle_count: 100,
            score: RangeScore::from_parts(20.0, 25.0, 20.0, 15.0, 10.0),
            trend_verdict: TrendVerdict::Sideways,
        }
    }

    fn history() -> Vec<Candle> {
        (0..100)
            .map(|i| Candle::new(i * MIN, MIN, 100.0, 100.4, 99.6, 100.1, 10.0, true))
            .collect()
    }

    fn bar(bar_idx: i64, open: f64, close: f64, volume: f64) -> Candle {
        Candle::new(
            bar_idx * MIN,
            MIN,
            open,
            open.max(close) + 0.1,
            open.min(close) - 0.1,
            close,
            volume,
            true,
        )
    }

    fn confirmer() -> BreakoutConfirmer {
        BreakoutConfirmer::new(BREAKOUT, MIN)
    }

    #[test]
    fn strong_bullish_close_confirms_up() {
        let c = bar(100, 100.3, 102.0, 20.0);
        let event = confirmer()
            .confirm("BTCUSDT", &range(), &c, &history(), ConfirmMode::Live)
            .unwrap();
        assert_eq!(event.direction, Direction::Up);
        assert!(event.confirmed.amplitude && event.confirmed.volume && event.confirmed.persistence);
        assert!((event.volume_ratio.value() - 2.0).abs() < 1e-9);
        assert!((event.magnitude_pct.value() - 1.5 / 100.5 * 100.0).abs() < 1e-9);
        assert_eq!(event.detected_at, 101 * MIN - 1);
    }

    #[test]
    fn weak_volume_is_rejected() {
        let result = confirmer().confirm(
            "BTCUSDT",
            &range(),
            &bar(100, 100.3, 102.0, 11.0),
            &history(),
            ConfirmMode::Live,
        );
        assert!(result.is_none());
    }

    #[test]
    fn body_must_point_the_breakout_way() {
        // Closes above the range but below its own open.
        let c = bar(100, 103.0, 102.0, 30.0);
        assert!(confirmer().confirm("X", &range(), &c, &history(), ConfirmMode::Live).is_none());

        let down = bar(100, 99.6, 98.0, 30.0);
        let event = confirmer().confirm("X", &range(), &down, &history(), ConfirmMode::Live).unwrap();
        assert_eq!(event.direction, Direction::Down);
    }

    #[test]
    fn small_amplitude_is_rejected() {
        // 0.2 past the bound on a width of 1.0 is below the 0.3 ratio.
        let c = bar(100, 100.3, 100.7, 30.0);
        assert!(confirmer().confirm("X", &range(), &c, &history(), ConfirmMode::Live).is_none());
    }

    #[test]
    fn stale_range_is_skipped() {
        let c = bar(102, 100.3, 102.0, 30.0);
        assert!(confirmer().confirm("X", &range(), &c, &history(), ConfirmMode::Live).is_some());
        let c = bar(103, 100.3, 102.0, 30.0);
        assert!(confirmer().confirm("X", &range(), &c, &history(), ConfirmMode::Live).is_none());
    }

    #[test]
    fn recency_counts_partial_bars() {
        let at = |open_time: i64| {
            Candle::new(open_time, MIN, 100.3, 102.1, 100.2, 102.0, 30.0, true)
        };
        let end = range().end_time;
        let confirm = |c: Candle| confirmer().confirm("X", &range(), &c, &history(), ConfirmMode::Live);
        assert!(confirm(at(end + 3 * MIN)).is_some());
        assert!(confirm(at(end + 3 * MIN + 1)).is_none());
        assert!(confirm(at(end + 4 * MIN - 1)).is_none());
    }

    #[test]
    fn empty_history_yields_none() {
        let c = bar(100, 100.3, 102.0, 30.0);
        assert!(confirmer().confirm("X", &range(), &c, &[], ConfirmMode::Live).is_none());
    }

    #[test]
    fn disabled_direction_is_filtered() {
        let cfg = BreakoutConfig {
            directions: DirectionFilter { up: false, down: true },
            ..BREAKOUT
        };
        let c = bar(100, 100.3, 102.0, 30.0);
        let confirmer = BreakoutConfirmer::new(cfg, MIN);
        assert!(confirmer.confirm("X", &range(), &c, &history(), ConfirmMode::Live).is_none());
    }

    #[test]
    fn backtest_requires_follow_through() {
        let c = bar(100, 100.3, 102.0, 30.0);
        let held = vec![bar(101, 102.0, 101.5, 10.0), bar(102, 101.5, 101.0, 10.0)];
        let failed = vec![bar(101, 102.0, 101.0, 10.0), bar(102, 101.0, 100.2, 10.0)];

        let confirm = |subsequent: &[Candle]| {
            confirmer().confirm("X", &range(), &c, &history(), ConfirmMode::Backtest { subsequent })
        };

        assert!(confirm(&held).unwrap().confirmed.persistence);
        assert!(confirm(&failed).is_none());

        let short = confirm(&held[..1]);
        assert!(short.is_none());
    }

    #[test]
    fn atr_variant_measures_in_atrs() {
        let cfg = BreakoutConfig {
            amplitude: ATR_AMPLITUDE,
            ..BREAKOUT
        };
        let confirmer = BreakoutConfirmer::new(cfg, MIN);
        // History ATR is 0.8; 1.5 past the bound clears one ATR.
        let c = bar(100, 100.3, 102.0, 30.0);
        assert!(confirmer.confirm("X", &range(), &c, &history(), ConfirmMode::Live).is_some());
        // 0.6 past the bound does not.
        let c = bar(100, 100.3, 101.1, 30.0);
        assert!(confirmer.confirm("X", &range(), &c, &history(), ConfirmMode::Live).is_none());
    }
}
