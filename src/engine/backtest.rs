//! Walk-forward replay over stored candles.
//!
//! Every bar is treated as if it had just closed on the live feed: detection
//! sees only the bars before it, confirmation runs in backtest mode (so the
//! persistence check uses the bars that really followed) and the same cooldown
//! gate filters the result. Single-threaded per symbol; callers parallelise
//! across symbols.

use crate::analysis::{BreakoutConfirmer, ConfirmMode, build_strategy};
use crate::config::SentinelSettings;
use crate::domain::Candle;
use crate::models::{BreakoutEvent, Direction};

use super::dedup::AlertDeduplicator;

#[derive(Debug, Clone, Default)]
pub struct BacktestReport {
    pub symbol: String,
    pub bars: usize,
    pub detection_passes: usize,
    /// Confirmed with follow-through, before the cooldown gate.
    pub signals: usize,
    /// Would have alerted live but the following bars fell back.
    pub failed_follow_through: usize,
    pub suppressed: usize,
    pub alerts: Vec<BreakoutEvent>,
}

impl BacktestReport {
    pub fn up_alerts(&self) -> usize {
        self.alerts
            .iter()
            .filter(|e| e.direction == Direction::Up)
            .count()
    }

    pub fn down_alerts(&self) -> usize {
        self.alerts.len() - self.up_alerts()
    }
}

/// `candles` must be finalized and time-ordered.
pub fn run_backtest(
    symbol: &str,
    candles: &[Candle],
    settings: &SentinelSettings,
    interval_ms: i64,
) -> BacktestReport {
    let detector = build_strategy(&settings.detection);
    let confirmer = BreakoutConfirmer::new(settings.breakout, interval_ms);
    let mut dedup = AlertDeduplicator::new(settings.alerts);
    let capacity = settings.detection.window.capacity;

    let mut report = BacktestReport {
        symbol: symbol.to_string(),
        bars: candles.len(),
        ..Default::default()
    };

    let start = settings.detection.window.min_size;
    for i in start..candles.len() {
        let history = &candles[i.saturating_sub(capacity)..i];
        let candle = &candles[i];
        let subsequent = &candles[i + 1..];

        let ranges = detector.detect(history);
        report.detection_passes += 1;

        let mut candidates: Vec<BreakoutEvent> = Vec::new();
        for range in &ranges {
            let backtest = confirmer.confirm(
                symbol,
                range,
                candle,
                history,
                ConfirmMode::Backtest { subsequent },
            );
            let Some(event) = backtest else {
                if confirmer
                    .confirm(symbol, range, candle, history, ConfirmMode::Live)
                    .is_some()
                {
                    report.failed_follow_through += 1;
                }
                continue;
            };
            if !candidates.iter().any(|e| e.direction == event.direction) {
                candidates.push(event);
            }
        }

        for event in candidates {
            report.signals += 1;
            if dedup.should_emit(&event) {
                dedup.record(&event);
                report.alerts.push(event);
            } else {
                report.suppressed += 1;
            }
        }
        dedup.maybe_sweep(candle.close_time);
    }

    log::info!(
        "Replay {}: {} bars, {} signals, {} alerts, {} suppressed, {} without follow-through",
        symbol,
        report.bars,
        report.signals,
        report.alerts.len(),
        report.suppressed,
        report.failed_follow_through
    );
    report
}
