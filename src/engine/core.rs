//! Per-shard glue between the feed and the detection pipeline.
//!
//! Each shard owns one router and each router owns the state for its symbols,
//! so nothing here is shared or locked. Ticks are applied one at a time in
//! arrival order.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::mpsc;

use super::dedup::AlertDeduplicator;
use super::messages::PersistJob;
use super::publisher::AlertBus;
use super::state::SymbolState;
use crate::analysis::{BreakoutConfirmer, ConfirmMode, DetectionStrategy, build_strategy};
use crate::config::{DF, SentinelSettings};
use crate::data::parse_kline_message;
use crate::domain::{Candle, CandleWindow, LiveCandle, PairInterval, WindowUpdate};
use crate::models::{AlertRecord, BreakoutEvent, StructuralRange};

/// Counters for one router. Plain integers: the owning shard is the only writer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RouterStats {
    pub ticks: u64,
    pub malformed: u64,
    pub unknown_symbols: u64,
    pub finalized_bars: u64,
    pub detection_passes: u64,
    pub alerts_emitted: u64,
    pub alerts_suppressed: u64,
    pub persist_dropped: u64,
    pub handler_panics: u64,
}

impl std::ops::AddAssign for RouterStats {
    fn add_assign(&mut self, other: Self) {
        self.ticks += other.ticks;
        self.malformed += other.malformed;
        self.unknown_symbols += other.unknown_symbols;
        self.finalized_bars += other.finalized_bars;
        self.detection_passes += other.detection_passes;
        self.alerts_emitted += other.alerts_emitted;
        self.alerts_suppressed += other.alerts_suppressed;
        self.persist_dropped += other.persist_dropped;
        self.handler_panics += other.handler_panics;
    }
}

pub struct IngestionRouter {
    interval_ms: i64,
    symbols: HashMap<String, SymbolState>,
    detector: Arc<dyn DetectionStrategy>,
    confirmer: BreakoutConfirmer,
    dedup: AlertDeduplicator,
    persist_tx: Option<mpsc::Sender<PersistJob>>,
    bus: AlertBus,
    stats: RouterStats,
}

fn enqueue(tx: &Option<mpsc::Sender<PersistJob>>, stats: &mut RouterStats, job: PersistJob) {
    let Some(tx) = tx else {
        return;
    };
    if let Err(e) = tx.try_send(job) {
        stats.persist_dropped += 1;
        log::warn!("Persistence queue rejected job: {}", e);
    }
}

impl IngestionRouter {
    pub fn new(
        settings: &SentinelSettings,
        interval_ms: i64,
        bus: AlertBus,
        persist_tx: Option<mpsc::Sender<PersistJob>>,
    ) -> Self {
        Self {
            interval_ms,
            symbols: HashMap::new(),
            detector: build_strategy(&settings.detection),
            confirmer: BreakoutConfirmer::new(settings.breakout, interval_ms),
            dedup: AlertDeduplicator::new(settings.alerts),
            persist_tx,
            bus,
            stats: RouterStats::default(),
        }
    }

    /// Takes ownership of a symbol. Its window is usually the warmed one.
    pub fn insert_window(&mut self, pair: PairInterval, window: CandleWindow) {
        let symbol = pair.name().to_string();
        self.symbols.insert(symbol, SymbolState::new(pair, window));
    }

    pub fn symbols(&self) -> impl Iterator<Item = &str> {
        self.symbols.keys().map(String::as_str)
    }

    pub fn window(&self, symbol: &str) -> Option<&CandleWindow> {
        self.symbols.get(symbol).map(|s| &s.window)
    }

    /// Ranges cached by the last detection pass for `symbol`.
    pub fn ranges(&self, symbol: &str) -> &[StructuralRange] {
        self.symbols
            .get(symbol)
            .map(|s| s.ranges.as_slice())
            .unwrap_or(&[])
    }

    pub fn stats(&self) -> RouterStats {
        self.stats
    }

    pub fn dedup_mut(&mut self) -> &mut AlertDeduplicator {
        &mut self.dedup
    }

    pub fn record_panic(&mut self) {
        self.stats.handler_panics += 1;
    }

    /// Entry point for one raw feed message. Malformed payloads are counted and dropped.
    pub fn handle_text(&mut self, text: &str) -> Vec<BreakoutEvent> {
        self.stats.ticks += 1;
        match parse_kline_message(text) {
            Ok(live) => self.on_candle(live),
            Err(e) => {
                self.stats.malformed += 1;
                log::debug!("Dropped feed message: {}", e);
                Vec::new()
            }
        }
    }

    /// Applies a bar to its window. On a newly finalized bar runs
    /// detection, confirmation and dedup for that symbol and returns what was emitted.
    pub fn on_candle(&mut self, live: LiveCandle) -> Vec<BreakoutEvent> {
        let Some(state) = self.symbols.get_mut(&live.symbol) else {
            self.stats.unknown_symbols += 1;
            return Vec::new();
        };
        let candle = live.candle;

        // 1. Window
        if state.window.upsert(candle) == WindowUpdate::Stale {
            return Vec::new();
        }
        if DF.log_candle_update {
            log::info!(
                "[candle] {} {} close {:.6} final {}",
                live.symbol,
                candle.open_time,
                candle.close,
                candle.is_final
            );
        }
        if !candle.is_final || state.already_processed(candle.open_time) {
            return Vec::new();
        }
        self.stats.finalized_bars += 1;

        // 2. Persist, never blocking the feed
        enqueue(
            &self.persist_tx,
            &mut self.stats,
            PersistJob::Candles {
                pair: state.pair.clone(),
                candles: vec![candle],
            },
        );

        // 3. Detect on the bars that came before this one
        let history: Vec<Candle> = state
            .window
            .finalized()
            .into_iter()
            .filter(|c| c.open_time < candle.open_time)
            .collect();
        let ranges = self.detector.detect(&history);
        self.stats.detection_passes += 1;
        state.replace_ranges(candle.open_time, ranges);

        // 4. Confirm. Ranges are best first; one candidate per direction per bar.
        let mut candidates: Vec<BreakoutEvent> = Vec::new();
        for range in &state.ranges {
            let Some(event) =
                self.confirmer
                    .confirm(&live.symbol, range, &candle, &history, ConfirmMode::Live)
            else {
                continue;
            };
            if !candidates.iter().any(|e| e.direction == event.direction) {
                candidates.push(event);
            }
        }

        // 5. Dedup and emit
        let mut emitted = Vec::with_capacity(candidates.len());
        for event in candidates {
            if !self.dedup.should_emit(&event) {
                self.stats.alerts_suppressed += 1;
                continue;
            }
            self.dedup.record(&event);
            self.stats.alerts_emitted += 1;
            enqueue(
                &self.persist_tx,
                &mut self.stats,
                PersistJob::Alert(AlertRecord::from_event(&event, self.interval_ms)),
            );
            self.bus.publish(event.clone());
            emitted.push(event);
        }

        let swept = self.dedup.maybe_sweep(candle.close_time);
        if swept > 0 && DF.log_dedup {
            log::info!("Swept {} stale cooldowns", swept);
        }
        emitted
    }
}
