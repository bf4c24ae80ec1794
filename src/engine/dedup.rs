//! Cooldown gate in front of alert emission.
//!
//! An alert for the same (symbol, direction[, price bucket]) inside the cooldown
//! window is suppressed unless it is strictly more extreme than the alert that
//! started the cooldown. Time is taken from the events themselves so the gate
//! behaves the same live and in replay.

use std::collections::HashMap;

use crate::config::{AlertConfig, DF, OverrideMetric};
use crate::models::{AlertRecord, BreakoutEvent, Direction};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CooldownKey {
    pub symbol: String,
    pub direction: Direction,
    pub bucket: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CooldownEntry {
    pub last_emit_ms: i64,
    /// Larger is more extreme, whatever the override metric.
    pub extremity: f64,
}

#[derive(Debug)]
pub struct AlertDeduplicator {
    config: AlertConfig,
    entries: HashMap<CooldownKey, CooldownEntry>,
    last_sweep_ms: Option<i64>,
}

impl AlertDeduplicator {
    pub fn new(config: AlertConfig) -> Self {
        Self {
            config,
            entries: HashMap::new(),
            last_sweep_ms: None,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Log-scale bucket so that a 1% step means the same at any price level.
    fn bucket(&self, price: f64) -> Option<i64> {
        let pct = self.config.price_bucket_pct?;
        if pct <= 0.0 || price <= 0.0 {
            return None;
        }
        Some((price.ln() / (1.0 + pct).ln()).floor() as i64)
    }

    fn key(&self, symbol: &str, direction: Direction, price: f64) -> CooldownKey {
        CooldownKey {
            symbol: symbol.to_string(),
            direction,
            bucket: self.bucket(price),
        }
    }

    fn extremity(metric: OverrideMetric, magnitude_pct: f64, width_pct: f64) -> f64 {
        match metric {
            OverrideMetric::Magnitude => magnitude_pct,
            // Tighter range is more extreme.
            OverrideMetric::RangeTightness => -width_pct,
        }
    }

    fn event_extremity(&self, event: &BreakoutEvent) -> f64 {
        Self::extremity(
            self.config.override_metric,
            event.magnitude_pct.value(),
            event.range.width_pct(),
        )
    }

    pub fn should_emit(&self, event: &BreakoutEvent) -> bool {
        let key = self.key(&event.symbol, event.direction, event.breakout_price);
        let Some(entry) = self.entries.get(&key) else {
            return true;
        };

        if event.detected_at - entry.last_emit_ms >= self.config.cooldown_ms {
            return true;
        }

        let extremity = self.event_extremity(event);
        let overrides = extremity > entry.extremity;
        if DF.log_dedup {
            log::info!(
                "dedup {} {}: in cooldown, extremity {:.4} vs {:.4} -> {}",
                event.symbol,
                event.direction,
                extremity,
                entry.extremity,
                if overrides { "override" } else { "suppress" }
            );
        }
        overrides
    }

    /// Starts (or refreshes) the cooldown with this event's time and extremity.
    pub fn record(&mut self, event: &BreakoutEvent) {
        let key = self.key(&event.symbol, event.direction, event.breakout_price);
        let entry = CooldownEntry {
            last_emit_ms: event.detected_at,
            extremity: self.event_extremity(event),
        };
        self.entries.insert(key, entry);
    }

    /// Restores a cooldown from a stored alert, e.g. after a restart.
    pub fn seed(&mut self, record: &AlertRecord) {
        let key = self.key(&record.symbol, record.direction, record.breakout_price);
        let extremity = Self::extremity(
            self.config.override_metric,
            record.magnitude_pct,
            record.width_pct(),
        );
        let entry = CooldownEntry {
            last_emit_ms: record.detected_at,
            extremity,
        };
        match self.entries.get(&key) {
            Some(existing) if existing.last_emit_ms >= entry.last_emit_ms => {}
            _ => {
                self.entries.insert(key, entry);
            }
        }
    }

    /// Drops entries older than `stale_factor` cooldowns. Returns how many went.
    pub fn sweep(&mut self, now_ms: i64) -> usize {
        let max_age = self.config.cooldown_ms * self.config.stale_factor;
        let before = self.entries.len();
        self.entries.retain(|_, e| now_ms - e.last_emit_ms < max_age);
        self.last_sweep_ms = Some(now_ms);
        before - self.entries.len()
    }

    /// Sweeps at most once per `sweep_interval_ms`.
    pub fn maybe_sweep(&mut self, now_ms: i64) -> usize {
        match self.last_sweep_ms {
            Some(last) if now_ms - last < self.config.sweep_interval_ms => 0,
            Some(_) => self.sweep(now_ms),
            None => {
                self.last_sweep_ms = Some(now_ms);
                0
            }
        }
    }
}
