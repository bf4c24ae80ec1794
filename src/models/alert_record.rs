use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{BreakoutEvent, Direction};

/// Flat, storable form of an emitted alert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRecord {
    pub alert_id: String,
    pub symbol: String,
    pub interval_ms: i64,
    pub direction: Direction,
    pub breakout_price: f64,
    pub upper_bound: f64,
    pub lower_bound: f64,
    pub center_price: f64,
    pub magnitude_pct: f64,
    pub volume_ratio: f64,
    pub range_start_time: i64,
    pub range_end_time: i64,
    pub candle_count: i64,
    pub score_total: f64,
    pub detected_at: i64,
}

impl AlertRecord {
    pub fn from_event(event: &BreakoutEvent, interval_ms: i64) -> Self {
        Self {
            alert_id: Uuid::new_v4().to_string(),
            symbol: event.symbol.clone(),
            interval_ms,
            direction: event.direction,
            breakout_price: event.breakout_price,
            upper_bound: event.range.upper_bound,
            lower_bound: event.range.lower_bound,
            center_price: event.range.center_price,
            magnitude_pct: event.magnitude_pct.value(),
            volume_ratio: event.volume_ratio.value(),
            range_start_time: event.range.start_time,
            range_end_time: event.range.end_time,
            candle_count: event.range.candle_count as i64,
            score_total: event.range.score.total,
            detected_at: event.detected_at,
        }
    }

    /// Range width in percent of center, matching `StructuralRange::width_pct`.
    pub fn width_pct(&self) -> f64 {
        if self.center_price > 0.0 {
            (self.upper_bound - self.lower_bound) / self.center_price * 100.0
        } else {
            f64::INFINITY
        }
    }
}
