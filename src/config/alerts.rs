//! Alert cooldown and fan-out configuration

use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

use crate::utils::TimeUtils;

/// Which value decides whether a new alert beats the one holding the cooldown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, Default)]
pub enum OverrideMetric {
    /// Larger move past the bound wins.
    #[default]
    Magnitude,
    /// Narrower consolidation (width as % of center) wins.
    RangeTightness,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertConfig {
    pub cooldown_ms: i64,
    pub sweep_interval_ms: i64,
    /// Entries older than `cooldown_ms * stale_factor` are swept.
    pub stale_factor: i64,
    /// Optional log-scale price bucket size (e.g. 0.01 = 1%) added to the cooldown key.
    pub price_bucket_pct: Option<f64>,
    pub override_metric: OverrideMetric,
    /// Broadcast buffer per subscriber before lagging receivers drop alerts.
    pub bus_capacity: usize,
}

impl Default for AlertConfig {
    fn default() -> Self {
        ALERTS
    }
}

pub const ALERTS: AlertConfig = AlertConfig {
    cooldown_ms: TimeUtils::MS_IN_30_MIN,
    sweep_interval_ms: TimeUtils::MS_IN_5_MIN,
    stale_factor: 2,
    price_bucket_pct: None,
    override_metric: OverrideMetric::Magnitude,
    bus_capacity: 1024,
};
