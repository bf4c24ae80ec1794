//! Runtime settings: the const blueprints, optionally overridden by a JSON file.

use std::path::Path;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

use super::{
    AlertConfig, BackfillConfig, BreakoutConfig, DetectionConfig, PERSISTENCE, QueueConfig,
    WsConfig,
};
use crate::utils::TimeUtils;

pub const DEFAULT_INTERVAL: &str = "1m";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SentinelSettings {
    /// Binance interval shorthand, e.g. "1m", "15m".
    pub interval: String,
    pub db_path: String,
    pub detection: DetectionConfig,
    pub breakout: BreakoutConfig,
    pub alerts: AlertConfig,
    pub ws: WsConfig,
    pub queue: QueueConfig,
    pub backfill: BackfillConfig,
}

impl Default for SentinelSettings {
    fn default() -> Self {
        Self {
            interval: DEFAULT_INTERVAL.to_string(),
            db_path: PERSISTENCE.database.path.to_string(),
            detection: DetectionConfig::default(),
            breakout: BreakoutConfig::default(),
            alerts: AlertConfig::default(),
            ws: WsConfig::default(),
            queue: QueueConfig::default(),
            backfill: BackfillConfig::default(),
        }
    }
}

impl SentinelSettings {
    /// Fields missing from the file keep their blueprint values.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings file {}", path.display()))?;
        let settings: Self = serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse settings file {}", path.display()))?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn interval_ms(&self) -> Result<i64> {
        TimeUtils::interval_from_str(&self.interval)
            .with_context(|| format!("Unsupported interval '{}'", self.interval))
    }

    pub fn validate(&self) -> Result<()> {
        self.interval_ms()?;
        let w = &self.detection.window;
        if w.min_size < 2 || w.min_size > w.max_size {
            bail!(
                "window sizes must satisfy 2 <= min ({}) <= max ({})",
                w.min_size,
                w.max_size
            );
        }
        if w.size_stride == 0 || w.offset_stride == 0 {
            bail!("window strides must be positive");
        }
        if w.capacity < w.min_size {
            bail!(
                "window capacity {} is smaller than the minimum window {}",
                w.capacity,
                w.min_size
            );
        }
        if !(0.5..=1.0).contains(&self.detection.scoring.bound_quantile) {
            bail!("bound quantile must be within [0.5, 1.0]");
        }
        if self.ws.max_streams_per_connection == 0 {
            bail!("max_streams_per_connection must be positive");
        }
        if !self.breakout.directions.up && !self.breakout.directions.down {
            bail!("at least one breakout direction must be enabled");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{OverrideMetric, StrategyKind, VolumeProfile};

    #[test]
    fn defaults_follow_blueprints() {
        let s = SentinelSettings::default();
        assert_eq!(s.interval_ms().unwrap(), TimeUtils::MS_IN_MIN);
        assert_eq!(s.detection.window.capacity, 150);
        assert_eq!(s.detection.scoring.top_k, 3);
        assert_eq!(s.breakout.volume_profile, VolumeProfile::Sensitive);
        assert_eq!(s.alerts.cooldown_ms, 30 * TimeUtils::MS_IN_MIN);
        assert_eq!(s.ws.max_streams_per_connection, 200);
        assert!(s.validate().is_ok());
    }

    #[test]
    fn partial_json_overrides_only_named_fields() {
        let json = r#"{
            "interval": "15m",
            "detection": { "strategy": "TightRange", "scoring": { "top_k": 5 } },
            "alerts": { "override_metric": "RangeTightness", "price_bucket_pct": 0.01 }
        }"#;
        let s: SentinelSettings = serde_json::from_str(json).unwrap();
        assert_eq!(s.interval_ms().unwrap(), TimeUtils::MS_IN_15_MIN);
        assert_eq!(s.detection.strategy, StrategyKind::TightRange);
        assert_eq!(s.detection.scoring.top_k, 5);
        assert_eq!(s.detection.scoring.min_total_score, 50.0);
        assert_eq!(s.detection.window.min_size, 20);
        assert_eq!(s.alerts.override_metric, OverrideMetric::RangeTightness);
        assert_eq!(s.alerts.price_bucket_pct, Some(0.01));
        assert_eq!(s.ws.reconnect_delay_sec, 5);
    }

    #[test]
    fn validation_rejects_bad_geometry() {
        let mut s = SentinelSettings::default();
        s.detection.window.min_size = 90;
        assert!(s.validate().is_err());

        let mut s = SentinelSettings::default();
        s.interval = "7m".into();
        assert!(s.validate().is_err());

        let mut s = SentinelSettings::default();
        s.breakout.directions.up = false;
        s.breakout.directions.down = false;
        assert!(s.validate().is_err());
    }
}
