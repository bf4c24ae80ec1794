use crate::config::TrendFilterConfig;
use crate::domain::Candle;
use crate::models::TrendVerdict;
use crate::utils::linear_regression;

/// Regression statistics of a window's closes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct TrendStats {
    pub r_squared: f64,
    /// Signed first-to-last close change, in percent.
    pub change_pct: f64,
    /// Signed regression slope per bar, in percent of the mean close.
    pub slope_pct: f64,
}

pub(crate) fn trend_stats(candles: &[Candle]) -> Option<TrendStats> {
    let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
    let fit = linear_regression(&closes)?;

    let first = *closes.first()?;
    let last = *closes.last()?;
    let mean = closes.iter().sum::<f64>() / closes.len() as f64;
    if first <= 0.0 || mean <= 0.0 {
        return None;
    }

    Some(TrendStats {
        r_squared: fit.r_squared,
        change_pct: (last - first) / first * 100.0,
        slope_pct: fit.slope / mean * 100.0,
    })
}

/// None when the window is a trend (all three thresholds met), otherwise the
/// verdict stored on the range.
///
/// Windows that clear at least half of the R² and change thresholds are
/// labelled as mild trends in the slope's direction.
pub(crate) fn evaluate(candles: &[Candle], cfg: &TrendFilterConfig) -> Option<TrendVerdict> {
    let Some(stats) = trend_stats(candles) else {
        // Too short to fit a line, nothing to reject.
        return Some(TrendVerdict::Sideways);
    };

    let is_trend = stats.r_squared >= cfg.min_r_squared
        && stats.change_pct.abs() >= cfg.min_change_pct
        && stats.slope_pct.abs() >= cfg.min_slope_pct;
    if is_trend {
        return None;
    }

    let leaning = stats.r_squared >= cfg.min_r_squared / 2.0
        && stats.change_pct.abs() >= cfg.min_change_pct / 2.0;
    let verdict = match (leaning, stats.slope_pct > 0.0) {
        (false, _) => TrendVerdict::Sideways,
        (true, true) => TrendVerdict::MildUptrend,
        (true, false) => TrendVerdict::MildDowntrend,
    };
    Some(verdict)
}
