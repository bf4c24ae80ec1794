//! Value objects shared between analysis, alerts and storage

use serde::{Deserialize, Serialize};

/// Percentage expressed in percent units (1.5 = 1.5%).
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct Pct(f64);

impl Pct {
    pub const fn new(val: f64) -> Self {
        Self(val)
    }

    #[inline]
    pub fn value(self) -> f64 {
        self.0
    }

    /// `part / whole * 100`, or None if `whole` is not positive.
    pub fn of(part: f64, whole: f64) -> Option<Self> {
        if whole > f64::EPSILON {
            Some(Self(part / whole * 100.0))
        } else {
            None
        }
    }
}

impl std::fmt::Display for Pct {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.2}%", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct VolRatio(f64);

impl VolRatio {
    pub const fn new(val: f64) -> Self {
        let v = if val < 0.0 { 0.0 } else { val };
        Self(v)
    }

    #[inline]
    pub fn value(self) -> f64 {
        self.0
    }

    /// Ratio between current and average volume.
    /// None when the baseline is empty or zero, since no ratio is meaningful then.
    pub fn calculate(current_vol: f64, avg_vol: f64) -> Option<Self> {
        if avg_vol > f64::EPSILON {
            Some(Self::new(current_vol / avg_vol))
        } else {
            None
        }
    }
}

impl std::fmt::Display for VolRatio {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.2}x", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vol_ratio_rejects_empty_baseline() {
        assert_eq!(VolRatio::calculate(10.0, 0.0), None);
        assert_eq!(VolRatio::calculate(20.0, 10.0), Some(VolRatio::new(2.0)));
        assert_eq!(VolRatio::new(-1.0).value(), 0.0);
    }

    #[test]
    fn pct_of_zero_whole_is_none() {
        assert_eq!(Pct::of(1.0, 0.0), None);
        assert_eq!(Pct::of(2.0, 100.0), Some(Pct::new(2.0)));
        assert_eq!(format!("{}", Pct::new(1.234)), "1.23%");
    }
}
