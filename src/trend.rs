//! Trend bucketing for price series.
//!
//! Fits a least-squares line to close price against sample index and turns
//! the slope into an angle in degrees. Symbols are grouped by comparing that
//! angle against symmetric thresholds; the thresholds are configuration, not
//! behavior.

use crate::quotes::PriceSeries;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TrendGroup {
    Ascending,
    Descending,
    Neutral,
}

impl TrendGroup {
    pub fn label(&self) -> &'static str {
        match self {
            TrendGroup::Ascending => "Ascending",
            TrendGroup::Descending => "Descending",
            TrendGroup::Neutral => "Neutral",
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct TrendThresholds {
    /// Angle band (degrees) counted as a trend: `low_deg <= |angle| <= high_deg`.
    pub low_deg: f64,
    pub high_deg: f64,
    /// Series shorter than this get no angle at all.
    pub min_samples: usize,
}

impl Default for TrendThresholds {
    fn default() -> Self {
        TrendThresholds {
            low_deg: 35.0,
            high_deg: 55.0,
            min_samples: 2,
        }
    }
}

/// Classify a series. Empty or too-short input is Neutral with no angle; a
/// flat series has slope 0 and lands in Neutral without any numeric fuss.
pub fn classify(series: &PriceSeries, thresholds: &TrendThresholds) -> (TrendGroup, Option<f64>) {
    let min = thresholds.min_samples.max(2);
    if series.len() < min {
        return (TrendGroup::Neutral, None);
    }

    let slope = ols_slope(&series.closes());
    let angle = slope.atan().to_degrees();

    let group = if angle >= thresholds.low_deg && angle <= thresholds.high_deg {
        TrendGroup::Ascending
    } else if angle <= -thresholds.low_deg && angle >= -thresholds.high_deg {
        TrendGroup::Descending
    } else {
        TrendGroup::Neutral
    };
    (group, Some(angle))
}

/// Ordinary least squares slope of y against x = 0..n-1.
fn ols_slope(ys: &[f64]) -> f64 {
    let n = ys.len() as f64;
    let mean_x = (n - 1.0) / 2.0;
    let mean_y = ys.iter().sum::<f64>() / n;

    let mut num = 0.0;
    let mut den = 0.0;
    for (i, y) in ys.iter().enumerate() {
        let dx = i as f64 - mean_x;
        num += dx * (y - mean_y);
        den += dx * dx;
    }
    if den == 0.0 { 0.0 } else { num / den }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quotes::{PricePoint, ist};
    use chrono::TimeZone;

    fn series(closes: &[f64]) -> PriceSeries {
        let tz = ist();
        PriceSeries::new(
            closes
                .iter()
                .enumerate()
                .map(|(i, &close)| PricePoint {
                    ts: tz.timestamp_opt(60 * i as i64, 0).unwrap(),
                    close,
                })
                .collect(),
        )
    }

    #[test]
    fn empty_series_is_neutral_with_no_angle() {
        let (group, angle) = classify(&PriceSeries::empty(), &TrendThresholds::default());
        assert_eq!(group, TrendGroup::Neutral);
        assert!(angle.is_none());
    }

    #[test]
    fn flat_series_is_neutral_near_zero_degrees() {
        let (group, angle) = classify(&series(&[250.0; 20]), &TrendThresholds::default());
        assert_eq!(group, TrendGroup::Neutral);
        assert!(angle.unwrap().abs() < 1e-9);
    }

    #[test]
    fn unit_slope_is_forty_five_degrees_ascending() {
        let (group, angle) = classify(&series(&[100.0, 101.0, 102.0]), &TrendThresholds::default());
        assert_eq!(group, TrendGroup::Ascending);
        assert!((angle.unwrap() - 45.0).abs() < 1e-9);
    }

    #[test]
    fn unit_downslope_is_descending() {
        let (group, angle) = classify(&series(&[102.0, 101.0, 100.0]), &TrendThresholds::default());
        assert_eq!(group, TrendGroup::Descending);
        assert!((angle.unwrap() + 45.0).abs() < 1e-9);
    }

    #[test]
    fn angle_outside_the_band_is_neutral() {
        // Slope 40 is ~88.6 degrees, above the high threshold.
        let (group, _) = classify(&series(&[0.0, 40.0, 80.0]), &TrendThresholds::default());
        assert_eq!(group, TrendGroup::Neutral);

        // Slope 0.1 is ~5.7 degrees, below the low threshold.
        let (group, _) = classify(&series(&[10.0, 10.1, 10.2]), &TrendThresholds::default());
        assert_eq!(group, TrendGroup::Neutral);
    }

    #[test]
    fn classification_is_deterministic() {
        let data = series(&[10.0, 11.5, 10.8, 12.2, 13.0]);
        let thresholds = TrendThresholds::default();
        let first = classify(&data, &thresholds);
        let second = classify(&data, &thresholds);
        assert_eq!(first.0, second.0);
        assert_eq!(first.1, second.1);
    }
}
