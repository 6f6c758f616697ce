//! Aggregation thresholds

use drivescore_common::{DrivescoreError, Result, FIRST_SAMPLE_FALLBACK_SECS, HARSH_THRESHOLD_MS2, MS2_TO_MPHS};
use serde::{Deserialize, Serialize};

/// Thresholds used by the trip aggregator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureConfig {
    /// Gap assigned to the first sample of a trip (seconds)
    pub first_sample_secs: f64,
    /// Harsh-event threshold (m/s²)
    pub harsh_threshold_ms2: f64,
    /// Conversion from m/s² to the acceleration unit of the samples (mph/s)
    pub accel_unit_factor: f64,
    /// Speeds strictly below this count as idling when the engine runs (mph)
    pub idle_speed_mph: f64,
    /// First night hour, inclusive
    pub night_start_hour: u32,
    /// First hour after the night, exclusive
    pub night_end_hour: u32,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            first_sample_secs: FIRST_SAMPLE_FALLBACK_SECS,
            harsh_threshold_ms2: HARSH_THRESHOLD_MS2,
            accel_unit_factor: MS2_TO_MPHS,
            idle_speed_mph: 5.0,
            night_start_hour: 22,
            night_end_hour: 5,
        }
    }
}

impl FeatureConfig {
    /// Harsh threshold in the sample acceleration unit
    pub fn harsh_threshold(&self) -> f64 {
        self.harsh_threshold_ms2 * self.accel_unit_factor
    }

    /// Whether a local hour falls in the night window.
    ///
    /// The window wraps midnight when start > end (22..5 covers 22, 23, 0..4).
    pub fn is_night_hour(&self, hour: u32) -> bool {
        if self.night_start_hour > self.night_end_hour {
            hour >= self.night_start_hour || hour < self.night_end_hour
        } else {
            hour >= self.night_start_hour && hour < self.night_end_hour
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.first_sample_secs.is_finite() && self.first_sample_secs >= 0.0) {
            return Err(DrivescoreError::Config(format!(
                "first sample gap must be a non-negative number, got {}",
                self.first_sample_secs
            )));
        }
        if !(self.harsh_threshold_ms2.is_finite() && self.harsh_threshold_ms2 > 0.0) {
            return Err(DrivescoreError::Config(format!(
                "harsh threshold must be positive, got {}",
                self.harsh_threshold_ms2
            )));
        }
        if !(self.accel_unit_factor.is_finite() && self.accel_unit_factor > 0.0) {
            return Err(DrivescoreError::Config(
                "acceleration unit factor must be positive".to_string(),
            ));
        }
        if !self.idle_speed_mph.is_finite() || self.idle_speed_mph < 0.0 {
            return Err(DrivescoreError::Config(format!(
                "idle speed must be non-negative, got {}",
                self.idle_speed_mph
            )));
        }
        if self.night_start_hour > 23 || self.night_end_hour > 23 {
            return Err(DrivescoreError::Config(format!(
                "night window hours must be 0-23, got {}..{}",
                self.night_start_hour, self.night_end_hour
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_harsh_threshold() {
        let config = FeatureConfig::default();
        assert!((config.harsh_threshold() - 6.71082).abs() < 1e-9);
    }

    #[test]
    fn test_night_window_wraps_midnight() {
        let config = FeatureConfig::default();
        assert!(config.is_night_hour(22));
        assert!(config.is_night_hour(23));
        assert!(config.is_night_hour(0));
        assert!(config.is_night_hour(4));
        assert!(!config.is_night_hour(5));
        assert!(!config.is_night_hour(21));
        assert!(!config.is_night_hour(12));
    }

    #[test]
    fn test_night_window_same_day() {
        let config = FeatureConfig {
            night_start_hour: 1,
            night_end_hour: 4,
            ..Default::default()
        };
        assert!(config.is_night_hour(1));
        assert!(config.is_night_hour(3));
        assert!(!config.is_night_hour(4));
        assert!(!config.is_night_hour(23));
    }

    #[test]
    fn test_validate() {
        assert!(FeatureConfig::default().validate().is_ok());

        let bad = FeatureConfig {
            harsh_threshold_ms2: 0.0,
            ..Default::default()
        };
        assert!(bad.validate().is_err());

        let bad_hour = FeatureConfig {
            night_start_hour: 24,
            ..Default::default()
        };
        assert!(bad_hour.validate().is_err());
    }
}
