//! Pipeline configuration

use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;

use drivescore_common::{BucketConfig, DrivescoreError, GeoBucketer, Result};
use drivescore_features::FeatureConfig;
use drivescore_pricing::PremiumConfig;
use serde::{Deserialize, Serialize};

/// Default key file path
pub const DEFAULT_KEY_FILE: &str = "secret.key";

/// Drivescore pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Symmetric key file (32 raw bytes or base64)
    pub key_file: PathBuf,
    /// JSON-lines store directory; in-memory store when unset
    pub store_dir: Option<PathBuf>,
    /// Linear model weights file
    pub model_file: Option<PathBuf>,
    /// Trip aggregation thresholds
    pub features: FeatureConfig,
    /// Coarse cell settings
    pub bucket: BucketConfig,
    /// Premium formula
    pub premium: PremiumConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            key_file: PathBuf::from(DEFAULT_KEY_FILE),
            store_dir: None,
            model_file: None,
            features: FeatureConfig::default(),
            bucket: BucketConfig::default(),
            premium: PremiumConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Load configuration from `.env` and `DRIVESCORE_*` environment variables
    pub fn load() -> Result<Self> {
        // Try to load .env file
        let _ = dotenvy::dotenv();

        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable source. Unparseable values are errors.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();

        if let Some(path) = lookup("DRIVESCORE_KEY_FILE") {
            cfg.key_file = PathBuf::from(path);
        }
        if let Some(dir) = lookup("DRIVESCORE_STORE_DIR").filter(|v| !v.trim().is_empty()) {
            cfg.store_dir = Some(PathBuf::from(dir));
        }
        if let Some(path) = lookup("DRIVESCORE_MODEL_FILE").filter(|v| !v.trim().is_empty()) {
            cfg.model_file = Some(PathBuf::from(path));
        }

        // Premium settings
        if let Some(v) = parse_var(&lookup, "DRIVESCORE_BASE_PREMIUM")? {
            cfg.premium.base_premium = v;
        }

        // Bucketing
        if let Some(v) = parse_var(&lookup, "DRIVESCORE_CELL_RESOLUTION")? {
            cfg.bucket.resolution = v;
        }

        // Feature thresholds
        if let Some(v) = parse_var(&lookup, "DRIVESCORE_FIRST_SAMPLE_SECS")? {
            cfg.features.first_sample_secs = v;
        }
        if let Some(v) = parse_var(&lookup, "DRIVESCORE_HARSH_THRESHOLD_MS2")? {
            cfg.features.harsh_threshold_ms2 = v;
        }
        if let Some(v) = parse_var(&lookup, "DRIVESCORE_IDLE_SPEED_MPH")? {
            cfg.features.idle_speed_mph = v;
        }
        if let Some(v) = parse_var(&lookup, "DRIVESCORE_NIGHT_START_HOUR")? {
            cfg.features.night_start_hour = v;
        }
        if let Some(v) = parse_var(&lookup, "DRIVESCORE_NIGHT_END_HOUR")? {
            cfg.features.night_end_hour = v;
        }

        cfg.validate()?;
        Ok(cfg)
    }

    /// Check every sub-config
    pub fn validate(&self) -> Result<()> {
        self.features.validate()?;
        self.premium.validate()?;
        GeoBucketer::new(&self.bucket)?;
        Ok(())
    }
}

fn parse_var<T, F>(lookup: &F, name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        None => Ok(None),
        Some(raw) => raw.trim().parse().map(Some).map_err(|e| {
            DrivescoreError::Config(format!("{}: cannot parse '{}': {}", name, raw, e))
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let cfg = PipelineConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(cfg.key_file, PathBuf::from("secret.key"));
        assert!(cfg.store_dir.is_none());
        assert_eq!(cfg.premium.base_premium, dec!(2285));
        assert_eq!(cfg.bucket.resolution, 6);
        assert_eq!(cfg.features.night_start_hour, 22);
    }

    #[test]
    fn test_overrides() {
        let cfg = PipelineConfig::from_lookup(lookup(&[
            ("DRIVESCORE_KEY_FILE", "/etc/drivescore/key"),
            ("DRIVESCORE_STORE_DIR", "/var/lib/drivescore"),
            ("DRIVESCORE_BASE_PREMIUM", "1999.50"),
            ("DRIVESCORE_CELL_RESOLUTION", "5"),
            ("DRIVESCORE_HARSH_THRESHOLD_MS2", "3.5"),
            ("DRIVESCORE_NIGHT_END_HOUR", "6"),
        ]))
        .unwrap();
        assert_eq!(cfg.key_file, PathBuf::from("/etc/drivescore/key"));
        assert_eq!(cfg.store_dir, Some(PathBuf::from("/var/lib/drivescore")));
        assert_eq!(cfg.premium.base_premium, dec!(1999.50));
        assert_eq!(cfg.bucket.resolution, 5);
        assert_eq!(cfg.features.harsh_threshold_ms2, 3.5);
        assert_eq!(cfg.features.night_end_hour, 6);
    }

    #[test]
    fn test_unparseable_value_is_fatal() {
        let err = PipelineConfig::from_lookup(lookup(&[("DRIVESCORE_BASE_PREMIUM", "lots")])).unwrap_err();
        assert!(err.is_fatal());
        assert!(err.to_string().contains("DRIVESCORE_BASE_PREMIUM"));
    }

    #[test]
    fn test_out_of_range_value_is_fatal() {
        let err = PipelineConfig::from_lookup(lookup(&[("DRIVESCORE_CELL_RESOLUTION", "11")])).unwrap_err();
        assert!(err.is_fatal());

        let err = PipelineConfig::from_lookup(lookup(&[("DRIVESCORE_NIGHT_START_HOUR", "25")])).unwrap_err();
        assert!(err.is_fatal());
    }
}
