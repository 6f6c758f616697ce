//! Geospatial bucketing
//!
//! Maps exact coordinates to a coarse H3 cell used as a privacy-preserving
//! location tag. The cell is stored in clear next to the encrypted exact
//! coordinates, so the resolution is capped: cells finer than
//! [`MAX_RESOLUTION`] are refused at construction.

use std::fmt;

use h3o::{LatLng, Resolution};
use serde::{Deserialize, Serialize};

use crate::error::{DrivescoreError, Result};

/// Default H3 resolution (~36 km² cells, ~3.7 km edge).
///
/// Coarser than a ~5 km cell by area; a precision-5 geohash cell is about
/// 4.9 km by 4.9 km (~24 km²). Resolution 7 (~5 km², ~1.4 km edge) is the
/// finest accepted.
pub const DEFAULT_RESOLUTION: u8 = 6;

/// Finest resolution accepted (~5 km² cells)
pub const MAX_RESOLUTION: u8 = 7;

/// Coarse location cell identifier (H3 index, hex)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CellId(pub String);

impl fmt::Display for CellId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Bucketer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BucketConfig {
    /// H3 resolution, 0 (coarsest) to [`MAX_RESOLUTION`]
    pub resolution: u8,
}

impl Default for BucketConfig {
    fn default() -> Self {
        Self {
            resolution: DEFAULT_RESOLUTION,
        }
    }
}

/// Pure `(lat, lon) -> cell` mapping at a fixed resolution
#[derive(Debug, Clone, Copy)]
pub struct GeoBucketer {
    resolution: Resolution,
}

impl GeoBucketer {
    pub fn new(config: &BucketConfig) -> Result<Self> {
        if config.resolution > MAX_RESOLUTION {
            return Err(DrivescoreError::Config(format!(
                "cell resolution {} is finer than the maximum {}",
                config.resolution, MAX_RESOLUTION
            )));
        }
        let resolution = Resolution::try_from(config.resolution).map_err(|e| {
            DrivescoreError::Config(format!("invalid cell resolution {}: {}", config.resolution, e))
        })?;
        Ok(Self { resolution })
    }

    /// Cell containing the point; `None` for non-finite or out-of-range input.
    pub fn bucket(&self, lat: f64, lon: f64) -> Option<CellId> {
        if !lat.is_finite() || !lon.is_finite() || lat.abs() > 90.0 || lon.abs() > 180.0 {
            return None;
        }
        let point = LatLng::new(lat, lon).ok()?;
        Some(CellId(point.to_cell(self.resolution).to_string()))
    }

    /// Cell for an optional fix; `None` unless both coordinates are present.
    pub fn bucket_opt(&self, lat: Option<f64>, lon: Option<f64>) -> Option<CellId> {
        match (lat, lon) {
            (Some(lat), Some(lon)) => self.bucket(lat, lon),
            _ => None,
        }
    }
}

impl Default for GeoBucketer {
    fn default() -> Self {
        Self {
            resolution: Resolution::Six,
        }
    }
}
