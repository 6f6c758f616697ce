//! Driver-level features and the risk model input schema
//!
//! - [`DriverProfile`]: static attributes from the profile source (history, vehicle)
//! - [`DriverFeatures`]: duration-weighted rollup of a driver's trips plus the profile
//! - [`RiskFeatureVector`]: the fixed, versioned vector handed to the risk model

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Version of the [`RiskFeatureVector`] schema. Bump on any field change.
pub const FEATURE_SCHEMA_VERSION: &str = "1.0.0";

/// Claim weight in the claims-weighted score
pub const CLAIM_WEIGHT: u32 = 25;

/// Violation weight in the claims-weighted score
pub const VIOLATION_WEIGHT: u32 = 15;

/// Model column order of [`RiskFeatureVector`]
pub const FEATURE_NAMES: [&str; 22] = [
    "num_trips",
    "total_miles",
    "total_drive_time_min",
    "avg_trip_duration_min",
    "avg_trip_miles",
    "avg_speed_overall",
    "max_speed_overall",
    "total_harsh_brakes",
    "total_harsh_accels",
    "avg_num_harsh_brakes",
    "avg_num_harsh_accels",
    "night_trip_pct_overall",
    "idling_pct_overall",
    "urban_pct_overall",
    "highway_pct_overall",
    "years_driving",
    "num_claims",
    "num_violations",
    "vehicle_age",
    "vehicle_type",
    "insurance_policy_length_years",
    "claims_weighted_score",
];

/// Vehicle category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum VehicleType {
    Sedan,
    Suv,
    SportsCar,
    Truck,
    Electric,
    /// Attribute absent from the profile source
    #[default]
    Unknown,
}

impl VehicleType {
    pub fn as_str(&self) -> &'static str {
        match self {
            VehicleType::Sedan => "Sedan",
            VehicleType::Suv => "SUV",
            VehicleType::SportsCar => "Sports Car",
            VehicleType::Truck => "Truck",
            VehicleType::Electric => "Electric",
            VehicleType::Unknown => "unknown",
        }
    }
}

impl fmt::Display for VehicleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VehicleType {
    type Err = std::convert::Infallible;

    /// Unrecognised names map to `Unknown`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .map(|c| c.to_ascii_lowercase())
            .collect();
        Ok(match normalized.as_str() {
            "sedan" => VehicleType::Sedan,
            "suv" => VehicleType::Suv,
            "sportscar" => VehicleType::SportsCar,
            "truck" => VehicleType::Truck,
            "electric" => VehicleType::Electric,
            _ => VehicleType::Unknown,
        })
    }
}

impl Serialize for VehicleType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for VehicleType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw: Option<String> = Option::deserialize(deserializer)?;
        Ok(raw
            .map(|s| s.parse().unwrap_or_default())
            .unwrap_or_default())
    }
}

/// Static driver attributes keyed by driver id.
///
/// Absent attributes default to zero / `unknown`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DriverProfile {
    pub driver_id: String,
    #[serde(default)]
    pub years_driving: u32,
    #[serde(default)]
    pub num_claims: u32,
    #[serde(default)]
    pub num_violations: u32,
    #[serde(default)]
    pub vehicle_age: u32,
    #[serde(default)]
    pub vehicle_type: VehicleType,
    #[serde(default)]
    pub insurance_policy_length_years: u32,
}

impl DriverProfile {
    /// Profile with every attribute defaulted
    pub fn unknown(driver_id: impl Into<String>) -> Self {
        Self {
            driver_id: driver_id.into(),
            ..Default::default()
        }
    }

    /// Set driving history
    pub fn with_history(mut self, years_driving: u32, num_claims: u32, num_violations: u32) -> Self {
        self.years_driving = years_driving;
        self.num_claims = num_claims;
        self.num_violations = num_violations;
        self
    }

    /// Set vehicle attributes
    pub fn with_vehicle(mut self, vehicle_type: VehicleType, vehicle_age: u32) -> Self {
        self.vehicle_type = vehicle_type;
        self.vehicle_age = vehicle_age;
        self
    }

    /// Set policy length
    pub fn with_policy_length(mut self, years: u32) -> Self {
        self.insurance_policy_length_years = years;
        self
    }

    /// `num_claims * 25 + num_violations * 15`
    pub fn claims_weighted_score(&self) -> u32 {
        self.num_claims
            .saturating_mul(CLAIM_WEIGHT)
            .saturating_add(self.num_violations.saturating_mul(VIOLATION_WEIGHT))
    }
}

/// Driver-level feature record.
///
/// Sums are plain sums, `avg_*` per-trip means are unweighted, and every
/// `*_overall` average is weighted by trip duration. When the total drive
/// time is zero the weighted fields are 0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriverFeatures {
    pub driver_id: String,
    pub num_trips: u32,
    pub total_miles: f64,
    pub total_drive_time_min: f64,
    pub avg_trip_duration_min: f64,
    pub avg_trip_miles: f64,
    pub avg_speed_overall: f64,
    pub max_speed_overall: f64,
    pub total_harsh_brakes: u32,
    pub total_harsh_accels: u32,
    pub avg_num_harsh_brakes: f64,
    pub avg_num_harsh_accels: f64,
    pub night_trip_pct_overall: f64,
    pub idling_pct_overall: f64,
    pub urban_pct_overall: f64,
    pub highway_pct_overall: f64,

    // Static attributes
    pub years_driving: u32,
    pub num_claims: u32,
    pub num_violations: u32,
    pub vehicle_age: u32,
    pub vehicle_type: VehicleType,
    pub insurance_policy_length_years: u32,
    pub claims_weighted_score: u32,
}

impl DriverFeatures {
    /// Model input for this driver (drops `driver_id`)
    pub fn feature_vector(&self) -> RiskFeatureVector {
        RiskFeatureVector::from(self)
    }
}

/// Fixed-schema input to the risk model.
///
/// Mirrors [`DriverFeatures`] without `driver_id`; the model never sees
/// the identity of the driver it scores.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskFeatureVector {
    pub num_trips: u32,
    pub total_miles: f64,
    pub total_drive_time_min: f64,
    pub avg_trip_duration_min: f64,
    pub avg_trip_miles: f64,
    pub avg_speed_overall: f64,
    pub max_speed_overall: f64,
    pub total_harsh_brakes: u32,
    pub total_harsh_accels: u32,
    pub avg_num_harsh_brakes: f64,
    pub avg_num_harsh_accels: f64,
    pub night_trip_pct_overall: f64,
    pub idling_pct_overall: f64,
    pub urban_pct_overall: f64,
    pub highway_pct_overall: f64,
    pub years_driving: u32,
    pub num_claims: u32,
    pub num_violations: u32,
    pub vehicle_age: u32,
    pub vehicle_type: VehicleType,
    pub insurance_policy_length_years: u32,
    pub claims_weighted_score: u32,
}

impl RiskFeatureVector {
    /// Numeric columns by name, in [`FEATURE_NAMES`] order (`vehicle_type` excluded).
    pub fn numeric_columns(&self) -> [(&'static str, f64); 21] {
        [
            ("num_trips", self.num_trips as f64),
            ("total_miles", self.total_miles),
            ("total_drive_time_min", self.total_drive_time_min),
            ("avg_trip_duration_min", self.avg_trip_duration_min),
            ("avg_trip_miles", self.avg_trip_miles),
            ("avg_speed_overall", self.avg_speed_overall),
            ("max_speed_overall", self.max_speed_overall),
            ("total_harsh_brakes", self.total_harsh_brakes as f64),
            ("total_harsh_accels", self.total_harsh_accels as f64),
            ("avg_num_harsh_brakes", self.avg_num_harsh_brakes),
            ("avg_num_harsh_accels", self.avg_num_harsh_accels),
            ("night_trip_pct_overall", self.night_trip_pct_overall),
            ("idling_pct_overall", self.idling_pct_overall),
            ("urban_pct_overall", self.urban_pct_overall),
            ("highway_pct_overall", self.highway_pct_overall),
            ("years_driving", self.years_driving as f64),
            ("num_claims", self.num_claims as f64),
            ("num_violations", self.num_violations as f64),
            ("vehicle_age", self.vehicle_age as f64),
            (
                "insurance_policy_length_years",
                self.insurance_policy_length_years as f64,
            ),
            ("claims_weighted_score", self.claims_weighted_score as f64),
        ]
    }
}

impl From<&DriverFeatures> for RiskFeatureVector {
    fn from(f: &DriverFeatures) -> Self {
        Self {
            num_trips: f.num_trips,
            total_miles: f.total_miles,
            total_drive_time_min: f.total_drive_time_min,
            avg_trip_duration_min: f.avg_trip_duration_min,
            avg_trip_miles: f.avg_trip_miles,
            avg_speed_overall: f.avg_speed_overall,
            max_speed_overall: f.max_speed_overall,
            total_harsh_brakes: f.total_harsh_brakes,
            total_harsh_accels: f.total_harsh_accels,
            avg_num_harsh_brakes: f.avg_num_harsh_brakes,
            avg_num_harsh_accels: f.avg_num_harsh_accels,
            night_trip_pct_overall: f.night_trip_pct_overall,
            idling_pct_overall: f.idling_pct_overall,
            urban_pct_overall: f.urban_pct_overall,
            highway_pct_overall: f.highway_pct_overall,
            years_driving: f.years_driving,
            num_claims: f.num_claims,
            num_violations: f.num_violations,
            vehicle_age: f.vehicle_age,
            vehicle_type: f.vehicle_type,
            insurance_policy_length_years: f.insurance_policy_length_years,
            claims_weighted_score: f.claims_weighted_score,
        }
    }
}
