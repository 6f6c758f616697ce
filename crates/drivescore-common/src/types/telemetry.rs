//! Telemetry samples - raw vehicle readings
//!
//! A sample is one reading from the vehicle source: position, speed,
//! acceleration (mph/s), road type and engine state. Samples are immutable
//! once recorded. Two forms exist:
//! - [`RawTelemetryRecord`]: wire form, every field optional, as emitted by the source
//! - [`TelemetrySample`]: validated form consumed by aggregation

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, FixedOffset, NaiveDateTime};
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::ValidationError;

/// Required fields of a telemetry record, in wire order.
pub const REQUIRED_FIELDS: [&str; 7] = [
    "timestamp",
    "trip_id",
    "driver_id",
    "speed",
    "acceleration",
    "road_type",
    "engine_on",
];

/// Road classification of a sample
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoadType {
    City,
    Highway,
    Residential,
}

impl RoadType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoadType::City => "city",
            RoadType::Highway => "highway",
            RoadType::Residential => "residential",
        }
    }
}

impl fmt::Display for RoadType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RoadType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "city" => Ok(RoadType::City),
            "highway" => Ok(RoadType::Highway),
            "residential" => Ok(RoadType::Residential),
            other => Err(other.to_string()),
        }
    }
}

/// Validated telemetry sample
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetrySample {
    /// Ingestion sequence number, assigned by the store on append.
    /// Breaks ties between samples sharing a timestamp.
    #[serde(default)]
    pub seq: u64,
    /// Reading time with the vehicle's local offset
    pub timestamp: DateTime<FixedOffset>,
    /// Trip identifier
    pub trip_id: String,
    /// Driver identifier (constant within a trip)
    pub driver_id: String,
    /// Latitude, if the fix was available
    pub lat: Option<f64>,
    /// Longitude, if the fix was available
    pub lon: Option<f64>,
    /// Speed in mph
    pub speed: f64,
    /// Acceleration in mph/s
    pub acceleration: f64,
    /// Road classification
    pub road_type: RoadType,
    /// Whether the engine was running
    pub engine_on: bool,
}

impl TelemetrySample {
    /// Create a sample with the engine running and no position fix
    pub fn new(
        trip_id: impl Into<String>,
        driver_id: impl Into<String>,
        timestamp: DateTime<FixedOffset>,
        speed: f64,
        acceleration: f64,
        road_type: RoadType,
    ) -> Self {
        Self {
            seq: 0,
            timestamp,
            trip_id: trip_id.into(),
            driver_id: driver_id.into(),
            lat: None,
            lon: None,
            speed,
            acceleration,
            road_type,
            engine_on: true,
        }
    }

    /// Set position
    pub fn with_position(mut self, lat: f64, lon: f64) -> Self {
        self.lat = Some(lat);
        self.lon = Some(lon);
        self
    }

    /// Set engine state
    pub fn with_engine(mut self, engine_on: bool) -> Self {
        self.engine_on = engine_on;
        self
    }

    /// Set ingestion sequence number
    pub fn with_seq(mut self, seq: u64) -> Self {
        self.seq = seq;
        self
    }
}

/// Telemetry record as emitted by the vehicle source.
///
/// Every field is optional on the wire; [`RawTelemetryRecord::validate_batch`]
/// turns a batch into samples or rejects it whole.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawTelemetryRecord {
    #[serde(default, deserialize_with = "deserialize_timestamp")]
    pub timestamp: Option<DateTime<FixedOffset>>,
    #[serde(default)]
    pub trip_id: Option<String>,
    #[serde(default)]
    pub driver_id: Option<String>,
    #[serde(default)]
    pub lat: Option<f64>,
    #[serde(default)]
    pub lon: Option<f64>,
    #[serde(default)]
    pub speed: Option<f64>,
    #[serde(default)]
    pub acceleration: Option<f64>,
    #[serde(default)]
    pub road_type: Option<String>,
    #[serde(default, deserialize_with = "deserialize_engine_on")]
    pub engine_on: Option<bool>,
}

impl RawTelemetryRecord {
    /// Names of required fields absent from this record
    pub fn missing_fields(&self) -> Vec<String> {
        let present = [
            self.timestamp.is_some(),
            self.trip_id.is_some(),
            self.driver_id.is_some(),
            self.speed.is_some_and(|v| !v.is_nan()),
            self.acceleration.is_some_and(|v| !v.is_nan()),
            self.road_type.is_some(),
            self.engine_on.is_some(),
        ];
        REQUIRED_FIELDS
            .iter()
            .zip(present)
            .filter(|(_, ok)| !ok)
            .map(|(name, _)| name.to_string())
            .collect()
    }

    /// Convert into a validated sample. `row` is used for error reporting.
    pub fn into_sample(self, row: usize) -> Result<TelemetrySample, ValidationError> {
        let missing = self.missing_fields();
        let (
            Some(timestamp),
            Some(trip_id),
            Some(driver_id),
            Some(speed),
            Some(acceleration),
            Some(road_type),
            Some(engine_on),
        ) = (
            self.timestamp,
            self.trip_id,
            self.driver_id,
            self.speed,
            self.acceleration,
            self.road_type,
            self.engine_on,
        )
        else {
            return Err(ValidationError::MissingFields {
                row,
                fields: missing,
            });
        };
        // NaN speed/acceleration count as missing
        if !missing.is_empty() {
            return Err(ValidationError::MissingFields {
                row,
                fields: missing,
            });
        }

        if trip_id.trim().is_empty() {
            return Err(ValidationError::EmptyIdentifier {
                row,
                field: "trip_id",
            });
        }
        if driver_id.trim().is_empty() {
            return Err(ValidationError::EmptyIdentifier {
                row,
                field: "driver_id",
            });
        }

        let road_type = road_type
            .parse::<RoadType>()
            .map_err(|value| ValidationError::UnknownRoadType { row, value })?;

        Ok(TelemetrySample {
            seq: row as u64,
            timestamp,
            trip_id,
            driver_id,
            lat: self.lat.filter(|v| !v.is_nan()),
            lon: self.lon.filter(|v| !v.is_nan()),
            speed,
            acceleration,
            road_type,
            engine_on,
        })
    }

    /// Validate a whole batch.
    ///
    /// Either every record becomes a sample or the first offending row is
    /// reported and nothing is returned. Also enforces that records sharing
    /// a `trip_id` share a `driver_id`.
    pub fn validate_batch(
        records: Vec<RawTelemetryRecord>,
    ) -> Result<Vec<TelemetrySample>, ValidationError> {
        let mut samples = Vec::with_capacity(records.len());
        let mut trip_owner: HashMap<String, String> = HashMap::new();

        for (row, record) in records.into_iter().enumerate() {
            let sample = record.into_sample(row)?;
            match trip_owner.get(&sample.trip_id) {
                Some(owner) if owner != &sample.driver_id => {
                    return Err(ValidationError::DriverMismatch {
                        trip_id: sample.trip_id,
                        expected: owner.clone(),
                        actual: sample.driver_id,
                    });
                }
                Some(_) => {}
                None => {
                    trip_owner.insert(sample.trip_id.clone(), sample.driver_id.clone());
                }
            }
            samples.push(sample);
        }

        Ok(samples)
    }
}

impl From<&TelemetrySample> for RawTelemetryRecord {
    fn from(sample: &TelemetrySample) -> Self {
        Self {
            timestamp: Some(sample.timestamp),
            trip_id: Some(sample.trip_id.clone()),
            driver_id: Some(sample.driver_id.clone()),
            lat: sample.lat,
            lon: sample.lon,
            speed: Some(sample.speed),
            acceleration: Some(sample.acceleration),
            road_type: Some(sample.road_type.to_string()),
            engine_on: Some(sample.engine_on),
        }
    }
}

/// Accepts RFC 3339 timestamps, or naive `YYYY-MM-DD HH:MM:SS[.f]` wall-clock
/// timestamps which are taken as already local (offset +00:00).
pub fn parse_timestamp(value: &str) -> Option<DateTime<FixedOffset>> {
    let value = value.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Some(ts);
    }
    ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
        .map(|naive| naive.and_utc().fixed_offset())
}

fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<FixedOffset>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    match raw {
        None => Ok(None),
        Some(s) => parse_timestamp(&s)
            .map(Some)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp '{}'", s))),
    }
}

fn deserialize_engine_on<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Int(i64),
    }

    match Option::<Flag>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Flag::Bool(b)) => Ok(Some(b)),
        Some(Flag::Int(0)) => Ok(Some(false)),
        Some(Flag::Int(1)) => Ok(Some(true)),
        Some(Flag::Int(other)) => Err(serde::de::Error::custom(format!(
            "engine_on must be 0 or 1, got {}",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(trip: &str, driver: &str) -> RawTelemetryRecord {
        RawTelemetryRecord {
            timestamp: parse_timestamp("2025-03-01 08:00:00"),
            trip_id: Some(trip.to_string()),
            driver_id: Some(driver.to_string()),
            lat: Some(41.88),
            lon: Some(-87.63),
            speed: Some(30.0),
            acceleration: Some(0.5),
            road_type: Some("city".to_string()),
            engine_on: Some(true),
        }
    }

    #[test]
    fn test_road_type_parsing() {
        assert_eq!("City".parse::<RoadType>(), Ok(RoadType::City));
        assert_eq!("highway".parse::<RoadType>(), Ok(RoadType::Highway));
        assert!("dirt".parse::<RoadType>().is_err());
    }

    #[test]
    fn test_parse_timestamp_formats() {
        let naive = parse_timestamp("2025-03-01 23:15:00").unwrap();
        assert_eq!(naive.offset().local_minus_utc(), 0);

        let fractional = parse_timestamp("2025-03-01 23:15:00.250").unwrap();
        assert_eq!(fractional.timestamp_subsec_millis(), 250);

        let offset = parse_timestamp("2025-03-01T23:15:00-06:00").unwrap();
        assert_eq!(offset.offset().local_minus_utc(), -6 * 3600);

        assert!(parse_timestamp("yesterday").is_none());
    }

    #[test]
    fn test_missing_fields_reported() {
        let mut record = raw("t1", "d1");
        record.road_type = None;
        record.speed = None;

        let err = record.into_sample(4).unwrap_err();
        assert_eq!(
            err,
            ValidationError::MissingFields {
                row: 4,
                fields: vec!["speed".to_string(), "road_type".to_string()],
            }
        );
    }

    #[test]
    fn test_position_is_optional() {
        let mut record = raw("t1", "d1");
        record.lat = None;
        record.lon = None;

        let sample = record.into_sample(0).unwrap();
        assert_eq!(sample.lat, None);
        assert_eq!(sample.lon, None);
    }

    #[test]
    fn test_validate_batch_rejects_whole_batch() {
        let mut bad = raw("t1", "d1");
        bad.road_type = None;
        let batch = vec![raw("t1", "d1"), bad, raw("t1", "d1")];

        let err = RawTelemetryRecord::validate_batch(batch).unwrap_err();
        assert!(matches!(err, ValidationError::MissingFields { row: 1, .. }));
    }

    #[test]
    fn test_validate_batch_driver_mismatch() {
        let batch = vec![raw("t1", "d1"), raw("t1", "d2")];
        let err = RawTelemetryRecord::validate_batch(batch).unwrap_err();
        assert!(matches!(err, ValidationError::DriverMismatch { .. }));
    }

    #[test]
    fn test_unknown_road_type() {
        let mut record = raw("t1", "d1");
        record.road_type = Some("gravel".to_string());
        let err = record.into_sample(2).unwrap_err();
        assert_eq!(
            err,
            ValidationError::UnknownRoadType {
                row: 2,
                value: "gravel".to_string()
            }
        );
    }

    #[test]
    fn test_deserialize_wire_record() {
        let json = r#"{
            "timestamp": "2025-03-01 22:30:00",
            "trip_id": "driver_1_trip_1",
            "driver_id": "driver_1",
            "lat": 40.1,
            "lon": -88.2,
            "speed": 42.5,
            "acceleration": -1.2,
            "road_type": "highway",
            "engine_on": 1
        }"#;
        let record: RawTelemetryRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.engine_on, Some(true));

        let sample = record.into_sample(0).unwrap();
        assert_eq!(sample.road_type, RoadType::Highway);
        assert_eq!(sample.speed, 42.5);
    }

    #[test]
    fn test_deserialize_missing_field_is_none() {
        let json = r#"{"timestamp": "2025-03-01 22:30:00", "trip_id": "t"}"#;
        let record: RawTelemetryRecord = serde_json::from_str(json).unwrap();
        assert!(record.road_type.is_none());
        assert_eq!(record.missing_fields().len(), 5);
    }
}
