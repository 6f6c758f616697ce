//! Row codecs for the telemetry table
//!
//! [`TelemetryWriter`] owns the write path (validate the whole batch, then
//! encrypt coordinates and tag the coarse cell). [`TelemetryReader`] owns the
//! read path (decrypt per row, a bad ciphertext becomes a missing value).

use std::sync::Arc;

use chrono::{DateTime, FixedOffset};
use drivescore_common::{
    CellId, DriverProfile, EncryptedScalar, FieldCodec, GeoBucketer, RawTelemetryRecord, Result,
    RoadType, TelemetrySample, TripFeatures, ValidationError,
};
use serde::{Deserialize, Serialize};

/// Telemetry row as stored: exact coordinates only in encrypted form
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncryptedTelemetryRow {
    pub seq: u64,
    pub timestamp: DateTime<FixedOffset>,
    pub trip_id: String,
    pub driver_id: String,
    pub lat: Option<EncryptedScalar>,
    pub lon: Option<EncryptedScalar>,
    /// Coarse location tag, stored in clear
    pub cell_id: Option<CellId>,
    pub speed: f64,
    pub acceleration: f64,
    pub road_type: RoadType,
    pub engine_on: bool,
}

/// Write path for telemetry batches
#[derive(Debug, Clone)]
pub struct TelemetryWriter {
    codec: Arc<FieldCodec>,
    bucketer: GeoBucketer,
}

impl TelemetryWriter {
    pub fn new(codec: Arc<FieldCodec>, bucketer: GeoBucketer) -> Self {
        Self { codec, bucketer }
    }

    /// Validate and encrypt a batch. Row `i` gets `seq = i`; the store
    /// shifts sequence numbers when it appends.
    pub fn prepare(&self, batch: Vec<RawTelemetryRecord>) -> Result<Vec<EncryptedTelemetryRow>> {
        let samples = RawTelemetryRecord::validate_batch(batch)?;
        samples.into_iter().map(|s| self.encrypt_sample(s)).collect()
    }

    fn encrypt_sample(&self, sample: TelemetrySample) -> Result<EncryptedTelemetryRow> {
        let cell_id = self.bucketer.bucket_opt(sample.lat, sample.lon);
        Ok(EncryptedTelemetryRow {
            seq: sample.seq,
            timestamp: sample.timestamp,
            lat: self.codec.encrypt(sample.lat)?,
            lon: self.codec.encrypt(sample.lon)?,
            cell_id,
            trip_id: sample.trip_id,
            driver_id: sample.driver_id,
            speed: sample.speed,
            acceleration: sample.acceleration,
            road_type: sample.road_type,
            engine_on: sample.engine_on,
        })
    }
}

/// Read path for telemetry rows
#[derive(Debug, Clone)]
pub struct TelemetryReader {
    codec: Arc<FieldCodec>,
}

impl TelemetryReader {
    pub fn new(codec: Arc<FieldCodec>) -> Self {
        Self { codec }
    }

    /// Decrypt one row. Never fails: undecryptable coordinates read as `None`.
    pub fn decrypt_row(&self, row: &EncryptedTelemetryRow) -> TelemetrySample {
        TelemetrySample {
            seq: row.seq,
            timestamp: row.timestamp,
            trip_id: row.trip_id.clone(),
            driver_id: row.driver_id.clone(),
            lat: self.codec.decrypt_opt(row.lat.as_ref()),
            lon: self.codec.decrypt_opt(row.lon.as_ref()),
            speed: row.speed,
            acceleration: row.acceleration,
            road_type: row.road_type,
            engine_on: row.engine_on,
        }
    }

    pub fn decrypt_rows<'a>(&self, rows: impl IntoIterator<Item = &'a EncryptedTelemetryRow>) -> Vec<TelemetrySample> {
        rows.into_iter().map(|r| self.decrypt_row(r)).collect()
    }
}

/// Reject a profile batch containing an empty `driver_id`
pub fn validate_drivers(profiles: &[DriverProfile]) -> std::result::Result<(), ValidationError> {
    match profiles.iter().position(|p| p.driver_id.trim().is_empty()) {
        Some(row) => Err(ValidationError::EmptyIdentifier {
            row,
            field: "driver_id",
        }),
        None => Ok(()),
    }
}

/// Reject a trip batch containing an empty `trip_id` or `driver_id`
pub fn validate_trips(trips: &[TripFeatures]) -> std::result::Result<(), ValidationError> {
    for (row, trip) in trips.iter().enumerate() {
        if trip.trip_id.trim().is_empty() {
            return Err(ValidationError::EmptyIdentifier {
                row,
                field: "trip_id",
            });
        }
        if trip.driver_id.trim().is_empty() {
            return Err(ValidationError::EmptyIdentifier {
                row,
                field: "driver_id",
            });
        }
    }
    Ok(())
}

/// Reject rows that extend a stored trip under another driver.
///
/// `owner_of` answers with the driver already on record for a trip id.
pub fn check_trip_owners<'a, F>(
    rows: &[EncryptedTelemetryRow],
    owner_of: F,
) -> std::result::Result<(), ValidationError>
where
    F: Fn(&str) -> Option<&'a str>,
{
    for row in rows {
        if let Some(owner) = owner_of(&row.trip_id) {
            if owner != row.driver_id {
                return Err(ValidationError::DriverMismatch {
                    trip_id: row.trip_id.clone(),
                    expected: owner.to_string(),
                    actual: row.driver_id.clone(),
                });
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use drivescore_common::{DrivescoreError, KeyMaterial};

    fn codec() -> Arc<FieldCodec> {
        Arc::new(FieldCodec::new(&KeyMaterial::generate()))
    }

    fn raw(trip: &str, lat: Option<f64>) -> RawTelemetryRecord {
        RawTelemetryRecord {
            timestamp: drivescore_common::types::telemetry::parse_timestamp("2024-04-01 09:00:00"),
            trip_id: Some(trip.into()),
            driver_id: Some("driver_1".into()),
            lat,
            lon: lat.map(|_| -87.6298),
            speed: Some(31.0),
            acceleration: Some(0.4),
            road_type: Some("city".into()),
            engine_on: Some(true),
        }
    }

    #[test]
    fn test_prepare_encrypts_coordinates() {
        let codec = codec();
        let writer = TelemetryWriter::new(codec.clone(), GeoBucketer::default());
        let rows = writer.prepare(vec![raw("t1", Some(41.8781)), raw("t1", None)]).unwrap();

        assert_eq!(rows.len(), 2);
        let lat = rows[0].lat.as_ref().unwrap();
        assert!(!lat.as_str().contains("41.8781"));
        assert!(rows[0].cell_id.is_some());
        assert!(rows[1].lat.is_none());
        assert!(rows[1].cell_id.is_none());
        assert_eq!(rows[1].seq, 1);

        let reader = TelemetryReader::new(codec);
        let sample = reader.decrypt_row(&rows[0]);
        assert_eq!(sample.lat, Some(41.8781));
        assert_eq!(sample.lon, Some(-87.6298));
    }

    #[test]
    fn test_prepare_rejects_whole_batch() {
        let writer = TelemetryWriter::new(codec(), GeoBucketer::default());
        let mut broken = raw("t1", None);
        broken.road_type = None;
        let err = writer.prepare(vec![raw("t1", None), broken]).unwrap_err();
        assert!(matches!(
            err,
            DrivescoreError::Validation(ValidationError::MissingFields { row: 1, .. })
        ));
    }

    #[test]
    fn test_garbage_ciphertext_reads_as_missing() {
        let codec = codec();
        let writer = TelemetryWriter::new(codec.clone(), GeoBucketer::default());
        let mut row = writer.prepare(vec![raw("t1", Some(41.0))]).unwrap().remove(0);
        row.lat = Some(EncryptedScalar("not-a-token".into()));

        let sample = TelemetryReader::new(codec).decrypt_row(&row);
        assert_eq!(sample.lat, None);
        assert_eq!(sample.lon, Some(-87.6298));
        assert_eq!(sample.speed, 31.0);
    }

    #[test]
    fn test_foreign_key_reads_as_missing() {
        let writer = TelemetryWriter::new(codec(), GeoBucketer::default());
        let rows = writer.prepare(vec![raw("t1", Some(41.0))]).unwrap();
        let sample = TelemetryReader::new(codec()).decrypt_row(&rows[0]);
        assert_eq!(sample.lat, None);
        assert_eq!(sample.lon, None);
    }

    #[test]
    fn test_identifier_checks() {
        assert!(validate_drivers(&[DriverProfile::unknown("d1")]).is_ok());
        assert_eq!(
            validate_drivers(&[DriverProfile::unknown("d1"), DriverProfile::unknown(" ")]),
            Err(ValidationError::EmptyIdentifier {
                row: 1,
                field: "driver_id"
            })
        );
    }

    #[test]
    fn test_trip_owner_check() {
        let writer = TelemetryWriter::new(codec(), GeoBucketer::default());
        let rows = writer.prepare(vec![raw("t1", None), raw("t2", None)]).unwrap();

        assert!(check_trip_owners(&rows, |_| None).is_ok());
        assert!(check_trip_owners(&rows, |trip| (trip == "t2").then_some("driver_1")).is_ok());
        assert_eq!(
            check_trip_owners(&rows, |trip| (trip == "t2").then_some("driver_2")),
            Err(ValidationError::DriverMismatch {
                trip_id: "t2".into(),
                expected: "driver_2".into(),
                actual: "driver_1".into(),
            })
        );
    }
}
