//! Telemetry store interface
//!
//! Three append-only record families: driver profiles, trip features and
//! telemetry rows. There is no update, upsert or delete; appending the same
//! batch twice stores it twice.

use async_trait::async_trait;
use drivescore_common::{DriverProfile, RawTelemetryRecord, Result, TelemetrySample, TripFeatures};
use serde::{Deserialize, Serialize};

use crate::rows::EncryptedTelemetryRow;

/// Trait for telemetry storage backends
#[async_trait]
pub trait TelemetryStore: Send + Sync {
    /// Append driver profiles. Returns the number of rows written.
    async fn append_drivers(&self, profiles: Vec<DriverProfile>) -> Result<usize>;

    /// Append trip feature records
    async fn append_trips(&self, trips: Vec<TripFeatures>) -> Result<usize>;

    /// Validate, encrypt and append a telemetry batch. A batch with any
    /// invalid record is rejected whole and nothing is written.
    async fn append_telemetry(&self, batch: Vec<RawTelemetryRecord>) -> Result<usize>;

    /// All driver profiles, in append order
    async fn drivers(&self) -> Result<Vec<DriverProfile>>;

    /// Latest profile appended for a driver
    async fn driver_profile(&self, driver_id: &str) -> Result<Option<DriverProfile>>;

    /// All trip records, in append order
    async fn trips(&self) -> Result<Vec<TripFeatures>>;

    /// Trip records for one driver
    async fn trips_for_driver(&self, driver_id: &str) -> Result<Vec<TripFeatures>>;

    /// Decrypted samples of one trip
    async fn telemetry_for_trip(&self, trip_id: &str) -> Result<Vec<TelemetrySample>>;

    /// Decrypted samples of one driver
    async fn telemetry_for_driver(&self, driver_id: &str) -> Result<Vec<TelemetrySample>>;

    /// Every decrypted sample
    async fn telemetry_all(&self) -> Result<Vec<TelemetrySample>>;

    /// Stored rows of one trip with coordinates still encrypted
    async fn encrypted_rows_for_trip(&self, trip_id: &str) -> Result<Vec<EncryptedTelemetryRow>>;

    /// Row counts
    async fn stats(&self) -> Result<StoreStats>;
}

/// Statistics about the store
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreStats {
    pub driver_rows: usize,
    pub trip_rows: usize,
    pub telemetry_rows: usize,
    /// Distinct trips with telemetry
    pub telemetry_trips: usize,
}
