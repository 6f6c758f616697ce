//! In-memory telemetry store
//!
//! Tables live behind one `parking_lot::RwLock`. Batches are validated and
//! encrypted before the lock is taken, then checked against stored trip
//! owners and appended under a single write guard, so readers see either
//! none or all of a batch.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use drivescore_common::{
    DriverProfile, FieldCodec, GeoBucketer, RawTelemetryRecord, Result, TelemetrySample,
    TripFeatures,
};
use parking_lot::RwLock;
use tracing::{debug, instrument};

use crate::rows::{check_trip_owners, validate_drivers, validate_trips, EncryptedTelemetryRow, TelemetryReader, TelemetryWriter};
use crate::store::{StoreStats, TelemetryStore};

#[derive(Debug, Default)]
struct Tables {
    drivers: Vec<DriverProfile>,
    trips: Vec<TripFeatures>,
    telemetry: Vec<EncryptedTelemetryRow>,
    /// Row positions in `telemetry` by trip id
    by_trip: HashMap<String, Vec<usize>>,
    next_seq: u64,
}

impl Tables {
    fn trip_owner(&self, trip_id: &str) -> Option<&str> {
        let first = *self.by_trip.get(trip_id)?.first()?;
        self.telemetry.get(first).map(|row| row.driver_id.as_str())
    }
}

/// In-memory storage implementation
pub struct InMemoryTelemetryStore {
    writer: TelemetryWriter,
    reader: TelemetryReader,
    tables: RwLock<Tables>,
}

impl InMemoryTelemetryStore {
    pub fn new(codec: Arc<FieldCodec>, bucketer: GeoBucketer) -> Self {
        Self {
            writer: TelemetryWriter::new(codec.clone(), bucketer),
            reader: TelemetryReader::new(codec),
            tables: RwLock::new(Tables::default()),
        }
    }
}

#[async_trait]
impl TelemetryStore for InMemoryTelemetryStore {
    async fn append_drivers(&self, profiles: Vec<DriverProfile>) -> Result<usize> {
        validate_drivers(&profiles)?;
        let count = profiles.len();
        self.tables.write().drivers.extend(profiles);
        Ok(count)
    }

    async fn append_trips(&self, trips: Vec<TripFeatures>) -> Result<usize> {
        validate_trips(&trips)?;
        let count = trips.len();
        self.tables.write().trips.extend(trips);
        Ok(count)
    }

    #[instrument(skip(self, batch), fields(records = batch.len()))]
    async fn append_telemetry(&self, batch: Vec<RawTelemetryRecord>) -> Result<usize> {
        let rows = self.writer.prepare(batch)?;
        let count = rows.len();

        let mut tables = self.tables.write();
        check_trip_owners(&rows, |trip_id| tables.trip_owner(trip_id))?;

        let base = tables.next_seq;
        for mut row in rows {
            row.seq += base;
            let position = tables.telemetry.len();
            tables.by_trip.entry(row.trip_id.clone()).or_default().push(position);
            tables.telemetry.push(row);
        }
        tables.next_seq = base + count as u64;

        debug!(rows = count, first_seq = base, "Appended telemetry");
        Ok(count)
    }

    async fn drivers(&self) -> Result<Vec<DriverProfile>> {
        Ok(self.tables.read().drivers.clone())
    }

    async fn driver_profile(&self, driver_id: &str) -> Result<Option<DriverProfile>> {
        Ok(self
            .tables
            .read()
            .drivers
            .iter()
            .rev()
            .find(|p| p.driver_id == driver_id)
            .cloned())
    }

    async fn trips(&self) -> Result<Vec<TripFeatures>> {
        Ok(self.tables.read().trips.clone())
    }

    async fn trips_for_driver(&self, driver_id: &str) -> Result<Vec<TripFeatures>> {
        Ok(self
            .tables
            .read()
            .trips
            .iter()
            .filter(|t| t.driver_id == driver_id)
            .cloned()
            .collect())
    }

    async fn telemetry_for_trip(&self, trip_id: &str) -> Result<Vec<TelemetrySample>> {
        let rows = self.encrypted_rows_for_trip(trip_id).await?;
        Ok(self.reader.decrypt_rows(&rows))
    }

    async fn telemetry_for_driver(&self, driver_id: &str) -> Result<Vec<TelemetrySample>> {
        let tables = self.tables.read();
        Ok(self
            .reader
            .decrypt_rows(tables.telemetry.iter().filter(|r| r.driver_id == driver_id)))
    }

    async fn telemetry_all(&self) -> Result<Vec<TelemetrySample>> {
        let tables = self.tables.read();
        Ok(self.reader.decrypt_rows(&tables.telemetry))
    }

    async fn encrypted_rows_for_trip(&self, trip_id: &str) -> Result<Vec<EncryptedTelemetryRow>> {
        let tables = self.tables.read();
        Ok(tables
            .by_trip
            .get(trip_id)
            .map(|positions| {
                positions
                    .iter()
                    .filter_map(|&i| tables.telemetry.get(i).cloned())
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn stats(&self) -> Result<StoreStats> {
        let tables = self.tables.read();
        Ok(StoreStats {
            driver_rows: tables.drivers.len(),
            trip_rows: tables.trips.len(),
            telemetry_rows: tables.telemetry.len(),
            telemetry_trips: tables.by_trip.len(),
        })
    }
}
