//! JSON-lines telemetry store
//!
//! One append-only file per record family under a directory:
//!
//! - `drivers.jsonl`: [`DriverProfile`] rows
//! - `trips.jsonl`: [`TripFeatures`] rows
//! - `telemetry.jsonl`: [`EncryptedTelemetryRow`] rows
//!
//! A batch is fully serialized before a single append write, and writes are
//! serialized through one async mutex that also owns the next sequence number
//! and the driver on record for every stored trip. A failed write is cut back
//! to the previous file length. An unterminated last line is a torn write:
//! `open` truncates it and readers skip it.

use std::collections::HashMap;
use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use drivescore_common::{
    DriverProfile, DrivescoreError, FieldCodec, GeoBucketer, RawTelemetryRecord, Result,
    TelemetrySample, TripFeatures,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::rows::{check_trip_owners, validate_drivers, validate_trips, EncryptedTelemetryRow, TelemetryReader, TelemetryWriter};
use crate::store::{StoreStats, TelemetryStore};

const DRIVERS_FILE: &str = "drivers.jsonl";
const TRIPS_FILE: &str = "trips.jsonl";
const TELEMETRY_FILE: &str = "telemetry.jsonl";

/// Parse JSON-lines telemetry records (blank lines skipped).
///
/// Records are returned as-is; validation happens on append.
pub fn import_jsonl<R: BufRead>(reader: R) -> Result<Vec<RawTelemetryRecord>> {
    parse_lines(reader.lines(), "input")
}

fn parse_lines<T, I>(lines: I, source: &str) -> Result<Vec<T>>
where
    T: DeserializeOwned,
    I: IntoIterator<Item = std::io::Result<String>>,
{
    let mut out = Vec::new();
    for (index, line) in lines.into_iter().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let value = serde_json::from_str(&line).map_err(|e| {
            DrivescoreError::Serialization(format!("{} line {}: {}", source, index + 1, e))
        })?;
        out.push(value);
    }
    Ok(out)
}

/// Length of `text` up to and including its last newline
fn complete_len(text: &[u8]) -> usize {
    text.iter().rposition(|&b| b == b'\n').map_or(0, |i| i + 1)
}

/// Append target that can be cut back after a failed write
#[async_trait]
trait AppendTarget: AsyncWrite + Unpin + Send {
    async fn current_len(&self) -> std::io::Result<u64>;
    async fn truncate(&mut self, len: u64) -> std::io::Result<()>;
    async fn sync(&mut self) -> std::io::Result<()>;
}

#[async_trait]
impl AppendTarget for tokio::fs::File {
    async fn current_len(&self) -> std::io::Result<u64> {
        Ok(self.metadata().await?.len())
    }

    async fn truncate(&mut self, len: u64) -> std::io::Result<()> {
        self.set_len(len).await?;
        self.sync_data().await
    }

    async fn sync(&mut self) -> std::io::Result<()> {
        self.sync_data().await
    }
}

/// Write `bytes` in full or leave the target at its previous length
async fn append_or_rollback<T: AppendTarget>(target: &mut T, bytes: &[u8]) -> std::io::Result<()> {
    let original_len = target.current_len().await?;
    let written = async {
        target.write_all(bytes).await?;
        target.flush().await?;
        target.sync().await
    }
    .await;

    if let Err(e) = written {
        if let Err(rollback) = target.truncate(original_len).await {
            warn!(original_len, error = %rollback, "Failed to roll back partial append");
        }
        return Err(e);
    }
    Ok(())
}

/// State owned by the write lock
#[derive(Debug, Default)]
struct WriteState {
    next_seq: u64,
    /// Driver on record for each stored trip
    trip_owners: HashMap<String, String>,
}

/// File-backed storage implementation
pub struct JsonlTelemetryStore {
    dir: PathBuf,
    writer: TelemetryWriter,
    reader: TelemetryReader,
    state: Mutex<WriteState>,
}

impl JsonlTelemetryStore {
    /// Open (creating if needed) a store directory
    #[instrument(skip_all, fields(dir = %dir.as_ref().display()))]
    pub async fn open(dir: impl AsRef<Path>, codec: Arc<FieldCodec>, bucketer: GeoBucketer) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&dir).await.map_err(|e| {
            DrivescoreError::Storage(format!("failed to create {}: {}", dir.display(), e))
        })?;

        let store = Self {
            writer: TelemetryWriter::new(codec.clone(), bucketer),
            reader: TelemetryReader::new(codec),
            state: Mutex::new(WriteState::default()),
            dir,
        };
        for file in [DRIVERS_FILE, TRIPS_FILE, TELEMETRY_FILE] {
            store.repair_tail(file).await?;
        }

        let rows: Vec<EncryptedTelemetryRow> = store.read_all(TELEMETRY_FILE).await?;
        let mut state = store.state.lock().await;
        state.next_seq = rows.iter().map(|r| r.seq + 1).max().unwrap_or(0);
        for row in &rows {
            state
                .trip_owners
                .entry(row.trip_id.clone())
                .or_insert_with(|| row.driver_id.clone());
        }
        info!(
            telemetry_rows = rows.len(),
            trips = state.trip_owners.len(),
            next_seq = state.next_seq,
            "Opened telemetry store"
        );
        drop(state);

        Ok(store)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Truncate an unterminated last line left by an interrupted write
    async fn repair_tail(&self, file: &str) -> Result<()> {
        let path = self.dir.join(file);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => {
                return Err(DrivescoreError::Storage(format!(
                    "failed to read {}: {}",
                    path.display(),
                    e
                )))
            }
        };
        let keep = complete_len(&bytes);
        if keep == bytes.len() {
            return Ok(());
        }

        warn!(file, dropped_bytes = bytes.len() - keep, "Truncating torn trailing line");
        let mut handle = tokio::fs::OpenOptions::new()
            .write(true)
            .open(&path)
            .await
            .map_err(|e| DrivescoreError::Storage(format!("failed to open {}: {}", path.display(), e)))?;
        handle.truncate(keep as u64).await.map_err(|e| {
            DrivescoreError::Storage(format!("failed to truncate {}: {}", path.display(), e))
        })?;
        Ok(())
    }

    async fn read_all<T: DeserializeOwned>(&self, file: &str) -> Result<Vec<T>> {
        let path = self.dir.join(file);
        let mut text = match tokio::fs::read_to_string(&path).await {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(DrivescoreError::Storage(format!(
                    "failed to read {}: {}",
                    path.display(),
                    e
                )))
            }
        };
        // an append may be in flight
        let complete = complete_len(text.as_bytes());
        if complete < text.len() {
            debug!(file, pending_bytes = text.len() - complete, "Skipping unterminated last line");
            text.truncate(complete);
        }
        parse_lines(text.lines().map(|l| Ok::<_, std::io::Error>(l.to_string())), file)
    }

    async fn append_rows<T: Serialize>(&self, file: &str, rows: &[T]) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }
        let mut buffer = String::new();
        for row in rows {
            buffer.push_str(&serde_json::to_string(row)?);
            buffer.push('\n');
        }

        let path = self.dir.join(file);
        let mut handle = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|e| DrivescoreError::Storage(format!("failed to open {}: {}", path.display(), e)))?;
        append_or_rollback(&mut handle, buffer.as_bytes())
            .await
            .map_err(|e| DrivescoreError::Storage(format!("failed to append to {}: {}", path.display(), e)))
    }

    async fn telemetry_rows(&self) -> Result<Vec<EncryptedTelemetryRow>> {
        self.read_all(TELEMETRY_FILE).await
    }
}

#[async_trait]
impl TelemetryStore for JsonlTelemetryStore {
    async fn append_drivers(&self, profiles: Vec<DriverProfile>) -> Result<usize> {
        validate_drivers(&profiles)?;
        let _guard = self.state.lock().await;
        self.append_rows(DRIVERS_FILE, &profiles).await?;
        Ok(profiles.len())
    }

    async fn append_trips(&self, trips: Vec<TripFeatures>) -> Result<usize> {
        validate_trips(&trips)?;
        let _guard = self.state.lock().await;
        self.append_rows(TRIPS_FILE, &trips).await?;
        Ok(trips.len())
    }

    #[instrument(skip(self, batch), fields(records = batch.len()))]
    async fn append_telemetry(&self, batch: Vec<RawTelemetryRecord>) -> Result<usize> {
        let mut rows = self.writer.prepare(batch)?;

        let mut state = self.state.lock().await;
        check_trip_owners(&rows, |trip_id| state.trip_owners.get(trip_id).map(String::as_str))?;

        let base = state.next_seq;
        for row in rows.iter_mut() {
            row.seq += base;
        }
        self.append_rows(TELEMETRY_FILE, &rows).await?;
        state.next_seq = base + rows.len() as u64;
        for row in &rows {
            state
                .trip_owners
                .entry(row.trip_id.clone())
                .or_insert_with(|| row.driver_id.clone());
        }

        debug!(rows = rows.len(), first_seq = base, "Appended telemetry");
        Ok(rows.len())
    }

    async fn drivers(&self) -> Result<Vec<DriverProfile>> {
        self.read_all(DRIVERS_FILE).await
    }

    async fn driver_profile(&self, driver_id: &str) -> Result<Option<DriverProfile>> {
        let drivers: Vec<DriverProfile> = self.read_all(DRIVERS_FILE).await?;
        Ok(drivers.into_iter().rev().find(|p| p.driver_id == driver_id))
    }

    async fn trips(&self) -> Result<Vec<TripFeatures>> {
        self.read_all(TRIPS_FILE).await
    }

    async fn trips_for_driver(&self, driver_id: &str) -> Result<Vec<TripFeatures>> {
        let trips: Vec<TripFeatures> = self.read_all(TRIPS_FILE).await?;
        Ok(trips.into_iter().filter(|t| t.driver_id == driver_id).collect())
    }

    async fn telemetry_for_trip(&self, trip_id: &str) -> Result<Vec<TelemetrySample>> {
        let rows = self.encrypted_rows_for_trip(trip_id).await?;
        Ok(self.reader.decrypt_rows(&rows))
    }

    async fn telemetry_for_driver(&self, driver_id: &str) -> Result<Vec<TelemetrySample>> {
        let rows = self.telemetry_rows().await?;
        Ok(self
            .reader
            .decrypt_rows(rows.iter().filter(|r| r.driver_id == driver_id)))
    }

    async fn telemetry_all(&self) -> Result<Vec<TelemetrySample>> {
        let rows = self.telemetry_rows().await?;
        Ok(self.reader.decrypt_rows(&rows))
    }

    async fn encrypted_rows_for_trip(&self, trip_id: &str) -> Result<Vec<EncryptedTelemetryRow>> {
        let rows = self.telemetry_rows().await?;
        Ok(rows.into_iter().filter(|r| r.trip_id == trip_id).collect())
    }

    async fn stats(&self) -> Result<StoreStats> {
        let drivers: Vec<DriverProfile> = self.read_all(DRIVERS_FILE).await?;
        let trips: Vec<TripFeatures> = self.read_all(TRIPS_FILE).await?;
        let rows = self.telemetry_rows().await?;
        let mut trip_ids: Vec<&str> = rows.iter().map(|r| r.trip_id.as_str()).collect();
        trip_ids.sort_unstable();
        trip_ids.dedup();

        Ok(StoreStats {
            driver_rows: drivers.len(),
            trip_rows: trips.len(),
            telemetry_rows: rows.len(),
            telemetry_trips: trip_ids.len(),
        })
    }
}
