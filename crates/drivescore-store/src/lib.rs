//! # Drivescore Store
//!
//! Append-only persistence for driver profiles, trip features and telemetry.
//! Exact coordinates are encrypted per value on write and decrypted per row
//! on read; a coarse H3 cell is kept in clear for location queries.
//!
//! ## Backends
//!
//! - [`InMemoryTelemetryStore`]: lock-guarded tables, for tests and embedding
//! - [`JsonlTelemetryStore`]: one JSON-lines file per record family

pub mod jsonl;
pub mod memory;
pub mod rows;
pub mod store;

pub use jsonl::{import_jsonl, JsonlTelemetryStore};
pub use memory::InMemoryTelemetryStore;
pub use rows::{check_trip_owners, validate_drivers, validate_trips, EncryptedTelemetryRow, TelemetryReader, TelemetryWriter};
pub use store::{StoreStats, TelemetryStore};
