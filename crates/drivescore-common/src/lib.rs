//! # Drivescore Common
//!
//! Shared record types, errors, and privacy primitives for the Drivescore
//! telematics pipeline.
//!
//! ## Core Types
//!
//! - [`TelemetrySample`] / [`RawTelemetryRecord`]: validated and wire-form vehicle readings
//! - [`TripFeatures`]: per-trip behavioral rollup
//! - [`DriverFeatures`] / [`DriverProfile`]: per-driver rollup plus static attributes
//! - [`RiskFeatureVector`]: fixed-schema input to the risk model
//! - [`RiskPremium`]: risk score and premium for one driver
//!
//! ## Privacy
//!
//! - [`crypto::codec`]: per-scalar encryption of coordinates at rest
//! - [`geo`]: coarse location cells stored in clear

pub mod crypto;
pub mod error;
pub mod geo;
pub mod types;

// Re-export commonly used types at crate root
pub use crypto::{EncryptedScalar, FieldCodec, KeyMaterial};
pub use error::{CryptoError, DrivescoreError, ModelError, Result, ValidationError};
pub use geo::{BucketConfig, CellId, GeoBucketer};
pub use types::{
    driver::{
        DriverFeatures, DriverProfile, RiskFeatureVector, VehicleType, FEATURE_NAMES,
        FEATURE_SCHEMA_VERSION,
    },
    premium::{RiskPremium, DEFAULT_BASE_PREMIUM},
    telemetry::{RawTelemetryRecord, RoadType, TelemetrySample},
    trip::TripFeatures,
};

/// Drivescore version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// mph/s per m/s²
pub const MS2_TO_MPHS: f64 = 2.23694;

/// Default harsh-event threshold (m/s²)
pub const HARSH_THRESHOLD_MS2: f64 = 3.0;

/// Gap assigned to the first sample of a trip (seconds)
pub const FIRST_SAMPLE_FALLBACK_SECS: f64 = 5.0;
