//! # Drivescore Pipeline
//!
//! Configuration loading and the [`ScoringPipeline`] that turns raw vehicle
//! telemetry into per-driver risk scores and premiums. This is a library:
//! the surrounding service owns the HTTP surface, retries and scheduling.

pub mod config;
pub mod pipeline;

pub use config::{PipelineConfig, DEFAULT_KEY_FILE};
pub use pipeline::{ScoringPipeline, ScoringReport};

// Re-exports for callers that only depend on the pipeline crate
pub use drivescore_common::{DriverFeatures, DriverProfile, RawTelemetryRecord, RiskPremium, TripFeatures};
pub use drivescore_pricing::{FleetSummary, RiskModel};
