//! Core record types for Drivescore

pub mod driver;
pub mod premium;
pub mod telemetry;
pub mod trip;
