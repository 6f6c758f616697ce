//! # Drivescore Features
//!
//! Behavioral feature extraction for the Drivescore pipeline.
//!
//! ## Components
//!
//! - [`trip`]: samples of one trip to a [`TripFeatures`](drivescore_common::TripFeatures) record
//! - [`driver`]: duration-weighted rollup of a driver's trips
//! - [`batch`]: one task per trip or driver over a whole batch
//! - [`cache`]: digest-keyed memo of trip results
//! - [`timeline`]: daily harsh-event counts

pub mod batch;
pub mod cache;
pub mod config;
pub mod driver;
pub mod timeline;
pub mod trip;

pub use batch::{aggregate_drivers, aggregate_trips, group_by_driver, group_by_trip};
pub use cache::{input_digest, CacheMetrics, TripFeatureCache};
pub use config::FeatureConfig;
pub use driver::{aggregate_driver, DriverAccumulator};
pub use timeline::{harsh_event_timeline, HarshEventDay};
pub use trip::{aggregate_trip, ordered_samples, TripAccumulator};
