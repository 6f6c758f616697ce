//! Trip feature aggregation
//!
//! Turns the samples of one trip into a [`TripFeatures`] record. Samples are
//! put in a total order first, so the result does not depend on arrival
//! order; the gap scan after that is sequential.

use chrono::{DateTime, FixedOffset, Timelike};
use drivescore_common::{Result, RoadType, TelemetrySample, TripFeatures, ValidationError};
use tracing::{debug, instrument, warn};

use crate::config::FeatureConfig;

/// Samples in aggregation order: timestamp, then ingestion sequence.
///
/// Samples that were never stored all carry `seq = 0`; the reading itself
/// breaks any remaining tie.
pub fn ordered_samples(samples: &[TelemetrySample]) -> Vec<&TelemetrySample> {
    let mut ordered: Vec<&TelemetrySample> = samples.iter().collect();
    ordered.sort_by(|a, b| {
        a.timestamp
            .cmp(&b.timestamp)
            .then(a.seq.cmp(&b.seq))
            .then(a.speed.total_cmp(&b.speed))
            .then(a.acceleration.total_cmp(&b.acceleration))
            .then(a.road_type.cmp(&b.road_type))
            .then(a.engine_on.cmp(&b.engine_on))
    });
    ordered
}

/// Running totals over the ordered samples of one trip
#[derive(Debug, Clone)]
pub struct TripAccumulator {
    trip_id: String,
    driver_id: String,
    harsh_threshold: f64,
    idle_speed_mph: f64,
    total_secs: f64,
    total_miles: f64,
    idle_secs: f64,
    speed_sum: f64,
    max_speed: f64,
    sample_count: u64,
    harsh_brakes: u32,
    harsh_accels: u32,
    night_samples: u64,
    city_samples: u64,
    highway_samples: u64,
}

impl TripAccumulator {
    pub fn new(trip_id: impl Into<String>, driver_id: impl Into<String>, config: &FeatureConfig) -> Self {
        Self {
            trip_id: trip_id.into(),
            driver_id: driver_id.into(),
            harsh_threshold: config.harsh_threshold(),
            idle_speed_mph: config.idle_speed_mph,
            total_secs: 0.0,
            total_miles: 0.0,
            idle_secs: 0.0,
            speed_sum: 0.0,
            max_speed: 0.0,
            sample_count: 0,
            harsh_brakes: 0,
            harsh_accels: 0,
            night_samples: 0,
            city_samples: 0,
            highway_samples: 0,
        }
    }

    /// Fold one sample with its gap (seconds) to the previous one
    pub fn add_sample(&mut self, sample: &TelemetrySample, time_diff_secs: f64, is_night: bool) {
        self.total_secs += time_diff_secs;
        self.total_miles += sample.speed * time_diff_secs / 3600.0;
        if sample.engine_on && sample.speed < self.idle_speed_mph {
            self.idle_secs += time_diff_secs;
        }

        self.speed_sum += sample.speed;
        if self.sample_count == 0 || sample.speed > self.max_speed {
            self.max_speed = sample.speed;
        }
        self.sample_count += 1;

        if sample.acceleration < -self.harsh_threshold {
            self.harsh_brakes += 1;
        } else if sample.acceleration > self.harsh_threshold {
            self.harsh_accels += 1;
        }

        if is_night {
            self.night_samples += 1;
        }
        match sample.road_type {
            RoadType::City => self.city_samples += 1,
            RoadType::Highway => self.highway_samples += 1,
            RoadType::Residential => {}
        }
    }

    pub fn sample_count(&self) -> u64 {
        self.sample_count
    }

    pub fn finish(self) -> TripFeatures {
        let samples = self.sample_count.max(1) as f64;
        let idling_pct = if self.total_secs > 0.0 {
            (self.idle_secs / self.total_secs).min(1.0)
        } else {
            warn!(trip_id = %self.trip_id, "Trip has zero duration, idling share set to 0");
            0.0
        };

        TripFeatures {
            trip_id: self.trip_id,
            driver_id: self.driver_id,
            trip_duration_min: self.total_secs / 60.0,
            total_miles: self.total_miles,
            avg_speed: self.speed_sum / samples,
            max_speed: self.max_speed,
            num_harsh_brakes: self.harsh_brakes,
            num_harsh_accels: self.harsh_accels,
            idling_pct,
            night_trip_pct: self.night_samples as f64 / samples,
            urban_pct: self.city_samples as f64 / samples,
            highway_pct: self.highway_samples as f64 / samples,
        }
    }
}

/// Aggregate the samples of a single trip.
///
/// Fails when `samples` is empty, spans more than one trip, or assigns the
/// trip to more than one driver.
#[instrument(skip(samples, config), fields(samples = samples.len()))]
pub fn aggregate_trip(samples: &[TelemetrySample], config: &FeatureConfig) -> Result<TripFeatures> {
    let first = samples.first().ok_or(ValidationError::EmptyTrip)?;

    for sample in samples {
        if sample.trip_id != first.trip_id {
            return Err(ValidationError::MixedTrip {
                expected: first.trip_id.clone(),
                actual: sample.trip_id.clone(),
            }
            .into());
        }
        if sample.driver_id != first.driver_id {
            return Err(ValidationError::DriverMismatch {
                trip_id: first.trip_id.clone(),
                expected: first.driver_id.clone(),
                actual: sample.driver_id.clone(),
            }
            .into());
        }
    }

    let mut acc = TripAccumulator::new(&first.trip_id, &first.driver_id, config);
    let mut previous: Option<DateTime<FixedOffset>> = None;
    for sample in ordered_samples(samples) {
        let time_diff = match previous {
            None => config.first_sample_secs,
            Some(prev) => (sample.timestamp - prev).num_milliseconds() as f64 / 1000.0,
        };
        acc.add_sample(sample, time_diff, config.is_night_hour(sample.timestamp.hour()));
        previous = Some(sample.timestamp);
    }

    let features = acc.finish();
    debug!(
        trip_id = %features.trip_id,
        duration_min = features.trip_duration_min,
        miles = features.total_miles,
        "Aggregated trip"
    );
    Ok(features)
}
