//! Parallel aggregation over many trips and drivers
//!
//! Trips are independent, and so are drivers, so each group runs as its own
//! blocking task. Output is ordered by id regardless of completion order.

use std::collections::{BTreeMap, HashMap};

use drivescore_common::{
    DriverFeatures, DriverProfile, DrivescoreError, Result, TelemetrySample, TripFeatures,
};
use tokio::task::JoinSet;
use tracing::{info, instrument};

use crate::config::FeatureConfig;
use crate::driver::aggregate_driver;
use crate::trip::aggregate_trip;

/// Group samples by trip id
pub fn group_by_trip(samples: Vec<TelemetrySample>) -> BTreeMap<String, Vec<TelemetrySample>> {
    let mut groups: BTreeMap<String, Vec<TelemetrySample>> = BTreeMap::new();
    for sample in samples {
        groups.entry(sample.trip_id.clone()).or_default().push(sample);
    }
    groups
}

/// Group trip records by driver id
pub fn group_by_driver(trips: Vec<TripFeatures>) -> BTreeMap<String, Vec<TripFeatures>> {
    let mut groups: BTreeMap<String, Vec<TripFeatures>> = BTreeMap::new();
    for trip in trips {
        groups.entry(trip.driver_id.clone()).or_default().push(trip);
    }
    groups
}

fn join_error(err: tokio::task::JoinError) -> DrivescoreError {
    DrivescoreError::Internal(format!("aggregation task failed: {}", err))
}

/// Aggregate every trip present in `samples`, one task per trip.
///
/// The first failing trip fails the whole call.
#[instrument(skip(samples, config), fields(samples = samples.len()))]
pub async fn aggregate_trips(
    samples: Vec<TelemetrySample>,
    config: &FeatureConfig,
) -> Result<Vec<TripFeatures>> {
    let groups = group_by_trip(samples);
    let mut tasks = JoinSet::new();
    for (_, trip_samples) in groups {
        let config = config.clone();
        tasks.spawn_blocking(move || aggregate_trip(&trip_samples, &config));
    }

    let mut trips = Vec::with_capacity(tasks.len());
    while let Some(joined) = tasks.join_next().await {
        trips.push(joined.map_err(join_error)??);
    }
    trips.sort_by(|a, b| a.trip_id.cmp(&b.trip_id));

    info!(trips = trips.len(), "Aggregated trips");
    Ok(trips)
}

/// Aggregate every driver that has trips or a profile, one task per driver.
///
/// Drivers known only from `profiles` get a record with zero drive metrics.
#[instrument(skip(trips, profiles), fields(trips = trips.len(), profiles = profiles.len()))]
pub async fn aggregate_drivers(
    trips: Vec<TripFeatures>,
    profiles: &[DriverProfile],
) -> Result<Vec<DriverFeatures>> {
    let mut groups = group_by_driver(trips);
    let profile_index: HashMap<&str, &DriverProfile> =
        profiles.iter().map(|p| (p.driver_id.as_str(), p)).collect();
    for profile in profiles {
        groups.entry(profile.driver_id.clone()).or_default();
    }

    let mut tasks = JoinSet::new();
    for (driver_id, driver_trips) in groups {
        let profile = profile_index.get(driver_id.as_str()).map(|p| (*p).clone());
        tasks.spawn_blocking(move || aggregate_driver(&driver_id, &driver_trips, profile.as_ref()));
    }

    let mut drivers = Vec::with_capacity(tasks.len());
    while let Some(joined) = tasks.join_next().await {
        drivers.push(joined.map_err(join_error)?);
    }
    drivers.sort_by(|a, b| a.driver_id.cmp(&b.driver_id));

    info!(drivers = drivers.len(), "Aggregated drivers");
    Ok(drivers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, FixedOffset, TimeZone};
    use drivescore_common::RoadType;

    fn samples() -> Vec<TelemetrySample> {
        let start = FixedOffset::east_opt(0)
            .unwrap()
            .with_ymd_and_hms(2024, 5, 2, 8, 0, 0)
            .unwrap();
        let mut out = Vec::new();
        for (trip, driver) in [("trip_b", "driver_1"), ("trip_a", "driver_1"), ("trip_c", "driver_2")] {
            for i in 0..4 {
                out.push(TelemetrySample::new(
                    trip,
                    driver,
                    start + Duration::seconds(i * 5),
                    25.0 + i as f64,
                    0.5,
                    RoadType::Highway,
                ));
            }
        }
        out
    }

    #[tokio::test]
    async fn test_aggregate_trips_sorted_by_id() {
        let trips = aggregate_trips(samples(), &FeatureConfig::default()).await.unwrap();
        let ids: Vec<&str> = trips.iter().map(|t| t.trip_id.as_str()).collect();
        assert_eq!(ids, vec!["trip_a", "trip_b", "trip_c"]);
        assert!(trips.iter().all(|t| t.highway_pct == 1.0));
    }

    #[tokio::test]
    async fn test_aggregate_trips_empty() {
        let trips = aggregate_trips(Vec::new(), &FeatureConfig::default()).await.unwrap();
        assert!(trips.is_empty());
    }

    #[tokio::test]
    async fn test_aggregate_trips_propagates_driver_mismatch() {
        let mut input = samples();
        input[0].driver_id = "driver_9".into();
        let result = aggregate_trips(input, &FeatureConfig::default()).await;
        assert!(matches!(result, Err(DrivescoreError::Validation(_))));
    }

    #[tokio::test]
    async fn test_aggregate_drivers_includes_profile_only_drivers() {
        let trips = aggregate_trips(samples(), &FeatureConfig::default()).await.unwrap();
        let profiles = vec![
            DriverProfile::unknown("driver_1").with_history(10, 0, 1),
            DriverProfile::unknown("driver_3"),
        ];
        let drivers = aggregate_drivers(trips, &profiles).await.unwrap();
        let ids: Vec<&str> = drivers.iter().map(|d| d.driver_id.as_str()).collect();
        assert_eq!(ids, vec!["driver_1", "driver_2", "driver_3"]);
        assert_eq!(drivers[0].num_trips, 2);
        assert_eq!(drivers[0].claims_weighted_score, 15);
        assert_eq!(drivers[2].num_trips, 0);
        assert_eq!(drivers[2].total_miles, 0.0);
    }
}
