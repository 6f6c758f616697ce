//! Driver feature aggregation
//!
//! Rolls a driver's trips into one [`DriverFeatures`] record:
//!
//! - sums (`total_miles`, `total_harsh_*`) are plain sums
//! - per-trip means (`avg_trip_*`, `avg_num_harsh_*`) are unweighted
//! - every `*_overall` average is weighted by `trip_duration_min`
//!
//! A driver with no drive time gets 0 for the weighted fields.

use drivescore_common::{DriverFeatures, DriverProfile, TripFeatures};
use tracing::{instrument, warn};

/// Running totals over one driver's trips
#[derive(Debug, Clone, Default)]
pub struct DriverAccumulator {
    num_trips: u32,
    total_miles: f64,
    total_minutes: f64,
    max_speed: f64,
    harsh_brakes: u32,
    harsh_accels: u32,
    weighted_speed: f64,
    weighted_night: f64,
    weighted_idling: f64,
    weighted_urban: f64,
    weighted_highway: f64,
}

impl DriverAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_trip(&mut self, trip: &TripFeatures) {
        let minutes = trip.trip_duration_min;

        if self.num_trips == 0 || trip.max_speed > self.max_speed {
            self.max_speed = trip.max_speed;
        }
        self.num_trips += 1;
        self.total_miles += trip.total_miles;
        self.total_minutes += minutes;
        self.harsh_brakes = self.harsh_brakes.saturating_add(trip.num_harsh_brakes);
        self.harsh_accels = self.harsh_accels.saturating_add(trip.num_harsh_accels);

        self.weighted_speed += trip.avg_speed * minutes;
        self.weighted_night += trip.night_trip_pct * minutes;
        self.weighted_idling += trip.idling_pct * minutes;
        self.weighted_urban += trip.urban_pct * minutes;
        self.weighted_highway += trip.highway_pct * minutes;
    }

    pub fn num_trips(&self) -> u32 {
        self.num_trips
    }

    /// Build the record, merging static attributes from `profile`
    pub fn finish(self, profile: &DriverProfile) -> DriverFeatures {
        let per_trip = |total: f64| {
            if self.num_trips > 0 {
                total / self.num_trips as f64
            } else {
                0.0
            }
        };
        let weighted = |sum: f64| {
            if self.total_minutes > 0.0 {
                sum / self.total_minutes
            } else {
                0.0
            }
        };

        DriverFeatures {
            driver_id: profile.driver_id.clone(),
            num_trips: self.num_trips,
            total_miles: self.total_miles,
            total_drive_time_min: self.total_minutes,
            avg_trip_duration_min: per_trip(self.total_minutes),
            avg_trip_miles: per_trip(self.total_miles),
            avg_speed_overall: weighted(self.weighted_speed),
            max_speed_overall: self.max_speed,
            total_harsh_brakes: self.harsh_brakes,
            total_harsh_accels: self.harsh_accels,
            avg_num_harsh_brakes: per_trip(self.harsh_brakes as f64),
            avg_num_harsh_accels: per_trip(self.harsh_accels as f64),
            night_trip_pct_overall: weighted(self.weighted_night),
            idling_pct_overall: weighted(self.weighted_idling),
            urban_pct_overall: weighted(self.weighted_urban),
            highway_pct_overall: weighted(self.weighted_highway),
            years_driving: profile.years_driving,
            num_claims: profile.num_claims,
            num_violations: profile.num_violations,
            vehicle_age: profile.vehicle_age,
            vehicle_type: profile.vehicle_type,
            insurance_policy_length_years: profile.insurance_policy_length_years,
            claims_weighted_score: profile.claims_weighted_score(),
        }
    }
}

/// Aggregate one driver's trips.
///
/// Trips recorded for a different driver are skipped with a warning. A
/// missing profile yields zero / `unknown` static attributes.
#[instrument(skip(trips, profile), fields(trips = trips.len()))]
pub fn aggregate_driver(
    driver_id: &str,
    trips: &[TripFeatures],
    profile: Option<&DriverProfile>,
) -> DriverFeatures {
    let mut acc = DriverAccumulator::new();
    for trip in trips {
        if trip.driver_id != driver_id {
            warn!(trip_id = %trip.trip_id, owner = %trip.driver_id, "Skipping trip of another driver");
            continue;
        }
        acc.add_trip(trip);
    }

    if acc.num_trips() == 0 {
        warn!(driver_id, "Driver has no trips, drive metrics set to 0");
    }

    let profile = match profile {
        Some(p) if p.driver_id == driver_id => p.clone(),
        Some(p) => {
            warn!(driver_id, profile_driver = %p.driver_id, "Profile belongs to another driver, ignored");
            DriverProfile::unknown(driver_id)
        }
        None => DriverProfile::unknown(driver_id),
    };

    acc.finish(&profile)
}

#[cfg(test)]
mod tests {
    use super::*;
    use drivescore_common::VehicleType;
    use proptest::prelude::*;

    fn trip(id: &str, minutes: f64, night: f64) -> TripFeatures {
        TripFeatures {
            trip_id: id.into(),
            driver_id: "driver_1".into(),
            trip_duration_min: minutes,
            total_miles: minutes / 2.0,
            avg_speed: 30.0,
            max_speed: 50.0,
            num_harsh_brakes: 1,
            num_harsh_accels: 0,
            idling_pct: 0.1,
            night_trip_pct: night,
            urban_pct: 0.5,
            highway_pct: 0.25,
        }
    }

    #[test]
    fn test_night_share_is_duration_weighted() {
        let trips = vec![trip("short", 10.0, 1.0), trip("long", 90.0, 0.0)];
        let features = aggregate_driver("driver_1", &trips, None);
        assert!((features.night_trip_pct_overall - 0.10).abs() < 1e-12);
        assert_eq!(features.num_trips, 2);
        assert!((features.total_drive_time_min - 100.0).abs() < 1e-12);
        assert!((features.avg_trip_duration_min - 50.0).abs() < 1e-12);
        assert_eq!(features.total_harsh_brakes, 2);
        assert!((features.avg_num_harsh_brakes - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_zero_drive_time_yields_zero_shares() {
        let trips = vec![trip("a", 0.0, 1.0), trip("b", 0.0, 0.5)];
        let features = aggregate_driver("driver_1", &trips, None);
        assert_eq!(features.night_trip_pct_overall, 0.0);
        assert_eq!(features.idling_pct_overall, 0.0);
        assert_eq!(features.urban_pct_overall, 0.0);
        assert_eq!(features.highway_pct_overall, 0.0);
        assert_eq!(features.avg_speed_overall, 0.0);
    }

    #[test]
    fn test_no_trips_keeps_profile() {
        let profile = DriverProfile::unknown("driver_1")
            .with_history(8, 1, 2)
            .with_vehicle(VehicleType::Truck, 4);
        let features = aggregate_driver("driver_1", &[], Some(&profile));
        assert_eq!(features.num_trips, 0);
        assert_eq!(features.avg_trip_miles, 0.0);
        assert_eq!(features.vehicle_type, VehicleType::Truck);
        assert_eq!(features.claims_weighted_score, 25 + 30);
    }

    #[test]
    fn test_missing_profile_defaults() {
        let features = aggregate_driver("driver_1", &[trip("a", 10.0, 0.0)], None);
        assert_eq!(features.years_driving, 0);
        assert_eq!(features.vehicle_type, VehicleType::Unknown);
        assert_eq!(features.claims_weighted_score, 0);
    }

    #[test]
    fn test_other_drivers_trips_ignored() {
        let mut foreign = trip("x", 60.0, 1.0);
        foreign.driver_id = "driver_2".into();
        let features = aggregate_driver("driver_1", &[trip("a", 10.0, 0.0), foreign], None);
        assert_eq!(features.num_trips, 1);
        assert_eq!(features.night_trip_pct_overall, 0.0);
    }

    proptest! {
        #[test]
        fn prop_equal_durations_match_plain_mean(
            nights in prop::collection::vec(0.0f64..=1.0, 1..20),
            minutes in 0.5f64..120.0,
        ) {
            let trips: Vec<TripFeatures> = nights
                .iter()
                .enumerate()
                .map(|(i, n)| trip(&format!("t{}", i), minutes, *n))
                .collect();
            let features = aggregate_driver("driver_1", &trips, None);
            let mean = nights.iter().sum::<f64>() / nights.len() as f64;
            prop_assert!((features.night_trip_pct_overall - mean).abs() < 1e-9);
        }

        #[test]
        fn prop_overall_shares_bounded(
            rows in prop::collection::vec((0.0f64..300.0, 0.0f64..=1.0), 0..20),
        ) {
            let trips: Vec<TripFeatures> = rows
                .iter()
                .enumerate()
                .map(|(i, (m, n))| trip(&format!("t{}", i), *m, *n))
                .collect();
            let features = aggregate_driver("driver_1", &trips, None);
            prop_assert!((0.0..=1.0 + 1e-12).contains(&features.night_trip_pct_overall));
            prop_assert!(!features.idling_pct_overall.is_nan());
        }
    }
}
