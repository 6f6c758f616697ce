//! Trip-level behavioral features

use serde::{Deserialize, Serialize};

/// Features derived from the samples of one trip.
///
/// Produced once per trip by the trip aggregator and never edited; a new
/// record comes only from re-running aggregation. All `*_pct` fields are
/// fractions in `[0, 1]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TripFeatures {
    pub trip_id: String,
    pub driver_id: String,
    /// Sum of inter-sample gaps, in minutes
    pub trip_duration_min: f64,
    /// Distance integrated from speed over the gaps
    pub total_miles: f64,
    /// Mean sample speed (mph)
    pub avg_speed: f64,
    /// Max sample speed (mph)
    pub max_speed: f64,
    pub num_harsh_brakes: u32,
    pub num_harsh_accels: u32,
    /// Share of trip time spent slow with the engine running
    pub idling_pct: f64,
    /// Share of samples taken at night
    pub night_trip_pct: f64,
    /// Share of samples on city roads
    pub urban_pct: f64,
    /// Share of samples on highways
    pub highway_pct: f64,
}

impl TripFeatures {
    /// Check the record invariants (pct bounds, non-negative duration)
    pub fn is_well_formed(&self) -> bool {
        let in_unit = |v: f64| (0.0..=1.0).contains(&v);
        self.trip_duration_min >= 0.0
            && in_unit(self.idling_pct)
            && in_unit(self.night_trip_pct)
            && in_unit(self.urban_pct)
            && in_unit(self.highway_pct)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_well_formed_bounds() {
        let mut trip = TripFeatures {
            trip_id: "t".into(),
            driver_id: "d".into(),
            trip_duration_min: 10.0,
            total_miles: 5.0,
            avg_speed: 30.0,
            max_speed: 45.0,
            num_harsh_brakes: 0,
            num_harsh_accels: 1,
            idling_pct: 0.1,
            night_trip_pct: 0.0,
            urban_pct: 1.0,
            highway_pct: 0.0,
        };
        assert!(trip.is_well_formed());

        trip.urban_pct = 1.2;
        assert!(!trip.is_well_formed());
    }

    #[test]
    fn test_serde_field_names() {
        let json = r#"{
            "trip_id": "driver_1_trip_1", "driver_id": "driver_1",
            "trip_duration_min": 12.5, "total_miles": 7.25,
            "avg_speed": 34.8, "max_speed": 71.0,
            "num_harsh_brakes": 2, "num_harsh_accels": 0,
            "idling_pct": 0.05, "night_trip_pct": 0.0,
            "urban_pct": 0.4, "highway_pct": 0.2
        }"#;
        let trip: TripFeatures = serde_json::from_str(json).unwrap();
        assert_eq!(trip.num_harsh_brakes, 2);
        assert!(trip.is_well_formed());
    }
}
