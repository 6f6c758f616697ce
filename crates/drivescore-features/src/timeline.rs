//! Daily harsh-event counts
//!
//! Uses the same threshold as trip aggregation, so the per-day totals sum to
//! the trip-level `num_harsh_*` counts.

use std::collections::BTreeMap;

use chrono::{Days, NaiveDate};
use drivescore_common::TelemetrySample;
use serde::{Deserialize, Serialize};

use crate::config::FeatureConfig;

/// Harsh events on one local calendar day
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HarshEventDay {
    pub date: NaiveDate,
    pub harsh_brakes: u32,
    pub harsh_accels: u32,
}

/// Count harsh events per day, from the first to the last sampled day.
///
/// Days inside the range without events are reported with zero counts.
pub fn harsh_event_timeline(samples: &[TelemetrySample], config: &FeatureConfig) -> Vec<HarshEventDay> {
    let threshold = config.harsh_threshold();
    let mut days: BTreeMap<NaiveDate, (u32, u32)> = BTreeMap::new();

    for sample in samples {
        let counts = days.entry(sample.timestamp.date_naive()).or_default();
        if sample.acceleration < -threshold {
            counts.0 += 1;
        } else if sample.acceleration > threshold {
            counts.1 += 1;
        }
    }

    let (Some(first), Some(last)) = (days.keys().next().copied(), days.keys().next_back().copied())
    else {
        return Vec::new();
    };

    let mut timeline = Vec::new();
    let mut day = first;
    while day <= last {
        let (harsh_brakes, harsh_accels) = days.get(&day).copied().unwrap_or_default();
        timeline.push(HarshEventDay {
            date: day,
            harsh_brakes,
            harsh_accels,
        });
        match day.checked_add_days(Days::new(1)) {
            Some(next) => day = next,
            None => break,
        }
    }
    timeline
}
