//! Trip feature cache
//!
//! Keeps the last [`TripFeatures`] computed per trip together with a blake3
//! digest of the samples it came from. A trip is recomputed only when its
//! sample set changes; computation for one trip happens under that trip's
//! map entry, so concurrent callers never aggregate the same input twice.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use drivescore_common::{DrivescoreError, Result, TelemetrySample, TripFeatures, ValidationError};
use tokio::task::JoinSet;
use tracing::{debug, instrument};

use crate::batch::group_by_trip;
use crate::config::FeatureConfig;
use crate::trip::{aggregate_trip, ordered_samples};

/// Digest of the fields that feed trip aggregation, in aggregation order
pub fn input_digest(samples: &[TelemetrySample]) -> blake3::Hash {
    let mut hasher = blake3::Hasher::new();
    for sample in ordered_samples(samples) {
        hasher.update(sample.trip_id.as_bytes());
        hasher.update(&[0]);
        hasher.update(sample.driver_id.as_bytes());
        hasher.update(&[0]);
        hasher.update(&sample.seq.to_le_bytes());
        hasher.update(&sample.timestamp.timestamp_micros().to_le_bytes());
        hasher.update(&sample.timestamp.offset().local_minus_utc().to_le_bytes());
        hasher.update(&sample.speed.to_le_bytes());
        hasher.update(&sample.acceleration.to_le_bytes());
        hasher.update(sample.road_type.as_str().as_bytes());
        hasher.update(&[sample.engine_on as u8]);
    }
    hasher.finalize()
}

/// Cache counters
#[derive(Debug, Default)]
pub struct CacheMetrics {
    pub hits: AtomicU64,
    pub misses: AtomicU64,
}

#[derive(Debug, Clone)]
struct CachedTrip {
    digest: blake3::Hash,
    features: TripFeatures,
}

/// Per-trip memo of aggregation results.
///
/// Unbounded: one entry per trip ever aggregated, never evicted. Owners
/// that see many short-lived trips must call [`invalidate`](Self::invalidate)
/// or [`clear`](Self::clear) themselves.
pub struct TripFeatureCache {
    config: FeatureConfig,
    entries: DashMap<String, CachedTrip>,
    metrics: CacheMetrics,
}

impl TripFeatureCache {
    pub fn new(config: FeatureConfig) -> Self {
        Self {
            config,
            entries: DashMap::new(),
            metrics: CacheMetrics::default(),
        }
    }

    pub fn config(&self) -> &FeatureConfig {
        &self.config
    }

    /// Features for one trip, reusing the cached record if the samples are unchanged
    pub fn get_or_compute(&self, samples: &[TelemetrySample]) -> Result<TripFeatures> {
        let trip_id = samples
            .first()
            .map(|s| s.trip_id.clone())
            .ok_or(ValidationError::EmptyTrip)?;
        let digest = input_digest(samples);

        match self.entries.entry(trip_id) {
            Entry::Occupied(mut entry) => {
                if entry.get().digest == digest {
                    self.metrics.hits.fetch_add(1, Ordering::Relaxed);
                    return Ok(entry.get().features.clone());
                }
                self.metrics.misses.fetch_add(1, Ordering::Relaxed);
                debug!(trip_id = %entry.key(), "Trip samples changed, recomputing");
                let features = aggregate_trip(samples, &self.config)?;
                entry.insert(CachedTrip {
                    digest,
                    features: features.clone(),
                });
                Ok(features)
            }
            Entry::Vacant(entry) => {
                self.metrics.misses.fetch_add(1, Ordering::Relaxed);
                let features = aggregate_trip(samples, &self.config)?;
                entry.insert(CachedTrip {
                    digest,
                    features: features.clone(),
                });
                Ok(features)
            }
        }
    }

    /// Features for every trip in `samples`, one blocking task per trip
    #[instrument(skip(self, samples), fields(samples = samples.len()))]
    pub async fn refresh(self: &Arc<Self>, samples: Vec<TelemetrySample>) -> Result<Vec<TripFeatures>> {
        let mut tasks = JoinSet::new();
        for (_, trip_samples) in group_by_trip(samples) {
            let cache = Arc::clone(self);
            tasks.spawn_blocking(move || cache.get_or_compute(&trip_samples));
        }

        let mut trips = Vec::with_capacity(tasks.len());
        while let Some(joined) = tasks.join_next().await {
            let features = joined
                .map_err(|e| DrivescoreError::Internal(format!("aggregation task failed: {}", e)))??;
            trips.push(features);
        }
        trips.sort_by(|a, b| a.trip_id.cmp(&b.trip_id));
        Ok(trips)
    }

    /// Cached record for a trip, if any
    pub fn get(&self, trip_id: &str) -> Option<TripFeatures> {
        self.entries.get(trip_id).map(|e| e.features.clone())
    }

    pub fn invalidate(&self, trip_id: &str) {
        self.entries.remove(trip_id);
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn metrics(&self) -> &CacheMetrics {
        &self.metrics
    }
}

impl Default for TripFeatureCache {
    fn default() -> Self {
        Self::new(FeatureConfig::default())
    }
}
