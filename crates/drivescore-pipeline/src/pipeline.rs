//! End-to-end scoring pipeline
//!
//! Wires the store, the feature aggregators and the pricing stage:
//!
//! ```text
//! raw telemetry -> store (encrypt + bucket) -> trip features -> driver features -> risk -> premium
//! ```
//!
//! Trip features are derived from stored telemetry through a digest-keyed
//! cache. Trip records appended directly to the store (for trips whose
//! telemetry lives elsewhere) are merged in when a driver is rolled up.

use std::collections::BTreeMap;
use std::io::BufRead;
use std::sync::Arc;

use drivescore_common::{
    DriverFeatures, DriverProfile, DrivescoreError, FieldCodec, GeoBucketer, KeyMaterial,
    RawTelemetryRecord, Result, RiskPremium, TripFeatures,
};
use drivescore_features::{
    aggregate_driver, aggregate_drivers, harsh_event_timeline, HarshEventDay, TripFeatureCache,
};
use drivescore_pricing::{FleetSummary, LinearRiskModel, PremiumCalculator, RiskModel, RiskScorer};
use drivescore_store::{import_jsonl, InMemoryTelemetryStore, JsonlTelemetryStore, TelemetryStore};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::config::PipelineConfig;

/// Output of [`ScoringPipeline::score_all`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringReport {
    pub drivers: Vec<DriverFeatures>,
    pub premiums: Vec<RiskPremium>,
    pub summary: FleetSummary,
}

/// Store → features → pricing
pub struct ScoringPipeline {
    store: Arc<dyn TelemetryStore>,
    scorer: RiskScorer,
    calculator: PremiumCalculator,
    cache: Arc<TripFeatureCache>,
}

impl ScoringPipeline {
    /// Create a pipeline from explicit collaborators
    pub fn new(
        config: &PipelineConfig,
        store: Arc<dyn TelemetryStore>,
        model: Arc<dyn RiskModel>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            store,
            scorer: RiskScorer::new(model),
            calculator: PremiumCalculator::new(config.premium.clone()),
            cache: Arc::new(TripFeatureCache::new(config.features.clone())),
        })
    }

    /// Load key, store and model as configured. Any failure here is fatal.
    #[instrument(skip(config))]
    pub async fn from_config(config: PipelineConfig) -> Result<Self> {
        let key = KeyMaterial::load(&config.key_file)?;
        let codec = Arc::new(FieldCodec::new(&key));
        let bucketer = GeoBucketer::new(&config.bucket)?;

        let store: Arc<dyn TelemetryStore> = match &config.store_dir {
            Some(dir) => Arc::new(JsonlTelemetryStore::open(dir, codec, bucketer).await?),
            None => Arc::new(InMemoryTelemetryStore::new(codec, bucketer)),
        };

        let model_file = config.model_file.as_ref().ok_or_else(|| {
            DrivescoreError::Config("no risk model configured (DRIVESCORE_MODEL_FILE)".to_string())
        })?;
        let model: Arc<dyn RiskModel> = Arc::new(LinearRiskModel::load(model_file)?);

        info!(
            persistent = config.store_dir.is_some(),
            resolution = config.bucket.resolution,
            "Scoring pipeline initialized"
        );
        Self::new(&config, store, model)
    }

    pub fn store(&self) -> &Arc<dyn TelemetryStore> {
        &self.store
    }

    pub fn cache(&self) -> &Arc<TripFeatureCache> {
        &self.cache
    }

    /// Append a telemetry batch (validated whole)
    pub async fn ingest(&self, batch: Vec<RawTelemetryRecord>) -> Result<usize> {
        self.store.append_telemetry(batch).await
    }

    /// Parse and append a JSON-lines telemetry batch
    pub async fn ingest_jsonl<R: BufRead>(&self, reader: R) -> Result<usize> {
        let batch = import_jsonl(reader)?;
        self.ingest(batch).await
    }

    /// Append driver profiles
    pub async fn register_drivers(&self, profiles: Vec<DriverProfile>) -> Result<usize> {
        self.store.append_drivers(profiles).await
    }

    /// Features of one trip from its stored telemetry; `None` when the trip has none
    pub async fn trip_features(&self, trip_id: &str) -> Result<Option<TripFeatures>> {
        let samples = self.store.telemetry_for_trip(trip_id).await?;
        if samples.is_empty() {
            return Ok(None);
        }
        let cache = Arc::clone(&self.cache);
        let features = tokio::task::spawn_blocking(move || cache.get_or_compute(&samples))
            .await
            .map_err(|e| DrivescoreError::Internal(format!("aggregation task failed: {}", e)))??;
        Ok(Some(features))
    }

    /// Features of every trip with stored telemetry
    pub async fn rebuild_trip_features(&self) -> Result<Vec<TripFeatures>> {
        let samples = self.store.telemetry_all().await?;
        self.cache.refresh(samples).await
    }

    /// Compute and append trip records for the given trips.
    ///
    /// The store has no upsert; persisting a trip twice stores it twice.
    #[instrument(skip(self, trip_ids), fields(trips = trip_ids.len()))]
    pub async fn persist_trip_features(&self, trip_ids: &[String]) -> Result<usize> {
        let mut records = Vec::with_capacity(trip_ids.len());
        for trip_id in trip_ids {
            match self.trip_features(trip_id).await? {
                Some(features) => records.push(features),
                None => warn!(trip_id = %trip_id, "No telemetry for trip, nothing persisted"),
            }
        }
        self.store.append_trips(records).await
    }

    /// Driver rollup from telemetry-derived and stored trip records
    #[instrument(skip(self))]
    pub async fn driver_features(&self, driver_id: &str) -> Result<DriverFeatures> {
        let samples = self.store.telemetry_for_driver(driver_id).await?;
        let computed = self.cache.refresh(samples).await?;
        let stored = self.store.trips_for_driver(driver_id).await?;
        let trips = merge_trips(computed, stored);

        let profile = self.store.driver_profile(driver_id).await?;
        Ok(aggregate_driver(driver_id, &trips, profile.as_ref()))
    }

    /// Rollups for every driver with trips or a profile, ordered by id
    pub async fn all_driver_features(&self) -> Result<Vec<DriverFeatures>> {
        let computed = self.rebuild_trip_features().await?;
        let stored = self.store.trips().await?;
        let trips = merge_trips(computed, stored);
        let profiles = self.store.drivers().await?;
        aggregate_drivers(trips, &profiles).await
    }

    /// Risk score and premium for one driver
    #[instrument(skip(self))]
    pub async fn score_driver(&self, driver_id: &str) -> Result<RiskPremium> {
        let features = self.driver_features(driver_id).await?;
        let risk = self.scorer.score(&features).await?;
        Ok(self.calculator.quote(driver_id, risk))
    }

    /// Score every driver in one model batch
    #[instrument(skip(self))]
    pub async fn score_all(&self) -> Result<ScoringReport> {
        let drivers = self.all_driver_features().await?;
        let scores = self.scorer.score_batch(&drivers).await?;
        let premiums: Vec<RiskPremium> = drivers
            .iter()
            .zip(scores)
            .map(|(d, risk)| self.calculator.quote(d.driver_id.clone(), risk))
            .collect();
        let summary = FleetSummary::from_records(&premiums, &drivers);

        info!(
            drivers = summary.drivers,
            mean_risk = summary.mean_risk_score,
            "Scored fleet"
        );
        Ok(ScoringReport {
            drivers,
            premiums,
            summary,
        })
    }

    /// Daily harsh-event counts over a driver's telemetry
    pub async fn harsh_event_timeline(&self, driver_id: &str) -> Result<Vec<HarshEventDay>> {
        let samples = self.store.telemetry_for_driver(driver_id).await?;
        Ok(harsh_event_timeline(&samples, self.cache.config()))
    }
}

/// Telemetry-derived records win over stored ones with the same trip id;
/// among stored duplicates the last appended wins.
fn merge_trips(computed: Vec<TripFeatures>, stored: Vec<TripFeatures>) -> Vec<TripFeatures> {
    let mut by_id: BTreeMap<String, TripFeatures> = BTreeMap::new();
    for trip in stored.into_iter().chain(computed) {
        by_id.insert(trip.trip_id.clone(), trip);
    }
    by_id.into_values().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trip(id: &str, minutes: f64) -> TripFeatures {
        TripFeatures {
            trip_id: id.into(),
            driver_id: "d1".into(),
            trip_duration_min: minutes,
            total_miles: 1.0,
            avg_speed: 20.0,
            max_speed: 30.0,
            num_harsh_brakes: 0,
            num_harsh_accels: 0,
            idling_pct: 0.0,
            night_trip_pct: 0.0,
            urban_pct: 0.0,
            highway_pct: 0.0,
        }
    }

    #[test]
    fn test_merge_prefers_computed() {
        let merged = merge_trips(
            vec![trip("a", 5.0)],
            vec![trip("a", 1.0), trip("b", 2.0), trip("b", 3.0)],
        );
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].trip_duration_min, 5.0);
        assert_eq!(merged[1].trip_duration_min, 3.0);
    }
}
