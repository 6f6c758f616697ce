//! Linear risk model
//!
//! A reference [`RiskModel`] loaded once from a JSON weights file:
//!
//! ```json
//! {
//!   "schema_version": "1.0.0",
//!   "intercept": 12.0,
//!   "coefficients": { "total_harsh_brakes": 1.5, "night_trip_pct_overall": 30.0 },
//!   "vehicle_type_offsets": { "Sports Car": 8.0 }
//! }
//! ```
//!
//! Coefficients are looked up by feature name; a name outside the feature
//! schema is rejected at load time.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use async_trait::async_trait;
use drivescore_common::{
    DrivescoreError, ModelError, Result, RiskFeatureVector, VehicleType, FEATURE_NAMES,
    FEATURE_SCHEMA_VERSION,
};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::model::RiskModel;

/// Weights file contents
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LinearWeights {
    #[serde(default)]
    pub schema_version: Option<String>,
    #[serde(default)]
    pub intercept: f64,
    #[serde(default)]
    pub coefficients: BTreeMap<String, f64>,
    #[serde(default)]
    pub vehicle_type_offsets: BTreeMap<String, f64>,
}

/// `intercept + Σ coefficient · feature + vehicle offset`
#[derive(Debug, Clone)]
pub struct LinearRiskModel {
    intercept: f64,
    coefficients: HashMap<&'static str, f64>,
    vehicle_offsets: HashMap<VehicleType, f64>,
}

impl LinearRiskModel {
    pub fn from_weights(weights: LinearWeights) -> std::result::Result<Self, ModelError> {
        if let Some(version) = &weights.schema_version {
            if version != FEATURE_SCHEMA_VERSION {
                return Err(ModelError::InvalidModel(format!(
                    "weights target feature schema {}, current is {}",
                    version, FEATURE_SCHEMA_VERSION
                )));
            }
        }
        if !weights.intercept.is_finite() {
            return Err(ModelError::InvalidModel("intercept is not finite".to_string()));
        }

        let mut coefficients = HashMap::new();
        for (name, weight) in &weights.coefficients {
            let column = FEATURE_NAMES
                .iter()
                .copied()
                .filter(|n| *n != "vehicle_type")
                .find(|n| *n == name.as_str())
                .ok_or_else(|| ModelError::InvalidModel(format!("unknown feature '{}'", name)))?;
            if !weight.is_finite() {
                return Err(ModelError::InvalidModel(format!(
                    "coefficient for '{}' is not finite",
                    name
                )));
            }
            coefficients.insert(column, *weight);
        }

        let mut vehicle_offsets = HashMap::new();
        for (name, offset) in &weights.vehicle_type_offsets {
            let vehicle: VehicleType = name.parse().unwrap_or_default();
            if vehicle == VehicleType::Unknown && !name.eq_ignore_ascii_case("unknown") {
                return Err(ModelError::InvalidModel(format!("unknown vehicle type '{}'", name)));
            }
            if !offset.is_finite() {
                return Err(ModelError::InvalidModel(format!(
                    "offset for '{}' is not finite",
                    name
                )));
            }
            vehicle_offsets.insert(vehicle, *offset);
        }

        Ok(Self {
            intercept: weights.intercept,
            coefficients,
            vehicle_offsets,
        })
    }

    pub fn from_json(json: &str) -> std::result::Result<Self, ModelError> {
        let weights: LinearWeights = serde_json::from_str(json)
            .map_err(|e| ModelError::InvalidModel(format!("malformed weights: {}", e)))?;
        Self::from_weights(weights)
    }

    /// Load weights from a file. A missing file is a configuration error.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            DrivescoreError::Config(format!("failed to read model file {}: {}", path.display(), e))
        })?;
        let model = Self::from_json(&json)?;
        info!(
            path = %path.display(),
            coefficients = model.coefficients.len(),
            "Loaded linear risk model"
        );
        Ok(model)
    }

    /// Deterministic evaluation
    pub fn evaluate(&self, features: &RiskFeatureVector) -> f64 {
        let linear: f64 = features
            .numeric_columns()
            .iter()
            .filter_map(|(name, value)| self.coefficients.get(name).map(|w| w * value))
            .sum();
        let offset = self
            .vehicle_offsets
            .get(&features.vehicle_type)
            .copied()
            .unwrap_or(0.0);
        self.intercept + linear + offset
    }
}

#[async_trait]
impl RiskModel for LinearRiskModel {
    async fn predict(&self, features: &RiskFeatureVector) -> std::result::Result<f64, ModelError> {
        let score = self.evaluate(features);
        if score.is_finite() {
            Ok(score)
        } else {
            Err(ModelError::Inference(format!("linear model produced {}", score)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn vector(vehicle_type: VehicleType) -> RiskFeatureVector {
        RiskFeatureVector {
            num_trips: 10,
            total_miles: 120.0,
            total_drive_time_min: 300.0,
            avg_trip_duration_min: 30.0,
            avg_trip_miles: 12.0,
            avg_speed_overall: 28.0,
            max_speed_overall: 80.0,
            total_harsh_brakes: 6,
            total_harsh_accels: 2,
            avg_num_harsh_brakes: 0.6,
            avg_num_harsh_accels: 0.2,
            night_trip_pct_overall: 0.25,
            idling_pct_overall: 0.1,
            urban_pct_overall: 0.5,
            highway_pct_overall: 0.3,
            years_driving: 4,
            num_claims: 1,
            num_violations: 1,
            vehicle_age: 6,
            vehicle_type,
            insurance_policy_length_years: 2,
            claims_weighted_score: 40,
        }
    }

    const WEIGHTS: &str = r#"{
        "schema_version": "1.0.0",
        "intercept": 10.0,
        "coefficients": {"total_harsh_brakes": 2.0, "night_trip_pct_overall": 20.0, "claims_weighted_score": 0.5},
        "vehicle_type_offsets": {"Sports Car": 8.0, "Electric": -2.0}
    }"#;

    #[test]
    fn test_evaluate() {
        let model = LinearRiskModel::from_json(WEIGHTS).unwrap();
        // 10 + 6*2 + 0.25*20 + 40*0.5
        assert!((model.evaluate(&vector(VehicleType::Sedan)) - 47.0).abs() < 1e-9);
        assert!((model.evaluate(&vector(VehicleType::SportsCar)) - 55.0).abs() < 1e-9);
        assert!((model.evaluate(&vector(VehicleType::Electric)) - 45.0).abs() < 1e-9);
    }

    #[test]
    fn test_unknown_feature_rejected() {
        let err = LinearRiskModel::from_json(r#"{"coefficients": {"driver_id": 1.0}}"#).unwrap_err();
        assert!(matches!(err, ModelError::InvalidModel(_)));

        let err = LinearRiskModel::from_json(r#"{"coefficients": {"vehicle_type": 1.0}}"#).unwrap_err();
        assert!(matches!(err, ModelError::InvalidModel(_)));
    }

    #[test]
    fn test_unknown_vehicle_and_schema_rejected() {
        assert!(LinearRiskModel::from_json(r#"{"vehicle_type_offsets": {"Hovercraft": 1.0}}"#).is_err());
        assert!(LinearRiskModel::from_json(r#"{"schema_version": "0.9.0"}"#).is_err());
        assert!(LinearRiskModel::from_json("not json").is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(WEIGHTS.as_bytes()).unwrap();
        let model = LinearRiskModel::load(file.path()).unwrap();
        assert!((model.evaluate(&vector(VehicleType::Truck)) - 47.0).abs() < 1e-9);

        let err = LinearRiskModel::load("/nonexistent/model.json").unwrap_err();
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn test_predict_batch_default() {
        let model = LinearRiskModel::from_json(WEIGHTS).unwrap();
        let scores = model
            .predict_batch(&[vector(VehicleType::Sedan), vector(VehicleType::SportsCar)])
            .await
            .unwrap();
        assert_eq!(scores.len(), 2);
        assert!(scores[1] > scores[0]);
    }
}
