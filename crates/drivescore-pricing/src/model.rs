//! Risk model collaborator
//!
//! The model is an external, stateless function of the driver feature
//! vector. [`RiskScorer`] wraps any [`RiskModel`] and refuses malformed
//! output instead of substituting a default score.

use std::sync::Arc;

use async_trait::async_trait;
use drivescore_common::{DriverFeatures, ModelError, Result, RiskFeatureVector};
use tracing::{debug, instrument, warn};

/// Trait for risk model backends
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RiskModel: Send + Sync {
    /// Score one feature vector
    async fn predict(&self, features: &RiskFeatureVector) -> std::result::Result<f64, ModelError>;

    /// Score a batch; one score per row, in row order
    async fn predict_batch(
        &self,
        batch: &[RiskFeatureVector],
    ) -> std::result::Result<Vec<f64>, ModelError> {
        let mut scores = Vec::with_capacity(batch.len());
        for features in batch {
            scores.push(self.predict(features).await?);
        }
        Ok(scores)
    }
}

/// Validating front for a [`RiskModel`]
#[derive(Clone)]
pub struct RiskScorer {
    model: Arc<dyn RiskModel>,
}

impl RiskScorer {
    pub fn new(model: Arc<dyn RiskModel>) -> Self {
        Self { model }
    }

    /// Risk score for one driver
    #[instrument(skip(self, features), fields(driver_id = %features.driver_id))]
    pub async fn score(&self, features: &DriverFeatures) -> Result<f64> {
        let score = self.model.predict(&features.feature_vector()).await?;
        check_finite(0, score)?;
        debug!(score, "Scored driver");
        Ok(score)
    }

    /// Risk scores for many drivers, in input order
    #[instrument(skip(self, features), fields(drivers = features.len()))]
    pub async fn score_batch(&self, features: &[DriverFeatures]) -> Result<Vec<f64>> {
        let vectors: Vec<RiskFeatureVector> = features.iter().map(RiskFeatureVector::from).collect();
        let scores = self.model.predict_batch(&vectors).await?;

        if scores.len() != vectors.len() {
            warn!(expected = vectors.len(), actual = scores.len(), "Model returned wrong batch size");
            return Err(ModelError::BatchSizeMismatch {
                expected: vectors.len(),
                actual: scores.len(),
            }
            .into());
        }
        for (row, score) in scores.iter().enumerate() {
            check_finite(row, *score)?;
        }
        Ok(scores)
    }
}

fn check_finite(row: usize, score: f64) -> std::result::Result<(), ModelError> {
    if score.is_finite() {
        Ok(())
    } else {
        Err(ModelError::NonFiniteScore { row, score })
    }
}
