//! # Drivescore Pricing
//!
//! Risk scoring and premium calculation.
//!
//! ## Formula
//!
//! ```text
//! normalized = clamp(risk_score / 100, 0, 1)
//! annual     = base_premium * (1 + 0.5 * normalized)
//! monthly    = annual / 12
//! ```
//!
//! The risk score comes from an external [`RiskModel`]; [`RiskScorer`]
//! surfaces model failures instead of defaulting a score.

pub mod linear;
pub mod model;
pub mod premium;

pub use linear::{LinearRiskModel, LinearWeights};
pub use model::{RiskModel, RiskScorer};
pub use premium::{FleetSummary, PremiumCalculator, PremiumConfig};
