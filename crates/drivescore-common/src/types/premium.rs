//! Risk & premium record
//!
//! The premium formula maps a risk score onto a loading over a base premium:
//!
//! ```text
//! normalized = clamp(risk_score / 100, 0, 1)
//! annual     = base_premium * (1 + 0.5 * normalized)
//! monthly    = annual / 12
//! ```
//!
//! Records are recomputed on demand and never persisted as a source of truth.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Default annual base premium
pub const DEFAULT_BASE_PREMIUM: Decimal = Decimal::from_parts(2285, 0, 0, false, 0);

/// Risk score that maps to the full loading
pub const DEFAULT_MAX_RISK_SCORE: f64 = 100.0;

/// Loading applied at the maximum risk score (50%)
pub const DEFAULT_MAX_LOADING: f64 = 0.5;

/// Risk score and premium for one driver
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskPremium {
    pub driver_id: String,
    /// Raw model output (not clamped)
    pub predicted_risk_score: f64,
    /// Annual premium, rounded to cents
    pub premium_annual: Decimal,
    /// Monthly premium, rounded to cents
    pub premium_monthly: Decimal,
}

impl RiskPremium {
    /// Monthly premium as a share of the annual one (for sanity checks)
    pub fn monthly_ratio(&self) -> Option<Decimal> {
        if self.premium_annual > Decimal::ZERO {
            Some(self.premium_monthly / self.premium_annual)
        } else {
            None
        }
    }
}
