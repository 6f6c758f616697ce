//! Premium calculation
//!
//! Pure and total over its inputs. Scores outside `[0, max_risk_score]` are
//! clamped, never rejected; NaN counts as 0. Amounts are rounded to cents,
//! with the monthly figure derived from the unrounded annual one.

use drivescore_common::types::premium::{DEFAULT_MAX_LOADING, DEFAULT_MAX_RISK_SCORE};
use drivescore_common::{DriverFeatures, DrivescoreError, Result, RiskPremium, DEFAULT_BASE_PREMIUM};
use rust_decimal::prelude::*;
use serde::{Deserialize, Serialize};

const MONTHS_PER_YEAR: Decimal = Decimal::from_parts(12, 0, 0, false, 0);

/// Premium formula parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PremiumConfig {
    /// Annual premium at zero risk
    pub base_premium: Decimal,
    /// Risk score that maps to the full loading
    pub max_risk_score: f64,
    /// Loading at the maximum risk score
    pub max_loading: Decimal,
}

impl Default for PremiumConfig {
    fn default() -> Self {
        Self {
            base_premium: DEFAULT_BASE_PREMIUM,
            max_risk_score: DEFAULT_MAX_RISK_SCORE,
            max_loading: Decimal::try_from(DEFAULT_MAX_LOADING).unwrap_or(Decimal::new(5, 1)),
        }
    }
}

impl PremiumConfig {
    pub fn with_base_premium(mut self, base_premium: Decimal) -> Self {
        self.base_premium = base_premium;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.base_premium.is_sign_negative() {
            return Err(DrivescoreError::Config(format!(
                "base premium must not be negative, got {}",
                self.base_premium
            )));
        }
        if !(self.max_risk_score.is_finite() && self.max_risk_score > 0.0) {
            return Err(DrivescoreError::Config(format!(
                "max risk score must be positive, got {}",
                self.max_risk_score
            )));
        }
        if self.max_loading.is_sign_negative() {
            return Err(DrivescoreError::Config(format!(
                "max loading must not be negative, got {}",
                self.max_loading
            )));
        }
        Ok(())
    }
}

/// Maps risk scores to premiums
#[derive(Debug, Clone, Default)]
pub struct PremiumCalculator {
    config: PremiumConfig,
}

impl PremiumCalculator {
    pub fn new(config: PremiumConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PremiumConfig {
        &self.config
    }

    /// `clamp(risk / max_risk_score, 0, 1)`, NaN as 0
    pub fn normalized_risk(&self, risk_score: f64) -> f64 {
        if risk_score.is_nan() {
            return 0.0;
        }
        (risk_score / self.config.max_risk_score).clamp(0.0, 1.0)
    }

    /// `(annual, monthly)`, both rounded to cents
    pub fn premium(&self, risk_score: f64) -> (Decimal, Decimal) {
        let normalized = Decimal::try_from(self.normalized_risk(risk_score)).unwrap_or_default();
        let scaling = Decimal::ONE + self.config.max_loading * normalized;
        let annual = self.config.base_premium * scaling;
        let monthly = annual / MONTHS_PER_YEAR;
        (round_cents(annual), round_cents(monthly))
    }

    pub fn annual_premium(&self, risk_score: f64) -> Decimal {
        self.premium(risk_score).0
    }

    /// Full record for one driver
    pub fn quote(&self, driver_id: impl Into<String>, risk_score: f64) -> RiskPremium {
        let (premium_annual, premium_monthly) = self.premium(risk_score);
        RiskPremium {
            driver_id: driver_id.into(),
            predicted_risk_score: risk_score,
            premium_annual,
            premium_monthly,
        }
    }
}

fn round_cents(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Fleet-wide rollup of scored drivers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FleetSummary {
    pub drivers: usize,
    pub mean_risk_score: f64,
    pub mean_annual_premium: Decimal,
    pub total_miles: f64,
}

impl FleetSummary {
    /// Summarise premiums, taking mileage from the matching feature records
    pub fn from_records(premiums: &[RiskPremium], features: &[DriverFeatures]) -> Self {
        let drivers = premiums.len();
        if drivers == 0 {
            return Self {
                drivers: 0,
                mean_risk_score: 0.0,
                mean_annual_premium: Decimal::ZERO,
                total_miles: features.iter().map(|f| f.total_miles).sum(),
            };
        }

        let mean_risk_score =
            premiums.iter().map(|p| p.predicted_risk_score).sum::<f64>() / drivers as f64;
        let premium_sum: Decimal = premiums.iter().map(|p| p.premium_annual).sum();
        let mean_annual_premium = round_cents(premium_sum / Decimal::from(drivers));

        Self {
            drivers,
            mean_risk_score,
            mean_annual_premium,
            total_miles: features.iter().map(|f| f.total_miles).sum(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_mid_risk_premium() {
        let calculator = PremiumCalculator::default();
        let (annual, monthly) = calculator.premium(50.0);
        assert_eq!(annual, dec!(2856.25));
        assert_eq!(monthly, dec!(238.02));
    }

    #[test]
    fn test_bounds() {
        let calculator = PremiumCalculator::default();
        assert_eq!(calculator.annual_premium(0.0), dec!(2285));
        assert_eq!(calculator.annual_premium(100.0), dec!(3427.50));
        assert_eq!(calculator.annual_premium(-20.0), dec!(2285));
        assert_eq!(calculator.annual_premium(250.0), dec!(3427.50));
        assert_eq!(calculator.annual_premium(f64::NAN), dec!(2285));
        assert_eq!(calculator.annual_premium(f64::INFINITY), dec!(3427.50));
    }

    #[test]
    fn test_custom_base() {
        let calculator = PremiumCalculator::new(PremiumConfig::default().with_base_premium(dec!(1200)));
        let quote = calculator.quote("driver_4", 25.0);
        assert_eq!(quote.premium_annual, dec!(1350.00));
        assert_eq!(quote.premium_monthly, dec!(112.50));
        assert_eq!(quote.driver_id, "driver_4");
    }

    #[test]
    fn test_config_validation() {
        assert!(PremiumConfig::default().validate().is_ok());
        let bad = PremiumConfig {
            max_risk_score: 0.0,
            ..Default::default()
        };
        assert!(bad.validate().is_err());
        let negative = PremiumConfig::default().with_base_premium(dec!(-1));
        assert!(negative.validate().unwrap_err().is_fatal());
    }

    #[test]
    fn test_fleet_summary() {
        let calculator = PremiumCalculator::default();
        let premiums = vec![calculator.quote("a", 0.0), calculator.quote("b", 100.0)];
        let summary = FleetSummary::from_records(&premiums, &[]);
        assert_eq!(summary.drivers, 2);
        assert!((summary.mean_risk_score - 50.0).abs() < 1e-12);
        assert_eq!(summary.mean_annual_premium, dec!(2856.25));

        let empty = FleetSummary::from_records(&[], &[]);
        assert_eq!(empty.drivers, 0);
        assert_eq!(empty.mean_annual_premium, Decimal::ZERO);
    }

    proptest! {
        #[test]
        fn prop_premium_monotonic(a in 0.0f64..=100.0, b in 0.0f64..=100.0) {
            let calculator = PremiumCalculator::default();
            let (low, high) = if a <= b { (a, b) } else { (b, a) };
            prop_assert!(calculator.annual_premium(low) <= calculator.annual_premium(high));
        }

        #[test]
        fn prop_premium_bounded(risk in -1000.0f64..1000.0) {
            let calculator = PremiumCalculator::default();
            let annual = calculator.annual_premium(risk);
            prop_assert!(annual >= dec!(2285));
            prop_assert!(annual <= dec!(3427.50));
        }
    }
}
