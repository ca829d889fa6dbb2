use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::payout::PayoutSpec;
use crate::types::Regime;

/// Generalized Pareto tail beyond the POT threshold.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GpdParams {
    /// Shape ξ. Zero is the exponential-tail limit; negative bounds the tail.
    pub xi: f64,
    /// Scale β, in intensity units.
    pub beta: f64,
}

/// Reserved: self-exciting arrival parameters. Not consumed by pricing.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HawkesParams {
    pub mu: f64,
    pub alpha: f64,
    pub beta: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DurationDistribution {
    Lognormal,
    Gamma,
    Weibull,
}

/// Reserved: power-law severity mapping. Not consumed by pricing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeverityModel {
    pub form: String,
    pub params: BTreeMap<String, f64>,
    pub cap: f64,
}

/// Per-regime tail calibration of a peril.
///
/// Only `pot_threshold_u` and `gpd` are read by the exceedance model; the
/// remaining fields are carried so catalogs round-trip unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CurveParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pot_threshold_u: Option<BTreeMap<Regime, f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gpd: Option<BTreeMap<Regime, GpdParams>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clustering_hawkes: Option<BTreeMap<Regime, HawkesParams>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exceedance_rate_per_hour: Option<BTreeMap<Regime, f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_distribution: Option<DurationDistribution>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_params: Option<BTreeMap<Regime, BTreeMap<String, f64>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity_model: Option<SeverityModel>,
}

impl CurveParams {
    pub fn gpd_for(&self, regime: Regime) -> Option<GpdParams> {
        self.gpd.as_ref()?.get(&regime).copied()
    }

    pub fn threshold_for(&self, regime: Regime) -> Option<f64> {
        self.pot_threshold_u.as_ref()?.get(&regime).copied()
    }
}

/// Trigger metadata. Consumed by the triggering subsystem, not by pricing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerSpec {
    pub lookback_sec: u64,
    pub confirm_sec: u64,
    pub min_intensity: f64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub disqualifiers: Vec<String>,
}

/// Advisory capacity limits; the engine does not enforce them.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UtilizationLimits {
    pub target: f64,
    pub hard: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LiquidityLoad {
    pub base_bps: f64,
    pub slope_bps_per_util: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricingSpec {
    /// Tail level used by the TVaR simulation (e.g. 0.99).
    #[serde(default = "default_tvar_alpha")]
    pub tvar_alpha: f64,
    pub k_risk_load: f64,
    /// Overhead as a fraction of the pre-overhead premium.
    pub overhead: f64,
    pub utilization_limits: UtilizationLimits,
    pub liquidity_load: LiquidityLoad,
    /// Upper end of the pricing grid in this peril's intensity units. When
    /// absent the engine falls back to its cap-based default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intensity_max: Option<f64>,
}

fn default_tvar_alpha() -> f64 {
    0.99
}

/// Immutable description of one insurable peril, loaded once from the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerilCurveSpec {
    pub id: String,
    pub display_name: String,
    #[serde(default)]
    pub regimes: Vec<Regime>,
    /// Oracle/source description; opaque to pricing.
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub measurement: serde_json::Value,
    pub trigger: TriggerSpec,
    pub payout: PayoutSpec,
    pub curve_params: CurveParams,
    pub pricing: PricingSpec,
}

impl PerilCurveSpec {
    pub fn supports(&self, regime: Regime) -> bool {
        self.regimes.contains(&regime)
    }
}
