//! Annualized exceedance probabilities from a peaks-over-threshold GPD tail.

use crate::config::EngineConfig;
use crate::perils::{CurveParams, GpdParams};
use crate::types::Regime;

/// Annualized probability that trigger intensity meets or exceeds `intensity`.
///
/// Missing or unusable tail parameters degrade to zero rather than failing;
/// the catalog rejects such perils at load time.
pub fn annualized_exceedance_probability(
    curve: &CurveParams,
    regime: Regime,
    intensity: f64,
    cfg: &EngineConfig,
) -> f64 {
    let Some(gpd) = curve.gpd_for(regime) else {
        return 0.0;
    };
    let u = curve.threshold_for(regime).unwrap_or(0.0);

    if !gpd.beta.is_finite() || gpd.beta <= 0.0 || !gpd.xi.is_finite() || intensity.is_nan() {
        return 0.0;
    }

    // tail side of the threshold is exclusive
    if intensity <= u {
        return cfg.sub_threshold_probability;
    }

    let tail = gpd_survival((intensity - u) / gpd.beta, gpd);
    (cfg.base_rate_per_year * tail).clamp(0.0, 1.0)
}

/// GPD survivor function at standardized excess `y >= 0`.
pub fn gpd_survival(y: f64, gpd: GpdParams) -> f64 {
    if gpd.xi == 0.0 {
        return (-y).exp();
    }
    let base = 1.0 + gpd.xi * y;
    if base <= 0.0 {
        // beyond the upper endpoint of a bounded (ξ < 0) tail
        return 0.0;
    }
    // ln_1p keeps tiny shapes from rounding 1 + ξy to 1
    (-(gpd.xi * y).ln_1p() / gpd.xi).exp()
}
