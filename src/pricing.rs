//! Hazard-curve pricing: expected loss by numeric integration over an
//! intensity grid, then the risk/capital/liquidity/overhead load stack.

use std::sync::Arc;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::config::EngineConfig;
use crate::exceedance::annualized_exceedance_probability;
use crate::payout::payout_fraction;
use crate::perils::PerilCurveSpec;
use crate::types::Regime;

/// Portfolio context supplied fresh with each quote.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PortfolioState {
    /// Fraction of capacity already committed, in [0, 1].
    pub utilization: f64,
    /// Remaining risk budget before the 99% TVaR limit is breached.
    pub tvar99_headroom_usd: f64,
}

/// A fully resolved pricing request. Callers clamp `attachment_pct` and
/// `portfolio.utilization` to [0, 1] beforehand; the engine does not.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteInput {
    pub peril_id: String,
    pub regime: Regime,
    #[serde(rename = "notionalUSD")]
    pub notional_usd: f64,
    /// Deductible on the payout fraction, not on intensity.
    pub attachment_pct: f64,
    #[serde(rename = "limitUSD")]
    pub limit_usd: f64,
    pub tenor_days: u32,
    pub portfolio: PortfolioState,
    pub curve: Arc<PerilCurveSpec>,
}

/// Premium decomposition. Field names follow the quote API.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QuoteBreakdown {
    /// Expected loss.
    #[serde(rename = "EL")]
    pub el: f64,
    /// Risk load.
    #[serde(rename = "RL")]
    pub rl: f64,
    /// Capital load.
    #[serde(rename = "CL")]
    pub cl: f64,
    /// Liquidity load.
    #[serde(rename = "LL")]
    pub ll: f64,
    /// Overhead.
    #[serde(rename = "O_H")]
    pub o_h: f64,
    pub premium: f64,
    /// Advisory post-bind utilization, never above the configured ceiling.
    pub utilization_after: f64,
}

/// Stateless pricer. Cheap to clone and safe to share across threads.
#[derive(Debug, Clone, Default)]
pub struct PricingEngine {
    config: EngineConfig,
}

impl PricingEngine {
    pub fn new() -> Self {
        Self::with_config(EngineConfig::canonical())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        PricingEngine { config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Price one quote. Total for well-formed input; identical inputs give
    /// bit-identical outputs.
    pub fn price(&self, q: &QuoteInput) -> QuoteBreakdown {
        let cfg = &self.config;
        let el = self.expected_loss(&q.curve, q.regime, q.limit_usd, q.attachment_pct);

        let tvar = el * cfg.tvar_gap;
        let rl = q.curve.pricing.k_risk_load * (tvar - el);

        let headroom = q.portfolio.tvar99_headroom_usd;
        let cl = cfg.capital_load_factor * tvar.min((tvar - headroom).max(0.0)).max(0.0);

        let util = q.portfolio.utilization;
        let liquidity = q.curve.pricing.liquidity_load;
        let ll_bps = liquidity.base_bps + util * liquidity.slope_bps_per_util;
        let ll = ll_bps / 10_000.0 * q.limit_usd;

        let o_h = q.curve.pricing.overhead * (el + rl + cl + ll);
        let premium = el + rl + cl + ll + o_h;

        let utilization_after =
            (util + premium / q.limit_usd.max(cfg.limit_floor)).min(cfg.utilization_ceiling);

        debug!(
            peril = %q.peril_id,
            regime = %q.regime,
            el, rl, cl, ll, o_h, premium, utilization_after,
            "priced quote"
        );

        QuoteBreakdown { el, rl, cl, ll, o_h, premium, utilization_after }
    }

    /// Price many quotes in parallel; output order matches input order.
    pub fn price_batch(&self, quotes: &[QuoteInput]) -> Vec<QuoteBreakdown> {
        quotes.par_iter().map(|q| self.price(q)).collect()
    }

    /// Upper end of the pricing grid for `peril`.
    pub fn intensity_max(&self, peril: &PerilCurveSpec) -> f64 {
        match peril.pricing.intensity_max {
            Some(i_max) if i_max.is_finite() && i_max > 0.0 => i_max,
            _ if peril.payout.cap() > 0.0 => self.config.default_intensity_max_capped,
            _ => self.config.default_intensity_max_uncapped,
        }
    }

    /// Evenly spaced grid `0, Δ, …, i_max` with `grid_intervals + 1` points.
    pub fn intensity_grid(&self, peril: &PerilCurveSpec) -> Vec<f64> {
        let n = self.config.grid_intervals.max(1);
        let i_max = self.intensity_max(peril);
        (0..=n).map(|k| i_max * k as f64 / n as f64).collect()
    }

    /// Annual loss density at `intensity`: the negative slope of the
    /// exceedance curve, by centered difference with a half-cell step.
    /// Never negative.
    pub fn loss_density(&self, peril: &PerilCurveSpec, regime: Regime, intensity: f64) -> f64 {
        let cfg = &self.config;
        let n = cfg.grid_intervals.max(1);
        let h = self.intensity_max(peril) / (2 * n) as f64;

        let lo = (intensity - h).max(0.0);
        let hi = intensity + h;
        let span = hi - lo;
        if span <= 0.0 {
            return 0.0;
        }
        let ep_lo = annualized_exceedance_probability(&peril.curve_params, regime, lo, cfg);
        let ep_hi = annualized_exceedance_probability(&peril.curve_params, regime, hi, cfg);
        ((ep_lo - ep_hi) / span).max(0.0)
    }

    /// Expected annual loss in USD: trapezoidal integral of
    /// net payout × limit × loss density over the intensity grid.
    pub fn expected_loss(
        &self,
        peril: &PerilCurveSpec,
        regime: Regime,
        limit_usd: f64,
        attachment_pct: f64,
    ) -> f64 {
        let grid = self.intensity_grid(peril);
        trace!(
            peril = %peril.id,
            points = grid.len(),
            i_max = grid.last().copied().unwrap_or(0.0),
            "integrating loss curve"
        );
        trapezoid(&grid, |i| {
            let net = (payout_fraction(i, &peril.payout) - attachment_pct).max(0.0);
            if net == 0.0 {
                return 0.0;
            }
            net * limit_usd * self.loss_density(peril, regime, i)
        })
    }
}

fn trapezoid(xs: &[f64], f: impl Fn(f64) -> f64) -> f64 {
    let ys: Vec<f64> = xs.iter().map(|&x| f(x)).collect();
    xs.windows(2)
        .zip(ys.windows(2))
        .map(|(x, y)| 0.5 * (y[0] + y[1]) * (x[1] - x[0]))
        .sum()
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use proptest::prelude::*;

    use super::*;
    use crate::payout::{FixedBand, PayoutSpec};
    use crate::perils::fixtures::depeg_peril;

    fn quote(regime: Regime, attachment_pct: f64, utilization: f64) -> QuoteInput {
        let curve = Arc::new(depeg_peril());
        QuoteInput {
            peril_id: curve.id.clone(),
            regime,
            notional_usd: 1_000_000.0,
            attachment_pct,
            limit_usd: 1_000_000.0,
            tenor_days: 30,
            portfolio: PortfolioState { utilization, tvar99_headroom_usd: 5_000_000.0 },
            curve,
        }
    }

    #[test]
    fn trapezoid_integrates_linear_exactly() {
        let xs: Vec<f64> = (0..=10).map(|k| k as f64 / 10.0).collect();
        assert_relative_eq!(trapezoid(&xs, |x| 2.0 * x), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn grid_spans_zero_to_i_max() {
        let engine = PricingEngine::new();
        let grid = engine.intensity_grid(&depeg_peril());
        assert_eq!(grid.len(), 129);
        assert_eq!(grid[0], 0.0);
        assert_relative_eq!(*grid.last().unwrap(), 0.30, epsilon = 1e-15);
    }

    #[test]
    fn grid_size_is_tunable() {
        let engine = PricingEngine::with_config(EngineConfig { grid_intervals: 16, ..EngineConfig::canonical() });
        assert_eq!(engine.intensity_grid(&depeg_peril()).len(), 17);
    }

    #[test]
    fn peril_intensity_max_overrides_cap_heuristic() {
        let engine = PricingEngine::new();
        let mut peril = depeg_peril();
        peril.pricing.intensity_max = Some(48.0);
        assert_eq!(engine.intensity_max(&peril), 48.0);
    }

    #[test]
    fn zero_cap_uses_narrow_grid() {
        let engine = PricingEngine::new();
        let mut peril = depeg_peril();
        peril.payout = PayoutSpec::BandedFixed {
            bands: vec![FixedBand { min_intensity: 0.0, max_intensity: 1.0, payout: 0.5 }],
            cap: 0.0,
        };
        assert_eq!(engine.intensity_max(&peril), 0.10);
    }

    #[test]
    fn density_is_slope_of_exceedance_curve() {
        let engine = PricingEngine::new();
        let peril = depeg_peril();
        // analytic: -d/di [6 (1 + ξ y)^(-1/ξ)] = (6/β)(1 + ξ y)^(-1/ξ - 1)
        let i = 0.25_f64;
        let y = (i - 0.05) / 0.05;
        let analytic = 6.0 / 0.05 * (1.0 + 0.2 * y).powf(-1.0 / 0.2 - 1.0);
        let numeric = engine.loss_density(&peril, Regime::Crisis, i);
        assert_relative_eq!(numeric, analytic, max_relative = 1e-3);
    }

    #[test]
    fn density_is_zero_below_threshold_and_on_the_jump() {
        let engine = PricingEngine::new();
        let peril = depeg_peril();
        assert_eq!(engine.loss_density(&peril, Regime::Crisis, 0.01), 0.0);
        // EP jumps up from the sub-threshold constant at u
        assert_eq!(engine.loss_density(&peril, Regime::Crisis, 0.05), 0.0);
    }

    #[test]
    fn crisis_scenario_produces_positive_layered_premium() {
        let engine = PricingEngine::new();
        let b = engine.price(&quote(Regime::Crisis, 0.0, 0.42));
        assert!(b.el > 0.0, "EL = {}", b.el);
        assert!(b.premium > b.el);
        assert!(b.utilization_after > 0.42 && b.utilization_after <= 0.999);
    }

    #[test]
    fn full_attachment_leaves_only_liquidity_and_overhead() {
        let engine = PricingEngine::new();
        let b = engine.price(&quote(Regime::Crisis, 1.0, 0.42));
        assert_eq!(b.el, 0.0);
        assert_eq!(b.rl, 0.0);
        assert_eq!(b.cl, 0.0);
        assert!(b.ll > 0.0);
        assert_eq!(b.premium, b.ll + b.o_h);
    }

    #[test]
    fn liquidity_load_matches_bps_formula() {
        let engine = PricingEngine::new();
        let b = engine.price(&quote(Regime::Calm, 0.0, 0.4));
        // (25 + 0.4 * 150) bps of 1M
        assert_relative_eq!(b.ll, 8_500.0, epsilon = 1e-6);
    }

    #[test]
    fn overhead_is_fraction_of_other_components() {
        let engine = PricingEngine::new();
        let b = engine.price(&quote(Regime::Volatile, 0.0, 0.35));
        assert_relative_eq!(b.o_h, 0.08 * (b.el + b.rl + b.cl + b.ll), max_relative = 1e-12);
        assert_relative_eq!(b.premium, b.el + b.rl + b.cl + b.ll + b.o_h, max_relative = 1e-12);
    }

    #[test]
    fn risk_load_prices_tvar_excess() {
        let engine = PricingEngine::new();
        let b = engine.price(&quote(Regime::Crisis, 0.0, 0.42));
        assert_relative_eq!(b.rl, 0.35 * 3.5 * b.el, max_relative = 1e-12);
    }

    #[test]
    fn capital_load_zero_within_headroom() {
        let engine = PricingEngine::new();
        let mut q = quote(Regime::Crisis, 0.0, 0.42);
        q.portfolio.tvar99_headroom_usd = f64::MAX;
        assert_eq!(engine.price(&q).cl, 0.0);
    }

    #[test]
    fn capital_load_charges_headroom_breach() {
        let engine = PricingEngine::new();
        let mut q = quote(Regime::Crisis, 0.0, 0.42);
        q.portfolio.tvar99_headroom_usd = 0.0;
        let b = engine.price(&q);
        // no headroom at all: charge a quarter of the whole TVaR
        assert_relative_eq!(b.cl, 0.25 * 4.5 * b.el, max_relative = 1e-12);
    }

    #[test]
    fn missing_regime_curve_prices_no_tail() {
        let engine = PricingEngine::new();
        let mut q = quote(Regime::Crisis, 0.0, 0.42);
        let mut peril = depeg_peril();
        peril.curve_params.gpd = None;
        q.curve = Arc::new(peril);
        let b = engine.price(&q);
        assert_eq!(b.el, 0.0);
        assert!(b.premium > 0.0);
    }

    #[test]
    fn higher_stress_regime_costs_more() {
        let engine = PricingEngine::new();
        let calm = engine.price(&quote(Regime::Calm, 0.0, 0.35));
        let crisis = engine.price(&quote(Regime::Crisis, 0.0, 0.35));
        assert!(crisis.el > calm.el, "crisis EL {} <= calm EL {}", crisis.el, calm.el);
    }

    #[test]
    fn attachment_reduces_expected_loss() {
        let engine = PricingEngine::new();
        let none = engine.price(&quote(Regime::Crisis, 0.0, 0.42));
        let some = engine.price(&quote(Regime::Crisis, 0.5, 0.42));
        assert!(some.el < none.el);
    }

    #[test]
    fn price_is_bit_identical_on_repeat() {
        let engine = PricingEngine::new();
        let q = quote(Regime::Crisis, 0.1, 0.42);
        let a = engine.price(&q);
        let b = engine.price(&q);
        assert_eq!(a.premium.to_bits(), b.premium.to_bits());
        assert_eq!(a, b);
    }

    #[test]
    fn batch_matches_sequential_in_order() {
        let engine = PricingEngine::new();
        let quotes: Vec<QuoteInput> = [Regime::Calm, Regime::Volatile, Regime::Crisis]
            .into_iter()
            .flat_map(|r| [0.0, 0.2, 0.9].map(|a| quote(r, a, 0.3)))
            .collect();
        let batch = engine.price_batch(&quotes);
        let seq: Vec<QuoteBreakdown> = quotes.iter().map(|q| engine.price(q)).collect();
        assert_eq!(batch, seq);
    }

    #[test]
    fn breakdown_serializes_with_api_field_names() {
        let engine = PricingEngine::new();
        let v = serde_json::to_value(engine.price(&quote(Regime::Crisis, 0.0, 0.42))).unwrap();
        for key in ["EL", "RL", "CL", "LL", "O_H", "premium", "utilization_after"] {
            assert!(v.get(key).is_some(), "missing {key}");
        }
    }

    #[test]
    fn quote_input_serializes_with_api_field_names() {
        let v = serde_json::to_value(quote(Regime::Crisis, 0.0, 0.42)).unwrap();
        assert_eq!(v["perilId"], "stablecoin_depeg:USDC");
        assert_eq!(v["limitUSD"], 1_000_000.0);
        assert_eq!(v["attachmentPct"], 0.0);
        assert_eq!(v["portfolio"]["tvar99_headroom_usd"], 5_000_000.0);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(48))]

        #[test]
        fn premium_covers_expected_loss(
            attachment in 0.0..=1.0_f64,
            utilization in 0.0..=1.0_f64,
            headroom in 0.0..1e7_f64,
            regime_idx in 0usize..3,
        ) {
            let engine = PricingEngine::new();
            let mut q = quote(Regime::ALL[regime_idx], attachment, utilization);
            q.portfolio.tvar99_headroom_usd = headroom;
            let b = engine.price(&q);
            prop_assert!(b.el >= 0.0 && b.rl >= 0.0 && b.cl >= 0.0 && b.ll >= 0.0 && b.o_h >= 0.0);
            prop_assert!(b.premium >= b.el);
            prop_assert!(b.utilization_after <= 0.999);
        }

        #[test]
        fn liquidity_load_non_decreasing_in_utilization(
            u1 in 0.0..=1.0_f64,
            du in 0.0..=1.0_f64,
        ) {
            let engine = PricingEngine::new();
            let u2 = (u1 + du).min(1.0);
            let lo = engine.price(&quote(Regime::Volatile, 0.0, u1));
            let hi = engine.price(&quote(Regime::Volatile, 0.0, u2));
            prop_assert!(hi.ll >= lo.ll);
        }
    }
}
