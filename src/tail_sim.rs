//! Monte Carlo estimate of the TVaR/EL gap for a single cover.
//!
//! Each simulated year draws a Poisson number of threshold exceedances, gives
//! each one a GPD excess over the POT threshold, and pays the largest net
//! payout of the year: a parametric cover pays once per term. The ratio of
//! tail-average to mean annual loss replaces the fixed `tvar_gap` when the
//! caller opts in.

use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;
use rand_distr::{Distribution, Poisson};
use rayon::prelude::*;
use serde::Serialize;
use tracing::debug;

use crate::config::EngineConfig;
use crate::payout::payout_fraction;
use crate::perils::{GpdParams, PerilCurveSpec};
use crate::types::Regime;

/// Trials per independently seeded chunk.
const CHUNK: usize = 1_024;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TailSimConfig {
    pub trials: usize,
    pub seed: u64,
}

impl Default for TailSimConfig {
    fn default() -> Self {
        TailSimConfig { trials: 20_000, seed: 42 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TailStats {
    pub trials: usize,
    pub mean_loss: f64,
    pub tvar: f64,
    /// `tvar / mean_loss`, or the configured gap when nothing was lost.
    pub gap: f64,
}

/// Draw an excess over the threshold by inverting the GPD survivor function.
pub fn sample_gpd_excess(gpd: GpdParams, rng: &mut impl Rng) -> f64 {
    // (0, 1]: keeps ln and negative powers finite
    let v = 1.0 - rng.random::<f64>();
    if gpd.xi == 0.0 {
        -gpd.beta * v.ln()
    } else {
        // v^-ξ - 1 via exp_m1 so tiny shapes do not cancel to zero
        gpd.beta * (-gpd.xi * v.ln()).exp_m1() / gpd.xi
    }
}

/// Simulated annual losses in USD, one per trial, in trial order.
pub fn simulate_annual_losses(
    peril: &PerilCurveSpec,
    regime: Regime,
    limit_usd: f64,
    attachment_pct: f64,
    cfg: &EngineConfig,
    sim: &TailSimConfig,
) -> Vec<f64> {
    let Some(gpd) = peril.curve_params.gpd_for(regime) else {
        return vec![0.0; sim.trials];
    };
    let u = peril.curve_params.threshold_for(regime).unwrap_or(0.0);
    let arrivals = Poisson::new(cfg.base_rate_per_year).ok();

    let n_chunks = sim.trials.div_ceil(CHUNK);
    (0..n_chunks)
        .into_par_iter()
        .flat_map_iter(|k| {
            let mut rng = ChaCha20Rng::seed_from_u64(sim.seed.wrapping_add(k as u64));
            let len = CHUNK.min(sim.trials - k * CHUNK);
            (0..len)
                .map(|_| {
                    let n = arrivals.as_ref().map_or(0, |p| p.sample(&mut rng) as u64);
                    let mut worst = 0.0_f64;
                    for _ in 0..n {
                        let intensity = u + sample_gpd_excess(gpd, &mut rng);
                        let net = (payout_fraction(intensity, &peril.payout) - attachment_pct).max(0.0);
                        worst = worst.max(net);
                    }
                    worst * limit_usd
                })
                .collect::<Vec<_>>()
        })
        .collect()
}

/// Mean of the worst `1 - alpha` share of `losses` (at least one outcome).
pub fn tail_value_at_risk(losses: &[f64], alpha: f64) -> f64 {
    if losses.is_empty() {
        return 0.0;
    }
    let mut sorted = losses.to_vec();
    sorted.sort_unstable_by(|a, b| b.total_cmp(a));
    // tolerance keeps 0.01 * 100 from rounding up to 2
    let k = (((1.0 - alpha) * sorted.len() as f64 - 1e-9).ceil() as usize).clamp(1, sorted.len());
    sorted[..k].iter().sum::<f64>() / k as f64
}

pub fn estimate_tvar_gap(
    peril: &PerilCurveSpec,
    regime: Regime,
    limit_usd: f64,
    attachment_pct: f64,
    cfg: &EngineConfig,
    sim: &TailSimConfig,
) -> TailStats {
    let losses = simulate_annual_losses(peril, regime, limit_usd, attachment_pct, cfg, sim);
    let trials = losses.len();
    let mean_loss = if trials == 0 { 0.0 } else { losses.iter().sum::<f64>() / trials as f64 };
    let tvar = tail_value_at_risk(&losses, peril.pricing.tvar_alpha);
    let gap = if mean_loss > 0.0 { (tvar / mean_loss).max(1.0) } else { cfg.tvar_gap };

    debug!(peril = %peril.id, regime = %regime, trials, mean_loss, tvar, gap, "simulated tail gap");
    TailStats { trials, mean_loss, tvar, gap }
}
