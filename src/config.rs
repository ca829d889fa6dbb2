use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::types::Regime;

/// Numeric constants of the pricing engine.
///
/// All values are PLACEHOLDER calibration stand-ins: expect them to move as
/// the tail fits and the portfolio simulation mature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Exceedance probability returned at or below the POT threshold.
    pub sub_threshold_probability: f64,
    /// Mean number of threshold exceedances per year.
    pub base_rate_per_year: f64,
    /// TVaR99 / EL multiplier.
    pub tvar_gap: f64,
    /// Share of headroom-breaching TVaR charged as capital load.
    pub capital_load_factor: f64,
    /// Number of trapezoid intervals over the intensity grid.
    pub grid_intervals: usize,
    /// Grid upper bound for capped payouts when the peril sets none.
    pub default_intensity_max_capped: f64,
    /// Grid upper bound for uncapped payouts when the peril sets none.
    pub default_intensity_max_uncapped: f64,
    /// Ceiling on the post-bind utilization estimate.
    pub utilization_ceiling: f64,
    /// Floor on the limit when converting premium into utilization.
    pub limit_floor: f64,
}

impl EngineConfig {
    pub fn canonical() -> Self {
        EngineConfig {
            sub_threshold_probability: 0.0001, // PLACEHOLDER
            base_rate_per_year: 6.0,           // PLACEHOLDER
            tvar_gap: 4.5,                     // PLACEHOLDER; see tail_sim
            capital_load_factor: 0.25,         // PLACEHOLDER
            grid_intervals: 128,
            default_intensity_max_capped: 0.30,
            default_intensity_max_uncapped: 0.10,
            utilization_ceiling: 0.999,
            limit_floor: 1e-9,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        probability("sub_threshold_probability", self.sub_threshold_probability)?;
        probability("utilization_ceiling", self.utilization_ceiling)?;
        probability("capital_load_factor", self.capital_load_factor)?;
        positive("base_rate_per_year", self.base_rate_per_year)?;
        positive("default_intensity_max_capped", self.default_intensity_max_capped)?;
        positive("default_intensity_max_uncapped", self.default_intensity_max_uncapped)?;
        positive("limit_floor", self.limit_floor)?;
        if !self.tvar_gap.is_finite() || self.tvar_gap < 1.0 {
            return Err(ConfigError::GapBelowOne(self.tvar_gap));
        }
        if self.grid_intervals == 0 {
            return Err(ConfigError::EmptyGrid);
        }
        Ok(())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::canonical()
    }
}

/// Defaults the request handler applies to unset fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuoteDefaults {
    pub regime: Regime,
    pub limit_usd: f64,
    pub attachment_pct: f64,
    pub tenor_days: u32,
    pub utilization: f64,
    pub tvar99_headroom_usd: f64,
}

impl QuoteDefaults {
    pub fn canonical() -> Self {
        QuoteDefaults {
            regime: Regime::Volatile,
            limit_usd: 1_000_000.0,
            attachment_pct: 0.0,
            tenor_days: 30,
            utilization: 0.35,
            tvar99_headroom_usd: 5_000_000.0,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        positive("limit_usd", self.limit_usd)?;
        probability("attachment_pct", self.attachment_pct)?;
        probability("utilization", self.utilization)?;
        if !self.tvar99_headroom_usd.is_finite() || self.tvar99_headroom_usd < 0.0 {
            return Err(ConfigError::NotPositive {
                field: "tvar99_headroom_usd",
                value: self.tvar99_headroom_usd,
            });
        }
        Ok(())
    }
}

impl Default for QuoteDefaults {
    fn default() -> Self {
        Self::canonical()
    }
}

/// Everything a quoting process needs besides the catalog.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub engine: EngineConfig,
    pub defaults: QuoteDefaults,
}

impl Settings {
    pub fn from_json_str(s: &str) -> Result<Self, ConfigError> {
        let settings: Settings = serde_json::from_str(s)?;
        settings.engine.validate()?;
        settings.defaults.validate()?;
        Ok(settings)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }
}

fn probability(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::NotAProbability { field, value })
    }
}

fn positive(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::NotPositive { field, value })
    }
}
