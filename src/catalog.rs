//! Peril catalog: loaded once, validated up front, read-only afterwards.
//!
//! A regime that a peril declares but does not calibrate is a catalog
//! error here, so it can never surface during pricing as a silent zero
//! expected loss.

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::Deserialize;
use tracing::{info, warn};

use crate::error::CatalogError;
use crate::payout::PayoutSpec;
use crate::perils::PerilCurveSpec;

#[derive(Deserialize)]
struct CatalogDocument {
    #[serde(default)]
    version: Option<CatalogVersion>,
    perils: Vec<PerilCurveSpec>,
}

/// Catalog files tag their version as either `"1"` or `1`.
#[derive(Deserialize)]
#[serde(untagged)]
enum CatalogVersion {
    Text(String),
    Number(serde_json::Number),
}

impl From<CatalogVersion> for String {
    fn from(v: CatalogVersion) -> Self {
        match v {
            CatalogVersion::Text(s) => s,
            CatalogVersion::Number(n) => n.to_string(),
        }
    }
}

/// Immutable, id-indexed set of perils.
#[derive(Debug, Default)]
pub struct PerilCatalog {
    version: Option<String>,
    perils: Vec<Arc<PerilCurveSpec>>,
    index: HashMap<String, usize>,
}

impl PerilCatalog {
    /// Build a catalog, validating every peril. Fails on the first problem.
    pub fn new(
        version: Option<String>,
        perils: Vec<PerilCurveSpec>,
    ) -> Result<Self, CatalogError> {
        let mut index = HashMap::with_capacity(perils.len());
        let mut stored = Vec::with_capacity(perils.len());
        for peril in perils {
            if let Err(e) = validate_peril(&peril) {
                warn!(peril = %peril.id, error = %e, "rejecting catalog");
                return Err(e);
            }
            if index.insert(peril.id.clone(), stored.len()).is_some() {
                return Err(CatalogError::DuplicateId(peril.id));
            }
            stored.push(Arc::new(peril));
        }
        Ok(PerilCatalog { version, perils: stored, index })
    }

    /// Accepts either `{"version": .., "perils": [..]}` or a bare array.
    pub fn from_json_str(s: &str) -> Result<Self, CatalogError> {
        let value: serde_json::Value = serde_json::from_str(s)?;
        let doc = if value.is_array() {
            CatalogDocument { version: None, perils: serde_json::from_value(value)? }
        } else {
            serde_json::from_value(value)?
        };
        let catalog = Self::new(doc.version.map(String::from), doc.perils)?;
        info!(
            perils = catalog.len(),
            version = catalog.version().unwrap_or("unversioned"),
            "loaded peril catalog"
        );
        Ok(catalog)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let text = fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn get(&self, id: &str) -> Option<Arc<PerilCurveSpec>> {
        self.index.get(id).map(|&i| Arc::clone(&self.perils[i]))
    }

    /// Peril ids in declaration order.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.perils.iter().map(|p| p.id.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<PerilCurveSpec>> {
        self.perils.iter()
    }

    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    pub fn len(&self) -> usize {
        self.perils.len()
    }

    pub fn is_empty(&self) -> bool {
        self.perils.is_empty()
    }
}

/// Shared, hot-swappable catalog. Readers take a snapshot; a reload replaces
/// the whole catalog at once, so no quote sees a half-updated set.
#[derive(Debug, Default)]
pub struct CatalogHandle {
    current: RwLock<Arc<PerilCatalog>>,
}

impl CatalogHandle {
    pub fn new(catalog: PerilCatalog) -> Self {
        CatalogHandle { current: RwLock::new(Arc::new(catalog)) }
    }

    pub fn load(&self) -> Arc<PerilCatalog> {
        Arc::clone(&self.current.read())
    }

    /// Swap in `catalog`, returning the previous one.
    pub fn replace(&self, catalog: PerilCatalog) -> Arc<PerilCatalog> {
        let next = Arc::new(catalog);
        let prev = std::mem::replace(&mut *self.current.write(), next);
        info!(perils = self.current.read().len(), "replaced peril catalog");
        prev
    }
}

fn validate_peril(p: &PerilCurveSpec) -> Result<(), CatalogError> {
    let peril = || p.id.clone();

    if p.regimes.is_empty() {
        return Err(CatalogError::NoRegimes { peril: peril() });
    }

    for &regime in &p.regimes {
        let gpd = p
            .curve_params
            .gpd_for(regime)
            .ok_or_else(|| CatalogError::MissingGpd { peril: peril(), regime })?;
        let u = p
            .curve_params
            .threshold_for(regime)
            .ok_or_else(|| CatalogError::MissingThreshold { peril: peril(), regime })?;
        let invalid = |reason: String| CatalogError::InvalidTail { peril: peril(), regime, reason };
        if !gpd.xi.is_finite() {
            return Err(invalid(format!("xi must be finite, got {}", gpd.xi)));
        }
        if !gpd.beta.is_finite() || gpd.beta <= 0.0 {
            return Err(invalid(format!("beta must be positive, got {}", gpd.beta)));
        }
        if !u.is_finite() || u < 0.0 {
            return Err(invalid(format!("threshold must be non-negative, got {u}")));
        }
    }

    validate_payout(&p.payout).map_err(|reason| CatalogError::InvalidPayout { peril: peril(), reason })?;

    let pricing = &p.pricing;
    let invalid = |reason: String| CatalogError::InvalidPricing { peril: peril(), reason };
    for (name, v) in [
        ("k_risk_load", pricing.k_risk_load),
        ("overhead", pricing.overhead),
        ("liquidity_load.base_bps", pricing.liquidity_load.base_bps),
        ("liquidity_load.slope_bps_per_util", pricing.liquidity_load.slope_bps_per_util),
    ] {
        if !v.is_finite() || v < 0.0 {
            return Err(invalid(format!("{name} must be non-negative, got {v}")));
        }
    }
    if !(pricing.tvar_alpha > 0.0 && pricing.tvar_alpha < 1.0) {
        return Err(invalid(format!("tvar_alpha must lie in (0, 1), got {}", pricing.tvar_alpha)));
    }
    if let Some(i_max) = pricing.intensity_max
        && (!i_max.is_finite() || i_max <= 0.0)
    {
        return Err(invalid(format!("intensity_max must be positive, got {i_max}")));
    }
    Ok(())
}

fn validate_payout(spec: &PayoutSpec) -> Result<(), String> {
    let cap = spec.cap();
    if !(0.0..=1.0).contains(&cap) {
        return Err(format!("cap must lie in [0, 1], got {cap}"));
    }
    let check = |lo: f64, hi: f64, payouts: &[f64]| -> Result<(), String> {
        if !lo.is_finite() || !hi.is_finite() || lo > hi {
            return Err(format!("band [{lo}, {hi}] is not an ordered finite range"));
        }
        if payouts.iter().any(|y| !y.is_finite()) {
            return Err(format!("band [{lo}, {hi}] has a non-finite payout"));
        }
        Ok(())
    };
    match spec {
        PayoutSpec::PiecewiseLinear { bands, .. } => {
            for b in bands {
                check(b.from, b.to, &[b.payout_at_from, b.payout_at_to])?;
            }
        }
        PayoutSpec::BandedFixed { bands, .. } => {
            if bands.is_empty() {
                return Err("banded_fixed needs at least one band".to_string());
            }
            for b in bands {
                check(b.min_intensity, b.max_intensity, &[b.payout])?;
            }
        }
        PayoutSpec::BandedLinear { bands, .. } => {
            if bands.is_empty() {
                return Err("banded_linear needs at least one band".to_string());
            }
            for b in bands {
                check(b.min_intensity, b.max_intensity, &[b.payout_at_min, b.payout_at_max])?;
            }
        }
    }
    Ok(())
}
