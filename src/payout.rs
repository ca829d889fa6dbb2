use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PiecewiseLinearBand {
    pub from: f64,
    pub to: f64,
    pub payout_at_from: f64,
    pub payout_at_to: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixedBand {
    pub min_intensity: f64,
    pub max_intensity: f64,
    pub payout: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearBand {
    pub min_intensity: f64,
    pub max_intensity: f64,
    pub payout_at_min: f64,
    pub payout_at_max: f64,
}

/// Payout schedule of a parametric cover: trigger intensity → fraction of limit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PayoutSpec {
    /// Interpolated bands that may overlap; the highest value across
    /// qualifying bands wins.
    PiecewiseLinear {
        bands: Vec<PiecewiseLinearBand>,
        cap: f64,
        /// Consumed by the triggering subsystem, never by pricing.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        deductible_intensity: Option<f64>,
    },
    /// Step function over half-open `[min, max)` bands.
    BandedFixed { bands: Vec<FixedBand>, cap: f64 },
    /// Linear within each closed `[min, max]` band.
    BandedLinear { bands: Vec<LinearBand>, cap: f64 },
}

impl PayoutSpec {
    pub fn cap(&self) -> f64 {
        match self {
            PayoutSpec::PiecewiseLinear { cap, .. }
            | PayoutSpec::BandedFixed { cap, .. }
            | PayoutSpec::BandedLinear { cap, .. } => *cap,
        }
    }

    pub fn shape_name(&self) -> &'static str {
        match self {
            PayoutSpec::PiecewiseLinear { .. } => "piecewise_linear",
            PayoutSpec::BandedFixed { .. } => "banded_fixed",
            PayoutSpec::BandedLinear { .. } => "banded_linear",
        }
    }
}

/// Gross payout fraction at `intensity`, before any attachment.
///
/// Total: every input maps into `[0, cap]` and non-positive (or NaN)
/// intensities pay nothing.
pub fn payout_fraction(intensity: f64, spec: &PayoutSpec) -> f64 {
    if intensity.is_nan() || intensity <= 0.0 {
        return 0.0;
    }

    match spec {
        PayoutSpec::PiecewiseLinear { bands, cap, .. } => {
            let mut y = 0.0_f64;
            for b in bands.iter().filter(|b| intensity >= b.from) {
                let w = weight(intensity.min(b.to), b.from, b.to);
                y = y.max(lerp(b.payout_at_from, b.payout_at_to, w));
            }
            clamp_to_cap(y, *cap)
        }
        PayoutSpec::BandedFixed { bands, cap } => {
            if let Some(b) = bands
                .iter()
                .find(|b| intensity >= b.min_intensity && intensity < b.max_intensity)
            {
                return clamp_to_cap(b.payout, *cap);
            }
            match bands.last() {
                Some(last) if intensity >= last.max_intensity => clamp_to_cap(*cap, *cap),
                _ => 0.0,
            }
        }
        PayoutSpec::BandedLinear { bands, cap } => {
            if let Some(b) = bands
                .iter()
                .find(|b| intensity >= b.min_intensity && intensity <= b.max_intensity)
            {
                let t = weight(intensity, b.min_intensity, b.max_intensity);
                return clamp_to_cap(lerp(b.payout_at_min, b.payout_at_max, t), *cap);
            }
            match bands.last() {
                Some(last) if intensity > last.max_intensity => clamp_to_cap(*cap, *cap),
                _ => 0.0,
            }
        }
    }
}

/// Position of `x` within `[lo, hi]`, clamped to [0, 1]. Zero-width bands sit
/// at their upper end.
fn weight(x: f64, lo: f64, hi: f64) -> f64 {
    let span = hi - lo;
    if span.is_nan() || span <= 0.0 {
        return 1.0;
    }
    ((x - lo) / span).clamp(0.0, 1.0)
}

fn lerp(a: f64, b: f64, t: f64) -> f64 {
    a + (b - a) * t
}

fn clamp_to_cap(y: f64, cap: f64) -> f64 {
    let cap = if cap.is_finite() { cap.max(0.0) } else { 0.0 };
    if y.is_nan() {
        return 0.0;
    }
    y.max(0.0).min(cap)
}
