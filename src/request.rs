//! Request handling around the engine: defaults, clamping, peril lookup and
//! the response envelope.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::catalog::PerilCatalog;
use crate::config::QuoteDefaults;
use crate::error::RequestError;
use crate::pricing::{PortfolioState, PricingEngine, QuoteBreakdown, QuoteInput};
use crate::types::Regime;

/// Body of a quote request. Everything but the peril id is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteRequest {
    pub peril_id: String,
    #[serde(default)]
    pub regime: Option<Regime>,
    #[serde(default, rename = "limitUSD")]
    pub limit_usd: Option<f64>,
    #[serde(default)]
    pub attachment_pct: Option<f64>,
    #[serde(default)]
    pub tenor_days: Option<u32>,
    #[serde(default)]
    pub utilization: Option<f64>,
    #[serde(default, rename = "tvar99_headroom_usd")]
    pub tvar99_headroom_usd: Option<f64>,
}

impl QuoteRequest {
    pub fn for_peril(peril_id: impl Into<String>) -> Self {
        QuoteRequest { peril_id: peril_id.into(), ..Self::default() }
    }

    /// Resolve against `catalog`, filling unset fields from `defaults` and
    /// clamping fractions into [0, 1].
    pub fn resolve(
        &self,
        catalog: &PerilCatalog,
        defaults: &QuoteDefaults,
    ) -> Result<QuoteInput, RequestError> {
        if self.peril_id.is_empty() {
            return Err(RequestError::MissingPerilId);
        }
        let curve = catalog
            .get(&self.peril_id)
            .ok_or_else(|| RequestError::UnknownPeril(self.peril_id.clone()))?;

        let regime = self.regime.unwrap_or(defaults.regime);
        if !curve.supports(regime) {
            return Err(RequestError::UnsupportedRegime { peril: curve.id.clone(), regime });
        }

        let limit_usd = finite("limitUSD", self.limit_usd.unwrap_or(defaults.limit_usd))?;
        if limit_usd <= 0.0 {
            return Err(RequestError::NonPositiveLimit(limit_usd));
        }
        let attachment_pct = unit_interval(
            "attachmentPct",
            finite("attachmentPct", self.attachment_pct.unwrap_or(defaults.attachment_pct))?,
        );
        let utilization = unit_interval(
            "utilization",
            finite("utilization", self.utilization.unwrap_or(defaults.utilization))?,
        );
        let headroom = finite(
            "tvar99_headroom_usd",
            self.tvar99_headroom_usd.unwrap_or(defaults.tvar99_headroom_usd),
        )?
        .max(0.0);

        Ok(QuoteInput {
            peril_id: curve.id.clone(),
            regime,
            // parametric cover: the limit is the notional anchor
            notional_usd: limit_usd,
            attachment_pct,
            limit_usd,
            tenor_days: self.tenor_days.unwrap_or(defaults.tenor_days),
            portfolio: PortfolioState { utilization, tvar99_headroom_usd: headroom },
            curve,
        })
    }
}

/// Successful quote: the resolved input echoed alongside its breakdown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuoteResponse {
    pub ok: bool,
    pub input: QuoteInput,
    pub breakdown: QuoteBreakdown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub ok: bool,
    pub error: String,
}

impl From<&RequestError> for ErrorResponse {
    fn from(e: &RequestError) -> Self {
        ErrorResponse { ok: false, error: e.to_string() }
    }
}

/// Resolve and price a single request.
pub fn quote(
    engine: &PricingEngine,
    catalog: &PerilCatalog,
    defaults: &QuoteDefaults,
    request: &QuoteRequest,
) -> Result<QuoteResponse, RequestError> {
    let input = request.resolve(catalog, defaults)?;
    let breakdown = engine.price(&input);
    Ok(QuoteResponse { ok: true, input, breakdown })
}

fn finite(field: &'static str, value: f64) -> Result<f64, RequestError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(RequestError::NotFinite { field, value })
    }
}

fn unit_interval(field: &'static str, value: f64) -> f64 {
    let clamped = value.clamp(0.0, 1.0);
    if clamped != value {
        warn!(field, value, clamped, "clamped request value into [0, 1]");
    }
    clamped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::perils::fixtures::depeg_peril;

    fn catalog() -> PerilCatalog {
        PerilCatalog::new(None, vec![depeg_peril()]).unwrap()
    }

    #[test]
    fn unset_fields_take_defaults() {
        let input = QuoteRequest::for_peril("stablecoin_depeg:USDC")
            .resolve(&catalog(), &QuoteDefaults::canonical())
            .unwrap();
        assert_eq!(input.regime, Regime::Volatile);
        assert_eq!(input.limit_usd, 1_000_000.0);
        assert_eq!(input.notional_usd, input.limit_usd);
        assert_eq!(input.attachment_pct, 0.0);
        assert_eq!(input.tenor_days, 30);
        assert_eq!(input.portfolio.utilization, 0.35);
        assert_eq!(input.portfolio.tvar99_headroom_usd, 5_000_000.0);
    }

    #[test]
    fn fractions_are_clamped_and_headroom_floored() {
        let req = QuoteRequest {
            attachment_pct: Some(1.7),
            utilization: Some(-0.2),
            tvar99_headroom_usd: Some(-10.0),
            ..QuoteRequest::for_peril("stablecoin_depeg:USDC")
        };
        let input = req.resolve(&catalog(), &QuoteDefaults::canonical()).unwrap();
        assert_eq!(input.attachment_pct, 1.0);
        assert_eq!(input.portfolio.utilization, 0.0);
        assert_eq!(input.portfolio.tvar99_headroom_usd, 0.0);
    }

    #[test]
    fn unknown_peril_is_a_client_error() {
        let err = QuoteRequest::for_peril("chain_halt:nowhere")
            .resolve(&catalog(), &QuoteDefaults::canonical())
            .unwrap_err();
        assert_eq!(err.to_string(), "Unknown perilId: chain_halt:nowhere");
        let body = ErrorResponse::from(&err);
        assert!(!body.ok);
    }

    #[test]
    fn empty_peril_id_is_rejected() {
        let err = QuoteRequest::default()
            .resolve(&catalog(), &QuoteDefaults::canonical())
            .unwrap_err();
        assert!(matches!(err, RequestError::MissingPerilId));
    }

    #[test]
    fn undeclared_regime_is_rejected() {
        let mut peril = depeg_peril();
        peril.regimes = vec![Regime::Calm];
        let catalog = PerilCatalog::new(None, vec![peril]).unwrap();
        let req = QuoteRequest { regime: Some(Regime::Crisis), ..QuoteRequest::for_peril("stablecoin_depeg:USDC") };
        assert!(matches!(
            req.resolve(&catalog, &QuoteDefaults::canonical()),
            Err(RequestError::UnsupportedRegime { regime: Regime::Crisis, .. })
        ));
    }

    #[test]
    fn non_finite_and_non_positive_limits_are_rejected() {
        let defaults = QuoteDefaults::canonical();
        let nan = QuoteRequest { limit_usd: Some(f64::NAN), ..QuoteRequest::for_peril("stablecoin_depeg:USDC") };
        assert!(matches!(nan.resolve(&catalog(), &defaults), Err(RequestError::NotFinite { field: "limitUSD", .. })));
        let zero = QuoteRequest { limit_usd: Some(0.0), ..QuoteRequest::for_peril("stablecoin_depeg:USDC") };
        assert!(matches!(zero.resolve(&catalog(), &defaults), Err(RequestError::NonPositiveLimit(_))));
    }

    #[test]
    fn request_parses_api_field_names() {
        let json = r#"{"perilId": "stablecoin_depeg:USDC", "regime": "crisis", "limitUSD": 250000, "attachmentPct": 0.1, "tvar99_headroom_usd": 1e6}"#;
        let req: QuoteRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.regime, Some(Regime::Crisis));
        assert_eq!(req.limit_usd, Some(250_000.0));
        assert_eq!(req.attachment_pct, Some(0.1));
        assert_eq!(req.tvar99_headroom_usd, Some(1e6));
        assert!(req.utilization.is_none());
    }

    #[test]
    fn quote_prices_resolved_input() {
        let engine = PricingEngine::new();
        let req = QuoteRequest {
            regime: Some(Regime::Crisis),
            utilization: Some(0.42),
            ..QuoteRequest::for_peril("stablecoin_depeg:USDC")
        };
        let resp = quote(&engine, &catalog(), &QuoteDefaults::canonical(), &req).unwrap();
        assert!(resp.ok);
        assert_eq!(resp.breakdown, engine.price(&resp.input));
        let v = serde_json::to_value(&resp).unwrap();
        assert!(v["breakdown"]["premium"].as_f64().unwrap() > 0.0);
        assert_eq!(v["input"]["perilId"], "stablecoin_depeg:USDC");
    }
}
