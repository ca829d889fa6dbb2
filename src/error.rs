//! Error types for the pricing crate.
//!
//! The pricing core itself is total; these errors belong to the layers around
//! it: configuration, catalog loading, request resolution and the quote sink.

use thiserror::Error;

use crate::types::Regime;

/// Result alias over the umbrella [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("catalog error: {0}")]
    Catalog(#[from] CatalogError),

    #[error("request error: {0}")]
    Request(#[from] RequestError),

    #[error("sink error: {0}")]
    Sink(#[from] SinkError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Invalid engine constants or request defaults.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{field} must lie in [0, 1], got {value}")]
    NotAProbability { field: &'static str, value: f64 },

    #[error("{field} must be finite and positive, got {value}")]
    NotPositive { field: &'static str, value: f64 },

    #[error("tvar_gap must be at least 1.0, got {0}")]
    GapBelowOne(f64),

    #[error("grid_intervals must be at least 1")]
    EmptyGrid,

    #[error("failed to read settings: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse settings: {0}")]
    Json(#[from] serde_json::Error),
}

/// Structural problems with a peril catalog, reported at load time.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("failed to read catalog: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse catalog: {0}")]
    Json(#[from] serde_json::Error),

    #[error("duplicate peril id '{0}'")]
    DuplicateId(String),

    #[error("peril '{peril}' declares no regimes")]
    NoRegimes { peril: String },

    #[error("peril '{peril}' is missing GPD parameters for regime {regime}")]
    MissingGpd { peril: String, regime: Regime },

    #[error("peril '{peril}' is missing a POT threshold for regime {regime}")]
    MissingThreshold { peril: String, regime: Regime },

    #[error("peril '{peril}' regime {regime}: {reason}")]
    InvalidTail { peril: String, regime: Regime, reason: String },

    #[error("peril '{peril}' payout: {reason}")]
    InvalidPayout { peril: String, reason: String },

    #[error("peril '{peril}' pricing: {reason}")]
    InvalidPricing { peril: String, reason: String },
}

/// Client-side errors raised while turning a request into a `QuoteInput`.
#[derive(Debug, Error)]
pub enum RequestError {
    #[error("Unknown perilId: {0}")]
    UnknownPeril(String),

    #[error("peril '{peril}' does not support regime {regime}")]
    UnsupportedRegime { peril: String, regime: Regime },

    #[error("{field} must be a finite number, got {value}")]
    NotFinite { field: &'static str, value: f64 },

    #[error("limitUSD must be positive, got {0}")]
    NonPositiveLimit(f64),

    #[error("perilId required")]
    MissingPerilId,
}

/// Failures writing quote records.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("failed to write quote record: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to serialize quote record: {0}")]
    Json(#[from] serde_json::Error),
}
