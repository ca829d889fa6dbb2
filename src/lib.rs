//! Premium quoting for parametric triggers (stablecoin depegs, oracle
//! failures, chain halts).
//!
//! [`exceedance`] turns a per-regime GPD tail into annualized exceedance
//! probabilities, [`payout`] maps trigger intensity to a payout fraction, and
//! [`pricing`] integrates the two into an expected loss before layering the
//! risk, capital, liquidity and overhead loads.

pub mod catalog;
pub mod config;
pub mod error;
pub mod exceedance;
pub mod payout;
pub mod perils;
pub mod pricing;
pub mod request;
pub mod sink;
pub mod tail_sim;
pub mod types;

pub use catalog::{CatalogHandle, PerilCatalog};
pub use config::{EngineConfig, QuoteDefaults, Settings};
pub use error::{Error, Result};
pub use pricing::{PortfolioState, PricingEngine, QuoteBreakdown, QuoteInput};
pub use types::Regime;
