use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Opaque identifier a persistence sink assigns to a recorded quote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct QuoteId(pub u64);

/// Categorical market-stress state. Selects which tail parameters apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Regime {
    Calm,
    Volatile,
    Crisis,
}

impl Regime {
    pub const ALL: [Regime; 3] = [Regime::Calm, Regime::Volatile, Regime::Crisis];

    pub fn as_str(self) -> &'static str {
        match self {
            Regime::Calm => "calm",
            Regime::Volatile => "volatile",
            Regime::Crisis => "crisis",
        }
    }
}

impl fmt::Display for Regime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for Regime {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "calm" => Ok(Regime::Calm),
            "volatile" => Ok(Regime::Volatile),
            "crisis" => Ok(Regime::Crisis),
            other => Err(format!("unknown regime '{other}' (expected calm, volatile or crisis)")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn regime_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Regime::Crisis).unwrap(), r#""crisis""#);
        let r: Regime = serde_json::from_str(r#""calm""#).unwrap();
        assert_eq!(r, Regime::Calm);
    }

    #[test]
    fn regime_parses_case_insensitively() {
        assert_eq!("Volatile".parse::<Regime>().unwrap(), Regime::Volatile);
        assert!("panic".parse::<Regime>().is_err());
    }

    #[test]
    fn regime_display_round_trips_through_from_str() {
        for r in Regime::ALL {
            assert_eq!(r.to_string().parse::<Regime>().unwrap(), r);
        }
    }

    #[test]
    fn quote_id_serializes_as_bare_number() {
        assert_eq!(serde_json::to_string(&QuoteId(7)).unwrap(), "7");
    }
}
