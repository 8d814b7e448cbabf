//! Market identifiers and symbol normalization.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The three markets the research stack covers.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum Market {
    Kr,
    Us,
    Btc,
}

/// The single tradable symbol of the BTC market.
pub const BTC_SYMBOL: &str = "BTC";

impl Market {
    pub fn as_str(&self) -> &'static str {
        match self {
            Market::Kr => "kr",
            Market::Us => "us",
            Market::Btc => "btc",
        }
    }

    /// Uppercase and trim; KR codes additionally drop a leading `A` prefix
    /// (`A005930` and `005930` name the same listing).
    pub fn normalize_symbol(&self, symbol: &str) -> String {
        let s = symbol.trim().to_uppercase();
        match self {
            Market::Kr => s.trim_start_matches('A').to_string(),
            _ => s,
        }
    }

    /// Cache key shared by every per-(market, symbol) map.
    pub fn cache_key(&self, symbol: &str) -> String {
        format!("{}:{}", self.as_str(), self.normalize_symbol(symbol))
    }
}

impl fmt::Display for Market {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("unknown market: {0} (expected kr, us or btc)")]
pub struct UnknownMarket(pub String);

impl FromStr for Market {
    type Err = UnknownMarket;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "kr" => Ok(Market::Kr),
            "us" => Ok(Market::Us),
            "btc" => Ok(Market::Btc),
            other => Err(UnknownMarket(other.to_string())),
        }
    }
}
