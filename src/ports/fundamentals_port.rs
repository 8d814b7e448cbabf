//! Fundamentals and alternative-data providers consumed by factor functions.

use crate::domain::error::QuantError;
use crate::domain::market::Market;
use serde::{Deserialize, Serialize};

/// Flat ratio snapshot. Missing fields are zero.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Fundamentals {
    pub pe: f64,
    pub pb: f64,
    pub roe: f64,
    pub roa: f64,
    pub debt_ratio: f64,
    pub ev_ebitda: f64,
    pub revenue_growth: f64,
    pub earnings_surprise: f64,
    pub net_income: f64,
    pub operating_income: f64,
    pub total_assets: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AltData {
    pub search_trend_7d: f64,
    pub sentiment_score: f64,
}

pub trait FundamentalsPort {
    fn fundamentals(&self, symbol: &str, market: Market)
    -> Result<Option<Fundamentals>, QuantError>;
}

pub trait AltDataPort {
    fn alt_data(&self, symbol: &str) -> Result<Option<AltData>, QuantError>;

    /// Latest macro fear & greed reading on a 0-100 scale.
    fn fear_greed_index(&self) -> Result<Option<f64>, QuantError>;

    /// Bid/ask volume imbalance from the latest order-book snapshot.
    fn orderbook_imbalance(&self, symbol: &str) -> Result<Option<f64>, QuantError>;
}
