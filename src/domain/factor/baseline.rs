//! The twenty baseline factors.
//!
//! Sign conventions are normalized so that a higher value is always more
//! attractive: valuation multiples, leverage and accruals are negated, and a
//! non-positive multiple (loss-making or missing) scores neutral.

use super::context::FactorContext;
use super::registry::{FactorCategory, FactorRegistry, UniverseScope};
use super::technical;
use crate::domain::error::QuantError;
use crate::domain::market::Market;
use chrono::NaiveDate;

type Calc = fn(&FactorContext, &str, NaiveDate, Market) -> Result<f64, QuantError>;

const BASELINE: [(&str, FactorCategory, Calc); 20] = [
    ("momentum_12m", FactorCategory::Momentum, momentum_12m),
    ("momentum_1m", FactorCategory::Momentum, momentum_1m),
    ("rsi_14d", FactorCategory::Technical, rsi_14d),
    ("macd_signal", FactorCategory::Technical, macd_signal),
    ("pe_ratio", FactorCategory::Value, pe_ratio),
    ("pb_ratio", FactorCategory::Value, pb_ratio),
    ("ev_ebitda", FactorCategory::Value, ev_ebitda),
    ("roe", FactorCategory::Quality, roe),
    ("roa", FactorCategory::Quality, roa),
    ("debt_ratio", FactorCategory::Quality, debt_ratio),
    ("earnings_surprise", FactorCategory::Quality, earnings_surprise),
    ("revenue_growth", FactorCategory::Quality, revenue_growth),
    ("accruals", FactorCategory::Quality, accruals),
    ("volume_ratio_20d", FactorCategory::Technical, volume_ratio_20d),
    ("atr_pct", FactorCategory::Technical, atr_pct),
    ("bb_position", FactorCategory::Technical, bb_position),
    ("fg_index", FactorCategory::Sentiment, fg_index),
    ("search_trend", FactorCategory::Alternative, search_trend),
    ("social_sentiment", FactorCategory::Alternative, social_sentiment),
    ("orderbook_imbalance", FactorCategory::Alternative, orderbook_imbalance),
];

pub fn names() -> Vec<&'static str> {
    BASELINE.iter().map(|(n, _, _)| *n).collect()
}

/// Register every baseline factor. Names already present are skipped.
pub fn register_all(registry: &mut FactorRegistry) {
    for (name, category, calc) in BASELINE {
        if let Err(e) = registry.register(name, category, UniverseScope::All, calc) {
            tracing::debug!(factor = name, error = %e, "baseline factor not registered");
        }
    }
}

fn negated_multiple(v: f64) -> f64 {
    if v <= 0.0 { 0.0 } else { -v }
}

fn momentum_12m(ctx: &FactorContext, sym: &str, as_of: NaiveDate, mk: Market) -> Result<f64, QuantError> {
    let close = ctx.close(sym, as_of, mk, 280);
    Ok(technical::calc_return(&close, 252) * 100.0)
}

fn momentum_1m(ctx: &FactorContext, sym: &str, as_of: NaiveDate, mk: Market) -> Result<f64, QuantError> {
    let close = ctx.close(sym, as_of, mk, 60);
    Ok(technical::calc_return(&close, 21) * 100.0)
}

fn rsi_14d(ctx: &FactorContext, sym: &str, as_of: NaiveDate, mk: Market) -> Result<f64, QuantError> {
    Ok(technical::rsi(&ctx.close(sym, as_of, mk, 80), 14))
}

fn macd_signal(ctx: &FactorContext, sym: &str, as_of: NaiveDate, mk: Market) -> Result<f64, QuantError> {
    Ok(technical::macd_signal_delta(&ctx.close(sym, as_of, mk, 120)))
}

fn pe_ratio(ctx: &FactorContext, sym: &str, _: NaiveDate, mk: Market) -> Result<f64, QuantError> {
    Ok(negated_multiple(ctx.fundamentals(sym, mk).pe))
}

fn pb_ratio(ctx: &FactorContext, sym: &str, _: NaiveDate, mk: Market) -> Result<f64, QuantError> {
    Ok(negated_multiple(ctx.fundamentals(sym, mk).pb))
}

fn ev_ebitda(ctx: &FactorContext, sym: &str, _: NaiveDate, mk: Market) -> Result<f64, QuantError> {
    Ok(negated_multiple(ctx.fundamentals(sym, mk).ev_ebitda))
}

fn roe(ctx: &FactorContext, sym: &str, _: NaiveDate, mk: Market) -> Result<f64, QuantError> {
    Ok(ctx.fundamentals(sym, mk).roe)
}

fn roa(ctx: &FactorContext, sym: &str, _: NaiveDate, mk: Market) -> Result<f64, QuantError> {
    Ok(ctx.fundamentals(sym, mk).roa)
}

fn debt_ratio(ctx: &FactorContext, sym: &str, _: NaiveDate, mk: Market) -> Result<f64, QuantError> {
    Ok(negated_multiple(ctx.fundamentals(sym, mk).debt_ratio))
}

fn earnings_surprise(ctx: &FactorContext, sym: &str, _: NaiveDate, mk: Market) -> Result<f64, QuantError> {
    Ok(ctx.fundamentals(sym, mk).earnings_surprise)
}

fn revenue_growth(ctx: &FactorContext, sym: &str, _: NaiveDate, mk: Market) -> Result<f64, QuantError> {
    Ok(ctx.fundamentals(sym, mk).revenue_growth)
}

/// -(net income - operating income) / total assets
fn accruals(ctx: &FactorContext, sym: &str, _: NaiveDate, mk: Market) -> Result<f64, QuantError> {
    let f = ctx.fundamentals(sym, mk);
    if f.total_assets <= 0.0 {
        return Ok(0.0);
    }
    Ok(-(f.net_income - f.operating_income) / f.total_assets)
}

fn volume_ratio_20d(ctx: &FactorContext, sym: &str, as_of: NaiveDate, mk: Market) -> Result<f64, QuantError> {
    Ok(technical::volume_ratio(&ctx.ohlcv(sym, as_of, mk, 60), 20))
}

fn atr_pct(ctx: &FactorContext, sym: &str, as_of: NaiveDate, mk: Market) -> Result<f64, QuantError> {
    Ok(technical::atr_pct(&ctx.ohlcv(sym, as_of, mk, 80), 14) * 100.0)
}

fn bb_position(ctx: &FactorContext, sym: &str, as_of: NaiveDate, mk: Market) -> Result<f64, QuantError> {
    Ok(technical::bb_position(&ctx.close(sym, as_of, mk, 80), 20))
}

fn fg_index(ctx: &FactorContext, _: &str, _: NaiveDate, _: Market) -> Result<f64, QuantError> {
    Ok(ctx.fear_greed_index())
}

fn search_trend(ctx: &FactorContext, sym: &str, _: NaiveDate, _: Market) -> Result<f64, QuantError> {
    Ok(ctx.alt_data(sym).search_trend_7d)
}

fn social_sentiment(ctx: &FactorContext, sym: &str, _: NaiveDate, _: Market) -> Result<f64, QuantError> {
    Ok(ctx.alt_data(sym).sentiment_score)
}

fn orderbook_imbalance(ctx: &FactorContext, sym: &str, _: NaiveDate, mk: Market) -> Result<f64, QuantError> {
    Ok(ctx.orderbook_imbalance(sym, mk))
}
