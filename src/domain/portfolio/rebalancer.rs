//! Drift/calendar rebalance trigger and order generation.

use super::weights::Weights;
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RebalanceConfig {
    pub drift_threshold: f64,
    pub min_trade_notional: f64,
    pub fee_bps: f64,
    pub tax_bps_on_sell: f64,
}

impl Default for RebalanceConfig {
    fn default() -> Self {
        RebalanceConfig {
            drift_threshold: 0.05,
            min_trade_notional: 100.0,
            fee_bps: 5.0,
            tax_bps_on_sell: 10.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Buy,
    Sell,
}

/// Rebalance input, as read from a JSON document.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct RebalanceInput {
    pub current_weights: Weights,
    pub target_weights: Weights,
    pub portfolio_value: f64,
    pub prices: Weights,
    pub as_of: Option<NaiveDate>,
    pub last_rebalance_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RebalanceCheck {
    pub trigger: bool,
    pub max_abs_drift: f64,
    pub monthly_force: bool,
    /// current - target, per asset.
    pub drift_by_asset: Weights,
    pub as_of: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RebalanceOrder {
    pub asset: String,
    pub side: Side,
    pub target_weight: f64,
    pub current_weight: f64,
    pub trade_weight: f64,
    /// Absolute traded value.
    pub trade_notional: f64,
    pub price: f64,
    pub qty: f64,
    pub estimated_cost: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct OrderSummary {
    pub total_buy_notional: f64,
    pub total_sell_notional: f64,
    pub estimated_cost: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RebalancePlan {
    #[serde(flatten)]
    pub check: RebalanceCheck,
    pub orders: Vec<RebalanceOrder>,
    pub summary: OrderSummary,
}

fn clean(weights: &Weights) -> Weights {
    weights
        .iter()
        .map(|(k, v)| (k.trim().to_uppercase(), if v.is_finite() { *v } else { 0.0 }))
        .filter(|(k, _)| !k.is_empty())
        .collect()
}

#[derive(Debug, Clone, Default)]
pub struct PortfolioRebalancer {
    config: RebalanceConfig,
}

impl PortfolioRebalancer {
    pub fn new(config: RebalanceConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RebalanceConfig {
        &self.config
    }

    /// Fires on drift at or above the threshold, on a new calendar month,
    /// or when there has never been a rebalance.
    pub fn check(
        &self,
        current: &Weights,
        target: &Weights,
        as_of: NaiveDate,
        last_rebalance: Option<NaiveDate>,
    ) -> RebalanceCheck {
        let cur = clean(current);
        let tgt = clean(target);
        let assets: BTreeSet<&String> = cur.keys().chain(tgt.keys()).collect();

        let drift_by_asset: Weights = assets
            .into_iter()
            .map(|a| {
                let drift = cur.get(a).copied().unwrap_or(0.0) - tgt.get(a).copied().unwrap_or(0.0);
                (a.clone(), drift)
            })
            .collect();
        let max_abs_drift = drift_by_asset.values().fold(0.0_f64, |m, d| m.max(d.abs()));

        let monthly_force = match last_rebalance {
            Some(last) => (last.year(), last.month()) != (as_of.year(), as_of.month()),
            None => true,
        };

        RebalanceCheck {
            trigger: max_abs_drift >= self.config.drift_threshold || monthly_force,
            max_abs_drift,
            monthly_force,
            drift_by_asset,
            as_of,
        }
    }

    /// Orders that move `current` to `target`. Nothing is generated unless
    /// [`check`](Self::check) triggers. Assets without a price are sized in
    /// notional units.
    pub fn plan(&self, input: &RebalanceInput, as_of: NaiveDate) -> RebalancePlan {
        let check = self.check(
            &input.current_weights,
            &input.target_weights,
            as_of,
            input.last_rebalance_date,
        );
        let mut plan = RebalancePlan {
            check,
            orders: Vec::new(),
            summary: OrderSummary::default(),
        };
        if !plan.check.trigger {
            tracing::info!(drift = plan.check.max_abs_drift, "within drift threshold, no orders");
            return plan;
        }

        let value = if input.portfolio_value.is_finite() {
            input.portfolio_value.max(0.0)
        } else {
            0.0
        };
        let cur = clean(&input.current_weights);
        let tgt = clean(&input.target_weights);
        let prices = clean(&input.prices);

        for asset in plan.check.drift_by_asset.keys() {
            let current_weight = cur.get(asset).copied().unwrap_or(0.0);
            let target_weight = tgt.get(asset).copied().unwrap_or(0.0);
            let trade_weight = target_weight - current_weight;
            let signed = trade_weight * value;
            if signed.abs() < self.config.min_trade_notional {
                continue;
            }

            let side = if signed > 0.0 { Side::Buy } else { Side::Sell };
            let notional = signed.abs();
            let price = prices.get(asset).map(|p| p.max(0.0)).unwrap_or(1.0);
            let qty = if price > 0.0 { notional / price } else { 0.0 };
            let fee = notional * self.config.fee_bps / 10_000.0;
            let tax = match side {
                Side::Sell => notional * self.config.tax_bps_on_sell / 10_000.0,
                Side::Buy => 0.0,
            };

            match side {
                Side::Buy => plan.summary.total_buy_notional += notional,
                Side::Sell => plan.summary.total_sell_notional += notional,
            }
            plan.summary.estimated_cost += fee + tax;
            plan.orders.push(RebalanceOrder {
                asset: asset.clone(),
                side,
                target_weight,
                current_weight,
                trade_weight,
                trade_notional: notional,
                price,
                qty,
                estimated_cost: fee + tax,
            });
        }
        plan
    }
}
