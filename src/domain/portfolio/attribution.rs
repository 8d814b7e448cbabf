//! Brinson return attribution and factor contribution.

use super::weights::Weights;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttributionRow {
    pub asset: String,
    pub portfolio_weight: f64,
    pub benchmark_weight: f64,
    pub portfolio_return: f64,
    pub benchmark_return: f64,
    pub allocation_effect: f64,
    pub selection_effect: f64,
    pub interaction_effect: f64,
    pub total_effect: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BrinsonResult {
    pub rows: Vec<AttributionRow>,
    pub portfolio_return: f64,
    pub benchmark_return: f64,
    pub allocation_effect: f64,
    pub selection_effect: f64,
    pub interaction_effect: f64,
    /// Sum of the three effects over every asset.
    pub active_return: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FactorContributionRow {
    pub factor: String,
    pub exposure: f64,
    pub factor_return: f64,
    pub contribution: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FactorContribution {
    /// Largest absolute contribution first.
    pub rows: Vec<FactorContributionRow>,
    pub total_factor_contribution: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttributionSummary {
    pub active_return: f64,
    pub allocation_effect: f64,
    pub selection_effect: f64,
    pub interaction_effect: f64,
    pub factor_total: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttributionReport {
    pub month: String,
    pub brinson: BrinsonResult,
    pub factor: FactorContribution,
    pub summary: AttributionSummary,
}

/// Attribution input, as read from a JSON document.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct AttributionInput {
    pub portfolio_weights: Weights,
    pub benchmark_weights: Weights,
    pub portfolio_returns: Weights,
    pub benchmark_returns: Weights,
    pub factor_exposure: Weights,
    pub factor_return: Weights,
    /// `YYYY-MM`; the caller fills in the current month when absent.
    pub month: Option<String>,
}

fn upper(map: &Weights) -> Weights {
    map.iter()
        .map(|(k, v)| (k.trim().to_uppercase(), if v.is_finite() { *v } else { 0.0 }))
        .filter(|(k, _)| !k.is_empty())
        .collect()
}

fn get(map: &Weights, key: &str) -> f64 {
    map.get(key).copied().unwrap_or(0.0)
}

pub fn brinson(
    portfolio_weights: &Weights,
    benchmark_weights: &Weights,
    portfolio_returns: &Weights,
    benchmark_returns: &Weights,
) -> BrinsonResult {
    let (wp, wb) = (upper(portfolio_weights), upper(benchmark_weights));
    let (rp, rb) = (upper(portfolio_returns), upper(benchmark_returns));
    let assets: BTreeSet<&String> = wp.keys().chain(wb.keys()).chain(rp.keys()).chain(rb.keys()).collect();

    let benchmark_return: f64 = assets.iter().map(|a| get(&wb, a) * get(&rb, a)).sum();
    let portfolio_return: f64 = assets.iter().map(|a| get(&wp, a) * get(&rp, a)).sum();

    let rows: Vec<AttributionRow> = assets
        .into_iter()
        .map(|a| {
            let (pw, bw, pr, br) = (get(&wp, a), get(&wb, a), get(&rp, a), get(&rb, a));
            let allocation = (pw - bw) * (br - benchmark_return);
            let selection = bw * (pr - br);
            let interaction = (pw - bw) * (pr - br);
            AttributionRow {
                asset: a.clone(),
                portfolio_weight: pw,
                benchmark_weight: bw,
                portfolio_return: pr,
                benchmark_return: br,
                allocation_effect: allocation,
                selection_effect: selection,
                interaction_effect: interaction,
                total_effect: allocation + selection + interaction,
            }
        })
        .collect();

    let allocation_effect: f64 = rows.iter().map(|r| r.allocation_effect).sum();
    let selection_effect: f64 = rows.iter().map(|r| r.selection_effect).sum();
    let interaction_effect: f64 = rows.iter().map(|r| r.interaction_effect).sum();

    BrinsonResult {
        rows,
        portfolio_return,
        benchmark_return,
        allocation_effect,
        selection_effect,
        interaction_effect,
        active_return: allocation_effect + selection_effect + interaction_effect,
    }
}

pub fn factor_contribution(exposure: &Weights, factor_return: &Weights) -> FactorContribution {
    let names: BTreeSet<&String> = exposure.keys().chain(factor_return.keys()).collect();
    let mut rows: Vec<FactorContributionRow> = names
        .into_iter()
        .map(|n| {
            let e = exposure.get(n).copied().filter(|v| v.is_finite()).unwrap_or(0.0);
            let r = factor_return.get(n).copied().filter(|v| v.is_finite()).unwrap_or(0.0);
            FactorContributionRow {
                factor: n.clone(),
                exposure: e,
                factor_return: r,
                contribution: e * r,
            }
        })
        .collect();
    let total_factor_contribution = rows.iter().map(|r| r.contribution).sum();
    rows.sort_by(|a, b| b.contribution.abs().total_cmp(&a.contribution.abs()));
    FactorContribution {
        rows,
        total_factor_contribution,
    }
}

pub fn report(input: &AttributionInput, month: &str) -> AttributionReport {
    let brinson = brinson(
        &input.portfolio_weights,
        &input.benchmark_weights,
        &input.portfolio_returns,
        &input.benchmark_returns,
    );
    let factor = factor_contribution(&input.factor_exposure, &input.factor_return);
    let summary = AttributionSummary {
        active_return: brinson.active_return,
        allocation_effect: brinson.allocation_effect,
        selection_effect: brinson.selection_effect,
        interaction_effect: brinson.interaction_effect,
        factor_total: factor.total_factor_contribution,
    };
    AttributionReport {
        month: input.month.clone().unwrap_or_else(|| month.to_string()),
        brinson,
        factor,
        summary,
    }
}
