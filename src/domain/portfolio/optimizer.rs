//! Two-level portfolio construction: bounded asset-class weights, then
//! capped single-name weights inside each class.

use super::weights::{Weights, allocate_with_cap, normalize, project_bounded};
use crate::domain::error::QuantError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Class label for assets missing from the class map.
pub const OTHER_CLASS: &str = "OTHER";

const PRIOR_BLEND: f64 = 0.7;
const MIN_VOL: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum OptimizeMethod {
    #[default]
    MeanVariance,
    RiskParity,
    BlackLitterman,
}

impl OptimizeMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            OptimizeMethod::MeanVariance => "mean_variance",
            OptimizeMethod::RiskParity => "risk_parity",
            OptimizeMethod::BlackLitterman => "black_litterman",
        }
    }
}

impl fmt::Display for OptimizeMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OptimizeMethod {
    type Err = QuantError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "mean_variance" | "mv" => Ok(OptimizeMethod::MeanVariance),
            "risk_parity" => Ok(OptimizeMethod::RiskParity),
            "black_litterman" | "bl" => Ok(OptimizeMethod::BlackLitterman),
            other => Err(QuantError::invalid(format!("unknown optimize method: {other}"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizerConfig {
    pub class_min_weight: f64,
    pub class_max_weight: f64,
    pub single_name_max_weight: f64,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        OptimizerConfig {
            class_min_weight: 0.10,
            class_max_weight: 0.50,
            single_name_max_weight: 0.05,
        }
    }
}

/// Optimizer input, as read from a JSON document.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct OptimizeInput {
    pub expected_returns: BTreeMap<String, f64>,
    /// Only the diagonal is read.
    pub covariance: BTreeMap<String, BTreeMap<String, f64>>,
    pub asset_class_map: BTreeMap<String, String>,
    /// Black-Litterman views; assets without a view use their prior.
    pub views: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OptimizationResult {
    pub method: OptimizeMethod,
    pub weights: Weights,
    pub class_weights: Weights,
    pub constraints: OptimizerConfig,
}

fn volatility(asset: &str, covariance: &BTreeMap<String, BTreeMap<String, f64>>) -> f64 {
    let var = covariance
        .get(asset)
        .and_then(|row| row.get(asset))
        .copied()
        .unwrap_or(0.0);
    if var.is_finite() && var > 0.0 { var.sqrt() } else { 1.0 }
}

fn finite_or_zero(v: f64) -> f64 {
    if v.is_finite() { v } else { 0.0 }
}

fn upper_keys<V: Clone>(map: &BTreeMap<String, V>) -> BTreeMap<String, V> {
    map.iter()
        .map(|(k, v)| (k.trim().to_uppercase(), v.clone()))
        .filter(|(k, _)| !k.is_empty())
        .collect()
}

#[derive(Debug, Clone, Default)]
pub struct PortfolioOptimizer {
    config: OptimizerConfig,
}

impl PortfolioOptimizer {
    pub fn new(config: OptimizerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &OptimizerConfig {
        &self.config
    }

    /// Per-asset attractiveness before any constraint is applied.
    pub fn raw_scores(&self, input: &OptimizeInput, method: OptimizeMethod) -> Weights {
        let er = upper_keys(&input.expected_returns);
        let cov = upper_keys(&input.covariance);
        let views = upper_keys(&input.views);

        er.iter()
            .map(|(asset, r)| {
                let r = finite_or_zero(*r);
                let vol = volatility(asset, &cov).max(MIN_VOL);
                let score = match method {
                    OptimizeMethod::RiskParity => 1.0 / vol,
                    OptimizeMethod::MeanVariance => r.max(0.0) / vol,
                    OptimizeMethod::BlackLitterman => {
                        let view = views.get(asset).copied().map(finite_or_zero).unwrap_or(r);
                        (PRIOR_BLEND * r + (1.0 - PRIOR_BLEND) * view).max(0.0) / vol
                    }
                };
                (asset.clone(), score)
            })
            .collect()
    }

    /// Class bounds made feasible for `k` classes.
    fn class_bounds(&self, k: usize) -> (f64, f64) {
        let mut low = finite_or_zero(self.config.class_min_weight).max(0.0);
        let mut high = finite_or_zero(self.config.class_max_weight).max(low);
        let k = k.max(1) as f64;
        if low * k > 1.0 {
            low = 1.0 / k;
        }
        if high * k < 1.0 {
            high = 1.0;
        }
        (low, high)
    }

    pub fn optimize(&self, input: &OptimizeInput, method: OptimizeMethod) -> OptimizationResult {
        let mut result = OptimizationResult {
            method,
            weights: Weights::new(),
            class_weights: Weights::new(),
            constraints: self.config.clone(),
        };
        if input.expected_returns.is_empty() {
            return result;
        }

        let mut raw: Weights = self
            .raw_scores(input, method)
            .into_iter()
            .filter(|(_, v)| *v > 0.0)
            .collect();
        if raw.is_empty() {
            tracing::debug!(%method, "no asset with a positive score, scoring equally");
            raw = upper_keys(&input.expected_returns)
                .into_keys()
                .map(|a| (a, 1.0))
                .collect();
        }

        let class_map = upper_keys(&input.asset_class_map);
        let class_of = |asset: &str| -> String {
            class_map
                .get(asset)
                .map(|c| c.trim().to_uppercase())
                .filter(|c| !c.is_empty())
                .unwrap_or_else(|| OTHER_CLASS.to_string())
        };

        let mut by_class: BTreeMap<String, Weights> = BTreeMap::new();
        for (asset, score) in &raw {
            by_class
                .entry(class_of(asset))
                .or_default()
                .insert(asset.clone(), *score);
        }

        let raw_class: Weights = by_class
            .iter()
            .map(|(c, assets)| (c.clone(), assets.values().sum()))
            .collect();
        let (low, high) = self.class_bounds(raw_class.len());
        let class_w = project_bounded(&raw_class, low, high);

        let mut weights = Weights::new();
        for (class, assets) in &by_class {
            let total = class_w.get(class).copied().unwrap_or(0.0);
            weights.extend(allocate_with_cap(total, assets, self.config.single_name_max_weight));
        }
        let weights = normalize(&weights);

        let mut class_weights = Weights::new();
        for (asset, w) in &weights {
            *class_weights.entry(class_of(asset)).or_insert(0.0) += w;
        }

        result.weights = weights;
        result.class_weights = class_weights;
        result
    }
}
