//! Turns per-factor statistics (or a factor/return panel) into a capped
//! weight vector, and scores symbols with it.

use super::analyzer::{FactorAnalysisResult, is_valid};
use crate::domain::error::QuantError;
use crate::domain::portfolio::weights::{Weights, cap_and_redistribute};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

const VALID_BONUS: f64 = 1.2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum CombineMethod {
    #[default]
    IcWeighted,
    Ridge,
    Lasso,
}

impl CombineMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            CombineMethod::IcWeighted => "ic_weighted",
            CombineMethod::Ridge => "ridge",
            CombineMethod::Lasso => "lasso",
        }
    }
}

impl fmt::Display for CombineMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CombineMethod {
    type Err = QuantError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "ic_weighted" | "ic" => Ok(CombineMethod::IcWeighted),
            "ridge" => Ok(CombineMethod::Ridge),
            "lasso" => Ok(CombineMethod::Lasso),
            other => Err(QuantError::invalid(format!("unknown combine method: {other}"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CombineConfig {
    pub method: CombineMethod,
    /// Regularization strength for ridge and lasso.
    pub l2_alpha: f64,
    pub max_weight: f64,
}

impl Default for CombineConfig {
    fn default() -> Self {
        CombineConfig {
            method: CombineMethod::IcWeighted,
            l2_alpha: 1.0,
            max_weight: 0.30,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct IcStat {
    pub ic_mean: f64,
    pub ic_ir: f64,
}

impl From<&FactorAnalysisResult> for IcStat {
    fn from(r: &FactorAnalysisResult) -> Self {
        IcStat {
            ic_mean: r.ic_mean,
            ic_ir: r.ic_ir,
        }
    }
}

/// Raw IC weights before capping: `ic_mean * ic_ir`, with a bonus for
/// factors that pass the validity thresholds. Factors without positive
/// statistics get 0; if every factor ends at 0 the weights are equal.
pub fn ic_weights(names: &[String], ic_stats: &BTreeMap<String, IcStat>) -> Weights {
    let mut out: Weights = names
        .iter()
        .map(|name| {
            let stat = ic_stats.get(name).copied().unwrap_or_default();
            let (m, ir) = (stat.ic_mean, stat.ic_ir);
            let w = if !m.is_finite() || !ir.is_finite() || m <= 0.0 || ir <= 0.0 {
                0.0
            } else if is_valid(m, ir) {
                m * ir * VALID_BONUS
            } else {
                m * ir
            };
            (name.clone(), w)
        })
        .collect();

    if out.values().all(|w| *w <= 0.0) {
        tracing::debug!(factors = names.len(), "no factor with positive IC, equal weights");
        out.values_mut().for_each(|w| *w = 1.0);
    }
    out
}

fn equal(names: &[String]) -> Weights {
    names.iter().map(|n| (n.clone(), 1.0)).collect()
}

/// Weighted sum of factor values; names missing from `values` count as 0.
pub fn score(values: &BTreeMap<String, f64>, weights: &Weights) -> f64 {
    weights
        .iter()
        .map(|(name, w)| {
            let v = values.get(name).copied().filter(|v| v.is_finite()).unwrap_or(0.0);
            v * if w.is_finite() { *w } else { 0.0 }
        })
        .sum()
}

#[derive(Debug, Clone, Default)]
pub struct FactorCombiner {
    config: CombineConfig,
}

impl FactorCombiner {
    pub fn new(config: CombineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &CombineConfig {
        &self.config
    }

    /// Fit factor weights. `names` defaults to every column seen in
    /// `matrix`; the result sums to 1 with no weight above the cap (the cap
    /// is raised to `1/k` when fewer than `1/cap` factors carry weight).
    pub fn fit(
        &self,
        matrix: &[BTreeMap<String, f64>],
        targets: &[f64],
        names: Option<&[String]>,
        ic_stats: &BTreeMap<String, IcStat>,
    ) -> Weights {
        let names: Vec<String> = match names {
            Some(n) => n.to_vec(),
            None => matrix
                .iter()
                .flat_map(|row| row.keys().cloned())
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect(),
        };
        if names.is_empty() {
            return Weights::new();
        }

        let raw = match self.config.method {
            CombineMethod::IcWeighted => ic_weights(&names, ic_stats),
            CombineMethod::Ridge | CombineMethod::Lasso => self.fit_regression(matrix, targets, &names),
        };
        cap_and_redistribute(&raw, self.config.max_weight)
    }

    fn fit_regression(&self, matrix: &[BTreeMap<String, f64>], targets: &[f64], names: &[String]) -> Weights {
        if matrix.is_empty() || matrix.len() != targets.len() {
            tracing::warn!(
                method = %self.config.method,
                rows = matrix.len(),
                targets = targets.len(),
                "factor matrix and targets do not line up, using equal weights"
            );
            return equal(names);
        }
        self.regress(matrix, targets, names)
    }

    #[cfg(feature = "regression")]
    fn regress(&self, matrix: &[BTreeMap<String, f64>], targets: &[f64], names: &[String]) -> Weights {
        use super::regression;

        let x = regression::design_matrix(matrix, names);
        let y = ndarray::Array1::from_iter(targets.iter().map(|v| if v.is_finite() { *v } else { 0.0 }));
        let coef = match self.config.method {
            CombineMethod::Lasso => regression::lasso_coefficients(&x, &y, self.config.l2_alpha, 10_000, 1e-6),
            _ => regression::ridge_coefficients(&x, &y, self.config.l2_alpha),
        };
        match coef {
            Ok(coef) => {
                let w: Weights = names
                    .iter()
                    .zip(coef.iter())
                    .map(|(n, c)| (n.clone(), c.max(0.0)))
                    .collect();
                if w.values().sum::<f64>() > 0.0 {
                    w
                } else {
                    tracing::debug!(method = %self.config.method, "no positive coefficient, equal weights");
                    equal(names)
                }
            }
            Err(e) => {
                tracing::warn!(method = %self.config.method, error = %e, "regression fit failed, using equal weights");
                equal(names)
            }
        }
    }

    #[cfg(not(feature = "regression"))]
    fn regress(&self, _matrix: &[BTreeMap<String, f64>], _targets: &[f64], names: &[String]) -> Weights {
        tracing::warn!(
            method = %self.config.method,
            "regression support not compiled in, using equal weights"
        );
        equal(names)
    }
}
