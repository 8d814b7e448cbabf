//! Cross-sectional factor validity testing.
//!
//! For each month-end in the evaluation range the analyzer pairs every
//! symbol's factor value with its forward return, then measures rank-free
//! predictive power (Pearson IC) and the shape of returns across quantile
//! buckets.

use super::context::FactorContext;
use super::registry::FactorRegistry;
use crate::domain::error::QuantError;
use crate::domain::market::Market;
use crate::domain::stats::{mean, pearson, sample_std};
use chrono::{Datelike, Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const IC_MEAN_THRESHOLD: f64 = 0.03;
pub const IC_IR_THRESHOLD: f64 = 0.5;

/// A factor is usable for combination when both IC statistics clear their thresholds.
pub fn is_valid(ic_mean: f64, ic_ir: f64) -> bool {
    ic_mean > IC_MEAN_THRESHOLD && ic_ir > IC_IR_THRESHOLD
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactorAnalysisResult {
    pub factor_name: String,
    pub ic_mean: f64,
    pub ic_ir: f64,
    pub quantile_spread: f64,
    pub monotonicity: f64,
    pub is_valid: bool,
    pub observation_count: usize,
    pub period_count: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisConfig {
    pub horizon_days: usize,
    pub min_cross_section: usize,
    pub quantiles: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        AnalysisConfig {
            horizon_days: 21,
            min_cross_section: 10,
            quantiles: 5,
        }
    }
}

/// Last calendar day of every month touching `[start, end]`, clipped to `end`.
pub fn month_end_dates(start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
    let mut out = Vec::new();
    if start > end {
        return out;
    }
    let Some(mut cur) = NaiveDate::from_ymd_opt(start.year(), start.month(), 1) else {
        return out;
    };
    while cur <= end {
        let next = if cur.month() == 12 {
            NaiveDate::from_ymd_opt(cur.year() + 1, 1, 1)
        } else {
            NaiveDate::from_ymd_opt(cur.year(), cur.month() + 1, 1)
        };
        let Some(next) = next else { break };
        let month_end = (next - Duration::days(1)).min(end);
        if month_end >= start {
            out.push(month_end);
        }
        cur = next;
    }
    out
}

/// Split `(factor, return)` pairs into `q` equal-sized buckets by factor
/// value, lowest first. Bucket `i` spans sorted indices
/// `[i*n/q, (i+1)*n/q)`; empty buckets are dropped.
pub fn quantile_buckets(pairs: &[(f64, f64)], q: usize) -> Vec<Vec<(f64, f64)>> {
    if pairs.is_empty() || q <= 1 {
        return vec![pairs.to_vec()];
    }
    let mut sorted = pairs.to_vec();
    sorted.sort_by(|a, b| a.0.total_cmp(&b.0));
    let n = sorted.len();
    (0..q)
        .filter_map(|i| {
            let lo = i * n / q;
            let hi = (i + 1) * n / q;
            (hi > lo).then(|| sorted[lo..hi].to_vec())
        })
        .collect()
}

/// Share of adjacent bucket pairs whose mean return does not decrease.
pub fn monotonicity_ratio(bucket_means: &[f64]) -> f64 {
    if bucket_means.len() < 2 {
        return 0.0;
    }
    let good = bucket_means.windows(2).filter(|w| w[1] >= w[0]).count();
    good as f64 / (bucket_means.len() - 1) as f64
}

pub struct FactorAnalyzer<'a> {
    registry: &'a FactorRegistry,
    context: &'a FactorContext,
    config: AnalysisConfig,
}

impl<'a> FactorAnalyzer<'a> {
    pub fn new(registry: &'a FactorRegistry, context: &'a FactorContext) -> Self {
        Self {
            registry,
            context,
            config: AnalysisConfig::default(),
        }
    }

    pub fn with_config(mut self, config: AnalysisConfig) -> Self {
        self.config = config;
        self
    }

    pub fn analyze_factor(
        &self,
        factor_name: &str,
        symbols: &[String],
        start: NaiveDate,
        end: NaiveDate,
        market: Market,
    ) -> Result<FactorAnalysisResult, QuantError> {
        if self.registry.get(factor_name).is_none() {
            return Err(QuantError::UnknownFactor(factor_name.to_string()));
        }

        let symbols: Vec<String> = symbols
            .iter()
            .map(|s| s.trim().to_uppercase())
            .filter(|s| !s.is_empty())
            .collect();
        let min_pairs = self.config.min_cross_section.max(2);

        let mut ics = Vec::new();
        let mut spreads = Vec::new();
        let mut mono = Vec::new();
        let mut observations = 0;

        for date in month_end_dates(start, end) {
            let mut pairs = Vec::with_capacity(symbols.len());
            for sym in &symbols {
                let Some(fr) =
                    self.context
                        .forward_return(sym, date, market, self.config.horizon_days)
                else {
                    continue;
                };
                let fv = self.registry.calc(self.context, factor_name, date, sym, market)?;
                if fv.is_finite() && fr.is_finite() {
                    pairs.push((fv, fr));
                }
            }

            if pairs.len() < min_pairs {
                tracing::debug!(factor = factor_name, %date, pairs = pairs.len(), "cross-section too thin, skipped");
                continue;
            }

            let (xs, ys): (Vec<f64>, Vec<f64>) = pairs.iter().copied().unzip();
            ics.push(pearson(&xs, &ys));
            observations += pairs.len();

            let buckets = quantile_buckets(&pairs, self.config.quantiles);
            if buckets.len() >= 2 {
                let means: Vec<f64> = buckets
                    .iter()
                    .map(|b| mean(&b.iter().map(|(_, r)| *r).collect::<Vec<_>>()))
                    .collect();
                spreads.push(means[means.len() - 1] - means[0]);
                mono.push(monotonicity_ratio(&means));
            }
        }

        let ic_mean = mean(&ics);
        let ic_std = sample_std(&ics);
        let ic_ir = if ic_std > 0.0 { ic_mean / ic_std } else { 0.0 };

        Ok(FactorAnalysisResult {
            factor_name: factor_name.to_string(),
            ic_mean,
            ic_ir,
            quantile_spread: mean(&spreads),
            monotonicity: mean(&mono),
            is_valid: is_valid(ic_mean, ic_ir),
            observation_count: observations,
            period_count: ics.len(),
        })
    }

    /// Analyze several factors (every factor admitted for `market` when
    /// `names` is `None`), skipping failures, best first by
    /// (is_valid, ic_ir, ic_mean).
    pub fn analyze_many(
        &self,
        names: Option<&[String]>,
        symbols: &[String],
        start: NaiveDate,
        end: NaiveDate,
        market: Market,
    ) -> Vec<FactorAnalysisResult> {
        let names = match names {
            Some(n) => n.to_vec(),
            None => self.registry.available(None, Some(market)),
        };

        let mut results: Vec<FactorAnalysisResult> = names
            .iter()
            .filter_map(|name| match self.analyze_factor(name, symbols, start, end, market) {
                Ok(r) => Some(r),
                Err(e) => {
                    tracing::warn!(factor = %name, error = %e, "factor analysis failed");
                    None
                }
            })
            .collect();

        results.sort_by(|a, b| {
            b.is_valid
                .cmp(&a.is_valid)
                .then(b.ic_ir.total_cmp(&a.ic_ir))
                .then(b.ic_mean.total_cmp(&a.ic_mean))
        });
        results
    }

    /// Stacked month-end observations for `names`: one factor row per
    /// (date, symbol) with a forward return, alongside that return. This is
    /// the training set the regression combiners fit against.
    pub fn panel(
        &self,
        names: &[String],
        symbols: &[String],
        start: NaiveDate,
        end: NaiveDate,
        market: Market,
    ) -> Result<(Vec<BTreeMap<String, f64>>, Vec<f64>), QuantError> {
        let mut rows = Vec::new();
        let mut targets = Vec::new();
        for date in month_end_dates(start, end) {
            for sym in symbols {
                let sym = sym.trim().to_uppercase();
                let Some(fr) = self
                    .context
                    .forward_return(&sym, date, market, self.config.horizon_days)
                    .filter(|r| r.is_finite())
                else {
                    continue;
                };
                rows.push(self.registry.calc_all(self.context, date, &sym, market, Some(names))?);
                targets.push(fr);
            }
        }
        Ok((rows, targets))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn month_ends_clip_to_range() {
        let dates = month_end_dates(d(2023, 11, 15), d(2024, 2, 10));
        assert_eq!(
            dates,
            vec![d(2023, 11, 30), d(2023, 12, 31), d(2024, 1, 31), d(2024, 2, 10)]
        );
        assert!(month_end_dates(d(2024, 2, 1), d(2024, 1, 1)).is_empty());
        assert_eq!(month_end_dates(d(2024, 2, 1), d(2024, 2, 29)), vec![d(2024, 2, 29)]);
    }

    #[test]
    fn buckets_are_equal_sized_and_ordered() {
        let pairs: Vec<(f64, f64)> = (0..10).rev().map(|i| (i as f64, i as f64 * 0.01)).collect();
        let b = quantile_buckets(&pairs, 5);
        assert_eq!(b.len(), 5);
        assert!(b.iter().all(|x| x.len() == 2));
        assert_eq!(b[0][0].0, 0.0);
        assert_eq!(b[4][1].0, 9.0);
    }

    #[test]
    fn small_cross_section_drops_empty_buckets() {
        let pairs = vec![(1.0, 0.1), (2.0, 0.2), (3.0, 0.3)];
        let b = quantile_buckets(&pairs, 5);
        assert_eq!(b.len(), 3);
    }

    #[test]
    fn monotonicity_examples() {
        assert_eq!(monotonicity_ratio(&[0.01, 0.02, 0.03, 0.04, 0.05]), 1.0);
        assert_eq!(monotonicity_ratio(&[0.05, 0.04, 0.03]), 0.0);
        assert_eq!(monotonicity_ratio(&[0.01, 0.03, 0.02, 0.04, 0.04]), 0.75);
        assert_eq!(monotonicity_ratio(&[0.01]), 0.0);
    }

    #[test]
    fn validity_thresholds_are_strict() {
        assert!(is_valid(0.05, 0.8));
        assert!(!is_valid(0.03, 0.8));
        assert!(!is_valid(0.05, 0.5));
    }

    #[test]
    fn unknown_factor_is_reported() {
        let registry = FactorRegistry::new();
        let ctx = FactorContext::offline();
        let analyzer = FactorAnalyzer::new(&registry, &ctx);
        let err = analyzer
            .analyze_factor("nope", &[], d(2024, 1, 1), d(2024, 3, 1), Market::Us)
            .unwrap_err();
        assert!(matches!(err, QuantError::UnknownFactor(_)));
        assert!(analyzer
            .analyze_many(Some(&["nope".to_string()]), &[], d(2024, 1, 1), d(2024, 3, 1), Market::Us)
            .is_empty());
    }

    #[test]
    fn panel_is_empty_without_prices() {
        let registry = FactorRegistry::with_baseline();
        let ctx = FactorContext::offline();
        let analyzer = FactorAnalyzer::new(&registry, &ctx);
        let (rows, targets) = analyzer
            .panel(&["momentum_1m".to_string()], &["AAPL".to_string()], d(2024, 1, 1), d(2024, 3, 1), Market::Us)
            .unwrap();
        assert!(rows.is_empty());
        assert!(targets.is_empty());
        assert!(analyzer
            .panel(&["nope".to_string()], &["AAPL".to_string()], d(2024, 1, 1), d(2024, 3, 1), Market::Us)
            .unwrap()
            .0
            .is_empty());
    }
}
