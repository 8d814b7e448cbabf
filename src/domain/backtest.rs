//! Walk-forward backtest engine.
//!
//! The master calendar is cut into rolling (train, test) folds. Each test
//! date asks the strategy for signals through an as-of view, realizes them
//! as fixed-horizon trades clipped at the fold boundary, and accumulates one
//! weighted return per day. Halting conditions are reported in the returned
//! [`BacktestReport`] rather than raised.

use crate::domain::market::Market;
use crate::domain::metrics::PerformanceMetrics;
use crate::domain::portal::HistoricalDataPortal;
use crate::domain::strategy::{RawSignal, Signal, Strategy};
use crate::domain::universe::UniverseProvider;
use chrono::NaiveDate;
use serde::{Serialize, Serializer};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WalkForwardConfig {
    pub train_window: usize,
    pub test_window: usize,
    pub step: usize,
    pub hold_days: usize,
    pub top_n: usize,
    pub max_universe: usize,
    pub market: Market,
    pub risk_free_rate: f64,
}

impl Default for WalkForwardConfig {
    fn default() -> Self {
        WalkForwardConfig {
            train_window: 252,
            test_window: 63,
            step: 21,
            hold_days: 5,
            top_n: 10,
            max_universe: 200,
            market: Market::Kr,
            risk_free_rate: 0.0,
        }
    }
}

impl WalkForwardConfig {
    /// Minimum calendar length a run needs before any fold is attempted.
    pub fn required_calendar_days(&self) -> usize {
        self.train_window + self.test_window + 2
    }
}

/// Conditions that stop a run before simulation.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BacktestError {
    #[error("invalid date range")]
    InvalidDateRange,

    #[error("universe is empty")]
    EmptyUniverse,

    #[error("not enough calendar days: {days}")]
    NotEnoughCalendarDays { days: usize, required: usize },
}

impl Serialize for BacktestError {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FoldWindow {
    pub fold: usize,
    pub train_start: NaiveDate,
    pub train_end: NaiveDate,
    pub test_start: NaiveDate,
    pub test_end: NaiveDate,
}

/// One realized signal, kept with its fold bounds for audit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Trade {
    pub fold: usize,
    pub symbol: String,
    pub score: f64,
    pub weight: f64,
    pub signal_date: NaiveDate,
    pub train_start: NaiveDate,
    pub train_end: NaiveDate,
    pub test_start: NaiveDate,
    pub test_end: NaiveDate,
    pub entry_date: NaiveDate,
    pub entry_price: f64,
    pub exit_date: NaiveDate,
    pub exit_price: f64,
    /// Calendar days between entry and exit.
    pub hold_days: i64,
    pub return_pct: f64,
    pub weighted_return_pct: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BacktestReport {
    pub strategy: String,
    pub market: Market,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub calendar_days: usize,
    pub train_window: usize,
    pub test_window: usize,
    pub step: usize,
    pub hold_days: usize,
    pub top_n: usize,
    pub folds: usize,
    pub fold_windows: Vec<FoldWindow>,
    #[serde(flatten)]
    pub metrics: PerformanceMetrics,
    pub daily_returns: Vec<f64>,
    pub trades: Vec<Trade>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<BacktestError>,
}

impl BacktestReport {
    fn empty(strategy: &str, config: &WalkForwardConfig, start: NaiveDate, end: NaiveDate) -> Self {
        BacktestReport {
            strategy: strategy.to_string(),
            market: config.market,
            start_date: start,
            end_date: end,
            calendar_days: 0,
            train_window: config.train_window,
            test_window: config.test_window,
            step: config.step,
            hold_days: config.hold_days,
            top_n: config.top_n,
            folds: 0,
            fold_windows: Vec::new(),
            metrics: PerformanceMetrics::default(),
            daily_returns: Vec::new(),
            trades: Vec::new(),
            error: None,
        }
    }

    fn halted(mut self, error: BacktestError) -> Self {
        tracing::warn!(strategy = %self.strategy, market = %self.market, %error, "backtest halted");
        self.error = Some(error);
        self
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Coerce raw strategy output into a deduplicated, score-ranked selection
/// of at most `top_n` rows whose weights sum to 1.
///
/// Bare symbols score 1.0. Duplicate symbols keep the higher-scoring row
/// (the first on ties). Explicit positive weights are renormalized; when
/// none is supplied every row gets `1/N`.
pub fn normalize_signals(raw: &[RawSignal], top_n: usize) -> Vec<Signal> {
    let mut rows: Vec<(Signal, f64)> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for item in raw {
        let (symbol, score, weight) = match item {
            RawSignal::Symbol(s) => (s.as_str(), 1.0, 0.0),
            RawSignal::Scored {
                symbol,
                score,
                weight,
            } => (symbol.as_str(), *score, weight.unwrap_or(0.0)),
        };
        let symbol = symbol.trim().to_uppercase();
        if symbol.is_empty() {
            continue;
        }
        let score = if score.is_finite() { score } else { 0.0 };
        let weight = if weight.is_finite() { weight.max(0.0) } else { 0.0 };
        let row = (
            Signal {
                symbol: symbol.clone(),
                score,
                weight: 0.0,
            },
            weight,
        );
        match index.get(&symbol) {
            Some(&i) if score > rows[i].0.score => rows[i] = row,
            Some(_) => {}
            None => {
                index.insert(symbol, rows.len());
                rows.push(row);
            }
        }
    }

    rows.sort_by(|a, b| b.0.score.total_cmp(&a.0.score));
    rows.truncate(top_n.max(1));

    let provided: f64 = rows.iter().map(|(_, w)| w).sum();
    let n = rows.len() as f64;
    rows.into_iter()
        .map(|(mut s, w)| {
            s.weight = if provided > 0.0 { w / provided } else { 1.0 / n };
            s
        })
        .collect()
}

pub struct WalkForwardBacktestEngine {
    config: WalkForwardConfig,
    universe: UniverseProvider,
    portal: HistoricalDataPortal,
}

impl WalkForwardBacktestEngine {
    pub fn new(
        config: WalkForwardConfig,
        universe: UniverseProvider,
        portal: HistoricalDataPortal,
    ) -> Self {
        if portal.market() != config.market {
            tracing::warn!(
                config_market = %config.market,
                portal_market = %portal.market(),
                "portal market differs from engine market"
            );
        }
        Self {
            config,
            universe,
            portal,
        }
    }

    pub fn config(&self) -> &WalkForwardConfig {
        &self.config
    }

    pub fn portal(&self) -> &HistoricalDataPortal {
        &self.portal
    }

    pub fn run(&self, strategy: &dyn Strategy, start: NaiveDate, end: NaiveDate) -> BacktestReport {
        let cfg = &self.config;
        let mut report = BacktestReport::empty(strategy.name(), cfg, start, end);

        if start >= end {
            return report.halted(BacktestError::InvalidDateRange);
        }

        let union = self
            .universe
            .get_universe_range(start, end, cfg.market, cfg.step, cfg.max_universe);
        if union.is_empty() {
            return report.halted(BacktestError::EmptyUniverse);
        }

        let calendar = self.portal.get_calendar(&union, start, end);
        report.calendar_days = calendar.len();
        let required = cfg.required_calendar_days();
        if calendar.len() < required {
            return report.halted(BacktestError::NotEnoughCalendarDays {
                days: calendar.len(),
                required,
            });
        }

        tracing::info!(
            strategy = strategy.name(),
            market = %cfg.market,
            symbols = union.len(),
            calendar_days = calendar.len(),
            "walk-forward run starting"
        );

        let last = calendar.len() - 1;
        let mut anchor = cfg.train_window;
        while anchor < calendar.len() - cfg.test_window {
            let fold = report.folds + 1;
            let test_end_idx = (anchor + cfg.test_window - 1).min(last);
            let window = FoldWindow {
                fold,
                train_start: calendar[anchor - cfg.train_window],
                train_end: calendar[anchor - 1],
                test_start: calendar[anchor],
                test_end: calendar[test_end_idx],
            };
            tracing::debug!(fold, test_start = %window.test_start, test_end = %window.test_end, "fold");

            for idx in anchor..=test_end_idx {
                let day_return = self.simulate_day(
                    strategy,
                    &calendar,
                    idx,
                    test_end_idx,
                    &window,
                    &mut report.trades,
                );
                report.daily_returns.push(day_return);
            }

            report.folds = fold;
            report.fold_windows.push(window);
            anchor += cfg.step.max(1);
        }

        report.metrics =
            PerformanceMetrics::compute(&report.daily_returns, &report.trades, cfg.risk_free_rate);
        tracing::info!(
            folds = report.folds,
            trades = report.trades.len(),
            sharpe = report.metrics.sharpe_ratio,
            "walk-forward run complete"
        );
        report
    }

    fn simulate_day(
        &self,
        strategy: &dyn Strategy,
        calendar: &[NaiveDate],
        idx: usize,
        test_end_idx: usize,
        window: &FoldWindow,
        trades: &mut Vec<Trade>,
    ) -> f64 {
        let cfg = &self.config;
        let signal_date = calendar[idx];
        let universe = self
            .universe
            .get_universe(signal_date, cfg.market, cfg.max_universe);
        if universe.is_empty() {
            return 0.0;
        }

        let view = self.portal.as_of(signal_date);
        let raw = strategy.signals(signal_date, &universe, &view);
        let signals = normalize_signals(&raw, cfg.top_n);

        let exit_idx = (idx + cfg.hold_days.max(1)).min(test_end_idx);
        let exit_date = calendar[exit_idx];

        let mut day_return = 0.0;
        for s in signals {
            let entry_price = self.portal.price_on_or_before(&s.symbol, signal_date);
            let exit_price = self.portal.price_on_or_before(&s.symbol, exit_date);
            if entry_price <= 0.0 || exit_price <= 0.0 {
                tracing::debug!(symbol = %s.symbol, date = %signal_date, "missing price, signal skipped");
                continue;
            }

            let ret = exit_price / entry_price - 1.0;
            let weighted = ret * s.weight;
            day_return += weighted;

            trades.push(Trade {
                fold: window.fold,
                symbol: s.symbol,
                score: s.score,
                weight: s.weight,
                signal_date,
                train_start: window.train_start,
                train_end: window.train_end,
                test_start: window.test_start,
                test_end: window.test_end,
                entry_date: signal_date,
                entry_price,
                exit_date,
                exit_price,
                hold_days: (exit_date - signal_date).num_days(),
                return_pct: ret * 100.0,
                weighted_return_pct: weighted * 100.0,
            });
        }
        day_return
    }
}
