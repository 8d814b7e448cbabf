//! Risk-adjusted performance statistics over a daily-return series.

use super::backtest::Trade;
use super::stats::{mean, sample_std};
use serde::Serialize;

pub const TRADING_DAYS_PER_YEAR: f64 = 252.0;

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct PerformanceMetrics {
    pub total_return: f64,
    pub annualized_return: f64,
    pub sharpe_ratio: f64,
    pub sortino_ratio: f64,
    pub max_drawdown: f64,
    pub calmar_ratio: f64,
    /// Fraction of trades with a positive return, in `[0, 1]`.
    pub win_rate: f64,
    pub avg_hold_days: f64,
    pub trade_count: usize,
}

impl PerformanceMetrics {
    pub fn compute(daily_returns: &[f64], trades: &[Trade], risk_free_rate: f64) -> Self {
        let final_equity = compound(daily_returns);
        let total_return = final_equity - 1.0;
        let annualized_return = annualize(final_equity, daily_returns.len());
        let max_drawdown = max_drawdown(daily_returns);

        let calmar_ratio = if max_drawdown > 0.0 {
            annualized_return / max_drawdown
        } else {
            0.0
        };

        let wins = trades.iter().filter(|t| t.return_pct > 0.0).count();
        let win_rate = if trades.is_empty() {
            0.0
        } else {
            wins as f64 / trades.len() as f64
        };

        let hold_days: Vec<f64> = trades.iter().map(|t| t.hold_days as f64).collect();

        PerformanceMetrics {
            total_return,
            annualized_return,
            sharpe_ratio: sharpe(daily_returns, risk_free_rate),
            sortino_ratio: sortino(daily_returns, risk_free_rate),
            max_drawdown,
            calmar_ratio,
            win_rate,
            avg_hold_days: mean(&hold_days),
            trade_count: trades.len(),
        }
    }
}

/// Terminal value of 1.0 compounded through `returns`.
pub fn compound(returns: &[f64]) -> f64 {
    returns.iter().fold(1.0, |eq, r| eq * (1.0 + r))
}

fn annualize(final_equity: f64, days: usize) -> f64 {
    if days == 0 || final_equity <= 0.0 {
        return 0.0;
    }
    final_equity.powf(TRADING_DAYS_PER_YEAR / days as f64) - 1.0
}

fn excess_returns(returns: &[f64], risk_free_rate: f64) -> Vec<f64> {
    let daily_rf = risk_free_rate / TRADING_DAYS_PER_YEAR;
    returns.iter().map(|r| r - daily_rf).collect()
}

pub fn sharpe(returns: &[f64], risk_free_rate: f64) -> f64 {
    if returns.len() < 2 {
        return 0.0;
    }
    let excess = excess_returns(returns, risk_free_rate);
    let sd = sample_std(&excess);
    if sd <= 0.0 {
        return 0.0;
    }
    mean(&excess) / sd * TRADING_DAYS_PER_YEAR.sqrt()
}

/// Like [`sharpe`] but scaled by the deviation of the downside excess
/// returns only (positive excess clipped to zero).
pub fn sortino(returns: &[f64], risk_free_rate: f64) -> f64 {
    if returns.len() < 2 {
        return 0.0;
    }
    let excess = excess_returns(returns, risk_free_rate);
    let downside: Vec<f64> = excess.iter().map(|x| x.min(0.0)).collect();
    let ds = sample_std(&downside);
    if ds <= 0.0 {
        return 0.0;
    }
    mean(&excess) / ds * TRADING_DAYS_PER_YEAR.sqrt()
}

/// Largest peak-to-trough decline of the compounded equity curve, as a fraction.
pub fn max_drawdown(returns: &[f64]) -> f64 {
    let mut equity = 1.0_f64;
    let mut peak = 1.0_f64;
    let mut max_dd = 0.0_f64;
    for r in returns {
        equity *= 1.0 + r;
        peak = peak.max(equity);
        if peak > 0.0 {
            max_dd = max_dd.max((peak - equity) / peak);
        }
    }
    max_dd
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use chrono::NaiveDate;

    fn make_trade(return_pct: f64, hold_days: i64) -> Trade {
        let d = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        Trade {
            fold: 1,
            symbol: "AAA".into(),
            score: 1.0,
            weight: 1.0,
            signal_date: d,
            train_start: d,
            train_end: d,
            test_start: d,
            test_end: d,
            entry_date: d,
            entry_price: 100.0,
            exit_date: d + chrono::Duration::days(hold_days),
            exit_price: 100.0 * (1.0 + return_pct / 100.0),
            hold_days,
            return_pct,
            weighted_return_pct: return_pct,
        }
    }

    #[test]
    fn metrics_empty_series() {
        let m = PerformanceMetrics::compute(&[], &[], 0.0);
        assert_eq!(m, PerformanceMetrics::default());
    }

    #[test]
    fn metrics_total_and_annualized_return() {
        let m = PerformanceMetrics::compute(&[0.1, -0.05], &[], 0.0);
        assert_abs_diff_eq!(m.total_return, 1.1 * 0.95 - 1.0, epsilon = 1e-12);
        let flat = vec![0.0; 252];
        let m = PerformanceMetrics::compute(&flat, &[], 0.0);
        assert_abs_diff_eq!(m.annualized_return, 0.0);
    }

    #[test]
    fn metrics_max_drawdown_compounds() {
        // equity 1.0 -> 1.1 -> 0.88 -> 0.968
        let dd = max_drawdown(&[0.1, -0.2, 0.1]);
        assert_abs_diff_eq!(dd, 0.2, epsilon = 1e-12);
        assert_eq!(max_drawdown(&[0.01, 0.02]), 0.0);
    }

    #[test]
    fn metrics_sharpe_matches_hand_computation() {
        let r = [0.01, -0.005, 0.02, 0.0];
        let m = mean(&r);
        let sd = sample_std(&r);
        assert_abs_diff_eq!(sharpe(&r, 0.0), m / sd * 252f64.sqrt(), epsilon = 1e-12);
    }

    #[test]
    fn metrics_risk_free_lowers_sharpe() {
        let r = [0.01, -0.005, 0.02, 0.0, 0.004];
        assert!(sharpe(&r, 0.05) < sharpe(&r, 0.0));
    }

    #[test]
    fn metrics_sortino_zero_without_downside() {
        assert_eq!(sortino(&[0.01, 0.02, 0.03], 0.0), 0.0);
        let r = [0.01, -0.02, 0.03, -0.01];
        assert!(sortino(&r, 0.0).is_finite());
    }

    #[test]
    fn metrics_short_series_ratios_are_zero() {
        assert_eq!(sharpe(&[0.05], 0.0), 0.0);
        assert_eq!(sortino(&[-0.05], 0.0), 0.0);
    }

    #[test]
    fn metrics_calmar_uses_annualized_over_drawdown() {
        let r = [0.02, -0.01, 0.015, -0.005];
        let m = PerformanceMetrics::compute(&r, &[], 0.0);
        assert!(m.max_drawdown > 0.0);
        assert_abs_diff_eq!(m.calmar_ratio, m.annualized_return / m.max_drawdown, epsilon = 1e-9);
    }

    #[test]
    fn metrics_trade_stats() {
        let trades = vec![make_trade(2.0, 5), make_trade(-1.0, 3), make_trade(0.0, 7)];
        let m = PerformanceMetrics::compute(&[0.0, 0.0], &trades, 0.0);
        assert_eq!(m.trade_count, 3);
        assert_abs_diff_eq!(m.win_rate, 1.0 / 3.0, epsilon = 1e-12);
        assert_abs_diff_eq!(m.avg_hold_days, 5.0);
    }
}
