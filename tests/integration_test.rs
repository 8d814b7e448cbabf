//! Integration tests across the engine, factor research and portfolio layers.
//!
//! Tests cover:
//! - Walk-forward halting conditions and a full synthetic run
//! - Point-in-time behavior: as-of slicing and US membership intervals
//! - Factor analysis on a perfectly ranked cross-section
//! - IC weighting and portfolio construction invariants (proptest)

mod common;

use approx::assert_abs_diff_eq;
use chrono::NaiveDate;
use common::*;
use proptest::prelude::*;
use quantlab::domain::backtest::{BacktestError, WalkForwardConfig, normalize_signals};
use quantlab::domain::factor::combiner::{IcStat, ic_weights};
use quantlab::domain::factor::registry::UniverseScope;
use quantlab::domain::factor::technical::calc_return;
use quantlab::domain::factor::{FactorAnalyzer, FactorCategory, FactorContext, FactorRegistry};
use quantlab::domain::market::Market;
use quantlab::domain::portal::{AsOfView, HistoricalDataPortal, SeriesSource};
use quantlab::domain::portfolio::attribution::brinson;
use quantlab::domain::portfolio::optimizer::OptimizeInput;
use quantlab::domain::portfolio::weights::cap_and_redistribute;
use quantlab::domain::portfolio::{OptimizeMethod, PortfolioOptimizer, Weights};
use quantlab::domain::retry::RetryPolicy;
use quantlab::domain::strategy::{Momentum, RawSignal, fn_strategy};
use quantlab::ports::data_port::DataPort;
use quantlab::ports::universe_port::Membership;
use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::rc::Rc;

const KR_CODES: [&str; 3] = ["000001", "000002", "000003"];

fn kr_store(days: usize) -> MockDataPort {
    let start = date(2021, 1, 4);
    MockDataPort::new()
        .with_bars(KR_CODES[0], trending_bars(start, days, 100.0, 0.002))
        .with_bars(KR_CODES[1], trending_bars(start, days, 50.0, 0.001))
        .with_bars(KR_CODES[2], trending_bars(start, days, 80.0, -0.001))
}

fn kr_config() -> WalkForwardConfig {
    WalkForwardConfig {
        market: Market::Kr,
        ..WalkForwardConfig::default()
    }
}

fn span(days: usize) -> (NaiveDate, NaiveDate) {
    let cal = weekdays(date(2021, 1, 4), days);
    (cal[0], cal[days - 1])
}

mod walk_forward {
    use super::*;

    #[test]
    fn short_history_halts_with_calendar_error() {
        let engine = engine(kr_config(), kr_store(300), MockUniversePort::with_current(&KR_CODES));
        let (start, end) = span(300);
        let report = engine.run(&Momentum::default(), start, end);

        assert_eq!(
            report.error,
            Some(BacktestError::NotEnoughCalendarDays {
                days: 300,
                required: 317
            })
        );
        assert_eq!(report.error.as_ref().unwrap().to_string(), "not enough calendar days: 300");
        assert!(report.trades.is_empty());
        assert_eq!(report.folds, 0);
        assert_eq!(report.calendar_days, 300);
    }

    #[test]
    fn inverted_range_halts() {
        let engine = engine(kr_config(), kr_store(10), MockUniversePort::with_current(&KR_CODES));
        let report = engine.run(&Momentum::default(), date(2022, 1, 1), date(2021, 1, 1));
        assert_eq!(report.error, Some(BacktestError::InvalidDateRange));
        assert!(!report.is_ok());
    }

    #[test]
    fn momentum_run_on_trending_data() {
        let engine = engine(kr_config(), kr_store(500), MockUniversePort::with_current(&KR_CODES));
        let (start, end) = span(500);
        let report = engine.run(&Momentum::default(), start, end);

        assert!(report.is_ok(), "{:?}", report.error);
        assert_eq!(report.calendar_days, 500);
        // anchors 252, 273, ..., 420
        assert_eq!(report.folds, 9);
        assert_eq!(report.fold_windows.len(), 9);
        assert_eq!(report.daily_returns.len(), 9 * 63);

        // the falling series never scores positive
        assert!(report.trades.iter().all(|t| t.symbol != KR_CODES[2]));
        assert_eq!(report.trades.len(), 2 * report.daily_returns.len());

        for t in &report.trades {
            assert!(t.entry_date >= t.test_start && t.exit_date <= t.test_end);
            assert!(t.train_end < t.test_start);
            assert!(t.hold_days >= 0 && t.hold_days <= 7);
            assert_abs_diff_eq!(t.weight, 0.5, epsilon = 1e-12);
            assert!(t.return_pct >= 0.0);
        }
        assert!(report.metrics.total_return > 0.0);
        assert!(report.metrics.max_drawdown.abs() < 1e-12);
    }

    #[test]
    fn strategy_never_sees_future_bars() {
        let engine = engine(kr_config(), kr_store(400), MockUniversePort::with_current(&KR_CODES));
        let leaks = Cell::new(0usize);
        let calls = Cell::new(0usize);
        let probe = fn_strategy("probe", |day: NaiveDate, universe: &[String], view: &AsOfView<'_>| {
            calls.set(calls.get() + 1);
            for sym in universe {
                if view.ohlcv(sym, 0).iter().any(|b: &Bar| b.date > day) {
                    leaks.set(leaks.get() + 1);
                }
            }
            vec![RawSignal::from(universe[0].clone())]
        });
        let (start, end) = span(400);
        let report = engine.run(&probe, start, end);

        assert!(report.is_ok());
        assert!(calls.get() > 0);
        assert_eq!(leaks.get(), 0);
    }

    #[test]
    fn removed_us_members_drop_out() {
        let cutoff = date(2022, 6, 1);
        let history = vec![
            Membership {
                symbol: "OLD".into(),
                start_date: None,
                end_date: Some(cutoff),
            },
            Membership {
                symbol: "NEW".into(),
                start_date: Some(cutoff),
                end_date: None,
            },
        ];
        let start = date(2021, 1, 4);
        let data = MockDataPort::new()
            .with_bars("OLD", trending_bars(start, 450, 10.0, 0.001))
            .with_bars("NEW", trending_bars(start, 450, 10.0, 0.001));
        let config = WalkForwardConfig {
            market: Market::Us,
            ..WalkForwardConfig::default()
        };
        let engine = engine(config, data, MockUniversePort::with_history(history));

        let seen: RefCell<Vec<(NaiveDate, Vec<String>)>> = RefCell::new(Vec::new());
        let recorder = fn_strategy("recorder", |day: NaiveDate, universe: &[String], _view: &AsOfView<'_>| {
            seen.borrow_mut().push((day, universe.to_vec()));
            Vec::new()
        });
        let (first, last) = (start, weekdays(start, 450)[449]);
        let report = engine.run(&recorder, first, last);

        assert!(report.is_ok());
        let seen = seen.into_inner();
        assert!(seen.iter().any(|(d, _)| *d >= cutoff));
        for (day, universe) in &seen {
            if *day < cutoff {
                assert_eq!(universe, &vec!["OLD".to_string()]);
            } else {
                assert_eq!(universe, &vec!["NEW".to_string()]);
            }
        }
    }
}

mod as_of_view {
    use super::*;

    fn portal(days: usize) -> HistoricalDataPortal {
        let data: Rc<dyn DataPort> =
            Rc::new(MockDataPort::new().with_bars("AAPL", trending_bars(date(2023, 1, 2), days, 100.0, 0.0)));
        HistoricalDataPortal::new(Market::Us, SeriesSource::new(Some(data), None, RetryPolicy::none()))
    }

    proptest! {
        #[test]
        fn slices_never_pass_cutoff(days in 1usize..200, offset in 0i64..320, lookback in 0usize..60) {
            let portal = portal(days);
            let cutoff = date(2023, 1, 1) + chrono::Duration::days(offset);
            let bars = portal.as_of(cutoff).ohlcv("aapl", lookback);
            let visible = weekdays(date(2023, 1, 2), days).into_iter().filter(|d| *d <= cutoff).count();

            prop_assert!(bars.iter().all(|b| b.date <= cutoff));
            prop_assert!(bars.windows(2).all(|w| w[0].date < w[1].date));
            let expected = if lookback == 0 { visible } else { visible.min(lookback) };
            prop_assert_eq!(bars.len(), expected);
        }
    }
}

mod factor_research {
    use super::*;

    fn ranked_context() -> FactorContext {
        let start = date(2022, 1, 3);
        let mut data = MockDataPort::new();
        for i in 0..10 {
            let drift = 0.0005 * (i + 1) as f64;
            data = data.with_bars(&format!("S{i}"), trending_bars(start, 400, 20.0, drift));
        }
        let data: Rc<dyn DataPort> = Rc::new(data);
        FactorContext::new(SeriesSource::new(Some(data), None, RetryPolicy::none())).with_retry(RetryPolicy::none())
    }

    #[test]
    fn perfectly_ranked_factor_is_monotone() {
        let mut registry = FactorRegistry::new();
        registry
            .register("trailing_21d", FactorCategory::Momentum, UniverseScope::All, |ctx, sym, as_of, mk| {
                Ok(calc_return(&ctx.close(sym, as_of, mk, 30), 21))
            })
            .unwrap();
        let ctx = ranked_context();
        let symbols: Vec<String> = (0..10).map(|i| format!("s{i}")).collect();

        let result = FactorAnalyzer::new(&registry, &ctx)
            .analyze_factor("trailing_21d", &symbols, date(2022, 3, 1), date(2023, 3, 31), Market::Us)
            .unwrap();

        assert_eq!(result.period_count, 13);
        assert_eq!(result.observation_count, 130);
        assert!(result.ic_mean > 0.999, "ic_mean {}", result.ic_mean);
        assert_eq!(result.monotonicity, 1.0);
        assert!(result.quantile_spread > 0.0);
    }

    #[test]
    fn thin_cross_sections_are_skipped() {
        let registry = FactorRegistry::with_baseline();
        let ctx = ranked_context();
        let symbols: Vec<String> = (0..5).map(|i| format!("S{i}")).collect();
        let result = FactorAnalyzer::new(&registry, &ctx)
            .analyze_factor("momentum_1m", &symbols, date(2022, 3, 1), date(2023, 3, 31), Market::Us)
            .unwrap();
        assert_eq!(result.period_count, 0);
        assert_eq!(result.ic_mean, 0.0);
        assert!(!result.is_valid);
    }

    #[test]
    fn strong_factor_outweighs_weak_one() {
        let stats: BTreeMap<String, IcStat> = [
            ("a".to_string(), IcStat { ic_mean: 0.05, ic_ir: 0.8 }),
            ("b".to_string(), IcStat { ic_mean: 0.01, ic_ir: 0.2 }),
        ]
        .into();
        let w = ic_weights(&["a".to_string(), "b".to_string()], &stats);
        assert!(w["a"] >= 5.0 * w["b"]);
    }
}

mod portfolio_invariants {
    use super::*;

    fn weights(values: &[f64]) -> Weights {
        values
            .iter()
            .enumerate()
            .map(|(i, v)| (format!("N{i}"), *v))
            .collect()
    }

    fn unit(values: &[f64]) -> Weights {
        let total: f64 = values.iter().sum();
        weights(&values.iter().map(|v| v / total).collect::<Vec<_>>())
    }

    proptest! {
        #[test]
        fn capped_weights_sum_to_one(raw in prop::collection::vec(0.001f64..10.0, 1..12), cap in 0.05f64..0.6) {
            let out = cap_and_redistribute(&weights(&raw), cap);
            let effective = cap.max(1.0 / raw.len() as f64);
            prop_assert!((out.values().sum::<f64>() - 1.0).abs() < 1e-9);
            prop_assert!(out.values().all(|w| *w >= 0.0 && *w <= effective + 1e-9));
        }

        #[test]
        fn optimizer_weights_respect_caps_and_class_bounds(
            assets in prop::collection::vec((-0.2f64..0.4, 0.01f64..0.5, 0usize..3), 1..12),
        ) {
            let name = |i: usize| format!("N{i}");
            let input = OptimizeInput {
                expected_returns: assets.iter().enumerate().map(|(i, (r, _, _))| (name(i), *r)).collect(),
                covariance: assets
                    .iter()
                    .enumerate()
                    .map(|(i, (_, vol, _))| (name(i), BTreeMap::from([(name(i), vol * vol)])))
                    .collect(),
                asset_class_map: assets.iter().enumerate().map(|(i, (_, _, c))| (name(i), format!("C{c}"))).collect(),
                ..OptimizeInput::default()
            };
            let optimizer = PortfolioOptimizer::default();
            let cfg = optimizer.config().clone();
            let class_of = |asset: &str| input.asset_class_map[asset].clone();

            for method in [OptimizeMethod::MeanVariance, OptimizeMethod::RiskParity, OptimizeMethod::BlackLitterman] {
                let out = optimizer.optimize(&input, method);
                prop_assert!((out.weights.values().sum::<f64>() - 1.0).abs() < 1e-9);

                // three classes at most, so the floor is always feasible; a lone class takes everything
                let k = out.class_weights.len();
                let high = if cfg.class_max_weight * (k as f64) < 1.0 { 1.0 } else { cfg.class_max_weight };
                for w in out.class_weights.values() {
                    prop_assert!(*w >= cfg.class_min_weight - 1e-9 && *w <= high + 1e-9, "class weight {w}");
                }

                for (asset, w) in &out.weights {
                    let class = class_of(asset);
                    let members = out.weights.keys().filter(|a| class_of(a) == class).count();
                    let cap = cfg.single_name_max_weight.max(out.class_weights[&class] / members as f64);
                    prop_assert!(*w >= 0.0 && *w <= cap + 1e-9, "{asset} weight {w} above cap {cap}");
                }
            }
        }

        #[test]
        fn brinson_effects_explain_active_return(
            pw in prop::collection::vec(0.01f64..1.0, 4),
            bw in prop::collection::vec(0.01f64..1.0, 4),
            pr in prop::collection::vec(-0.2f64..0.2, 4),
            br in prop::collection::vec(-0.2f64..0.2, 4),
        ) {
            let out = brinson(&unit(&pw), &unit(&bw), &weights(&pr), &weights(&br));
            let effects = out.allocation_effect + out.selection_effect + out.interaction_effect;
            prop_assert!((effects - out.active_return).abs() < 1e-12);
            prop_assert!((out.active_return - (out.portfolio_return - out.benchmark_return)).abs() < 1e-9);
        }

        #[test]
        fn signal_normalization_is_idempotent(scores in prop::collection::vec(-5.0f64..5.0, 1..15), top_n in 1usize..8) {
            let raw: Vec<RawSignal> = scores
                .iter()
                .enumerate()
                .map(|(i, s)| RawSignal::scored(format!("s{}", i % 7), *s))
                .collect();
            let once = normalize_signals(&raw, top_n);
            let again = normalize_signals(&once.iter().cloned().map(RawSignal::from).collect::<Vec<_>>(), top_n);
            let key = |v: &[quantlab::domain::strategy::Signal]| {
                v.iter().map(|s| (s.symbol.clone(), s.score)).collect::<Vec<_>>()
            };
            prop_assert_eq!(key(&once), key(&again));
            prop_assert!(once.iter().zip(&again).all(|(a, b)| (a.weight - b.weight).abs() < 1e-12));
            prop_assert!(once.len() <= top_n);
            prop_assert!((once.iter().map(|s| s.weight).sum::<f64>() - 1.0).abs() < 1e-9);
        }
    }
}
