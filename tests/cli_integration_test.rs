//! CLI integration tests against the built binary.
//!
//! Tests cover:
//! - Exit codes (unknown strategy, halted backtest, bad input)
//! - Backtest orchestration over a CSV store described by an INI file
//! - JSON subcommands: optimize, rebalance, attribution
//! - Factor listing

mod common;

use common::*;
use serde_json::Value;
use std::fmt::Write as _;
use std::fs;
use std::path::Path;
use std::process::{Command, Output};
use tempfile::TempDir;

fn quantlab(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_quantlab"))
        .args(args)
        .env("RUST_LOG", "warn")
        .output()
        .unwrap()
}

fn stdout_json(out: &Output) -> Value {
    serde_json::from_slice(&out.stdout).unwrap()
}

fn write(dir: &Path, name: &str, content: &str) -> String {
    let path = dir.join(name);
    fs::write(&path, content).unwrap();
    path.display().to_string()
}

fn write_series(dir: &Path, file: &str, bars: &[Bar]) {
    let mut csv = String::from("date,open,high,low,close,volume\n");
    for b in bars {
        writeln!(csv, "{},{},{},{},{},{}", b.date, b.open, b.high, b.low, b.close, b.volume).unwrap();
    }
    write(dir, file, &csv);
}

/// INI pointing the CSV store at `dir`. The KR fallback names a code with no
/// series, so a run only trades if the universe is read from the CSV files.
fn csv_config(dir: &Path) -> String {
    let ini = format!(
        "[csv]\npath = {}\n\n[universe]\nkr_fallback = 999999\n\n[retry]\nmax_attempts = 1\nbase_delay_ms = 0\n",
        dir.display()
    );
    write(dir, "quantlab.ini", &ini)
}

mod exit_codes {
    use super::*;

    #[test]
    fn unknown_strategy_exits_two() {
        let out = quantlab(&["backtest", "--strategy", "meanrev"]);
        assert_eq!(out.status.code(), Some(2));
        let stderr = String::from_utf8_lossy(&out.stderr);
        assert!(stderr.contains("unsupported strategy: meanrev"));
        assert!(stderr.contains("momentum"));
    }

    #[test]
    fn missing_config_file_exits_one() {
        let out = quantlab(&["backtest", "--config", "/nonexistent/quantlab.ini"]);
        assert_eq!(out.status.code(), Some(1));
        assert!(String::from_utf8_lossy(&out.stderr).contains("config parse error"));
    }

    #[test]
    fn malformed_json_input_exits_one() {
        let dir = TempDir::new().unwrap();
        let input = write(dir.path(), "bad.json", "{ not json");
        let out = quantlab(&["optimize", "--input", &input]);
        assert_eq!(out.status.code(), Some(1));
    }

    #[test]
    fn invalid_config_value_names_the_key() {
        let dir = TempDir::new().unwrap();
        let ini = write(dir.path(), "bad.ini", "[optimizer]\nclass_min_weight = 0.9\nclass_max_weight = 0.5\n");
        let input = write(dir.path(), "in.json", r#"{"expected_returns": {"A": 0.1}}"#);
        let out = quantlab(&["optimize", "--config", &ini, "--input", &input]);
        assert_eq!(out.status.code(), Some(1));
        assert!(String::from_utf8_lossy(&out.stderr).contains("[optimizer]"));
    }
}

mod backtest_command {
    use super::*;

    #[test]
    fn short_csv_history_reports_halt() {
        let dir = TempDir::new().unwrap();
        let start = date(2021, 1, 4);
        write_series(dir.path(), "000001_kr.csv", &trending_bars(start, 300, 100.0, 0.001));
        write_series(dir.path(), "000002_kr.csv", &trending_bars(start, 300, 50.0, 0.002));
        let ini = csv_config(dir.path());
        let end = weekdays(start, 300)[299].to_string();

        let out = quantlab(&[
            "backtest", "--config", &ini, "--market", "kr", "--start", "2021-01-04", "--end", &end,
        ]);
        assert_eq!(out.status.code(), Some(1));
        let stdout = String::from_utf8_lossy(&out.stdout);
        assert!(stdout.contains("Strategy:         momentum (kr)"));
        assert!(stdout.contains("halted (not enough calendar days: 300)"));
    }

    #[test]
    fn full_run_writes_json_report() {
        let dir = TempDir::new().unwrap();
        let start = date(2021, 1, 4);
        write_series(dir.path(), "000001_kr.csv", &trending_bars(start, 420, 100.0, 0.001));
        write_series(dir.path(), "000002_kr.csv", &trending_bars(start, 420, 50.0, 0.002));
        let ini = csv_config(dir.path());
        let end = weekdays(start, 420)[419].to_string();
        let report_path = dir.path().join("out").join("report.json");
        let report_arg = report_path.display().to_string();

        let out = quantlab(&[
            "backtest",
            "--config",
            &ini,
            "--market",
            "kr",
            "--start",
            "2021-01-04",
            "--end",
            &end,
            "--top-n",
            "1",
            "--train-window",
            "5",
            "--output",
            &report_arg,
        ]);
        assert_eq!(out.status.code(), Some(0), "{}", String::from_utf8_lossy(&out.stderr));
        let stdout = String::from_utf8_lossy(&out.stdout);
        assert!(stdout.contains("=== Performance ==="));

        let report: Value = serde_json::from_str(&fs::read_to_string(&report_path).unwrap()).unwrap();
        // train window clamped up to 21
        assert_eq!(report["train_window"], 21);
        assert_eq!(report["top_n"], 1);
        assert!(report.get("error").is_none());
        let trades = report["trades"].as_array().unwrap();
        assert!(!trades.is_empty());
        // universe resolved from the CSV files; only the faster-rising series is picked
        assert!(trades.iter().all(|t| t["symbol"] == "000002" && t["weight"] == 1.0));
    }
}

mod json_commands {
    use super::*;

    #[test]
    fn optimize_respects_class_bounds() {
        let dir = TempDir::new().unwrap();
        let input = write(
            dir.path(),
            "opt.json",
            r#"{
                "expected_returns": {"AAPL": 0.12, "MSFT": 0.10, "005930": 0.08, "BTC": 0.30, "TLT": 0.03},
                "covariance": {
                    "AAPL": {"AAPL": 0.04}, "MSFT": {"MSFT": 0.03}, "005930": {"005930": 0.05},
                    "BTC": {"BTC": 0.60}, "TLT": {"TLT": 0.01}
                },
                "asset_class_map": {"AAPL": "US_EQUITY", "MSFT": "US_EQUITY", "005930": "KR_EQUITY", "BTC": "CRYPTO", "TLT": "BOND"}
            }"#,
        );
        let out = quantlab(&["optimize", "--input", &input, "--method", "risk-parity"]);
        assert_eq!(out.status.code(), Some(0));
        let result = stdout_json(&out);

        assert_eq!(result["method"], "risk_parity");
        let weights = result["weights"].as_object().unwrap();
        let total: f64 = weights.values().map(|v| v.as_f64().unwrap()).sum();
        assert!((total - 1.0).abs() < 1e-9);
        for w in result["class_weights"].as_object().unwrap().values() {
            let w = w.as_f64().unwrap();
            assert!(w >= 0.10 - 1e-9 && w <= 0.50 + 1e-9);
        }
    }

    #[test]
    fn rebalance_emits_sell_and_buy() {
        let dir = TempDir::new().unwrap();
        let input = write(
            dir.path(),
            "rebal.json",
            r#"{
                "current_weights": {"BTC": 0.55, "AAPL": 0.45},
                "target_weights": {"BTC": 0.40, "AAPL": 0.60},
                "portfolio_value": 100000,
                "prices": {"BTC": 50000},
                "as_of": "2024-06-20",
                "last_rebalance_date": "2024-06-03"
            }"#,
        );
        let out = quantlab(&["rebalance", "--input", &input]);
        assert_eq!(out.status.code(), Some(0));
        let plan = stdout_json(&out);

        assert_eq!(plan["trigger"], true);
        assert_eq!(plan["monthly_force"], false);
        assert_eq!(plan["as_of"], "2024-06-20");
        let orders = plan["orders"].as_array().unwrap();
        let side = |asset: &str| {
            orders
                .iter()
                .find(|o| o["asset"] == asset)
                .map(|o| o["side"].as_str().unwrap().to_string())
        };
        assert_eq!(side("BTC").as_deref(), Some("SELL"));
        assert_eq!(side("AAPL").as_deref(), Some("BUY"));
        let cost = plan["summary"]["estimated_cost"].as_f64().unwrap();
        assert!((cost - 30.0).abs() < 1e-9);
    }

    #[test]
    fn attribution_reads_stdin() {
        let mut child = Command::new(env!("CARGO_BIN_EXE_quantlab"))
            .args(["attribution", "--input", "-", "--month", "2024-05"])
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .spawn()
            .unwrap();
        {
            use std::io::Write;
            let stdin = child.stdin.as_mut().unwrap();
            stdin
                .write_all(
                    br#"{
                        "portfolio_weights": {"A": 0.6, "B": 0.4},
                        "benchmark_weights": {"A": 0.5, "B": 0.5},
                        "portfolio_returns": {"A": 0.10, "B": 0.02},
                        "benchmark_returns": {"A": 0.08, "B": 0.04},
                        "factor_exposure": {"value": 0.5},
                        "factor_return": {"value": 0.01}
                    }"#,
                )
                .unwrap();
        }
        let out = child.wait_with_output().unwrap();
        assert_eq!(out.status.code(), Some(0));
        let report = stdout_json(&out);

        assert_eq!(report["month"], "2024-05");
        let active = report["summary"]["active_return"].as_f64().unwrap();
        assert!((active - 0.008).abs() < 1e-12);
        let factor = report["summary"]["factor_total"].as_f64().unwrap();
        assert!((factor - 0.005).abs() < 1e-12);
    }
}

mod factors_command {
    use super::*;

    #[test]
    fn lists_baseline_factors() {
        let out = quantlab(&["factors"]);
        assert_eq!(out.status.code(), Some(0));
        let stdout = String::from_utf8_lossy(&out.stdout);
        let lines: Vec<&str> = stdout.lines().collect();
        assert_eq!(lines.len(), 21);
        assert!(lines[0].starts_with("NAME"));
        assert!(stdout.contains("momentum_12m"));
        assert!(stdout.contains("orderbook_imbalance"));
    }

    #[test]
    fn filters_by_category() {
        let out = quantlab(&["factors", "--category", "value"]);
        let stdout = String::from_utf8_lossy(&out.stdout);
        let names: Vec<&str> = stdout
            .lines()
            .skip(1)
            .filter_map(|l| l.split_whitespace().next())
            .collect();
        assert_eq!(names, vec!["ev_ebitda", "pb_ratio", "pe_ratio"]);
    }
}
