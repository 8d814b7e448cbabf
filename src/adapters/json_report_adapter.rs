//! JSON report adapter implementing ReportPort.

use crate::domain::backtest::BacktestReport;
use crate::domain::error::QuantError;
use crate::ports::report_port::ReportPort;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

/// Writes the full report, trades and daily returns included, as
/// pretty-printed JSON. Missing parent directories are created.
#[derive(Debug, Default)]
pub struct JsonReportAdapter;

impl ReportPort for JsonReportAdapter {
    fn write(&self, report: &BacktestReport, output_path: &Path) -> Result<(), QuantError> {
        if let Some(parent) = output_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let mut out = BufWriter::new(File::create(output_path)?);
        serde_json::to_writer_pretty(&mut out, report)?;
        out.write_all(b"\n")?;
        out.flush()?;
        tracing::info!(path = %output_path.display(), trades = report.trades.len(), "report written");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::backtest::WalkForwardBacktestEngine;
    use crate::domain::backtest::WalkForwardConfig;
    use crate::domain::market::Market;
    use crate::domain::portal::{HistoricalDataPortal, SeriesSource};
    use crate::domain::retry::RetryPolicy;
    use crate::domain::strategy::Momentum;
    use crate::domain::universe::UniverseProvider;
    use chrono::NaiveDate;
    use tempfile::TempDir;

    fn halted_report() -> BacktestReport {
        let config = WalkForwardConfig {
            market: Market::Us,
            ..WalkForwardConfig::default()
        };
        let engine = WalkForwardBacktestEngine::new(
            config,
            UniverseProvider::offline().with_retry(RetryPolicy::none()),
            HistoricalDataPortal::new(Market::Us, SeriesSource::new(None, None, RetryPolicy::none())),
        );
        engine.run(
            &Momentum::default(),
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 12, 31).unwrap(),
        )
    }

    #[test]
    fn writes_pretty_json_into_new_directory() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("report.json");
        let report = halted_report();

        JsonReportAdapter.write(&report, &path).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["strategy"], "momentum");
        assert_eq!(value["market"], "us");
        assert!(value["error"].as_str().unwrap().starts_with("not enough calendar days"));
        assert_eq!(value["trades"].as_array().unwrap().len(), 0);
    }
}
