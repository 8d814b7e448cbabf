//! Report output port.

use crate::domain::backtest::BacktestReport;
use crate::domain::error::QuantError;
use std::path::Path;

/// Port for persisting backtest reports.
pub trait ReportPort {
    fn write(&self, report: &BacktestReport, output_path: &Path) -> Result<(), QuantError>;
}
