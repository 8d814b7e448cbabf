//! CSV directory store: one `{SYMBOL}_{market}.csv` per series plus an
//! optional `membership_{market}.csv` constituency history.

use crate::domain::bar::{Bar, into_ordered};
use crate::domain::error::QuantError;
use crate::domain::market::Market;
use crate::ports::data_port::DataPort;
use crate::ports::universe_port::{Membership, UniversePort};
use chrono::NaiveDate;
use serde::Deserialize;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

pub struct CsvAdapter {
    base_path: PathBuf,
    us_membership: Option<PathBuf>,
}

/// Membership row; column names follow the common index-history exports.
#[derive(Debug, Deserialize)]
struct MembershipRecord {
    #[serde(alias = "ticker", alias = "Symbol", alias = "Ticker")]
    symbol: String,
    #[serde(default, alias = "added", alias = "date_added")]
    start_date: Option<String>,
    #[serde(default, alias = "removed", alias = "date_removed")]
    end_date: Option<String>,
}

fn read_err(path: &Path, e: impl std::fmt::Display) -> QuantError {
    QuantError::Database {
        reason: format!("failed to read {}: {}", path.display(), e),
    }
}

fn parse_field(record: &csv::StringRecord, idx: usize, name: &str) -> Result<f64, QuantError> {
    record
        .get(idx)
        .ok_or_else(|| QuantError::Database {
            reason: format!("missing {name} column"),
        })?
        .trim()
        .parse()
        .map_err(|e| QuantError::Database {
            reason: format!("invalid {name} value: {e}"),
        })
}

/// `YYYY-MM-DD`, optionally followed by a time part; blank is unset.
fn parse_day(raw: Option<&str>) -> Result<Option<NaiveDate>, QuantError> {
    let Some(s) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
        return Ok(None);
    };
    let day = s.get(..10).unwrap_or(s);
    NaiveDate::parse_from_str(day, "%Y-%m-%d")
        .map(Some)
        .map_err(|e| QuantError::Database {
            reason: format!("invalid membership date {s:?}: {e}"),
        })
}

impl CsvAdapter {
    pub fn new(base_path: PathBuf) -> Self {
        Self {
            base_path,
            us_membership: None,
        }
    }

    /// Read US membership from `path` instead of `membership_us.csv`.
    pub fn with_us_membership(mut self, path: PathBuf) -> Self {
        self.us_membership = Some(path);
        self
    }

    fn csv_path(&self, symbol: &str, market: Market) -> PathBuf {
        self.base_path
            .join(format!("{}_{}.csv", market.normalize_symbol(symbol), market.as_str()))
    }

    fn membership_path(&self, market: Market) -> PathBuf {
        match (&self.us_membership, market) {
            (Some(path), Market::Us) => path.clone(),
            _ => self.base_path.join(format!("membership_{}.csv", market.as_str())),
        }
    }

    /// File contents, or `None` when the file does not exist.
    fn read_optional(path: &Path) -> Result<Option<String>, QuantError> {
        match fs::read_to_string(path) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(read_err(path, e)),
        }
    }

    fn read_bars(&self, symbol: &str, market: Market) -> Result<Vec<Bar>, QuantError> {
        let path = self.csv_path(symbol, market);
        let Some(content) = Self::read_optional(&path)? else {
            tracing::debug!(%symbol, %market, path = %path.display(), "no csv series");
            return Ok(Vec::new());
        };

        let mut rdr = csv::Reader::from_reader(content.as_bytes());
        let mut bars = Vec::new();
        for result in rdr.records() {
            let record = result.map_err(|e| QuantError::Database {
                reason: format!("CSV parse error: {e}"),
            })?;
            let date_str = record.get(0).ok_or_else(|| QuantError::Database {
                reason: "missing date column".into(),
            })?;
            let date = NaiveDate::parse_from_str(date_str.trim(), "%Y-%m-%d").map_err(|e| {
                QuantError::Database {
                    reason: format!("invalid date format: {e}"),
                }
            })?;
            bars.push(Bar {
                date,
                open: parse_field(&record, 1, "open")?,
                high: parse_field(&record, 2, "high")?,
                low: parse_field(&record, 3, "low")?,
                close: parse_field(&record, 4, "close")?,
                volume: parse_field(&record, 5, "volume")?,
            });
        }
        Ok(into_ordered(bars))
    }
}

impl DataPort for CsvAdapter {
    fn fetch_ohlcv(
        &self,
        symbol: &str,
        market: Market,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Vec<Bar>, QuantError> {
        let mut bars = self.read_bars(symbol, market)?;
        bars.retain(|b| b.date >= start_date && b.date <= end_date);
        Ok(bars)
    }

    fn list_symbols(&self, market: Market) -> Result<Vec<String>, QuantError> {
        let entries = fs::read_dir(&self.base_path).map_err(|e| read_err(&self.base_path, e))?;

        let suffix = format!("_{}.csv", market.as_str());
        let mut symbols = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| QuantError::Database {
                reason: format!("directory entry error: {e}"),
            })?;
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if let Some(symbol) = name.strip_suffix(&suffix) {
                if !symbol.starts_with("membership") {
                    symbols.push(symbol.to_string());
                }
            }
        }
        symbols.sort();
        Ok(symbols)
    }

    fn get_data_range(
        &self,
        symbol: &str,
        market: Market,
    ) -> Result<Option<(NaiveDate, NaiveDate, usize)>, QuantError> {
        let bars = self.read_bars(symbol, market)?;
        Ok(match (bars.first(), bars.last()) {
            (Some(first), Some(last)) => Some((first.date, last.date, bars.len())),
            _ => None,
        })
    }
}

impl UniversePort for CsvAdapter {
    /// CSV stores carry no ranked snapshots.
    fn snapshot_members(&self, _market: Market, _as_of: NaiveDate) -> Result<Vec<String>, QuantError> {
        Ok(Vec::new())
    }

    fn symbols_with_bars(&self, market: Market, as_of: NaiveDate, limit: usize) -> Result<Vec<String>, QuantError> {
        let mut last_seen = Vec::new();
        for symbol in self.list_symbols(market)? {
            let bars = self.read_bars(&symbol, market)?;
            let idx = bars.partition_point(|b| b.date <= as_of);
            if idx > 0 {
                last_seen.push((bars[idx - 1].date, symbol));
            }
        }
        last_seen.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(&b.1)));
        Ok(last_seen.into_iter().take(limit).map(|(_, s)| s).collect())
    }

    fn current_members(&self, market: Market) -> Result<Vec<String>, QuantError> {
        Ok(self
            .membership_history(market)?
            .into_iter()
            .filter(|m| m.end_date.is_none())
            .map(|m| m.symbol)
            .collect())
    }

    fn membership_history(&self, market: Market) -> Result<Vec<Membership>, QuantError> {
        let path = self.membership_path(market);
        let Some(content) = Self::read_optional(&path)? else {
            return Ok(Vec::new());
        };

        let mut rdr = csv::Reader::from_reader(content.as_bytes());
        let mut rows = Vec::new();
        for result in rdr.deserialize::<MembershipRecord>() {
            let record = result.map_err(|e| QuantError::Database {
                reason: format!("CSV parse error in {}: {e}", path.display()),
            })?;
            let symbol = market.normalize_symbol(&record.symbol);
            if symbol.is_empty() {
                continue;
            }
            rows.push(Membership {
                symbol,
                start_date: parse_day(record.start_date.as_deref())?,
                end_date: parse_day(record.end_date.as_deref())?,
            });
        }
        Ok(rows)
    }
}
