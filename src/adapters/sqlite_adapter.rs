//! SQLite store: OHLCV history, fundamentals, universe tables and
//! alternative data in one file.

use crate::domain::bar::Bar;
use crate::domain::config::store_settings;
use crate::domain::error::QuantError;
use crate::domain::market::Market;
use crate::ports::config_port::ConfigPort;
use crate::ports::data_port::DataPort;
use crate::ports::fundamentals_port::{AltData, AltDataPort, Fundamentals, FundamentalsPort};
use crate::ports::universe_port::{Membership, UniversePort};
use chrono::NaiveDate;
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{OptionalExtension, params};

const DATE_FMT: &str = "%Y-%m-%d";

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS ohlcv (
        symbol TEXT NOT NULL,
        market TEXT NOT NULL,
        date TEXT NOT NULL,
        open REAL NOT NULL,
        high REAL NOT NULL,
        low REAL NOT NULL,
        close REAL NOT NULL,
        volume REAL NOT NULL,
        PRIMARY KEY (symbol, market, date)
    );
    CREATE INDEX IF NOT EXISTS idx_ohlcv_market_date ON ohlcv(market, date);
    CREATE TABLE IF NOT EXISTS fundamentals (
        symbol TEXT NOT NULL,
        market TEXT NOT NULL,
        pe REAL, pb REAL, roe REAL, roa REAL, debt_ratio REAL, ev_ebitda REAL,
        revenue_growth REAL, earnings_surprise REAL,
        net_income REAL, operating_income REAL, total_assets REAL,
        PRIMARY KEY (symbol, market)
    );
    CREATE TABLE IF NOT EXISTS universe_snapshot (
        market TEXT NOT NULL,
        snapshot_date TEXT NOT NULL,
        symbol TEXT NOT NULL,
        rank INTEGER NOT NULL,
        PRIMARY KEY (market, snapshot_date, symbol)
    );
    CREATE TABLE IF NOT EXISTS universe_current (
        market TEXT NOT NULL,
        symbol TEXT NOT NULL,
        PRIMARY KEY (market, symbol)
    );
    CREATE TABLE IF NOT EXISTS universe_membership (
        market TEXT NOT NULL,
        symbol TEXT NOT NULL,
        start_date TEXT,
        end_date TEXT
    );
    CREATE TABLE IF NOT EXISTS alt_data (
        symbol TEXT PRIMARY KEY,
        search_trend_7d REAL,
        sentiment_score REAL
    );
    CREATE TABLE IF NOT EXISTS macro_sentiment (
        date TEXT PRIMARY KEY,
        fear_greed REAL NOT NULL
    );
    CREATE TABLE IF NOT EXISTS orderbook (
        symbol TEXT NOT NULL,
        ts TEXT NOT NULL,
        imbalance REAL NOT NULL,
        PRIMARY KEY (symbol, ts)
    );";

fn db_err(e: r2d2::Error) -> QuantError {
    QuantError::Database {
        reason: e.to_string(),
    }
}

fn query_err(e: rusqlite::Error) -> QuantError {
    QuantError::DatabaseQuery {
        reason: e.to_string(),
    }
}

fn parse_date(s: &str) -> rusqlite::Result<NaiveDate> {
    NaiveDate::parse_from_str(s, DATE_FMT).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(s.len(), rusqlite::types::Type::Text, Box::new(e))
    })
}

fn parse_opt_date(s: Option<String>) -> rusqlite::Result<Option<NaiveDate>> {
    s.filter(|s| !s.trim().is_empty())
        .map(|s| parse_date(s.trim()))
        .transpose()
}

fn fmt_date(d: NaiveDate) -> String {
    d.format(DATE_FMT).to_string()
}

pub struct SqliteAdapter {
    pool: Pool<SqliteConnectionManager>,
}

impl SqliteAdapter {
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, QuantError> {
        let settings = store_settings(config)?;
        let db_path = settings.sqlite_path.ok_or_else(|| QuantError::ConfigMissing {
            section: "sqlite".into(),
            key: "path".into(),
        })?;

        let manager = SqliteConnectionManager::file(&db_path);
        let pool = Pool::builder()
            .max_size(settings.pool_size)
            .build(manager)
            .map_err(db_err)?;

        Ok(Self { pool })
    }

    pub fn in_memory() -> Result<Self, QuantError> {
        let manager = SqliteConnectionManager::memory();
        let pool = Pool::builder().max_size(1).build(manager).map_err(db_err)?;
        Ok(Self { pool })
    }

    fn conn(&self) -> Result<PooledConnection<SqliteConnectionManager>, QuantError> {
        self.pool.get().map_err(db_err)
    }

    pub fn initialize_schema(&self) -> Result<(), QuantError> {
        self.conn()?.execute_batch(SCHEMA).map_err(query_err)
    }

    pub fn insert_bars(&self, symbol: &str, market: Market, bars: &[Bar]) -> Result<(), QuantError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(query_err)?;
        let symbol = market.normalize_symbol(symbol);
        for bar in bars {
            tx.execute(
                "INSERT OR REPLACE INTO ohlcv (symbol, market, date, open, high, low, close, volume)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    symbol,
                    market.as_str(),
                    fmt_date(bar.date),
                    bar.open,
                    bar.high,
                    bar.low,
                    bar.close,
                    bar.volume
                ],
            )
            .map_err(query_err)?;
        }
        tx.commit().map_err(query_err)
    }

    pub fn insert_fundamentals(&self, symbol: &str, market: Market, f: &Fundamentals) -> Result<(), QuantError> {
        self.conn()?
            .execute(
                "INSERT OR REPLACE INTO fundamentals (symbol, market, pe, pb, roe, roa, debt_ratio,
                 ev_ebitda, revenue_growth, earnings_surprise, net_income, operating_income, total_assets)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
                params![
                    market.normalize_symbol(symbol),
                    market.as_str(),
                    f.pe,
                    f.pb,
                    f.roe,
                    f.roa,
                    f.debt_ratio,
                    f.ev_ebitda,
                    f.revenue_growth,
                    f.earnings_surprise,
                    f.net_income,
                    f.operating_income,
                    f.total_assets
                ],
            )
            .map_err(query_err)?;
        Ok(())
    }

    /// Record a ranked constituency snapshot (rank = list position).
    pub fn insert_snapshot(&self, market: Market, date: NaiveDate, symbols: &[String]) -> Result<(), QuantError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(query_err)?;
        for (rank, symbol) in symbols.iter().enumerate() {
            tx.execute(
                "INSERT OR REPLACE INTO universe_snapshot (market, snapshot_date, symbol, rank)
                 VALUES (?1, ?2, ?3, ?4)",
                params![market.as_str(), fmt_date(date), market.normalize_symbol(symbol), rank as i64],
            )
            .map_err(query_err)?;
        }
        tx.commit().map_err(query_err)
    }

    pub fn insert_current(&self, market: Market, symbols: &[String]) -> Result<(), QuantError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(query_err)?;
        for symbol in symbols {
            tx.execute(
                "INSERT OR REPLACE INTO universe_current (market, symbol) VALUES (?1, ?2)",
                params![market.as_str(), market.normalize_symbol(symbol)],
            )
            .map_err(query_err)?;
        }
        tx.commit().map_err(query_err)
    }

    pub fn insert_membership(&self, market: Market, rows: &[Membership]) -> Result<(), QuantError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(query_err)?;
        for m in rows {
            tx.execute(
                "INSERT INTO universe_membership (market, symbol, start_date, end_date)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    market.as_str(),
                    market.normalize_symbol(&m.symbol),
                    m.start_date.map(fmt_date),
                    m.end_date.map(fmt_date)
                ],
            )
            .map_err(query_err)?;
        }
        tx.commit().map_err(query_err)
    }

    pub fn insert_alt_data(&self, symbol: &str, data: &AltData) -> Result<(), QuantError> {
        self.conn()?
            .execute(
                "INSERT OR REPLACE INTO alt_data (symbol, search_trend_7d, sentiment_score) VALUES (?1, ?2, ?3)",
                params![symbol.trim().to_uppercase(), data.search_trend_7d, data.sentiment_score],
            )
            .map_err(query_err)?;
        Ok(())
    }

    pub fn insert_fear_greed(&self, date: NaiveDate, value: f64) -> Result<(), QuantError> {
        self.conn()?
            .execute(
                "INSERT OR REPLACE INTO macro_sentiment (date, fear_greed) VALUES (?1, ?2)",
                params![fmt_date(date), value],
            )
            .map_err(query_err)?;
        Ok(())
    }

    /// `ts` is any sortable timestamp text; the latest row wins on read.
    pub fn insert_orderbook(&self, symbol: &str, ts: &str, imbalance: f64) -> Result<(), QuantError> {
        self.conn()?
            .execute(
                "INSERT OR REPLACE INTO orderbook (symbol, ts, imbalance) VALUES (?1, ?2, ?3)",
                params![symbol.trim().to_uppercase(), ts, imbalance],
            )
            .map_err(query_err)?;
        Ok(())
    }

    fn symbol_list(&self, query: &str, params: impl rusqlite::Params) -> Result<Vec<String>, QuantError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(query).map_err(query_err)?;
        let rows = stmt.query_map(params, |row| row.get(0)).map_err(query_err)?;
        let symbols = rows.collect::<Result<Vec<String>, _>>().map_err(query_err)?;
        Ok(symbols)
    }
}

impl DataPort for SqliteAdapter {
    fn fetch_ohlcv(
        &self,
        symbol: &str,
        market: Market,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Vec<Bar>, QuantError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT date, open, high, low, close, volume
                 FROM ohlcv
                 WHERE symbol = ?1 AND market = ?2 AND date >= ?3 AND date <= ?4
                 ORDER BY date ASC",
            )
            .map_err(query_err)?;

        let rows = stmt
            .query_map(
                params![
                    market.normalize_symbol(symbol),
                    market.as_str(),
                    fmt_date(start_date),
                    fmt_date(end_date)
                ],
                |row| {
                    let date: String = row.get(0)?;
                    Ok(Bar {
                        date: parse_date(&date)?,
                        open: row.get(1)?,
                        high: row.get(2)?,
                        low: row.get(3)?,
                        close: row.get(4)?,
                        volume: row.get(5)?,
                    })
                },
            )
            .map_err(query_err)?;

        let bars = rows.collect::<Result<Vec<_>, _>>().map_err(query_err)?;
        Ok(bars)
    }

    fn list_symbols(&self, market: Market) -> Result<Vec<String>, QuantError> {
        self.symbol_list(
            "SELECT DISTINCT symbol FROM ohlcv WHERE market = ?1 ORDER BY symbol",
            params![market.as_str()],
        )
    }

    fn get_data_range(
        &self,
        symbol: &str,
        market: Market,
    ) -> Result<Option<(NaiveDate, NaiveDate, usize)>, QuantError> {
        let conn = self.conn()?;
        let result: (Option<String>, Option<String>, i64) = conn
            .query_row(
                "SELECT MIN(date), MAX(date), COUNT(*) FROM ohlcv WHERE symbol = ?1 AND market = ?2",
                params![market.normalize_symbol(symbol), market.as_str()],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .map_err(query_err)?;

        match result {
            (Some(min), Some(max), count) if count > 0 => {
                let min = parse_date(&min).map_err(query_err)?;
                let max = parse_date(&max).map_err(query_err)?;
                Ok(Some((min, max, count as usize)))
            }
            _ => Ok(None),
        }
    }
}

impl UniversePort for SqliteAdapter {
    fn snapshot_members(&self, market: Market, as_of: NaiveDate) -> Result<Vec<String>, QuantError> {
        self.symbol_list(
            "SELECT symbol FROM universe_snapshot
             WHERE market = ?1 AND snapshot_date = (
                 SELECT MAX(snapshot_date) FROM universe_snapshot
                 WHERE market = ?1 AND snapshot_date <= ?2)
             ORDER BY rank ASC, symbol ASC",
            params![market.as_str(), fmt_date(as_of)],
        )
    }

    fn symbols_with_bars(&self, market: Market, as_of: NaiveDate, limit: usize) -> Result<Vec<String>, QuantError> {
        self.symbol_list(
            "SELECT symbol FROM ohlcv
             WHERE market = ?1 AND date <= ?2
             GROUP BY symbol
             ORDER BY MAX(date) DESC, symbol ASC
             LIMIT ?3",
            params![market.as_str(), fmt_date(as_of), limit.min(i64::MAX as usize) as i64],
        )
    }

    fn current_members(&self, market: Market) -> Result<Vec<String>, QuantError> {
        self.symbol_list(
            "SELECT symbol FROM universe_current WHERE market = ?1 ORDER BY symbol",
            params![market.as_str()],
        )
    }

    fn membership_history(&self, market: Market) -> Result<Vec<Membership>, QuantError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT symbol, start_date, end_date FROM universe_membership
                 WHERE market = ?1 ORDER BY symbol, start_date",
            )
            .map_err(query_err)?;
        let rows = stmt
            .query_map(params![market.as_str()], |row| {
                Ok(Membership {
                    symbol: row.get(0)?,
                    start_date: parse_opt_date(row.get(1)?)?,
                    end_date: parse_opt_date(row.get(2)?)?,
                })
            })
            .map_err(query_err)?;
        let members = rows.collect::<Result<Vec<_>, _>>().map_err(query_err)?;
        Ok(members)
    }
}

impl FundamentalsPort for SqliteAdapter {
    fn fundamentals(&self, symbol: &str, market: Market) -> Result<Option<Fundamentals>, QuantError> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT pe, pb, roe, roa, debt_ratio, ev_ebitda, revenue_growth, earnings_surprise,
                    net_income, operating_income, total_assets
             FROM fundamentals WHERE symbol = ?1 AND market = ?2",
            params![market.normalize_symbol(symbol), market.as_str()],
            |row| {
                let f = |i: usize| -> rusqlite::Result<f64> { Ok(row.get::<_, Option<f64>>(i)?.unwrap_or(0.0)) };
                Ok(Fundamentals {
                    pe: f(0)?,
                    pb: f(1)?,
                    roe: f(2)?,
                    roa: f(3)?,
                    debt_ratio: f(4)?,
                    ev_ebitda: f(5)?,
                    revenue_growth: f(6)?,
                    earnings_surprise: f(7)?,
                    net_income: f(8)?,
                    operating_income: f(9)?,
                    total_assets: f(10)?,
                })
            },
        )
        .optional()
        .map_err(query_err)
    }
}

impl AltDataPort for SqliteAdapter {
    fn alt_data(&self, symbol: &str) -> Result<Option<AltData>, QuantError> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT search_trend_7d, sentiment_score FROM alt_data WHERE symbol = ?1",
            params![symbol.trim().to_uppercase()],
            |row| {
                Ok(AltData {
                    search_trend_7d: row.get::<_, Option<f64>>(0)?.unwrap_or(0.0),
                    sentiment_score: row.get::<_, Option<f64>>(1)?.unwrap_or(0.0),
                })
            },
        )
        .optional()
        .map_err(query_err)
    }

    fn fear_greed_index(&self) -> Result<Option<f64>, QuantError> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT fear_greed FROM macro_sentiment ORDER BY date DESC LIMIT 1",
            [],
            |row| row.get(0),
        )
        .optional()
        .map_err(query_err)
    }

    fn orderbook_imbalance(&self, symbol: &str) -> Result<Option<f64>, QuantError> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT imbalance FROM orderbook WHERE symbol = ?1 ORDER BY ts DESC LIMIT 1",
            params![symbol.trim().to_uppercase()],
            |row| row.get(0),
        )
        .optional()
        .map_err(query_err)
    }
}
