//! Historical OHLCV store / quote source port.

use crate::domain::bar::Bar;
use crate::domain::error::QuantError;
use crate::domain::market::Market;
use chrono::NaiveDate;

pub trait DataPort {
    /// Bars for `symbol` with `start_date <= date <= end_date`, ascending.
    fn fetch_ohlcv(
        &self,
        symbol: &str,
        market: Market,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Vec<Bar>, QuantError>;

    fn list_symbols(&self, market: Market) -> Result<Vec<String>, QuantError>;

    fn get_data_range(
        &self,
        symbol: &str,
        market: Market,
    ) -> Result<Option<(NaiveDate, NaiveDate, usize)>, QuantError>;
}
