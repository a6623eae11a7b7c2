//! Price access port trait.

use crate::domain::error::PairtraderError;
use chrono::NaiveDate;

pub trait PriceSource {
    /// Daily closes for `ticker` with `start <= date < end`, ascending.
    fn fetch_close(
        &self,
        ticker: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<(NaiveDate, f64)>, PairtraderError>;

    fn list_tickers(&self) -> Result<Vec<String>, PairtraderError>;
}
