//! Ticker universe: parse the configured list, load what the price source
//! can supply, and split the result into train and test windows.

use crate::domain::error::PairtraderError;
use crate::domain::price_table::PriceTable;
use crate::ports::price_source::PriceSource;
use chrono::NaiveDate;
use std::collections::HashSet;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum UniverseError {
    #[error("empty token in ticker list")]
    EmptyToken,

    #[error("duplicate ticker: {0}")]
    DuplicateTicker(String),
}

/// Split a comma-separated list. Tickers keep their case; exchange
/// suffixes such as `.AX` are part of the symbol.
pub fn parse_tickers(input: &str) -> Result<Vec<String>, UniverseError> {
    let mut tickers = Vec::new();
    let mut seen = HashSet::new();

    for token in input.split(',') {
        let ticker = token.trim();
        if ticker.is_empty() {
            return Err(UniverseError::EmptyToken);
        }
        if !seen.insert(ticker.to_string()) {
            return Err(UniverseError::DuplicateTicker(ticker.to_string()));
        }
        tickers.push(ticker.to_string());
    }

    Ok(tickers)
}

#[derive(Debug, Clone, PartialEq)]
pub struct SkippedTicker {
    pub ticker: String,
    pub reason: String,
}

#[derive(Debug, Clone)]
pub struct LoadedUniverse {
    pub prices: PriceTable,
    pub skipped: Vec<SkippedTicker>,
}

impl LoadedUniverse {
    pub fn tickers(&self) -> &[String] {
        self.prices.tickers()
    }
}

/// Fetch every ticker over `[start, end)`. Failed or empty tickers are
/// logged and skipped; it is an error only when nothing loads.
pub fn load_universe(
    source: &dyn PriceSource,
    tickers: &[String],
    start: NaiveDate,
    end: NaiveDate,
) -> Result<LoadedUniverse, PairtraderError> {
    let mut series = Vec::new();
    let mut skipped = Vec::new();

    for ticker in tickers {
        match source.fetch_close(ticker, start, end) {
            Ok(rows) if rows.is_empty() => {
                warn!(ticker = %ticker, "skipping ticker: no rows in range");
                skipped.push(SkippedTicker {
                    ticker: ticker.clone(),
                    reason: "no rows in range".to_string(),
                });
            }
            Ok(rows) => series.push((ticker.clone(), rows)),
            Err(e) => {
                warn!(ticker = %ticker, error = %e, "skipping ticker");
                skipped.push(SkippedTicker {
                    ticker: ticker.clone(),
                    reason: e.to_string(),
                });
            }
        }
    }

    if series.is_empty() {
        return Err(PairtraderError::NoData {
            ticker: tickers.join(","),
            reason: "no ticker in the universe returned prices".to_string(),
        });
    }

    let prices = PriceTable::from_series(series)?.drop_empty_rows();
    info!(
        loaded = prices.tickers().len(),
        requested = tickers.len(),
        rows = prices.len(),
        "universe loaded"
    );
    Ok(LoadedUniverse { prices, skipped })
}

/// `(rows before test_start, rows in [test_start, test_end))`.
pub fn split_train_test(
    prices: &PriceTable,
    test_start: NaiveDate,
    test_end: Option<NaiveDate>,
) -> Result<(PriceTable, PriceTable), PairtraderError> {
    if let Some(end) = test_end.filter(|e| *e <= test_start) {
        return Err(PairtraderError::invalid(
            "test_end",
            format!("test_end {end} must be after test_start {test_start}"),
        ));
    }
    Ok((
        prices.slice(None, Some(test_start)),
        prices.slice(Some(test_start), test_end),
    ))
}
