#![allow(dead_code)]

use chrono::{Datelike, Duration, NaiveDate, Weekday};
use pairtrader::domain::error::PairtraderError;
use pairtrader::domain::price_table::PriceTable;
use pairtrader::ports::price_source::PriceSource;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;

pub struct MockPriceSource {
    pub data: HashMap<String, Vec<(NaiveDate, f64)>>,
    pub errors: HashMap<String, String>,
}

impl MockPriceSource {
    pub fn new() -> Self {
        Self {
            data: HashMap::new(),
            errors: HashMap::new(),
        }
    }

    pub fn with_series(mut self, ticker: &str, dates: &[NaiveDate], closes: &[f64]) -> Self {
        let rows = dates.iter().copied().zip(closes.iter().copied()).collect();
        self.data.insert(ticker.to_string(), rows);
        self
    }

    pub fn with_error(mut self, ticker: &str, reason: &str) -> Self {
        self.errors.insert(ticker.to_string(), reason.to_string());
        self
    }
}

impl PriceSource for MockPriceSource {
    fn fetch_close(
        &self,
        ticker: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<(NaiveDate, f64)>, PairtraderError> {
        if let Some(reason) = self.errors.get(ticker) {
            return Err(PairtraderError::NoData {
                ticker: ticker.to_string(),
                reason: reason.clone(),
            });
        }
        Ok(self
            .data
            .get(ticker)
            .map(|rows| {
                rows.iter()
                    .copied()
                    .filter(|(d, _)| *d >= start && *d < end)
                    .collect()
            })
            .unwrap_or_default())
    }

    fn list_tickers(&self) -> Result<Vec<String>, PairtraderError> {
        let mut tickers: Vec<String> = self.data.keys().cloned().collect();
        tickers.sort();
        Ok(tickers)
    }
}

pub fn date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

/// `n` weekdays starting at `start` (or the next weekday after it).
pub fn business_days(start: NaiveDate, n: usize) -> Vec<NaiveDate> {
    let mut out = Vec::with_capacity(n);
    let mut d = start;
    while out.len() < n {
        if !matches!(d.weekday(), Weekday::Sat | Weekday::Sun) {
            out.push(d);
        }
        d += Duration::days(1);
    }
    out
}

/// Gaussian-ish draw from the sum of uniforms; enough for synthetic prices.
fn noise(rng: &mut StdRng) -> f64 {
    (0..12).map(|_| rng.r#gen::<f64>()).sum::<f64>() - 6.0
}

pub fn random_walk(seed: u64, n: usize, start: f64, step_sd: f64) -> Vec<f64> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut out = Vec::with_capacity(n);
    let mut level = start;
    for _ in 0..n {
        out.push(level);
        level += step_sd * noise(&mut rng);
    }
    out
}

pub fn ar1(seed: u64, n: usize, phi: f64, sd: f64) -> Vec<f64> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut out = Vec::with_capacity(n);
    let mut x = 0.0;
    for _ in 0..n {
        x = phi * x + sd * noise(&mut rng);
        out.push(x);
    }
    out
}

/// `b = 2a + AR(1)` over `n` business days from 2020-01-01.
pub fn cointegrated_pair(seed: u64, n: usize) -> (Vec<NaiveDate>, Vec<f64>, Vec<f64>) {
    let dates = business_days(date("2020-01-01"), n);
    let a = random_walk(seed, n, 100.0, 1.0);
    let eps = ar1(seed.wrapping_add(1), n, 0.85, 1.0);
    let b = a.iter().zip(&eps).map(|(x, e)| 2.0 * x + e).collect();
    (dates, a, b)
}

pub fn table(dates: Vec<NaiveDate>, columns: Vec<(&str, Vec<f64>)>) -> PriceTable {
    let (tickers, cols): (Vec<String>, Vec<Vec<f64>>) = columns
        .into_iter()
        .map(|(t, c)| (t.to_string(), c))
        .unzip();
    PriceTable::new(dates, tickers, cols).unwrap()
}

/// Cointegrated `A`/`B` plus an unrelated random walk `C`.
pub fn three_ticker_table(seed: u64, n: usize) -> PriceTable {
    let (dates, a, b) = cointegrated_pair(seed, n);
    let c = random_walk(seed.wrapping_add(99), n, 50.0, 1.0)
        .into_iter()
        .map(|v| v.abs() + 5.0)
        .collect();
    table(dates, vec![("A", a), ("B", b), ("C", c)])
}
