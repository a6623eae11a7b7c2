//! Date-indexed close-price table and pair alignment.
//!
//! Dates are strictly increasing; each ticker owns one column of the same
//! length. Missing trading days are NaN and are never coerced to zero.

use crate::domain::error::PairtraderError;
use chrono::NaiveDate;
use std::collections::{BTreeMap, BTreeSet, HashSet};

#[derive(Debug, Clone, PartialEq)]
pub struct PriceTable {
    dates: Vec<NaiveDate>,
    tickers: Vec<String>,
    columns: Vec<Vec<f64>>,
}

/// Two series restricted to the dates where both are present.
#[derive(Debug, Clone, PartialEq)]
pub struct AlignedPair {
    pub dates: Vec<NaiveDate>,
    pub a: Vec<f64>,
    pub b: Vec<f64>,
}

impl AlignedPair {
    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }
}

impl PriceTable {
    pub fn new(
        dates: Vec<NaiveDate>,
        tickers: Vec<String>,
        columns: Vec<Vec<f64>>,
    ) -> Result<Self, PairtraderError> {
        if tickers.len() != columns.len() {
            return Err(PairtraderError::InvalidPriceTable {
                reason: format!(
                    "{} tickers but {} columns",
                    tickers.len(),
                    columns.len()
                ),
            });
        }
        if let Some(w) = dates.windows(2).find(|w| w[0] >= w[1]) {
            return Err(PairtraderError::InvalidPriceTable {
                reason: format!("dates not strictly increasing at {}", w[1]),
            });
        }
        let mut seen = HashSet::new();
        for (ticker, column) in tickers.iter().zip(&columns) {
            if !seen.insert(ticker.as_str()) {
                return Err(PairtraderError::InvalidPriceTable {
                    reason: format!("duplicate ticker column {ticker}"),
                });
            }
            if column.len() != dates.len() {
                return Err(PairtraderError::InvalidPriceTable {
                    reason: format!(
                        "column {ticker} has {} rows, index has {}",
                        column.len(),
                        dates.len()
                    ),
                });
            }
        }
        Ok(Self {
            dates,
            tickers,
            columns,
        })
    }

    /// Merge per-ticker `(date, close)` series onto a unified sorted timeline.
    /// Dates a ticker lacks become NaN; a repeated date keeps the last value.
    pub fn from_series(series: Vec<(String, Vec<(NaiveDate, f64)>)>) -> Result<Self, PairtraderError> {
        let timeline: BTreeSet<NaiveDate> = series
            .iter()
            .flat_map(|(_, points)| points.iter().map(|(d, _)| *d))
            .collect();
        let dates: Vec<NaiveDate> = timeline.into_iter().collect();

        let mut tickers = Vec::with_capacity(series.len());
        let mut columns = Vec::with_capacity(series.len());
        for (ticker, points) in series {
            let by_date: BTreeMap<NaiveDate, f64> = points.into_iter().collect();
            columns.push(
                dates
                    .iter()
                    .map(|d| by_date.get(d).copied().unwrap_or(f64::NAN))
                    .collect(),
            );
            tickers.push(ticker);
        }
        Self::new(dates, tickers, columns)
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn tickers(&self) -> &[String] {
        &self.tickers
    }

    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    pub fn column(&self, ticker: &str) -> Result<&[f64], PairtraderError> {
        self.tickers
            .iter()
            .position(|t| t == ticker)
            .map(|i| self.columns[i].as_slice())
            .ok_or_else(|| PairtraderError::MissingTicker {
                ticker: ticker.to_string(),
            })
    }

    /// Sub-table with the given tickers, in the given order.
    pub fn select(&self, tickers: &[&str]) -> Result<Self, PairtraderError> {
        let mut columns = Vec::with_capacity(tickers.len());
        for t in tickers {
            columns.push(self.column(t)?.to_vec());
        }
        Self::new(
            self.dates.clone(),
            tickers.iter().map(|t| t.to_string()).collect(),
            columns,
        )
    }

    /// Rows with `start <= date < end`; `None` leaves that side open.
    pub fn slice(&self, start: Option<NaiveDate>, end: Option<NaiveDate>) -> Self {
        let keep: Vec<usize> = self
            .dates
            .iter()
            .enumerate()
            .filter(|(_, d)| start.is_none_or(|s| **d >= s) && end.is_none_or(|e| **d < e))
            .map(|(i, _)| i)
            .collect();
        self.take_rows(&keep)
    }

    /// Drop rows where every ticker is missing.
    pub fn drop_empty_rows(&self) -> Self {
        let keep: Vec<usize> = (0..self.len())
            .filter(|&i| self.columns.iter().any(|c| !c[i].is_nan()))
            .collect();
        self.take_rows(&keep)
    }

    /// Drop rows where any ticker is missing.
    pub fn drop_incomplete_rows(&self) -> Self {
        let keep: Vec<usize> = (0..self.len())
            .filter(|&i| self.columns.iter().all(|c| !c[i].is_nan()))
            .collect();
        self.take_rows(&keep)
    }

    fn take_rows(&self, keep: &[usize]) -> Self {
        Self {
            dates: keep.iter().map(|&i| self.dates[i]).collect(),
            tickers: self.tickers.clone(),
            columns: self
                .columns
                .iter()
                .map(|c| keep.iter().map(|&i| c[i]).collect())
                .collect(),
        }
    }

    /// Simple returns per ticker; the first row and any NaN become 0.
    pub fn simple_returns(&self, ticker: &str) -> Result<Vec<f64>, PairtraderError> {
        Ok(simple_returns(self.column(ticker)?))
    }
}

/// Keep the rows where both columns are present.
pub fn align(dates: &[NaiveDate], a: &[f64], b: &[f64]) -> AlignedPair {
    let mut out = AlignedPair {
        dates: Vec::new(),
        a: Vec::new(),
        b: Vec::new(),
    };
    for ((d, &x), &y) in dates.iter().zip(a).zip(b) {
        if !x.is_nan() && !y.is_nan() {
            out.dates.push(*d);
            out.a.push(x);
            out.b.push(y);
        }
    }
    out
}

/// `p[t] / p[t-1] - 1`, with undefined values filled as 0.
pub fn simple_returns(prices: &[f64]) -> Vec<f64> {
    let mut out = Vec::with_capacity(prices.len());
    for i in 0..prices.len() {
        let r = if i == 0 {
            f64::NAN
        } else {
            prices[i] / prices[i - 1] - 1.0
        };
        out.push(if r.is_finite() { r } else { 0.0 });
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, day).unwrap()
    }

    fn sample_table() -> PriceTable {
        PriceTable::new(
            vec![d(1), d(2), d(3), d(4)],
            vec!["AAA".into(), "BBB".into()],
            vec![
                vec![10.0, f64::NAN, 12.0, 13.0],
                vec![20.0, 21.0, f64::NAN, 23.0],
            ],
        )
        .unwrap()
    }

    #[test]
    fn rejects_unsorted_dates() {
        let err = PriceTable::new(vec![d(2), d(1)], vec!["A".into()], vec![vec![1.0, 2.0]])
            .unwrap_err();
        assert!(matches!(err, PairtraderError::InvalidPriceTable { .. }));
    }

    #[test]
    fn rejects_duplicate_dates() {
        let err = PriceTable::new(vec![d(1), d(1)], vec!["A".into()], vec![vec![1.0, 2.0]])
            .unwrap_err();
        assert!(matches!(err, PairtraderError::InvalidPriceTable { .. }));
    }

    #[test]
    fn rejects_ragged_columns() {
        let err = PriceTable::new(vec![d(1), d(2)], vec!["A".into()], vec![vec![1.0]])
            .unwrap_err();
        assert!(matches!(err, PairtraderError::InvalidPriceTable { .. }));
    }

    #[test]
    fn missing_column_is_contract_error() {
        let table = sample_table();
        let err = table.column("ZZZ").unwrap_err();
        assert!(matches!(err, PairtraderError::MissingTicker { ticker } if ticker == "ZZZ"));
    }

    #[test]
    fn align_drops_rows_with_any_nan() {
        let table = sample_table();
        let pair = align(
            table.dates(),
            table.column("AAA").unwrap(),
            table.column("BBB").unwrap(),
        );
        assert_eq!(pair.dates, vec![d(1), d(4)]);
        assert_eq!(pair.a, vec![10.0, 13.0]);
        assert_eq!(pair.b, vec![20.0, 23.0]);
    }

    #[test]
    fn from_series_builds_unified_timeline() {
        let table = PriceTable::from_series(vec![
            ("AAA".into(), vec![(d(3), 3.0), (d(1), 1.0)]),
            ("BBB".into(), vec![(d(2), 2.0)]),
        ])
        .unwrap();
        assert_eq!(table.dates(), &[d(1), d(2), d(3)]);
        let a = table.column("AAA").unwrap();
        assert_eq!(a[0], 1.0);
        assert!(a[1].is_nan());
        assert_eq!(a[2], 3.0);
    }

    #[test]
    fn slice_is_half_open() {
        let table = sample_table();
        let sliced = table.slice(Some(d(2)), Some(d(4)));
        assert_eq!(sliced.dates(), &[d(2), d(3)]);
        let open_start = table.slice(None, Some(d(2)));
        assert_eq!(open_start.dates(), &[d(1)]);
    }

    #[test]
    fn drop_empty_rows_keeps_partial_rows() {
        let table = PriceTable::new(
            vec![d(1), d(2), d(3)],
            vec!["A".into(), "B".into()],
            vec![vec![1.0, f64::NAN, f64::NAN], vec![f64::NAN, f64::NAN, 3.0]],
        )
        .unwrap();
        let cleaned = table.drop_empty_rows();
        assert_eq!(cleaned.dates(), &[d(1), d(3)]);
        assert_eq!(table.drop_incomplete_rows().len(), 0);
    }

    #[test]
    fn select_reorders_columns() {
        let table = sample_table();
        let sel = table.select(&["BBB", "AAA"]).unwrap();
        assert_eq!(sel.tickers(), &["BBB".to_string(), "AAA".to_string()]);
        assert!(table.select(&["AAA", "NOPE"]).is_err());
    }

    #[test]
    fn simple_returns_fill_undefined_with_zero() {
        let r = simple_returns(&[100.0, 110.0, f64::NAN, 121.0]);
        assert_eq!(r[0], 0.0);
        assert!((r[1] - 0.10).abs() < 1e-12);
        assert_eq!(r[2], 0.0);
        assert_eq!(r[3], 0.0);
    }
}
