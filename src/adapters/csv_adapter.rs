//! CSV price adapter.
//!
//! Two layouts:
//! - a directory of `<TICKER>.csv` files with `date,close` columns
//! - one wide file `date,<T1>,<T2>,...` where an empty cell is a missing day

use crate::domain::error::PairtraderError;
use crate::domain::price_table::PriceTable;
use crate::ports::price_source::PriceSource;
use chrono::NaiveDate;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug)]
enum Layout {
    Directory(PathBuf),
    Wide(PriceTable),
}

#[derive(Debug)]
pub struct CsvPriceSource {
    layout: Layout,
}

impl CsvPriceSource {
    /// A directory selects the per-ticker layout; a file is read once as a
    /// wide table.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, PairtraderError> {
        let path = path.as_ref();
        let layout = if path.is_dir() {
            Layout::Directory(path.to_path_buf())
        } else {
            Layout::Wide(read_price_table(path)?)
        };
        Ok(Self { layout })
    }

    pub fn from_directory(base_path: PathBuf) -> Self {
        Self {
            layout: Layout::Directory(base_path),
        }
    }
}

fn read_ticker_file(dir: &Path, ticker: &str) -> Result<Vec<(NaiveDate, f64)>, PairtraderError> {
    let path = dir.join(format!("{ticker}.csv"));
    if !path.is_file() {
        return Err(PairtraderError::NoData {
            ticker: ticker.to_string(),
            reason: format!("{} not found", path.display()),
        });
    }

    let mut rdr = csv::Reader::from_path(&path)?;
    let headers = rdr.headers()?.clone();
    let close_idx = headers
        .iter()
        .position(|h| h.trim().eq_ignore_ascii_case("close"))
        .unwrap_or(1);

    let mut rows = Vec::new();
    for result in rdr.records() {
        let record = result?;
        let date = parse_date(record.get(0), &path)?;
        match parse_cell(record.get(close_idx), &path, date)? {
            Some(close) => rows.push((date, close)),
            None => continue,
        }
    }
    rows.sort_by_key(|(d, _)| *d);
    Ok(rows)
}

impl PriceSource for CsvPriceSource {
    fn fetch_close(
        &self,
        ticker: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<(NaiveDate, f64)>, PairtraderError> {
        let rows: Vec<(NaiveDate, f64)> = match &self.layout {
            Layout::Directory(dir) => read_ticker_file(dir, ticker)?,
            Layout::Wide(table) => {
                let column = table.column(ticker).map_err(|_| PairtraderError::NoData {
                    ticker: ticker.to_string(),
                    reason: "no such column in price file".to_string(),
                })?;
                table
                    .dates()
                    .iter()
                    .copied()
                    .zip(column.iter().copied())
                    .filter(|(_, v)| !v.is_nan())
                    .collect()
            }
        };
        let rows: Vec<(NaiveDate, f64)> = rows
            .into_iter()
            .filter(|(d, _)| *d >= start && *d < end)
            .collect();
        debug!(ticker, rows = rows.len(), "loaded closes");
        Ok(rows)
    }

    fn list_tickers(&self) -> Result<Vec<String>, PairtraderError> {
        match &self.layout {
            Layout::Wide(table) => Ok(table.tickers().to_vec()),
            Layout::Directory(dir) => {
                let mut tickers = Vec::new();
                for entry in fs::read_dir(dir)? {
                    let path = entry?.path();
                    if !path.extension().is_some_and(|e| e == "csv") {
                        continue;
                    }
                    if let Some(stem) = path.file_stem() {
                        tickers.push(stem.to_string_lossy().into_owned());
                    }
                }
                tickers.sort();
                Ok(tickers)
            }
        }
    }
}

/// Read a wide `date,<T1>,<T2>,...` file. Rows may come in any order.
pub fn read_price_table<P: AsRef<Path>>(path: P) -> Result<PriceTable, PairtraderError> {
    let path = path.as_ref();
    let mut rdr = csv::Reader::from_path(path)?;
    let headers = rdr.headers()?.clone();
    let tickers: Vec<String> = headers.iter().skip(1).map(|h| h.trim().to_string()).collect();
    if tickers.is_empty() {
        return Err(PairtraderError::InvalidPriceTable {
            reason: format!("{}: no ticker columns", path.display()),
        });
    }

    let mut rows: Vec<(NaiveDate, Vec<f64>)> = Vec::new();
    for result in rdr.records() {
        let record = result?;
        let date = parse_date(record.get(0), path)?;
        let values = (1..=tickers.len())
            .map(|i| parse_cell(record.get(i), path, date).map(|v| v.unwrap_or(f64::NAN)))
            .collect::<Result<Vec<_>, _>>()?;
        rows.push((date, values));
    }
    rows.sort_by_key(|(d, _)| *d);

    let dates = rows.iter().map(|(d, _)| *d).collect();
    let columns = (0..tickers.len())
        .map(|j| rows.iter().map(|(_, v)| v[j]).collect())
        .collect();
    PriceTable::new(dates, tickers, columns)
}

/// Write the wide layout; NaN becomes an empty cell.
pub fn write_price_table<P: AsRef<Path>>(table: &PriceTable, path: P) -> Result<(), PairtraderError> {
    let mut wtr = csv::Writer::from_path(path)?;
    let mut header = vec!["date".to_string()];
    header.extend(table.tickers().iter().cloned());
    wtr.write_record(&header)?;

    let columns = table
        .tickers()
        .iter()
        .map(|t| table.column(t))
        .collect::<Result<Vec<_>, _>>()?;
    for (i, date) in table.dates().iter().enumerate() {
        let mut row = vec![date.format(DATE_FORMAT).to_string()];
        row.extend(columns.iter().map(|c| {
            if c[i].is_nan() {
                String::new()
            } else {
                c[i].to_string()
            }
        }));
        wtr.write_record(&row)?;
    }
    wtr.flush()?;
    Ok(())
}

fn parse_date(field: Option<&str>, path: &Path) -> Result<NaiveDate, PairtraderError> {
    let raw = field.unwrap_or("").trim();
    NaiveDate::parse_from_str(raw, DATE_FORMAT).map_err(|e| PairtraderError::InvalidPriceTable {
        reason: format!("{}: invalid date '{raw}': {e}", path.display()),
    })
}

/// Empty, `NaN` or missing cells are absent prices.
fn parse_cell(
    field: Option<&str>,
    path: &Path,
    date: NaiveDate,
) -> Result<Option<f64>, PairtraderError> {
    let raw = field.unwrap_or("").trim();
    if raw.is_empty() || raw.eq_ignore_ascii_case("nan") {
        return Ok(None);
    }
    raw.parse::<f64>()
        .map(Some)
        .map_err(|e| PairtraderError::InvalidPriceTable {
            reason: format!("{}: invalid price '{raw}' on {date}: {e}", path.display()),
        })
}
