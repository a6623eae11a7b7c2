//! CSV report adapter implementing ReportPort.
//!
//! One file per non-empty report part, written with serde headers.

use crate::domain::error::PairtraderError;
use crate::ports::report_port::{Report, ReportPort};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

pub const RANKED_PAIRS_FILE: &str = "ranked_pairs.csv";
pub const TRADES_FILE: &str = "trades.csv";
pub const EQUITY_FILE: &str = "equity.csv";
pub const TOP_GAINS_FILE: &str = "top_gains.csv";
pub const TOP_LOSSES_FILE: &str = "top_losses.csv";
pub const GRID_RESULTS_FILE: &str = "grid_results.csv";

#[derive(Debug, Default)]
pub struct CsvReportAdapter;

impl CsvReportAdapter {
    pub fn new() -> Self {
        Self
    }
}

fn write_rows<T: Serialize>(
    dir: &Path,
    name: &str,
    rows: &[T],
    written: &mut Vec<PathBuf>,
) -> Result<(), PairtraderError> {
    if rows.is_empty() {
        return Ok(());
    }
    let path = dir.join(name);
    let mut wtr = csv::Writer::from_path(&path)?;
    for row in rows {
        wtr.serialize(row)?;
    }
    wtr.flush()?;
    info!(file = %path.display(), rows = rows.len(), "wrote report file");
    written.push(path);
    Ok(())
}

impl ReportPort for CsvReportAdapter {
    fn write(&self, report: &Report, output_dir: &Path) -> Result<Vec<PathBuf>, PairtraderError> {
        let mut written = Vec::new();
        if report.is_empty() {
            return Ok(written);
        }
        fs::create_dir_all(output_dir)?;

        write_rows(output_dir, RANKED_PAIRS_FILE, &report.ranked_pairs, &mut written)?;
        write_rows(output_dir, TRADES_FILE, &report.trades, &mut written)?;
        write_rows(output_dir, EQUITY_FILE, &report.equity, &mut written)?;
        write_rows(output_dir, TOP_GAINS_FILE, &report.extremes.top_gains, &mut written)?;
        write_rows(output_dir, TOP_LOSSES_FILE, &report.extremes.top_losses, &mut written)?;
        write_rows(output_dir, GRID_RESULTS_FILE, &report.grid, &mut written)?;
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::position::Position;
    use crate::domain::trades::TradeRecord;
    use crate::ports::report_port::EquityRow;
    use chrono::NaiveDate;
    use tempfile::TempDir;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, day).unwrap()
    }

    fn trade() -> TradeRecord {
        TradeRecord {
            start: d(4),
            end: d(8),
            bars: 5,
            direction: Position::Long,
            side: "Long A / Short B".into(),
            entry_z: Some(-2.1),
            exit_z: None,
            gross_return: 0.03,
            est_cost: 0.002,
            net_return: 0.028,
        }
    }

    #[test]
    fn empty_report_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("out");
        let written = CsvReportAdapter::new().write(&Report::default(), &out).unwrap();
        assert!(written.is_empty());
        assert!(!out.exists());
    }

    #[test]
    fn writes_only_non_empty_parts() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("nested").join("out");
        let report = Report {
            trades: vec![trade()],
            equity: vec![EquityRow {
                date: d(4),
                position: 1,
                z: -2.1,
                pair_return: 0.0,
                pnl: 0.0,
                equity: 1.0,
            }],
            ..Report::default()
        };
        let written = CsvReportAdapter::new().write(&report, &out).unwrap();
        assert_eq!(written, vec![out.join(TRADES_FILE), out.join(EQUITY_FILE)]);

        let trades = fs::read_to_string(out.join(TRADES_FILE)).unwrap();
        let mut lines = trades.lines();
        assert_eq!(
            lines.next().unwrap(),
            "start,end,bars,direction,side,entry_z,exit_z,gross_return,est_cost,net_return"
        );
        assert_eq!(
            lines.next().unwrap(),
            "2024-03-04,2024-03-08,5,Long,Long A / Short B,-2.1,,0.03,0.002,0.028"
        );
        assert!(!out.join(GRID_RESULTS_FILE).exists());
    }
}
