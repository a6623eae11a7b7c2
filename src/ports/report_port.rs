//! Report output port trait.

use crate::domain::backtest::BacktestResult;
use crate::domain::error::PairtraderError;
use crate::domain::grid_search::GridResult;
use crate::domain::pair_ranker::PairCandidate;
use crate::domain::trades::{ExtremeTrades, TradeRecord};
use chrono::NaiveDate;
use serde::Serialize;
use std::path::Path;

/// One bar of a backtest, as exported.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EquityRow {
    pub date: NaiveDate,
    pub position: i8,
    pub z: f64,
    pub pair_return: f64,
    pub pnl: f64,
    pub equity: f64,
}

impl EquityRow {
    pub fn from_result(result: &BacktestResult) -> Vec<Self> {
        (0..result.dates.len())
            .map(|t| EquityRow {
                date: result.dates[t],
                position: result.positions[t].value(),
                z: result.z[t],
                pair_return: result.pair_returns[t],
                pnl: result.pnl[t],
                equity: result.equity[t],
            })
            .collect()
    }
}

/// Everything one CLI run produced. Empty parts are not written.
#[derive(Debug, Clone, Default)]
pub struct Report {
    pub ranked_pairs: Vec<PairCandidate>,
    pub trades: Vec<TradeRecord>,
    pub equity: Vec<EquityRow>,
    pub extremes: ExtremeTrades,
    pub grid: Vec<GridResult>,
}

impl Report {
    pub fn is_empty(&self) -> bool {
        self.ranked_pairs.is_empty()
            && self.trades.is_empty()
            && self.equity.is_empty()
            && self.grid.is_empty()
    }
}

pub trait ReportPort {
    /// Write the report under `output_dir`; returns the files written.
    fn write(
        &self,
        report: &Report,
        output_dir: &Path,
    ) -> Result<Vec<std::path::PathBuf>, PairtraderError>;
}
