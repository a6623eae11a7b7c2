//! Parameter sweep over the z-score pair backtest.

use crate::domain::backtest::{ExitRules, ZScorePairBacktest};
use crate::domain::error::PairtraderError;
use crate::domain::price_table::PriceTable;
use rayon::prelude::*;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Objective {
    Sharpe,
    Return,
    /// Daily Sharpe minus a tenth of every drawdown percent beyond the limit.
    SharpePenalized { dd_limit_pct: f64 },
}

impl Default for Objective {
    fn default() -> Self {
        Objective::SharpePenalized { dd_limit_pct: 20.0 }
    }
}

impl fmt::Display for Objective {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Objective::Sharpe => write!(f, "sharpe"),
            Objective::Return => write!(f, "return"),
            Objective::SharpePenalized { .. } => write!(f, "sharpe_penalized"),
        }
    }
}

/// Parses the objective name; `sharpe_penalized` takes the default limit.
impl FromStr for Objective {
    type Err = PairtraderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sharpe" => Ok(Objective::Sharpe),
            "return" => Ok(Objective::Return),
            "sharpe_penalized" => Ok(Objective::default()),
            other => Err(PairtraderError::invalid(
                "objective",
                format!("unknown objective '{other}' (expected sharpe, return or sharpe_penalized)"),
            )),
        }
    }
}

impl Objective {
    pub fn score(&self, sharpe_daily: f64, total_return: f64, max_drawdown: f64) -> f64 {
        match self {
            Objective::Sharpe => sharpe_daily,
            Objective::Return => total_return,
            Objective::SharpePenalized { dd_limit_pct } => {
                let penalty = ((max_drawdown * 100.0 - dd_limit_pct) / 10.0).max(0.0);
                sharpe_daily - penalty
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GridSpec {
    pub entry_z: Vec<f64>,
    pub exit_z: Vec<f64>,
    pub stop_loss: Vec<Option<f64>>,
    pub take_profit: Vec<Option<f64>>,
    pub max_bars_in_trade: Option<usize>,
    pub objective: Objective,
}

impl Default for GridSpec {
    fn default() -> Self {
        Self {
            entry_z: vec![1.5, 2.0, 2.5, 3.0],
            exit_z: vec![0.25, 0.5, 0.75, 1.0],
            stop_loss: vec![None, Some(0.03), Some(0.05), Some(0.07)],
            take_profit: vec![None, Some(0.06), Some(0.10), Some(0.15)],
            max_bars_in_trade: None,
            objective: Objective::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Combo {
    entry_z: f64,
    exit_z: f64,
    stop_loss: Option<f64>,
    take_profit: Option<f64>,
}

impl GridSpec {
    /// Combinations with `exit < entry` and, when both are set, `sl < tp`.
    fn combos(&self) -> Vec<Combo> {
        let mut out = Vec::new();
        for &entry_z in &self.entry_z {
            for &exit_z in &self.exit_z {
                if exit_z >= entry_z {
                    continue;
                }
                for &stop_loss in &self.stop_loss {
                    for &take_profit in &self.take_profit {
                        if matches!((stop_loss, take_profit), (Some(sl), Some(tp)) if sl >= tp) {
                            continue;
                        }
                        out.push(Combo {
                            entry_z,
                            exit_z,
                            stop_loss,
                            take_profit,
                        });
                    }
                }
            }
        }
        out
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GridResult {
    pub entry_z: f64,
    pub exit_z: f64,
    pub stop_loss_pct: Option<f64>,
    pub take_profit_pct: Option<f64>,
    pub z_window: usize,
    pub use_rolling_z: bool,
    pub sharpe: f64,
    pub total_return: f64,
    pub max_drawdown: f64,
    pub position_changes: usize,
    pub score: f64,
}

/// Run `base` once per valid combination. Results are sorted by score,
/// Sharpe and total return, all descending.
pub fn grid_search(
    prices: &PriceTable,
    base: &ZScorePairBacktest,
    spec: &GridSpec,
) -> Result<Vec<GridResult>, PairtraderError> {
    let combos = spec.combos();
    if combos.is_empty() {
        return Err(PairtraderError::NoValidCombinations);
    }

    let mut results = combos
        .par_iter()
        .map(|c| {
            let engine = ZScorePairBacktest {
                entry_z: c.entry_z,
                exit_z: c.exit_z,
                ..base.clone()
            };
            let rules = ExitRules {
                stop_loss_pct: c.stop_loss,
                take_profit_pct: c.take_profit,
                max_bars_in_trade: spec.max_bars_in_trade,
                close_at_end: false,
            };
            let res = engine.execute(prices, &rules)?;
            let st = &res.stats;
            let score = spec
                .objective
                .score(st.sharpe_daily, st.total_return, st.max_drawdown);
            debug!(
                entry_z = c.entry_z,
                exit_z = c.exit_z,
                stop_loss = ?c.stop_loss,
                take_profit = ?c.take_profit,
                score,
                "grid combination evaluated"
            );
            Ok(GridResult {
                entry_z: c.entry_z,
                exit_z: c.exit_z,
                stop_loss_pct: c.stop_loss,
                take_profit_pct: c.take_profit,
                z_window: base.z_window,
                use_rolling_z: base.use_rolling_z,
                sharpe: st.sharpe_daily,
                total_return: st.total_return,
                max_drawdown: st.max_drawdown,
                position_changes: st.position_changes,
                score,
            })
        })
        .collect::<Result<Vec<_>, PairtraderError>>()?;

    results.sort_by(|x, y| {
        y.score
            .total_cmp(&x.score)
            .then_with(|| y.sharpe.total_cmp(&x.sharpe))
            .then_with(|| y.total_return.total_cmp(&x.total_return))
    });

    info!(
        combinations = results.len(),
        objective = %spec.objective,
        best_score = results.first().map(|r| r.score).unwrap_or(f64::NAN),
        "grid search complete"
    );
    Ok(results)
}
