//! Z-score pair backtest.
//!
//! One hedge ratio from the whole window, one joint position for both
//! legs. Positions follow the carried z-event policy: entries on
//! `|z| >= entry_z`, held until the z band, a stop or the time limit forces
//! them flat. Positions trade on the bar they are decided.

use crate::domain::error::PairtraderError;
use crate::domain::hedge;
use crate::domain::metrics::BacktestStats;
use crate::domain::position::{
    Position, apply_forced_exits, carried_z_positions, trade_ids, z_events, z_exit_mask,
};
use crate::domain::price_table::{PriceTable, simple_returns};
use crate::domain::stats::{rolling_zscore, zscore};
use crate::domain::strategy::{compound, position_change_costs};
use crate::domain::trades::{TradeRecord, build_trade_table};
use chrono::NaiveDate;
use serde::Serialize;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq)]
pub struct ZScorePairBacktest {
    pub stock1: String,
    pub stock2: String,
    pub entry_z: f64,
    pub exit_z: f64,
    pub tx_cost_per_leg: f64,
    pub use_rolling_z: bool,
    pub z_window: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ExitRules {
    pub stop_loss_pct: Option<f64>,
    pub take_profit_pct: Option<f64>,
    pub max_bars_in_trade: Option<usize>,
    /// Report an extra equity curve that pays the exit cost of an open
    /// trade on the last bar.
    pub close_at_end: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OpenTrade {
    pub since: NaiveDate,
    pub position: Position,
    pub unrealized_return: f64,
    pub last_price_a: f64,
    pub last_price_b: f64,
    pub z_last: f64,
}

/// Bars where each stop rule fired, before forced exits were applied.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StopFlags {
    pub stop_loss: Vec<bool>,
    pub take_profit: Vec<bool>,
    pub time_stop: Vec<bool>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub costs: Vec<f64>,
    pub pnl: Vec<f64>,
    pub equity: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TradeSegments {
    pub ids: Vec<Option<usize>>,
    /// Compounded net return since entry; NaN while flat.
    pub running_return: Vec<f64>,
    /// Compounded net return of every closed trade, in order.
    pub closed_returns: Vec<f64>,
    /// Entry bar and running return of the trade open at the last bar.
    pub open: Option<(usize, f64)>,
}

#[derive(Debug, Clone)]
pub struct BacktestResult {
    pub dates: Vec<NaiveDate>,
    /// Raw z events before carrying.
    pub signals: Vec<Position>,
    pub positions: Vec<Position>,
    pub pair_returns: Vec<f64>,
    pub pnl: Vec<f64>,
    pub equity: Vec<f64>,
    pub stats: BacktestStats,
    pub hedge_ratio: f64,
    pub z: Vec<f64>,
    pub open_trade_return: Vec<f64>,
    pub current_open_trade: Option<OpenTrade>,
    pub equity_close_now: Option<Vec<f64>>,
    pub stops_triggered: StopFlags,
    pub trade_returns: Vec<f64>,
    pub trades_table: Vec<TradeRecord>,
}

impl ZScorePairBacktest {
    pub fn new(stock1: &str, stock2: &str) -> Self {
        Self {
            stock1: stock1.to_string(),
            stock2: stock2.to_string(),
            entry_z: 2.0,
            exit_z: 0.5,
            tx_cost_per_leg: 0.0005,
            use_rolling_z: false,
            z_window: 60,
        }
    }

    pub fn validate(&self, rules: &ExitRules) -> Result<(), PairtraderError> {
        if !self.entry_z.is_finite() || self.entry_z <= 0.0 {
            return Err(PairtraderError::invalid("entry_z", "must be finite and > 0"));
        }
        if !self.exit_z.is_finite() || self.exit_z < 0.0 {
            return Err(PairtraderError::invalid("exit_z", "must be finite and >= 0"));
        }
        if self.exit_z >= self.entry_z {
            return Err(PairtraderError::invalid(
                "exit_z",
                format!(
                    "exit_z ({}) must be below entry_z ({})",
                    self.exit_z, self.entry_z
                ),
            ));
        }
        if !self.tx_cost_per_leg.is_finite() || self.tx_cost_per_leg < 0.0 {
            return Err(PairtraderError::invalid("tx_cost_per_leg", "must be finite and >= 0"));
        }
        if self.use_rolling_z && self.z_window < 2 {
            return Err(PairtraderError::invalid("z_window", "must be >= 2"));
        }
        if self.stock1 == self.stock2 {
            return Err(PairtraderError::invalid("stock2", "must differ from stock1"));
        }
        for (name, value) in [
            ("stop_loss_pct", rules.stop_loss_pct),
            ("take_profit_pct", rules.take_profit_pct),
        ] {
            if value.is_some_and(|v| !v.is_finite() || v < 0.0) {
                return Err(PairtraderError::invalid(name, "must be finite and >= 0"));
            }
        }
        if rules.max_bars_in_trade == Some(0) {
            return Err(PairtraderError::invalid("max_bars_in_trade", "must be >= 1"));
        }
        Ok(())
    }

    fn z_scores(&self, spread: &[f64]) -> Vec<f64> {
        if self.use_rolling_z {
            rolling_zscore(spread, self.z_window)
        } else {
            zscore(spread)
        }
    }

    pub fn execute(
        &self,
        prices: &PriceTable,
        rules: &ExitRules,
    ) -> Result<BacktestResult, PairtraderError> {
        self.validate(rules)?;
        let table = prices
            .select(&[self.stock1.as_str(), self.stock2.as_str()])?
            .drop_incomplete_rows();
        if table.len() < 2 {
            return Err(PairtraderError::InsufficientData {
                what: format!("aligned prices for {}/{}", self.stock1, self.stock2),
                have: table.len(),
                need: 2,
            });
        }
        let a = table.column(&self.stock1)?;
        let b = table.column(&self.stock2)?;

        let (_, beta) = hedge::ols(a, b);
        if !beta.is_finite() {
            return Err(PairtraderError::InsufficientData {
                what: format!("hedge ratio {}/{}", self.stock1, self.stock2),
                have: table.len(),
                need: 2,
            });
        }

        let spread: Vec<f64> = a.iter().zip(b).map(|(x, y)| x - beta * y).collect();
        let z = self.z_scores(&spread);
        let signals = z_events(&z, self.entry_z);
        let carried = carried_z_positions(&z, self.entry_z, self.exit_z);

        let ra = simple_returns(a);
        let rb = simple_returns(b);
        let pair_returns: Vec<f64> = ra.iter().zip(&rb).map(|(x, y)| x - beta * y).collect();

        let stops = stop_flags(&carried, &pair_returns, rules);
        let force: Vec<bool> = z_exit_mask(&z, self.exit_z)
            .iter()
            .zip(&stops.stop_loss)
            .zip(&stops.take_profit)
            .zip(&stops.time_stop)
            .map(|(((zx, sl), tp), ts)| *zx || *sl || *tp || *ts)
            .collect();
        let positions = apply_forced_exits(&carried, &force);

        let eval = evaluate_positions(&positions, &pair_returns, self.tx_cost_per_leg)?;
        let segments = segment_trades(&positions, &eval.pnl)?;
        let stats = BacktestStats::compute(
            beta,
            &eval.pnl,
            &eval.equity,
            &positions,
            &segments.closed_returns,
        );

        let dates = table.dates().to_vec();
        let last = positions.len() - 1;
        let current_open_trade = segments.open.map(|(entry, unrealized)| OpenTrade {
            since: dates[entry],
            position: positions[last],
            unrealized_return: unrealized,
            last_price_a: a[last],
            last_price_b: b[last],
            z_last: z[last],
        });

        let equity_close_now = (rules.close_at_end && !positions[last].is_flat()).then(|| {
            let mut pnl = eval.pnl.clone();
            pnl[last] -= 2.0 * self.tx_cost_per_leg * positions[last].as_f64().abs();
            compound(&pnl)
        });

        let trades_table = build_trade_table(
            &dates,
            &positions,
            &pair_returns,
            &z,
            self.tx_cost_per_leg,
            (self.stock1.as_str(), self.stock2.as_str()),
        )?;

        debug!(
            stop_loss = stops.stop_loss.iter().filter(|f| **f).count(),
            take_profit = stops.take_profit.iter().filter(|f| **f).count(),
            time_stop = stops.time_stop.iter().filter(|f| **f).count(),
            "stop rules fired"
        );
        info!(
            pair = %format!("{}/{}", self.stock1, self.stock2),
            beta,
            bars = dates.len(),
            trades = stats.n_trades,
            total_return = stats.total_return,
            "backtest complete"
        );

        Ok(BacktestResult {
            dates,
            signals,
            positions,
            pair_returns,
            pnl: eval.pnl,
            equity: eval.equity,
            stats,
            hedge_ratio: beta,
            z,
            open_trade_return: segments.running_return,
            current_open_trade,
            equity_close_now,
            stops_triggered: stops,
            trade_returns: segments.closed_returns,
            trades_table,
        })
    }
}

/// Stop rules on the carried path. Open return compounds the signed pair
/// return since entry, before costs.
fn stop_flags(positions: &[Position], pair_returns: &[f64], rules: &ExitRules) -> StopFlags {
    let n = positions.len();
    let ids = trade_ids(positions);
    let mut flags = StopFlags {
        stop_loss: vec![false; n],
        take_profit: vec![false; n],
        time_stop: vec![false; n],
    };

    let mut current: Option<usize> = None;
    let mut growth = 1.0;
    let mut bars_in = 0usize;
    for t in 0..n {
        let Some(id) = ids[t] else {
            current = None;
            continue;
        };
        if current != Some(id) {
            current = Some(id);
            growth = 1.0;
            bars_in = 0;
        }
        growth *= 1.0 + positions[t].as_f64() * pair_returns[t];
        bars_in += 1;
        let open_ret = growth - 1.0;

        if let Some(sl) = rules.stop_loss_pct {
            flags.stop_loss[t] = open_ret <= -sl;
        }
        if let Some(tp) = rules.take_profit_pct {
            flags.take_profit[t] = open_ret >= tp;
        }
        if let Some(max_bars) = rules.max_bars_in_trade {
            flags.time_stop[t] = bars_in >= max_bars;
        }
    }
    flags
}

/// Net P&L and equity of a joint position path.
///
/// `pnl[t] = pos[t] * pair_ret[t] - |Δpos[t]| * 2 * cost_per_leg`, the
/// first bar measured against flat.
pub fn evaluate_positions(
    positions: &[Position],
    pair_returns: &[f64],
    cost_per_leg: f64,
) -> Result<Evaluation, PairtraderError> {
    if positions.len() != pair_returns.len() {
        return Err(PairtraderError::invalid(
            "pair_returns",
            format!(
                "{} positions but {} returns",
                positions.len(),
                pair_returns.len()
            ),
        ));
    }
    let costs = position_change_costs(positions, cost_per_leg);
    let pnl: Vec<f64> = positions
        .iter()
        .zip(pair_returns)
        .zip(&costs)
        .map(|((p, r), c)| p.as_f64() * r - c)
        .collect();
    let equity = compound(&pnl);
    Ok(Evaluation { costs, pnl, equity })
}

/// Group bars into trades and compound net P&L within each.
///
/// The exit bar is flat, so its cost falls outside the trade. A trade still
/// open at the last bar is reported in `open` and left out of
/// `closed_returns`.
pub fn segment_trades(
    positions: &[Position],
    pnl: &[f64],
) -> Result<TradeSegments, PairtraderError> {
    if positions.len() != pnl.len() {
        return Err(PairtraderError::invalid(
            "pnl",
            format!("{} positions but {} pnl values", positions.len(), pnl.len()),
        ));
    }
    let ids = trade_ids(positions);
    let mut running_return = Vec::with_capacity(pnl.len());
    let mut closed_returns = Vec::new();
    let mut current: Option<(usize, usize, f64)> = None;

    for (t, id) in ids.iter().enumerate() {
        match (*id, current) {
            (Some(id), Some((cur, entry, growth))) if id == cur => {
                let g = growth * (1.0 + pnl[t]);
                current = Some((cur, entry, g));
                running_return.push(g - 1.0);
            }
            (Some(id), prev) => {
                if let Some((_, _, g)) = prev {
                    closed_returns.push(g - 1.0);
                }
                let g = 1.0 + pnl[t];
                current = Some((id, t, g));
                running_return.push(g - 1.0);
            }
            (None, prev) => {
                if let Some((_, _, g)) = prev {
                    closed_returns.push(g - 1.0);
                }
                current = None;
                running_return.push(f64::NAN);
            }
        }
    }

    let open = current.map(|(_, entry, g)| (entry, g - 1.0));
    Ok(TradeSegments {
        ids,
        running_return,
        closed_returns,
        open,
    })
}
