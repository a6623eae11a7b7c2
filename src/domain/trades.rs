//! Trade table derived from a joint position series.
//!
//! A trade opens on the first non-flat bar and closes on the next flat bar.
//! A direct flip does not close it; the trade keeps the side it opened
//! with. Trades still open at the last bar are not listed.

use crate::domain::error::PairtraderError;
use crate::domain::position::Position;
use chrono::NaiveDate;
use serde::Serialize;

/// Entry plus exit, two legs each.
pub const LEGS_PER_ROUND_TRIP: f64 = 4.0;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TradeRecord {
    pub start: NaiveDate,
    pub end: NaiveDate,
    /// Bars from entry to the exit bar inclusive.
    pub bars: usize,
    pub direction: Position,
    pub side: String,
    pub entry_z: Option<f64>,
    pub exit_z: Option<f64>,
    pub gross_return: f64,
    pub est_cost: f64,
    pub net_return: f64,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ExtremeTrades {
    pub top_gains: Vec<TradeRecord>,
    pub top_losses: Vec<TradeRecord>,
}

pub fn side_label(direction: Position, leg_a: &str, leg_b: &str) -> String {
    match direction {
        Position::Long => format!("LONG {leg_a} / SHORT {leg_b}"),
        Position::Short => format!("SHORT {leg_a} / LONG {leg_b}"),
        Position::Flat => "FLAT".to_string(),
    }
}

fn finite(v: Option<&f64>) -> Option<f64> {
    v.copied().filter(|x| x.is_finite())
}

pub fn build_trade_table(
    dates: &[NaiveDate],
    positions: &[Position],
    pair_returns: &[f64],
    z: &[f64],
    cost_per_leg: f64,
    labels: (&str, &str),
) -> Result<Vec<TradeRecord>, PairtraderError> {
    let n = dates.len();
    if positions.len() != n || pair_returns.len() != n || z.len() != n {
        return Err(PairtraderError::invalid(
            "trade_table",
            format!(
                "series lengths differ: dates={n} positions={} returns={} z={}",
                positions.len(),
                pair_returns.len(),
                z.len()
            ),
        ));
    }

    let est_cost = LEGS_PER_ROUND_TRIP * cost_per_leg;
    let mut trades = Vec::new();
    let mut open: Option<(usize, Position)> = None;

    for (t, pos) in positions.iter().enumerate() {
        match open {
            None if !pos.is_flat() => open = Some((t, *pos)),
            Some((start, side)) if pos.is_flat() => {
                let gross = pair_returns[start..=t]
                    .iter()
                    .fold(1.0, |acc, r| acc * (1.0 + side.as_f64() * r))
                    - 1.0;
                trades.push(TradeRecord {
                    start: dates[start],
                    end: dates[t],
                    bars: t - start + 1,
                    direction: side,
                    side: side_label(side, labels.0, labels.1),
                    entry_z: finite(z.get(start)),
                    exit_z: finite(z.get(t)),
                    gross_return: gross,
                    est_cost,
                    net_return: gross - est_cost,
                });
                open = None;
            }
            _ => {}
        }
    }

    Ok(trades)
}

/// Fixed-width text table, returns in percent to two decimals.
pub fn format_trade_table(trades: &[TradeRecord], max_rows: usize) -> String {
    if trades.is_empty() {
        return "No trades.\n".to_string();
    }

    let side_width = trades
        .iter()
        .map(|t| t.side.len())
        .max()
        .unwrap_or(4)
        .max(4);

    let mut out = format!(
        "{:<10}  {:<10}  {:>5}  {:<side_width$}  {:>8}  {:>8}  {:>9}  {:>7}  {:>8}\n",
        "start", "end", "bars", "side", "entry_z", "exit_z", "gross_%", "cost_%", "net_%"
    );
    for t in trades.iter().take(max_rows) {
        let z = |v: Option<f64>| v.map_or_else(|| "-".to_string(), |x| format!("{x:.2}"));
        out.push_str(&format!(
            "{:<10}  {:<10}  {:>5}  {:<side_width$}  {:>8}  {:>8}  {:>9.2}  {:>7.2}  {:>8.2}\n",
            t.start,
            t.end,
            t.bars,
            t.side,
            z(t.entry_z),
            z(t.exit_z),
            t.gross_return * 100.0,
            t.est_cost * 100.0,
            t.net_return * 100.0,
        ));
    }
    if trades.len() > max_rows {
        out.push_str(&format!("... ({} more)\n", trades.len() - max_rows));
    }
    out
}

/// Top `k` trades by net return (highest first) and bottom `k` (lowest
/// first). Equal returns keep table order.
pub fn summarize_extreme_trades(trades: &[TradeRecord], k: usize) -> ExtremeTrades {
    let k = k.min(trades.len());

    let mut gains: Vec<&TradeRecord> = trades.iter().collect();
    gains.sort_by(|a, b| b.net_return.total_cmp(&a.net_return));
    let mut losses: Vec<&TradeRecord> = trades.iter().collect();
    losses.sort_by(|a, b| a.net_return.total_cmp(&b.net_return));

    ExtremeTrades {
        top_gains: gains.into_iter().take(k).cloned().collect(),
        top_losses: losses.into_iter().take(k).cloned().collect(),
    }
}
