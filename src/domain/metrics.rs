//! Performance statistics over a daily P&L series.
//!
//! All returns are fractions (0.05 = 5%). The equity curve starts
//! multiplicatively at 1.

use crate::domain::position::Position;
use serde::Serialize;

pub const TRADING_DAYS_PER_YEAR: f64 = 252.0;
/// Added to the volatility so a flat P&L series gives a Sharpe of zero.
pub const SHARPE_EPSILON: f64 = 1e-12;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BacktestStats {
    pub n_days: usize,
    pub beta: f64,
    pub final_equity: f64,
    pub total_return: f64,
    pub annualized_return: f64,
    pub avg_daily_return: f64,
    pub vol_daily_return: f64,
    pub sharpe_daily: f64,
    pub sharpe_annual: f64,
    pub sortino_annual: f64,
    pub max_drawdown: f64,
    pub max_drawdown_duration: usize,
    /// Sum of `|Δposition|`, bar 0 counted against flat.
    pub position_changes: usize,
    pub n_trades: usize,
    pub positive_trades: usize,
    pub positive_trade_rate: f64,
    pub avg_trade_return: f64,
    pub std_trade_return: f64,
    pub open_position: Position,
}

impl BacktestStats {
    pub fn compute(
        beta: f64,
        pnl: &[f64],
        equity: &[f64],
        positions: &[Position],
        closed_trade_returns: &[f64],
    ) -> Self {
        let n_days = pnl.len();
        let final_equity = equity.last().copied().unwrap_or(1.0);
        let total_return = final_equity - 1.0;

        let years = n_days as f64 / TRADING_DAYS_PER_YEAR;
        let annualized_return = if years > 0.0 && final_equity > 0.0 {
            final_equity.powf(1.0 / years) - 1.0
        } else {
            0.0
        };

        let (avg, vol) = mean_and_population_std(pnl);
        let sharpe_daily = avg / (vol + SHARPE_EPSILON);
        let sharpe_annual = sharpe_daily * TRADING_DAYS_PER_YEAR.sqrt();
        let sortino_annual = sortino(pnl, avg);

        let (max_drawdown, max_drawdown_duration) = compute_drawdown(equity);

        let position_changes = position_change_count(positions);

        let n_trades = closed_trade_returns.len();
        let positive_trades = closed_trade_returns.iter().filter(|r| **r > 0.0).count();
        let (positive_trade_rate, avg_trade_return, std_trade_return) = if n_trades > 0 {
            let (m, s) = mean_and_population_std(closed_trade_returns);
            (positive_trades as f64 / n_trades as f64, m, s)
        } else {
            (0.0, 0.0, 0.0)
        };

        BacktestStats {
            n_days,
            beta,
            final_equity,
            total_return,
            annualized_return,
            avg_daily_return: avg,
            vol_daily_return: vol,
            sharpe_daily,
            sharpe_annual,
            sortino_annual,
            max_drawdown,
            max_drawdown_duration,
            position_changes,
            n_trades,
            positive_trades,
            positive_trade_rate,
            avg_trade_return,
            std_trade_return,
            open_position: positions.last().copied().unwrap_or_default(),
        }
    }
}

pub fn position_change_count(positions: &[Position]) -> usize {
    let mut prev = Position::Flat;
    positions
        .iter()
        .map(|p| {
            let d = (p.value() - prev.value()).unsigned_abs() as usize;
            prev = *p;
            d
        })
        .sum()
}

/// Mean and ddof-0 standard deviation; zeros for an empty slice.
fn mean_and_population_std(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / n;
    (mean, variance.sqrt())
}

/// Annualised Sortino against a zero target; zero without downside bars.
fn sortino(pnl: &[f64], mean: f64) -> f64 {
    if pnl.is_empty() {
        return 0.0;
    }
    let downside: f64 = pnl.iter().filter(|r| **r < 0.0).map(|r| r.powi(2)).sum();
    let downside_stddev = (downside / pnl.len() as f64).sqrt();
    if downside_stddev > 0.0 {
        (mean / downside_stddev) * TRADING_DAYS_PER_YEAR.sqrt()
    } else {
        0.0
    }
}

/// Max drawdown as a positive fraction of the running peak, and the longest
/// run of bars spent below a peak.
pub fn compute_drawdown(equity: &[f64]) -> (f64, usize) {
    let Some(&first) = equity.first() else {
        return (0.0, 0);
    };

    let mut peak = first;
    let mut max_dd = 0.0_f64;
    let mut max_dd_duration = 0usize;
    let mut current_dd_duration = 0usize;

    for &value in equity {
        if value >= peak {
            peak = value;
            current_dd_duration = 0;
        } else if peak > 0.0 {
            let dd = (peak - value) / peak;
            if dd > max_dd {
                max_dd = dd;
            }
            current_dd_duration += 1;
            if current_dd_duration > max_dd_duration {
                max_dd_duration = current_dd_duration;
            }
        }
    }

    (max_dd, max_dd_duration)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use Position::{Flat, Long, Short};

    fn compounded(pnl: &[f64]) -> Vec<f64> {
        let mut level = 1.0;
        pnl.iter()
            .map(|r| {
                level *= 1.0 + r;
                level
            })
            .collect()
    }

    #[test]
    fn max_drawdown_from_running_peak() {
        let (dd, _) = compute_drawdown(&[1.0, 1.1, 0.9, 0.95, 0.8, 1.0]);
        assert_relative_eq!(dd, (1.1 - 0.8) / 1.1, epsilon = 1e-12);
    }

    #[test]
    fn max_drawdown_duration_counts_bars_under_peak() {
        let (_, duration) = compute_drawdown(&[1.0, 1.1, 1.0, 0.9, 0.85, 0.95]);
        assert_eq!(duration, 4);
    }

    #[test]
    fn drawdown_of_empty_curve() {
        assert_eq!(compute_drawdown(&[]), (0.0, 0));
    }

    #[test]
    fn flat_pnl_has_zero_sharpe_not_nan() {
        let pnl = vec![0.0; 10];
        let stats = BacktestStats::compute(1.0, &pnl, &compounded(&pnl), &[Flat; 10], &[]);
        assert_eq!(stats.sharpe_daily, 0.0);
        assert_eq!(stats.sharpe_annual, 0.0);
        assert_eq!(stats.sortino_annual, 0.0);
        assert_eq!(stats.n_trades, 0);
        assert_eq!(stats.positive_trade_rate, 0.0);
    }

    #[test]
    fn sharpe_uses_population_std() {
        let pnl = vec![0.01, -0.01, 0.02, 0.0];
        let stats = BacktestStats::compute(1.0, &pnl, &compounded(&pnl), &[Long; 4], &[]);
        let mean = 0.02 / 4.0;
        let var = [0.01, -0.01, 0.02, 0.0]
            .iter()
            .map(|r: &f64| (r - mean).powi(2))
            .sum::<f64>()
            / 4.0;
        assert_relative_eq!(stats.vol_daily_return, var.sqrt(), epsilon = 1e-15);
        assert_relative_eq!(stats.sharpe_daily, mean / var.sqrt(), epsilon = 1e-9);
        assert_relative_eq!(
            stats.sharpe_annual,
            stats.sharpe_daily * 252f64.sqrt(),
            epsilon = 1e-12
        );
        assert!(stats.sortino_annual > stats.sharpe_annual);
    }

    #[test]
    fn trade_statistics_over_closed_trades() {
        let pnl = vec![0.0; 3];
        let stats = BacktestStats::compute(
            1.0,
            &pnl,
            &compounded(&pnl),
            &[Flat, Long, Short],
            &[0.02, -0.01, 0.03, 0.0],
        );
        assert_eq!(stats.n_trades, 4);
        assert_eq!(stats.positive_trades, 2);
        assert_relative_eq!(stats.positive_trade_rate, 0.5);
        assert_relative_eq!(stats.avg_trade_return, 0.01, epsilon = 1e-15);
        assert_eq!(stats.open_position, Short);
        assert_eq!(stats.position_changes, 3);
    }

    #[test]
    fn annualized_return_of_one_flat_year() {
        let pnl = vec![0.0; 252];
        let stats = BacktestStats::compute(1.0, &pnl, &compounded(&pnl), &[Flat; 252], &[]);
        assert_relative_eq!(stats.annualized_return, 0.0);
        assert_relative_eq!(stats.total_return, 0.0);
    }

    #[test]
    fn position_changes_count_flip_twice() {
        assert_eq!(position_change_count(&[Long, Short, Flat]), 4);
        assert_eq!(position_change_count(&[]), 0);
    }
}
