//! Signal-driven strategies run through the four-signal position machine.
//!
//! [`run_strategy`] drives the stages in order: validate, indicators,
//! signals, raw positions, one-bar execution lag, returns. Each strategy
//! only supplies the stages it owns.

use crate::domain::error::PairtraderError;
use crate::domain::hedge;
use crate::domain::indicator::ema::calculate_ema;
use crate::domain::indicator::rsi::calculate_rsi;
use crate::domain::indicator::{IndicatorSeries, calculate_ema_slope};
use crate::domain::position::{Position, Signals, derive_positions, execution_lag};
use crate::domain::price_table::{PriceTable, simple_returns};
use crate::domain::stats::{rolling_mean_std, standardize};
use chrono::NaiveDate;
use tracing::{debug, info};

/// Signals for one traded column (a ticker, or the joint pair).
#[derive(Debug, Clone, PartialEq)]
pub struct SignalColumn {
    pub label: String,
    pub signals: Signals,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PositionColumn {
    pub label: String,
    pub raw: Vec<Position>,
    pub executed: Vec<Position>,
}

pub trait Strategy {
    type Indicators;

    fn name(&self) -> &str;

    /// Price columns the strategy reads.
    fn tickers(&self, prices: &PriceTable) -> Vec<String>;

    fn validate_params(&self) -> Result<(), PairtraderError>;

    fn compute_indicators(&self, prices: &PriceTable) -> Result<Self::Indicators, PairtraderError>;

    fn make_signals(
        &self,
        prices: &PriceTable,
        indicators: &Self::Indicators,
    ) -> Result<Vec<SignalColumn>, PairtraderError>;

    /// Per-bar strategy returns from executed positions.
    fn compute_returns(
        &self,
        prices: &PriceTable,
        indicators: &Self::Indicators,
        positions: &[PositionColumn],
    ) -> Result<Vec<f64>, PairtraderError>;
}

#[derive(Debug, Clone)]
pub struct StrategyRun<I> {
    pub dates: Vec<NaiveDate>,
    pub indicators: I,
    pub signals: Vec<SignalColumn>,
    pub positions: Vec<PositionColumn>,
    pub returns: Vec<f64>,
    pub equity: Vec<f64>,
}

/// Run every stage over the rows where all of the strategy's tickers have
/// a price.
pub fn run_strategy<S: Strategy>(
    strategy: &S,
    prices: &PriceTable,
) -> Result<StrategyRun<S::Indicators>, PairtraderError> {
    strategy.validate_params()?;
    let tickers = strategy.tickers(prices);
    let refs: Vec<&str> = tickers.iter().map(String::as_str).collect();
    let prices = prices.select(&refs)?.drop_incomplete_rows();

    let indicators = strategy.compute_indicators(&prices)?;
    let signals = strategy.make_signals(&prices, &indicators)?;

    let positions: Vec<PositionColumn> = signals
        .iter()
        .map(|col| {
            let raw = derive_positions(&col.signals);
            let executed = execution_lag(&raw);
            PositionColumn {
                label: col.label.clone(),
                raw,
                executed,
            }
        })
        .collect();

    let returns = strategy.compute_returns(&prices, &indicators, &positions)?;
    let equity = compound(&returns);

    info!(
        strategy = strategy.name(),
        bars = prices.len(),
        final_equity = equity.last().copied().unwrap_or(1.0),
        "strategy run complete"
    );

    Ok(StrategyRun {
        dates: prices.dates().to_vec(),
        indicators,
        signals,
        positions,
        returns,
        equity,
    })
}

/// Cumulative product of `1 + r`.
pub fn compound(returns: &[f64]) -> Vec<f64> {
    let mut level = 1.0;
    returns
        .iter()
        .map(|r| {
            level *= 1.0 + r;
            level
        })
        .collect()
}

/// Cost per bar: `|Δpos| * 2 * cost_per_leg`, with bar 0 charged `|pos[0]|`.
pub fn position_change_costs(positions: &[Position], cost_per_leg: f64) -> Vec<f64> {
    let mut prev = 0i8;
    positions
        .iter()
        .map(|p| {
            let v = p.value();
            let change = f64::from((v - prev).abs());
            prev = v;
            change * 2.0 * cost_per_leg
        })
        .collect()
}

fn check_rsi_threshold(name: &str, value: f64) -> Result<(), PairtraderError> {
    if !(0.0..=100.0).contains(&value) {
        return Err(PairtraderError::invalid(
            name,
            format!("RSI threshold must be in [0, 100], got {value}"),
        ));
    }
    Ok(())
}

/// Mean-reversion on each ticker: buy weakness below both EMAs with low
/// RSI, sell strength above both with high RSI. Equal-weighted, no costs.
#[derive(Debug, Clone, PartialEq)]
pub struct EmaRsiStrategy {
    pub ema_short: usize,
    pub ema_long: usize,
    pub rsi_window: usize,
    pub long_entry_rsi: f64,
    pub long_exit_rsi: f64,
    pub short_entry_rsi: f64,
    pub short_exit_rsi: f64,
    pub allow_short: bool,
}

impl Default for EmaRsiStrategy {
    fn default() -> Self {
        Self {
            ema_short: 7,
            ema_long: 30,
            rsi_window: 14,
            long_entry_rsi: 40.0,
            long_exit_rsi: 60.0,
            short_entry_rsi: 60.0,
            short_exit_rsi: 40.0,
            allow_short: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TickerIndicators {
    pub ticker: String,
    pub ema_short: IndicatorSeries,
    pub ema_long: IndicatorSeries,
    pub rsi: IndicatorSeries,
}

impl Strategy for EmaRsiStrategy {
    type Indicators = Vec<TickerIndicators>;

    fn name(&self) -> &str {
        "ema_rsi"
    }

    fn tickers(&self, prices: &PriceTable) -> Vec<String> {
        prices.tickers().to_vec()
    }

    fn validate_params(&self) -> Result<(), PairtraderError> {
        check_rsi_threshold("long_entry_rsi", self.long_entry_rsi)?;
        check_rsi_threshold("long_exit_rsi", self.long_exit_rsi)?;
        check_rsi_threshold("short_entry_rsi", self.short_entry_rsi)?;
        check_rsi_threshold("short_exit_rsi", self.short_exit_rsi)?;
        if self.ema_short == 0 || self.ema_long == 0 || self.rsi_window == 0 {
            return Err(PairtraderError::invalid(
                "ema_short/ema_long/rsi_window",
                "EMA and RSI windows must be positive",
            ));
        }
        Ok(())
    }

    fn compute_indicators(&self, prices: &PriceTable) -> Result<Self::Indicators, PairtraderError> {
        prices
            .tickers()
            .iter()
            .map(|t| {
                let close = prices.column(t)?;
                Ok(TickerIndicators {
                    ticker: t.clone(),
                    ema_short: calculate_ema(close, self.ema_short),
                    ema_long: calculate_ema(close, self.ema_long),
                    rsi: calculate_rsi(close, self.rsi_window),
                })
            })
            .collect()
    }

    fn make_signals(
        &self,
        prices: &PriceTable,
        indicators: &Self::Indicators,
    ) -> Result<Vec<SignalColumn>, PairtraderError> {
        let mut out = Vec::with_capacity(indicators.len());
        for ind in indicators {
            let close = prices.column(&ind.ticker)?;
            let n = close.len();
            let below = |t: usize| close[t] < ind.ema_long.values[t] && close[t] < ind.ema_short.values[t];
            let above = |t: usize| close[t] > ind.ema_long.values[t] && close[t] > ind.ema_short.values[t];
            let rsi = &ind.rsi.values;

            let long_entry = (0..n).map(|t| below(t) && rsi[t] < self.long_entry_rsi).collect();
            let long_exit = (0..n).map(|t| above(t) && rsi[t] > self.long_exit_rsi).collect();
            let (short_entry, short_exit) = if self.allow_short {
                (
                    (0..n).map(|t| above(t) && rsi[t] > self.short_entry_rsi).collect(),
                    (0..n).map(|t| below(t) && rsi[t] < self.short_exit_rsi).collect(),
                )
            } else {
                (vec![false; n], vec![false; n])
            };

            out.push(SignalColumn {
                label: ind.ticker.clone(),
                signals: Signals::new(long_entry, long_exit, short_entry, short_exit)?,
            });
        }
        Ok(out)
    }

    fn compute_returns(
        &self,
        prices: &PriceTable,
        _indicators: &Self::Indicators,
        positions: &[PositionColumn],
    ) -> Result<Vec<f64>, PairtraderError> {
        let n = prices.len();
        if positions.is_empty() {
            return Ok(vec![0.0; n]);
        }
        let mut total = vec![0.0; n];
        for col in positions {
            let rets = prices.simple_returns(&col.label)?;
            for t in 0..n {
                total[t] += col.executed[t].as_f64() * rets[t];
            }
        }
        let k = positions.len() as f64;
        Ok(total.into_iter().map(|v| v / k).collect())
    }
}

/// Pair z-score entries gated by opposing EMA slopes on the two legs,
/// traded as one joint position with costs.
#[derive(Debug, Clone, PartialEq)]
pub struct EmaZScorePair {
    pub stock1: String,
    pub stock2: String,
    pub entry_z: f64,
    pub exit_z: f64,
    pub z_lookback: usize,
    pub tx_cost_per_leg: f64,
    pub ema_span: usize,
    pub slope_window: usize,
    pub symmetric_gate: bool,
}

impl EmaZScorePair {
    pub const MIN_Z_LOOKBACK: usize = 20;

    pub fn new(stock1: &str, stock2: &str) -> Self {
        Self {
            stock1: stock1.to_string(),
            stock2: stock2.to_string(),
            entry_z: 2.0,
            exit_z: 0.5,
            z_lookback: 60,
            tx_cost_per_leg: 0.0005,
            ema_span: 7,
            slope_window: 7,
            symmetric_gate: true,
        }
    }

    fn pair_label(&self) -> String {
        format!("{}/{}", self.stock1, self.stock2)
    }
}

#[derive(Debug, Clone)]
pub struct PairIndicators {
    pub hedge_ratio: f64,
    pub z: Vec<f64>,
    pub pair_returns: Vec<f64>,
    pub slope_a: IndicatorSeries,
    pub slope_b: IndicatorSeries,
}

impl Strategy for EmaZScorePair {
    type Indicators = PairIndicators;

    fn name(&self) -> &str {
        "ema_zscore_pair"
    }

    fn tickers(&self, _prices: &PriceTable) -> Vec<String> {
        vec![self.stock1.clone(), self.stock2.clone()]
    }

    fn validate_params(&self) -> Result<(), PairtraderError> {
        if !(self.entry_z > 0.0) || !(self.exit_z >= 0.0) || self.entry_z <= self.exit_z {
            return Err(PairtraderError::invalid(
                "entry_z/exit_z",
                format!(
                    "require entry_z > exit_z >= 0, got entry_z={} exit_z={}",
                    self.entry_z, self.exit_z
                ),
            ));
        }
        if self.z_lookback < Self::MIN_Z_LOOKBACK {
            return Err(PairtraderError::invalid(
                "z_lookback",
                format!("must be at least {}, got {}", Self::MIN_Z_LOOKBACK, self.z_lookback),
            ));
        }
        if self.slope_window < 2 {
            return Err(PairtraderError::invalid("slope_window", "must be >= 2"));
        }
        if self.ema_span == 0 {
            return Err(PairtraderError::invalid("ema_span", "must be positive"));
        }
        if !(self.tx_cost_per_leg >= 0.0) {
            return Err(PairtraderError::invalid("tx_cost_per_leg", "must be >= 0"));
        }
        if self.stock1 == self.stock2 {
            return Err(PairtraderError::invalid("stock2", "must differ from stock1"));
        }
        Ok(())
    }

    fn compute_indicators(&self, prices: &PriceTable) -> Result<Self::Indicators, PairtraderError> {
        let a = prices.column(&self.stock1)?;
        let b = prices.column(&self.stock2)?;
        let (_, beta) = hedge::ols(a, b);
        if !beta.is_finite() {
            return Err(PairtraderError::InsufficientData {
                what: format!("hedge ratio {}", self.pair_label()),
                have: prices.len(),
                need: 2,
            });
        }

        let spread: Vec<f64> = a.iter().zip(b).map(|(x, y)| x - beta * y).collect();
        let (mu, sd) = rolling_mean_std(&spread, self.z_lookback, self.z_lookback);
        let z = standardize(&spread, &mu, &sd);

        let ra = simple_returns(a);
        let rb = simple_returns(b);
        let pair_returns = ra.iter().zip(&rb).map(|(x, y)| x - beta * y).collect();

        debug!(pair = %self.pair_label(), beta, "pair indicators computed");

        Ok(PairIndicators {
            hedge_ratio: beta,
            z,
            pair_returns,
            slope_a: calculate_ema_slope(a, self.ema_span, self.slope_window),
            slope_b: calculate_ema_slope(b, self.ema_span, self.slope_window),
        })
    }

    fn make_signals(
        &self,
        _prices: &PriceTable,
        ind: &Self::Indicators,
    ) -> Result<Vec<SignalColumn>, PairtraderError> {
        let n = ind.z.len();
        let sa = &ind.slope_a.values;
        let sb = &ind.slope_b.values;

        let mut long_entry = Vec::with_capacity(n);
        let mut short_entry = Vec::with_capacity(n);
        let mut exit = Vec::with_capacity(n);
        for t in 0..n {
            let z = ind.z[t];
            let allow_long = sa[t] > 0.0 && sb[t] < 0.0;
            let allow_short = !self.symmetric_gate || (sa[t] < 0.0 && sb[t] > 0.0);
            long_entry.push(z <= -self.entry_z && allow_long);
            short_entry.push(z >= self.entry_z && allow_short);
            exit.push(z.abs() <= self.exit_z);
        }

        Ok(vec![SignalColumn {
            label: self.pair_label(),
            signals: Signals::new(long_entry, exit.clone(), short_entry, exit)?,
        }])
    }

    fn compute_returns(
        &self,
        _prices: &PriceTable,
        ind: &Self::Indicators,
        positions: &[PositionColumn],
    ) -> Result<Vec<f64>, PairtraderError> {
        let col = positions
            .first()
            .ok_or_else(|| PairtraderError::invalid("positions", "pair position column missing"))?;
        let costs = position_change_costs(&col.executed, self.tx_cost_per_leg);
        Ok(col
            .executed
            .iter()
            .zip(&ind.pair_returns)
            .zip(&costs)
            .map(|((p, r), c)| p.as_f64() * r - c)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn table(columns: Vec<(&str, Vec<f64>)>) -> PriceTable {
        let n = columns[0].1.len();
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let dates = (0..n).map(|i| start + Duration::days(i as i64)).collect();
        let (tickers, cols): (Vec<String>, Vec<Vec<f64>>) = columns
            .into_iter()
            .map(|(t, c)| (t.to_string(), c))
            .unzip();
        PriceTable::new(dates, tickers, cols).unwrap()
    }

    #[test]
    fn ema_rsi_rejects_out_of_range_thresholds() {
        let s = EmaRsiStrategy {
            long_entry_rsi: 120.0,
            ..EmaRsiStrategy::default()
        };
        let prices = table(vec![("A", vec![1.0, 2.0, 3.0])]);
        assert!(matches!(
            run_strategy(&s, &prices),
            Err(PairtraderError::InvalidParameter { .. })
        ));
    }

    #[test]
    fn ema_rsi_rejects_zero_window() {
        let s = EmaRsiStrategy {
            rsi_window: 0,
            ..EmaRsiStrategy::default()
        };
        assert!(s.validate_params().is_err());
    }

    #[test]
    fn ema_rsi_buys_the_dip_and_trades_next_bar() {
        // Steady rise, a sharp drop, then recovery well above the EMAs.
        let mut p: Vec<f64> = (0..30).map(|i| 100.0 + i as f64).collect();
        p.extend([110.0, 100.0, 95.0]);
        p.extend((0..15).map(|i| 100.0 + 5.0 * i as f64));
        let prices = table(vec![("A", p)]);
        let s = EmaRsiStrategy {
            ema_short: 3,
            ema_long: 10,
            rsi_window: 3,
            ..EmaRsiStrategy::default()
        };
        let run = run_strategy(&s, &prices).unwrap();
        let col = &run.positions[0];
        let first_long = col.raw.iter().position(|p| *p == Position::Long).unwrap();
        assert!((30..33).contains(&first_long));
        assert_eq!(col.executed[first_long], Position::Flat);
        assert_eq!(col.executed[first_long + 1], Position::Long);
        assert!(col.raw.iter().all(|p| *p != Position::Short));
        assert_eq!(run.returns.len(), run.equity.len());
    }

    #[test]
    fn ema_rsi_averages_ticker_returns() {
        let prices = table(vec![("A", vec![1.0, 2.0]), ("B", vec![1.0, 1.0])]);
        let s = EmaRsiStrategy::default();
        let positions = vec![
            PositionColumn {
                label: "A".into(),
                raw: vec![Position::Long, Position::Long],
                executed: vec![Position::Flat, Position::Long],
            },
            PositionColumn {
                label: "B".into(),
                raw: vec![Position::Flat; 2],
                executed: vec![Position::Flat; 2],
            },
        ];
        let r = s.compute_returns(&prices, &Vec::new(), &positions).unwrap();
        assert_eq!(r, vec![0.0, 0.5]);
    }

    #[test]
    fn pair_rejects_entry_equal_exit() {
        let mut s = EmaZScorePair::new("A", "B");
        s.entry_z = 1.0;
        s.exit_z = 1.0;
        assert!(s.validate_params().is_err());
    }

    #[test]
    fn pair_rejects_short_lookback() {
        let mut s = EmaZScorePair::new("A", "B");
        s.z_lookback = 19;
        assert!(s.validate_params().is_err());
        s.z_lookback = 20;
        assert!(s.validate_params().is_ok());
    }

    #[test]
    fn pair_missing_ticker_is_error() {
        let prices = table(vec![("A", vec![1.0; 30]), ("B", vec![2.0; 30])]);
        let s = EmaZScorePair::new("A", "C");
        assert!(matches!(
            run_strategy(&s, &prices),
            Err(PairtraderError::MissingTicker { .. })
        ));
    }

    #[test]
    fn pair_run_produces_single_joint_column() {
        let a: Vec<f64> = (0..120)
            .map(|i| 100.0 + i as f64 * 0.2 + (i as f64 * 0.9).sin() * 3.0)
            .collect();
        let b: Vec<f64> = (0..120).map(|i| 50.0 + i as f64 * 0.1).collect();
        let prices = table(vec![("A", a), ("B", b)]);
        let s = EmaZScorePair::new("A", "B");
        let run = run_strategy(&s, &prices).unwrap();
        assert_eq!(run.positions.len(), 1);
        assert_eq!(run.positions[0].label, "A/B");
        assert_eq!(run.returns.len(), 120);
        // No z before a full lookback window, so no position either.
        assert!(run.indicators.z[..59].iter().all(|v| v.is_nan()));
        assert!(run.positions[0].raw[..59].iter().all(|p| p.is_flat()));
        assert_eq!(run.positions[0].executed[0], Position::Flat);
    }

    #[test]
    fn costs_charge_first_bar_and_flips_double() {
        use Position::{Flat, Long, Short};
        let c = position_change_costs(&[Long, Long, Short, Flat], 0.001);
        assert_eq!(c, vec![0.002, 0.0, 0.004, 0.002]);
    }

    #[test]
    fn compound_starts_at_one() {
        let e = compound(&[0.1, -0.5]);
        assert!((e[0] - 1.1).abs() < 1e-12);
        assert!((e[1] - 0.55).abs() < 1e-12);
    }
}
