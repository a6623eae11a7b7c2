//! Technical indicators over close-price slices.
//!
//! - `IndicatorType`: indicator identity + parameters, used in logs and as a
//!   map key
//! - `IndicatorSeries`: one value per input bar, NaN where undefined

pub mod ema;
pub mod rsi;

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndicatorType {
    Ema(usize),
    Rsi(usize),
    EmaSlope { span: usize, window: usize },
}

#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorSeries {
    pub indicator_type: IndicatorType,
    pub values: Vec<f64>,
}

impl IndicatorSeries {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl fmt::Display for IndicatorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndicatorType::Ema(span) => write!(f, "EMA({})", span),
            IndicatorType::Rsi(window) => write!(f, "RSI({})", window),
            IndicatorType::EmaSlope { span, window } => {
                write!(f, "EMA_SLOPE({},{})", span, window)
            }
        }
    }
}

/// `values[t] - values[t - lag]`; NaN for the first `lag` bars.
pub fn diff(values: &[f64], lag: usize) -> Vec<f64> {
    (0..values.len())
        .map(|t| {
            if t >= lag {
                values[t] - values[t - lag]
            } else {
                f64::NAN
            }
        })
        .collect()
}

/// EMA slope: `ema.diff(window - 1)`.
pub fn calculate_ema_slope(prices: &[f64], span: usize, window: usize) -> IndicatorSeries {
    let ema = ema::calculate_ema(prices, span);
    IndicatorSeries {
        indicator_type: IndicatorType::EmaSlope { span, window },
        values: diff(&ema.values, window.saturating_sub(1)),
    }
}
