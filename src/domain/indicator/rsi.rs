//! RSI (Relative Strength Index).
//!
//! Gains and losses are smoothed with a recursive EWM of alpha = 1/n,
//! starting from the first price change.
//!
//! Formula: RSI = 100 - (100 / (1 + avg_gain / avg_loss))
//! avg_loss == 0 with gains gives 100; no movement at all is undefined (NaN).

use crate::domain::indicator::ema::ewm_recursive;
use crate::domain::indicator::{IndicatorSeries, IndicatorType};

pub fn calculate_rsi(prices: &[f64], window: usize) -> IndicatorSeries {
    if window == 0 || prices.len() < 2 {
        return IndicatorSeries {
            indicator_type: IndicatorType::Rsi(window),
            values: vec![f64::NAN; prices.len()],
        };
    }

    let mut gains = Vec::with_capacity(prices.len());
    let mut losses = Vec::with_capacity(prices.len());
    gains.push(f64::NAN);
    losses.push(f64::NAN);
    for w in prices.windows(2) {
        let change = w[1] - w[0];
        if change.is_nan() {
            gains.push(f64::NAN);
            losses.push(f64::NAN);
        } else {
            gains.push(change.max(0.0));
            losses.push((-change).max(0.0));
        }
    }

    let alpha = 1.0 / window as f64;
    let avg_gain = ewm_recursive(&gains, alpha);
    let avg_loss = ewm_recursive(&losses, alpha);

    let values = avg_gain
        .iter()
        .zip(&avg_loss)
        .map(|(g, l)| {
            if g.is_nan() || l.is_nan() || (*g == 0.0 && *l == 0.0) {
                f64::NAN
            } else if *l == 0.0 {
                100.0
            } else {
                100.0 - (100.0 / (1.0 + g / l))
            }
        })
        .collect();

    IndicatorSeries {
        indicator_type: IndicatorType::Rsi(window),
        values,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rsi_empty_and_single() {
        assert!(calculate_rsi(&[], 14).values.is_empty());
        let s = calculate_rsi(&[100.0], 14);
        assert_eq!(s.values.len(), 1);
        assert!(s.values[0].is_nan());
    }

    #[test]
    fn rsi_first_bar_undefined() {
        let s = calculate_rsi(&[1.0, 2.0, 3.0], 14);
        assert!(s.values[0].is_nan());
    }

    #[test]
    fn rsi_all_gains_is_100() {
        let prices: Vec<f64> = (0..20).map(|i| 100.0 + i as f64).collect();
        let s = calculate_rsi(&prices, 5);
        for v in &s.values[1..] {
            assert!((v - 100.0).abs() < f64::EPSILON);
        }
    }

    #[test]
    fn rsi_all_losses_is_0() {
        let prices: Vec<f64> = (0..20).map(|i| 100.0 - i as f64).collect();
        let s = calculate_rsi(&prices, 5);
        for v in &s.values[1..] {
            assert!(v.abs() < 1e-12);
        }
    }

    #[test]
    fn rsi_known_values() {
        // Changes: +2, -1. alpha = 1/2.
        // gain: 2, then 0.5*0 + 0.5*2 = 1; loss: 0, then 0.5*1 + 0.5*0 = 0.5
        let s = calculate_rsi(&[10.0, 12.0, 11.0], 2);
        assert!((s.values[1] - 100.0).abs() < f64::EPSILON);
        let expected = 100.0 - 100.0 / (1.0 + 1.0 / 0.5);
        assert!((s.values[2] - expected).abs() < 1e-12);
    }

    #[test]
    fn rsi_flat_prices_undefined() {
        let s = calculate_rsi(&[5.0; 4], 3);
        assert!(s.values.iter().all(|v| v.is_nan()));
    }

    #[test]
    fn rsi_in_range() {
        let prices = [44.0, 44.3, 44.1, 43.6, 44.3, 44.8, 45.1, 45.4, 45.8, 46.1, 45.9];
        let s = calculate_rsi(&prices, 3);
        for v in &s.values[1..] {
            assert!((0.0..=100.0).contains(v));
        }
    }
}
