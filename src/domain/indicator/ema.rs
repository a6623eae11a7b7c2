//! Exponential moving average, recursive form.
//!
//! alpha = 2/(span+1), EMA[0] = C[0], EMA[i] = C[i]*alpha + EMA[i-1]*(1-alpha).
//! Leading NaN bars stay NaN; a NaN after the first value carries the
//! previous EMA forward. Gaps still age the old state: after `g` missing
//! bars the next value weighs the previous EMA by `(1-alpha)^(g+1)` and
//! renormalises, as pandas `ewm(adjust=False)` does.

use crate::domain::indicator::{IndicatorSeries, IndicatorType};

pub fn calculate_ema(prices: &[f64], span: usize) -> IndicatorSeries {
    if span == 0 {
        return IndicatorSeries {
            indicator_type: IndicatorType::Ema(span),
            values: vec![f64::NAN; prices.len()],
        };
    }
    let alpha = 2.0 / (span as f64 + 1.0);
    IndicatorSeries {
        indicator_type: IndicatorType::Ema(span),
        values: ewm_recursive(prices, alpha),
    }
}

/// Recursive exponential smoothing with weight `alpha` on the new value.
pub fn ewm_recursive(values: &[f64], alpha: f64) -> Vec<f64> {
    let mut out = Vec::with_capacity(values.len());
    let mut state: Option<f64> = None;
    let mut gap = 0i32;
    for &v in values {
        if v.is_nan() {
            if state.is_some() {
                gap += 1;
            }
        } else {
            state = Some(match state {
                None => v,
                Some(prev) if gap == 0 => v * alpha + prev * (1.0 - alpha),
                Some(prev) => {
                    let old_wt = (1.0 - alpha).powi(gap + 1);
                    (old_wt * prev + alpha * v) / (old_wt + alpha)
                }
            });
            gap = 0;
        }
        out.push(state.unwrap_or(f64::NAN));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ema_seed_is_first_value() {
        let series = calculate_ema(&[10.0, 20.0, 30.0], 3);
        assert!((series.values[0] - 10.0).abs() < f64::EPSILON);
    }

    #[test]
    fn ema_recursive_calculation() {
        let series = calculate_ema(&[10.0, 20.0, 30.0, 40.0], 3);
        let k = 0.5;
        let e1 = 20.0 * k + 10.0 * (1.0 - k);
        let e2 = 30.0 * k + e1 * (1.0 - k);
        let e3 = 40.0 * k + e2 * (1.0 - k);
        assert!((series.values[1] - e1).abs() < f64::EPSILON);
        assert!((series.values[2] - e2).abs() < f64::EPSILON);
        assert!((series.values[3] - e3).abs() < f64::EPSILON);
    }

    #[test]
    fn ema_span_1_tracks_prices() {
        let series = calculate_ema(&[10.0, 20.0, 30.0], 1);
        assert_eq!(series.values, vec![10.0, 20.0, 30.0]);
    }

    #[test]
    fn ema_equal_prices() {
        let series = calculate_ema(&[100.0; 5], 3);
        for v in series.values {
            assert!((v - 100.0).abs() < f64::EPSILON);
        }
    }

    #[test]
    fn ema_nan_handling() {
        let series = calculate_ema(&[f64::NAN, 10.0, f64::NAN, 20.0], 3);
        assert!(series.values[0].is_nan());
        assert_eq!(series.values[1], 10.0);
        assert_eq!(series.values[2], 10.0);
        // One missing bar: old weight 0.25 against 0.5 on the new value.
        assert!((series.values[3] - 50.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn ema_gap_decays_like_skipped_bars() {
        let alpha = 0.2;
        let gapped = ewm_recursive(&[10.0, f64::NAN, f64::NAN, 20.0, 30.0], alpha);
        assert_eq!(gapped[1], 10.0);
        assert_eq!(gapped[2], 10.0);
        let old_wt = 0.8f64.powi(3);
        let after_gap = (old_wt * 10.0 + alpha * 20.0) / (old_wt + alpha);
        assert!((gapped[3] - after_gap).abs() < 1e-12);
        let next = 30.0 * alpha + after_gap * (1.0 - alpha);
        assert!((gapped[4] - next).abs() < 1e-12);
    }

    #[test]
    fn ema_span_0_is_undefined() {
        let series = calculate_ema(&[10.0, 20.0], 0);
        assert!(series.values.iter().all(|v| v.is_nan()));
        assert_eq!(series.indicator_type, IndicatorType::Ema(0));
    }
}
