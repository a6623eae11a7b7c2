//! Mean-reversion statistics and z-scores.
//!
//! Short samples return NaN; a non-reverting spread has an infinite
//! half-life. Neither is an error.

use crate::domain::hedge::ols_complete;

pub const MIN_HALF_LIFE_OBS: usize = 60;
/// Extra aligned rows `rolling_beta_cv` requires beyond one window.
pub const BETA_CV_MARGIN: usize = 10;

/// Bars for the spread to close half its deviation, from
/// `Δs[t] = c + θ·s[t-1]`.
pub fn half_life(spread: &[f64]) -> f64 {
    let s: Vec<f64> = spread.iter().copied().filter(|v| !v.is_nan()).collect();
    if s.len() < MIN_HALF_LIFE_OBS {
        return f64::NAN;
    }
    let lag = &s[..s.len() - 1];
    let delta: Vec<f64> = s.windows(2).map(|w| w[1] - w[0]).collect();
    let (_, theta) = ols_complete(&delta, lag);
    if theta.is_nan() {
        f64::NAN
    } else if theta < 0.0 {
        -std::f64::consts::LN_2 / theta
    } else {
        f64::INFINITY
    }
}

/// Coefficient of variation of trailing-window OLS slopes of y on x.
///
/// Windows are `[i - window, i)` for every `i` in `window..n` over the
/// aligned rows, so the final row never enters a window.
pub fn rolling_beta_cv(y: &[f64], x: &[f64], window: usize) -> f64 {
    let (ys, xs): (Vec<f64>, Vec<f64>) = y
        .iter()
        .zip(x)
        .filter(|(a, b)| !a.is_nan() && !b.is_nan())
        .map(|(a, b)| (*a, *b))
        .unzip();
    let n = ys.len();
    if window == 0 || n < window + BETA_CV_MARGIN {
        return f64::NAN;
    }

    // One fresh regression per window position.
    let betas: Vec<f64> = (window..n)
        .map(|i| ols_complete(&ys[i - window..i], &xs[i - window..i]).1)
        .collect();

    let m = mean(&betas);
    if m == 0.0 {
        return f64::NAN;
    }
    std_dev(&betas, 1) / m.abs()
}

/// Arithmetic mean; NaN if empty or any value is NaN.
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Standard deviation with `ddof` delta degrees of freedom.
pub fn std_dev(values: &[f64], ddof: usize) -> f64 {
    let n = values.len();
    if n <= ddof {
        return f64::NAN;
    }
    let m = mean(values);
    let ss: f64 = values.iter().map(|v| (v - m).powi(2)).sum();
    (ss / (n - ddof) as f64).sqrt()
}

/// Full-sample z-score with sample std (ddof 1). NaN inputs stay NaN and
/// are excluded from the moments.
pub fn zscore(series: &[f64]) -> Vec<f64> {
    let present: Vec<f64> = series.iter().copied().filter(|v| !v.is_nan()).collect();
    let m = mean(&present);
    let sd = std_dev(&present, 1);
    series
        .iter()
        .map(|v| {
            if sd > 0.0 {
                (v - m) / sd
            } else {
                f64::NAN
            }
        })
        .collect()
}

/// Trailing mean and population std over `window` rows, skipping NaN.
/// Positions with fewer than `min_periods` present values are NaN.
pub fn rolling_mean_std(series: &[f64], window: usize, min_periods: usize) -> (Vec<f64>, Vec<f64>) {
    let mut means = Vec::with_capacity(series.len());
    let mut stds = Vec::with_capacity(series.len());
    let min_periods = min_periods.max(1);

    for i in 0..series.len() {
        let start = (i + 1).saturating_sub(window);
        let present: Vec<f64> = series[start..=i]
            .iter()
            .copied()
            .filter(|v| !v.is_nan())
            .collect();
        if window == 0 || present.len() < min_periods {
            means.push(f64::NAN);
            stds.push(f64::NAN);
        } else {
            means.push(mean(&present));
            stds.push(std_dev(&present, 0));
        }
    }
    (means, stds)
}

/// Rolling z-score with `min_periods = window / 2`; zero deviation is NaN.
pub fn rolling_zscore(series: &[f64], window: usize) -> Vec<f64> {
    let (means, stds) = rolling_mean_std(series, window, window / 2);
    standardize(series, &means, &stds)
}

pub(crate) fn standardize(series: &[f64], means: &[f64], stds: &[f64]) -> Vec<f64> {
    series
        .iter()
        .zip(means.iter().zip(stds))
        .map(|(v, (m, sd))| if *sd > 0.0 { (v - m) / sd } else { f64::NAN })
        .collect()
}
