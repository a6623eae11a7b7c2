//! Hedge-ratio estimation and spread construction.
//!
//! OLS of y on [1, x]. A fit on fewer than [`MIN_FIT_OBS`] aligned rows
//! returns NaN coefficients rather than failing.

pub const MIN_FIT_OBS: usize = 30;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HedgeFit {
    pub alpha: f64,
    pub beta: f64,
    pub n_obs: usize,
}

impl HedgeFit {
    pub fn is_valid(&self) -> bool {
        self.alpha.is_finite() && self.beta.is_finite()
    }
}

/// Intercept and slope over rows where both values are present, with no
/// minimum sample. Zero variance in `x` yields `(NaN, NaN)`.
pub fn ols(y: &[f64], x: &[f64]) -> (f64, f64) {
    let (ys, xs) = paired(y, x);
    ols_complete(&ys, &xs)
}

/// `ols` for inputs already known to be NaN-free and equal length.
pub(crate) fn ols_complete(y: &[f64], x: &[f64]) -> (f64, f64) {
    let n = y.len().min(x.len());
    if n < 2 {
        return (f64::NAN, f64::NAN);
    }
    let nf = n as f64;
    let mean_x = x[..n].iter().sum::<f64>() / nf;
    let mean_y = y[..n].iter().sum::<f64>() / nf;

    let mut sxx = 0.0;
    let mut sxy = 0.0;
    for i in 0..n {
        let dx = x[i] - mean_x;
        sxx += dx * dx;
        sxy += dx * (y[i] - mean_y);
    }
    if sxx <= 0.0 || !sxx.is_finite() {
        return (f64::NAN, f64::NAN);
    }
    let beta = sxy / sxx;
    (mean_y - beta * mean_x, beta)
}

pub fn fit(y: &[f64], x: &[f64]) -> HedgeFit {
    let (ys, xs) = paired(y, x);
    let n_obs = ys.len();
    if n_obs < MIN_FIT_OBS {
        return HedgeFit {
            alpha: f64::NAN,
            beta: f64::NAN,
            n_obs,
        };
    }
    let (alpha, beta) = ols_complete(&ys, &xs);
    HedgeFit { alpha, beta, n_obs }
}

/// `y - (alpha + beta * x)` over the aligned rows only.
pub fn spread(y: &[f64], x: &[f64], alpha: f64, beta: f64) -> Vec<f64> {
    y.iter()
        .zip(x)
        .filter(|(a, b)| !a.is_nan() && !b.is_nan())
        .map(|(a, b)| a - (alpha + beta * b))
        .collect()
}

fn paired(y: &[f64], x: &[f64]) -> (Vec<f64>, Vec<f64>) {
    y.iter()
        .zip(x)
        .filter(|(a, b)| !a.is_nan() && !b.is_nan())
        .map(|(a, b)| (*a, *b))
        .unzip()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn line(n: usize, alpha: f64, beta: f64) -> (Vec<f64>, Vec<f64>) {
        let x: Vec<f64> = (0..n).map(|i| 10.0 + i as f64 * 0.5).collect();
        let y = x.iter().map(|v| alpha + beta * v).collect();
        (y, x)
    }

    #[test]
    fn fit_recovers_exact_line() {
        let (y, x) = line(40, 1.5, 2.0);
        let f = fit(&y, &x);
        assert_eq!(f.n_obs, 40);
        assert_relative_eq!(f.alpha, 1.5, epsilon = 1e-9);
        assert_relative_eq!(f.beta, 2.0, epsilon = 1e-12);
        assert!(f.is_valid());
    }

    #[test]
    fn fit_below_minimum_is_nan() {
        let (y, x) = line(29, 0.0, 1.0);
        let f = fit(&y, &x);
        assert!(f.alpha.is_nan());
        assert!(f.beta.is_nan());
        assert!(!f.is_valid());
    }

    #[test]
    fn fit_counts_only_aligned_rows() {
        let (mut y, x) = line(31, 0.0, 3.0);
        y[5] = f64::NAN;
        y[6] = f64::NAN;
        let f = fit(&y, &x);
        assert_eq!(f.n_obs, 29);
        assert!(f.beta.is_nan());
    }

    #[test]
    fn constant_regressor_is_degenerate() {
        let x = vec![4.0; 50];
        let y: Vec<f64> = (0..50).map(|i| i as f64).collect();
        let f = fit(&y, &x);
        assert!(f.beta.is_nan());
    }

    #[test]
    fn ols_has_no_minimum_sample() {
        let (a, b) = ols(&[1.0, 3.0, 5.0], &[0.0, 1.0, 2.0]);
        assert_relative_eq!(a, 1.0, epsilon = 1e-12);
        assert_relative_eq!(b, 2.0, epsilon = 1e-12);
    }

    #[test]
    fn spread_skips_missing_rows() {
        let y = [3.0, f64::NAN, 7.0];
        let x = [1.0, 2.0, 3.0];
        let s = spread(&y, &x, 1.0, 2.0);
        assert_eq!(s, vec![0.0, 0.0]);
    }
}
