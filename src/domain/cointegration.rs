//! Engle-Granger two-step cointegration test.
//!
//! Step one regresses y on [x, 1]. Step two runs an augmented Dickey-Fuller
//! regression without deterministic terms on the residuals, choosing the
//! number of lagged differences by AIC. The p-value comes from MacKinnon's
//! response-surface approximation for the constant case.

use crate::domain::hedge::ols_complete;
use nalgebra::{DMatrix, DVector};
use statrs::function::erf::erfc;

/// Below this many aligned rows the test is not attempted.
pub const MIN_COINT_OBS: usize = 12;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CointegrationTest {
    pub statistic: f64,
    pub p_value: f64,
    pub used_lag: usize,
    pub n_obs: usize,
}

impl CointegrationTest {
    fn undefined(n_obs: usize) -> Self {
        Self {
            statistic: f64::NAN,
            p_value: f64::NAN,
            used_lag: 0,
            n_obs,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AdfResult {
    pub statistic: f64,
    pub used_lag: usize,
    /// Rows in the final regression.
    pub n_obs: usize,
}

pub fn engle_granger(y: &[f64], x: &[f64]) -> CointegrationTest {
    let (ys, xs): (Vec<f64>, Vec<f64>) = y
        .iter()
        .zip(x)
        .filter(|(a, b)| !a.is_nan() && !b.is_nan())
        .map(|(a, b)| (*a, *b))
        .unzip();
    let n = ys.len();
    if n < MIN_COINT_OBS {
        return CointegrationTest::undefined(n);
    }

    let (alpha, beta) = ols_complete(&ys, &xs);
    if alpha.is_nan() || beta.is_nan() {
        return CointegrationTest::undefined(n);
    }
    let resid: Vec<f64> = ys
        .iter()
        .zip(&xs)
        .map(|(a, b)| a - alpha - beta * b)
        .collect();

    let y_mean = ys.iter().sum::<f64>() / n as f64;
    let sst: f64 = ys.iter().map(|v| (v - y_mean).powi(2)).sum();
    let ssr: f64 = resid.iter().map(|r| r * r).sum();
    if sst <= 0.0 {
        return CointegrationTest::undefined(n);
    }

    // Perfectly collinear legs: the residual is numerically zero.
    let r_squared = 1.0 - ssr / sst;
    if r_squared >= 1.0 - 100.0 * f64::EPSILON.sqrt() {
        return CointegrationTest {
            statistic: f64::NEG_INFINITY,
            p_value: 0.0,
            used_lag: 0,
            n_obs: n,
        };
    }

    match adf(&resid) {
        Some(res) => CointegrationTest {
            statistic: res.statistic,
            p_value: mackinnon_pvalue(res.statistic, 2),
            used_lag: res.used_lag,
            n_obs: n,
        },
        None => CointegrationTest::undefined(n),
    }
}

/// Default maximum lag: `ceil(12 * (n/100)^0.25)`, capped at `n/2 - 1`.
pub fn default_max_lag(n: usize) -> Option<usize> {
    let schwert = (12.0 * (n as f64 / 100.0).powf(0.25)).ceil() as usize;
    let cap = (n / 2).checked_sub(1)?;
    Some(schwert.min(cap))
}

/// ADF regression `Δx[t] = γ·x[t] + Σ δj·Δx[t-j]` with no constant or trend.
///
/// Every candidate lag count is scored by AIC on the same sample (the one
/// the maximum lag allows); the winner is refitted on its full sample and
/// the t-statistic of γ returned. Ties go to fewer lags.
pub fn adf(series: &[f64]) -> Option<AdfResult> {
    let n = series.len();
    if n < 4 {
        return None;
    }
    let max_lag = default_max_lag(n)?;
    let diff: Vec<f64> = series.windows(2).map(|w| w[1] - w[0]).collect();

    let mut best: Option<(f64, usize)> = None;
    for lags in 0..=max_lag {
        let Some(fit) = adf_regression(series, &diff, lags, max_lag) else {
            continue;
        };
        let aic = fit.aic();
        if aic.is_nan() {
            continue;
        }
        if best.is_none_or(|(b, _)| aic < b) {
            best = Some((aic, lags));
        }
    }
    let (_, used_lag) = best?;

    let fit = adf_regression(series, &diff, used_lag, used_lag)?;
    Some(AdfResult {
        statistic: fit.t_value(0),
        used_lag,
        n_obs: fit.nobs,
    })
}

/// Rows `t` in `start..=n-2`: target `diff[t]`, regressors `x[t]` then
/// `diff[t-1] .. diff[t-lags]`.
fn adf_regression(series: &[f64], diff: &[f64], lags: usize, start: usize) -> Option<LeastSquares> {
    if start >= diff.len() {
        return None;
    }
    let rows = diff.len() - start;
    let cols = lags + 1;
    let x = DMatrix::from_fn(rows, cols, |r, c| {
        let t = start + r;
        if c == 0 { series[t] } else { diff[t - c] }
    });
    let y = DVector::from_fn(rows, |r, _| diff[start + r]);
    least_squares(&x, &y)
}

struct LeastSquares {
    coef: DVector<f64>,
    xtx_inv: DMatrix<f64>,
    ssr: f64,
    nobs: usize,
    k: usize,
}

impl LeastSquares {
    fn log_likelihood(&self) -> f64 {
        let n = self.nobs as f64;
        -n / 2.0 * ((2.0 * std::f64::consts::PI).ln() + (self.ssr / n).ln() + 1.0)
    }

    fn aic(&self) -> f64 {
        -2.0 * self.log_likelihood() + 2.0 * self.k as f64
    }

    fn t_value(&self, i: usize) -> f64 {
        let sigma2 = self.ssr / (self.nobs - self.k) as f64;
        let se = (sigma2 * self.xtx_inv[(i, i)]).sqrt();
        self.coef[i] / se
    }
}

fn least_squares(x: &DMatrix<f64>, y: &DVector<f64>) -> Option<LeastSquares> {
    let (nobs, k) = x.shape();
    if nobs <= k {
        return None;
    }
    let xt = x.transpose();
    let xtx_inv = (&xt * x).try_inverse()?;
    let coef = &xtx_inv * (&xt * y);
    let resid = y - x * &coef;
    Some(LeastSquares {
        ssr: resid.norm_squared(),
        coef,
        xtx_inv,
        nobs,
        k,
    })
}

struct ResponseSurface {
    max_stat: f64,
    min_stat: f64,
    star_stat: f64,
    small_p: &'static [f64],
    large_p: &'static [f64],
}

/// Constant-only case, indexed by number of series minus one.
const CONSTANT_CASE: [ResponseSurface; 2] = [
    ResponseSurface {
        max_stat: 2.74,
        min_stat: -18.83,
        star_stat: -1.61,
        small_p: &[2.1659, 1.4412, 0.038269],
        large_p: &[1.7339, 0.93202, -0.12745, -0.010368],
    },
    ResponseSurface {
        max_stat: 0.92,
        min_stat: -18.86,
        star_stat: -2.62,
        small_p: &[2.92, 1.5012, 0.039796],
        large_p: &[2.1945, 0.64695, -0.29198, -0.042377],
    },
];

/// MacKinnon approximate p-value for a tau statistic with a constant term,
/// for one or two series. NaN for anything else.
pub fn mackinnon_pvalue(stat: f64, n_series: usize) -> f64 {
    if stat.is_nan() || n_series == 0 || n_series > CONSTANT_CASE.len() {
        return f64::NAN;
    }
    let surface = &CONSTANT_CASE[n_series - 1];
    if stat > surface.max_stat {
        return 1.0;
    }
    if stat < surface.min_stat {
        return 0.0;
    }
    let coef = if stat <= surface.star_stat {
        surface.small_p
    } else {
        surface.large_p
    };
    let z = coef.iter().rev().fold(0.0, |acc, c| acc * stat + c);
    normal_cdf(z)
}

fn normal_cdf(z: f64) -> f64 {
    0.5 * erfc(-z / std::f64::consts::SQRT_2)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn random_walk(rng: &mut StdRng, n: usize, start: f64) -> Vec<f64> {
        let mut level = start;
        (0..n)
            .map(|_| {
                level += rng.gen_range(-1.0..1.0);
                level
            })
            .collect()
    }

    fn ar1(rng: &mut StdRng, n: usize, phi: f64) -> Vec<f64> {
        let mut e = 0.0;
        (0..n)
            .map(|_| {
                e = phi * e + rng.gen_range(-1.0..1.0);
                e
            })
            .collect()
    }

    #[test]
    fn five_percent_critical_value_two_series() {
        let p = mackinnon_pvalue(-3.34, 2);
        assert!((p - 0.05).abs() < 0.005, "p = {p}");
    }

    #[test]
    fn pvalue_is_continuous_at_switch_point() {
        for (n, star) in [(1, -1.61), (2, -2.62)] {
            let below = mackinnon_pvalue(star, n);
            let above = mackinnon_pvalue(star + 1e-9, n);
            assert!((below - above).abs() < 0.005, "n={n}: {below} vs {above}");
        }
    }

    #[test]
    fn pvalue_clamps_outside_surface() {
        assert_eq!(mackinnon_pvalue(1.5, 2), 1.0);
        assert_eq!(mackinnon_pvalue(-25.0, 2), 0.0);
        assert_eq!(mackinnon_pvalue(f64::NEG_INFINITY, 2), 0.0);
        assert!(mackinnon_pvalue(f64::NAN, 2).is_nan());
        assert!(mackinnon_pvalue(-3.0, 3).is_nan());
    }

    #[test]
    fn pvalue_is_monotone_in_statistic() {
        let mut prev = 0.0;
        for i in 0..200 {
            let stat = -10.0 + i as f64 * 0.05;
            let p = mackinnon_pvalue(stat, 2);
            assert!(p >= prev - 1e-3, "stat {stat}: {p} < {prev}");
            prev = p;
        }
    }

    #[test]
    fn default_max_lag_values() {
        assert_eq!(default_max_lag(100), Some(12));
        assert_eq!(default_max_lag(300), Some(16));
        assert_eq!(default_max_lag(10), Some(4));
        assert_eq!(default_max_lag(1), None);
    }

    #[test]
    fn adf_rejects_unit_root_for_stationary_series() {
        let mut rng = StdRng::seed_from_u64(7);
        let s = ar1(&mut rng, 300, 0.3);
        let res = adf(&s).unwrap();
        assert!(res.statistic < -5.0, "stat = {}", res.statistic);
        assert!(res.used_lag <= 16);
    }

    #[test]
    fn cointegrated_pair_has_small_pvalue() {
        let mut rng = StdRng::seed_from_u64(42);
        let x = random_walk(&mut rng, 300, 100.0);
        let noise = ar1(&mut rng, 300, 0.5);
        let y: Vec<f64> = x.iter().zip(&noise).map(|(a, e)| 2.0 * a + e).collect();
        let res = engle_granger(&y, &x);
        assert_eq!(res.n_obs, 300);
        assert!(res.p_value < 0.01, "p = {}", res.p_value);
    }

    #[test]
    fn collinear_pair_short_circuits() {
        let x: Vec<f64> = (0..100).map(|i| 10.0 + (i as f64 * 0.37).sin() + i as f64 * 0.01).collect();
        let y: Vec<f64> = x.iter().map(|v| 2.0 * v + 1.0).collect();
        let res = engle_granger(&y, &x);
        assert_eq!(res.statistic, f64::NEG_INFINITY);
        assert_eq!(res.p_value, 0.0);
    }

    #[test]
    fn short_sample_is_undefined() {
        let x: Vec<f64> = (0..8).map(|i| i as f64).collect();
        let res = engle_granger(&x, &x);
        assert!(res.p_value.is_nan());
        assert_eq!(res.n_obs, 8);
    }
}
