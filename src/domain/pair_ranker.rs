//! Pair analysis and ranking.
//!
//! Each unordered ticker pair gets three gates (cointegration, hedge-ratio
//! stability, half-life in range) and a score counting the gates passed.

use crate::domain::cointegration::engle_granger;
use crate::domain::error::PairtraderError;
use crate::domain::hedge;
use crate::domain::price_table::{PriceTable, align};
use crate::domain::stats::{half_life, rolling_beta_cv};
use rayon::prelude::*;
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::HashSet;
use tracing::{debug, info};

pub const MIN_PAIR_OBS: usize = 90;
pub const P_VALUE_MAX: f64 = 0.05;
pub const BETA_CV_MAX: f64 = 0.2;
pub const HALF_LIFE_MIN: f64 = 3.0;
pub const HALF_LIFE_MAX: f64 = 20.0;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PairCandidate {
    pub ticker_a: String,
    pub ticker_b: String,
    pub n_obs: usize,
    pub p_value: f64,
    pub alpha: f64,
    pub beta: f64,
    pub beta_cv: f64,
    pub half_life: f64,
    pub score: u8,
    pub cointegration_ok: bool,
    pub beta_stable: bool,
    pub hl_ok: bool,
}

impl PairCandidate {
    fn unscored(a: &str, b: &str, n_obs: usize, p_value: f64) -> Self {
        Self {
            ticker_a: a.to_string(),
            ticker_b: b.to_string(),
            n_obs,
            p_value,
            alpha: f64::NAN,
            beta: f64::NAN,
            beta_cv: f64::NAN,
            half_life: f64::NAN,
            score: 0,
            cointegration_ok: false,
            beta_stable: false,
            hl_ok: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PairRanker {
    use_logs: bool,
    beta_window: usize,
}

impl Default for PairRanker {
    fn default() -> Self {
        Self {
            use_logs: true,
            beta_window: 60,
        }
    }
}

impl PairRanker {
    pub fn new(use_logs: bool, beta_window: usize) -> Result<Self, PairtraderError> {
        if beta_window < 2 {
            return Err(PairtraderError::invalid(
                "beta_window",
                format!("must be at least 2, got {beta_window}"),
            ));
        }
        Ok(Self {
            use_logs,
            beta_window,
        })
    }

    pub fn use_logs(&self) -> bool {
        self.use_logs
    }

    pub fn beta_window(&self) -> usize {
        self.beta_window
    }

    pub fn analyze_pair(
        &self,
        prices: &PriceTable,
        a: &str,
        b: &str,
    ) -> Result<PairCandidate, PairtraderError> {
        let col_a = self.transform(prices.column(a)?);
        let col_b = self.transform(prices.column(b)?);
        let pair = align(prices.dates(), &col_a, &col_b);
        let n = pair.len();

        if n < MIN_PAIR_OBS {
            debug!(a, b, n, "pair history too short, not scored");
            return Ok(PairCandidate::unscored(a, b, n, f64::NAN));
        }

        let coint = engle_granger(&pair.a, &pair.b);
        let fit = hedge::fit(&pair.a, &pair.b);
        if !fit.is_valid() {
            return Ok(PairCandidate::unscored(a, b, n, coint.p_value));
        }

        let spread = hedge::spread(&pair.a, &pair.b, fit.alpha, fit.beta);
        let beta_cv = rolling_beta_cv(&pair.a, &pair.b, self.beta_window);
        let hl = half_life(&spread);
        let hl = if hl.is_finite() { hl } else { f64::INFINITY };

        let cointegration_ok = coint.p_value < P_VALUE_MAX;
        let beta_stable = beta_cv < BETA_CV_MAX;
        let hl_ok = (HALF_LIFE_MIN..=HALF_LIFE_MAX).contains(&hl);
        let score = [cointegration_ok, beta_stable, hl_ok]
            .iter()
            .filter(|g| **g)
            .count() as u8;

        debug!(
            a,
            b,
            p_value = coint.p_value,
            beta = fit.beta,
            beta_cv,
            half_life = hl,
            score,
            "analyzed pair"
        );

        Ok(PairCandidate {
            ticker_a: a.to_string(),
            ticker_b: b.to_string(),
            n_obs: n,
            p_value: coint.p_value,
            alpha: fit.alpha,
            beta: fit.beta,
            beta_cv,
            half_life: hl,
            score,
            cointegration_ok,
            beta_stable,
            hl_ok,
        })
    }

    /// Analyze every combination `(tickers[i], tickers[j])`, `i < j`, and sort
    /// by score desc, p-value asc, half-life asc. Equal keys keep
    /// combination order.
    pub fn rank_pairs(
        &self,
        prices: &PriceTable,
        tickers: &[&str],
    ) -> Result<Vec<PairCandidate>, PairtraderError> {
        let mut seen = HashSet::new();
        for t in tickers {
            if !seen.insert(*t) {
                return Err(PairtraderError::invalid(
                    "tickers",
                    format!("duplicate ticker {t}"),
                ));
            }
            prices.column(t)?;
        }

        let combos: Vec<(&str, &str)> = tickers
            .iter()
            .enumerate()
            .flat_map(|(i, a)| tickers[i + 1..].iter().map(move |b| (*a, *b)))
            .collect();

        let mut ranked = combos
            .par_iter()
            .map(|(a, b)| self.analyze_pair(prices, a, b))
            .collect::<Result<Vec<_>, _>>()?;
        sort_candidates(&mut ranked);

        info!(
            pairs = ranked.len(),
            top_score = ranked.first().map(|c| c.score).unwrap_or(0),
            "ranked pairs"
        );
        Ok(ranked)
    }

    fn transform(&self, column: &[f64]) -> Vec<f64> {
        if !self.use_logs {
            return column.to_vec();
        }
        column
            .iter()
            .map(|v| if *v > 0.0 { v.ln() } else { f64::NAN })
            .collect()
    }
}

pub(crate) fn sort_candidates(candidates: &mut [PairCandidate]) {
    candidates.sort_by(|x, y| {
        y.score
            .cmp(&x.score)
            .then_with(|| nan_last(x.p_value, y.p_value))
            .then_with(|| nan_last(x.half_life, y.half_life))
    });
}

fn nan_last(a: f64, b: f64) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => a.total_cmp(&b),
    }
}

/// Ticker pair at `position` in a ranked list.
pub fn select_pair(
    ranked: &[PairCandidate],
    position: usize,
) -> Result<(String, String), PairtraderError> {
    ranked
        .get(position)
        .map(|c| (c.ticker_a.clone(), c.ticker_b.clone()))
        .ok_or(PairtraderError::RankOutOfRange {
            position,
            available: ranked.len(),
        })
}
