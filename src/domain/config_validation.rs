//! Configuration validation.
//!
//! Validates every section before any data is loaded, so a bad threshold
//! fails fast instead of producing a silent backtest.

use crate::domain::error::PairtraderError;
use crate::domain::grid_search::Objective;
use crate::domain::universe::parse_tickers;
use crate::ports::config_port::ConfigPort;
use chrono::NaiveDate;

pub const DATE_FORMAT: &str = "%Y-%m-%d";

pub fn validate_data_config(config: &dyn ConfigPort) -> Result<(), PairtraderError> {
    validate_source(config)?;
    validate_tickers(config)?;
    validate_dates(config)?;
    Ok(())
}

pub fn validate_ranking_config(config: &dyn ConfigPort) -> Result<(), PairtraderError> {
    let window = config.get_int("ranking", "beta_window", 60);
    if window < 2 {
        return Err(invalid("ranking", "beta_window", "beta_window must be at least 2"));
    }
    let rank = config.get_int("ranking", "pair_rank", 0);
    if rank < 0 {
        return Err(invalid("ranking", "pair_rank", "pair_rank must be non-negative"));
    }
    Ok(())
}

pub fn validate_strategy_config(config: &dyn ConfigPort) -> Result<(), PairtraderError> {
    validate_pair_legs(config)?;
    validate_z_thresholds(config)?;
    validate_cost(config)?;
    validate_z_window(config)?;
    validate_stops(config)?;
    Ok(())
}

pub fn validate_grid_config(config: &dyn ConfigPort) -> Result<(), PairtraderError> {
    for key in ["entry_z", "exit_z"] {
        if float_list(config, "grid", key)?.is_some_and(|v| v.is_empty()) {
            return Err(invalid("grid", key, &format!("{key} grid must not be empty")));
        }
    }
    for key in ["stop_loss", "take_profit"] {
        if optional_float_list(config, "grid", key)?
            .is_some_and(|values| values.iter().flatten().any(|v| *v < 0.0))
        {
            return Err(invalid("grid", key, &format!("{key} values must be non-negative")));
        }
    }
    if config
        .get_string("grid", "objective")
        .is_some_and(|name| name.parse::<Objective>().is_err())
    {
        return Err(invalid(
            "grid",
            "objective",
            "objective must be sharpe, return or sharpe_penalized",
        ));
    }
    if config.get_double("grid", "dd_limit_pct", 20.0) < 0.0 {
        return Err(invalid("grid", "dd_limit_pct", "dd_limit_pct must be non-negative"));
    }
    Ok(())
}

fn validate_source(config: &dyn ConfigPort) -> Result<(), PairtraderError> {
    match config.get_string("data", "source") {
        Some(s) if !s.trim().is_empty() => Ok(()),
        _ => Err(missing("data", "source")),
    }
}

fn validate_tickers(config: &dyn ConfigPort) -> Result<(), PairtraderError> {
    let raw = config
        .get_string("data", "tickers")
        .ok_or_else(|| missing("data", "tickers"))?;
    let tickers =
        parse_tickers(&raw).map_err(|e| invalid("data", "tickers", &e.to_string()))?;
    if tickers.len() < 2 {
        return Err(invalid("data", "tickers", "at least two tickers are required"));
    }
    Ok(())
}

fn validate_dates(config: &dyn ConfigPort) -> Result<(), PairtraderError> {
    let start = required_date(config, "data", "start_date")?;
    let end = required_date(config, "data", "end_date")?;
    if start >= end {
        return Err(invalid("data", "start_date", "start_date must be before end_date"));
    }

    let test_start = optional_date(config, "data", "test_start")?;
    let test_end = optional_date(config, "data", "test_end")?;
    if test_start.is_some_and(|ts| ts <= start || ts >= end) {
        return Err(invalid(
            "data",
            "test_start",
            "test_start must fall strictly inside [start_date, end_date)",
        ));
    }
    match (test_start, test_end) {
        (None, Some(_)) => Err(missing("data", "test_start")),
        (Some(ts), Some(te)) if te <= ts => Err(invalid(
            "data",
            "test_end",
            "test_end must be after test_start",
        )),
        _ => Ok(()),
    }
}

fn validate_pair_legs(config: &dyn ConfigPort) -> Result<(), PairtraderError> {
    let s1 = config.get_string("strategy", "stock1");
    let s2 = config.get_string("strategy", "stock2");
    match (s1, s2) {
        (None, None) => Ok(()),
        (Some(a), Some(b)) if a.trim() == b.trim() => Err(invalid(
            "strategy",
            "stock2",
            "stock2 must differ from stock1",
        )),
        (Some(_), Some(_)) => Ok(()),
        (Some(_), None) => Err(missing("strategy", "stock2")),
        (None, Some(_)) => Err(missing("strategy", "stock1")),
    }
}

fn validate_z_thresholds(config: &dyn ConfigPort) -> Result<(), PairtraderError> {
    let entry = double(config, "strategy", "entry_z")?.unwrap_or(2.0);
    let exit = double(config, "strategy", "exit_z")?.unwrap_or(0.5);
    if entry <= 0.0 {
        return Err(invalid("strategy", "entry_z", "entry_z must be positive"));
    }
    if exit < 0.0 {
        return Err(invalid("strategy", "exit_z", "exit_z must be non-negative"));
    }
    if exit >= entry {
        return Err(invalid(
            "strategy",
            "exit_z",
            &format!("exit_z ({exit}) must be below entry_z ({entry})"),
        ));
    }
    Ok(())
}

fn validate_cost(config: &dyn ConfigPort) -> Result<(), PairtraderError> {
    if double(config, "strategy", "tx_cost_per_leg")?.is_some_and(|c| c < 0.0) {
        return Err(invalid(
            "strategy",
            "tx_cost_per_leg",
            "tx_cost_per_leg must be non-negative",
        ));
    }
    Ok(())
}

fn validate_z_window(config: &dyn ConfigPort) -> Result<(), PairtraderError> {
    if config.get_bool("strategy", "use_rolling_z", false)
        && config.get_int("strategy", "z_window", 60) < 2
    {
        return Err(invalid("strategy", "z_window", "z_window must be at least 2"));
    }
    Ok(())
}

fn validate_stops(config: &dyn ConfigPort) -> Result<(), PairtraderError> {
    for key in ["stop_loss_pct", "take_profit_pct"] {
        if double(config, "strategy", key)?.is_some_and(|v| v < 0.0) {
            return Err(invalid("strategy", key, &format!("{key} must be non-negative")));
        }
    }
    if config
        .get_string("strategy", "max_bars_in_trade")
        .is_some_and(|v| !v.trim().parse::<usize>().is_ok_and(|n| n > 0))
    {
        return Err(invalid(
            "strategy",
            "max_bars_in_trade",
            "max_bars_in_trade must be a positive integer",
        ));
    }
    Ok(())
}

/// Optional finite float; present-but-unparseable is an error.
pub fn double(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
) -> Result<Option<f64>, PairtraderError> {
    match config.get_string(section, key) {
        None => Ok(None),
        Some(raw) => match raw.trim().parse::<f64>() {
            Ok(v) if v.is_finite() => Ok(Some(v)),
            _ => Err(invalid(section, key, &format!("'{raw}' is not a number"))),
        },
    }
}

/// Comma-separated floats.
pub fn float_list(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
) -> Result<Option<Vec<f64>>, PairtraderError> {
    let Some(raw) = config.get_string(section, key) else {
        return Ok(None);
    };
    raw.split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(|t| {
            t.parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .ok_or_else(|| invalid(section, key, &format!("'{t}' is not a number")))
        })
        .collect::<Result<Vec<_>, _>>()
        .map(Some)
}

/// Comma-separated floats where `none` means the rule is off.
pub fn optional_float_list(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
) -> Result<Option<Vec<Option<f64>>>, PairtraderError> {
    let Some(raw) = config.get_string(section, key) else {
        return Ok(None);
    };
    raw.split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(|t| {
            if t.eq_ignore_ascii_case("none") {
                return Ok(None);
            }
            t.parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .map(Some)
                .ok_or_else(|| invalid(section, key, &format!("'{t}' is not a number or none")))
        })
        .collect::<Result<Vec<_>, _>>()
        .map(Some)
}

pub fn required_date(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
) -> Result<NaiveDate, PairtraderError> {
    optional_date(config, section, key)?.ok_or_else(|| missing(section, key))
}

pub fn optional_date(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
) -> Result<Option<NaiveDate>, PairtraderError> {
    match config.get_string(section, key) {
        None => Ok(None),
        Some(s) => NaiveDate::parse_from_str(s.trim(), DATE_FORMAT)
            .map(Some)
            .map_err(|_| {
                invalid(
                    section,
                    key,
                    &format!("invalid {key} format, expected YYYY-MM-DD"),
                )
            }),
    }
}

fn missing(section: &str, key: &str) -> PairtraderError {
    PairtraderError::ConfigMissing {
        section: section.to_string(),
        key: key.to_string(),
    }
}

fn invalid(section: &str, key: &str, reason: &str) -> PairtraderError {
    PairtraderError::ConfigInvalid {
        section: section.to_string(),
        key: key.to_string(),
        reason: reason.to_string(),
    }
}
