//! pairtrader: pairs-trading research toolkit.
//!
//! Rank equity pairs by cointegration and mean-reversion quality, then
//! backtest stateful long/short spread strategies with costs and stops.
//!
//! Hexagonal architecture: domain logic in [`domain`], port traits in [`ports`],
//! concrete implementations in [`adapters`], command-line entry in [`cli`].

pub mod domain;
pub mod ports;
pub mod adapters;
pub mod cli;
