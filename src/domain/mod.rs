//! Core domain types and logic. No I/O happens here.

pub mod error;
pub mod price_table;
pub mod hedge;
pub mod stats;
pub mod cointegration;
pub mod pair_ranker;
pub mod position;
pub mod indicator;
pub mod strategy;
pub mod metrics;
pub mod trades;
pub mod backtest;
pub mod grid_search;
pub mod universe;
pub mod config_validation;
