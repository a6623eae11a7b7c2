//! Domain error types.
//!
//! Statistical insufficiency never shows up here: short or degenerate samples
//! are reported as NaN / infinity sentinels. These variants are for caller
//! mistakes and I/O failures that must stop the operation.

/// Top-level error type for pairtrader.
#[derive(Debug, thiserror::Error)]
pub enum PairtraderError {
    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error("ticker {ticker} not present in price table")]
    MissingTicker { ticker: String },

    #[error("invalid parameter {name}: {reason}")]
    InvalidParameter { name: String, reason: String },

    #[error("invalid price table: {reason}")]
    InvalidPriceTable { reason: String },

    #[error("no data for {ticker}: {reason}")]
    NoData { ticker: String, reason: String },

    #[error("insufficient data for {what}: have {have} rows, need {need}")]
    InsufficientData {
        what: String,
        have: usize,
        need: usize,
    },

    #[error("no parameter combinations evaluated (check grids/constraints)")]
    NoValidCombinations,

    #[error("rank position {position} out of range ({available} pairs ranked)")]
    RankOutOfRange { position: usize, available: usize },

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl PairtraderError {
    pub(crate) fn invalid(name: &str, reason: impl Into<String>) -> Self {
        PairtraderError::InvalidParameter {
            name: name.to_string(),
            reason: reason.into(),
        }
    }
}

impl From<&PairtraderError> for std::process::ExitCode {
    fn from(err: &PairtraderError) -> Self {
        let code: u8 = match err {
            PairtraderError::Io(_) | PairtraderError::Csv(_) => 1,
            PairtraderError::ConfigParse { .. }
            | PairtraderError::ConfigMissing { .. }
            | PairtraderError::ConfigInvalid { .. } => 2,
            PairtraderError::InvalidPriceTable { .. } => 3,
            PairtraderError::MissingTicker { .. }
            | PairtraderError::InvalidParameter { .. }
            | PairtraderError::NoValidCombinations
            | PairtraderError::RankOutOfRange { .. } => 4,
            PairtraderError::NoData { .. } | PairtraderError::InsufficientData { .. } => 5,
        };
        std::process::ExitCode::from(code)
    }
}
