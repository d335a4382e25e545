use thiserror::Error;

pub type ChartResult<T> = Result<T, ChartError>;

/// Why a load produced nothing to draw.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmptyReason {
    /// Neither `stocks/{symbol}` nor the forecast path held a usable record.
    NoRecords,
    /// Records exist, but none fall inside the trailing window.
    OutsideWindow,
}

#[derive(Debug, Error)]
pub enum ChartError {
    #[error("store unreachable: {0}")]
    Connectivity(String),

    #[error("no data for {symbol} ({reason:?})")]
    EmptyResult { symbol: String, reason: EmptyReason },

    #[error("malformed record {key}: {reason}")]
    MalformedRecord { key: String, reason: String },

    #[error("{violations} point(s) break the historical/forecast boundary for {symbol}")]
    OutOfOrder { symbol: String, violations: usize },

    #[error("unknown forecast model '{0}' (expected prophet, arima, lstm or xgboost)")]
    UnknownModel(String),

    #[error("store error: {0}")]
    Store(String),
}

impl ChartError {
    pub fn malformed(key: &str, reason: impl Into<String>) -> Self {
        Self::MalformedRecord {
            key: key.to_string(),
            reason: reason.into(),
        }
    }

    /// Connectivity failures flip the status banner; everything else does not.
    pub fn is_connectivity(&self) -> bool {
        matches!(self, Self::Connectivity(_))
    }
}

impl From<reqwest::Error> for ChartError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() || e.is_connect() {
            Self::Connectivity(e.to_string())
        } else {
            Self::Store(e.to_string())
        }
    }
}

impl From<duckdb::Error> for ChartError {
    fn from(e: duckdb::Error) -> Self {
        Self::Store(e.to_string())
    }
}

impl From<serde_json::Error> for ChartError {
    fn from(e: serde_json::Error) -> Self {
        Self::Store(format!("invalid JSON: {e}"))
    }
}
