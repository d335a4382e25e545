use crate::error::{ChartError, ChartResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

// ── Series origin ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Origin {
    Historical,
    Forecast,
}

// ── Raw store records ─────────────────────────────────────────────────────────

/// One child of a store path, in the store's key order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Child {
    pub key: String,
    pub value: Value,
}

impl Child {
    pub fn new(key: impl Into<String>, value: Value) -> Self {
        Self { key: key.into(), value }
    }
}

/// A price field as the store hands it back: model outputs are often strings.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum PriceField {
    Number(f64),
    Text(String),
}

/// Every field any writer has been seen to put under a series child.
#[derive(Debug, Default, Deserialize)]
struct RawRecord {
    date: Option<String>,
    timestamp: Option<f64>,
    price: Option<PriceField>,
    #[serde(rename = "Forecasted_Price")]
    forecasted_price: Option<PriceField>,
    predicted_price: Option<PriceField>,
}

/// `stocks/{symbol}/{key}`
#[derive(Debug, Clone, PartialEq)]
pub struct HistoricalRecord {
    pub key: String,
    pub date: Option<String>,
    pub timestamp: Option<i64>,
    pub price: Option<PriceField>,
}

/// `predicted_stocks/{symbol}-{model}/{key}`
#[derive(Debug, Clone, PartialEq)]
pub struct ForecastRecord {
    pub key: String,
    pub date: Option<String>,
    pub timestamp: Option<i64>,
    pub price: Option<PriceField>,
    pub forecasted_price: Option<PriceField>,
    pub predicted_price: Option<PriceField>,
}

/// A store child decoded into one of the known shapes.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreRecord {
    Historical(HistoricalRecord),
    Forecast(ForecastRecord),
}

impl StoreRecord {
    /// Decode a child value read from a series path. Anything that is not an
    /// object with correctly typed fields is a `MalformedRecord`.
    pub fn decode(key: &str, value: &Value, origin: Origin) -> ChartResult<Self> {
        if !value.is_object() {
            return Err(ChartError::malformed(key, "expected an object"));
        }
        let raw = RawRecord::deserialize(value).map_err(|e| ChartError::malformed(key, e.to_string()))?;

        let timestamp = raw
            .timestamp
            .filter(|t| t.is_finite())
            .map(|t| t as i64);
        let date = raw.date.filter(|d| !d.trim().is_empty());

        Ok(match origin {
            Origin::Historical => Self::Historical(HistoricalRecord {
                key: key.to_string(),
                date,
                timestamp,
                price: raw.price,
            }),
            Origin::Forecast => Self::Forecast(ForecastRecord {
                key: key.to_string(),
                date,
                timestamp,
                price: raw.price,
                forecasted_price: raw.forecasted_price,
                predicted_price: raw.predicted_price,
            }),
        })
    }

    pub fn key(&self) -> &str {
        match self {
            Self::Historical(r) => &r.key,
            Self::Forecast(r) => &r.key,
        }
    }
}

// ── Normalized series ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NormalizedPoint {
    pub date: String,
    pub price: f64,
    /// Epoch milliseconds.
    pub timestamp: i64,
    pub id: String,
    pub origin: Origin,
}

/// Chart-ready arrays, all aligned to the reconciled series.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ChartPayload {
    pub labels: Vec<String>,
    pub actual: Vec<Option<f64>>,
    pub predicted: Vec<Option<f64>>,
}

impl ChartPayload {
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

// ── Forecast models ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ForecastModel {
    #[default]
    Prophet,
    Arima,
    Lstm,
    Xgboost,
}

impl ForecastModel {
    pub const ALL: [ForecastModel; 4] = [Self::Prophet, Self::Arima, Self::Lstm, Self::Xgboost];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Prophet => "prophet",
            Self::Arima => "arima",
            Self::Lstm => "lstm",
            Self::Xgboost => "xgboost",
        }
    }
}

impl fmt::Display for ForecastModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ForecastModel {
    type Err = ChartError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        Self::ALL
            .into_iter()
            .find(|m| m.as_str() == wanted)
            .ok_or_else(|| ChartError::UnknownModel(s.to_string()))
    }
}

// ── Stock catalogue ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct StockOption {
    pub symbol: String,
    pub label: String,
}

/// Offered when the store has no `stocks` children or cannot be read.
pub const DEFAULT_STOCKS: [(&str, &str); 9] = [
    ("AAPL", "Apple (AAPL)"),
    ("GOOGL", "Google (GOOGL)"),
    ("MSFT", "Microsoft (MSFT)"),
    ("TSLA", "Tesla (TSLA)"),
    ("RELIANCE", "Reliance (RELIANCE)"),
    ("TCS", "TCS (TCS)"),
    ("INFY", "Infosys (INFY)"),
    ("NABIL", "NABIL Bank (NABIL)"),
    ("ADBL", "Agriculture Development Bank (ADBL)"),
];

pub fn default_stock_options() -> Vec<StockOption> {
    DEFAULT_STOCKS
        .iter()
        .map(|(symbol, label)| StockOption {
            symbol: symbol.to_string(),
            label: label.to_string(),
        })
        .collect()
}

// ── Upload rows ───────────────────────────────────────────────────────────────

/// Minimal shape written under `stocks/{symbol}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PricePoint {
    pub date: String,
    pub price: f64,
}

/// Shape the forecasting scripts emit under `predicted_stocks/{symbol}-{model}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ForecastPoint {
    pub date: String,
    #[serde(rename = "Forecasted_Price")]
    pub forecasted_price: f64,
}
