pub mod connectivity;
pub mod firebase;
pub mod local;

use crate::config::{StoreBackend, StoreConfig};
use crate::error::ChartResult;
use crate::models::{Child, ForecastModel};
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tracing::info;

pub use self::connectivity::{ConnectionState, ConnectivityMonitor};
pub use self::firebase::FirebaseStore;
pub use self::local::LocalStore;

// ── Layout ────────────────────────────────────────────────────────────────────

pub const STOCKS_ROOT: &str = "stocks";
pub const FORECAST_ROOT: &str = "predicted_stocks";

/// `stocks/{symbol}`
pub fn history_path(symbol: &str) -> String {
    format!("{STOCKS_ROOT}/{symbol}")
}

/// `predicted_stocks/{symbol}-{model}`
pub fn forecast_path(symbol: &str, model: ForecastModel) -> String {
    format!("{FORECAST_ROOT}/{symbol}-{model}")
}

// ── Store trait ───────────────────────────────────────────────────────────────

/// Path-addressed key-value store, shaped after a real-time database tree.
#[async_trait]
pub trait KvStore: Send + Sync {
    fn name(&self) -> &'static str;

    /// Direct children of `path`, ordered by key. A missing path reads empty.
    async fn read(&self, path: &str) -> ChartResult<Vec<Child>>;

    /// Child keys of `path` without their values, sorted.
    async fn list_keys(&self, path: &str) -> ChartResult<Vec<String>>;

    async fn exists(&self, path: &str) -> ChartResult<bool>;

    /// Remove `path` and everything under it.
    async fn remove(&self, path: &str) -> ChartResult<()>;

    /// Append `value` under a fresh, chronologically ordered key.
    async fn push_child(&self, path: &str, value: &Value) -> ChartResult<String>;

    /// One round-trip to check the store is reachable.
    async fn probe(&self) -> ChartResult<()>;
}

pub fn open_store(config: &StoreConfig) -> Result<Arc<dyn KvStore>> {
    let store: Arc<dyn KvStore> = match config.backend {
        StoreBackend::Firebase => {
            let url = config
                .database_url
                .as_deref()
                .context("store.database_url is required for the firebase backend")?;
            Arc::new(FirebaseStore::new(url, config.timeout_secs).context("Failed to build Firebase client")?)
        }
        StoreBackend::Local => Arc::new(
            LocalStore::open(&config.db_path)
                .with_context(|| format!("Failed to open local store at {:?}", config.db_path))?,
        ),
    };
    info!("Using {} store", store.name());
    Ok(store)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths() {
        assert_eq!(history_path("AAPL"), "stocks/AAPL");
        assert_eq!(forecast_path("NABIL", ForecastModel::Prophet), "predicted_stocks/NABIL-prophet");
        assert_eq!(forecast_path("TCS", ForecastModel::Xgboost), "predicted_stocks/TCS-xgboost");
    }
}
