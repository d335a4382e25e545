use crate::models::ForecastModel;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Top-level application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub chart: ChartConfig,
    #[serde(default)]
    pub loader: LoaderConfig,
}

#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// Hosted Realtime Database over REST
    Firebase,
    /// DuckDB file with the same path layout
    #[default]
    Local,
}

/// Store configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,

    /// e.g. `https://<project>-default-rtdb.firebaseio.com`
    #[serde(default)]
    pub database_url: Option<String>,

    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_probe_interval_secs")]
    pub probe_interval_secs: u64,
}

/// Reconciliation and rendering configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChartConfig {
    #[serde(default = "default_window_years")]
    pub window_years: u32,

    #[serde(default = "default_cooldown_ms")]
    pub cooldown_ms: u64,

    #[serde(default)]
    pub default_model: ForecastModel,

    #[serde(default = "default_currency_prefix")]
    pub currency_prefix: String,

    /// Fail loads whose series crosses the forecast boundary more than once.
    #[serde(default)]
    pub strict_order: bool,
}

/// CSV upload configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoaderConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    #[serde(default = "default_sample_days")]
    pub sample_days: u32,
}

// ── Defaults ─────────────────────────────────────────────────────────────────

fn default_db_path() -> PathBuf {
    PathBuf::from("data/forecast-chart.duckdb")
}
fn default_timeout_secs() -> u64 {
    10
}
fn default_probe_interval_secs() -> u64 {
    15
}
fn default_window_years() -> u32 {
    2
}
fn default_cooldown_ms() -> u64 {
    1000
}
fn default_currency_prefix() -> String {
    "Rs.".to_string()
}
fn default_data_dir() -> PathBuf {
    PathBuf::from("data-uploader")
}
fn default_sample_days() -> u32 {
    365
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            database_url: None,
            db_path: default_db_path(),
            timeout_secs: default_timeout_secs(),
            probe_interval_secs: default_probe_interval_secs(),
        }
    }
}

impl Default for ChartConfig {
    fn default() -> Self {
        Self {
            window_years: default_window_years(),
            cooldown_ms: default_cooldown_ms(),
            default_model: ForecastModel::default(),
            currency_prefix: default_currency_prefix(),
            strict_order: false,
        }
    }
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            sample_days: default_sample_days(),
        }
    }
}

impl ChartConfig {
    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }
}

impl StoreConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn probe_interval(&self) -> Duration {
        Duration::from_secs(self.probe_interval_secs)
    }
}

// ── Loader ───────────────────────────────────────────────────────────────────

impl AppConfig {
    /// Load configuration from file + environment overrides
    pub fn load() -> Result<Self> {
        dotenv::dotenv().ok();

        let cfg = config::Config::builder()
            .add_source(
                config::File::with_name("config/default")
                    .required(false)
                    .format(config::FileFormat::Toml),
            )
            .add_source(
                config::File::with_name("config/local")
                    .required(false)
                    .format(config::FileFormat::Toml),
            )
            .add_source(config::Environment::with_prefix("FCHART").separator("__"))
            .build()?;

        let app_cfg: AppConfig = cfg.try_deserialize().unwrap_or_else(|e| {
            tracing::warn!("Invalid configuration ({e}), using defaults");
            AppConfig::default()
        });
        Ok(app_cfg)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            store: StoreConfig::default(),
            chart: ChartConfig::default(),
            loader: LoaderConfig::default(),
        }
    }
}
