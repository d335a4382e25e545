//! CSV bulk upload of model inputs/outputs, and sample data generation.
//!
//! Layout under the upload directory:
//!   stock-data/{SYMBOL}.csv                      published_date, close, ...
//!   predicted-data/{SYMBOL}-{model}-predicted.csv  date (or a blank index header), Forecasted_Price

use crate::models::{ForecastModel, ForecastPoint, PricePoint};
use crate::pipeline::ChartService;
use crate::reconcile::normalize::{parse_date_ms, parse_float_prefix};
use crate::render::RenderSurface;
use anyhow::{Context, Result, bail};
use chrono::{DateTime, Duration, NaiveDate};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::BTreeMap;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

pub const STOCK_DATA_DIR: &str = "stock-data";
pub const PREDICTED_DATA_DIR: &str = "predicted-data";

/// What a CSV file in the upload directory holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadFile {
    History { symbol: String, path: PathBuf },
    Forecast { symbol: String, model: ForecastModel, path: PathBuf },
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct UploadStats {
    pub files: usize,
    pub rows: usize,
    pub errors: usize,
}

// ── Filenames ─────────────────────────────────────────────────────────────────

/// `NABIL.csv` → `NABIL`
pub fn history_symbol(path: &Path) -> Option<String> {
    let stem = path.file_stem()?.to_str()?.trim();
    if stem.is_empty() { None } else { Some(stem.to_uppercase()) }
}

/// `NABIL-lstm-predicted.csv` → (`NABIL`, Lstm). The symbol may itself
/// contain dashes; the model is the last segment before `-predicted`.
pub fn forecast_target(path: &Path) -> Option<(String, ForecastModel)> {
    let stem = path.file_stem()?.to_str()?;
    let rest = stem.strip_suffix("-predicted")?;
    let (symbol, model) = rest.rsplit_once('-')?;
    let model = model.parse().ok()?;
    let symbol = symbol.trim();
    if symbol.is_empty() {
        return None;
    }
    Some((symbol.to_uppercase(), model))
}

fn csv_files(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.exists() {
        return Ok(vec![]);
    }
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && path.extension().is_some_and(|e| e == "csv") {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Every uploadable file under `root`, histories first.
pub fn discover(root: &Path) -> Result<Vec<UploadFile>> {
    let mut out = Vec::new();
    for path in csv_files(&root.join(STOCK_DATA_DIR))? {
        match history_symbol(&path) {
            Some(symbol) => out.push(UploadFile::History { symbol, path }),
            None => warn!("No symbol in filename {:?}", path),
        }
    }
    for path in csv_files(&root.join(PREDICTED_DATA_DIR))? {
        match forecast_target(&path) {
            Some((symbol, model)) => out.push(UploadFile::Forecast { symbol, model, path }),
            None => warn!("Expected {{SYMBOL}}-{{model}}-predicted.csv, got {:?}", path),
        }
    }
    Ok(out)
}

// ── CSV parsing ───────────────────────────────────────────────────────────────

fn column(headers: &csv::StringRecord, name: &str) -> Result<usize> {
    headers
        .iter()
        .position(|h| h.trim().eq_ignore_ascii_case(name))
        .with_context(|| format!("Missing column `{name}`"))
}

/// A frame written with its date index has a blank first header.
fn date_column(headers: &csv::StringRecord, name: &str) -> Result<usize> {
    column(headers, name).or_else(|e| match headers.get(0) {
        Some(h) if h.trim().is_empty() => Ok(0),
        _ => Err(e),
    })
}

/// Rows as (YYYY-MM-DD, price); unparseable rows are skipped.
fn read_rows<R: Read>(input: R, date_col: &str, price_col: &str) -> Result<Vec<(String, f64)>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(input);

    let headers = reader.headers()?.clone();
    let date_idx = date_column(&headers, date_col)?;
    let price_idx = column(&headers, price_col)?;

    let mut rows = Vec::new();
    for (i, result) in reader.records().enumerate() {
        let record = match result {
            Ok(r) => r,
            Err(e) => {
                warn!("Row {}: {}", i + 1, e);
                continue;
            }
        };
        let date = record
            .get(date_idx)
            .and_then(parse_date_ms)
            .and_then(DateTime::from_timestamp_millis)
            .map(|d| d.format("%Y-%m-%d").to_string());
        let price = record.get(price_idx).and_then(parse_float_prefix);
        match (date, price) {
            (Some(date), Some(price)) => rows.push((date, price)),
            _ => debug!("Row {}: skipped {:?}", i + 1, record),
        }
    }
    Ok(rows)
}

/// `published_date`/`close` rows, one per date (last wins), ascending.
pub fn read_history<R: Read>(input: R) -> Result<Vec<PricePoint>> {
    let by_date: BTreeMap<String, f64> = read_rows(input, "published_date", "close")?.into_iter().collect();
    Ok(by_date
        .into_iter()
        .map(|(date, price)| PricePoint { date, price })
        .collect())
}

/// `date`/`Forecasted_Price` rows in file order.
pub fn read_forecast<R: Read>(input: R) -> Result<Vec<ForecastPoint>> {
    Ok(read_rows(input, "date", "Forecasted_Price")?
        .into_iter()
        .map(|(date, forecasted_price)| ForecastPoint { date, forecasted_price })
        .collect())
}

// ── Upload ────────────────────────────────────────────────────────────────────

async fn upload_one<R: RenderSurface>(service: &ChartService<R>, file: &UploadFile) -> Result<usize> {
    match file {
        UploadFile::History { symbol, path } => {
            let points = read_history(std::fs::File::open(path)?).with_context(|| format!("{path:?}"))?;
            if points.is_empty() {
                bail!("{path:?} has no usable rows");
            }
            service.store_stock_data(symbol, &points).await
        }
        UploadFile::Forecast { symbol, model, path } => {
            let points = read_forecast(std::fs::File::open(path)?).with_context(|| format!("{path:?}"))?;
            if points.is_empty() {
                bail!("{path:?} has no usable rows");
            }
            service.store_forecast_data(symbol, *model, &points).await
        }
    }
}

/// Upload every file under `root`; one bad file does not stop the rest.
pub async fn upload_dir<R: RenderSurface>(service: &ChartService<R>, root: &Path) -> Result<UploadStats> {
    let files = discover(root)?;
    info!("Found {} CSV files under {:?}", files.len(), root);

    let mut stats = UploadStats::default();
    for file in &files {
        match upload_one(service, file).await {
            Ok(rows) => {
                stats.files += 1;
                stats.rows += rows;
            }
            Err(e) => {
                warn!("Upload failed: {:#}", e);
                stats.errors += 1;
            }
        }
    }
    Ok(stats)
}

// ── Sample data ───────────────────────────────────────────────────────────────

fn symbol_seed(symbol: &str) -> u64 {
    // FNV-1a
    symbol
        .bytes()
        .fold(0xcbf2_9ce4_8422_2325, |h, b| (h ^ u64::from(b)).wrapping_mul(0x0100_0000_01b3))
}

/// `days` daily closes ending on `end`, as a seeded random walk. The same
/// symbol always produces the same series.
pub fn sample_history(symbol: &str, days: u32, end: NaiveDate) -> Vec<PricePoint> {
    let mut rng = StdRng::seed_from_u64(symbol_seed(symbol));
    let mut price: f64 = rng.random_range(100.0..1000.0);

    (0..days)
        .rev()
        .map(|back| {
            let date = end - Duration::days(i64::from(back));
            price = (price * (1.0 + rng.random_range(-0.02..0.02))).max(1.0);
            PricePoint {
                date: date.format("%Y-%m-%d").to_string(),
                price: (price * 100.0).round() / 100.0,
            }
        })
        .collect()
}

// ── Tests ─────────────────────────────────────────────────────────────────────
