//! Chart service: ties store → reconciler → render surface together.
//!
//! ## Load flow
//!
//! `load()` — one chart request for a (symbol, model):
//!   1. Ask the `LoadCoordinator` for admission (debounce / in-flight guard)
//!   2. Read `stocks/{symbol}`, then `predicted_stocks/{symbol}-{model}`
//!   3. Merge, window, split
//!   4. Render, unless a newer request was issued meanwhile
//!
//! The two reads are sequential. A failed read clears the in-flight flag and
//! is returned to the caller; nothing is retried.

use crate::config::ChartConfig;
use crate::coordinator::{self, Admission, LoadCoordinator, LoadGuard, LoadPhase, RequestToken, SuppressReason};
use crate::error::{ChartError, EmptyReason};
use crate::models::{ForecastModel, ForecastPoint, PricePoint, StockOption, default_stock_options};
use crate::reconcile::Reconciler;
use crate::render::{ChartDocument, RenderSurface, empty_message};
use crate::store::{ConnectionState, KvStore, STOCKS_ROOT, forecast_path, history_path};
use anyhow::{Context, Result, bail};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    Rendered {
        token: RequestToken,
        points: usize,
        boundary_index: usize,
        dropped: usize,
    },
    Empty(EmptyReason),
    Suppressed(SuppressReason),
    /// A newer request was issued while this one ran; its result was discarded.
    Superseded,
}

pub struct ChartService<R> {
    store: Arc<dyn KvStore>,
    coordinator: Mutex<LoadCoordinator>,
    reconciler: Reconciler,
    surface: Mutex<R>,
    config: ChartConfig,
}

impl<R: RenderSurface> ChartService<R> {
    pub fn new(store: Arc<dyn KvStore>, coordinator: LoadCoordinator, config: ChartConfig, surface: R) -> Self {
        Self {
            store,
            coordinator: Mutex::new(coordinator),
            reconciler: Reconciler::new(config.window_years),
            surface: Mutex::new(surface),
            config,
        }
    }

    pub fn surface(&self) -> MutexGuard<'_, R> {
        self.surface.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn in_flight_symbol(&self) -> Option<String> {
        coordinator::lock(&self.coordinator).in_flight_symbol().map(str::to_string)
    }

    pub fn phase(&self) -> LoadPhase {
        coordinator::lock(&self.coordinator).phase()
    }

    pub async fn load(&self, symbol: &str, model: ForecastModel, force: bool) -> Result<LoadOutcome> {
        self.load_at(symbol, model, force, Utc::now()).await
    }

    /// `load` with an explicit "now" for the window and the forecast boundary.
    pub async fn load_at(
        &self,
        symbol: &str,
        model: ForecastModel,
        force: bool,
        now: DateTime<Utc>,
    ) -> Result<LoadOutcome> {
        let symbol = symbol.trim();
        if symbol.is_empty() {
            bail!("Please select a stock first");
        }

        let admission = coordinator::lock(&self.coordinator).try_begin(symbol, force);
        let ticket = match admission {
            Admission::Admitted(ticket) => ticket,
            Admission::Suppressed(reason) => return Ok(LoadOutcome::Suppressed(reason)),
        };
        let guard = LoadGuard::new(&self.coordinator, ticket);
        info!("{} ({}): load #{}", symbol, model, guard.ticket().token.get());

        self.surface().loading(symbol, model)?;

        let history = self.read_or_report(&history_path(symbol)).await?;
        let forecast = self.read_or_report(&forecast_path(symbol, model)).await?;

        guard.advance(LoadPhase::Merging);
        let merged = self.reconciler.merge(&history, &forecast, now);

        guard.advance(LoadPhase::Filtering);
        let rec = self.reconciler.window(merged, now);

        if !guard.is_current() {
            info!("{}: load #{} superseded, discarding", symbol, guard.ticket().token.get());
            return Ok(LoadOutcome::Superseded);
        }

        let empty = if rec.merged_len == 0 {
            Some(EmptyReason::NoRecords)
        } else if rec.series.is_empty() {
            Some(EmptyReason::OutsideWindow)
        } else {
            None
        };
        if let Some(reason) = empty {
            let err = ChartError::EmptyResult { symbol: symbol.to_string(), reason };
            info!("{err}");
            let message = empty_message(symbol, reason, self.reconciler.window_years());
            self.surface().empty(symbol, &message)?;
            return Ok(LoadOutcome::Empty(reason));
        }

        if rec.order_violations > 0 {
            if self.config.strict_order {
                return Err(ChartError::OutOfOrder {
                    symbol: symbol.to_string(),
                    violations: rec.order_violations,
                }
                .into());
            }
            warn!(
                "{}: {} point(s) on the wrong side of the forecast boundary",
                symbol, rec.order_violations
            );
        }

        guard.advance(LoadPhase::Rendering);
        let doc = ChartDocument::build(
            symbol,
            model,
            &rec,
            self.reconciler.window_years(),
            &self.config.currency_prefix,
        );
        self.surface().chart(&doc)?;

        info!(
            "{}: rendered {} points ({} historical, {} dropped)",
            symbol,
            rec.series.len(),
            rec.boundary_index,
            rec.dropped
        );
        Ok(LoadOutcome::Rendered {
            token: guard.ticket().token,
            points: rec.series.len(),
            boundary_index: rec.boundary_index,
            dropped: rec.dropped,
        })
    }

    /// Read one path; connectivity failures also flip the status banner.
    async fn read_or_report(&self, path: &str) -> Result<Vec<crate::models::Child>> {
        match self.store.read(path).await {
            Ok(children) => Ok(children),
            Err(e) => {
                if e.is_connectivity() {
                    self.surface().status(&ConnectionState::Error(e.to_string()))?;
                }
                Err(e).with_context(|| format!("Failed to read {path}"))
            }
        }
    }

    // ── Stock catalogue ───────────────────────────────────────────────────────

    /// Symbols under `stocks`, or the default list when there are none or the
    /// store cannot be read.
    pub async fn available_stocks(&self) -> Vec<StockOption> {
        match self.store.list_keys(STOCKS_ROOT).await {
            Ok(mut keys) if !keys.is_empty() => {
                keys.sort();
                keys.into_iter()
                    .map(|symbol| StockOption { label: symbol.clone(), symbol })
                    .collect()
            }
            Ok(_) => default_stock_options(),
            Err(e) => {
                warn!("Could not list stocks ({e}), offering defaults");
                default_stock_options()
            }
        }
    }

    pub async fn refresh_stocks(&self) -> Result<Vec<StockOption>> {
        let options = self.available_stocks().await;
        self.surface().stocks(&options)?;
        Ok(options)
    }

    // ── Writes ────────────────────────────────────────────────────────────────

    /// Replace `stocks/{symbol}` with `points`.
    pub async fn store_stock_data(&self, symbol: &str, points: &[PricePoint]) -> Result<usize> {
        self.replace(&history_path(symbol), points).await
    }

    /// Replace `predicted_stocks/{symbol}-{model}` with `points`.
    pub async fn store_forecast_data(
        &self,
        symbol: &str,
        model: ForecastModel,
        points: &[ForecastPoint],
    ) -> Result<usize> {
        self.replace(&forecast_path(symbol, model), points).await
    }

    async fn replace<T: Serialize>(&self, path: &str, rows: &[T]) -> Result<usize> {
        self.store
            .remove(path)
            .await
            .with_context(|| format!("Failed to clear old data at {path}"))?;
        for row in rows {
            let value = serde_json::to_value(row)?;
            self.store
                .push_child(path, &value)
                .await
                .with_context(|| format!("Failed to store data at {path}"))?;
        }
        info!("{}: {} rows stored", path, rows.len());
        Ok(rows.len())
    }

    // ── Connectivity ──────────────────────────────────────────────────────────

    /// Mirror connectivity changes onto the surface; every (re)connection
    /// reloads the stock catalogue. Returns when the sender goes away.
    pub async fn follow_connectivity(&self, mut rx: watch::Receiver<ConnectionState>) -> Result<()> {
        loop {
            let state = rx.borrow_and_update().clone();
            self.surface().status(&state)?;
            if state.is_connected() {
                self.refresh_stocks().await?;
            }
            if rx.changed().await.is_err() {
                return Ok(());
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
