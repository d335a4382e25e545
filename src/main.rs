mod config;
mod coordinator;
mod error;
mod loader;
mod models;
mod pipeline;
mod reconcile;
mod render;
mod store;
mod utils;

use anyhow::Result;
use chrono::{NaiveDate, NaiveTime, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

use crate::config::AppConfig;
use crate::coordinator::LoadCoordinator;
use crate::models::ForecastModel;
use crate::pipeline::{ChartService, LoadOutcome};
use crate::render::{JsonSurface, RenderSurface, TerminalSurface};
use crate::store::{ConnectivityMonitor, open_store};

#[derive(Parser)]
#[command(name = "forecast-chart", about = "Stock price history and forecast charts", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = Format::Table, global = true)]
    format: Format,
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Json,
    Table,
}

#[derive(Subcommand)]
enum Command {
    /// Load and render one symbol's history and forecast
    Chart {
        symbol: String,

        /// prophet, arima, lstm or xgboost (default from config)
        #[arg(short, long)]
        model: Option<ForecastModel>,

        /// Bypass the in-flight and cooldown checks
        #[arg(long)]
        force: bool,

        /// Pretend today is this date (YYYY-MM-DD)
        #[arg(long)]
        today: Option<NaiveDate>,
    },

    /// List symbols available in the store
    Symbols,

    /// Upload CSV model inputs/outputs (stock-data/, predicted-data/)
    Upload {
        #[arg(short, long)]
        dir: Option<PathBuf>,
    },

    /// Replace a symbol's history with generated sample data
    Sample {
        symbol: String,

        #[arg(short, long)]
        days: Option<u32>,
    },

    /// Probe the store once
    Status,

    /// Follow store connectivity until Ctrl-C
    Watch,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "forecast_chart=info,warn",
        1 => "forecast_chart=debug,info",
        _ => "trace",
    };

    // stdout carries chart output; logs go to stderr.
    tracing_subscriber::registry()
        .with(fmt::layer().compact().with_target(false).with_writer(std::io::stderr))
        .with(EnvFilter::new(filter))
        .init();

    let config = AppConfig::load()?;
    let store = open_store(&config.store)?;

    let surface: Box<dyn RenderSurface> = match cli.format {
        Format::Json => Box::new(JsonSurface::new(std::io::stdout())),
        Format::Table => Box::new(TerminalSurface::new(std::io::stdout())),
    };
    let service = ChartService::new(
        store.clone(),
        LoadCoordinator::new(config.chart.cooldown()),
        config.chart.clone(),
        surface,
    );

    match cli.command {
        Command::Chart {
            symbol,
            model,
            force,
            today,
        } => {
            let model = model.unwrap_or(config.chart.default_model);
            let symbol = symbol.to_uppercase();
            let outcome = match today {
                Some(day) => {
                    let now = day.and_time(NaiveTime::MIN).and_utc() + chrono::Duration::hours(12);
                    service.load_at(&symbol, model, force, now).await?
                }
                None => service.load(&symbol, model, force).await?,
            };
            match outcome {
                LoadOutcome::Rendered { points, dropped, .. } => {
                    info!("{}: {} points, {} records dropped", symbol, points, dropped)
                }
                LoadOutcome::Empty(reason) => info!("{}: nothing to chart ({:?})", symbol, reason),
                LoadOutcome::Suppressed(reason) => info!("{}: load suppressed ({:?})", symbol, reason),
                LoadOutcome::Superseded => info!("{}: load superseded", symbol),
            }
        }

        Command::Symbols => {
            service.refresh_stocks().await?;
        }

        Command::Upload { dir } => {
            let _t = utils::Timer::start("CSV upload");
            let dir = dir.unwrap_or_else(|| config.loader.data_dir.clone());
            let stats = loader::upload_dir(&service, &dir).await?;
            info!(
                "Done: {} files, {} rows stored, {} errors",
                stats.files,
                utils::fmt_count(stats.rows),
                stats.errors
            );
            service.refresh_stocks().await?;
        }

        Command::Sample { symbol, days } => {
            let symbol = symbol.to_uppercase();
            let days = days.unwrap_or(config.loader.sample_days);
            let points = loader::sample_history(&symbol, days, Utc::now().date_naive());
            let stored = service.store_stock_data(&symbol, &points).await?;
            info!("✅ Sample data generated for {} ({} days)", symbol, utils::fmt_count(stored));
            service.refresh_stocks().await?;
        }

        Command::Status => {
            let monitor = ConnectivityMonitor::new(store, config.store.timeout(), config.store.probe_interval());
            let state = monitor.check().await;
            service.surface().status(&state)?;
        }

        Command::Watch => {
            let monitor = ConnectivityMonitor::new(store, config.store.timeout(), config.store.probe_interval());
            let rx = monitor.subscribe();
            let probe = monitor.spawn();
            tokio::select! {
                res = service.follow_connectivity(rx) => res?,
                _ = tokio::signal::ctrl_c() => info!("Stopping"),
            }
            probe.abort();
        }
    }

    Ok(())
}
