//! Rendering: chart documents, formatting, and the surfaces that draw them.
//!
//! A `ChartDocument` carries the labels and two line datasets in the shape a
//! browser charting library consumes, plus the filtered series the tooltip
//! formatter indexes into. Surfaces replace whatever they showed before on
//! every call.

use crate::error::EmptyReason;
use crate::models::{ForecastModel, NormalizedPoint, StockOption};
use crate::reconcile::Reconciliation;
use crate::store::ConnectionState;
use anyhow::Result;
use serde::Serialize;
use std::io::Write;

// ── Document ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DatasetStyle {
    pub border_color: &'static str,
    pub background_color: &'static str,
    pub border_width: u32,
    pub fill: bool,
    pub tension: f64,
    pub point_radius: u32,
    pub point_hover_radius: u32,
    pub span_gaps: bool,
}

const ACTUAL_STYLE: DatasetStyle = DatasetStyle {
    border_color: "#667eea",
    background_color: "rgba(102, 126, 234, 0.1)",
    border_width: 3,
    fill: true,
    tension: 0.4,
    point_radius: 0,
    point_hover_radius: 0,
    span_gaps: false,
};

const PREDICTED_STYLE: DatasetStyle = DatasetStyle {
    border_color: "#ffeb3b",
    background_color: "rgba(255, 235, 59, 0.1)",
    border_width: 3,
    fill: true,
    tension: 0.4,
    point_radius: 0,
    point_hover_radius: 0,
    span_gaps: true,
};

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Dataset {
    pub label: String,
    pub data: Vec<Option<f64>>,
    #[serde(flatten)]
    pub style: DatasetStyle,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChartDocument {
    pub symbol: String,
    pub model: ForecastModel,
    pub title: String,
    pub subtitle: String,
    pub labels: Vec<String>,
    pub datasets: Vec<Dataset>,
    pub boundary_index: usize,
    pub bridge_index: Option<usize>,
    #[serde(skip)]
    pub series: Vec<NormalizedPoint>,
    #[serde(skip)]
    currency: String,
}

impl ChartDocument {
    pub fn build(
        symbol: &str,
        model: ForecastModel,
        rec: &Reconciliation,
        window_years: u32,
        currency: &str,
    ) -> Self {
        let first = rec.series.first().map_or("—", |p| p.date.as_str());
        let last = rec.series.last().map_or("—", |p| p.date.as_str());

        Self {
            symbol: symbol.to_string(),
            model,
            title: format!("{symbol} Stock Price Chart"),
            subtitle: format!(
                "{} data points • {first} to {last} (last {window_years} years)",
                rec.series.len()
            ),
            labels: rec.payload.labels.clone(),
            datasets: vec![
                Dataset {
                    label: format!("{symbol} Closing Price"),
                    data: rec.payload.actual.clone(),
                    style: ACTUAL_STYLE,
                },
                Dataset {
                    label: format!("{symbol} Predicted"),
                    data: rec.payload.predicted.clone(),
                    style: PREDICTED_STYLE,
                },
            ],
            boundary_index: rec.boundary_index,
            bridge_index: rec.bridge_index,
            series: rec.series.clone(),
            currency: currency.to_string(),
        }
    }

    /// Tooltip text for a hovered index into the filtered series.
    pub fn tooltip_label(&self, index: usize) -> String {
        match self.series.get(index) {
            Some(p) => format!("Close: {}", fmt_money(&self.currency, p.price)),
            None => format!("Close: {}N/A", self.currency),
        }
    }

    /// Y-axis tick text.
    pub fn tick_label(&self, value: f64) -> String {
        fmt_money(&self.currency, value)
    }
}

pub fn fmt_money(prefix: &str, value: f64) -> String {
    format!("{prefix}{value:.2}")
}

// ── Messages ──────────────────────────────────────────────────────────────────

pub fn empty_message(symbol: &str, reason: EmptyReason, window_years: u32) -> String {
    match reason {
        EmptyReason::NoRecords => format!(
            "No data available for {symbol}. Run `forecast-chart sample {symbol}` to generate some test data."
        ),
        EmptyReason::OutsideWindow => {
            format!("No data available for {symbol} in the last {window_years} years.")
        }
    }
}

pub fn status_banner(state: &ConnectionState) -> &'static str {
    match state {
        ConnectionState::Connecting => "🟡 Connecting to the database…",
        ConnectionState::Connected => "🟢 Connected to the database - Ready to use!",
        ConnectionState::Disconnected => "🔴 Disconnected from the database - Retrying...",
        ConnectionState::Error(_) => "🔴 Connection failed - Check settings below",
    }
}

pub const TROUBLESHOOTING: [&str; 4] = [
    "Check that store.database_url points at your Realtime Database (…-default-rtdb.firebaseio.com).",
    "Make sure the database rules allow reads on `stocks` and `predicted_stocks`.",
    "Verify the machine has network access and no proxy blocks the request.",
    "Use FCHART__STORE__BACKEND=local to work against the local DuckDB store instead.",
];

// ── Surfaces ──────────────────────────────────────────────────────────────────

/// Where load results end up.
pub trait RenderSurface: Send {
    fn loading(&mut self, symbol: &str, model: ForecastModel) -> Result<()>;
    fn chart(&mut self, doc: &ChartDocument) -> Result<()>;
    fn empty(&mut self, symbol: &str, message: &str) -> Result<()>;
    fn status(&mut self, state: &ConnectionState) -> Result<()>;
    fn stocks(&mut self, options: &[StockOption]) -> Result<()>;
}

impl<R: RenderSurface + ?Sized> RenderSurface for Box<R> {
    fn loading(&mut self, symbol: &str, model: ForecastModel) -> Result<()> {
        (**self).loading(symbol, model)
    }
    fn chart(&mut self, doc: &ChartDocument) -> Result<()> {
        (**self).chart(doc)
    }
    fn empty(&mut self, symbol: &str, message: &str) -> Result<()> {
        (**self).empty(symbol, message)
    }
    fn status(&mut self, state: &ConnectionState) -> Result<()> {
        (**self).status(state)
    }
    fn stocks(&mut self, options: &[StockOption]) -> Result<()> {
        (**self).stocks(options)
    }
}

/// One JSON document per line.
pub struct JsonSurface<W> {
    out: W,
}

impl<W: Write + Send> JsonSurface<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }
}

impl<W: Write + Send> RenderSurface for JsonSurface<W> {
    fn loading(&mut self, _symbol: &str, _model: ForecastModel) -> Result<()> {
        Ok(())
    }

    fn chart(&mut self, doc: &ChartDocument) -> Result<()> {
        serde_json::to_writer(&mut self.out, doc)?;
        writeln!(self.out)?;
        Ok(())
    }

    fn empty(&mut self, symbol: &str, message: &str) -> Result<()> {
        let v = serde_json::json!({ "symbol": symbol, "empty": true, "message": message });
        writeln!(self.out, "{v}")?;
        Ok(())
    }

    fn status(&mut self, state: &ConnectionState) -> Result<()> {
        let v = serde_json::json!({ "status": status_banner(state), "detail": format!("{state:?}") });
        writeln!(self.out, "{v}")?;
        Ok(())
    }

    fn stocks(&mut self, options: &[StockOption]) -> Result<()> {
        serde_json::to_writer(&mut self.out, &serde_json::json!({ "stocks": options }))?;
        writeln!(self.out)?;
        Ok(())
    }
}

/// Plain-text table of date / actual / predicted.
pub struct TerminalSurface<W> {
    out: W,
}

impl<W: Write + Send> TerminalSurface<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }
}

impl<W: Write + Send> RenderSurface for TerminalSurface<W> {
    fn loading(&mut self, symbol: &str, model: ForecastModel) -> Result<()> {
        writeln!(self.out, "Loading {symbol} ({model}) data...")?;
        Ok(())
    }

    fn chart(&mut self, doc: &ChartDocument) -> Result<()> {
        let cell = |v: Option<f64>| v.map_or_else(|| "—".to_string(), |p| doc.tick_label(p));

        writeln!(self.out, "─────────────────────────────────────────────")?;
        writeln!(self.out, "  {}", doc.title)?;
        writeln!(self.out, "  {}", doc.subtitle)?;
        writeln!(self.out, "─────────────────────────────────────────────")?;
        writeln!(self.out, "  {:<12} {:>14} {:>14}", "DATE", "ACTUAL", "PREDICTED")?;
        for (i, label) in doc.labels.iter().enumerate() {
            let actual = doc.datasets[0].data[i];
            let predicted = doc.datasets[1].data[i];
            let marker = if Some(i) == doc.bridge_index { " ◆" } else { "" };
            writeln!(
                self.out,
                "  {:<12} {:>14} {:>14}{}",
                label,
                cell(actual),
                cell(predicted),
                marker
            )?;
        }
        writeln!(self.out, "─────────────────────────────────────────────")?;
        Ok(())
    }

    fn empty(&mut self, _symbol: &str, message: &str) -> Result<()> {
        writeln!(self.out, "📊 {message}")?;
        Ok(())
    }

    fn status(&mut self, state: &ConnectionState) -> Result<()> {
        writeln!(self.out, "{}", status_banner(state))?;
        if let ConnectionState::Error(detail) = state {
            writeln!(self.out, "  ({detail})")?;
            writeln!(self.out, "Troubleshooting:")?;
            for hint in TROUBLESHOOTING {
                writeln!(self.out, "  • {hint}")?;
            }
        }
        Ok(())
    }

    fn stocks(&mut self, options: &[StockOption]) -> Result<()> {
        writeln!(self.out, "{} symbols:", options.len())?;
        for o in options {
            writeln!(self.out, "  {:<10} {}", o.symbol, o.label)?;
        }
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
