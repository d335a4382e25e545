//! Series reconciler: raw store children → chart payload.
//!
//! ## Stages
//!
//! 1. decode    — children become `StoreRecord`s; malformed values are dropped
//! 2. normalize — resolve date, price and timestamp per record
//! 3. merge     — history then forecast, stable-sorted by timestamp
//! 4. window    — keep the trailing `window_years` calendar years
//! 5. split     — actual/predicted arrays with the bridge point
//!
//! `reconcile` is a pure function of its inputs and `now`.

pub mod bridge;
pub mod normalize;
pub mod window;

use crate::models::{Child, ChartPayload, ForecastRecord, HistoricalRecord, NormalizedPoint, Origin, StoreRecord};
use chrono::{DateTime, Utc};
use tracing::debug;

use self::bridge::{order_violations, split_and_bridge};
use self::normalize::{normalize_forecast, normalize_history};
use self::window::{filter_window, window_start_ms};

/// Everything a caller needs to render (or explain) one load.
#[derive(Debug, Clone, PartialEq)]
pub struct Reconciliation {
    /// Filtered series; index-aligned with the payload arrays.
    pub series: Vec<NormalizedPoint>,
    pub payload: ChartPayload,
    pub boundary_index: usize,
    pub bridge_index: Option<usize>,
    /// Merged length before the window filter.
    pub merged_len: usize,
    /// Records dropped while decoding or normalizing.
    pub dropped: usize,
    pub order_violations: usize,
}

/// Merged series before the window filter.
#[derive(Debug, Clone, PartialEq)]
pub struct Merged {
    pub series: Vec<NormalizedPoint>,
    pub dropped: usize,
}

#[derive(Debug, Clone, Copy)]
pub struct Reconciler {
    window_years: u32,
}

impl Default for Reconciler {
    fn default() -> Self {
        Self::new(2)
    }
}

impl Reconciler {
    pub fn new(window_years: u32) -> Self {
        Self { window_years }
    }

    pub fn window_years(&self) -> u32 {
        self.window_years
    }

    /// Decode, normalize and merge both sources into one ordered series.
    pub fn merge(&self, history: &[Child], forecast: &[Child], now: DateTime<Utc>) -> Merged {
        let (hist_records, hist_bad) = decode_history(history);
        let (fc_records, fc_bad) = decode_forecast(forecast);

        let mut hist = normalize_history(&hist_records);
        sort_chronologically(&mut hist.points);

        let cursor = hist.points.last().map_or(now.timestamp_millis(), |p| p.timestamp);
        let fc = normalize_forecast(&fc_records, cursor);

        Merged {
            dropped: hist_bad + fc_bad + hist.dropped + fc.dropped,
            series: merge(hist.points, fc.points),
        }
    }

    /// Apply the trailing window and split the survivors around `now`.
    pub fn window(&self, merged: Merged, now: DateTime<Utc>) -> Reconciliation {
        let merged_len = merged.series.len();
        let series = filter_window(merged.series, window_start_ms(now, self.window_years));
        let split = split_and_bridge(&series, now.timestamp_millis());
        let violations = order_violations(&series, split.boundary_index);

        debug!(
            "reconciled {} merged → {} in window, boundary {}, {} dropped",
            merged_len,
            series.len(),
            split.boundary_index,
            merged.dropped
        );

        Reconciliation {
            series,
            payload: split.payload,
            boundary_index: split.boundary_index,
            bridge_index: split.bridge_index,
            merged_len,
            dropped: merged.dropped,
            order_violations: violations,
        }
    }

    pub fn reconcile(&self, history: &[Child], forecast: &[Child], now: DateTime<Utc>) -> Reconciliation {
        self.window(self.merge(history, forecast, now), now)
    }
}

// ── Merge ─────────────────────────────────────────────────────────────────────

fn sort_chronologically(points: &mut [NormalizedPoint]) {
    // `sort_by_key` is stable: equal timestamps keep their input order.
    points.sort_by_key(|p| p.timestamp);
}

/// History first, then forecast, stable-sorted by timestamp.
pub fn merge(history: Vec<NormalizedPoint>, forecast: Vec<NormalizedPoint>) -> Vec<NormalizedPoint> {
    let mut merged = history;
    merged.extend(forecast);
    sort_chronologically(&mut merged);
    merged
}

// ── Decoding ──────────────────────────────────────────────────────────────────

fn decode_history(children: &[Child]) -> (Vec<HistoricalRecord>, usize) {
    let mut bad = 0;
    let records = children
        .iter()
        .filter_map(|c| match StoreRecord::decode(&c.key, &c.value, Origin::Historical) {
            Ok(StoreRecord::Historical(r)) => Some(r),
            Ok(other) => {
                debug!("unexpected shape under history: {}", other.key());
                bad += 1;
                None
            }
            Err(e) => {
                debug!("{e}");
                bad += 1;
                None
            }
        })
        .collect();
    (records, bad)
}

fn decode_forecast(children: &[Child]) -> (Vec<ForecastRecord>, usize) {
    let mut bad = 0;
    let records = children
        .iter()
        .filter_map(|c| match StoreRecord::decode(&c.key, &c.value, Origin::Forecast) {
            Ok(StoreRecord::Forecast(r)) => Some(r),
            Ok(other) => {
                debug!("unexpected shape under forecast: {}", other.key());
                bad += 1;
                None
            }
            Err(e) => {
                debug!("{e}");
                bad += 1;
                None
            }
        })
        .collect();
    (records, bad)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn today(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 12, 0, 0).unwrap()
    }

    #[test]
    fn history_and_forecast_bridge_at_last_actual() {
        let history = [Child::new("-N1", json!({ "date": "2024-01-01", "price": 100 }))];
        let forecast = [Child::new("-P1", json!({ "date": "2025-01-01", "price": 120 }))];

        let r = Reconciler::default().reconcile(&history, &forecast, today(2024, 6, 1));

        assert_eq!(r.boundary_index, 1);
        assert_eq!(r.bridge_index, Some(0));
        assert_eq!(r.payload.labels, vec!["2024-01-01", "2025-01-01"]);
        assert_eq!(r.payload.actual, vec![Some(100.0), None]);
        assert_eq!(r.payload.predicted, vec![Some(100.0), Some(120.0)]);
        assert_eq!(r.order_violations, 0);
    }

    #[test]
    fn empty_inputs_give_empty_payload() {
        let r = Reconciler::default().reconcile(&[], &[], today(2024, 6, 1));
        assert!(r.payload.is_empty());
        assert!(r.payload.actual.is_empty());
        assert!(r.payload.predicted.is_empty());
        assert_eq!(r.merged_len, 0);
        assert_eq!(r.boundary_index, 0);
        assert_eq!(r.bridge_index, None);
    }

    #[test]
    fn reconcile_is_deterministic() {
        let history: Vec<Child> = (1..=28)
            .map(|d| Child::new(format!("-H{d:02}"), json!({ "date": format!("2024-02-{d:02}"), "price": d })))
            .collect();
        let forecast: Vec<Child> = (1..=5)
            .map(|i| Child::new(format!("-F{i}"), json!({ "Forecasted_Price": format!("{}.25", 30 + i) })))
            .collect();

        let now = today(2024, 2, 28);
        let a = Reconciler::default().reconcile(&history, &forecast, now);
        let b = Reconciler::default().reconcile(&history, &forecast, now);
        assert_eq!(a, b);
    }

    #[test]
    fn arrays_stay_aligned_with_series() {
        let now = today(2024, 6, 1);
        for n_hist in [0usize, 1, 3, 10] {
            for n_fc in [0usize, 1, 4] {
                let history: Vec<Child> = (0..n_hist)
                    .map(|i| Child::new(format!("-H{i}"), json!({ "date": format!("2024-05-{:02}", i + 1), "price": i })))
                    .collect();
                let forecast: Vec<Child> = (0..n_fc)
                    .map(|i| Child::new(format!("-F{i}"), json!({ "predicted_price": format!("{i}") })))
                    .collect();

                let r = Reconciler::default().reconcile(&history, &forecast, now);
                let len = r.series.len();
                assert_eq!(r.payload.labels.len(), len);
                assert_eq!(r.payload.actual.len(), len);
                assert_eq!(r.payload.predicted.len(), len);
                assert_eq!(len, n_hist + n_fc);
                for i in 0..len {
                    let a = r.payload.actual[i].is_some();
                    let p = r.payload.predicted[i].is_some();
                    if Some(i) == r.bridge_index {
                        assert!(a && p);
                    } else {
                        assert!(a ^ p, "index {i} with {n_hist}/{n_fc}");
                    }
                }
            }
        }
    }

    #[test]
    fn synthesized_forecast_dates_follow_last_history_point() {
        let history = [
            Child::new("-N2", json!({ "date": "2024-05-31", "price": 10 })),
            Child::new("-N1", json!({ "date": "2024-05-30", "price": 9 })),
        ];
        let forecast = [
            Child::new("-P1", json!({ "Forecasted_Price": "11" })),
            Child::new("-P2", json!({ "Forecasted_Price": "12" })),
        ];
        let r = Reconciler::default().reconcile(&history, &forecast, today(2024, 5, 31));

        let last_hist = normalize::parse_date_ms("2024-05-31").unwrap();
        let ts: Vec<i64> = r.series.iter().map(|p| p.timestamp).collect();
        assert_eq!(
            ts,
            vec![
                last_hist - normalize::DAY_MS,
                last_hist,
                last_hist + normalize::DAY_MS,
                last_hist + 2 * normalize::DAY_MS
            ]
        );
        assert_eq!(r.boundary_index, 2);
        assert_eq!(r.payload.predicted, vec![None, Some(10.0), Some(11.0), Some(12.0)]);
    }

    #[test]
    fn no_history_seeds_cursor_from_now() {
        let forecast = [Child::new("-P1", json!({ "price": 5 }))];
        let now = today(2024, 6, 1);
        let r = Reconciler::default().reconcile(&[], &forecast, now);
        assert_eq!(r.series[0].timestamp, now.timestamp_millis() + normalize::DAY_MS);
        assert_eq!(r.boundary_index, 0);
        assert_eq!(r.payload.actual, vec![None]);
    }

    #[test]
    fn old_and_malformed_records_are_excluded() {
        let history = [
            Child::new("-N0", json!({ "date": "2019-01-01", "price": 1 })),
            Child::new("-N1", json!("not an object")),
            Child::new("-N2", json!({ "date": "2024-01-01" })),
            Child::new("-N3", json!({ "date": "2024-02-01", "price": "77.5" })),
        ];
        let r = Reconciler::default().reconcile(&history, &[], today(2024, 6, 1));
        assert_eq!(r.merged_len, 2);
        assert_eq!(r.dropped, 2);
        assert_eq!(r.payload.labels, vec!["2024-02-01"]);
        assert_eq!(r.payload.actual, vec![Some(77.5)]);
    }

    #[test]
    fn merge_is_stable_for_equal_timestamps() {
        let p = |id: &str, origin| NormalizedPoint {
            date: "2024-01-01".into(),
            price: 1.0,
            timestamp: 0,
            id: id.into(),
            origin,
        };
        let merged = merge(vec![p("h", Origin::Historical)], vec![p("f", Origin::Forecast)]);
        let ids: Vec<&str> = merged.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["h", "f"]);
    }
}
