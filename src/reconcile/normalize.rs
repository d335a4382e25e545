//! Record normalizer: decoded store records → `NormalizedPoint`s.
//!
//! Price and timestamp resolution rules:
//!   * historical: `price` only
//!   * forecast:   `price` → `Forecasted_Price` → `predicted_price`
//!   * timestamp:  explicit `timestamp` → parsed `date` → (forecast only)
//!     running cursor + one day
//!
//! Records that cannot resolve a finite price are dropped, never raised.

use crate::models::{ForecastRecord, HistoricalRecord, NormalizedPoint, Origin, PriceField};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};
use tracing::debug;

pub const DAY_MS: i64 = 86_400_000;

/// Output of one normalization pass.
#[derive(Debug, Default)]
pub struct Normalized {
    pub points: Vec<NormalizedPoint>,
    pub dropped: usize,
}

// ── Parsers ───────────────────────────────────────────────────────────────────

/// Leading-prefix float parse: `"10.5"` → 10.5, `" 12.25 USD"` → 12.25,
/// `"abc"` → None. Non-finite results are rejected.
pub fn parse_float_prefix(s: &str) -> Option<f64> {
    let s = s.trim_start();
    let bytes = s.as_bytes();
    let mut end = 0;

    if matches!(bytes.first(), Some(b'+' | b'-')) {
        end += 1;
    }
    let int_start = end;
    while bytes.get(end).is_some_and(u8::is_ascii_digit) {
        end += 1;
    }
    let mut digits = end - int_start;

    if bytes.get(end) == Some(&b'.') {
        let frac_start = end + 1;
        let mut frac_end = frac_start;
        while bytes.get(frac_end).is_some_and(u8::is_ascii_digit) {
            frac_end += 1;
        }
        digits += frac_end - frac_start;
        end = frac_end;
    }
    if digits == 0 {
        return None;
    }

    // Exponent only counts when digits follow it.
    if matches!(bytes.get(end), Some(b'e' | b'E')) {
        let mut exp_end = end + 1;
        if matches!(bytes.get(exp_end), Some(b'+' | b'-')) {
            exp_end += 1;
        }
        let exp_digits_start = exp_end;
        while bytes.get(exp_end).is_some_and(u8::is_ascii_digit) {
            exp_end += 1;
        }
        if exp_end > exp_digits_start {
            end = exp_end;
        }
    }

    s[..end].parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Parse a calendar date (or date-time) into epoch milliseconds, UTC.
/// Bare dates resolve to midnight.
pub fn parse_date_ms(s: &str) -> Option<i64> {
    let s = s.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.timestamp_millis());
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt.and_utc().timestamp_millis());
        }
    }
    for fmt in ["%Y-%m-%d", "%Y/%m/%d", "%b %d, %Y", "%m/%d/%Y", "%d %b %Y"] {
        if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
            return Some(d.and_time(NaiveTime::default()).and_utc().timestamp_millis());
        }
    }
    None
}

fn field_value(field: &PriceField) -> Option<f64> {
    match field {
        PriceField::Number(n) => Some(*n).filter(|v| v.is_finite()),
        PriceField::Text(s) => parse_float_prefix(s),
    }
}

fn resolve_forecast_price(rec: &ForecastRecord) -> Option<f64> {
    [&rec.price, &rec.forecasted_price, &rec.predicted_price]
        .into_iter()
        .flatten()
        .find_map(field_value)
}

// ── Normalizers ───────────────────────────────────────────────────────────────

/// Historical records: a record needs a price and a resolvable timestamp.
pub fn normalize_history(records: &[HistoricalRecord]) -> Normalized {
    let mut out = Normalized::default();

    for rec in records {
        let date = rec.date.clone().unwrap_or_else(|| rec.key.clone());

        let Some(price) = rec.price.as_ref().and_then(field_value) else {
            debug!("dropping historical {}: no usable price", rec.key);
            out.dropped += 1;
            continue;
        };
        let Some(timestamp) = rec.timestamp.or_else(|| parse_date_ms(&date)) else {
            debug!("dropping historical {}: unparseable date '{}'", rec.key, date);
            out.dropped += 1;
            continue;
        };

        out.points.push(NormalizedPoint {
            date,
            price,
            timestamp,
            id: rec.key.clone(),
            origin: Origin::Historical,
        });
    }
    out
}

/// Forecast records. `cursor_ms` seeds the synthesized timestamps: each record
/// with neither `timestamp` nor a parseable date lands one day after the
/// previous synthesized one.
pub fn normalize_forecast(records: &[ForecastRecord], cursor_ms: i64) -> Normalized {
    let mut out = Normalized::default();
    let mut cursor = cursor_ms;

    for rec in records {
        let date = rec.date.clone().unwrap_or_else(|| rec.key.clone());

        let Some(price) = resolve_forecast_price(rec) else {
            debug!("dropping forecast {}: no usable price field", rec.key);
            out.dropped += 1;
            continue;
        };
        let timestamp = match rec.timestamp.or_else(|| parse_date_ms(&date)) {
            Some(ts) => ts,
            None => {
                cursor += DAY_MS;
                cursor
            }
        };

        out.points.push(NormalizedPoint {
            date,
            price,
            timestamp,
            id: rec.key.clone(),
            origin: Origin::Forecast,
        });
    }
    out
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn forecast(key: &str) -> ForecastRecord {
        ForecastRecord {
            key: key.into(),
            date: None,
            timestamp: None,
            price: None,
            forecasted_price: None,
            predicted_price: None,
        }
    }

    #[test]
    fn test_parse_float_prefix() {
        assert_eq!(parse_float_prefix("10.5"), Some(10.5));
        assert_eq!(parse_float_prefix("  12.25 USD"), Some(12.25));
        assert_eq!(parse_float_prefix("-3"), Some(-3.0));
        assert_eq!(parse_float_prefix(".5"), Some(0.5));
        assert_eq!(parse_float_prefix("1e3x"), Some(1000.0));
        assert_eq!(parse_float_prefix("7e"), Some(7.0));
        assert_eq!(parse_float_prefix("abc"), None);
        assert_eq!(parse_float_prefix("."), None);
        assert_eq!(parse_float_prefix(""), None);
        assert_eq!(parse_float_prefix("1e999"), None);
    }

    #[test]
    fn test_parse_date_ms() {
        assert_eq!(parse_date_ms("1970-01-02"), Some(DAY_MS));
        assert_eq!(parse_date_ms("1970-01-01T00:00:01Z"), Some(1_000));
        assert_eq!(parse_date_ms("1970-01-01 00:00:02"), Some(2_000));
        assert_eq!(parse_date_ms("Jan 02, 1970"), Some(DAY_MS));
        assert_eq!(parse_date_ms("-NxY3abc"), None);
    }

    #[test]
    fn forecasted_price_beats_predicted_price() {
        let mut rec = forecast("k");
        rec.date = Some("2025-01-01".into());
        rec.forecasted_price = Some(PriceField::Text("10.5".into()));
        rec.predicted_price = Some(PriceField::Text("20".into()));

        let n = normalize_forecast(&[rec], 0);
        assert_eq!(n.points[0].price, 10.5);
    }

    #[test]
    fn price_falls_through_unparseable_fields() {
        let mut rec = forecast("k");
        rec.date = Some("2025-01-01".into());
        rec.price = Some(PriceField::Text("n/a".into()));
        rec.forecasted_price = Some(PriceField::Number(f64::NAN));
        rec.predicted_price = Some(PriceField::Number(0.0));

        let n = normalize_forecast(&[rec], 0);
        assert_eq!(n.points[0].price, 0.0);
        assert_eq!(n.dropped, 0);
    }

    #[test]
    fn forecast_without_price_is_dropped() {
        let mut rec = forecast("k");
        rec.date = Some("2025-01-01".into());
        let n = normalize_forecast(&[rec], 0);
        assert!(n.points.is_empty());
        assert_eq!(n.dropped, 1);
    }

    #[test]
    fn missing_timestamps_advance_the_cursor_by_one_day() {
        let mut a = forecast("-Na");
        a.price = Some(PriceField::Number(1.0));
        let mut b = forecast("2025-03-01");
        b.price = Some(PriceField::Number(2.0));
        let mut c = forecast("-Nc");
        c.price = Some(PriceField::Number(3.0));

        let seed = 1_000;
        let n = normalize_forecast(&[a, b, c], seed);
        assert_eq!(n.points[0].timestamp, seed + DAY_MS);
        assert_eq!(n.points[0].date, "-Na");
        assert_eq!(n.points[1].timestamp, parse_date_ms("2025-03-01").unwrap());
        // Parsed dates do not move the cursor.
        assert_eq!(n.points[2].timestamp, seed + 2 * DAY_MS);
    }

    #[test]
    fn history_uses_key_as_date_and_drops_undated() {
        let recs = [
            HistoricalRecord {
                key: "2024-01-05".into(),
                date: None,
                timestamp: None,
                price: Some(PriceField::Number(101.0)),
            },
            HistoricalRecord {
                key: "-NpushKey".into(),
                date: None,
                timestamp: None,
                price: Some(PriceField::Number(99.0)),
            },
            HistoricalRecord {
                key: "-Nother".into(),
                date: Some("2024-01-06".into()),
                timestamp: None,
                price: None,
            },
        ];
        let n = normalize_history(&recs);
        assert_eq!(n.points.len(), 1);
        assert_eq!(n.points[0].date, "2024-01-05");
        assert_eq!(n.points[0].id, "2024-01-05");
        assert_eq!(n.dropped, 2);
    }

    #[test]
    fn explicit_timestamp_wins_over_date() {
        let rec = HistoricalRecord {
            key: "k".into(),
            date: Some("2024-01-05".into()),
            timestamp: Some(42),
            price: Some(PriceField::Text("5".into())),
        };
        let n = normalize_history(&[rec]);
        assert_eq!(n.points[0].timestamp, 42);
        assert_eq!(n.points[0].date, "2024-01-05");
    }
}
