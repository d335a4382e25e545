use crate::models::{ChartPayload, NormalizedPoint, Origin};

/// Dual-series split of a filtered series.
#[derive(Debug, Clone, PartialEq)]
pub struct Split {
    pub payload: ChartPayload,
    /// First index strictly in the future; `len` when there is none.
    pub boundary_index: usize,
    /// Index whose predicted value was back-filled, if any.
    pub bridge_index: Option<usize>,
}

pub fn boundary_index(series: &[NormalizedPoint], now_ms: i64) -> usize {
    series
        .iter()
        .position(|p| p.timestamp > now_ms)
        .unwrap_or(series.len())
}

/// Build aligned `actual` / `predicted` arrays. The point just before the
/// boundary is copied into `predicted` so the forecast line starts on the
/// last real price.
pub fn split_and_bridge(series: &[NormalizedPoint], now_ms: i64) -> Split {
    let boundary = boundary_index(series, now_ms);

    let labels = series.iter().map(|p| p.date.clone()).collect();
    let actual: Vec<Option<f64>> = series
        .iter()
        .enumerate()
        .map(|(i, p)| (i < boundary).then_some(p.price))
        .collect();
    let mut predicted: Vec<Option<f64>> = series
        .iter()
        .enumerate()
        .map(|(i, p)| (i >= boundary).then_some(p.price))
        .collect();

    let bridge_index = (boundary > 0 && boundary < series.len()).then(|| boundary - 1);
    if let Some(i) = bridge_index {
        predicted[i] = actual[i];
    }

    Split {
        payload: ChartPayload { labels, actual, predicted },
        boundary_index: boundary,
        bridge_index,
    }
}

/// Points on the wrong side of the boundary: history plotted as forecast,
/// or forecast plotted as history.
pub fn order_violations(series: &[NormalizedPoint], boundary: usize) -> usize {
    series
        .iter()
        .enumerate()
        .filter(|(i, p)| match p.origin {
            Origin::Historical => *i >= boundary,
            Origin::Forecast => *i < boundary,
        })
        .count()
}
