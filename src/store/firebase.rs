//! Firebase Realtime Database over its REST interface.
//!
//! `GET  {base}/{path}.json`               → subtree (object keyed by child)
//! `GET  {base}/{path}.json?shallow=true`  → child keys mapped to `true`
//! `POST {base}/{path}.json`               → `{"name": "<push key>"}`
//! `DELETE {base}/{path}.json`

use super::KvStore;
use crate::error::{ChartError, ChartResult};
use crate::models::Child;
use async_trait::async_trait;
use reqwest::{Response, StatusCode};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;
use url::Url;

pub struct FirebaseStore {
    client: reqwest::Client,
    base: Url,
}

impl FirebaseStore {
    pub fn new(database_url: &str, timeout_secs: u64) -> ChartResult<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("forecast-chart/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(timeout_secs))
            .gzip(true)
            .build()?;
        Ok(Self {
            client,
            base: base_url(database_url)?,
        })
    }

    fn url(&self, path: &str, shallow: bool) -> ChartResult<Url> {
        node_url(&self.base, path, shallow)
    }

    async fn get_json(&self, path: &str, shallow: bool) -> ChartResult<Value> {
        let url = self.url(path, shallow)?;
        debug!("GET {}", url);
        let resp = check(self.client.get(url).send().await?).await?;
        Ok(resp.json().await?)
    }
}

/// Normalise the configured database URL so relative joins land under it.
fn base_url(database_url: &str) -> ChartResult<Url> {
    let mut s = database_url.trim().to_string();
    if !s.ends_with('/') {
        s.push('/');
    }
    Url::parse(&s).map_err(|e| ChartError::Store(format!("invalid database URL '{database_url}': {e}")))
}

fn node_url(base: &Url, path: &str, shallow: bool) -> ChartResult<Url> {
    let path = path.trim_matches('/');
    let mut url = base
        .join(&format!("{path}.json"))
        .map_err(|e| ChartError::Store(format!("invalid path '{path}': {e}")))?;
    if shallow {
        url.query_pairs_mut().append_pair("shallow", "true");
    }
    Ok(url)
}

async fn check(resp: Response) -> ChartResult<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(match status {
        StatusCode::SERVICE_UNAVAILABLE | StatusCode::GATEWAY_TIMEOUT | StatusCode::BAD_GATEWAY => {
            ChartError::Connectivity(format!("HTTP {status}"))
        }
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            ChartError::Store(format!("permission denied (HTTP {status}): check database rules"))
        }
        _ => ChartError::Store(format!("HTTP {status}: {}", body.trim())),
    })
}

/// Children of a subtree value, in the database's key order. Arrays come back when every
/// key is a small integer; holes are `null` and skipped.
pub fn children_of(value: Value) -> Vec<Child> {
    let mut children: Vec<Child> = match value {
        Value::Object(map) => map.into_iter().map(|(k, v)| Child::new(k, v)).collect(),
        Value::Array(items) => items
            .into_iter()
            .enumerate()
            .filter(|(_, v)| !v.is_null())
            .map(|(i, v)| Child::new(i.to_string(), v))
            .collect(),
        _ => Vec::new(),
    };
    children.sort_by(|a, b| key_order(&a.key).cmp(&key_order(&b.key)));
    children
}

/// The database's key order: integer-like keys first, numerically, then the
/// rest lexically.
fn key_order(key: &str) -> (bool, i64, &str) {
    match key.parse::<i64>() {
        Ok(n) => (false, n, key),
        Err(_) => (true, 0, key),
    }
}

#[async_trait]
impl KvStore for FirebaseStore {
    fn name(&self) -> &'static str {
        "firebase"
    }

    async fn read(&self, path: &str) -> ChartResult<Vec<Child>> {
        Ok(children_of(self.get_json(path, false).await?))
    }

    async fn list_keys(&self, path: &str) -> ChartResult<Vec<String>> {
        let value = self.get_json(path, true).await?;
        Ok(children_of(value).into_iter().map(|c| c.key).collect())
    }

    async fn exists(&self, path: &str) -> ChartResult<bool> {
        Ok(!self.get_json(path, true).await?.is_null())
    }

    async fn remove(&self, path: &str) -> ChartResult<()> {
        let url = self.url(path, false)?;
        debug!("DELETE {}", url);
        check(self.client.delete(url).send().await?).await?;
        Ok(())
    }

    async fn push_child(&self, path: &str, value: &Value) -> ChartResult<String> {
        let url = self.url(path, false)?;
        let resp = check(self.client.post(url).json(value).send().await?).await?;
        let body: Value = resp.json().await?;
        body.get("name")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| ChartError::Store(format!("push to {path} returned no key: {body}")))
    }

    async fn probe(&self) -> ChartResult<()> {
        self.get_json("", true).await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn node_urls_append_json_suffix() {
        let base = base_url("https://demo-default-rtdb.firebaseio.com").unwrap();
        assert_eq!(
            node_url(&base, "stocks/AAPL", false).unwrap().as_str(),
            "https://demo-default-rtdb.firebaseio.com/stocks/AAPL.json"
        );
        assert_eq!(
            node_url(&base, "/stocks/", true).unwrap().as_str(),
            "https://demo-default-rtdb.firebaseio.com/stocks.json?shallow=true"
        );
        assert_eq!(
            node_url(&base, "", true).unwrap().as_str(),
            "https://demo-default-rtdb.firebaseio.com/.json?shallow=true"
        );
    }

    #[test]
    fn invalid_base_url_is_a_store_error() {
        assert!(matches!(base_url("not a url"), Err(ChartError::Store(_))));
    }

    #[test]
    fn object_children_sort_by_key() {
        let v = json!({ "-Nb": { "price": 2 }, "-Na": { "price": 1 } });
        let keys: Vec<String> = children_of(v).into_iter().map(|c| c.key).collect();
        assert_eq!(keys, vec!["-Na", "-Nb"]);
    }

    #[test]
    fn array_children_skip_holes_and_sort_numerically() {
        let mut items = vec![Value::Null; 12];
        items[2] = json!({ "price": 2 });
        items[10] = json!({ "price": 10 });
        let keys: Vec<String> = children_of(Value::Array(items)).into_iter().map(|c| c.key).collect();
        assert_eq!(keys, vec!["2", "10"]);
    }

    #[test]
    fn mixed_keys_put_integers_first_in_numeric_order() {
        let v = json!({ "b": 1, "10": 1, "-Na": 1, "9": 1, "-3": 1 });
        let keys: Vec<String> = children_of(v).into_iter().map(|c| c.key).collect();
        assert_eq!(keys, vec!["-3", "9", "10", "-Na", "b"]);
    }

    #[test]
    fn null_and_scalars_have_no_children() {
        assert!(children_of(Value::Null).is_empty());
        assert!(children_of(json!(true)).is_empty());
    }
}
