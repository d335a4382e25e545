//! DuckDB-backed store with the same path layout as the hosted database.
//! Every leaf child is one row keyed by `(path, key)`.

use super::KvStore;
use crate::error::{ChartError, ChartResult};
use crate::models::Child;
use async_trait::async_trait;
use chrono::Utc;
use duckdb::{Connection, params};
use serde_json::Value;
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::info;

// ── Schema ────────────────────────────────────────────────────────────────────

const DDL: &str = r#"
CREATE TABLE IF NOT EXISTS nodes (
    path        VARCHAR   NOT NULL,
    key         VARCHAR   NOT NULL,
    -- JSON text of the child value
    value       VARCHAR   NOT NULL,
    created_at  TIMESTAMP NOT NULL,
    PRIMARY KEY (path, key)
);

CREATE INDEX IF NOT EXISTS idx_nodes_path ON nodes (path);
"#;

// ── Push keys ─────────────────────────────────────────────────────────────────

const PUSH_CHARS: &[u8; 64] = b"-0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ_abcdefghijklmnopqrstuvwxyz";

/// 20-char key: 8 chars of epoch millis then 12 chars of a per-store
/// sequence, both big-endian in an alphabet whose byte order matches its
/// numeric order. Keys sort in creation order.
pub fn push_key(millis: u64, seq: u64) -> String {
    fn encode(mut n: u64, width: usize, out: &mut Vec<u8>) {
        let start = out.len();
        for _ in 0..width {
            out.push(PUSH_CHARS[(n % 64) as usize]);
            n /= 64;
        }
        out[start..].reverse();
    }
    let mut buf = Vec::with_capacity(20);
    encode(millis, 8, &mut buf);
    encode(seq, 12, &mut buf);
    // Alphabet is ASCII.
    String::from_utf8_lossy(&buf).into_owned()
}

// ── Store ─────────────────────────────────────────────────────────────────────

pub struct LocalStore {
    conn: Mutex<Connection>,
    seq: AtomicU64,
}

impl LocalStore {
    pub fn open(path: &Path) -> ChartResult<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| ChartError::Store(format!("could not create dir {parent:?}: {e}")))?;
        }
        Self::init(Connection::open(path)?)
    }

    pub fn open_in_memory() -> ChartResult<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> ChartResult<Self> {
        conn.execute_batch(DDL)?;
        let rows: i64 = conn.query_row("SELECT COUNT(*) FROM nodes", [], |r| r.get(0))?;
        info!("Local store ready ({rows} nodes)");
        Ok(Self {
            conn: Mutex::new(conn),
            seq: AtomicU64::new(0),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn next_key(&self) -> String {
        let millis = u64::try_from(Utc::now().timestamp_millis()).unwrap_or(0);
        push_key(millis, self.seq.fetch_add(1, Ordering::Relaxed))
    }
}

fn normalise(path: &str) -> &str {
    path.trim_matches('/')
}

#[async_trait]
impl KvStore for LocalStore {
    fn name(&self) -> &'static str {
        "local"
    }

    async fn read(&self, path: &str) -> ChartResult<Vec<Child>> {
        let conn = self.conn();
        let mut stmt = conn.prepare("SELECT key, value FROM nodes WHERE path = ? ORDER BY key")?;
        let rows = stmt
            .query_map(params![normalise(path)], |r| Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(key, raw)| Ok::<_, ChartError>(Child::new(key, serde_json::from_str(&raw)?)))
            .collect()
    }

    async fn list_keys(&self, path: &str) -> ChartResult<Vec<String>> {
        let base = normalise(path);
        let prefix = if base.is_empty() { String::new() } else { format!("{base}/") };

        let conn = self.conn();
        let mut stmt = conn.prepare("SELECT DISTINCT path, key FROM nodes WHERE path = ? OR starts_with(path, ?)")?;
        let rows = stmt
            .query_map(params![base, prefix], |r| Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;

        let mut keys = BTreeSet::new();
        for (node_path, key) in rows {
            if node_path == base {
                keys.insert(key);
            } else if let Some(rest) = node_path.strip_prefix(&prefix) {
                if let Some(first) = rest.split('/').next().filter(|s| !s.is_empty()) {
                    keys.insert(first.to_string());
                }
            }
        }
        Ok(keys.into_iter().collect())
    }

    async fn exists(&self, path: &str) -> ChartResult<bool> {
        let base = normalise(path);
        let n: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM nodes WHERE path = ? OR starts_with(path, ?)",
            params![base, format!("{base}/")],
            |r| r.get(0),
        )?;
        Ok(n > 0)
    }

    async fn remove(&self, path: &str) -> ChartResult<()> {
        let base = normalise(path);
        let removed = self.conn().execute(
            "DELETE FROM nodes WHERE path = ? OR starts_with(path, ?)",
            params![base, format!("{base}/")],
        )?;
        info!("Removed {} node(s) under {}", removed, base);
        Ok(())
    }

    async fn push_child(&self, path: &str, value: &Value) -> ChartResult<String> {
        let key = self.next_key();
        self.conn().execute(
            "INSERT INTO nodes (path, key, value, created_at) VALUES (?, ?, ?, ?)",
            params![normalise(path), key, value.to_string(), Utc::now().naive_utc()],
        )?;
        Ok(key)
    }

    async fn probe(&self) -> ChartResult<()> {
        let one: i32 = self.conn().query_row("SELECT 1", [], |r| r.get(0))?;
        if one == 1 {
            Ok(())
        } else {
            Err(ChartError::Connectivity("local store returned an unexpected probe result".into()))
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
