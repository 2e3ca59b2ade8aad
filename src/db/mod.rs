use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use rusqlite::{params, Connection, Transaction};
use serde::{de::DeserializeOwned, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::warn;

pub mod models;
pub mod tracking;

use models::*;
pub use tracking::{Tables, TrackingStore};

pub const ACTIVE_TABLE: &str = "active_matches";
pub const UNRESOLVED_TABLE: &str = "unresolved_bets";
pub const RESOLVED_TABLE: &str = "resolved_bets";
pub const CONFIG_TABLE: &str = "tracker_config";

/// Row id of the single operational config entry.
const CONFIG_ROW: &str = "operational";

/// Thread-safe SQLite handle (single connection with mutex)
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open (or create) the SQLite database at the given path.
    ///
    /// A file that SQLite refuses to read is moved aside and replaced with an
    /// empty database, so the tracker can always start.
    pub fn open(path: &str) -> Result<Self> {
        match Self::open_file(path) {
            Ok(db) => Ok(db),
            Err(e) => {
                let quarantine = format!("{}.corrupt-{}", path, Utc::now().format("%Y%m%d%H%M%S"));
                warn!(
                    "Database {} is unreadable ({}); moving it to {} and starting empty",
                    path, e, quarantine
                );
                std::fs::rename(path, &quarantine)
                    .with_context(|| format!("Failed to move corrupt database {}", path))?;
                Self::open_file(path)
            }
        }
    }

    /// Private in-memory database, used by tests and dry runs.
    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn open_file(path: &str) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        let db = Database {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;
        Ok(db)
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| anyhow!("database mutex poisoned"))
    }

    /// Run schema migrations (idempotent)
    fn run_migrations(&self) -> Result<()> {
        let conn = self.conn()?;
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(())
    }

    // ── Table snapshots ──────────────────────────────────────────────────────

    /// Decode every row of `table`. Any undecodable payload fails the whole
    /// table so the caller can decide how to recover.
    pub fn load_table<T: DeserializeOwned>(&self, table: &str) -> Result<HashMap<String, T>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!("SELECT id, payload FROM {}", table))?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut out = HashMap::with_capacity(rows.len());
        for (id, payload) in rows {
            let value = serde_json::from_str(&payload)
                .with_context(|| format!("undecodable row '{}' in {}", id, table))?;
            out.insert(id, value);
        }
        Ok(out)
    }

    pub fn load_config(&self) -> Result<OperationalConfig> {
        let mut rows: HashMap<String, OperationalConfig> = self.load_table(CONFIG_TABLE)?;
        Ok(rows.remove(CONFIG_ROW).unwrap_or_default())
    }

    /// Rewrite all four tables in full within one transaction.
    pub fn save_tables(&self, tables: &Tables) -> Result<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        rewrite_table(&tx, ACTIVE_TABLE, &tables.active)?;
        rewrite_table(&tx, UNRESOLVED_TABLE, &tables.unresolved)?;
        rewrite_table(&tx, RESOLVED_TABLE, &tables.resolved)?;
        let config: HashMap<&str, &OperationalConfig> =
            HashMap::from([(CONFIG_ROW, &tables.config)]);
        rewrite_table(&tx, CONFIG_TABLE, &config)?;
        tx.commit()?;
        Ok(())
    }

    /// Store raw payload text; exists so tests can plant damaged rows.
    #[cfg(test)]
    pub fn put_raw(&self, table: &str, id: &str, payload: &str) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            &format!("INSERT OR REPLACE INTO {} (id, payload) VALUES (?1, ?2)", table),
            params![id, payload],
        )?;
        Ok(())
    }

    /// Remove a table so the next flush fails.
    #[cfg(test)]
    pub fn drop_table(&self, table: &str) -> Result<()> {
        let conn = self.conn()?;
        conn.execute_batch(&format!("DROP TABLE {}", table))?;
        Ok(())
    }

    // ── Dashboard reads ──────────────────────────────────────────────────────

    pub fn list_active(&self) -> Result<Vec<(FixtureId, TrackingRecord)>> {
        let mut rows: Vec<(FixtureId, TrackingRecord)> =
            self.load_table(ACTIVE_TABLE)?.into_iter().collect();
        rows.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(rows)
    }

    pub fn list_unresolved(&self) -> Result<Vec<(FixtureId, UnresolvedBet)>> {
        let mut rows: Vec<(FixtureId, UnresolvedBet)> =
            self.load_table(UNRESOLVED_TABLE)?.into_iter().collect();
        rows.sort_by(|a, b| b.1.placed_at.cmp(&a.1.placed_at));
        Ok(rows)
    }

    pub fn list_resolved(&self, limit: usize) -> Result<Vec<(FixtureId, ResolvedBet)>> {
        let mut rows: Vec<(FixtureId, ResolvedBet)> =
            self.load_table(RESOLVED_TABLE)?.into_iter().collect();
        rows.sort_by(|a, b| b.1.resolved_at.cmp(&a.1.resolved_at));
        rows.truncate(limit);
        Ok(rows)
    }

    pub fn get_stats(&self) -> Result<TrackerStats> {
        let count = |table: &str| -> Result<i64> {
            let conn = self.conn()?;
            let n = conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |r| r.get(0))?;
            Ok(n)
        };
        let resolved: HashMap<String, ResolvedBet> = self.load_table(RESOLVED_TABLE)?;
        let wins = resolved.values().filter(|b| b.outcome == Outcome::Win).count() as i64;
        let losses = resolved.len() as i64 - wins;
        let hit_rate = if resolved.is_empty() {
            None
        } else {
            Some(wins as f64 / resolved.len() as f64)
        };
        Ok(TrackerStats {
            active: count(ACTIVE_TABLE)?,
            unresolved: count(UNRESOLVED_TABLE)?,
            resolved: resolved.len() as i64,
            wins,
            losses,
            hit_rate,
        })
    }
}

// ── SQL helpers ────────────────────────────────────────────────────────────────

fn rewrite_table<K, V>(tx: &Transaction<'_>, table: &str, rows: &HashMap<K, V>) -> Result<()>
where
    K: AsRef<str>,
    V: Serialize,
{
    tx.execute(&format!("DELETE FROM {}", table), [])?;
    let mut stmt = tx.prepare(&format!("INSERT INTO {} (id, payload) VALUES (?1, ?2)", table))?;
    for (id, value) in rows {
        stmt.execute(params![id.as_ref(), serde_json::to_string(value)?])?;
    }
    Ok(())
}

/// SQLite schema (idempotent CREATE IF NOT EXISTS)
pub const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS active_matches (
    id      TEXT PRIMARY KEY,
    payload TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS unresolved_bets (
    id      TEXT PRIMARY KEY,
    payload TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS resolved_bets (
    id      TEXT PRIMARY KEY,
    payload TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS tracker_config (
    id      TEXT PRIMARY KEY,
    payload TEXT NOT NULL
);
"#;
