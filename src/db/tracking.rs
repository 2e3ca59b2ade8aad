//! Durable fixture tracking tables.
//!
//! The store keeps the four logical tables in memory and rewrites all of them
//! to SQLite before any mutating call returns. Mutations are staged on a copy
//! and only swapped in once the write has committed, so a failed flush leaves
//! both memory and disk on the previous state.

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use tracing::{info, warn};

use super::models::*;
use super::{Database, ACTIVE_TABLE, RESOLVED_TABLE, UNRESOLVED_TABLE};

#[derive(Debug, Clone, Default)]
pub struct Tables {
    pub active: HashMap<FixtureId, TrackingRecord>,
    pub unresolved: HashMap<FixtureId, UnresolvedBet>,
    pub resolved: HashMap<FixtureId, ResolvedBet>,
    pub config: OperationalConfig,
}

pub struct TrackingStore {
    db: Database,
    tables: Tables,
}

impl TrackingStore {
    /// Load every table from `db`. A table that cannot be read starts empty.
    pub fn load(db: Database) -> Self {
        let config = match db.load_config() {
            Ok(c) => c,
            Err(e) => {
                warn!("Operational config unreadable, resetting: {:#}", e);
                OperationalConfig::default()
            }
        };
        let tables = Tables {
            active: load_or_empty(&db, ACTIVE_TABLE),
            unresolved: load_or_empty(&db, UNRESOLVED_TABLE),
            resolved: load_or_empty(&db, RESOLVED_TABLE),
            config,
        };
        info!(
            "Tracking store loaded: {} active, {} unresolved, {} resolved",
            tables.active.len(),
            tables.unresolved.len(),
            tables.resolved.len()
        );
        TrackingStore { db, tables }
    }

    pub fn in_memory() -> Result<Self> {
        Ok(Self::load(Database::open_in_memory()?))
    }

    /// Handle to the backing database, shared with read-only consumers.
    pub fn db(&self) -> &Database {
        &self.db
    }

    fn mutate<F>(&mut self, f: F) -> Result<()>
    where
        F: FnOnce(&mut Tables),
    {
        let mut staged = self.tables.clone();
        f(&mut staged);
        self.db.save_tables(&staged)?;
        self.tables = staged;
        Ok(())
    }

    // ── Active match state ───────────────────────────────────────────────────

    pub fn get_active(&self, fixture_id: &str) -> Option<TrackingRecord> {
        self.tables.active.get(fixture_id).cloned()
    }

    pub fn set_active(&mut self, fixture_id: &str, record: TrackingRecord) -> Result<()> {
        self.mutate(|t| {
            t.active.insert(fixture_id.to_string(), record);
        })
    }

    pub fn delete_active(&mut self, fixture_id: &str) -> Result<()> {
        if !self.tables.active.contains_key(fixture_id) {
            return Ok(());
        }
        self.mutate(|t| {
            t.active.remove(fixture_id);
        })
    }

    pub fn active_ids(&self) -> Vec<FixtureId> {
        self.tables.active.keys().cloned().collect()
    }

    pub fn active_count(&self) -> usize {
        self.tables.active.len()
    }

    // ── Bets ─────────────────────────────────────────────────────────────────

    pub fn is_unresolved(&self, fixture_id: &str) -> bool {
        self.tables.unresolved.contains_key(fixture_id)
    }

    pub fn get_unresolved(&self, fixture_id: &str) -> Option<UnresolvedBet> {
        self.tables.unresolved.get(fixture_id).cloned()
    }

    pub fn unresolved_count(&self) -> usize {
        self.tables.unresolved.len()
    }

    /// Open a bet stamped with the current time.
    ///
    /// The active record flips to `unresolved` with the same target score in
    /// the same write. Calling this twice overwrites the first bet, so callers
    /// check [`Self::is_unresolved`] first.
    pub fn add_unresolved(&mut self, fixture_id: &str, details: BetDetails) -> Result<()> {
        self.add_unresolved_at(fixture_id, details, Utc::now())
    }

    pub fn add_unresolved_at(
        &mut self,
        fixture_id: &str,
        details: BetDetails,
        placed_at: DateTime<Utc>,
    ) -> Result<()> {
        self.mutate(|t| {
            t.active.insert(
                fixture_id.to_string(),
                TrackingRecord {
                    bet_placed: true,
                    placed_score: Some(details.placed_score.clone()),
                    bet_status: BetStatus::Unresolved,
                },
            );
            t.unresolved
                .insert(fixture_id.to_string(), UnresolvedBet { details, placed_at });
        })
    }

    /// Move a bet from the unresolved table to the resolved table.
    ///
    /// Either both tables change or neither does. An active record that is
    /// still marked `unresolved` is flipped to `resolved` in the same write.
    pub fn move_to_resolved(
        &mut self,
        fixture_id: &str,
        bet: UnresolvedBet,
        outcome: Outcome,
    ) -> Result<()> {
        self.mutate(|t| {
            t.unresolved.remove(fixture_id);
            if let Some(record) = t.active.get_mut(fixture_id) {
                if record.bet_status == BetStatus::Unresolved {
                    record.bet_status = BetStatus::Resolved;
                }
            }
            t.resolved.insert(
                fixture_id.to_string(),
                ResolvedBet {
                    bet,
                    outcome,
                    resolved_at: Utc::now(),
                },
            );
        })
    }

    #[cfg(test)]
    pub fn get_resolved(&self, fixture_id: &str) -> Option<ResolvedBet> {
        self.tables.resolved.get(fixture_id).cloned()
    }

    /// Open bets placed more than `wait_minutes` ago.
    pub fn list_stale_unresolved(&self, wait_minutes: i64) -> HashMap<FixtureId, UnresolvedBet> {
        self.list_stale_unresolved_at(wait_minutes, Utc::now())
    }

    pub fn list_stale_unresolved_at(
        &self,
        wait_minutes: i64,
        now: DateTime<Utc>,
    ) -> HashMap<FixtureId, UnresolvedBet> {
        // A wait too large to represent means nothing can be stale yet.
        let Some(cutoff) = Duration::try_minutes(wait_minutes).and_then(|d| now.checked_sub_signed(d))
        else {
            return HashMap::new();
        };
        self.tables
            .unresolved
            .iter()
            .filter(|(_, bet)| bet.placed_at < cutoff)
            .map(|(id, bet)| (id.clone(), bet.clone()))
            .collect()
    }

    // ── Operational config ───────────────────────────────────────────────────

    pub fn last_reconciliation_call(&self) -> Option<DateTime<Utc>> {
        self.tables.config.last_reconciliation_call
    }

    pub fn set_last_reconciliation_call(&mut self, at: DateTime<Utc>) -> Result<()> {
        self.mutate(|t| {
            t.config.last_reconciliation_call = Some(at);
        })
    }
}

fn load_or_empty<T: DeserializeOwned>(db: &Database, table: &str) -> HashMap<FixtureId, T> {
    match db.load_table(table) {
        Ok(rows) => rows,
        Err(e) => {
            warn!("Table {} unreadable, starting empty: {:#}", table, e);
            HashMap::new()
        }
    }
}
