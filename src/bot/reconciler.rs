use anyhow::Result;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::db::models::*;
use crate::db::TrackingStore;
use crate::error::FetchError;
use crate::live_scores::MatchDataSource;
use crate::notify::Notifier;
use crate::retry::{with_retry, RetryConfig};

use super::messages;

#[derive(Debug, Clone)]
pub struct ReconcilerSettings {
    /// Minutes an open bet may wait for its halftime before it counts as stale
    pub stale_wait_minutes: i64,
    /// Minimum seconds between two reconciliation batches hitting the source
    pub call_interval_secs: i64,
    pub retry: RetryConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub stale: usize,
    pub resolved: usize,
    pub deferred: usize,
    pub failed: usize,
    pub rate_limited: bool,
}

/// Resolves open bets whose halftime the poller never saw, using the
/// source's authoritative final result.
pub struct StaleBetReconciler {
    source: Arc<dyn MatchDataSource>,
    notifier: Arc<dyn Notifier>,
    settings: ReconcilerSettings,
}

impl StaleBetReconciler {
    pub fn new(
        source: Arc<dyn MatchDataSource>,
        notifier: Arc<dyn Notifier>,
        settings: ReconcilerSettings,
    ) -> Self {
        StaleBetReconciler {
            source,
            notifier,
            settings,
        }
    }

    pub async fn run(&self, store: &mut TrackingStore) -> Result<ReconcileReport> {
        self.run_at(store, Utc::now()).await
    }

    pub async fn run_at(&self, store: &mut TrackingStore, now: DateTime<Utc>) -> Result<ReconcileReport> {
        let mut report = ReconcileReport::default();

        let stale = store.list_stale_unresolved_at(self.settings.stale_wait_minutes, now);
        if stale.is_empty() {
            return Ok(report);
        }
        report.stale = stale.len();

        if let Some(last) = store.last_reconciliation_call() {
            let since = (now - last).num_seconds();
            if since < self.settings.call_interval_secs {
                info!(
                    "{} stale bet(s) waiting; next reconciliation call allowed in {}s",
                    stale.len(),
                    self.settings.call_interval_secs - since
                );
                report.rate_limited = true;
                return Ok(report);
            }
        }

        info!("Reconciling {} stale bet(s)", stale.len());
        let mut ids: Vec<_> = stale.into_iter().collect();
        ids.sort_by(|a, b| a.1.placed_at.cmp(&b.1.placed_at));

        let mut any_fetched = false;
        for (id, bet) in ids {
            let fetched = match self.fetch_with_recovery(&id).await {
                Ok(f) => f,
                Err(e) => {
                    warn!("Stale bet {}: final result unavailable this cycle: {}", id, e);
                    report.failed += 1;
                    continue;
                }
            };
            any_fetched = true;

            let snapshot = match fetched {
                Some(s) => s,
                None => {
                    warn!("Stale bet {}: fixture unknown to {}", id, self.source.name());
                    report.deferred += 1;
                    continue;
                }
            };

            let status = snapshot.canonical_status();
            if status != CanonicalStatus::Finished {
                info!("Stale bet {}: fixture still {} ({}), deferring", id, status, snapshot.status);
                report.deferred += 1;
                continue;
            }

            match self.resolve(store, &id, bet, &snapshot).await {
                Ok(true) => report.resolved += 1,
                Ok(false) => report.deferred += 1,
                Err(e) => {
                    error!("Stale bet {}: failed to record resolution: {:#}", id, e);
                    report.failed += 1;
                }
            }
        }

        if any_fetched {
            if let Err(e) = store.set_last_reconciliation_call(now) {
                error!("Failed to persist reconciliation timestamp: {:#}", e);
            }
        }

        info!(
            "Reconciliation done: {} resolved, {} deferred, {} failed",
            report.resolved, report.deferred, report.failed
        );
        Ok(report)
    }

    /// Retry with backoff; once attempts are exhausted, rebuild the client and
    /// try one last time.
    async fn fetch_with_recovery(&self, fixture_id: &str) -> Result<Option<MatchSnapshot>, FetchError> {
        let op = format!("fetch fixture {}", fixture_id);
        match with_retry(&self.settings.retry, &op, || self.source.fetch_fixture_by_id(fixture_id)).await {
            Ok(snapshot) => return Ok(snapshot),
            Err(e) => warn!("{} exhausted retries ({}); recreating {} client", op, e, self.source.name()),
        }
        if let Err(e) = self.source.recreate().await {
            warn!("Recreating {} client failed: {}", self.source.name(), e);
        }
        self.source.fetch_fixture_by_id(fixture_id).await
    }

    /// Returns `Ok(false)` when the notification could not be delivered; the
    /// bet then stays open for the next eligible cycle.
    async fn resolve(
        &self,
        store: &mut TrackingStore,
        fixture_id: &str,
        bet: UnresolvedBet,
        snapshot: &MatchSnapshot,
    ) -> Result<bool> {
        let final_score = snapshot.score();
        let outcome = Outcome::decide(&final_score, &bet.details.placed_score);
        let text = messages::resolution(&bet.details, "Final score", &final_score, outcome);

        if !self.notifier.send(&text).await {
            warn!("Stale bet {}: resolution not delivered, keeping it open", fixture_id);
            return Ok(false);
        }

        store.move_to_resolved(fixture_id, bet, outcome)?;
        store.delete_active(fixture_id)?;
        info!(
            "Stale bet {} resolved from final result: {} (final {})",
            fixture_id, outcome, final_score
        );
        Ok(true)
    }
}
