use anyhow::Result;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::db::models::*;
use crate::db::TrackingStore;
use crate::live_scores::MatchDataSource;
use crate::notify::Notifier;

use super::evaluator::{in_placement_window, BetEvaluator, Decision, QUALIFYING_SCORES};
use super::filters::{is_amateur_or_youth, passes_goal_threshold, GoalAverages};
use super::messages::escape_markdown;
use super::reconciler::{ReconcileReport, StaleBetReconciler};

/// Successful fetches a tracked fixture may be absent from before its record is dropped.
pub const ORPHAN_AFTER_CYCLES: u32 = 10;

/// Minimum gap between two operator alerts about a failing live feed.
pub const FAILURE_ALERT_INTERVAL: Duration = Duration::from_secs(30 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunnerState {
    Idle,
    Running,
}

#[derive(Debug, Clone)]
pub struct RunnerSettings {
    pub poll_interval: Duration,
    /// Combined season goal average both teams must reach; 0 disables the check
    pub min_average_goals: f64,
    pub skip_keywords: Vec<String>,
    pub orphan_after_cycles: u32,
}

#[derive(Debug, Clone, Default)]
pub struct CycleSummary {
    pub live: usize,
    pub placed: usize,
    pub resolved: usize,
    pub skipped: usize,
    pub filtered: usize,
    pub cleaned: usize,
    pub swept: usize,
    pub errors: usize,
    /// Active records after the cycle
    pub tracked: usize,
    pub reconcile: Option<ReconcileReport>,
    pub fetch_failed: bool,
    pub interrupted: bool,
}

enum Handled {
    Filtered,
    Evaluated(Decision),
}

/// Owns the tracking store and drives strictly sequential poll cycles.
pub struct CycleRunner {
    store: TrackingStore,
    source: Arc<dyn MatchDataSource>,
    notifier: Arc<dyn Notifier>,
    evaluator: BetEvaluator,
    reconciler: StaleBetReconciler,
    settings: RunnerSettings,
    state: RunnerState,
    missing_cycles: HashMap<FixtureId, u32>,
    /// Set while the live feed is failing and an alert has gone out
    failure_alerted_at: Option<Instant>,
}

impl CycleRunner {
    pub fn new(
        store: TrackingStore,
        source: Arc<dyn MatchDataSource>,
        notifier: Arc<dyn Notifier>,
        evaluator: BetEvaluator,
        reconciler: StaleBetReconciler,
        settings: RunnerSettings,
    ) -> Self {
        CycleRunner {
            store,
            source,
            notifier,
            evaluator,
            reconciler,
            settings,
            state: RunnerState::Idle,
            missing_cycles: HashMap::new(),
            failure_alerted_at: None,
        }
    }

    pub fn state(&self) -> RunnerState {
        self.state
    }

    pub fn store(&self) -> &TrackingStore {
        &self.store
    }

    /// Loop until `shutdown` flips to true. The flag is checked between
    /// cycles, between fixtures, and while sleeping.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        info!(
            "Cycle runner started (poll every {}s, source: {}, tracking {} fixture(s))",
            self.settings.poll_interval.as_secs(),
            self.source.name(),
            self.store.active_count()
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            let summary = self.run_cycle(&shutdown).await;
            if summary.interrupted {
                break;
            }
            debug!(
                "Runner {:?}; next cycle in {}s",
                self.state(),
                self.settings.poll_interval.as_secs()
            );

            tokio::select! {
                _ = tokio::time::sleep(self.settings.poll_interval) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        // Sender dropped: no interrupt can arrive any more.
                        tokio::time::sleep(self.settings.poll_interval).await;
                    }
                }
            }
        }

        info!(
            "Cycle runner stopped ({} tracked, {} open bet(s))",
            self.store.active_count(),
            self.store.unresolved_count()
        );
        Ok(())
    }

    pub async fn run_cycle(&mut self, shutdown: &watch::Receiver<bool>) -> CycleSummary {
        self.state = RunnerState::Running;
        let summary = self.cycle(shutdown).await;
        self.state = RunnerState::Idle;

        if summary.fetch_failed {
            info!("Cycle skipped; tracking {} fixture(s)", summary.tracked);
        } else {
            info!(
                "Cycle done: {} live, {} placed, {} resolved, {} skipped, {} filtered, {} cleaned, {} swept, {} error(s); tracking {} fixture(s)",
                summary.live,
                summary.placed,
                summary.resolved,
                summary.skipped,
                summary.filtered,
                summary.cleaned,
                summary.swept,
                summary.errors,
                summary.tracked
            );
        }
        summary
    }

    async fn cycle(&mut self, shutdown: &watch::Receiver<bool>) -> CycleSummary {
        let mut summary = CycleSummary::default();

        let fixtures = match self.source.fetch_live_fixtures().await {
            Ok(f) => f,
            Err(e) => {
                warn!("Live fixture fetch from {} failed: {}", self.source.name(), e);
                self.alert_fetch_failure(&e.to_string()).await;
                summary.fetch_failed = true;
                summary.tracked = self.store.active_count();
                return summary;
            }
        };
        if self.failure_alerted_at.take().is_some() {
            info!("Live fixture feed from {} recovered", self.source.name());
        }
        summary.live = fixtures.len();

        for snapshot in &fixtures {
            if *shutdown.borrow() {
                info!("Shutdown requested; stopping mid-cycle");
                summary.interrupted = true;
                summary.tracked = self.store.active_count();
                return summary;
            }

            match self.process_fixture(snapshot).await {
                Ok(Handled::Filtered) => summary.filtered += 1,
                Ok(Handled::Evaluated(decision)) => match decision {
                    Decision::Placed => summary.placed += 1,
                    Decision::Resolved(_) => summary.resolved += 1,
                    Decision::Skipped => summary.skipped += 1,
                    Decision::Cleaned => summary.cleaned += 1,
                    _ => {}
                },
                Err(e) => {
                    error!("Fixture {}: {:#}", snapshot.fixture_id, e);
                    summary.errors += 1;
                }
            }
        }

        let live_ids: HashSet<&str> = fixtures.iter().map(|f| f.fixture_id.as_str()).collect();
        summary.swept = self.sweep_orphans(&live_ids);

        match self.reconciler.run(&mut self.store).await {
            Ok(report) => summary.reconcile = Some(report),
            Err(e) => error!("Stale bet reconciliation failed: {:#}", e),
        }

        summary.tracked = self.store.active_count();
        summary
    }

    /// Tell the operator the live feed is failing, at most once per
    /// [`FAILURE_ALERT_INTERVAL`] while the outage lasts.
    async fn alert_fetch_failure(&mut self, reason: &str) {
        let due = self
            .failure_alerted_at
            .map_or(true, |at| at.elapsed() >= FAILURE_ALERT_INTERVAL);
        if !due {
            return;
        }
        let text = format!(
            "❌ *Bot Cycle Error*\nLive fixtures from {} unavailable: {}",
            self.source.name(),
            escape_markdown(reason)
        );
        if !self.notifier.send(&text).await {
            warn!("Cycle error alert not delivered");
        }
        self.failure_alerted_at = Some(Instant::now());
    }

    async fn process_fixture(&mut self, snapshot: &MatchSnapshot) -> Result<Handled> {
        let id = snapshot.fixture_id.as_str();
        let open_bet = self.store.is_unresolved(id);

        if !open_bet && is_amateur_or_youth(snapshot, &self.settings.skip_keywords) {
            return Ok(Handled::Filtered);
        }

        let record = self.store.get_active(id);
        let mut averages = None;
        // Season stats are only worth fetching when the score could qualify.
        if !open_bet
            && in_placement_window(snapshot, record.as_ref())
            && QUALIFYING_SCORES.contains(&snapshot.score().as_str())
        {
            averages = self.goal_averages(snapshot).await;
            if !passes_goal_threshold(averages.as_ref(), self.settings.min_average_goals) {
                info!(
                    "Fixture {} ({}) below goal average threshold {:.2} ({}); skipped for this match",
                    id,
                    snapshot.match_name(),
                    self.settings.min_average_goals,
                    averages
                        .map(|a| format!("{:.2}", a.combined()))
                        .unwrap_or_else(|| "no stats".into())
                );
                let mut record = record.unwrap_or_default();
                record.bet_placed = true;
                self.store.set_active(id, record)?;
                return Ok(Handled::Filtered);
            }
        }

        let decision = self.evaluator.evaluate(&mut self.store, snapshot, averages).await?;
        debug!("Fixture {} [{}]: {:?}", id, snapshot.status, decision);
        Ok(Handled::Evaluated(decision))
    }

    async fn goal_averages(&self, snapshot: &MatchSnapshot) -> Option<GoalAverages> {
        let (home, away, tournament) = match (
            snapshot.home_team_id,
            snapshot.away_team_id,
            snapshot.tournament_id,
        ) {
            (Some(h), Some(a), Some(t)) => (h, a, t),
            _ => {
                debug!("Fixture {} lacks team/tournament ids; no goal averages", snapshot.fixture_id);
                return None;
            }
        };

        let home_stats = self.team_average(home, tournament).await?;
        let away_stats = self.team_average(away, tournament).await?;
        Some(GoalAverages {
            home: home_stats,
            away: away_stats,
        })
    }

    async fn team_average(&self, team_id: i64, tournament_id: i64) -> Option<f64> {
        match self.source.fetch_team_season_stats(team_id, tournament_id).await {
            Ok(Some(stats)) => Some(stats.total_average_goals),
            Ok(None) => {
                debug!("No season stats for team {} in tournament {}", team_id, tournament_id);
                None
            }
            Err(e) => {
                warn!("Season stats for team {} failed: {}", team_id, e);
                None
            }
        }
    }

    /// Drop records whose fixture has vanished from the live feed. Records
    /// holding an open bet are kept for the reconciler.
    fn sweep_orphans(&mut self, live_ids: &HashSet<&str>) -> usize {
        self.missing_cycles.retain(|id, _| !live_ids.contains(id.as_str()));

        let mut swept = 0;
        for id in self.store.active_ids() {
            if live_ids.contains(id.as_str()) {
                continue;
            }
            let missed = self.missing_cycles.entry(id.clone()).or_insert(0);
            *missed += 1;
            if *missed < self.settings.orphan_after_cycles || self.store.is_unresolved(&id) {
                continue;
            }
            match self.store.delete_active(&id) {
                Ok(()) => {
                    debug!("Fixture {} left the live feed; record dropped", id);
                    self.missing_cycles.remove(&id);
                    swept += 1;
                }
                Err(e) => warn!("Failed to drop orphaned record {}: {:#}", id, e),
            }
        }
        swept
    }
}
