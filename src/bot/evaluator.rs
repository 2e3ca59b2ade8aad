//! Per-fixture bet state machine.
//!
//! ```text
//!  none ──(1H, 36'/37', level score 1-1/2-2/3-3)──▶ unresolved ──(HT)──▶ resolved
//!   │                                                   │
//!   └──(1H, 36'/37', other score)──▶ none, bet_placed    └──(FT, missed HT)──▶ left for reconciler
//! ```
//!
//! Store mutations always complete before the notification for them is sent.

use anyhow::Result;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::db::models::*;
use crate::db::TrackingStore;
use crate::notify::Notifier;

use super::filters::GoalAverages;
use super::messages;

pub const PLACEMENT_MINUTES: [i32; 2] = [36, 37];
pub const QUALIFYING_SCORES: [&str; 3] = ["1-1", "2-2", "3-3"];

/// What the evaluator did with one snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Status outside the tracked phases
    Ignored,
    /// Record exists (or was created) but no rule fired
    Watching,
    Placed,
    /// Placement window reached with a non-qualifying score
    Skipped,
    /// An open bet already existed for the fixture
    AlreadyOpen,
    Resolved(Outcome),
    Cleaned,
    /// Finished while the bet is still open
    AwaitingReconciliation,
}

/// True when the next evaluation of `snapshot` would run the placement rule.
pub fn in_placement_window(snapshot: &MatchSnapshot, record: Option<&TrackingRecord>) -> bool {
    snapshot.canonical_status() == CanonicalStatus::FirstHalf
        && snapshot.minute.is_some_and(|m| PLACEMENT_MINUTES.contains(&m))
        && !record.is_some_and(|r| r.bet_placed)
}

pub struct BetEvaluator {
    notifier: Arc<dyn Notifier>,
}

impl BetEvaluator {
    pub fn new(notifier: Arc<dyn Notifier>) -> Self {
        BetEvaluator { notifier }
    }

    pub async fn evaluate(
        &self,
        store: &mut TrackingStore,
        snapshot: &MatchSnapshot,
        averages: Option<GoalAverages>,
    ) -> Result<Decision> {
        let id = snapshot.fixture_id.as_str();
        let status = snapshot.canonical_status();
        let existing = store.get_active(id);

        let tracked_phase = status.is_live() || status == CanonicalStatus::HalfTime;
        let cleanup_phase = status == CanonicalStatus::Finished && existing.is_some();
        if !tracked_phase && !cleanup_phase {
            return Ok(Decision::Ignored);
        }

        let record = match existing {
            Some(r) => r,
            None => {
                let record = TrackingRecord::default();
                store.set_active(id, record.clone())?;
                debug!("Tracking fixture {} ({})", id, snapshot.match_name());
                record
            }
        };

        if in_placement_window(snapshot, Some(&record)) {
            return self.place(store, snapshot, record, averages).await;
        }

        if status == CanonicalStatus::HalfTime && record.bet_status == BetStatus::Unresolved {
            return self.resolve_at_halftime(store, snapshot, &record).await;
        }

        if status == CanonicalStatus::Finished {
            if record.bet_status == BetStatus::Unresolved {
                info!(
                    "Fixture {} finished with open bet (halftime not observed); leaving for reconciliation",
                    id
                );
                return Ok(Decision::AwaitingReconciliation);
            }
            store.delete_active(id)?;
            debug!("Fixture {} finished; tracking record removed", id);
            return Ok(Decision::Cleaned);
        }

        Ok(Decision::Watching)
    }

    async fn place(
        &self,
        store: &mut TrackingStore,
        snapshot: &MatchSnapshot,
        mut record: TrackingRecord,
        averages: Option<GoalAverages>,
    ) -> Result<Decision> {
        let id = snapshot.fixture_id.as_str();

        if let Some(open) = store.get_unresolved(id) {
            record.bet_placed = true;
            record.placed_score = Some(open.details.placed_score);
            record.bet_status = BetStatus::Unresolved;
            store.set_active(id, record)?;
            info!("Fixture {} already has an open bet; placement skipped", id);
            return Ok(Decision::AlreadyOpen);
        }

        let score = snapshot.score();
        if !QUALIFYING_SCORES.contains(&score.as_str()) {
            record.bet_placed = true;
            store.set_active(id, record)?;
            info!(
                "Fixture {} at {:?}' is {}; not a qualifying score, skipped for this match",
                id, snapshot.minute, score
            );
            return Ok(Decision::Skipped);
        }

        store.add_unresolved(id, BetDetails::from_snapshot(snapshot, BetType::Regular))?;
        info!(
            "Bet placed on fixture {} ({}) at {:?}' with score {}",
            id,
            snapshot.match_name(),
            snapshot.minute,
            score
        );

        let text = messages::placement(snapshot, averages.as_ref());
        if !self.notifier.send(&text).await {
            warn!("Placement notification for fixture {} not delivered; bet stays open", id);
        }
        Ok(Decision::Placed)
    }

    async fn resolve_at_halftime(
        &self,
        store: &mut TrackingStore,
        snapshot: &MatchSnapshot,
        record: &TrackingRecord,
    ) -> Result<Decision> {
        let id = snapshot.fixture_id.as_str();
        let bet = match store.get_unresolved(id) {
            Some(bet) => bet,
            None => {
                // Active table says open but the bet row is gone (e.g. a table
                // was reset on load); rebuild it from the tracking record.
                warn!("Fixture {} marked unresolved without a bet row; rebuilding it", id);
                let mut details = BetDetails::from_snapshot(snapshot, BetType::Regular);
                details.placed_score = record.placed_score.clone().unwrap_or_default();
                UnresolvedBet {
                    details,
                    placed_at: chrono::Utc::now(),
                }
            }
        };

        let halftime_score = snapshot.score();
        let outcome = Outcome::decide(&halftime_score, &bet.details.placed_score);
        let details = bet.details.clone();
        store.move_to_resolved(id, bet, outcome)?;
        info!(
            "Bet on fixture {} resolved at halftime: {} (target {}, halftime {})",
            id, outcome, details.placed_score, halftime_score
        );

        let text = messages::resolution(&details, "Halftime score", &halftime_score, outcome);
        if !self.notifier.send(&text).await {
            warn!("Resolution notification for fixture {} not delivered", id);
        }
        Ok(Decision::Resolved(outcome))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bot::testing::{snapshot, RecordingNotifier};
    use chrono::{Duration, Utc};

    fn setup() -> (BetEvaluator, Arc<RecordingNotifier>, TrackingStore) {
        let notifier = Arc::new(RecordingNotifier::new());
        let evaluator = BetEvaluator::new(notifier.clone());
        (evaluator, notifier, TrackingStore::in_memory().unwrap())
    }

    #[tokio::test]
    async fn test_level_score_at_minute_36_places_bet() {
        let (evaluator, notifier, mut store) = setup();
        let snap = snapshot("100", "1st half", Some(36), 1, 1);

        let decision = evaluator.evaluate(&mut store, &snap, None).await.unwrap();

        assert_eq!(decision, Decision::Placed);
        assert_eq!(store.get_unresolved("100").unwrap().details.placed_score, "1-1");
        let record = store.get_active("100").unwrap();
        assert!(record.bet_placed);
        assert_eq!(record.bet_status, BetStatus::Unresolved);
        let sent = notifier.messages();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].contains("BET PLACED"));
        assert!(sent[0].contains("Eredivisie (Netherlands)"));
    }

    #[tokio::test]
    async fn test_halftime_loss_moves_bet_to_resolved() {
        let (evaluator, notifier, mut store) = setup();
        evaluator
            .evaluate(&mut store, &snapshot("100", "1st half", Some(36), 1, 1), None)
            .await
            .unwrap();

        let decision = evaluator
            .evaluate(&mut store, &snapshot("100", "Halftime", None, 1, 2), None)
            .await
            .unwrap();

        assert_eq!(decision, Decision::Resolved(Outcome::Loss));
        assert!(!store.is_unresolved("100"));
        assert_eq!(store.get_resolved("100").unwrap().outcome, Outcome::Loss);
        assert_eq!(store.get_active("100").unwrap().bet_status, BetStatus::Resolved);
        let sent = notifier.messages();
        assert_eq!(sent.len(), 2);
        assert!(sent[1].contains("LOSS"));
    }

    #[tokio::test]
    async fn test_halftime_same_score_wins() {
        let (evaluator, _notifier, mut store) = setup();
        evaluator
            .evaluate(&mut store, &snapshot("7", "1st half", Some(37), 2, 2), None)
            .await
            .unwrap();
        let decision = evaluator
            .evaluate(&mut store, &snapshot("7", "Halftime", None, 2, 2), None)
            .await
            .unwrap();
        assert_eq!(decision, Decision::Resolved(Outcome::Win));
    }

    #[tokio::test]
    async fn test_repeated_snapshot_places_once() {
        let (evaluator, notifier, mut store) = setup();
        let snap = snapshot("100", "1st half", Some(36), 1, 1);
        evaluator.evaluate(&mut store, &snap, None).await.unwrap();
        let second = evaluator.evaluate(&mut store, &snap, None).await.unwrap();

        assert_eq!(second, Decision::Watching);
        assert_eq!(notifier.messages().len(), 1);
        assert_eq!(store.unresolved_count(), 1);
    }

    #[tokio::test]
    async fn test_non_qualifying_score_skips_rest_of_match() {
        let (evaluator, notifier, mut store) = setup();
        let decision = evaluator
            .evaluate(&mut store, &snapshot("5", "1st half", Some(36), 1, 0), None)
            .await
            .unwrap();
        assert_eq!(decision, Decision::Skipped);
        let record = store.get_active("5").unwrap();
        assert!(record.bet_placed);
        assert_eq!(record.bet_status, BetStatus::None);
        assert_eq!(record.placed_score, None);

        // Equaliser a minute later does not reopen the window.
        let later = evaluator
            .evaluate(&mut store, &snapshot("5", "1st half", Some(37), 1, 1), None)
            .await
            .unwrap();
        assert_eq!(later, Decision::Watching);
        assert!(notifier.messages().is_empty());
        assert!(!store.is_unresolved("5"));
    }

    #[tokio::test]
    async fn test_outside_window_only_tracks() {
        let (evaluator, _notifier, mut store) = setup();
        for snap in [
            snapshot("9", "1st half", Some(35), 1, 1),
            snapshot("9", "1st half", Some(38), 1, 1),
            snapshot("9", "2nd half", Some(36), 1, 1),
        ] {
            assert_eq!(
                evaluator.evaluate(&mut store, &snap, None).await.unwrap(),
                Decision::Watching
            );
        }
        assert!(!store.get_active("9").unwrap().bet_placed);
    }

    #[tokio::test]
    async fn test_existing_open_bet_blocks_placement() {
        let (evaluator, notifier, mut store) = setup();
        let snap = snapshot("100", "1st half", Some(36), 1, 1);
        store
            .add_unresolved("100", BetDetails::from_snapshot(&snap, BetType::Regular))
            .unwrap();
        // Simulate a lost active table after restart.
        store.delete_active("100").unwrap();

        let decision = evaluator.evaluate(&mut store, &snap, None).await.unwrap();

        assert_eq!(decision, Decision::AlreadyOpen);
        assert!(notifier.messages().is_empty());
        let record = store.get_active("100").unwrap();
        assert!(record.bet_placed);
        assert_eq!(record.bet_status, BetStatus::Unresolved);
        assert_eq!(record.placed_score.as_deref(), Some("1-1"));
    }

    #[tokio::test]
    async fn test_prematch_and_unknown_status_ignored() {
        let (evaluator, _notifier, mut store) = setup();
        for status in ["Not started", "Postponed", "Ended"] {
            let decision = evaluator
                .evaluate(&mut store, &snapshot("3", status, None, 0, 0), None)
                .await
                .unwrap();
            assert_eq!(decision, Decision::Ignored);
        }
        assert_eq!(store.active_count(), 0);
    }

    #[tokio::test]
    async fn test_finished_cleans_up_unless_bet_open() {
        let (evaluator, _notifier, mut store) = setup();
        evaluator
            .evaluate(&mut store, &snapshot("1", "2nd half", Some(80), 0, 0), None)
            .await
            .unwrap();
        evaluator
            .evaluate(&mut store, &snapshot("200", "1st half", Some(36), 2, 2), None)
            .await
            .unwrap();

        let cleaned = evaluator
            .evaluate(&mut store, &snapshot("1", "Ended", None, 0, 0), None)
            .await
            .unwrap();
        let kept = evaluator
            .evaluate(&mut store, &snapshot("200", "Ended", None, 2, 3), None)
            .await
            .unwrap();

        assert_eq!(cleaned, Decision::Cleaned);
        assert!(store.get_active("1").is_none());
        assert_eq!(kept, Decision::AwaitingReconciliation);
        assert_eq!(store.get_active("200").unwrap().bet_status, BetStatus::Unresolved);

        // Missed halftime surfaces once the wait threshold has passed.
        let later = Utc::now() + Duration::minutes(121);
        assert!(store.list_stale_unresolved_at(120, later).contains_key("200"));
    }

    #[tokio::test]
    async fn test_failed_delivery_keeps_transition() {
        let (evaluator, notifier, mut store) = setup();
        notifier.set_delivering(false);
        let decision = evaluator
            .evaluate(&mut store, &snapshot("100", "1st half", Some(36), 3, 3), None)
            .await
            .unwrap();
        assert_eq!(decision, Decision::Placed);
        assert!(store.is_unresolved("100"));
    }

    #[test]
    fn test_placement_window() {
        let snap = snapshot("1", "1st half", Some(37), 0, 0);
        assert!(in_placement_window(&snap, None));
        let placed = TrackingRecord { bet_placed: true, ..Default::default() };
        assert!(!in_placement_window(&snap, Some(&placed)));
        assert!(!in_placement_window(&snapshot("1", "1st half", None, 0, 0), None));
    }
}
