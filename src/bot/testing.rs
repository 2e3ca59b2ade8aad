//! Scripted collaborators for unit tests.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Mutex;

use crate::db::models::{MatchSnapshot, TeamSeasonStats};
use crate::error::FetchError;
use crate::live_scores::MatchDataSource;
use crate::notify::Notifier;

pub fn snapshot(id: &str, status: &str, minute: Option<i32>, home: i32, away: i32) -> MatchSnapshot {
    MatchSnapshot {
        fixture_id: id.to_string(),
        home_team: "Ajax".into(),
        home_team_id: Some(2953),
        away_team: "PSV".into(),
        away_team_id: Some(2952),
        tournament: "Eredivisie".into(),
        tournament_id: Some(37),
        category: "Netherlands".into(),
        minute,
        status: status.to_string(),
        home_score: home,
        away_score: away,
    }
}

#[derive(Default)]
pub struct FakeSource {
    live: Mutex<Option<Vec<MatchSnapshot>>>,
    by_id: Mutex<HashMap<String, VecDeque<Result<Option<MatchSnapshot>, String>>>>,
    stats: Mutex<HashMap<i64, TeamSeasonStats>>,
    pub live_calls: AtomicU32,
    pub fixture_calls: AtomicU32,
    pub stats_calls: AtomicU32,
    pub recreate_calls: AtomicU32,
}

impl FakeSource {
    pub fn set_live(&self, fixtures: Vec<MatchSnapshot>) {
        *self.live.lock().unwrap() = Some(fixtures);
    }

    /// Make the next live fetch fail.
    pub fn fail_live(&self) {
        *self.live.lock().unwrap() = None;
    }

    /// Queue one response for `fetch_fixture_by_id`; `Err` becomes a transient failure.
    pub fn push_fixture(&self, id: &str, response: Result<Option<MatchSnapshot>, String>) {
        self.by_id
            .lock()
            .unwrap()
            .entry(id.to_string())
            .or_default()
            .push_back(response);
    }

    pub fn set_stats(&self, team_id: i64, total_average_goals: f64) {
        let stats = TeamSeasonStats {
            team_id,
            total_average_goals,
            ..Default::default()
        };
        self.stats.lock().unwrap().insert(team_id, stats);
    }

    pub fn calls(counter: &AtomicU32) -> u32 {
        counter.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MatchDataSource for FakeSource {
    fn name(&self) -> &str {
        "fake"
    }

    async fn fetch_live_fixtures(&self) -> Result<Vec<MatchSnapshot>, FetchError> {
        self.live_calls.fetch_add(1, Ordering::SeqCst);
        self.live
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| FetchError::Transient("live feed down".into()))
    }

    async fn fetch_fixture_by_id(&self, fixture_id: &str) -> Result<Option<MatchSnapshot>, FetchError> {
        self.fixture_calls.fetch_add(1, Ordering::SeqCst);
        let next = self
            .by_id
            .lock()
            .unwrap()
            .get_mut(fixture_id)
            .and_then(|q| q.pop_front());
        match next {
            Some(Ok(snap)) => Ok(snap),
            Some(Err(msg)) => Err(FetchError::Transient(msg)),
            None => Err(FetchError::Transient("no scripted response".into())),
        }
    }

    async fn fetch_team_season_stats(
        &self,
        team_id: i64,
        _tournament_id: i64,
    ) -> Result<Option<TeamSeasonStats>, FetchError> {
        self.stats_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.stats.lock().unwrap().get(&team_id).cloned())
    }

    async fn recreate(&self) -> Result<(), FetchError> {
        self.recreate_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub struct RecordingNotifier {
    pub sent: Mutex<Vec<String>>,
    deliver: AtomicBool,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        RecordingNotifier {
            sent: Mutex::new(Vec::new()),
            deliver: AtomicBool::new(true),
        }
    }

    pub fn set_delivering(&self, deliver: bool) {
        self.deliver.store(deliver, Ordering::SeqCst);
    }

    pub fn messages(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, text: &str) -> bool {
        self.sent.lock().unwrap().push(text.to_string());
        self.deliver.load(Ordering::SeqCst)
    }
}
