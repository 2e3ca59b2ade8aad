use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Provider-assigned match identifier, stable for the lifetime of a fixture.
pub type FixtureId = String;

/// Live fixture state as fetched from the match data source.
///
/// Snapshots are never persisted; only the facts derived from them are.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchSnapshot {
    pub fixture_id: FixtureId,
    pub home_team: String,
    pub home_team_id: Option<i64>,
    pub away_team: String,
    pub away_team_id: Option<i64>,
    pub tournament: String,
    pub tournament_id: Option<i64>,
    /// Country or category the tournament belongs to
    pub category: String,
    /// Elapsed match minute, absent before kick-off and during breaks
    pub minute: Option<i32>,
    /// Free-text status as reported by the provider, e.g. "1st half"
    pub status: String,
    pub home_score: i32,
    pub away_score: i32,
}

impl MatchSnapshot {
    pub fn match_name(&self) -> String {
        format!("{} vs {}", self.home_team, self.away_team)
    }

    /// Score formatted as `"<home>-<away>"`.
    pub fn score(&self) -> String {
        format!("{}-{}", self.home_score, self.away_score)
    }

    pub fn canonical_status(&self) -> CanonicalStatus {
        CanonicalStatus::from_text(&self.status)
    }
}

/// Normalised match phase used by the bet state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CanonicalStatus {
    FirstHalf,
    SecondHalf,
    HalfTime,
    Finished,
    Live,
    ExtraTime,
    Penalties,
    Unknown,
}

impl CanonicalStatus {
    pub fn from_text(raw: &str) -> Self {
        let s = raw.trim().to_lowercase();
        if s.contains("1st half") {
            return CanonicalStatus::FirstHalf;
        }
        if s.contains("2nd half") {
            return CanonicalStatus::SecondHalf;
        }
        if s.contains("halftime") {
            return CanonicalStatus::HalfTime;
        }
        // Terminal states: played out, or stopped for good with the last score standing.
        const TERMINAL: [&str; 8] = [
            "finished",
            "ended",
            "cancelled",
            "canceled",
            "after extra time",
            "after penalties",
            "abandoned",
            "postponed",
        ];
        if TERMINAL.iter().any(|k| s.contains(k)) {
            return CanonicalStatus::Finished;
        }
        match s.as_str() {
            "1h" => CanonicalStatus::FirstHalf,
            "2h" => CanonicalStatus::SecondHalf,
            "ht" => CanonicalStatus::HalfTime,
            "ft" | "aet" | "ap" | "pen" => CanonicalStatus::Finished,
            "live" => CanonicalStatus::Live,
            "et" => CanonicalStatus::ExtraTime,
            "p" => CanonicalStatus::Penalties,
            _ => CanonicalStatus::Unknown,
        }
    }

    /// Ball-in-play phases (halftime excluded).
    pub fn is_live(self) -> bool {
        matches!(
            self,
            CanonicalStatus::Live
                | CanonicalStatus::FirstHalf
                | CanonicalStatus::SecondHalf
                | CanonicalStatus::ExtraTime
                | CanonicalStatus::Penalties
        )
    }

    pub fn code(self) -> &'static str {
        match self {
            CanonicalStatus::FirstHalf => "1H",
            CanonicalStatus::SecondHalf => "2H",
            CanonicalStatus::HalfTime => "HT",
            CanonicalStatus::Finished => "FT",
            CanonicalStatus::Live => "LIVE",
            CanonicalStatus::ExtraTime => "ET",
            CanonicalStatus::Penalties => "P",
            CanonicalStatus::Unknown => "N/A",
        }
    }
}

impl fmt::Display for CanonicalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BetStatus {
    #[default]
    None,
    Unresolved,
    Resolved,
}

/// Per-fixture state of an actively watched match.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TrackingRecord {
    /// The minute-36 evaluation already ran (bet placed or deliberately skipped)
    pub bet_placed: bool,
    /// Score at placement time; set iff `bet_status` is unresolved or resolved
    pub placed_score: Option<String>,
    pub bet_status: BetStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BetType {
    /// Level score at minute 36/37 holds until halftime
    Regular,
}

impl fmt::Display for BetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BetType::Regular => f.write_str("regular"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Win,
    Loss,
}

impl Outcome {
    /// A bet wins only when the observed score is exactly the target score.
    pub fn decide(observed_score: &str, target_score: &str) -> Self {
        if observed_score == target_score {
            Outcome::Win
        } else {
            Outcome::Loss
        }
    }

    pub fn marker(self) -> &'static str {
        match self {
            Outcome::Win => "✅ WIN",
            Outcome::Loss => "❌ LOSS",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Win => f.write_str("win"),
            Outcome::Loss => f.write_str("loss"),
        }
    }
}

/// Descriptive fields of a bet, captured at placement time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BetDetails {
    pub match_name: String,
    pub league: String,
    pub country: String,
    pub league_id: Option<i64>,
    pub bet_type: BetType,
    pub placed_score: String,
}

impl BetDetails {
    pub fn from_snapshot(snapshot: &MatchSnapshot, bet_type: BetType) -> Self {
        BetDetails {
            match_name: snapshot.match_name(),
            league: snapshot.tournament.clone(),
            country: snapshot.category.clone(),
            league_id: snapshot.tournament_id,
            bet_type,
            placed_score: snapshot.score(),
        }
    }
}

/// An open bet awaiting an outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnresolvedBet {
    #[serde(flatten)]
    pub details: BetDetails,
    pub placed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedBet {
    #[serde(flatten)]
    pub bet: UnresolvedBet,
    pub outcome: Outcome,
    pub resolved_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct OperationalConfig {
    pub last_reconciliation_call: Option<DateTime<Utc>>,
}

/// A team's season aggregate in one tournament, used by the goal-average filter.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TeamSeasonStats {
    pub team_id: i64,
    pub tournament_id: i64,
    pub matches_played: i64,
    pub goals_scored_total: f64,
    pub goals_conceded_total: f64,
    pub goals_scored_average: f64,
    pub goals_conceded_average: f64,
    /// Scored + conceded per match
    pub total_average_goals: f64,
}

impl TeamSeasonStats {
    pub fn from_totals(
        team_id: i64,
        tournament_id: i64,
        matches_played: i64,
        goals_scored: f64,
        goals_conceded: f64,
    ) -> Self {
        let mut stats = TeamSeasonStats {
            team_id,
            tournament_id,
            matches_played,
            ..Default::default()
        };
        if matches_played <= 0 {
            return stats;
        }
        stats.goals_scored_total = goals_scored;
        stats.goals_conceded_total = goals_conceded;
        stats.goals_scored_average = goals_scored / matches_played as f64;
        stats.goals_conceded_average = goals_conceded / matches_played as f64;
        stats.total_average_goals = stats.goals_scored_average + stats.goals_conceded_average;
        stats
    }
}

/// Tournament listed under a provider category.
#[derive(Debug, Clone, PartialEq)]
pub struct TournamentRef {
    pub id: i64,
    pub name: String,
}

/// One row of a league table.
#[derive(Debug, Clone, PartialEq)]
pub struct StandingRow {
    pub position: i64,
    pub team_id: i64,
    pub team_name: String,
}

/// A fixture on the day's schedule, before or during play.
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduledFixture {
    pub fixture_id: FixtureId,
    pub tournament: String,
    pub home_team: String,
    pub home_team_id: Option<i64>,
    pub away_team: String,
    pub away_team_id: Option<i64>,
    pub kickoff: Option<DateTime<Utc>>,
}

impl ScheduledFixture {
    pub fn match_name(&self) -> String {
        format!("{} vs {}", self.home_team, self.away_team)
    }
}

/// Aggregate figures served by the dashboard.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackerStats {
    pub active: i64,
    pub unresolved: i64,
    pub resolved: i64,
    pub wins: i64,
    pub losses: i64,
    pub hit_rate: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_status_from_text() {
        assert_eq!(CanonicalStatus::from_text("1st half"), CanonicalStatus::FirstHalf);
        assert_eq!(CanonicalStatus::from_text("2nd Half"), CanonicalStatus::SecondHalf);
        assert_eq!(CanonicalStatus::from_text("Halftime"), CanonicalStatus::HalfTime);
        assert_eq!(CanonicalStatus::from_text("Ended"), CanonicalStatus::Finished);
        assert_eq!(CanonicalStatus::from_text("Cancelled"), CanonicalStatus::Finished);
        assert_eq!(CanonicalStatus::from_text("FT"), CanonicalStatus::Finished);
        assert_eq!(CanonicalStatus::from_text("ET"), CanonicalStatus::ExtraTime);
        assert_eq!(CanonicalStatus::from_text("Not started"), CanonicalStatus::Unknown);
        assert_eq!(CanonicalStatus::from_text("Interrupted"), CanonicalStatus::Unknown);
    }

    #[test]
    fn test_extra_time_and_stopped_matches_are_terminal() {
        assert_eq!(CanonicalStatus::from_text("AET"), CanonicalStatus::Finished);
        assert_eq!(CanonicalStatus::from_text("AP"), CanonicalStatus::Finished);
        assert_eq!(CanonicalStatus::from_text("After penalties"), CanonicalStatus::Finished);
        assert_eq!(CanonicalStatus::from_text("Abandoned"), CanonicalStatus::Finished);
        assert_eq!(CanonicalStatus::from_text("Postponed"), CanonicalStatus::Finished);
        assert_eq!(CanonicalStatus::from_text("Canceled"), CanonicalStatus::Finished);
        assert!(!CanonicalStatus::from_text("AET").is_live());
    }

    #[test]
    fn test_live_set_excludes_breaks() {
        assert!(CanonicalStatus::FirstHalf.is_live());
        assert!(CanonicalStatus::Penalties.is_live());
        assert!(!CanonicalStatus::HalfTime.is_live());
        assert!(!CanonicalStatus::Finished.is_live());
        assert!(!CanonicalStatus::Unknown.is_live());
    }

    #[test]
    fn test_outcome_requires_exact_score() {
        assert_eq!(Outcome::decide("2-2", "2-2"), Outcome::Win);
        assert_eq!(Outcome::decide("2-1", "2-2"), Outcome::Loss);
    }

    #[test]
    fn test_resolved_bet_payload_is_flat() {
        let bet = ResolvedBet {
            bet: UnresolvedBet {
                details: BetDetails {
                    match_name: "A vs B".into(),
                    league: "Eredivisie".into(),
                    country: "Netherlands".into(),
                    league_id: Some(37),
                    bet_type: BetType::Regular,
                    placed_score: "1-1".into(),
                },
                placed_at: Utc::now(),
            },
            outcome: Outcome::Win,
            resolved_at: Utc::now(),
        };
        let json = serde_json::to_value(&bet).unwrap();
        assert_eq!(json["placed_score"], "1-1");
        assert_eq!(json["bet_type"], "regular");
        assert_eq!(json["outcome"], "win");
        let back: ResolvedBet = serde_json::from_value(json).unwrap();
        assert_eq!(back, bet);
    }

    #[test]
    fn test_team_stats_zero_matches() {
        let stats = TeamSeasonStats::from_totals(1, 2, 0, 10.0, 5.0);
        assert_eq!(stats.total_average_goals, 0.0);
        assert_eq!(stats.goals_scored_total, 0.0);
    }
}
