use tracing::debug;

use crate::db::models::MatchSnapshot;

/// Fragments of competition or team names that mark fixtures not worth
/// tracking (reserves, youth, amateur tiers, friendlies, cups).
pub const DEFAULT_SKIP_KEYWORDS: &[&str] = &[
    "reserve",
    "u1",
    "u2",
    "youth",
    "amateur",
    "friendly game",
    "landesliga",
    "regionalliga",
    "oberliga",
    "liga 3",
    "liga 4",
    "cup",
    "test match",
    "division one",
    "division two",
    "division three",
    "division four",
    "division five",
    "division six",
    "club friendly",
];

pub fn is_amateur_or_youth(snapshot: &MatchSnapshot, keywords: &[String]) -> bool {
    let haystack = format!(
        "{} {} {} {}",
        snapshot.tournament, snapshot.category, snapshot.home_team, snapshot.away_team
    )
    .to_lowercase();

    match keywords.iter().find(|k| haystack.contains(k.as_str())) {
        Some(keyword) => {
            debug!(
                "Skipping fixture {} ('{}' matched in: {})",
                snapshot.fixture_id, keyword, haystack
            );
            true
        }
        None => false,
    }
}

/// Season goal averages (scored + conceded per match) of both teams.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GoalAverages {
    pub home: f64,
    pub away: f64,
}

impl GoalAverages {
    pub fn combined(&self) -> f64 {
        self.home + self.away
    }
}

/// A threshold of zero disables the filter; otherwise missing figures fail it.
pub fn passes_goal_threshold(averages: Option<&GoalAverages>, min_total: f64) -> bool {
    if min_total <= 0.0 {
        return true;
    }
    averages.is_some_and(|a| a.combined() >= min_total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bot::testing::snapshot;

    fn keywords() -> Vec<String> {
        DEFAULT_SKIP_KEYWORDS.iter().map(|k| k.to_string()).collect()
    }

    #[test]
    fn test_youth_competition_is_skipped() {
        let mut snap = snapshot("1", "1st half", Some(10), 0, 0);
        snap.tournament = "U19 Bundesliga".into();
        assert!(is_amateur_or_youth(&snap, &keywords()));
    }

    #[test]
    fn test_team_name_is_checked() {
        let mut snap = snapshot("1", "1st half", Some(10), 0, 0);
        snap.home_team = "Jong Ajax Reserves".into();
        assert!(is_amateur_or_youth(&snap, &keywords()));
    }

    #[test]
    fn test_top_flight_passes() {
        let snap = snapshot("1", "1st half", Some(10), 0, 0);
        assert!(!is_amateur_or_youth(&snap, &keywords()));
    }

    #[test]
    fn test_goal_threshold() {
        let high = GoalAverages { home: 1.8, away: 1.4 };
        let low = GoalAverages { home: 1.0, away: 1.1 };
        assert!(passes_goal_threshold(Some(&high), 3.0));
        assert!(!passes_goal_threshold(Some(&low), 3.0));
        assert!(!passes_goal_threshold(None, 3.0));
        assert!(passes_goal_threshold(None, 0.0));
    }
}
