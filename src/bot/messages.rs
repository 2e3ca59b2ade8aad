//! Operator message templates (Telegram Markdown).

use crate::db::models::{BetDetails, MatchSnapshot, Outcome};

use super::filters::GoalAverages;

/// Escape the characters legacy Telegram Markdown treats as markup.
pub fn escape_markdown(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '_' | '*' | '`' | '[') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

pub fn placement(snapshot: &MatchSnapshot, averages: Option<&GoalAverages>) -> String {
    let minute = snapshot
        .minute
        .map(|m| format!("{}'", m))
        .unwrap_or_else(|| "?".into());
    let mut msg = format!(
        "⚽️ *BET PLACED* ⚽️\n\
         🏆 {} ({})\n\
         🆚 *{}* vs *{}*\n\
         ⏱ {} | Score: {}\n\
         🎯 Target: halftime score stays {}",
        escape_markdown(&snapshot.tournament),
        escape_markdown(&snapshot.category),
        escape_markdown(&snapshot.home_team),
        escape_markdown(&snapshot.away_team),
        minute,
        snapshot.score(),
        snapshot.score(),
    );
    if let Some(avg) = averages {
        msg.push_str(&format!(
            "\n\n📊 *AVERAGE GOALS (Scored + Conceded)*\n\
             • Home: {:.2}\n\
             • Away: {:.2}\n\
             • Combined: {:.2}",
            avg.home,
            avg.away,
            avg.combined()
        ));
    }
    msg
}

/// `score_label` names the phase the observed score comes from,
/// e.g. "Halftime score" or "Final score".
pub fn resolution(bet: &BetDetails, score_label: &str, observed: &str, outcome: Outcome) -> String {
    format!(
        "{} *BET RESOLVED*\n\
         🏆 {} ({})\n\
         🆚 {}\n\
         ⏸ {}: {} | Target: {}",
        outcome.marker(),
        escape_markdown(&bet.league),
        escape_markdown(&bet.country),
        escape_markdown(&bet.match_name),
        score_label,
        observed,
        bet.placed_score,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bot::testing::snapshot;
    use crate::db::models::BetType;

    #[test]
    fn test_escape_markdown() {
        assert_eq!(escape_markdown("FC_Basel *1893*"), "FC\\_Basel \\*1893\\*");
    }

    #[test]
    fn test_placement_includes_averages_when_known() {
        let snap = snapshot("100", "1st half", Some(36), 1, 1);
        let without = placement(&snap, None);
        assert!(without.contains("Score: 1-1"));
        assert!(!without.contains("AVERAGE GOALS"));

        let with = placement(&snap, Some(&GoalAverages { home: 1.75, away: 1.5 }));
        assert!(with.contains("Combined: 3.25"));
    }

    #[test]
    fn test_resolution_marks_outcome() {
        let bet = BetDetails::from_snapshot(&snapshot("100", "1st half", Some(36), 1, 1), BetType::Regular);
        let msg = resolution(&bet, "Halftime score", "1-2", Outcome::Loss);
        assert!(msg.contains("LOSS"));
        assert!(msg.contains("Halftime score: 1-2 | Target: 1-1"));
    }
}
