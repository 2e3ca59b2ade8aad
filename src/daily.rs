//! One-shot daily report: the day's fixtures that involve a team sitting at
//! either end of its league table.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use std::collections::HashSet;
use tracing::{info, warn};

use crate::bot::messages::escape_markdown;
use crate::db::models::StandingRow;
use crate::live_scores::StandingsSource;
use crate::notify::Notifier;

#[derive(Debug, Clone, PartialEq)]
pub struct DailyFixture {
    pub tournament: String,
    pub match_name: String,
    /// Kick-off as HH:MM UTC, "N/A" when unknown
    pub kickoff: String,
    /// Sorted names of the edge teams playing
    pub focus: Vec<String>,
}

/// Team ids of the first and last `n` rows. Short tables overlap.
pub fn edge_team_ids(rows: &[StandingRow], n: usize) -> HashSet<i64> {
    let bottom_start = rows.len().saturating_sub(n);
    rows.iter()
        .take(n)
        .chain(rows[bottom_start..].iter())
        .map(|r| r.team_id)
        .collect()
}

/// Walk every tournament of `category_id`, then keep the fixtures on `date`
/// where either side is an edge team.
///
/// A tournament whose season or table cannot be read is skipped. Failing to
/// list the tournaments or the day's schedule fails the report.
pub async fn collect(
    source: &dyn StandingsSource,
    category_id: i64,
    date: NaiveDate,
    edge_size: usize,
) -> Result<Vec<DailyFixture>> {
    let tournaments = source
        .fetch_category_tournaments(category_id)
        .await
        .with_context(|| format!("listing tournaments of category {}", category_id))?;
    info!("Scanning {} tournament(s) in category {}", tournaments.len(), category_id);

    let mut targets: HashSet<i64> = HashSet::new();
    for t in &tournaments {
        let season = match source.fetch_current_season(t.id).await {
            Ok(Some(season)) => season,
            Ok(None) => continue,
            Err(e) => {
                warn!("Skipping {}: season lookup failed: {}", t.name, e);
                continue;
            }
        };
        match source.fetch_standings(t.id, season).await {
            Ok(rows) => targets.extend(edge_team_ids(&rows, edge_size)),
            Err(e) => warn!("Skipping {}: standings unavailable: {}", t.name, e),
        }
    }
    info!("Identified {} team(s) of interest", targets.len());

    let scheduled = source
        .fetch_scheduled_fixtures(date)
        .await
        .with_context(|| format!("fetching fixtures for {}", date))?;

    let fixtures = scheduled
        .into_iter()
        .filter_map(|f| {
            let mut focus = Vec::new();
            if f.home_team_id.is_some_and(|id| targets.contains(&id)) {
                focus.push(f.home_team.clone());
            }
            if f.away_team_id.is_some_and(|id| targets.contains(&id)) {
                focus.push(f.away_team.clone());
            }
            if focus.is_empty() {
                return None;
            }
            focus.sort();
            focus.dedup();
            Some(DailyFixture {
                match_name: f.match_name(),
                tournament: f.tournament,
                kickoff: f
                    .kickoff
                    .map(|k| k.format("%H:%M").to_string())
                    .unwrap_or_else(|| "N/A".to_string()),
                focus,
            })
        })
        .collect();
    Ok(fixtures)
}

pub fn format_report(label: &str, fixtures: &[DailyFixture]) -> String {
    let mut text = format!("⚽ Sofascore Daily Fixtures - {} ⚽\n\n", label);
    if fixtures.is_empty() {
        text.push_str("No relevant fixtures found for today.");
        return text;
    }
    text.push_str("*Matches Involving Top or Bottom Teams:*\n");
    for f in fixtures {
        text.push_str(&format!(
            "\n*🏆 {}*\n  {} @ {}\n  (Focus: {})",
            escape_markdown(&f.tournament),
            escape_markdown(&f.match_name),
            f.kickoff,
            escape_markdown(&f.focus.join(", "))
        ));
    }
    text
}

/// Build and send the report. `date` defaults to today (UTC).
pub async fn run(
    source: &dyn StandingsSource,
    notifier: &dyn Notifier,
    category_id: i64,
    date: Option<NaiveDate>,
    edge_size: usize,
) -> Result<()> {
    let (day, label) = match date {
        Some(d) => (d, d.format("%Y-%m-%d").to_string()),
        None => (chrono::Utc::now().date_naive(), "Today".to_string()),
    };
    let fixtures = collect(source, category_id, day, edge_size).await?;
    info!("{} fixture(s) involve edge teams on {}", fixtures.len(), day);
    if !notifier.send(&format_report(&label, &fixtures)).await {
        anyhow::bail!("daily fixtures report was not delivered");
    }
    Ok(())
}
