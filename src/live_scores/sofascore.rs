use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use reqwest::{header, Client, StatusCode};
use serde_json::Value;
use std::sync::RwLock;
use tracing::{debug, info, warn};
use url::Url;

use super::provider::{MatchDataSource, StandingsSource};
use crate::db::models::{
    CanonicalStatus, MatchSnapshot, ScheduledFixture, StandingRow, TeamSeasonStats, TournamentRef,
};
use crate::error::FetchError;

/// Match data source backed by the public SofaScore JSON API.
pub struct SofaScore {
    http: RwLock<Client>,
    /// Base URL without trailing slash, overridable in tests
    base_url: String,
    /// Sport slug used in live-event paths, e.g. "football"
    sport: String,
}

impl SofaScore {
    pub fn new(base_url: &str, sport: &str) -> Result<Self> {
        Url::parse(base_url).with_context(|| format!("Invalid SofaScore URL '{}'", base_url))?;
        Ok(SofaScore {
            http: RwLock::new(build_client()?),
            base_url: base_url.trim_end_matches('/').to_string(),
            sport: sport.to_string(),
        })
    }

    fn client(&self) -> Result<Client, FetchError> {
        self.http
            .read()
            .map(|c| c.clone())
            .map_err(|_| FetchError::Transient("HTTP client lock poisoned".into()))
    }

    async fn get_json(&self, path: &str) -> Result<Option<Value>, FetchError> {
        let url = format!("{}/{}", self.base_url, path);
        debug!("GET {}", url);

        let resp = self.client()?.get(&url).send().await?;
        let status = resp.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if status.is_server_error() {
            return Err(FetchError::Transient(format!("SofaScore error {} for {}", status, path)));
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(FetchError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let raw: Value = resp
            .json()
            .await
            .map_err(|e| FetchError::Transient(format!("invalid JSON from {}: {}", path, e)))?;
        Ok(Some(raw))
    }

    async fn current_season_id(&self, tournament_id: i64) -> Result<Option<i64>, FetchError> {
        let path = format!("unique-tournament/{}/seasons", tournament_id);
        let Some(raw) = self.get_json(&path).await? else {
            return Ok(None);
        };
        // Seasons are listed newest first
        Ok(raw["seasons"]
            .as_array()
            .and_then(|seasons| seasons.first())
            .and_then(|s| s["id"].as_i64()))
    }
}

fn build_client() -> Result<Client> {
    let mut headers = header::HeaderMap::new();
    headers.insert(header::ACCEPT, header::HeaderValue::from_static("application/json"));
    headers.insert(
        header::REFERER,
        header::HeaderValue::from_static("https://www.sofascore.com/"),
    );
    Client::builder()
        .timeout(std::time::Duration::from_secs(10))
        .user_agent("Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36")
        .default_headers(headers)
        .build()
        .context("Failed to build HTTP client")
}

#[async_trait]
impl MatchDataSource for SofaScore {
    fn name(&self) -> &str {
        "SofaScore"
    }

    async fn fetch_live_fixtures(&self) -> Result<Vec<MatchSnapshot>, FetchError> {
        let path = format!("sport/{}/events/live", self.sport);
        match self.get_json(&path).await? {
            Some(raw) => Ok(parse_events(&raw, Utc::now().timestamp())),
            None => Ok(vec![]),
        }
    }

    async fn fetch_fixture_by_id(&self, fixture_id: &str) -> Result<Option<MatchSnapshot>, FetchError> {
        let path = format!("event/{}", fixture_id);
        let Some(raw) = self.get_json(&path).await? else {
            return Ok(None);
        };
        parse_event(&raw["event"], Utc::now().timestamp())
            .map(Some)
            .ok_or_else(|| FetchError::Transient(format!("unparseable event {}", fixture_id)))
    }

    async fn fetch_team_season_stats(
        &self,
        team_id: i64,
        tournament_id: i64,
    ) -> Result<Option<TeamSeasonStats>, FetchError> {
        let Some(season_id) = self.current_season_id(tournament_id).await? else {
            warn!("No current season for tournament {}", tournament_id);
            return Ok(None);
        };
        let path = format!(
            "team/{}/unique-tournament/{}/season/{}/statistics/overall",
            team_id, tournament_id, season_id
        );
        Ok(self
            .get_json(&path)
            .await?
            .and_then(|raw| parse_team_stats(team_id, tournament_id, &raw)))
    }

    async fn recreate(&self) -> Result<(), FetchError> {
        let fresh = build_client().map_err(|e| FetchError::Transient(format!("{:#}", e)))?;
        let mut guard = self
            .http
            .write()
            .map_err(|_| FetchError::Transient("HTTP client lock poisoned".into()))?;
        *guard = fresh;
        info!("SofaScore HTTP client recreated");
        Ok(())
    }
}

#[async_trait]
impl StandingsSource for SofaScore {
    async fn fetch_category_tournaments(&self, category_id: i64) -> Result<Vec<TournamentRef>, FetchError> {
        let path = format!("category/{}/unique-tournaments", category_id);
        Ok(self
            .get_json(&path)
            .await?
            .map(|raw| parse_tournaments(&raw))
            .unwrap_or_default())
    }

    async fn fetch_current_season(&self, tournament_id: i64) -> Result<Option<i64>, FetchError> {
        self.current_season_id(tournament_id).await
    }

    async fn fetch_standings(
        &self,
        tournament_id: i64,
        season_id: i64,
    ) -> Result<Vec<StandingRow>, FetchError> {
        let path = format!(
            "unique-tournament/{}/season/{}/standings/total",
            tournament_id, season_id
        );
        Ok(self
            .get_json(&path)
            .await?
            .map(|raw| parse_standings(&raw))
            .unwrap_or_default())
    }

    async fn fetch_scheduled_fixtures(&self, date: NaiveDate) -> Result<Vec<ScheduledFixture>, FetchError> {
        let path = format!("sport/{}/scheduled-events/{}", self.sport, date.format("%Y-%m-%d"));
        Ok(self
            .get_json(&path)
            .await?
            .map(|raw| parse_scheduled(&raw))
            .unwrap_or_default())
    }
}

fn parse_events(raw: &Value, now_ts: i64) -> Vec<MatchSnapshot> {
    let events = match raw["events"].as_array() {
        Some(a) => a,
        None => return vec![],
    };
    events.iter().filter_map(|ev| parse_event(ev, now_ts)).collect()
}

fn parse_event(ev: &Value, now_ts: i64) -> Option<MatchSnapshot> {
    let fixture_id = match &ev["id"] {
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        _ => return None,
    };
    let home_team = ev["homeTeam"]["name"].as_str()?.to_string();
    let away_team = ev["awayTeam"]["name"].as_str()?.to_string();

    let tournament = &ev["tournament"];
    let status = status_text(&ev["status"]);

    let period_start = ev["time"]["currentPeriodStartTimestamp"].as_i64();
    let minute = period_start.and_then(|start| {
        elapsed_minute(CanonicalStatus::from_text(&status), start, now_ts)
    });

    Some(MatchSnapshot {
        fixture_id,
        home_team,
        home_team_id: ev["homeTeam"]["id"].as_i64(),
        away_team,
        away_team_id: ev["awayTeam"]["id"].as_i64(),
        tournament: tournament["name"].as_str().unwrap_or("Unknown").to_string(),
        tournament_id: tournament["uniqueTournament"]["id"]
            .as_i64()
            .or_else(|| tournament["id"].as_i64()),
        category: tournament["category"]["name"]
            .as_str()
            .unwrap_or("Unknown")
            .to_string(),
        minute,
        status,
        home_score: ev["homeScore"]["current"].as_i64().unwrap_or(0) as i32,
        away_score: ev["awayScore"]["current"].as_i64().unwrap_or(0) as i32,
    })
}

/// Provider status as free text.
///
/// `status.type` decides whether a match is over. Short descriptions such as
/// "AET" or "AP" are then wrapped so they still read as ended.
fn status_text(status: &Value) -> String {
    let kind = status["type"].as_str().unwrap_or_default();
    let terminal = matches!(kind, "finished" | "canceled" | "postponed" | "abandoned");
    match status["description"].as_str() {
        Some(desc) if terminal && CanonicalStatus::from_text(desc) != CanonicalStatus::Finished => {
            format!("Ended ({})", desc)
        }
        Some(desc) => desc.to_string(),
        None if !kind.is_empty() => kind.to_string(),
        None => "unknown".to_string(),
    }
}

/// Match clock from the start of the current period. Minute 1 starts at kick-off.
fn elapsed_minute(status: CanonicalStatus, period_start: i64, now_ts: i64) -> Option<i32> {
    let elapsed = ((now_ts - period_start).max(0) / 60) as i32;
    match status {
        CanonicalStatus::FirstHalf => Some(elapsed + 1),
        CanonicalStatus::SecondHalf => Some(45 + elapsed + 1),
        _ => None,
    }
}

fn parse_team_stats(team_id: i64, tournament_id: i64, raw: &Value) -> Option<TeamSeasonStats> {
    let stats = raw.get("statistics")?;
    let matches = stats["matches"].as_i64().unwrap_or(0);
    let scored = stats["goalsScored"].as_f64().unwrap_or(0.0);
    let conceded = stats["goalsConceded"].as_f64().unwrap_or(0.0);
    Some(TeamSeasonStats::from_totals(
        team_id,
        tournament_id,
        matches,
        scored,
        conceded,
    ))
}

fn parse_tournaments(raw: &Value) -> Vec<TournamentRef> {
    let mut out: Vec<TournamentRef> = Vec::new();
    let groups = raw["groups"].as_array().cloned().unwrap_or_default();
    for group in &groups {
        let Some(list) = group["uniqueTournaments"].as_array() else {
            continue;
        };
        for t in list {
            let (Some(id), Some(name)) = (t["id"].as_i64(), t["name"].as_str()) else {
                continue;
            };
            if !out.iter().any(|known| known.id == id) {
                out.push(TournamentRef { id, name: name.to_string() });
            }
        }
    }
    out
}

fn parse_standings(raw: &Value) -> Vec<StandingRow> {
    // Only the first table; split leagues list their groups after it.
    let Some(rows) = raw["standings"][0]["rows"].as_array() else {
        return vec![];
    };
    let mut out: Vec<StandingRow> = rows
        .iter()
        .filter_map(|row| {
            Some(StandingRow {
                position: row["position"].as_i64()?,
                team_id: row["team"]["id"].as_i64()?,
                team_name: row["team"]["name"].as_str().unwrap_or("Unknown").to_string(),
            })
        })
        .collect();
    out.sort_by_key(|r| r.position);
    out
}

fn parse_scheduled(raw: &Value) -> Vec<ScheduledFixture> {
    let Some(events) = raw["events"].as_array() else {
        return vec![];
    };
    events
        .iter()
        .filter_map(|ev| {
            let fixture_id = match &ev["id"] {
                Value::Number(n) => n.to_string(),
                Value::String(s) => s.clone(),
                _ => return None,
            };
            Some(ScheduledFixture {
                fixture_id,
                tournament: ev["tournament"]["name"].as_str().unwrap_or("Unknown").to_string(),
                home_team: ev["homeTeam"]["name"].as_str()?.to_string(),
                home_team_id: ev["homeTeam"]["id"].as_i64(),
                away_team: ev["awayTeam"]["name"].as_str()?.to_string(),
                away_team_id: ev["awayTeam"]["id"].as_i64(),
                kickoff: ev["startTimestamp"]
                    .as_i64()
                    .and_then(|ts| DateTime::from_timestamp(ts, 0)),
            })
        })
        .collect()
}
