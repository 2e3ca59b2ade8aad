use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{Html, IntoResponse},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::CorsLayer;

use crate::db::Database;

#[derive(Clone)]
pub struct AppState {
    pub db: Database,
}

/// A table row tagged with the fixture it belongs to.
#[derive(Debug, Serialize)]
pub struct FixtureRow<T: Serialize> {
    pub fixture_id: String,
    #[serde(flatten)]
    pub entry: T,
}

#[derive(Debug, Deserialize)]
pub struct LimitQuery {
    pub limit: Option<usize>,
}

/// Build the read-only Axum router for the dashboard.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/api/stats", get(stats_handler))
        .route("/api/active", get(active_handler))
        .route("/api/unresolved", get(unresolved_handler))
        .route("/api/resolved", get(resolved_handler))
        .layer(CorsLayer::permissive())
        .with_state(Arc::new(state))
}

fn rows<T: Serialize>(entries: Vec<(String, T)>) -> Vec<FixtureRow<T>> {
    entries
        .into_iter()
        .map(|(fixture_id, entry)| FixtureRow { fixture_id, entry })
        .collect()
}

fn internal(e: anyhow::Error) -> (StatusCode, String) {
    (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
}

async fn index_handler() -> impl IntoResponse {
    Html(DASHBOARD_HTML)
}

/// GET /api/stats
async fn stats_handler(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    state.db.get_stats().map(Json).map_err(internal)
}

/// GET /api/active
async fn active_handler(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    state
        .db
        .list_active()
        .map(|r| Json(rows(r)))
        .map_err(internal)
}

/// GET /api/unresolved
async fn unresolved_handler(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    state
        .db
        .list_unresolved()
        .map(|r| Json(rows(r)))
        .map_err(internal)
}

/// GET /api/resolved?limit=100
async fn resolved_handler(
    State(state): State<Arc<AppState>>,
    Query(q): Query<LimitQuery>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let limit = q.limit.unwrap_or(100).min(1000);
    state
        .db
        .list_resolved(limit)
        .map(|r| Json(rows(r)))
        .map_err(internal)
}

/// Embedded single-file dashboard (HTML + CSS + JS)
const DASHBOARD_HTML: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="UTF-8">
<meta name="viewport" content="width=device-width, initial-scale=1.0">
<title>Halftime Tracker</title>
<style>
  :root { --bg: #0f1117; --card: #1a1d27; --border: #2a2d3a; --green: #00c896; --red: #ff4f6a; --text: #e0e0e0; --muted: #8888aa; }
  * { box-sizing: border-box; margin: 0; padding: 0; }
  body { background: var(--bg); color: var(--text); font-family: 'Segoe UI', system-ui, sans-serif; }
  header { padding: 1rem 2rem; border-bottom: 1px solid var(--border); }
  header h1 { font-size: 1.4rem; font-weight: 700; }
  main { padding: 1.5rem 2rem; display: grid; gap: 1.5rem; }
  .stats-grid { display: grid; grid-template-columns: repeat(auto-fill, minmax(160px, 1fr)); gap: 1rem; }
  .stat-card { background: var(--card); border: 1px solid var(--border); border-radius: 10px; padding: 1.2rem; }
  .stat-card .label { color: var(--muted); font-size: .8rem; text-transform: uppercase; margin-bottom: .4rem; }
  .stat-card .value { font-size: 1.7rem; font-weight: 700; }
  .panel { background: var(--card); border: 1px solid var(--border); border-radius: 10px; overflow: hidden; }
  .panel-header { padding: .9rem 1.2rem; border-bottom: 1px solid var(--border); font-weight: 600; }
  table { width: 100%; border-collapse: collapse; }
  th { padding: .7rem 1rem; text-align: left; font-size: .75rem; text-transform: uppercase; color: var(--muted); border-bottom: 1px solid var(--border); }
  td { padding: .65rem 1rem; font-size: .88rem; border-bottom: 1px solid #1e2130; }
  .win { color: var(--green); }
  .loss { color: var(--red); }
</style>
</head>
<body>
<header><h1>⚽ Halftime Tracker</h1></header>
<main>
  <div class="stats-grid" id="stats"></div>
  <div class="panel">
    <div class="panel-header">Open bets</div>
    <table><thead><tr><th>Fixture</th><th>Match</th><th>League</th><th>Target</th><th>Placed</th></tr></thead>
    <tbody id="unresolved"></tbody></table>
  </div>
  <div class="panel">
    <div class="panel-header">Resolved bets</div>
    <table><thead><tr><th>Fixture</th><th>Match</th><th>League</th><th>Target</th><th>Outcome</th><th>Resolved</th></tr></thead>
    <tbody id="resolved"></tbody></table>
  </div>
</main>
<script>
const esc = s => String(s ?? '').replace(/[&<>"]/g, c => ({'&':'&amp;','<':'&lt;','>':'&gt;','"':'&quot;'}[c]));
const when = t => t ? new Date(t).toLocaleString() : '';

async function refresh() {
  const [stats, open, done] = await Promise.all([
    fetch('/api/stats').then(r => r.json()),
    fetch('/api/unresolved').then(r => r.json()),
    fetch('/api/resolved?limit=50').then(r => r.json()),
  ]);
  const rate = stats.hit_rate == null ? '–' : (stats.hit_rate * 100).toFixed(1) + '%';
  document.getElementById('stats').innerHTML = [
    ['Tracked', stats.active], ['Open', stats.unresolved], ['Resolved', stats.resolved],
    ['Wins', stats.wins], ['Losses', stats.losses], ['Hit rate', rate],
  ].map(([l, v]) => `<div class="stat-card"><div class="label">${l}</div><div class="value">${v}</div></div>`).join('');
  document.getElementById('unresolved').innerHTML = open.map(b =>
    `<tr><td>${esc(b.fixture_id)}</td><td>${esc(b.match_name)}</td><td>${esc(b.league)} (${esc(b.country)})</td><td>${esc(b.placed_score)}</td><td>${when(b.placed_at)}</td></tr>`).join('');
  document.getElementById('resolved').innerHTML = done.map(b =>
    `<tr><td>${esc(b.fixture_id)}</td><td>${esc(b.match_name)}</td><td>${esc(b.league)} (${esc(b.country)})</td><td>${esc(b.placed_score)}</td><td class="${b.outcome}">${esc(b.outcome)}</td><td>${when(b.resolved_at)}</td></tr>`).join('');
}

refresh();
setInterval(refresh, 15000);
</script>
</body>
</html>
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::{BetDetails, BetType, Outcome};
    use crate::db::TrackingStore;

    fn details() -> BetDetails {
        BetDetails {
            match_name: "Ajax vs PSV".into(),
            league: "Eredivisie".into(),
            country: "Netherlands".into(),
            league_id: Some(37),
            bet_type: BetType::Regular,
            placed_score: "1-1".into(),
        }
    }

    #[test]
    fn test_rows_flatten_entries() {
        let mut store = TrackingStore::in_memory().unwrap();
        store.add_unresolved("100", details()).unwrap();
        let bet = store.get_unresolved("100").unwrap();
        store.move_to_resolved("100", bet, Outcome::Win).unwrap();

        let json = serde_json::to_value(rows(store.db().list_resolved(10).unwrap())).unwrap();
        assert_eq!(json[0]["fixture_id"], "100");
        assert_eq!(json[0]["match_name"], "Ajax vs PSV");
        assert_eq!(json[0]["outcome"], "win");
    }

    #[tokio::test]
    async fn test_stats_handler_reads_store() {
        let mut store = TrackingStore::in_memory().unwrap();
        store.add_unresolved("100", details()).unwrap();
        let state = Arc::new(AppState {
            db: store.db().clone(),
        });
        assert!(stats_handler(State(state)).await.is_ok());
    }
}
