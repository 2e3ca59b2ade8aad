use async_trait::async_trait;
use chrono::NaiveDate;

use crate::db::models::{MatchSnapshot, ScheduledFixture, StandingRow, TeamSeasonStats, TournamentRef};
use crate::error::FetchError;

/// Source of live fixtures, final results and team season figures.
#[async_trait]
pub trait MatchDataSource: Send + Sync {
    /// Snapshot of every fixture currently in play.
    async fn fetch_live_fixtures(&self) -> Result<Vec<MatchSnapshot>, FetchError>;

    /// Latest state of one fixture; `Ok(None)` when the provider does not know it.
    async fn fetch_fixture_by_id(&self, fixture_id: &str) -> Result<Option<MatchSnapshot>, FetchError>;

    async fn fetch_team_season_stats(
        &self,
        team_id: i64,
        tournament_id: i64,
    ) -> Result<Option<TeamSeasonStats>, FetchError>;

    /// Throw away the underlying client and build a fresh one.
    async fn recreate(&self) -> Result<(), FetchError> {
        Ok(())
    }

    /// Human-readable name for logging.
    fn name(&self) -> &str;
}

/// League tables and the day's schedule, read by the daily fixtures report.
#[async_trait]
pub trait StandingsSource: Send + Sync {
    async fn fetch_category_tournaments(&self, category_id: i64) -> Result<Vec<TournamentRef>, FetchError>;

    /// Newest season of a tournament, `Ok(None)` when it has none.
    async fn fetch_current_season(&self, tournament_id: i64) -> Result<Option<i64>, FetchError>;

    /// Rows of the overall table, ordered by position.
    async fn fetch_standings(
        &self,
        tournament_id: i64,
        season_id: i64,
    ) -> Result<Vec<StandingRow>, FetchError>;

    async fn fetch_scheduled_fixtures(&self, date: NaiveDate) -> Result<Vec<ScheduledFixture>, FetchError>;
}
