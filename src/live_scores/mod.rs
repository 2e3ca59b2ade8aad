pub mod provider;
pub mod sofascore;

pub use provider::{MatchDataSource, StandingsSource};
pub use sofascore::SofaScore;
