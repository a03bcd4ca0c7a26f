use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Key of the persisted tracker record.
pub const WORKING_ID_KEY: &str = "working_id";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Gameweek {
    pub id: u32,
    pub finished: bool,
    pub deadline_time: DateTime<Utc>,
}

/// Current and previous gameweek as seen by one read of the season.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub current: Option<Gameweek>,
    pub previous: Option<Gameweek>,
}

impl Snapshot {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Derives the snapshot from the season's gameweeks in any order.
    ///
    /// `current` is the first unfinished gameweek by id and `previous` the one
    /// right before it. When every gameweek is finished `previous` is the last
    /// one and `current` is absent.
    pub fn from_gameweeks(mut gameweeks: Vec<Gameweek>) -> Self {
        gameweeks.sort_by_key(|gw| gw.id);
        match gameweeks.iter().position(|gw| !gw.finished) {
            Some(idx) => Self {
                previous: idx.checked_sub(1).map(|prev| gameweeks[prev].clone()),
                current: Some(gameweeks[idx].clone()),
            },
            None => Self {
                current: None,
                previous: gameweeks.pop(),
            },
        }
    }

    pub fn current_id(&self) -> Option<u32> {
        self.current.as_ref().map(|gw| gw.id)
    }

    pub fn previous_id(&self) -> Option<u32> {
        self.previous.as_ref().map(|gw| gw.id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Side {
    pub player_name: String,
    pub team_name: String,
    pub points: i64,
}

impl Side {
    /// "Player's Team"
    pub fn label(&self) -> String {
        format!("{}'s {}", self.player_name, self.team_name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FixtureResult {
    FirstWon,
    SecondWon,
    Draw,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fixture {
    pub gameweek: u32,
    pub first: Side,
    pub second: Side,
}

impl Fixture {
    pub fn result(&self) -> FixtureResult {
        match self.first.points.cmp(&self.second.points) {
            std::cmp::Ordering::Greater => FixtureResult::FirstWon,
            std::cmp::Ordering::Less => FixtureResult::SecondWon,
            std::cmp::Ordering::Equal => FixtureResult::Draw,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Standing {
    pub rank: u32,
    pub entry_name: String,
    pub player_name: String,
    pub matches_won: u32,
    pub matches_drawn: u32,
    pub matches_lost: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeagueStandings {
    pub name: String,
    pub rows: Vec<Standing>,
}
