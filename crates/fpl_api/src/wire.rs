//! Payload shapes of the FPL endpoints we read. Only the fields we use.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use state::{Fixture, Gameweek, Side, Standing};

/// Placeholder for a side with no manager (a bye against the league average).
const AVERAGE: &str = "Average";

#[derive(Debug, Deserialize)]
pub(crate) struct BootstrapStatic {
    pub events: Vec<Event>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Event {
    pub id: u32,
    pub finished: bool,
    pub deadline_time: DateTime<Utc>,
}

impl From<Event> for Gameweek {
    fn from(event: Event) -> Self {
        Gameweek {
            id: event.id,
            finished: event.finished,
            deadline_time: event.deadline_time,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct SeasonFixture {
    pub event: Option<u32>,
    pub kickoff_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct MatchesPage {
    #[serde(default)]
    pub has_next: bool,
    pub results: Vec<H2hMatch>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct H2hMatch {
    pub event: u32,
    pub entry_1_player_name: Option<String>,
    pub entry_1_name: Option<String>,
    #[serde(default)]
    pub entry_1_points: i64,
    pub entry_2_player_name: Option<String>,
    pub entry_2_name: Option<String>,
    #[serde(default)]
    pub entry_2_points: i64,
}

fn side(player: Option<String>, team: Option<String>, points: i64) -> Side {
    Side {
        player_name: player.unwrap_or_else(|| AVERAGE.to_string()),
        team_name: team.unwrap_or_else(|| AVERAGE.to_string()),
        points,
    }
}

impl From<H2hMatch> for Fixture {
    fn from(m: H2hMatch) -> Self {
        Fixture {
            gameweek: m.event,
            first: side(m.entry_1_player_name, m.entry_1_name, m.entry_1_points),
            second: side(m.entry_2_player_name, m.entry_2_name, m.entry_2_points),
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct StandingsPage {
    pub league: LeagueInfo,
    pub standings: StandingsBlock,
}

#[derive(Debug, Deserialize)]
pub(crate) struct LeagueInfo {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct StandingsBlock {
    #[serde(default)]
    pub has_next: bool,
    pub results: Vec<StandingRow>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct StandingRow {
    pub rank: u32,
    pub entry_name: String,
    pub player_name: String,
    pub matches_won: u32,
    pub matches_drawn: u32,
    pub matches_lost: u32,
}

impl From<StandingRow> for Standing {
    fn from(row: StandingRow) -> Self {
        Standing {
            rank: row.rank,
            entry_name: row.entry_name,
            player_name: row.player_name,
            matches_won: row.matches_won,
            matches_drawn: row.matches_drawn,
            matches_lost: row.matches_lost,
        }
    }
}
