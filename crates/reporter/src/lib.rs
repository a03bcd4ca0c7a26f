//! Message text for the league chat. Pure functions over already-fetched data.

use chrono::{DateTime, FixedOffset, Utc};
use state::{Fixture, FixtureResult, Standing};
use tabled::settings::Style;
use tabled::{Table, Tabled};

pub const DEFAULT_SITE_BASE: &str = "https://fantasy.premierleague.com";

pub const RESULTS_HEADER: &str = "The results of this week's fantasy games are here!";
pub const UPCOMING_HEADER: &str = "In this coming gameweek we have some tasty fixtures:";

/// Public pages the messages link to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Links {
    site_base: String,
    league_id: String,
}

impl Links {
    pub fn new(site_base: impl Into<String>, league_id: impl Into<String>) -> Self {
        Self {
            site_base: site_base.into().trim_end_matches('/').to_string(),
            league_id: league_id.into(),
        }
    }

    pub fn change_team(&self) -> String {
        format!("{}/my-team", self.site_base)
    }

    pub fn standings(&self) -> String {
        format!("{}/leagues/{}/standings/h", self.site_base, self.league_id)
    }
}

fn scored(side: &state::Side) -> String {
    format!("{} ({} points)", side.label(), side.points)
}

pub fn result_sentence(fixture: &Fixture) -> String {
    let first = scored(&fixture.first);
    let second = scored(&fixture.second);
    match fixture.result() {
        FixtureResult::FirstWon => format!("{first} won against {second}."),
        FixtureResult::SecondWon => format!("{second} won against {first}."),
        FixtureResult::Draw => format!("{first} drew with {second}."),
    }
}

pub fn format_results(fixtures: &[Fixture]) -> Vec<String> {
    std::iter::once(RESULTS_HEADER.to_string())
        .chain(fixtures.iter().map(result_sentence))
        .collect()
}

pub fn format_upcoming(fixtures: &[Fixture]) -> Vec<String> {
    std::iter::once(UPCOMING_HEADER.to_string())
        .chain(
            fixtures
                .iter()
                .map(|f| format!("{} play {}", f.first.label(), f.second.label())),
        )
        .collect()
}

pub fn deadline_reminder(
    deadline: DateTime<Utc>,
    offset: FixedOffset,
    links: &Links,
) -> Vec<String> {
    let local = deadline.with_timezone(&offset);
    vec![
        format!(
            "The deadline for the coming fantasy gameweek is today at {}",
            local.format("%H:%M")
        ),
        format!("Change your team here: {}", links.change_team()),
    ]
}

pub fn final_kickoff_note(gameweek_id: u32, kickoff: DateTime<Utc>, offset: FixedOffset) -> String {
    let local = kickoff.with_timezone(&offset);
    format!(
        "The last match of gameweek {gameweek_id} kicks off on {}",
        local.format("%A %-d %B at %H:%M")
    )
}

pub fn standings_link(links: &Links) -> String {
    format!("The table has been updated: {}", links.standings())
}

#[derive(Tabled)]
struct StandingLine {
    #[tabled(rename = "Rank")]
    rank: u32,
    #[tabled(rename = "Team")]
    team: String,
    #[tabled(rename = "Manager")]
    manager: String,
    #[tabled(rename = "W")]
    won: u32,
    #[tabled(rename = "D")]
    drawn: u32,
    #[tabled(rename = "L")]
    lost: u32,
}

/// League name on the first line, then the table.
pub fn format_standings_table(name: &str, standings: &[Standing]) -> String {
    let lines = standings.iter().map(|s| StandingLine {
        rank: s.rank,
        team: s.entry_name.clone(),
        manager: s.player_name.clone(),
        won: s.matches_won,
        drawn: s.matches_drawn,
        lost: s.matches_lost,
    });
    let mut table = Table::new(lines);
    table.with(Style::psql());
    format!("{name}\n{table}")
}
