//! Read-only client for the Fantasy Premier League API.
//!
//! Everything the notifier learns about the season comes through
//! [`SeasonFeed`]. [`FplClient`] is the HTTP implementation; tests substitute
//! in-memory feeds.

mod wire;

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde_json::Value;
use state::{Fixture, Gameweek, LeagueStandings, Snapshot, Standing};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::wire::{BootstrapStatic, MatchesPage, SeasonFixture, StandingsPage};

pub const DEFAULT_API_BASE: &str = "https://fantasy.premierleague.com/api";

/// Body the API serves instead of data while the game is being updated.
pub const MAINTENANCE_SENTINEL: &str = "The game is being updated.";

const USER_AGENT: &str = "h2hd/0.1";
const MAX_PAGES: u32 = 50;

#[derive(Debug, Error)]
pub enum FplError {
    #[error("upstream is in a maintenance window")]
    Maintenance,
    #[error("upstream request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("upstream returned status {status} for {url}")]
    Status { status: u16, url: String },
    #[error("malformed upstream payload from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },
}

impl FplError {
    /// Transport failures and 5xx responses are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            FplError::Transport(_) => true,
            FplError::Status { status, .. } => *status >= 500,
            FplError::Maintenance | FplError::Decode { .. } => false,
        }
    }
}

#[async_trait]
pub trait SeasonFeed: Send + Sync {
    /// First unfinished gameweek and its predecessor. A missing or malformed
    /// gameweek list yields an empty snapshot rather than an error.
    async fn read_current_and_previous(&self) -> Result<Snapshot, FplError>;

    /// Head-to-head matches of the configured league for one gameweek.
    async fn fixtures(&self, gameweek_id: u32) -> Result<Vec<Fixture>, FplError>;

    /// Kickoff of the last scheduled Premier League match in the gameweek.
    async fn final_fixture_kickoff(
        &self,
        gameweek_id: u32,
    ) -> Result<Option<DateTime<Utc>>, FplError>;

    async fn standings(&self) -> Result<LeagueStandings, FplError>;
}

#[derive(Debug, Clone)]
pub struct FplConfig {
    pub api_base: String,
    pub league_id: String,
    /// Opaque `Cookie` header value for endpoints that need a session.
    pub cookie: Option<String>,
    pub retries: u32,
    pub backoff: Duration,
}

impl FplConfig {
    pub fn new(league_id: impl Into<String>) -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            league_id: league_id.into(),
            cookie: None,
            retries: 2,
            backoff: Duration::from_millis(500),
        }
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    pub fn with_cookie(mut self, cookie: Option<String>) -> Self {
        self.cookie = cookie;
        self
    }

    pub fn with_retries(mut self, retries: u32, backoff: Duration) -> Self {
        self.retries = retries;
        self.backoff = backoff;
        self
    }
}

#[derive(Clone)]
pub struct FplClient {
    config: FplConfig,
    http: reqwest::Client,
}

impl FplClient {
    pub fn new(config: FplConfig) -> Result<Self, FplError> {
        let http = reqwest::Client::builder().user_agent(USER_AGENT).build()?;
        Ok(Self { config, http })
    }

    pub fn config(&self) -> &FplConfig {
        &self.config
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.config.api_base.trim_end_matches('/'), path)
    }

    async fn get_json(&self, path: &str, query: &[(&str, String)]) -> Result<Value, FplError> {
        let url = self.url(path);
        let mut attempt = 0;
        loop {
            match self.fetch_once(&url, query).await {
                Err(err) if err.is_retryable() && attempt < self.config.retries => {
                    attempt += 1;
                    warn!(url = %url, attempt, error = %err, "upstream read failed, retrying");
                    tokio::time::sleep(self.config.backoff).await;
                }
                other => return other,
            }
        }
    }

    async fn fetch_once(&self, url: &str, query: &[(&str, String)]) -> Result<Value, FplError> {
        let mut request = self.http.get(url).query(query);
        if let Some(cookie) = &self.config.cookie {
            request = request.header(reqwest::header::COOKIE, cookie);
        }
        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;

        // The sentinel arrives with either a success or an error status.
        if is_maintenance(&body) {
            info!(url = %url, "upstream reports maintenance window");
            return Err(FplError::Maintenance);
        }
        if !status.is_success() {
            return Err(FplError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }
        serde_json::from_str(&body).map_err(|source| FplError::Decode {
            url: url.to_string(),
            source,
        })
    }
}

fn is_maintenance(body: &str) -> bool {
    let trimmed = body.trim();
    if trimmed == MAINTENANCE_SENTINEL {
        return true;
    }
    serde_json::from_str::<String>(trimmed)
        .map(|text| text.trim() == MAINTENANCE_SENTINEL)
        .unwrap_or(false)
}

fn decode<T: DeserializeOwned>(path: &str, value: Value) -> Result<T, FplError> {
    serde_json::from_value(value).map_err(|source| FplError::Decode {
        url: path.to_string(),
        source,
    })
}

#[async_trait]
impl SeasonFeed for FplClient {
    async fn read_current_and_previous(&self) -> Result<Snapshot, FplError> {
        let value = match self.get_json("bootstrap-static/", &[]).await {
            Ok(value) => value,
            Err(FplError::Decode { source, .. }) => {
                warn!(error = %source, "unreadable gameweek list, treating as no signal");
                return Ok(Snapshot::empty());
            }
            Err(err) => return Err(err),
        };
        let bootstrap: BootstrapStatic = match serde_json::from_value(value) {
            Ok(bootstrap) => bootstrap,
            Err(err) => {
                warn!(error = %err, "malformed gameweek list, treating as no signal");
                return Ok(Snapshot::empty());
            }
        };
        if bootstrap.events.is_empty() {
            warn!("upstream returned no gameweeks");
        }
        let snapshot =
            Snapshot::from_gameweeks(bootstrap.events.into_iter().map(Gameweek::from).collect());
        debug!(
            current = ?snapshot.current_id(),
            previous = ?snapshot.previous_id(),
            "snapshot read"
        );
        Ok(snapshot)
    }

    async fn fixtures(&self, gameweek_id: u32) -> Result<Vec<Fixture>, FplError> {
        let path = format!("leagues-h2h-matches/league/{}/", self.config.league_id);
        let mut fixtures = Vec::new();
        for page in 1..=MAX_PAGES {
            let value = self
                .get_json(
                    &path,
                    &[("event", gameweek_id.to_string()), ("page", page.to_string())],
                )
                .await?;
            let batch: MatchesPage = decode(&path, value)?;
            fixtures.extend(
                batch
                    .results
                    .into_iter()
                    .filter(|m| m.event == gameweek_id)
                    .map(Fixture::from),
            );
            if !batch.has_next {
                break;
            }
            if page == MAX_PAGES {
                warn!(
                    gameweek = gameweek_id,
                    pages = MAX_PAGES,
                    "fixture list truncated at page limit"
                );
            }
        }
        debug!(gameweek = gameweek_id, count = fixtures.len(), "fixtures read");
        Ok(fixtures)
    }

    async fn final_fixture_kickoff(
        &self,
        gameweek_id: u32,
    ) -> Result<Option<DateTime<Utc>>, FplError> {
        let path = "fixtures/";
        let value = self
            .get_json(path, &[("event", gameweek_id.to_string())])
            .await?;
        let fixtures: Vec<SeasonFixture> = decode(path, value)?;
        Ok(fixtures
            .into_iter()
            .filter(|f| f.event == Some(gameweek_id))
            .filter_map(|f| f.kickoff_time)
            .max())
    }

    async fn standings(&self) -> Result<LeagueStandings, FplError> {
        let path = format!("leagues-h2h/{}/standings/", self.config.league_id);
        let mut standings = LeagueStandings::default();
        for page in 1..=MAX_PAGES {
            let value = self
                .get_json(&path, &[("page_standings", page.to_string())])
                .await?;
            let batch: StandingsPage = decode(&path, value)?;
            standings.name = batch.league.name;
            standings
                .rows
                .extend(batch.standings.results.into_iter().map(Standing::from));
            if !batch.standings.has_next {
                break;
            }
            if page == MAX_PAGES {
                warn!(pages = MAX_PAGES, "standings truncated at page limit");
            }
        }
        Ok(standings)
    }
}
