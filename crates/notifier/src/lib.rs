//! One notifier invocation: read the season, work out which gameweek
//! transition applies given the persisted `working_id`, report it, and move
//! the tracker forward.
//!
//! Nothing here is resident between invocations. The state machine is
//! re-derived from the snapshot and the tracker record every time.

use anyhow::{bail, Context, Result};
use chat::{Message, MessageSink};
use chrono::{DateTime, FixedOffset, Utc};
use fpl_api::{FplError, SeasonFeed};
use reporter::Links;
use serde::Serialize;
use state::{Gameweek, Snapshot};
use storage::TrackerStore;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state")]
pub enum Transition {
    /// No unfinished gameweek is left, or the season list was unreadable.
    SeasonOver,
    /// The tracked gameweek is now `previous`: report it and track `next`.
    GameweekJustFinished { finished: u32, next: u32 },
    /// The tracked gameweek is still live. `arm` is set when nothing was
    /// tracked yet and this run starts tracking `gameweek`.
    AwaitingDeadline { gameweek: Gameweek, arm: bool },
    /// The tracked id matches neither side of the snapshot.
    Unknown {
        working_id: u32,
        previous: Option<u32>,
        current: u32,
    },
}

impl Transition {
    /// Value the tracker should hold after the transition has been reported.
    pub fn next_working_id(&self) -> Option<u32> {
        match self {
            Transition::GameweekJustFinished { next, .. } => Some(*next),
            Transition::AwaitingDeadline {
                gameweek,
                arm: true,
            } => Some(gameweek.id),
            _ => None,
        }
    }
}

pub fn decide(working_id: Option<u32>, snapshot: &Snapshot) -> Transition {
    let Some(current) = snapshot.current.as_ref() else {
        return Transition::SeasonOver;
    };
    let Some(working_id) = working_id else {
        return Transition::AwaitingDeadline {
            gameweek: current.clone(),
            arm: true,
        };
    };
    if snapshot.previous_id() == Some(working_id) {
        Transition::GameweekJustFinished {
            finished: working_id,
            next: current.id,
        }
    } else if working_id == current.id {
        Transition::AwaitingDeadline {
            gameweek: current.clone(),
            arm: false,
        }
    } else {
        Transition::Unknown {
            working_id,
            previous: snapshot.previous_id(),
            current: current.id,
        }
    }
}

/// Calendar-date equality of the deadline and `now`, both seen at `offset`.
pub fn deadline_is_today(deadline: DateTime<Utc>, now: DateTime<Utc>, offset: FixedOffset) -> bool {
    deadline.with_timezone(&offset).date_naive() == now.with_timezone(&offset).date_naive()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum RunOutcome {
    /// Upstream served the maintenance sentinel; nothing was sent or stored.
    Maintenance,
    Transition(Transition),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub outcome: RunOutcome,
    pub messages_sent: usize,
    pub stored: Option<u32>,
}

impl RunReport {
    fn maintenance() -> Self {
        Self {
            outcome: RunOutcome::Maintenance,
            messages_sent: 0,
            stored: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct NotifierSettings {
    /// Zone in which "today" is evaluated.
    pub offset: FixedOffset,
    pub links: Links,
    pub compare_and_swap: bool,
}

pub struct Notifier<F, T> {
    feed: F,
    tracker: T,
    settings: NotifierSettings,
}

impl<F, T> Notifier<F, T>
where
    F: SeasonFeed,
    T: TrackerStore,
{
    pub fn new(feed: F, tracker: T, settings: NotifierSettings) -> Self {
        Self {
            feed,
            tracker,
            settings,
        }
    }

    pub fn feed(&self) -> &F {
        &self.feed
    }

    pub fn tracker(&self) -> &T {
        &self.tracker
    }

    pub async fn run_once(&self, sink: &dyn MessageSink, now: DateTime<Utc>) -> Result<RunReport> {
        let snapshot = match self.feed.read_current_and_previous().await {
            Ok(snapshot) => snapshot,
            Err(FplError::Maintenance) => return Ok(RunReport::maintenance()),
            Err(err) => return Err(err).context("reading season snapshot"),
        };

        let (working_id, loaded) = match self.tracker.load().await {
            Ok(id) => (id, true),
            Err(err) => {
                warn!(error = ?err, "tracker unavailable, treating as uninitialized");
                (None, false)
            }
        };

        let transition = decide(working_id, &snapshot);
        info!(
            working_id = ?working_id,
            current = ?snapshot.current_id(),
            previous = ?snapshot.previous_id(),
            transition = ?transition,
            "transition decided"
        );

        // Everything is fetched before the first send so a failure or a
        // maintenance window never leaves a half-sent report behind.
        let messages = match self.compose(&transition, now).await {
            Ok(messages) => messages,
            Err(FplError::Maintenance) => return Ok(RunReport::maintenance()),
            Err(err) => return Err(err).context("reading gameweek data"),
        };

        for message in &messages {
            info!(message = %message, "sending");
            sink.deliver(message).await?;
        }

        let stored = match transition.next_working_id() {
            Some(next) if Some(next) != working_id => {
                self.persist(working_id, loaded, next).await?;
                info!(from = ?working_id, to = next, "working_id advanced");
                Some(next)
            }
            _ => None,
        };

        if let Transition::Unknown {
            working_id,
            previous,
            current,
        } = &transition
        {
            warn!(
                working_id,
                previous = ?previous,
                current,
                "tracked gameweek matches neither previous nor current, leaving state untouched"
            );
        }

        Ok(RunReport {
            outcome: RunOutcome::Transition(transition),
            messages_sent: messages.len(),
            stored,
        })
    }

    async fn compose(
        &self,
        transition: &Transition,
        now: DateTime<Utc>,
    ) -> Result<Vec<Message>, FplError> {
        match transition {
            Transition::SeasonOver | Transition::Unknown { .. } => Ok(Vec::new()),
            Transition::GameweekJustFinished { finished, .. } => {
                let fixtures = self.feed.fixtures(*finished).await?;
                let standings = self.feed.standings().await?;
                let mut messages: Vec<Message> = reporter::format_results(&fixtures)
                    .into_iter()
                    .map(Message::Text)
                    .collect();
                messages.push(Message::Preformatted(reporter::format_standings_table(
                    &standings.name,
                    &standings.rows,
                )));
                messages.push(Message::Text(reporter::standings_link(
                    &self.settings.links,
                )));
                Ok(messages)
            }
            Transition::AwaitingDeadline { gameweek, .. } => {
                if !deadline_is_today(gameweek.deadline_time, now, self.settings.offset) {
                    debug!(
                        gameweek = gameweek.id,
                        deadline = %gameweek.deadline_time,
                        "deadline is not today"
                    );
                    return Ok(Vec::new());
                }
                let fixtures = self.feed.fixtures(gameweek.id).await?;
                let final_kickoff = self.feed.final_fixture_kickoff(gameweek.id).await?;
                let mut lines = reporter::deadline_reminder(
                    gameweek.deadline_time,
                    self.settings.offset,
                    &self.settings.links,
                );
                lines.extend(reporter::format_upcoming(&fixtures));
                if let Some(kickoff) = final_kickoff {
                    lines.push(reporter::final_kickoff_note(
                        gameweek.id,
                        kickoff,
                        self.settings.offset,
                    ));
                }
                Ok(lines.into_iter().map(Message::Text).collect())
            }
        }
    }

    async fn persist(&self, loaded_id: Option<u32>, loaded: bool, next: u32) -> Result<()> {
        if loaded && self.settings.compare_and_swap {
            let written = self
                .tracker
                .store_if(loaded_id, next)
                .await
                .context("writing working_id")?;
            if !written {
                bail!("working_id changed since it was read (expected {loaded_id:?}), not advancing to {next}");
            }
            return Ok(());
        }
        self.tracker.store(next).await.context("writing working_id")
    }
}
