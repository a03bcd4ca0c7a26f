mod audit;
mod db_path;

use std::{net::SocketAddr, time::Duration};

use anyhow::bail;
use audit::AuditedSink;
use chat::{LogSink, MessageSink, TelegramConfig, TelegramSink};
use chrono::{FixedOffset, Offset, Utc};
use clap::Parser;
use db_path::{ensure_sqlite_parent_dir, validate_sqlite_path};
use fpl_api::{FplClient, FplConfig, DEFAULT_API_BASE};
use metrics::MetricsHandle;
use notifier::{Notifier, NotifierSettings, RunOutcome, RunReport, Transition};
use reporter::{Links, DEFAULT_SITE_BASE};
use storage::{init_sqlite, SqliteTracker, Store, TrackerStore};
use tokio::task;
use tokio::time::{self, MissedTickBehavior};
use tracing::{error, info, warn, Level};
use uuid::Uuid;

#[derive(Parser, Debug)]
#[command(name = "h2hd", about = "Posts head-to-head league results and deadlines to a group chat")]
struct Args {
    #[arg(long, env = "LEAGUE_ID")]
    league_id: String,

    #[arg(long, env = "FPL_API_BASE", default_value = DEFAULT_API_BASE)]
    api_base: String,

    #[arg(long, env = "FPL_SITE_BASE", default_value = DEFAULT_SITE_BASE)]
    site_base: String,

    #[arg(long, env = "FPL_COOKIE", hide_env_values = true)]
    fpl_cookie: Option<String>,

    #[arg(long, env = "TELEGRAM_BOT_TOKEN", hide_env_values = true)]
    telegram_bot_token: Option<String>,

    #[arg(long, env = "TELEGRAM_CHAT_ID")]
    telegram_chat_id: Option<String>,

    #[arg(long, env = "SQLITE_PATH", default_value = "sqlite://h2h.db")]
    sqlite_path: String,

    /// Offset in which "today" is evaluated, e.g. `+01:00`.
    #[arg(long, env = "UTC_OFFSET", default_value = "+00:00", value_parser = parse_utc_offset)]
    utc_offset: FixedOffset,

    /// Log messages instead of sending them.
    #[arg(long, env = "DRY_RUN")]
    dry_run: bool,

    #[arg(long, env = "UPSTREAM_RETRIES", default_value_t = 2)]
    upstream_retries: u32,

    #[arg(long, env = "UPSTREAM_BACKOFF_MS", default_value_t = 500)]
    upstream_backoff_ms: u64,

    /// Overwrite working_id without checking it is unchanged since it was read.
    #[arg(long)]
    no_compare_and_swap: bool,

    /// Keep running and invoke the notifier on this interval.
    #[arg(long, env = "WATCH_EVERY_SECS")]
    watch_every_secs: Option<u64>,

    #[arg(long, env = "METRICS_ADDR", default_value = "127.0.0.1:9109")]
    metrics_addr: SocketAddr,
}

fn parse_utc_offset(raw: &str) -> Result<FixedOffset, String> {
    let raw = raw.trim();
    if raw.eq_ignore_ascii_case("z") || raw.eq_ignore_ascii_case("utc") {
        return Ok(Utc.fix());
    }
    raw.parse::<FixedOffset>()
        .map_err(|err| format!("offset `{raw}` must look like +HH:MM: {err}"))
}

fn log_startup(args: &Args, run_id: &str) {
    info!(path = %args.sqlite_path, "sqlite path configured");
    info!(league = %args.league_id, api = %args.api_base, "league configured");
    info!(offset = %args.utc_offset, "deadline day evaluated at offset");
    if args.dry_run {
        info!("dry run, messages will only be logged");
    }
    match args.watch_every_secs {
        Some(secs) => info!(every_secs = secs, addr = %args.metrics_addr, "watch mode"),
        None => info!("single invocation"),
    }
    info!(%run_id, "run initialized");
}

fn build_sink(args: &Args) -> anyhow::Result<Box<dyn MessageSink>> {
    if args.dry_run {
        return Ok(Box::new(LogSink));
    }
    let (Some(token), Some(chat_id)) = (&args.telegram_bot_token, &args.telegram_chat_id) else {
        bail!("TELEGRAM_BOT_TOKEN and TELEGRAM_CHAT_ID are required unless --dry-run is set");
    };
    Ok(Box::new(TelegramSink::new(TelegramConfig::new(
        token.clone(),
        chat_id.clone(),
    ))))
}

fn outcome_label(report: &RunReport) -> &'static str {
    match &report.outcome {
        RunOutcome::Maintenance => "maintenance",
        RunOutcome::Transition(Transition::SeasonOver) => "season_over",
        RunOutcome::Transition(Transition::GameweekJustFinished { .. }) => "results",
        RunOutcome::Transition(Transition::AwaitingDeadline { .. }) if report.messages_sent > 0 => {
            "reminder"
        }
        RunOutcome::Transition(Transition::AwaitingDeadline { .. }) => "idle",
        RunOutcome::Transition(Transition::Unknown { .. }) => "unknown_state",
    }
}

type H2hNotifier = Notifier<FplClient, SqliteTracker>;

struct Runtime {
    notifier: H2hNotifier,
    sink: AuditedSink,
    store: Store,
    metrics: MetricsHandle,
    run_id: String,
}

impl Runtime {
    async fn invoke(&self) -> anyhow::Result<RunReport> {
        let report = match self.notifier.run_once(&self.sink, Utc::now()).await {
            Ok(report) => report,
            Err(err) => {
                self.metrics.record_run("failed", 0);
                self.incident("error", "run_failed", &format!("{err:#}")).await;
                return Err(err);
            }
        };

        let label = outcome_label(&report);
        self.metrics.record_run(label, report.messages_sent);
        if let Some(id) = report.stored {
            self.metrics.set_working_id(id);
        }
        match &report.outcome {
            RunOutcome::Maintenance => {
                self.incident("info", "maintenance", "upstream is being updated, run skipped")
                    .await;
            }
            RunOutcome::Transition(Transition::Unknown {
                working_id,
                previous,
                current,
            }) => {
                let message = format!(
                    "working_id {working_id} matches neither previous {previous:?} nor current {current}"
                );
                self.incident("warning", "unknown_state", &message).await;
            }
            RunOutcome::Transition(_) => {}
        }
        info!(
            run_id = %self.run_id,
            outcome = label,
            messages = report.messages_sent,
            stored = ?report.stored,
            "run finished"
        );
        Ok(report)
    }

    async fn incident(&self, severity: &str, kind: &str, message: &str) {
        if let Err(err) = self
            .store
            .log_incident(&self.run_id, severity, kind, message)
            .await
        {
            warn!(error = ?err, kind, "failed to record incident");
        }
    }

    async fn watch(self, every: Duration, metrics_addr: SocketAddr) -> anyhow::Result<()> {
        let metrics_task = self.metrics.clone();
        task::spawn(async move {
            if let Err(err) = metrics_task.serve(metrics_addr).await {
                error!(error = ?err, "metrics server error");
            }
        });

        let mut ticker = time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if let Err(err) = self.invoke().await {
                error!(error = ?err, "run failed, retrying on next tick");
            }
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    validate_sqlite_path(&args.sqlite_path)?;
    info!(
        sqlite = %args.sqlite_path,
        league = %args.league_id,
        "booting h2hd"
    );

    ensure_sqlite_parent_dir(&args.sqlite_path)?;

    let run_id = Uuid::new_v4().to_string();
    let store = init_sqlite(&args.sqlite_path).await?;
    store.insert_run(&run_id, option_env!("GIT_SHA")).await?;
    log_startup(&args, &run_id);

    let missing_tables = store.validate_required_tables().await?;
    if !missing_tables.is_empty() {
        warn!(tables = ?missing_tables, "sqlite missing required tables");
        bail!("sqlite missing required tables: {}", missing_tables.join(", "));
    }

    let feed = FplClient::new(
        FplConfig::new(&args.league_id)
            .with_api_base(&args.api_base)
            .with_cookie(args.fpl_cookie.clone())
            .with_retries(
                args.upstream_retries,
                Duration::from_millis(args.upstream_backoff_ms),
            ),
    )?;
    let tracker = SqliteTracker::new(store.clone());
    let metrics = MetricsHandle::new()?;
    if let Ok(Some(id)) = tracker.load().await {
        metrics.set_working_id(id);
    }

    let settings = NotifierSettings {
        offset: args.utc_offset,
        links: Links::new(&args.site_base, &args.league_id),
        compare_and_swap: !args.no_compare_and_swap,
    };
    let runtime = Runtime {
        notifier: Notifier::new(feed, tracker, settings),
        sink: AuditedSink::new(build_sink(&args)?, store.clone(), run_id.clone()),
        store,
        metrics,
        run_id,
    };

    match args.watch_every_secs {
        Some(secs) => {
            runtime
                .watch(Duration::from_secs(secs.max(1)), args.metrics_addr)
                .await
        }
        None => runtime.invoke().await.map(|_| ()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use tracing_subscriber::fmt::MakeWriter;

    #[derive(Clone)]
    struct VecWriter(Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for VecWriter {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            let mut guard = self.0.lock().unwrap();
            guard.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl<'a> MakeWriter<'a> for VecWriter {
        type Writer = VecWriter;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    fn args(extra: &[&str]) -> Args {
        let mut argv = vec!["h2hd", "--league-id", "314"];
        argv.extend_from_slice(extra);
        Args::parse_from(argv)
    }

    #[test]
    fn startup_logs_include_configuration() {
        let args = args(&[
            "--sqlite-path",
            "sqlite:///tmp/h2h-test.db",
            "--utc-offset",
            "+01:00",
            "--dry-run",
        ]);
        let run_id = Uuid::nil().to_string();
        let buffer = Arc::new(Mutex::new(Vec::new()));
        let writer = VecWriter(buffer.clone());
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(Level::INFO)
            .with_writer(writer)
            .finish();

        tracing::subscriber::with_default(subscriber, || {
            log_startup(&args, &run_id);
        });

        let output =
            String::from_utf8(buffer.lock().unwrap().clone()).expect("log output should be utf8");
        assert!(output.contains("sqlite path configured"));
        assert!(output.contains("league configured"));
        assert!(output.contains("dry run"));
        assert!(output.contains("single invocation"));
        assert!(output.contains(&args.sqlite_path));
        assert!(output.contains("314"));
        assert!(output.contains("+01:00"));
        assert!(output.contains(&run_id));
    }

    #[test]
    fn parses_utc_offsets() {
        assert_eq!(parse_utc_offset("+01:00").unwrap().local_minus_utc(), 3600);
        assert_eq!(parse_utc_offset("-05:30").unwrap().local_minus_utc(), -19800);
        assert_eq!(parse_utc_offset(" +10:00 ").unwrap().local_minus_utc(), 36000);
        assert_eq!(parse_utc_offset("UTC").unwrap().local_minus_utc(), 0);
        assert_eq!(parse_utc_offset("z").unwrap().local_minus_utc(), 0);
        assert!(parse_utc_offset("01:00").is_err());
        assert!(parse_utc_offset("+1:00").is_err());
        assert!(parse_utc_offset("+01:75").is_err());
    }

    #[test]
    fn defaults_favour_safe_single_runs() {
        let args = args(&[]);
        assert_eq!(args.api_base, DEFAULT_API_BASE);
        assert_eq!(args.utc_offset.local_minus_utc(), 0);
        assert_eq!(args.upstream_retries, 2);
        assert!(!args.no_compare_and_swap);
        assert!(args.watch_every_secs.is_none());
    }

    #[test]
    fn telegram_credentials_required_outside_dry_run() {
        let err = build_sink(&args(&[]))
            .err()
            .expect("missing credentials should fail");
        assert!(err.to_string().contains("TELEGRAM_BOT_TOKEN"));
        assert!(build_sink(&args(&["--dry-run"])).is_ok());
        assert!(build_sink(&args(&[
            "--telegram-bot-token",
            "123:abc",
            "--telegram-chat-id",
            "-1001"
        ]))
        .is_ok());
    }

    #[test]
    fn labels_outcomes_for_metrics() {
        let report = |outcome, messages_sent| RunReport {
            outcome,
            messages_sent,
            stored: None,
        };
        assert_eq!(outcome_label(&report(RunOutcome::Maintenance, 0)), "maintenance");
        assert_eq!(
            outcome_label(&report(
                RunOutcome::Transition(Transition::GameweekJustFinished {
                    finished: 3,
                    next: 4
                }),
                6
            )),
            "results"
        );
        assert_eq!(
            outcome_label(&report(RunOutcome::Transition(Transition::SeasonOver), 0)),
            "season_over"
        );
    }
}
