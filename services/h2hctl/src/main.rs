use anyhow::Result;
use clap::{Parser, Subcommand};
use serde_json::json;
use storage::{init_sqlite, SqliteTracker, Store, TrackerStore};

#[derive(Parser, Debug)]
#[command(name = "h2hctl", about = "Inspect and repair h2hd's persisted state")]
struct Cli {
    #[arg(long, env = "SQLITE_PATH", default_value = "sqlite://h2h.db")]
    sqlite_path: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show the tracked gameweek.
    Status,
    /// Force the tracked gameweek, e.g. to recover from an unknown state.
    Set { gameweek: u32 },
    /// Forget the tracked gameweek; the next run starts uninitialized.
    Clear,
    /// List recent incidents, newest first.
    Incidents {
        #[arg(long, default_value_t = 20)]
        limit: u32,
    },
}

async fn execute(store: Store, command: Command) -> Result<serde_json::Value> {
    let tracker = SqliteTracker::new(store.clone());
    let output = match command {
        Command::Status => json!({ "working_id": tracker.load().await? }),
        Command::Set { gameweek } => {
            let previous = tracker.load().await?;
            tracker.store(gameweek).await?;
            json!({ "working_id": gameweek, "previous": previous })
        }
        Command::Clear => json!({ "cleared": tracker.clear().await? }),
        Command::Incidents { limit } => serde_json::to_value(store.recent_incidents(limit).await?)?,
    };
    Ok(output)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let store = init_sqlite(&cli.sqlite_path).await?;
    let output = execute(store, cli.command).await?;
    println!("{}", serde_json::to_string(&output)?);
    Ok(())
}
