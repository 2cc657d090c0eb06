use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::time::Duration;

use session_index::cli::{active, history, index, messages, projects, sessions};
use session_index::config::Config;
use session_index::logging;
use session_index::store::IndexStore;

#[derive(Parser)]
#[command(name = "session-index")]
#[command(about = "Incremental index over JSONL conversation transcripts")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(short, long, default_value = "session-index.yaml")]
    config: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Index every configured source
    Index {
        /// Drop all checkpoints first, forcing a full reindex
        #[arg(long)]
        reset: bool,
    },

    /// Keep indexing on an interval
    Watch {
        /// Seconds between passes
        #[arg(short, long, default_value_t = 10)]
        interval: u64,
    },

    /// List indexed projects
    Projects,

    /// List sessions, most recently active first
    Sessions {
        /// Filter by project directory name
        #[arg(short, long)]
        project: Option<String>,

        /// Filter by provider (claude, codex, etc.)
        #[arg(long)]
        provider: Option<String>,

        /// Only sessions active since this date (YYYY-MM-DD or RFC 3339)
        #[arg(long)]
        since: Option<String>,

        #[arg(short, long, default_value_t = 50)]
        limit: i64,

        #[arg(long, default_value_t = 0)]
        offset: i64,
    },

    /// List a session's messages straight from its transcript
    Messages {
        project: String,
        session: String,

        /// First message number to print
        #[arg(long)]
        from: Option<usize>,

        /// Last message number to print
        #[arg(long)]
        to: Option<usize>,
    },

    /// Print one message body
    Read {
        project: String,
        session: String,
        /// Message number (1-based)
        number: usize,
    },

    /// Show prompts logged for a session
    History {
        session: String,

        /// Print only the derived session title
        #[arg(long)]
        title: bool,
    },

    /// List conversation root messages
    Roots {
        #[arg(short, long)]
        project: Option<String>,
    },

    /// Show externally running sessions
    Active {
        /// Check a single session id
        session: Option<String>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::load(&cli.config).unwrap_or_default();
    logging::init(&config.logging)?;

    match cli.command {
        Commands::Index { reset } => {
            let store = open_store(&config)?;
            index::run(&store, &config, reset)?;
        }
        Commands::Watch { interval } => {
            let runtime = tokio::runtime::Runtime::new()?;
            let watched = runtime.block_on(index::watch(
                config.database_path(),
                config.sources(),
                Duration::from_secs(interval.max(1)),
            ));
            // Don't wait on an interrupted pass; its open transaction rolls back
            runtime.shutdown_background();
            watched?;
        }
        Commands::Projects => {
            let store = open_store(&config)?;
            projects::list(&store)?;
        }
        Commands::Sessions {
            project,
            provider,
            since,
            limit,
            offset,
        } => {
            let store = open_store(&config)?;
            sessions::run(
                &store,
                sessions::ListArgs {
                    project,
                    provider,
                    since,
                    limit,
                    offset,
                },
            )?;
        }
        Commands::Messages {
            project,
            session,
            from,
            to,
        } => {
            messages::list(&config, &project, &session, from, to)?;
        }
        Commands::Read {
            project,
            session,
            number,
        } => {
            messages::read(&config, &project, &session, number)?;
        }
        Commands::History { session, title } => {
            history::run(&config, &session, title)?;
        }
        Commands::Roots { project } => {
            let store = open_store(&config)?;
            projects::roots(&store, project)?;
        }
        Commands::Active { session } => {
            active::run(&config, session.as_deref())?;
        }
    }

    Ok(())
}

fn open_store(config: &Config) -> Result<IndexStore> {
    let path = config.database_path();
    IndexStore::open(&path).with_context(|| format!("Failed to open index at {}", path.display()))
}
