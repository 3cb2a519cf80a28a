//! `assess` command-line front end for the assessment engine.

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use assess_core::model::{AssessmentKind, ExerciseId, SessionId, SubjectId, Topic};

mod commands;
mod db;

#[derive(Parser)]
#[command(name = "assess", version, about = "Adaptive assessment engine")]
struct Cli {
    /// Database URL or path
    #[arg(long, global = true, env = "ASSESS_DB_URL", default_value = "sqlite://assess.sqlite3")]
    db: String,

    /// Engine config file (TOML)
    #[arg(long, global = true, env = "ASSESS_CONFIG")]
    config: Option<PathBuf>,

    /// Fix the selection shuffle for reproducible runs
    #[arg(long, global = true, env = "ASSESS_SEED", hide = true)]
    seed: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Import a TOML exercise catalog
    Seed {
        /// Path to the catalog file
        #[arg(long)]
        catalog: PathBuf,
    },

    /// Start a session and print its first question
    Start {
        #[arg(long)]
        subject: SubjectId,

        /// placement, progress or practice
        #[arg(long, default_value = "placement")]
        kind: AssessmentKind,

        /// Number of questions (config default when omitted)
        #[arg(long)]
        total: Option<u32>,

        /// Restrict to topics, in rotation order (repeatable)
        #[arg(long = "topic")]
        topics: Vec<Topic>,
    },

    /// Show the session and its pending question
    Question {
        #[arg(long)]
        subject: SubjectId,

        #[arg(long)]
        session: SessionId,
    },

    /// Answer the pending question
    Answer {
        #[arg(long)]
        subject: SubjectId,

        #[arg(long)]
        session: SessionId,

        /// The answer text
        #[arg(long)]
        text: String,

        /// Exercise being answered; rejects the answer if it is no longer current
        #[arg(long)]
        exercise: Option<ExerciseId>,

        #[arg(long)]
        latency_ms: Option<u32>,
    },

    /// Abandon a running session
    Abandon {
        #[arg(long)]
        subject: SubjectId,

        #[arg(long)]
        session: SessionId,
    },

    /// Print the result profile of a completed session
    Result {
        #[arg(long)]
        subject: SubjectId,

        #[arg(long)]
        session: SessionId,
    },

    /// List a subject's sessions, newest first
    History {
        #[arg(long)]
        subject: SubjectId,

        #[arg(long, default_value = "20")]
        limit: u32,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let engine = commands::open_engine(&cli.db, cli.config.as_deref(), cli.seed).await?;

    let output = match cli.command {
        Commands::Seed { catalog } => commands::seed(&engine, &catalog).await?,
        Commands::Start {
            subject,
            kind,
            total,
            topics,
        } => commands::start(&engine, &subject, kind, total, &topics).await?,
        Commands::Question { subject, session } => {
            commands::question(&engine, &subject, session).await?
        }
        Commands::Answer {
            subject,
            session,
            text,
            exercise,
            latency_ms,
        } => commands::answer(&engine, &subject, session, text, exercise, latency_ms).await?,
        Commands::Abandon { subject, session } => {
            commands::abandon(&engine, &subject, session).await?
        }
        Commands::Result { subject, session } => {
            commands::result(&engine, &subject, session).await?
        }
        Commands::History { subject, limit } => {
            commands::history(&engine, &subject, limit).await?
        }
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
