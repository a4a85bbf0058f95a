//! Hurricane CLI - command-line entry point for the Hurricane orchestrator.
//!
//! Provides the `hurricane` command for running the orchestrator against a
//! project, submitting goals and inspecting state.

mod commands;

use anyhow::Context;
use clap::{Parser, Subcommand};
use hurricane_core::HurricaneConfig;
use hurricane_orchestrator::Orchestrator;
use std::path::PathBuf;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_FILTER: &str = "hurricane=info,hurricane_core=info,hurricane_orchestrator=info";
const CONFIG_FILE: &str = "hurricane.toml";

/// Hurricane - autonomous task orchestration for a project directory
#[derive(Parser, Debug)]
#[command(name = "hurricane", author, version, about = "Hurricane - autonomous task orchestration")]
struct Args {
    /// Project root to orchestrate and watch
    #[arg(short, long, default_value = ".", global = true)]
    root: PathBuf,

    /// Configuration file (defaults to <root>/hurricane.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error); overrides RUST_LOG
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the orchestrator with file monitoring until Ctrl-C
    Run,

    /// Submit a goal for decomposition
    Goal {
        /// Goal title
        title: String,

        /// What the goal is about
        #[arg(short, long)]
        description: String,

        /// What done looks like
        #[arg(short, long, default_value = "")]
        outcome: String,

        /// Priority (low, medium, high, critical or 1-5)
        #[arg(short, long, default_value = "medium")]
        priority: String,

        /// Deadline as RFC 3339 (e.g. 2026-12-01T17:00:00Z)
        #[arg(long)]
        deadline: Option<String>,
    },

    /// Print the status snapshot as JSON
    Status,

    /// List unacknowledged notifications
    Notifications {
        /// Acknowledge the notification with this id instead
        #[arg(long)]
        ack: Option<String>,
    },
}

impl Command {
    /// Whether the scheduler may start planned autonomous tasks for this command.
    /// Queries and goal submission only touch state.
    fn dispatches(&self) -> bool {
        matches!(self, Self::Run)
    }
}

fn init_tracing(level: Option<&str>, json: bool) -> anyhow::Result<()> {
    let filter = match level {
        Some(level) => EnvFilter::try_new(level).with_context(|| format!("invalid log level: {}", level))?,
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER)),
    };
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).try_init()?;
    } else {
        registry.with(tracing_subscriber::fmt::layer().with_target(false)).try_init()?;
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.log_level.as_deref(), args.json_logs)?;

    let config_path = args.config.clone().unwrap_or_else(|| args.root.join(CONFIG_FILE));
    let mut config = HurricaneConfig::load(&config_path)
        .with_context(|| format!("failed to load configuration from {}", config_path.display()))?;
    if !args.command.dispatches() {
        config.scheduler.autonomous_dispatch = false;
    }

    let orchestrator = Orchestrator::open(&args.root, config)
        .await
        .context("failed to start orchestrator")?;

    let result = match args.command {
        Command::Run => commands::run::execute(&orchestrator).await,
        Command::Goal { title, description, outcome, priority, deadline } => {
            commands::goal::execute(&orchestrator, title, description, outcome, &priority, deadline.as_deref())
                .await
        }
        Command::Status => commands::status::execute(&orchestrator).await,
        Command::Notifications { ack } => commands::notifications::execute(&orchestrator, ack.as_deref()).await,
    };

    // Shut down even when the command failed so state is flushed
    let shutdown = orchestrator.shutdown().await.context("shutdown failed");
    result.and(shutdown)
}
