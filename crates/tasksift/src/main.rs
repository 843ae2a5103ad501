//! CLI entry point for tasksift.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, fmt::format::FmtSpan};

use commands::CriterionArg;

mod commands;
mod tui;

/// Task filters built from stacked criteria.
#[derive(Parser, Debug)]
#[command(
    name = "tasksift",
    version,
    about = "tasksift: build task filters from stacked criteria and see what each one matches"
)]
struct Cli {
    /// Project directory holding `.tasksift/` (defaults to current).
    #[arg(long, global = true)]
    dir: Option<PathBuf>,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create and list tasks.
    #[command(subcommand)]
    Task(TaskCommand),

    /// List the criteria filters can be built from.
    Criteria,

    /// Build, save and organise filters.
    #[command(subcommand)]
    Filter(FilterCommand),

    /// Launch the interactive filter editor.
    Tui {
        /// Saved filter to open, by id or title.
        #[arg(long)]
        filter: Option<String>,
    },
}

#[derive(Subcommand, Debug)]
enum TaskCommand {
    /// Create a new task.
    Add {
        #[arg(long)]
        title: String,
        #[arg(long, default_value = "")]
        notes: String,
        /// 0 (highest) to 3 (none).
        #[arg(long)]
        importance: Option<u8>,
        /// RFC 3339 timestamp or a token such as `EOD+1`.
        #[arg(long)]
        due: Option<String>,
        #[arg(short = 't', long = "tag")]
        tags: Vec<String>,
        #[arg(long)]
        list: Option<String>,
        #[arg(long)]
        parent: Option<i64>,
        /// Pre-fill fields from a saved filter, by id or title.
        #[arg(long)]
        filter: Option<String>,
    },

    /// List tasks matching criteria or a saved filter.
    Ls {
        /// `[and:|or:|not:]identifier[=value[,value...]]`
        #[arg(short = 'c', long = "criterion")]
        criteria: Vec<CriterionArg>,
        /// Saved filter, by id or title.
        #[arg(long, conflicts_with = "criteria")]
        filter: Option<String>,
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Mark a task completed.
    Done { id: i64 },
}

#[derive(Subcommand, Debug)]
enum FilterCommand {
    /// Show the rows, counts and SQL for a list of criteria.
    Preview {
        #[arg(short = 'c', long = "criterion", required = true)]
        criteria: Vec<CriterionArg>,
    },

    /// Save a list of criteria as a named filter.
    Save {
        #[arg(long)]
        title: String,
        #[arg(short = 'c', long = "criterion", required = true)]
        criteria: Vec<CriterionArg>,
    },

    /// Show a saved filter with fresh counts.
    Show { filter: String },

    /// List saved filters.
    Ls,

    /// Move a saved filter to a position in the list.
    Mv { filter: String, position: usize },

    /// Delete a saved filter.
    Rm { filter: String },

    /// Retitle a saved filter.
    Rename { filter: String, title: String },
}

fn main() -> Result<()> {
    let Cli { dir, cmd } = Cli::parse();

    if should_install_tracing(&cmd) {
        install_tracing();
    }

    let workdir = dir.unwrap_or_else(|| PathBuf::from("."));
    commands::execute(&workdir, cmd)
}

/// The TUI owns the terminal; it silences logging itself.
const fn should_install_tracing(cmd: &Command) -> bool {
    !matches!(cmd, Command::Tui { .. })
}

fn install_tracing() {
    // RUST_LOG is honoured; INFO otherwise.
    let filter = EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into());
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_span_events(FmtSpan::NONE)
        .with_writer(std::io::stderr)
        .compact()
        .try_init();
}
