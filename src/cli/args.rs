//! CLI argument definitions using clap derive

use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Shipwright - cross-platform release pipelines
///
/// Builds a desktop application for every platform in the matrix, with
/// per-platform caches, provisioning and deliverable upload.
#[derive(Parser, Debug)]
#[command(name = "shipwright")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Log output format (overrides general.log_format)
    #[arg(long, global = true, value_enum)]
    pub log_format: Option<LogFormat>,

    /// Pipeline definition (defaults to shipwright.toml found upwards)
    #[arg(short, long, global = true, env = "SHIPWRIGHT_PIPELINE")]
    pub pipeline: Option<PathBuf>,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the pipeline on every platform in the matrix
    Run(RunArgs),

    /// Show what each platform would run, without running it
    Plan(PlanArgs),

    /// Inspect or clear the build cache store
    Cache(CacheArgs),

    /// Show or initialize the pipeline definition
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

/// Arguments for the run command
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Only run these platforms (repeatable)
    #[arg(long = "platform", value_name = "NAME")]
    pub platforms: Vec<String>,

    /// Cancel remaining platforms after the first failure
    #[arg(long, conflicts_with = "no_fail_fast")]
    pub fail_fast: bool,

    /// Let every platform finish regardless of failures
    #[arg(long)]
    pub no_fail_fast: bool,

    /// Event that triggered this run
    #[arg(long, value_enum, default_value = "manual")]
    pub event: EventKind,

    /// Branch of a push event (defaults to the trigger branch)
    #[arg(long)]
    pub branch: Option<String>,

    /// Paths changed by a push event (repeatable)
    #[arg(long = "changed", value_name = "PATH")]
    pub changed: Vec<String>,

    /// Output format for the final report
    #[arg(short, long, default_value = "table")]
    pub format: OutputFormat,
}

impl RunArgs {
    /// Command-line override of the pipeline's fail-fast setting
    pub fn fail_fast_override(&self) -> Option<bool> {
        if self.fail_fast {
            Some(true)
        } else if self.no_fail_fast {
            Some(false)
        } else {
            None
        }
    }
}

/// Trigger event kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum EventKind {
    Manual,
    Push,
}

/// Arguments for the plan command
#[derive(Parser, Debug)]
pub struct PlanArgs {
    /// Only plan these platforms (repeatable)
    #[arg(long = "platform", value_name = "NAME")]
    pub platforms: Vec<String>,

    /// Output format
    #[arg(short, long, default_value = "table")]
    pub format: OutputFormat,
}

/// Output format for reports and listings
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable table
    Table,
    /// JSON output
    Json,
}

/// Log line format
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

/// Arguments for the cache command
#[derive(Parser, Debug)]
pub struct CacheArgs {
    /// Subcommand for cache
    #[command(subcommand)]
    pub action: CacheAction,
}

/// Cache subcommands
#[derive(Subcommand, Debug)]
pub enum CacheAction {
    /// List stored cache entries
    List {
        /// Output format
        #[arg(short, long, default_value = "table")]
        format: OutputFormat,
    },

    /// Remove stored cache entries
    Clear {
        /// Only remove entries of this platform
        #[arg(long)]
        platform: Option<String>,

        /// Skip confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
}

/// Arguments for the config command
#[derive(Parser, Debug)]
pub struct ConfigArgs {
    /// Subcommand for config
    #[command(subcommand)]
    pub action: Option<ConfigAction>,
}

/// Config subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show the effective pipeline definition
    Show,

    /// Show the pipeline file path
    Path,

    /// Write the default pipeline definition
    Init {
        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },
}

/// Arguments for the completions command
#[derive(Parser, Debug)]
pub struct CompletionsArgs {
    /// Target shell
    #[arg(value_enum)]
    pub shell: clap_complete::Shell,
}
