//! CLI command definitions and handlers

mod clean;
mod merge;
mod scan;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Gitstamp - last-updated metadata for documentation trees
#[derive(Parser, Debug)]
#[command(name = "gitstamp")]
#[command(
    version,
    about = "Resolve per-page last-updated timestamps and authors from git history",
    long_about = "Gitstamp walks a documentation tree, asks git when each page (or anything \
the page includes) last changed and who changed it, and keeps the answers in a small \
per-tree page store so later runs only touch what moved.\n\n\
Run without a subcommand to scan the current directory:\n  \
gitstamp .",
    after_help = "\
Examples:
  gitstamp .                            Scan current directory, print a report
  gitstamp scan docs --format json      JSON output for templating
  gitstamp scan docs --full             Ignore the store, redate every page
  gitstamp merge docs shard.json        Fold a partial scan into the store
  gitstamp clean docs                   Drop the cached page store"
)]
pub struct Cli {
    /// Path to the documentation root (default: current directory)
    #[arg(global = true, default_value = ".")]
    pub path: PathBuf,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, global = true, default_value = "warn", value_parser = ["error", "warn", "info", "debug", "trace"])]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Scan a documentation tree and refresh its page store
    #[command(after_help = "\
Examples:
  gitstamp scan .                       Scan and print a text report
  gitstamp scan docs --format json      JSON output for scripting
  gitstamp scan docs -o report.json --format json
  gitstamp scan docs --state s.json     Keep the store next to the docs
  gitstamp scan docs --full             Redate every page")]
    Scan {
        /// Output format: text, json
        #[arg(long, short = 'f', default_value = "text", value_parser = ["text", "json"])]
        format: String,

        /// Output file path (default: stdout)
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,

        /// Page store path (default: per-tree file under the user cache dir)
        #[arg(long)]
        state: Option<PathBuf>,

        /// Redate every page even when the store looks current
        #[arg(long)]
        full: bool,
    },

    /// Merge a store produced elsewhere into this tree's page store
    Merge {
        /// Page store file to fold in
        shard: PathBuf,

        /// Page store path (default: per-tree file under the user cache dir)
        #[arg(long)]
        state: Option<PathBuf>,
    },

    /// Remove the cached page store for a documentation tree
    Clean {
        /// Page store path (default: per-tree file under the user cache dir)
        #[arg(long)]
        state: Option<PathBuf>,
    },
}

pub fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Some(Commands::Scan {
            format,
            output,
            state,
            full,
        }) => scan::run(
            &cli.path,
            &format,
            output.as_deref(),
            state.as_deref(),
            full,
        ),

        Some(Commands::Merge { shard, state }) => merge::run(&cli.path, &shard, state.as_deref()),

        Some(Commands::Clean { state }) => clean::run(&cli.path, state.as_deref()),

        // Default: scan the given path with a text report
        None => scan::run(&cli.path, "text", None, None, false),
    }
}
