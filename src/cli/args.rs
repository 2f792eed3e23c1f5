use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use serde::{Deserialize, Serialize};

use crate::config::HOME_ENV;
use crate::features::sync::{ConflictResolution, Priority};

#[derive(Parser)]
#[command(name = "imarisha-sync")]
#[command(about = "Offline request outbox for the Imarisha Loans field client")]
#[command(long_about = "imarisha-sync - offline request outbox

Queues HTTP calls made while the device is offline and replays them,
highest priority and oldest first, once connectivity returns. Requests
that keep failing are moved to a dead-letter list after their retry limit.

QUICK START:
  imarisha-sync send POST https://api.example/visits -d '{\"member\":42}'
  imarisha-sync status                 Show queue counts
  imarisha-sync process                Replay the queue now
  imarisha-sync watch                  Replay whenever the device comes online

OUTPUT FORMATS:
  --output pretty    Human-readable colored output (default)
  --output json      Machine-readable JSON for scripting")]
#[command(version, propagate_version = true)]
pub struct Cli {
    /// Output format for command results
    #[arg(short, long, value_enum, global = true)]
    pub output: Option<OutputFormat>,

    /// Data directory holding config.yaml and outbox.db
    #[arg(long, global = true, env = HOME_ENV)]
    pub home: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

/// Output format for command results.
#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Human-readable colored output.
    #[default]
    Pretty,
    /// Machine-readable JSON output.
    Json,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Queue a request for later replay
    ///
    /// The request is stored without being sent.
    ///
    /// # Examples
    ///
    ///   imarisha-sync enqueue POST https://api.example/repayments -d '{"loan":7}'
    ///   imarisha-sync enqueue PUT https://api.example/members/3 -p high
    #[command(alias = "q")]
    Enqueue(RequestArgs),

    /// Send a request now, queueing it if that fails
    ///
    /// When the device is offline or the call fails the request is queued.
    Send(RequestArgs),

    /// List queued requests in replay order
    #[command(alias = "ls")]
    List,

    /// Show queue counts
    Status,

    /// Remove a queued request
    #[command(alias = "rm")]
    Remove {
        /// Request id
        id: String,
    },

    /// Remove every queued request
    Clear {
        /// Skip confirmation
        #[arg(long, short = 'f')]
        force: bool,
    },

    /// Run one processing pass now
    Process {
        /// Show the replay order without sending anything
        #[arg(long)]
        dry_run: bool,
    },

    /// Replay the queue whenever the device is online
    ///
    /// Polls connectivity and runs a pass a fixed delay after coming online
    /// or after requests are queued.
    Watch {
        /// Stop after this many polls
        #[arg(long)]
        max_ticks: Option<u64>,
    },

    /// Inspect and recover permanently failed requests
    Dead(DeadArgs),

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,

        /// Show installation instructions instead
        #[arg(long, short = 'i')]
        install: bool,
    },
}

/// Arguments describing a request.
#[derive(Args, Debug, Clone)]
pub struct RequestArgs {
    /// HTTP method (GET, POST, PUT, PATCH, DELETE)
    pub method: String,

    /// Absolute request URL
    pub url: String,

    /// Header as 'Name: value' (repeatable)
    #[arg(long = "header", short = 'H')]
    pub headers: Vec<String>,

    /// Request body
    #[arg(long, short = 'd', conflicts_with = "body_file")]
    pub body: Option<String>,

    /// Read the request body from a file
    #[arg(long)]
    pub body_file: Option<PathBuf>,

    /// Replay priority
    #[arg(long, short = 'p', value_enum)]
    pub priority: Option<Priority>,

    /// Retry ceiling for this request
    #[arg(long)]
    pub max_retries: Option<u32>,

    /// Treatment of 409 Conflict responses
    #[arg(long, value_enum)]
    pub conflict: Option<ConflictResolution>,
}

/// Arguments for dead-letter commands.
#[derive(Args)]
pub struct DeadArgs {
    #[command(subcommand)]
    pub command: DeadCommands,
}

/// Dead-letter subcommands.
#[derive(Subcommand)]
pub enum DeadCommands {
    /// List dead letters
    List,

    /// Move a dead letter back into the queue
    Retry {
        /// Request id
        id: String,
    },

    /// Delete every dead letter
    Purge {
        /// Skip confirmation
        #[arg(long, short = 'f')]
        force: bool,
    },
}
