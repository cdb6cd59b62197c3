//! Memwatch CLI
//!
//! A command-line client for the memwatch server: browse systems and the
//! fleet, inspect alerts and server health, and replay recorded telemetry.

pub mod client;
pub mod commands;
pub mod output;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Memwatch CLI
#[derive(Parser)]
#[command(name = "mwctl")]
#[command(author, version, about = "CLI for the Memwatch telemetry service", long_about = None)]
pub struct Cli {
    /// Server URL (can also be set via MEMWATCH_API_URL env var)
    #[arg(long, env = "MEMWATCH_API_URL", default_value = "http://localhost:8080")]
    pub api_url: String,

    /// Output format
    #[arg(long, short, default_value = "table")]
    pub format: output::OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List systems that have reported
    Systems,

    /// Inspect a single system
    #[command(subcommand)]
    System(SystemCommands),

    /// Show fleet averages and memory pressure
    Fleet,

    /// Show current alerts
    Alerts {
        /// Only show alerts at or above this severity (warning, critical)
        #[arg(long)]
        severity: Option<String>,
    },

    /// Show server component health
    Health,

    /// Send a newline-delimited JSON file of reports to the server
    Ingest {
        /// Path to the file
        file: PathBuf,
    },
}

#[derive(Subcommand)]
pub enum SystemCommands {
    /// Show averages, ratio and status
    Summary {
        /// System ID
        system_id: String,
    },

    /// Show the latest snapshot
    Latest {
        /// System ID
        system_id: String,
    },

    /// Show recent snapshots, oldest first
    History {
        /// System ID
        system_id: String,

        /// Number of snapshots (defaults to the server's trend window)
        #[arg(long, short)]
        limit: Option<usize>,
    },

    /// Show the latest reading per process
    Processes {
        /// System ID
        system_id: String,
    },
}
