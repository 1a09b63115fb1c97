//! Command-line interface definition

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "hived", version, about = "Hive cluster coordination daemon")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the daemon: join the cluster and serve the submission API
    Serve {
        /// Path to a YAML configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Manage jobs through a running daemon
    Job {
        #[command(subcommand)]
        command: JobCommands,
    },

    /// Probe a daemon's liveness endpoint
    Health {
        /// Daemon base URL
        #[arg(long, default_value = "http://127.0.0.1:8080")]
        url: String,
    },

    /// Configuration helpers
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
pub enum JobCommands {
    /// Submit a job payload
    Submit {
        /// Daemon base URL
        #[arg(long, default_value = "http://127.0.0.1:8080")]
        url: String,

        /// Inline payload, e.g. '#echo:hello'
        #[arg(long, conflicts_with = "file")]
        data: Option<String>,

        /// Read the payload from a file
        #[arg(long)]
        file: Option<PathBuf>,
    },

    /// Remove a job by id
    Remove {
        /// Daemon base URL
        #[arg(long, default_value = "http://127.0.0.1:8080")]
        url: String,

        /// Job id
        id: String,
    },

    /// List stored jobs
    List {
        /// Daemon base URL
        #[arg(long, default_value = "http://127.0.0.1:8080")]
        url: String,
    },
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Print a sample configuration file
    Generate,
}
