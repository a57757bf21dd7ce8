//! CLI module - Command-line interface for vidhub

use clap::{Parser, Subcommand};

/// vidhub - accounts and sessions backend for a video-sharing app
#[derive(Parser)]
#[command(name = "vidhub")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Subcommand)]
pub enum Commands {
    /// Run the HTTP server (default)
    #[command(alias = "daemon")]
    Serve,

    /// Load and validate configuration, then print the non-secret settings
    #[command(alias = "check")]
    CheckConfig,

    /// Apply database migrations and exit
    Migrate,
}

impl Cli {
    #[must_use]
    pub fn command(&self) -> Commands {
        self.command.unwrap_or(Commands::Serve)
    }
}
