//! Command-line interface.

mod commands;

use clap::{Parser, Subcommand};

/// Clinic website backend: public forms, chatbot and the admin area.
#[derive(Parser)]
#[command(name = "clinic-portal")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the web server and maintenance scheduler (default)
    Serve,

    /// Create a default config file
    #[command(alias = "--init")]
    Init,

    /// Hash an admin password read from stdin
    HashPassword,

    /// Remove expired reset tokens and stale rate limit counters
    PurgeTokens,
}

pub use commands::*;
