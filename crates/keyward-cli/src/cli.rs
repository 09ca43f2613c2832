//! CLI argument definitions for keyward.
//!
//! All `clap` structures live here so that `main.rs` stays focused on
//! dispatching subcommands.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// keyward -- encrypted, expiring API key storage.
#[derive(Parser)]
#[command(
    name = "keyward",
    version,
    about = "keyward -- session-scoped, encrypted API key vault",
    long_about = "Stores third-party API keys encrypted at rest for the length of a session, \
                  with per-provider lockout and rate limiting."
)]
pub struct Cli {
    /// SQLite database holding session entries.
    #[arg(long, global = true, default_value = "data/keyward.db")]
    pub db: PathBuf,

    /// Session scope. Ending a session deletes everything stored under it.
    #[arg(long, global = true, env = "KEYWARD_SESSION", default_value = "default")]
    pub session: String,

    /// Configuration file. A missing file means built-in defaults.
    #[arg(long, global = true, default_value = "config/default.toml")]
    pub config: PathBuf,

    /// Log at debug level (overridden by RUST_LOG).
    #[arg(long, short, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Print a fresh random master key for ENCRYPTION_KEY.
    Keygen,

    /// Store an API key. The key is read from stdin, never from arguments.
    Set {
        /// Provider identifier, e.g. `openai`.
        provider: String,
    },

    /// Show the stored API key for a provider.
    Get {
        provider: String,

        /// Print the full key instead of a masked form.
        #[arg(long)]
        reveal: bool,
    },

    /// Delete the stored API key for a provider.
    Remove { provider: String },

    /// Show whether a provider has a live key, and the configured limits.
    Status { provider: String },

    /// Delete every entry of the current session.
    EndSession,

    /// Delete expired entries in the current session.
    Purge,
}
