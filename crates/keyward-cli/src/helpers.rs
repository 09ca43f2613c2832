//! Shared helpers for the CLI binary.

use std::io::{self, BufRead, IsTerminal};

use anyhow::{Context, Result, bail};
use keyward_vault::VaultConfig;
use tracing_subscriber::EnvFilter;

// ---------------------------------------------------------------------------
// Tracing
// ---------------------------------------------------------------------------

/// Initialize the tracing subscriber with the given default log level.
///
/// `RUST_LOG` takes precedence when set.
pub fn init_tracing(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .compact()
        .init();
}

// ---------------------------------------------------------------------------
// Secrets
// ---------------------------------------------------------------------------

/// Read one API key line from stdin.
pub fn read_secret() -> Result<String> {
    if io::stdin().is_terminal() {
        eprint!("API key: ");
    }

    let mut line = String::new();
    let read = io::stdin()
        .lock()
        .read_line(&mut line)
        .context("failed to read API key from stdin")?;
    if read == 0 {
        bail!("no API key on stdin");
    }

    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

/// Mask a secret for display, keeping a short prefix and suffix.
pub fn mask(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    if chars.len() <= 8 {
        return "*".repeat(chars.len().max(4));
    }
    let head: String = chars[..3].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{head}...{tail}")
}

/// Render epoch milliseconds as RFC 3339 in UTC.
pub fn format_timestamp(epoch_ms: i64) -> String {
    chrono::DateTime::from_timestamp_millis(epoch_ms)
        .map(|dt| dt.to_rfc3339_opts(chrono::SecondsFormat::Secs, true))
        .unwrap_or_else(|| epoch_ms.to_string())
}

/// Status lines for the configured guard limits.
pub fn describe_limits(config: &VaultConfig) -> [String; 2] {
    [
        format!(
            "lockout:   {} failed writes per {}s",
            config.max_failed_attempts,
            config.lockout_window.as_secs()
        ),
        format!(
            "rate:      {} requests per {}s",
            config.max_requests_per_window,
            config.rate_limit_window.as_secs()
        ),
    ]
}
