//! CLI entry point for keyward.
//!
//! This binary provides the `keyward` command for storing, reading and
//! removing session-scoped API keys, and for housekeeping on the session
//! database.

mod cli;
mod helpers;

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::Parser;
use keyward_store::{Clock, SqliteSessionStore, SystemClock};
use keyward_vault::{AbuseGuard, CredentialVault, GuardConfig, MasterKey, VaultConfig, VaultError};
use tracing::{debug, info};

use crate::cli::{Cli, Commands};
use crate::helpers::{describe_limits, format_timestamp, init_tracing, mask, read_secret};

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> ExitCode {
    // A missing .env is fine; the environment may already carry the key.
    let dotenv = dotenvy::dotenv();

    let cli = Cli::parse();
    init_tracing(if cli.verbose { "debug" } else { "warn" });
    if let Ok(path) = dotenv {
        debug!(path = %path.display(), "loaded .env");
    }

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            report(&err);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    match &cli.command {
        Commands::Keygen => cmd_keygen(),
        Commands::Set { provider } => cmd_set(&open_app(&cli)?, provider).await,
        Commands::Get { provider, reveal } => cmd_get(&open_app(&cli)?, provider, *reveal).await,
        Commands::Remove { provider } => cmd_remove(&open_app(&cli)?, provider).await,
        Commands::Status { provider } => cmd_status(&open_app(&cli)?, provider).await,
        Commands::EndSession => cmd_end_session(&open_app(&cli)?).await,
        Commands::Purge => cmd_purge(&open_app(&cli)?).await,
    }
}

/// Expected conditions get their stable user-facing reason; anything else
/// gets the full error chain.
fn report(err: &anyhow::Error) {
    match err.downcast_ref::<VaultError>() {
        Some(vault_err) if vault_err.is_expected() => {
            eprintln!("error: {}", vault_err.user_message());
        }
        _ => eprintln!("error: {err:#}"),
    }
}

// ---------------------------------------------------------------------------
// Wiring
// ---------------------------------------------------------------------------

struct App {
    store: SqliteSessionStore,
    vault: CredentialVault,
}

fn open_app(cli: &Cli) -> Result<App> {
    let config = VaultConfig::load(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let store = SqliteSessionStore::open(&cli.db, &cli.session, Arc::clone(&clock))
        .with_context(|| format!("failed to open session store {}", cli.db.display()))?;

    let guard = Arc::new(AbuseGuard::new(
        GuardConfig::from(&config),
        Arc::clone(&clock),
    ));
    let vault = CredentialVault::new(
        Arc::new(store.clone()),
        guard,
        MasterKey::from_env(),
        clock,
        config,
    );

    info!(session = %cli.session, db = %cli.db.display(), "vault opened");
    Ok(App { store, vault })
}

// ---------------------------------------------------------------------------
// Subcommands
// ---------------------------------------------------------------------------

fn cmd_keygen() -> Result<()> {
    let key = MasterKey::generate().context("failed to generate key")?;
    println!("ENCRYPTION_KEY={}", key.to_base64());
    Ok(())
}

async fn cmd_set(app: &App, provider: &str) -> Result<()> {
    let secret = read_secret()?;
    app.vault.set_credential(provider, &secret).await?;

    let expires = app
        .vault
        .expires_at(provider)
        .await
        .map(format_timestamp)
        .unwrap_or_else(|| "unknown".into());
    println!("stored API key for {provider} (expires {expires})");
    Ok(())
}

async fn cmd_get(app: &App, provider: &str, reveal: bool) -> Result<()> {
    let Some(secret) = app.vault.get_credential(provider).await else {
        bail!("no API key stored for {provider}");
    };

    if reveal {
        println!("{secret}");
    } else {
        println!("{}", mask(&secret));
    }
    Ok(())
}

async fn cmd_remove(app: &App, provider: &str) -> Result<()> {
    app.vault.remove_credential(provider).await?;
    println!("removed API key for {provider}");
    Ok(())
}

async fn cmd_status(app: &App, provider: &str) -> Result<()> {
    let stored = match app.vault.expires_at(provider).await {
        Some(at) => format!("yes, expires {}", format_timestamp(at)),
        None => "no".to_string(),
    };

    // Lockout and rate counters live in the guard, which is per process, so
    // only the configured limits are meaningful here.
    println!("provider:  {provider}");
    println!("session:   {}", app.store.session_id());
    println!("stored:    {stored}");
    for line in describe_limits(app.vault.config()) {
        println!("{line}");
    }
    Ok(())
}

async fn cmd_end_session(app: &App) -> Result<()> {
    let removed = app
        .store
        .end_session()
        .await
        .context("failed to end session")?;
    println!(
        "ended session {} ({removed} entries removed)",
        app.store.session_id()
    );
    Ok(())
}

async fn cmd_purge(app: &App) -> Result<()> {
    let removed = app
        .store
        .purge_expired()
        .await
        .context("failed to purge expired entries")?;
    println!("purged {removed} expired entries");
    Ok(())
}
