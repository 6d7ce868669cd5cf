//! Command-line interface for classnote.
//!
//! Provides commands for running the API server, sweeping expired audio,
//! and inspecting or adjusting per-user storage quotas.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use crate::config::{self, ResolvedConfig};
use crate::domain::UserId;
use crate::quota::{parse_limit, QuotaLedger};
use crate::retention::{LocalAudioStorage, RetentionSweeper};
use crate::store::SqliteStore;

/// classnote - Lecture recording notes with storage quotas and audio retention
#[derive(Parser, Debug)]
#[command(name = "classnote")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the HTTP API (and the retention scheduler)
    Serve {
        /// Address to bind to (overrides config)
        #[arg(short, long)]
        bind: Option<String>,
    },

    /// Run one retention sweep now
    Sweep,

    /// Show what the next sweep would delete
    CleanupStatus,

    /// Show a user's storage usage
    Storage {
        /// User ID
        user_id: UserId,
    },

    /// Change a user's storage limit
    SetLimit {
        /// User ID
        user_id: UserId,

        /// New limit in bytes (non-negative integer)
        #[arg(allow_negative_numbers = true)]
        limit: String,
    },

    /// Create a user
    AddUser {
        /// Unique username
        username: String,

        /// Unique email address
        email: String,

        /// Storage limit in bytes (defaults to the configured limit)
        #[arg(short, long, allow_negative_numbers = true)]
        limit: Option<String>,
    },

    /// Show resolved configuration (debug)
    Config,
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(self) -> Result<()> {
        let cfg = config::config()?;

        match self.command {
            Commands::Serve { bind } => {
                let mut cfg = cfg.clone();
                if let Some(bind) = bind {
                    cfg.bind = bind;
                }
                crate::server::serve(&cfg).await
            }
            Commands::Sweep => run_sweep(cfg).await,
            Commands::CleanupStatus => show_cleanup_status(cfg).await,
            Commands::Storage { user_id } => show_storage(cfg, user_id).await,
            Commands::SetLimit { user_id, limit } => set_limit(cfg, user_id, &limit).await,
            Commands::AddUser {
                username,
                email,
                limit,
            } => add_user(cfg, &username, &email, limit.as_deref()).await,
            Commands::Config => show_config(cfg),
        }
    }
}

fn open_store(cfg: &ResolvedConfig) -> Result<Arc<SqliteStore>> {
    if let Some(parent) = cfg.database_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let store = SqliteStore::open(&cfg.database_path)
        .with_context(|| format!("Failed to open database {}", cfg.database_path.display()))?;
    Ok(Arc::new(store))
}

fn open_sweeper(cfg: &ResolvedConfig, store: Arc<SqliteStore>) -> RetentionSweeper {
    let audio = Arc::new(LocalAudioStorage::new(cfg.audio_dir.clone()));
    RetentionSweeper::new(audio, cfg.retention).with_hook(store)
}

/// Run one sweep cycle and report what it removed
async fn run_sweep(cfg: &ResolvedConfig) -> Result<()> {
    let store = open_store(cfg)?;
    let sweeper = open_sweeper(cfg, store);
    let summary = sweeper.run_cleanup_once().await;

    println!("Deleted: {} file(s)", summary.deleted_count);
    println!("Freed:   {}", format_bytes(summary.freed_bytes));
    if summary.skipped_count > 0 {
        println!("Skipped: {} file(s) could not be deleted", summary.skipped_count);
    }

    Ok(())
}

/// Dry-run view of the next sweep
async fn show_cleanup_status(cfg: &ResolvedConfig) -> Result<()> {
    let audio = Arc::new(LocalAudioStorage::new(cfg.audio_dir.clone()));
    let sweeper = RetentionSweeper::new(audio, cfg.retention);
    let status = sweeper.status().await;

    println!("Audio directory:  {}", cfg.audio_dir.display());
    println!(
        "Retention window: {}h",
        cfg.retention.retention_window.as_secs() / 3600
    );
    println!();
    println!("Files:     {} ({})", status.total_files, format_bytes(status.total_bytes));
    println!(
        "Expired:   {} ({})",
        status.files_to_delete,
        format_bytes(status.bytes_to_free)
    );

    Ok(())
}

async fn show_storage(cfg: &ResolvedConfig, user_id: UserId) -> Result<()> {
    let ledger = QuotaLedger::new(open_store(cfg)?);
    let info = ledger.storage_info(user_id).await?;

    println!("User:      {}", user_id);
    print_storage(info.limit_bytes, info.used_bytes, info.remaining_bytes);

    Ok(())
}

async fn set_limit(cfg: &ResolvedConfig, user_id: UserId, raw_limit: &str) -> Result<()> {
    let limit = parse_limit(raw_limit)?;
    let ledger = QuotaLedger::new(open_store(cfg)?);
    let info = ledger.set_limit(user_id, limit).await?;

    println!("Updated storage limit for user {}", user_id);
    print_storage(info.limit_bytes, info.used_bytes, info.remaining_bytes);

    Ok(())
}

async fn add_user(
    cfg: &ResolvedConfig,
    username: &str,
    email: &str,
    raw_limit: Option<&str>,
) -> Result<()> {
    let limit = match raw_limit {
        Some(raw) => parse_limit(raw)?,
        None => cfg.default_storage_limit_bytes,
    };

    let store = open_store(cfg)?;
    let user = store
        .create_user(username, email, Some(limit))
        .await
        .with_context(|| format!("Failed to create user {}", username))?;

    println!("Created user {} ({})", user.id, user.username);
    println!("Limit:     {}", format_bytes_signed(user.storage_limit_bytes));

    Ok(())
}

fn show_config(cfg: &ResolvedConfig) -> Result<()> {
    let config_file = cfg
        .config_file
        .as_ref()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "(none - using defaults)".to_string());
    println!("Config file: {}", config_file);
    println!();
    println!("Paths:");
    println!("  Home:     {}", cfg.home.display());
    println!("  Database: {}", cfg.database_path.display());
    println!("  Audio:    {}", cfg.audio_dir.display());
    println!();
    println!("Server:");
    println!("  Bind:            {}", cfg.bind);
    println!("  Max upload size: {}", format_bytes(cfg.max_upload_bytes as u64));
    println!("  Tokens:          {} user, {} admin", cfg.auth.tokens.len(), cfg.auth.admin_tokens.len());
    println!();
    println!("Retention:");
    println!("  Window:         {}s", cfg.retention.retention_window.as_secs());
    println!("  Sweep interval: {}s", cfg.retention.sweep_interval.as_secs());
    println!();
    println!("Storage:");
    println!("  Default limit: {}", format_bytes_signed(cfg.default_storage_limit_bytes));

    Ok(())
}

fn print_storage(limit: i64, used: i64, remaining: i64) {
    println!("Limit:     {}", format_bytes_signed(limit));
    println!("Used:      {}", format_bytes_signed(used));
    println!("Remaining: {}", format_bytes_signed(remaining));
}

/// Human-readable byte count, e.g. `250.0 MB (262144000 bytes)`
fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["KB", "MB", "GB", "TB"];

    if bytes < 1024 {
        return format!("{} bytes", bytes);
    }

    let mut value = bytes as f64;
    let mut unit = "bytes";
    for next in UNITS {
        if value < 1024.0 {
            break;
        }
        value /= 1024.0;
        unit = next;
    }
    format!("{:.1} {} ({} bytes)", value, unit, bytes)
}

fn format_bytes_signed(bytes: i64) -> String {
    if bytes < 0 {
        format!("-{}", format_bytes(bytes.unsigned_abs()))
    } else {
        format_bytes(bytes.unsigned_abs())
    }
}
