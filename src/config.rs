//! Configuration for classnote.
//!
//! Configuration sources (highest priority first):
//! 1. Environment variables (CLASSNOTE_HOME, CLASSNOTE_DATABASE, CLASSNOTE_AUDIO_DIR,
//!    CLASSNOTE_BIND, CLASSNOTE_RETENTION_HOURS, CLASSNOTE_SWEEP_INTERVAL_MINUTES)
//! 2. Config file (.classnote/config.yaml)
//! 3. Defaults (~/.classnote)
//!
//! Config file discovery:
//! - Searches current directory and parents for .classnote/config.yaml
//! - Paths in config file are relative to the .classnote/ directory

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::domain::{UserId, DEFAULT_STORAGE_LIMIT_BYTES};
use crate::retention::RetentionPolicy;

/// Global cached configuration (stores Result to handle init errors)
static CONFIG: OnceLock<Result<ResolvedConfig, String>> = OnceLock::new();

/// Default listen address (the original service port)
pub const DEFAULT_BIND: &str = "127.0.0.1:3001";

/// Default largest accepted upload body (100 MB)
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 100 * 1024 * 1024;

/// Raw config file schema (matches YAML structure)
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigFile {
    pub version: String,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub server: Option<ServerConfig>,
    #[serde(default)]
    pub retention: Option<RetentionConfig>,
    #[serde(default)]
    pub storage: Option<StorageConfig>,
    #[serde(default)]
    pub auth: AuthConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PathsConfig {
    /// State directory (relative to .classnote/)
    pub home: Option<String>,
    /// SQLite database file
    pub database: Option<String>,
    /// Uploaded audio directory
    pub audio: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub bind: Option<String>,
    pub max_upload_bytes: Option<usize>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RetentionConfig {
    pub retention_hours: Option<u64>,
    pub sweep_interval_minutes: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    pub default_limit_bytes: Option<i64>,
}

/// Bearer tokens accepted by the static token verifier
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthConfig {
    /// token -> user id
    #[serde(default)]
    pub tokens: HashMap<String, UserId>,
    /// token -> user id, with admin rights (storage limit changes)
    #[serde(default)]
    pub admin_tokens: HashMap<String, UserId>,
}

/// Resolved configuration with absolute paths
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// State directory
    pub home: PathBuf,
    /// SQLite database file
    pub database_path: PathBuf,
    /// Uploaded audio directory (the sweeper's scan root)
    pub audio_dir: PathBuf,
    /// Listen address
    pub bind: String,
    /// Largest accepted upload body
    pub max_upload_bytes: usize,
    /// Retention window and sweep interval
    pub retention: RetentionPolicy,
    /// Quota for newly created users
    pub default_storage_limit_bytes: i64,
    /// Static bearer tokens
    pub auth: AuthConfig,
    /// Path to config file (if found)
    pub config_file: Option<PathBuf>,
}

/// Find config file by searching `start` and its parents
fn find_config_file(start: &Path) -> Option<PathBuf> {
    let mut current = start.to_path_buf();

    loop {
        let config_path = current.join(".classnote").join("config.yaml");
        if config_path.exists() {
            return Some(config_path);
        }

        if !current.pop() {
            break;
        }
    }

    None
}

/// Load and parse config file
fn load_config_file(path: &Path) -> Result<ConfigFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Resolve a path that may be relative to the config file's directory
fn resolve_path(base: &Path, path_str: &str) -> PathBuf {
    let path = PathBuf::from(path_str);
    if path.is_absolute() {
        path
    } else {
        base.join(path)
    }
}

/// Parse a numeric environment override
fn env_number<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Result<Option<T>> {
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| anyhow::anyhow!("{} must be a non-negative integer, got {:?}", key, raw)),
        None => Ok(None),
    }
}

/// Build the configuration from an optional config file and an environment
/// lookup
fn resolve_config(
    config_path: Option<PathBuf>,
    default_home: PathBuf,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<ResolvedConfig> {
    let (file, base_dir) = match &config_path {
        Some(path) => {
            let file = load_config_file(path)?;
            let base_dir = path.parent().unwrap_or(Path::new(".")).to_path_buf();
            (Some(file), base_dir)
        }
        None => (None, PathBuf::from(".")),
    };

    let paths = file.as_ref().map(|f| f.paths.clone()).unwrap_or_default();
    let server = file.as_ref().and_then(|f| f.server.clone());
    let retention = file.as_ref().and_then(|f| f.retention.clone());
    let storage = file.as_ref().and_then(|f| f.storage.clone());
    let auth = file.as_ref().map(|f| f.auth.clone()).unwrap_or_default();

    let home = if let Some(env_home) = lookup("CLASSNOTE_HOME") {
        PathBuf::from(env_home)
    } else if let Some(ref home_path) = paths.home {
        resolve_path(&base_dir, home_path)
    } else {
        default_home
    };

    let database_path = if let Some(env_db) = lookup("CLASSNOTE_DATABASE") {
        PathBuf::from(env_db)
    } else if let Some(ref db_path) = paths.database {
        resolve_path(&base_dir, db_path)
    } else {
        home.join("classnote.db")
    };

    let audio_dir = if let Some(env_audio) = lookup("CLASSNOTE_AUDIO_DIR") {
        PathBuf::from(env_audio)
    } else if let Some(ref audio_path) = paths.audio {
        resolve_path(&base_dir, audio_path)
    } else {
        home.join("audio")
    };

    let bind = lookup("CLASSNOTE_BIND")
        .or_else(|| server.as_ref().and_then(|s| s.bind.clone()))
        .unwrap_or_else(|| DEFAULT_BIND.to_string());

    let max_upload_bytes = server
        .as_ref()
        .and_then(|s| s.max_upload_bytes)
        .unwrap_or(DEFAULT_MAX_UPLOAD_BYTES);

    let defaults = RetentionPolicy::default();

    let retention_window = match env_number::<u64>(&lookup, "CLASSNOTE_RETENTION_HOURS")?
        .or_else(|| retention.as_ref().and_then(|r| r.retention_hours))
    {
        Some(hours) => Duration::from_secs(hours.saturating_mul(60 * 60)),
        None => defaults.retention_window,
    };

    let sweep_interval = match env_number::<u64>(&lookup, "CLASSNOTE_SWEEP_INTERVAL_MINUTES")?
        .or_else(|| retention.as_ref().and_then(|r| r.sweep_interval_minutes))
    {
        Some(0) => anyhow::bail!("sweep interval must be at least 1 minute"),
        Some(minutes) => Duration::from_secs(minutes.saturating_mul(60)),
        None => defaults.sweep_interval,
    };

    let default_storage_limit_bytes = storage
        .and_then(|s| s.default_limit_bytes)
        .unwrap_or(DEFAULT_STORAGE_LIMIT_BYTES);
    if default_storage_limit_bytes < 0 {
        anyhow::bail!(
            "storage.default_limit_bytes must be non-negative, got {}",
            default_storage_limit_bytes
        );
    }

    Ok(ResolvedConfig {
        home,
        database_path,
        audio_dir,
        bind,
        max_upload_bytes,
        retention: RetentionPolicy {
            retention_window,
            sweep_interval,
        },
        default_storage_limit_bytes,
        auth,
        config_file: config_path,
    })
}

/// Load configuration from all sources
fn load_config() -> Result<ResolvedConfig> {
    let default_home = dirs::home_dir()
        .context("Failed to determine home directory")?
        .join(".classnote");

    let cwd = std::env::current_dir().context("Failed to determine current directory")?;
    let config_file = find_config_file(&cwd);

    resolve_config(config_file, default_home, |key| std::env::var(key).ok())
}

/// Get the global configuration (loads once, then cached)
pub fn config() -> Result<&'static ResolvedConfig> {
    let result = CONFIG.get_or_init(|| load_config().map_err(|e| format!("{:#}", e)));

    match result {
        Ok(config) => Ok(config),
        Err(e) => anyhow::bail!("{}", e),
    }
}
