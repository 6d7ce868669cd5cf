//! Retention sweeper: deletes audio artifacts older than the retention window.
//!
//! Each cycle is `Idle → Scanning → (per file: Keep | Delete) → Idle` and
//! keeps no state across runs. Per-file delete failures are logged and
//! counted; they never abort the cycle and never reach the caller.

use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use super::storage::AudioStorage;
use crate::domain::StoredAudioFile;

/// Default maximum artifact age (24 hours)
pub const DEFAULT_RETENTION_WINDOW: Duration = Duration::from_secs(24 * 60 * 60);

/// Default time between scheduled sweeps (60 minutes)
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// How long artifacts live and how often the sweep runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetentionPolicy {
    pub retention_window: Duration,
    pub sweep_interval: Duration,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            retention_window: DEFAULT_RETENTION_WINDOW,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
        }
    }
}

/// Age of a file at `now`. Files stamped in the future are age zero.
pub fn file_age(modified: SystemTime, now: SystemTime) -> Duration {
    now.duration_since(modified).unwrap_or(Duration::ZERO)
}

/// Strictly older than the window. A file exactly at the window is kept.
pub fn is_expired(age: Duration, retention_window: Duration) -> bool {
    age > retention_window
}

/// Result of one sweep cycle
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepSummary {
    pub deleted_count: usize,
    pub freed_bytes: u64,
    /// Expired files that could not be deleted
    pub skipped_count: usize,
    #[serde(skip)]
    pub deleted_files: Vec<String>,
}

/// Dry-run view of what a sweep would do
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupStatus {
    pub total_files: usize,
    pub files_to_delete: usize,
    pub total_bytes: u64,
    pub bytes_to_free: u64,
}

/// Notified with the names of files removed by a cycle
#[async_trait]
pub trait SweepHook: Send + Sync {
    async fn files_deleted(&self, names: &[String]) -> anyhow::Result<()>;
}

/// Deletes expired audio artifacts
pub struct RetentionSweeper {
    storage: Arc<dyn AudioStorage>,
    policy: RetentionPolicy,
    hook: Option<Arc<dyn SweepHook>>,
    /// Held for the whole of a cycle: one active sweep at a time
    cycle: Mutex<()>,
}

impl RetentionSweeper {
    /// Create a sweeper over `storage`
    pub fn new(storage: Arc<dyn AudioStorage>, policy: RetentionPolicy) -> Self {
        Self {
            storage,
            policy,
            hook: None,
            cycle: Mutex::new(()),
        }
    }

    /// Report deleted files to `hook` after each cycle
    pub fn with_hook(mut self, hook: Arc<dyn SweepHook>) -> Self {
        self.hook = Some(hook);
        self
    }

    /// Get the retention policy
    pub fn policy(&self) -> &RetentionPolicy {
        &self.policy
    }

    /// Run one sweep cycle now
    pub async fn run_cleanup_once(&self) -> SweepSummary {
        self.run_cleanup_at(SystemTime::now()).await
    }

    /// Run one sweep cycle, measuring ages against `now`
    pub async fn run_cleanup_at(&self, now: SystemTime) -> SweepSummary {
        let _cycle = self.cycle.lock().await;
        let started = Instant::now();
        let mut summary = SweepSummary::default();

        let entries = self.scan().await;
        let scanned = entries.len();

        for entry in self.expired(&entries, now) {
            match self.storage.delete_entry(&entry.name).await {
                Ok(()) => {
                    summary.deleted_count += 1;
                    summary.freed_bytes += entry.size_bytes;
                    summary.deleted_files.push(entry.name.clone());
                }
                Err(e) => {
                    tracing::warn!("Failed to delete {}: {}", entry.name, e);
                    summary.skipped_count += 1;
                }
            }
        }

        if let Some(hook) = &self.hook {
            if !summary.deleted_files.is_empty() {
                if let Err(e) = hook.files_deleted(&summary.deleted_files).await {
                    tracing::error!("Sweep hook failed after deleting {} files: {}", summary.deleted_count, e);
                }
            }
        }

        tracing::info!(
            location = %self.storage.location(),
            scanned,
            deleted_count = summary.deleted_count,
            freed_bytes = summary.freed_bytes,
            skipped_count = summary.skipped_count,
            duration_ms = started.elapsed().as_millis() as u64,
            "sweep cycle complete"
        );

        summary
    }

    /// What a sweep would delete right now, without deleting anything
    pub async fn status(&self) -> CleanupStatus {
        self.status_at(SystemTime::now()).await
    }

    /// What a sweep at `now` would delete
    pub async fn status_at(&self, now: SystemTime) -> CleanupStatus {
        let entries = self.scan().await;
        let mut status = CleanupStatus {
            total_files: entries.len(),
            total_bytes: entries.iter().map(|e| e.size_bytes).sum(),
            ..Default::default()
        };

        for entry in self.expired(&entries, now) {
            status.files_to_delete += 1;
            status.bytes_to_free += entry.size_bytes;
        }

        status
    }

    /// List the storage. A missing directory or a listing failure is an
    /// empty scan.
    async fn scan(&self) -> Vec<StoredAudioFile> {
        match self.storage.list_entries().await {
            Ok(Some(entries)) => entries,
            Ok(None) => {
                tracing::debug!("Audio directory {} does not exist, nothing to sweep", self.storage.location());
                Vec::new()
            }
            Err(e) => {
                tracing::error!("Failed to list {}: {}", self.storage.location(), e);
                Vec::new()
            }
        }
    }

    fn expired<'a>(
        &self,
        entries: &'a [StoredAudioFile],
        now: SystemTime,
    ) -> impl Iterator<Item = &'a StoredAudioFile> {
        let window = self.policy.retention_window;
        entries
            .iter()
            .filter(move |entry| is_expired(file_age(entry.modified, now), window))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy() {
        let policy = RetentionPolicy::default();
        assert_eq!(policy.retention_window, Duration::from_secs(86_400));
        assert_eq!(policy.sweep_interval, Duration::from_secs(3_600));
    }

    #[test]
    fn test_expiry_is_strict() {
        let window = Duration::from_secs(60);
        assert!(!is_expired(Duration::from_secs(59), window));
        assert!(!is_expired(Duration::from_secs(60), window));
        assert!(is_expired(Duration::from_secs(61), window));
        assert!(is_expired(Duration::from_millis(60_001), window));
    }

    #[test]
    fn test_future_mtime_has_zero_age() {
        let now = SystemTime::now();
        let future = now + Duration::from_secs(3600);
        assert_eq!(file_age(future, now), Duration::ZERO);
        assert_eq!(file_age(now - Duration::from_secs(5), now), Duration::from_secs(5));
    }
}
