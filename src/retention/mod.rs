//! Audio retention: bounded disk usage independent of user action.
//!
//! 1. **Storage**: the directory of uploaded audio artifacts
//! 2. **Sweeper**: one cycle deletes artifacts older than the retention window
//! 3. **Scheduler**: runs a cycle on start and then every sweep interval
//!
//! ```text
//! Scheduler ──tick──▶ RetentionSweeper ──list/delete──▶ AudioStorage
//!                            │
//!                            └─ deleted names ─▶ SweepHook (note store)
//! ```

pub mod scheduler;
pub mod storage;
pub mod sweeper;

// Re-export key types
pub use scheduler::Scheduler;
pub use storage::{AudioStorage, LocalAudioStorage, StorageError};
pub use sweeper::{
    file_age, is_expired, CleanupStatus, RetentionPolicy, RetentionSweeper, SweepHook, SweepSummary,
};
