//! classnote - Lecture recording notes with storage quotas
//!
//! Users upload lecture audio, which is transcribed and summarized into
//! notes. Two policies keep storage bounded:
//!
//! - Per-user quotas: every upload is admitted against the user's byte
//!   limit before it is processed (`quota`)
//! - Retention: audio files older than the retention window are swept off
//!   disk on a schedule, while the notes survive (`retention`)
//!
//! # Modules
//!
//! - `adapters`: Transcription/summarization backends
//! - `quota`: QuotaLedger and UploadAdmission
//! - `retention`: AudioStorage, RetentionSweeper and its Scheduler
//! - `store`: SQLite persistence for users, notes and categories
//! - `server`: HTTP API
//! - `domain`: Data structures (User, Note, StorageInfo)
//! - `cli`: Command-line interface
//!
//! # Usage
//!
//! ```bash
//! # Run the API with the retention scheduler
//! classnote serve
//!
//! # Sweep expired audio now
//! classnote sweep
//!
//! # Give user 3 a 500 MB quota
//! classnote set-limit 3 524288000
//! ```

pub mod adapters;
pub mod cli;
pub mod config;
pub mod domain;
pub mod quota;
pub mod retention;
pub mod server;
pub mod store;

// Re-export main types at crate root for convenience
pub use domain::{Note, StorageInfo, User, UserId};
pub use quota::{Admitted, QuotaError, QuotaExceeded, QuotaLedger, UploadAdmission};
pub use retention::{
    AudioStorage, CleanupStatus, LocalAudioStorage, RetentionPolicy, RetentionSweeper, Scheduler,
    SweepSummary,
};
pub use store::{NoteStore, SqliteStore, StoreError};
