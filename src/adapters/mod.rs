//! Adapter interfaces for the transcription/summarization provider.
//!
//! The provider is opaque to the rest of the system: audio in, text out.

pub mod placeholder;

use std::path::Path;

use anyhow::Result;
use async_trait::async_trait;

// Re-export the bundled processor
pub use placeholder::PlaceholderProcessor;

/// Trait for transcription + summarization backends
#[async_trait]
pub trait NoteProcessor: Send + Sync {
    /// Human-readable processor name
    fn name(&self) -> &str;

    /// Transcribe the audio file at `audio_path`
    async fn transcribe(&self, audio_path: &Path) -> Result<String>;

    /// Summarize a transcript
    async fn summarize(&self, text: &str) -> Result<String>;
}
