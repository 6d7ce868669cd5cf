//! Canned-output processor used until a hosted provider is wired in.

use std::path::Path;

use anyhow::Result;
use async_trait::async_trait;

use super::NoteProcessor;

/// Transcript returned for every upload
pub const PLACEHOLDER_TRANSCRIPT: &str = "This is the transcription of your audio file.";

/// Characters of the transcript kept by the placeholder summary
const SUMMARY_CHARS: usize = 30;

/// Returns a fixed transcript and a truncation "summary"
#[derive(Debug, Clone, Default)]
pub struct PlaceholderProcessor;

impl PlaceholderProcessor {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl NoteProcessor for PlaceholderProcessor {
    fn name(&self) -> &str {
        "placeholder"
    }

    async fn transcribe(&self, audio_path: &Path) -> Result<String> {
        tracing::debug!("Placeholder transcription for {}", audio_path.display());
        Ok(PLACEHOLDER_TRANSCRIPT.to_string())
    }

    async fn summarize(&self, text: &str) -> Result<String> {
        let head: String = text.chars().take(SUMMARY_CHARS).collect();
        Ok(format!("{}...", head))
    }
}
