#[cfg(feature = "whisper-rs")]
mod whisper;

use crate::decode::Waveform;
use futures::future::BoxFuture;
use futures::FutureExt;
use serde::{Deserialize, Serialize};

#[cfg(feature = "whisper-rs")]
pub use whisper::WhisperTranscriber;

pub const DEFAULT_LANGUAGE: &str = "en";

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Transcript {
    pub text: String,
    pub word_count: usize,
}

impl Transcript {
    /// Builds a transcript, counting whitespace-separated words.
    pub fn from_text<S: Into<String>>(text: S) -> Self {
        let text = text.into();
        let word_count = text.split_whitespace().count();
        Self { text, word_count }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum TranscriptionError {
    #[error("no transcription backend available: {0}")]
    Unavailable(String),

    #[error("failed to load transcription model: {0}")]
    ModelLoad(String),

    #[error("unsupported audio for transcription: {0}")]
    UnsupportedAudio(String),

    #[error("transcription failed: {0}")]
    Inference(String),
}

/// Speech-to-text capability used to estimate verbal density.
///
/// Implementations are shared across requests, so any cached model must be
/// read-only after construction.
pub trait Transcriber: Send + Sync {
    fn transcribe<'a>(
        &'a self,
        audio: &'a Waveform,
    ) -> BoxFuture<'a, Result<Transcript, TranscriptionError>>;
}

/// Stand-in used when no model is configured; every call fails.
#[derive(Clone, Debug)]
pub struct UnavailableTranscriber {
    reason: String,
}

impl UnavailableTranscriber {
    pub fn new<S: Into<String>>(reason: S) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl Default for UnavailableTranscriber {
    fn default() -> Self {
        Self::new("no transcription model configured")
    }
}

impl Transcriber for UnavailableTranscriber {
    fn transcribe<'a>(
        &'a self,
        _audio: &'a Waveform,
    ) -> BoxFuture<'a, Result<Transcript, TranscriptionError>> {
        async move { Err(TranscriptionError::Unavailable(self.reason.clone())) }.boxed()
    }
}
