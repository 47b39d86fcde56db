use crate::asr::{Transcriber, Transcript, TranscriptionError};
use crate::decode::{resample, Waveform};
use futures::future::BoxFuture;
use futures::FutureExt;
use std::sync::Arc;
use whisper_rs::{FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters};

const WHISPER_SAMPLE_RATE: u32 = 16_000;
const LOG_TARGET: &str = "asr::whisper";

/// Whisper-backed transcriber. The model is loaded once; each call gets its own
/// inference state so the shared context stays read-only.
#[derive(Clone)]
pub struct WhisperTranscriber {
    context: Arc<WhisperContext>,
    language: String,
}

impl WhisperTranscriber {
    pub fn new(model_path: &str, language: &str) -> Result<Self, TranscriptionError> {
        let context =
            WhisperContext::new_with_params(model_path, WhisperContextParameters::default())
                .map_err(|e| TranscriptionError::ModelLoad(format!("{model_path}: {e}")))?;
        tracing::debug!(target: LOG_TARGET, model_path, language, "whisper model loaded");
        Ok(Self {
            context: Arc::new(context),
            language: language.to_owned(),
        })
    }

    fn run(
        context: &WhisperContext,
        language: &str,
        samples: &[f32],
    ) -> Result<String, TranscriptionError> {
        let mut state = context
            .create_state()
            .map_err(|e| TranscriptionError::Inference(e.to_string()))?;

        let mut params = FullParams::new(SamplingStrategy::Greedy { best_of: 1 });
        params.set_language(Some(language));
        params.set_print_progress(false);
        params.set_print_realtime(false);
        params.set_print_special(false);
        params.set_print_timestamps(false);

        state
            .full(params, samples)
            .map_err(|e| TranscriptionError::Inference(e.to_string()))?;

        let mut text = String::new();
        for i in 0..state.full_n_segments() {
            if let Some(segment) = state.get_segment(i) {
                let piece = segment
                    .to_str_lossy()
                    .map_err(|e| TranscriptionError::Inference(e.to_string()))?;
                text.push_str(&piece);
                text.push(' ');
            }
        }
        Ok(text)
    }
}

impl Transcriber for WhisperTranscriber {
    fn transcribe<'a>(
        &'a self,
        audio: &'a Waveform,
    ) -> BoxFuture<'a, Result<Transcript, TranscriptionError>> {
        async move {
            let audio = resample(audio, WHISPER_SAMPLE_RATE)
                .map_err(|e| TranscriptionError::UnsupportedAudio(e.to_string()))?;
            let context = Arc::clone(&self.context);
            let language = self.language.clone();
            let samples = audio.samples().to_vec();

            let text = tokio::task::spawn_blocking(move || Self::run(&context, &language, &samples))
                .await
                .map_err(|e| TranscriptionError::Inference(e.to_string()))??;

            let transcript = Transcript::from_text(text.trim());
            tracing::debug!(target: LOG_TARGET, words = transcript.word_count, "transcribed");
            Ok(transcript)
        }
        .boxed()
    }
}
