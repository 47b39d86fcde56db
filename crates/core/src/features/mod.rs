//! Prosodic feature extraction: pitch statistics, speech rate and energy.

pub mod energy;
pub mod pitch;
pub mod rate;
pub mod stft;

use crate::asr::{Transcriber, UnavailableTranscriber};
use crate::decode::Waveform;
use crate::util::stats;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub use pitch::{track_pitch, PitchCandidate, PitchTrack, PitchTrackerConfig, SaliencePolicy};
pub use rate::SpeechRateStrategy;
pub use stft::StftConfig;

pub const PITCH_DECIMALS: i32 = 2;
pub const SPEECH_RATE_DECIMALS: i32 = 2;
pub const ENERGY_DECIMALS: i32 = 4;

const LOG_TARGET: &str = "features";

/// The four scalars the classifier consumes. All values are non-negative;
/// zero pitch fields mean no voiced pitch was detected.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct FeatureVector {
    pub pitch_avg: f64,
    pub pitch_std: f64,
    pub speech_rate: f64,
    pub energy: f64,
}

impl FeatureVector {
    pub const ZERO: Self = Self {
        pitch_avg: 0.0,
        pitch_std: 0.0,
        speech_rate: 0.0,
        energy: 0.0,
    };

    pub fn new(pitch_avg: f64, pitch_std: f64, speech_rate: f64, energy: f64) -> Self {
        Self {
            pitch_avg,
            pitch_std,
            speech_rate,
            energy,
        }
    }

    /// Output precision: pitch and rate to 2 decimals, energy to 4.
    pub fn rounded(&self) -> Self {
        Self {
            pitch_avg: stats::round_to(self.pitch_avg, PITCH_DECIMALS),
            pitch_std: stats::round_to(self.pitch_std, PITCH_DECIMALS),
            speech_rate: stats::round_to(self.speech_rate, SPEECH_RATE_DECIMALS),
            energy: stats::round_to(self.energy, ENERGY_DECIMALS),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct ExtractorConfig {
    pub stft: StftConfig,
    pub pitch: PitchTrackerConfig,
    pub salience: SaliencePolicy,
    pub speech_rate: SpeechRateStrategy,
}

pub struct FeatureExtractor {
    config: ExtractorConfig,
    transcriber: Arc<dyn Transcriber>,
}

impl FeatureExtractor {
    pub fn new(config: ExtractorConfig, transcriber: Arc<dyn Transcriber>) -> Self {
        Self {
            config,
            transcriber,
        }
    }

    /// Extractor without a speech-to-text backend. Under the transcription
    /// strategy every request falls back to a zero speech rate.
    pub fn without_transcriber(config: ExtractorConfig) -> Self {
        Self::new(config, Arc::new(UnavailableTranscriber::default()))
    }

    pub fn config(&self) -> &ExtractorConfig {
        &self.config
    }

    /// Computes unrounded features. Never fails: empty or silent audio yields zeros,
    /// and a failing transcriber only zeroes the speech rate.
    pub async fn extract(&self, waveform: &Waveform) -> FeatureVector {
        let stft = self.config.stft;

        let track = track_pitch(waveform, &stft, &self.config.pitch);
        let pitches = self.config.salience.select(&track);
        let pitch_avg = stats::mean(&pitches);
        let pitch_std = stats::population_std(&pitches);

        let rms = energy::rms_frames(waveform.samples(), stft.n_fft, stft.hop_length);
        let energy = stats::mean(&rms);

        let speech_rate = self.speech_rate(waveform, &rms).await;

        tracing::debug!(
            target: LOG_TARGET,
            frames = track.frame_count(),
            candidates = track.candidate_count(),
            voiced = pitches.len(),
            pitch_avg,
            pitch_std,
            speech_rate,
            energy,
            "features extracted"
        );

        FeatureVector {
            pitch_avg,
            pitch_std,
            speech_rate,
            energy,
        }
    }

    async fn speech_rate(&self, waveform: &Waveform, rms: &[f64]) -> f64 {
        let duration = waveform.duration_secs();
        if duration <= 0.0 {
            return 0.0;
        }
        match self.config.speech_rate {
            SpeechRateStrategy::Segmentation { top_db } => {
                let segments = rate::nonsilent_segments(rms, top_db);
                rate::per_second(segments.len(), duration)
            }
            SpeechRateStrategy::Transcription => {
                match self.transcriber.transcribe(waveform).await {
                    Ok(transcript) => rate::per_second(transcript.word_count, duration),
                    Err(e) => {
                        tracing::warn!(target: LOG_TARGET, error = %e, "transcription failed, speech rate set to 0");
                        0.0
                    }
                }
            }
        }
    }
}
