use crate::config::{AnalysisConfig, ConfigError};
use crate::decode::{resample, AudioDecoder, DecodeError, Waveform};
use crate::emotion::{Emotion, EmotionClassifier};
use crate::features::{FeatureExtractor, FeatureVector};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

const LOG_TARGET: &str = "pipeline";

#[derive(thiserror::Error, Debug)]
pub enum AnalysisError {
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
}

/// Output record: rounded features plus the label.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct AnalysisReport {
    pub pitch_avg: f64,
    pub pitch_std: f64,
    pub speech_rate: f64,
    pub energy: f64,
    pub emotion: Emotion,
}

impl AnalysisReport {
    /// Rounds `features` for output and attaches the label, which the caller
    /// derived from the unrounded values.
    pub fn new(features: &FeatureVector, emotion: Emotion) -> Self {
        let rounded = features.rounded();
        Self {
            pitch_avg: rounded.pitch_avg,
            pitch_std: rounded.pitch_std,
            speech_rate: rounded.speech_rate,
            energy: rounded.energy,
            emotion,
        }
    }

    pub fn features(&self) -> FeatureVector {
        FeatureVector::new(self.pitch_avg, self.pitch_std, self.speech_rate, self.energy)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorReport {
    pub error: String,
}

impl ErrorReport {
    pub fn new<S: Into<String>>(message: S) -> Self {
        Self {
            error: message.into(),
        }
    }

    pub fn missing_input() -> Self {
        Self::new("No file path provided")
    }
}

/// One analysis request end to end. Holds no per-request state, so a single
/// instance can serve concurrent requests.
pub struct Analyzer {
    decoder: Arc<dyn AudioDecoder>,
    extractor: FeatureExtractor,
    classifier: Arc<dyn EmotionClassifier>,
    sample_rate: Option<u32>,
}

impl Analyzer {
    pub fn new(
        decoder: Arc<dyn AudioDecoder>,
        extractor: FeatureExtractor,
        classifier: Arc<dyn EmotionClassifier>,
        sample_rate: Option<u32>,
    ) -> Self {
        Self {
            decoder,
            extractor,
            classifier,
            sample_rate,
        }
    }

    /// Builds an analyzer from validated configuration; the transcriber is
    /// supplied by the caller because its lifecycle is the caller's concern.
    pub fn from_config(
        config: &AnalysisConfig,
        decoder: Arc<dyn AudioDecoder>,
        transcriber: Arc<dyn crate::asr::Transcriber>,
    ) -> Result<Self, AnalysisError> {
        config.validate()?;
        Ok(Self::new(
            decoder,
            FeatureExtractor::new(config.extractor, transcriber),
            Arc::new(config.rule_set.rule_set()),
            config.sample_rate,
        ))
    }

    pub async fn analyze_bytes(&self, bytes: Bytes) -> Result<AnalysisReport, AnalysisError> {
        if bytes.is_empty() {
            return Err(DecodeError::EmptyInput.into());
        }
        let waveform = self.decoder.decode(bytes).await?;
        self.analyze_waveform(&waveform).await
    }

    pub async fn analyze_waveform(
        &self,
        waveform: &Waveform,
    ) -> Result<AnalysisReport, AnalysisError> {
        let resampled;
        let waveform = match self.sample_rate {
            Some(rate) if rate != waveform.sample_rate() => {
                resampled = resample(waveform, rate)?;
                &resampled
            }
            _ => waveform,
        };
        tracing::debug!(
            target: LOG_TARGET,
            samples = waveform.len(),
            sample_rate = waveform.sample_rate(),
            "analyzing waveform"
        );

        let features = self.extractor.extract(waveform).await;
        let emotion = self.classifier.classify(&features);
        tracing::info!(target: LOG_TARGET, %emotion, "analysis complete");
        Ok(AnalysisReport::new(&features, emotion))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asr::{Transcriber, Transcript, TranscriptionError, UnavailableTranscriber};
    use crate::decode::tests::wav_bytes;
    use crate::decode::SymphoniaDecoder;
    use crate::emotion::RuleSet;
    use crate::features::ExtractorConfig;
    use futures::future::BoxFuture;
    use futures::FutureExt;

    struct Words(&'static str);

    impl Transcriber for Words {
        fn transcribe<'a>(
            &'a self,
            _audio: &'a Waveform,
        ) -> BoxFuture<'a, Result<Transcript, TranscriptionError>> {
            async move { Ok(Transcript::from_text(self.0)) }.boxed()
        }
    }

    fn analyzer(transcriber: Arc<dyn Transcriber>) -> Analyzer {
        Analyzer::from_config(
            &AnalysisConfig::default(),
            Arc::new(SymphoniaDecoder::new()),
            transcriber,
        )
        .unwrap()
    }

    fn tone(freq: f32, secs: f32, sr: u32) -> Vec<f32> {
        (0..(secs * sr as f32) as usize)
            .map(|i| 0.3 * (2.0 * std::f32::consts::PI * freq * i as f32 / sr as f32).sin())
            .collect()
    }

    #[tokio::test]
    async fn silent_wav_reports_zeros_and_fallback_label() {
        let bytes = wav_bytes(&vec![0.0; 16_000], 16_000, 1);
        let a = analyzer(Arc::new(UnavailableTranscriber::default()));
        let report = a.analyze_bytes(Bytes::from(bytes)).await.unwrap();
        assert_eq!(report.features(), FeatureVector::ZERO);
        assert_eq!(report.emotion, Emotion::Neutral);
    }

    #[tokio::test]
    async fn empty_bytes_are_an_input_error() {
        let a = analyzer(Arc::new(UnavailableTranscriber::default()));
        let err = a.analyze_bytes(Bytes::new()).await.unwrap_err();
        assert!(matches!(err, AnalysisError::Decode(DecodeError::EmptyInput)));
    }

    #[tokio::test]
    async fn failing_transcriber_still_produces_full_report() {
        let bytes = wav_bytes(&tone(300.0, 1.0, 16_000), 16_000, 1);
        let a = analyzer(Arc::new(UnavailableTranscriber::default()));
        let report = a.analyze_bytes(Bytes::from(bytes)).await.unwrap();
        assert_eq!(report.speech_rate, 0.0);
        assert!(report.pitch_avg > 0.0);
        assert!(report.energy > 0.0);
    }

    #[tokio::test]
    async fn report_fields_are_rounded() {
        let bytes = wav_bytes(&tone(300.0, 1.5, 16_000), 16_000, 1);
        let a = analyzer(Arc::new(Words("a b c d")));
        let report = a.analyze_bytes(Bytes::from(bytes)).await.unwrap();
        for (value, decimals) in [
            (report.pitch_avg, 2),
            (report.pitch_std, 2),
            (report.speech_rate, 2),
            (report.energy, 4),
        ] {
            let scale = 10f64.powi(decimals);
            assert!(((value * scale).round() - value * scale).abs() < 1e-6, "{value}");
        }
        assert!((report.speech_rate - 2.67).abs() < 1e-9);
    }

    #[test]
    fn extended_rule_set_is_swappable() {
        let a = Analyzer::new(
            Arc::new(SymphoniaDecoder::new()),
            FeatureExtractor::without_transcriber(ExtractorConfig::default()),
            Arc::new(RuleSet::extended()),
            None,
        );
        let w = Waveform::new(Vec::new(), 16_000).unwrap();
        let report = futures::executor::block_on(a.analyze_waveform(&w)).unwrap();
        assert_eq!(report.emotion, Emotion::Friendly);
    }

    #[test]
    fn invalid_config_is_rejected() {
        let mut cfg = AnalysisConfig::default();
        cfg.extractor.stft.hop_length = 0;
        let result = Analyzer::from_config(
            &cfg,
            Arc::new(SymphoniaDecoder::new()),
            Arc::new(UnavailableTranscriber::default()),
        );
        assert!(matches!(result, Err(AnalysisError::Config(ConfigError::ZeroHop))));
    }

    #[test]
    fn report_serializes_to_output_schema() {
        let report = AnalysisReport::new(
            &FeatureVector::new(350.123, 120.456, 3.0, 0.050_04),
            Emotion::Surprised,
        );
        let json: serde_json::Value = serde_json::to_value(&report).unwrap();
        assert_eq!(json["pitch_avg"], 350.12);
        assert_eq!(json["pitch_std"], 120.46);
        assert_eq!(json["speech_rate"], 3.0);
        assert_eq!(json["energy"], 0.05);
        assert_eq!(json["emotion"], "Surprised");
        assert_eq!(
            serde_json::to_string(&ErrorReport::missing_input()).unwrap(),
            r#"{"error":"No file path provided"}"#
        );
    }
}
