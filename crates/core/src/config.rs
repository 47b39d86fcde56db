use crate::asr::DEFAULT_LANGUAGE;
use crate::emotion::RuleSetKind;
use crate::features::rate::DEFAULT_TOP_DB;
use crate::features::{
    ExtractorConfig, PitchTrackerConfig, SaliencePolicy, SpeechRateStrategy, StftConfig,
};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

pub const DEFAULT_ANALYSIS_SAMPLE_RATE: u32 = 22_050;
pub const ENV_WHISPER_MODEL: &str = "VOICE_PROSODY_WHISPER_MODEL";
pub const ENV_RULE_SET: &str = "VOICE_PROSODY_RULE_SET";
pub const ENV_LANGUAGE: &str = "VOICE_PROSODY_LANGUAGE";

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Language(String);

impl Language {
    pub fn new<S: Into<String>>(value: S) -> Result<Self, ConfigError> {
        let v = value.into();
        if v.trim().is_empty() {
            return Err(ConfigError::EmptyLanguage);
        }
        Ok(Self(v))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for Language {
    fn default() -> Self {
        Self(DEFAULT_LANGUAGE.to_owned())
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TranscriptionConfig {
    /// Path to a ggml Whisper model; `None` disables transcription.
    pub model_path: Option<String>,
    pub language: Language,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct AnalysisConfig {
    pub rule_set: RuleSetKind,
    pub extractor: ExtractorConfig,
    /// Rate the decoded audio is resampled to before extraction; `None` keeps the source rate.
    pub sample_rate: Option<u32>,
    pub transcription: TranscriptionConfig,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            rule_set: RuleSetKind::default(),
            extractor: ExtractorConfig::default(),
            sample_rate: Some(DEFAULT_ANALYSIS_SAMPLE_RATE),
            transcription: TranscriptionConfig::default(),
        }
    }
}

impl AnalysisConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let StftConfig { n_fft, hop_length } = self.extractor.stft;
        if n_fft < 4 || n_fft % 2 != 0 {
            return Err(ConfigError::InvalidFftSize(n_fft));
        }
        if hop_length == 0 {
            return Err(ConfigError::ZeroHop);
        }
        if self.sample_rate == Some(0) {
            return Err(ConfigError::ZeroSampleRate);
        }
        let PitchTrackerConfig {
            fmin_hz, fmax_hz, ..
        } = self.extractor.pitch;
        if !(fmin_hz >= 0.0 && fmin_hz < fmax_hz) {
            return Err(ConfigError::InvalidPitchRange(fmin_hz, fmax_hz));
        }
        if let SaliencePolicy::Percentile { percentile } = self.extractor.salience {
            if !(0.0..=100.0).contains(&percentile) {
                return Err(ConfigError::InvalidPercentile(percentile));
            }
        }
        if let SpeechRateStrategy::Segmentation { top_db } = self.extractor.speech_rate {
            if !(top_db > 0.0) {
                return Err(ConfigError::InvalidTopDb(top_db));
            }
        }
        Ok(())
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("language must not be empty")]
    EmptyLanguage,
    #[error("unknown rule set {0:?} (expected baseline or extended)")]
    UnknownRuleSet(String),
    #[error("unknown salience policy {0:?} (expected percentile or median)")]
    UnknownSalience(String),
    #[error("unknown speech rate strategy {0:?} (expected transcription or segmentation)")]
    UnknownSpeechRate(String),
    #[error("fft size must be an even number >= 4, got {0}")]
    InvalidFftSize(usize),
    #[error("hop length must be > 0")]
    ZeroHop,
    #[error("sample rate must be > 0")]
    ZeroSampleRate,
    #[error("pitch range must satisfy 0 <= fmin < fmax, got {0}..{1}")]
    InvalidPitchRange(f32, f32),
    #[error("percentile must be within 0..=100, got {0}")]
    InvalidPercentile(f64),
    #[error("top_db must be > 0, got {0}")]
    InvalidTopDb(f64),
}

impl FromStr for RuleSetKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "baseline" | "a" => Ok(Self::Baseline),
            "extended" | "b" => Ok(Self::Extended),
            _ => Err(ConfigError::UnknownRuleSet(s.to_owned())),
        }
    }
}

/// Parses `percentile`, `percentile:<q>` or `median`.
impl FromStr for SaliencePolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        match lower.split_once(':') {
            None if lower == "median" => Ok(Self::Median),
            None if lower == "percentile" => Ok(Self::default()),
            Some(("percentile", q)) => q
                .parse::<f64>()
                .map(|percentile| Self::Percentile { percentile })
                .map_err(|_| ConfigError::UnknownSalience(s.to_owned())),
            _ => Err(ConfigError::UnknownSalience(s.to_owned())),
        }
    }
}

/// Parses `transcription`, `segmentation` or `segmentation:<top_db>`.
impl FromStr for SpeechRateStrategy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        match lower.split_once(':') {
            None if lower == "transcription" => Ok(Self::Transcription),
            None if lower == "segmentation" => Ok(Self::Segmentation {
                top_db: DEFAULT_TOP_DB,
            }),
            Some(("segmentation", db)) => db
                .parse::<f64>()
                .map(|top_db| Self::Segmentation { top_db })
                .map_err(|_| ConfigError::UnknownSpeechRate(s.to_owned())),
            _ => Err(ConfigError::UnknownSpeechRate(s.to_owned())),
        }
    }
}

pub trait Env {
    fn var(&self, key: &str) -> Option<String>;
}

#[derive(Clone, Debug, Default)]
pub struct StdEnv;

impl Env for StdEnv {
    fn var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

#[derive(Clone, Debug, Default)]
pub struct MapEnv {
    vars: std::collections::BTreeMap<String, String>,
}

impl MapEnv {
    pub fn with_var(mut self, key: &str, value: &str) -> Self {
        self.vars.insert(key.to_owned(), value.to_owned());
        self
    }
}

impl Env for MapEnv {
    fn var(&self, key: &str) -> Option<String> {
        self.vars.get(key).cloned()
    }
}

pub fn resolve_rule_set(
    cli_value: Option<String>,
    env_key: &str,
    env: &impl Env,
) -> Result<RuleSetKind, ConfigError> {
    match resolve_optional_string(cli_value, env_key, env) {
        Some(v) => v.parse(),
        None => Ok(RuleSetKind::default()),
    }
}

pub fn resolve_language(
    cli_value: Option<String>,
    env_key: &str,
    env: &impl Env,
) -> Result<Language, ConfigError> {
    Language::new(resolve_string_with_default(
        cli_value,
        env_key,
        env,
        DEFAULT_LANGUAGE,
    ))
}

pub fn resolve_string_with_default(
    cli_value: Option<String>,
    env_key: &str,
    env: &impl Env,
    default: &str,
) -> String {
    match cli_value {
        Some(v) => v,
        None => env.var(env_key).unwrap_or_else(|| default.to_owned()),
    }
}

pub fn resolve_optional_string(
    cli_value: Option<String>,
    env_key: &str,
    env: &impl Env,
) -> Option<String> {
    match cli_value {
        Some(v) => Some(v),
        None => env.var(env_key),
    }
}
