#![deny(warnings)]

use anyhow::Context;
use bytes::Bytes;
use clap::{Parser, ValueEnum};
use std::io::{IsTerminal, Read, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use voice_prosody_core::asr::{Transcriber, UnavailableTranscriber};
use voice_prosody_core::config::{
    resolve_language, resolve_optional_string, resolve_rule_set, AnalysisConfig, Env, StdEnv,
    TranscriptionConfig, DEFAULT_ANALYSIS_SAMPLE_RATE, ENV_LANGUAGE, ENV_RULE_SET,
    ENV_WHISPER_MODEL,
};
#[cfg(feature = "ffmpeg-sidecar")]
use voice_prosody_core::decode::{FallbackDecoder, FfmpegAudioDecoder};
use voice_prosody_core::decode::{AudioDecoder, SymphoniaDecoder};
use voice_prosody_core::features::{ExtractorConfig, SaliencePolicy, SpeechRateStrategy};
use voice_prosody_core::pipeline::{Analyzer, ErrorReport};

const MISSING_INPUT: &str = "No file path provided";

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum DecoderChoice {
    /// Symphonia first, ffmpeg when symphonia cannot read the input.
    Auto,
    Symphonia,
    Ffmpeg,
}

#[derive(Parser, Debug)]
#[command(name = "voice-prosody")]
#[command(about = "Extract pitch, speech rate and energy from a voice clip and label its emotion")]
struct Args {
    /// Audio file to analyze. Raw audio bytes are read from stdin when omitted.
    path: Option<PathBuf>,

    /// Classification rules: baseline or extended.
    #[arg(long)]
    rule_set: Option<String>,

    /// Pitch salience gate: percentile, percentile:<q> or median.
    #[arg(long, default_value = "percentile")]
    salience: String,

    /// Speech rate source: transcription, segmentation or segmentation:<top_db>.
    /// Defaults to transcription when a Whisper model is configured, segmentation otherwise.
    #[arg(long)]
    speech_rate: Option<String>,

    /// Path to a ggml Whisper model used for word counting.
    #[arg(long)]
    whisper_model: Option<String>,

    #[arg(long)]
    language: Option<String>,

    /// Analysis sample rate in Hz.
    #[arg(long, default_value_t = DEFAULT_ANALYSIS_SAMPLE_RATE)]
    sample_rate: u32,

    /// Analyze at the decoded sample rate instead of resampling. Not available
    /// with `--decoder ffmpeg`; the ffmpeg fallback of `auto` emits the default rate.
    #[arg(long)]
    native_rate: bool,

    #[arg(long, value_enum, default_value_t = DecoderChoice::Auto)]
    decoder: DecoderChoice,

    /// Print single-line JSON.
    #[arg(long)]
    compact: bool,

    #[arg(long, default_value = "warn")]
    log_level: String,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    let result = match init_tracing(&args.log_level) {
        Ok(()) => {
            let stdin = std::io::stdin();
            let is_terminal = stdin.is_terminal();
            run(args, stdin.lock(), is_terminal, &StdEnv, &mut std::io::stdout()).await
        }
        Err(e) => Err(e),
    };
    finish(result, &mut std::io::stderr())
}

/// Maps the outcome to an exit code, writing the JSON error record on failure.
fn finish(result: anyhow::Result<()>, err_out: &mut impl Write) -> ExitCode {
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            emit_error(&e, err_out);
            ExitCode::FAILURE
        }
    }
}

async fn run(
    args: Args,
    stdin: impl Read,
    stdin_is_terminal: bool,
    env: &impl Env,
    out: &mut impl Write,
) -> anyhow::Result<()> {
    let cfg = build_config(&args, env)?;
    tracing::debug!(
        rule_set = cfg.rule_set.as_str(),
        sample_rate = ?cfg.sample_rate,
        "config loaded"
    );

    let Some(bytes) = read_input(args.path.as_deref(), stdin, stdin_is_terminal)? else {
        anyhow::bail!(MISSING_INPUT);
    };

    let decoder = build_decoder(args.decoder, cfg.sample_rate, args.path.as_deref())?;
    let transcriber: Arc<dyn Transcriber> = match cfg.extractor.speech_rate {
        SpeechRateStrategy::Transcription => build_transcriber(&cfg.transcription),
        SpeechRateStrategy::Segmentation { .. } => Arc::new(UnavailableTranscriber::new(
            "speech rate uses segmentation",
        )),
    };

    let analyzer = Analyzer::from_config(&cfg, decoder, transcriber)?;
    let report = analyzer
        .analyze_bytes(bytes)
        .await
        .context("analysis failed")?;

    let json = if args.compact {
        serde_json::to_string(&report)?
    } else {
        serde_json::to_string_pretty(&report)?
    };
    writeln!(out, "{json}").context("failed to write report")?;
    Ok(())
}

fn emit_error(err: &anyhow::Error, err_out: &mut impl Write) {
    let report = ErrorReport::new(format!("{err:#}"));
    let line = serde_json::to_string(&report)
        .unwrap_or_else(|_| serde_json::json!({ "error": report.error }).to_string());
    if let Err(e) = writeln!(err_out, "{line}") {
        tracing::error!(error = %e, "failed to write error report");
    }
}

fn init_tracing(level: &str) -> anyhow::Result<()> {
    let filter = EnvFilter::builder()
        .with_default_directive(
            level
                .parse()
                .with_context(|| format!("invalid --log-level: {level}"))?,
        )
        .from_env_lossy();

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
    Ok(())
}

/// Reads the audio source: the file at `path`, else stdin when it is piped.
/// `None` means no input was provided at all.
fn read_input(
    path: Option<&Path>,
    mut stdin: impl Read,
    stdin_is_terminal: bool,
) -> anyhow::Result<Option<Bytes>> {
    if let Some(path) = path {
        let bytes = std::fs::read(path)
            .with_context(|| format!("failed to read audio file {}", path.display()))?;
        return Ok(Some(Bytes::from(bytes)));
    }
    if stdin_is_terminal {
        return Ok(None);
    }
    let mut buf = Vec::new();
    stdin
        .read_to_end(&mut buf)
        .context("failed to read audio from stdin")?;
    if buf.is_empty() {
        return Ok(None);
    }
    Ok(Some(Bytes::from(buf)))
}

fn build_config(args: &Args, env: &impl Env) -> anyhow::Result<AnalysisConfig> {
    let rule_set = resolve_rule_set(args.rule_set.clone(), ENV_RULE_SET, env)?;
    let salience: SaliencePolicy = args.salience.parse()?;
    let language = resolve_language(args.language.clone(), ENV_LANGUAGE, env)?;
    let model_path = resolve_optional_string(args.whisper_model.clone(), ENV_WHISPER_MODEL, env);
    let speech_rate = match args.speech_rate.as_deref() {
        Some(s) => s.parse()?,
        None => default_speech_rate(model_path.as_deref()),
    };

    let cfg = AnalysisConfig {
        rule_set,
        extractor: ExtractorConfig {
            salience,
            speech_rate,
            ..Default::default()
        },
        sample_rate: (!args.native_rate).then_some(args.sample_rate),
        transcription: TranscriptionConfig {
            model_path,
            language,
        },
    };
    cfg.validate()?;
    Ok(cfg)
}

/// Word counting needs a Whisper model; without one, count voiced segments instead.
fn default_speech_rate(model_path: Option<&str>) -> SpeechRateStrategy {
    if cfg!(feature = "whisper-rs") && model_path.is_some() {
        SpeechRateStrategy::Transcription
    } else {
        SpeechRateStrategy::segmentation()
    }
}

/// `sample_rate` is the analysis rate, `None` for the source rate. ffmpeg cannot
/// report the source rate over its pipe, so it always emits a fixed rate.
fn build_decoder(
    choice: DecoderChoice,
    sample_rate: Option<u32>,
    path: Option<&Path>,
) -> anyhow::Result<Arc<dyn AudioDecoder>> {
    if choice == DecoderChoice::Ffmpeg && sample_rate.is_none() {
        anyhow::bail!("--native-rate cannot be used with --decoder ffmpeg");
    }
    let ffmpeg_rate = sample_rate.unwrap_or(DEFAULT_ANALYSIS_SAMPLE_RATE);
    let symphonia = match path.and_then(Path::extension).and_then(|e| e.to_str()) {
        Some(ext) => SymphoniaDecoder::new().with_extension_hint(ext),
        None => SymphoniaDecoder::new(),
    };
    match choice {
        DecoderChoice::Symphonia => Ok(Arc::new(symphonia)),
        #[cfg(feature = "ffmpeg-sidecar")]
        DecoderChoice::Ffmpeg => Ok(Arc::new(FfmpegAudioDecoder::new(ffmpeg_rate)?)),
        #[cfg(feature = "ffmpeg-sidecar")]
        DecoderChoice::Auto => Ok(Arc::new(FallbackDecoder::new(
            symphonia,
            FfmpegAudioDecoder::new(ffmpeg_rate)?,
        ))),
        #[cfg(not(feature = "ffmpeg-sidecar"))]
        DecoderChoice::Ffmpeg => {
            anyhow::bail!("ffmpeg decoding at {ffmpeg_rate} Hz requested, but this build has no ffmpeg support")
        }
        #[cfg(not(feature = "ffmpeg-sidecar"))]
        DecoderChoice::Auto => Ok(Arc::new(symphonia)),
    }
}

#[cfg(feature = "whisper-rs")]
fn build_transcriber(cfg: &TranscriptionConfig) -> Arc<dyn Transcriber> {
    use voice_prosody_core::asr::WhisperTranscriber;

    let Some(model_path) = cfg.model_path.as_deref() else {
        return Arc::new(UnavailableTranscriber::default());
    };
    match WhisperTranscriber::new(model_path, cfg.language.as_str()) {
        Ok(whisper) => Arc::new(whisper),
        Err(e) => {
            // Requests still succeed; each one reports the failure and falls back.
            tracing::warn!(error = %e, "whisper model unavailable");
            Arc::new(UnavailableTranscriber::new(e.to_string()))
        }
    }
}

#[cfg(not(feature = "whisper-rs"))]
fn build_transcriber(cfg: &TranscriptionConfig) -> Arc<dyn Transcriber> {
    match cfg.model_path.as_deref() {
        Some(model_path) => Arc::new(UnavailableTranscriber::new(format!(
            "built without whisper support, cannot load {model_path}"
        ))),
        None => Arc::new(UnavailableTranscriber::default()),
    }
}
