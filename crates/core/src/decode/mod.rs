#[cfg(feature = "ffmpeg-sidecar")]
mod ffmpeg;
mod probe;

use bytes::Bytes;
use futures::future::BoxFuture;
use futures::FutureExt;
use rubato::{FftFixedInOut, Resampler};
use serde::{Deserialize, Serialize};

#[cfg(feature = "ffmpeg-sidecar")]
pub use ffmpeg::FfmpegAudioDecoder;
pub use probe::SymphoniaDecoder;

const LOG_TARGET: &str = "decode";
const RESAMPLE_CHUNK: usize = 1024;

/// Decoded mono audio owned by a single analysis request.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Waveform {
    samples: Vec<f32>,
    sample_rate: u32,
}

impl Waveform {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Result<Self> {
        if sample_rate == 0 {
            return Err(DecodeError::InvalidSampleRate(sample_rate));
        }
        Ok(Self {
            samples,
            sample_rate,
        })
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn duration_secs(&self) -> f64 {
        self.samples.len() as f64 / f64::from(self.sample_rate)
    }
}

#[derive(thiserror::Error, Debug)]
pub enum DecodeError {
    #[error("no audio data provided")]
    EmptyInput,

    #[error("sample rate must be > 0, got {0}")]
    InvalidSampleRate(u32),

    #[error("unsupported audio: {0}")]
    Unsupported(String),

    #[error("audio decoding failed: {0}")]
    Malformed(String),

    #[error("ffmpeg unavailable: {0}")]
    FfmpegUnavailable(String),

    #[error("ffmpeg failed: {0}")]
    FfmpegFailed(String),

    #[error("invalid pcm output: {0}")]
    InvalidPcm(String),

    #[error("resampling failed: {0}")]
    Resample(String),
}

pub type Result<T> = std::result::Result<T, DecodeError>;

pub trait AudioDecoder: Send + Sync {
    fn decode(&self, bytes: Bytes) -> BoxFuture<'_, Result<Waveform>>;
}

/// Tries `primary` first and hands the same bytes to `secondary` when it fails.
#[derive(Clone)]
pub struct FallbackDecoder<P, S>
where
    P: AudioDecoder,
    S: AudioDecoder,
{
    primary: P,
    secondary: S,
}

impl<P, S> FallbackDecoder<P, S>
where
    P: AudioDecoder,
    S: AudioDecoder,
{
    pub fn new(primary: P, secondary: S) -> Self {
        Self { primary, secondary }
    }
}

impl<P, S> AudioDecoder for FallbackDecoder<P, S>
where
    P: AudioDecoder,
    S: AudioDecoder,
{
    fn decode(&self, bytes: Bytes) -> BoxFuture<'_, Result<Waveform>> {
        async move {
            if bytes.is_empty() {
                return Err(DecodeError::EmptyInput);
            }
            match self.primary.decode(bytes.clone()).await {
                Ok(waveform) => Ok(waveform),
                Err(e) => {
                    tracing::warn!(target: LOG_TARGET, error = %e, "primary decoder failed, trying fallback decoder");
                    self.secondary.decode(bytes).await
                }
            }
        }
        .boxed()
    }
}

/// Resamples a waveform to `target_rate` Hz. Empty and same-rate input is returned as is.
pub fn resample(waveform: &Waveform, target_rate: u32) -> Result<Waveform> {
    if target_rate == 0 {
        return Err(DecodeError::InvalidSampleRate(target_rate));
    }
    let source_rate = waveform.sample_rate;
    if source_rate == target_rate || waveform.is_empty() {
        return Ok(Waveform {
            samples: waveform.samples.clone(),
            sample_rate: target_rate,
        });
    }

    let mut resampler = FftFixedInOut::<f32>::new(
        source_rate as usize,
        target_rate as usize,
        RESAMPLE_CHUNK,
        1,
    )
    .map_err(|e| DecodeError::Resample(e.to_string()))?;

    let chunk_len = resampler.input_frames_next();
    let delay = resampler.output_delay();
    let expected = ((waveform.len() as u64 * u64::from(target_rate)).div_ceil(u64::from(source_rate)))
        as usize;

    let mut out = Vec::with_capacity(expected + delay + chunk_len);
    let mut input = vec![0.0f32; chunk_len];
    let mut pos = 0usize;
    while out.len() < expected + delay {
        input.fill(0.0);
        if pos < waveform.len() {
            let end = (pos + chunk_len).min(waveform.len());
            input[..end - pos].copy_from_slice(&waveform.samples[pos..end]);
        }
        pos += chunk_len;

        let waves_in = [input.as_slice()];
        let frames = resampler
            .process(&waves_in[..], None)
            .map_err(|e| DecodeError::Resample(e.to_string()))?;
        match frames.first() {
            Some(channel) if !channel.is_empty() => out.extend_from_slice(channel),
            _ => {
                return Err(DecodeError::Resample(
                    "resampler produced no output".to_owned(),
                ))
            }
        }
    }

    let samples = out.into_iter().skip(delay).take(expected).collect();
    Ok(Waveform {
        samples,
        sample_rate: target_rate,
    })
}

/// Averages interleaved frames into a single channel.
pub fn downmix_interleaved(interleaved: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return interleaved.to_vec();
    }
    interleaved
        .chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
        .collect()
}

pub fn parse_f32le_mono(raw: &[u8]) -> Result<Vec<f32>> {
    if !raw.len().is_multiple_of(4usize) {
        return Err(DecodeError::InvalidPcm(format!(
            "f32le byte length must be multiple of 4, got {}",
            raw.len()
        )));
    }
    let mut out = Vec::with_capacity(raw.len() / 4);
    for chunk in raw.chunks_exact(4) {
        out.push(f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]));
    }
    Ok(out)
}
