use crate::decode::{downmix_interleaved, AudioDecoder, DecodeError, Result, Waveform};
use bytes::Bytes;
use futures::future::BoxFuture;
use futures::FutureExt;
use std::io::Cursor;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::{MediaSourceStream, MediaSourceStreamOptions};
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

const LOG_TARGET: &str = "decode::symphonia";

/// In-memory decoder for the containers symphonia can probe (WAV, MP3, FLAC, OGG).
#[derive(Clone, Debug, Default)]
pub struct SymphoniaDecoder {
    extension_hint: Option<String>,
}

impl SymphoniaDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hint the container format, e.g. from a file extension.
    pub fn with_extension_hint<S: Into<String>>(mut self, extension: S) -> Self {
        self.extension_hint = Some(extension.into());
        self
    }

    fn decode_blocking(&self, bytes: Bytes) -> Result<Waveform> {
        if bytes.is_empty() {
            return Err(DecodeError::EmptyInput);
        }

        let mut hint = Hint::new();
        if let Some(ext) = &self.extension_hint {
            hint.with_extension(ext);
        }

        let source = Cursor::new(bytes.to_vec());
        let stream = MediaSourceStream::new(Box::new(source), MediaSourceStreamOptions::default());
        let probed = symphonia::default::get_probe()
            .format(
                &hint,
                stream,
                &FormatOptions::default(),
                &MetadataOptions::default(),
            )
            .map_err(|e| DecodeError::Unsupported(e.to_string()))?;
        let mut format = probed.format;

        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| DecodeError::Unsupported("no audio track found".to_owned()))?;
        let track_id = track.id;
        let mut sample_rate = track.codec_params.sample_rate;

        let mut decoder = symphonia::default::get_codecs()
            .make(&track.codec_params, &DecoderOptions::default())
            .map_err(|e| DecodeError::Unsupported(e.to_string()))?;

        let mut mono = Vec::new();
        loop {
            let packet = match format.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                    break
                }
                Err(SymphoniaError::ResetRequired) => break,
                Err(e) => return Err(DecodeError::Malformed(e.to_string())),
            };
            if packet.track_id() != track_id {
                continue;
            }

            match decoder.decode(&packet) {
                Ok(decoded) => {
                    let spec = *decoded.spec();
                    sample_rate = Some(spec.rate);
                    let mut buf = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
                    buf.copy_interleaved_ref(decoded);
                    mono.extend(downmix_interleaved(buf.samples(), spec.channels.count()));
                }
                Err(SymphoniaError::DecodeError(e)) => {
                    tracing::debug!(target: LOG_TARGET, error = %e, "skipping undecodable packet");
                }
                Err(e) => return Err(DecodeError::Malformed(e.to_string())),
            }
        }

        let sample_rate = sample_rate
            .ok_or_else(|| DecodeError::Unsupported("unknown sample rate".to_owned()))?;
        tracing::debug!(
            target: LOG_TARGET,
            samples = mono.len(),
            sample_rate,
            "decoded audio"
        );
        Waveform::new(mono, sample_rate)
    }
}

impl AudioDecoder for SymphoniaDecoder {
    fn decode(&self, bytes: Bytes) -> BoxFuture<'_, Result<Waveform>> {
        let decoder = self.clone();
        async move {
            if bytes.is_empty() {
                return Err(DecodeError::EmptyInput);
            }
            tokio::task::spawn_blocking(move || decoder.decode_blocking(bytes))
                .await
                .map_err(|e| DecodeError::Malformed(format!("decode task failed: {e}")))?
        }
        .boxed()
    }
}
