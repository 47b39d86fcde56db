use crate::decode::{parse_f32le_mono, AudioDecoder, DecodeError, Result, Waveform};
use bytes::Bytes;
use ffmpeg_sidecar::{download, paths::ffmpeg_path};
use futures::future::BoxFuture;
use futures::FutureExt;

pub const DEFAULT_FFMPEG_SAMPLE_RATE: u32 = 22_050;

const LOG_TARGET: &str = "decode::ffmpeg";

/// Decodes anything ffmpeg understands (WebM/Opus recordings included) to mono f32 PCM.
#[derive(Clone, Debug)]
pub struct FfmpegAudioDecoder {
    sample_rate: u32,
}

impl Default for FfmpegAudioDecoder {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_FFMPEG_SAMPLE_RATE,
        }
    }
}

impl FfmpegAudioDecoder {
    pub fn new(sample_rate: u32) -> Result<Self> {
        if sample_rate == 0 {
            return Err(DecodeError::InvalidSampleRate(sample_rate));
        }
        Ok(Self { sample_rate })
    }

    fn ensure_ffmpeg_available(&self) -> Result<()> {
        download::auto_download().map_err(|e| DecodeError::FfmpegUnavailable(e.to_string()))
    }

    async fn decode_with_ffmpeg(&self, input: Bytes) -> Result<Vec<f32>> {
        let rate = self.sample_rate.to_string();
        let mut child = tokio::process::Command::new(ffmpeg_path())
            .args([
                "-hide_banner",
                "-nostdin",
                "-loglevel",
                "error",
                "-i",
                "pipe:0",
                "-vn",
                "-sn",
                "-dn",
                "-ac",
                "1",
                "-ar",
                rate.as_str(),
                "-f",
                "f32le",
                "-acodec",
                "pcm_f32le",
                "pipe:1",
            ])
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| DecodeError::FfmpegFailed(e.to_string()))?;

        let mut stdin = child.stdin.take().ok_or_else(|| {
            DecodeError::FfmpegFailed("ffmpeg stdin unavailable (pipe not created)".to_owned())
        })?;
        let mut stdout = child.stdout.take().ok_or_else(|| {
            DecodeError::FfmpegFailed("ffmpeg stdout unavailable (pipe not created)".to_owned())
        })?;
        let mut stderr = child.stderr.take().ok_or_else(|| {
            DecodeError::FfmpegFailed("ffmpeg stderr unavailable (pipe not created)".to_owned())
        })?;

        let stdin_task = tokio::spawn(async move {
            use tokio::io::AsyncWriteExt;
            stdin.write_all(&input).await?;
            stdin.shutdown().await?;
            Ok::<(), std::io::Error>(())
        });

        let stdout_task = tokio::spawn(async move {
            use tokio::io::AsyncReadExt;
            let mut buf = Vec::new();
            stdout.read_to_end(&mut buf).await?;
            Ok::<Vec<u8>, std::io::Error>(buf)
        });

        let stderr_task = tokio::spawn(async move {
            use tokio::io::AsyncReadExt;
            let mut buf = Vec::new();
            stderr.read_to_end(&mut buf).await?;
            Ok::<Vec<u8>, std::io::Error>(buf)
        });

        let status = child
            .wait()
            .await
            .map_err(|e| DecodeError::FfmpegFailed(e.to_string()))?;

        // ffmpeg may close stdin early on unreadable input; the exit status reports that.
        if let Err(e) = stdin_task
            .await
            .map_err(|e| DecodeError::FfmpegFailed(e.to_string()))?
        {
            tracing::debug!(target: LOG_TARGET, error = %e, "ffmpeg stdin closed early");
        }

        let stdout_bytes = stdout_task
            .await
            .map_err(|e| DecodeError::FfmpegFailed(e.to_string()))?
            .map_err(|e| DecodeError::FfmpegFailed(e.to_string()))?;

        let stderr_bytes = stderr_task
            .await
            .map_err(|e| DecodeError::FfmpegFailed(e.to_string()))?
            .map_err(|e| DecodeError::FfmpegFailed(e.to_string()))?;

        if !status.success() {
            let stderr_s = String::from_utf8_lossy(&stderr_bytes).trim().to_owned();
            return Err(DecodeError::FfmpegFailed(format!(
                "exit_code={:?} stderr={stderr_s}",
                status.code()
            )));
        }

        parse_f32le_mono(&stdout_bytes)
    }
}

impl AudioDecoder for FfmpegAudioDecoder {
    fn decode(&self, bytes: Bytes) -> BoxFuture<'_, Result<Waveform>> {
        async move {
            if bytes.is_empty() {
                return Err(DecodeError::EmptyInput);
            }
            self.ensure_ffmpeg_available()?;
            let samples = self.decode_with_ffmpeg(bytes).await?;
            tracing::debug!(
                target: LOG_TARGET,
                samples = samples.len(),
                sample_rate = self.sample_rate,
                "decoded audio"
            );
            Waveform::new(samples, self.sample_rate)
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::tests::wav_bytes;

    #[test]
    fn rejects_zero_sample_rate() {
        assert!(matches!(
            FfmpegAudioDecoder::new(0),
            Err(DecodeError::InvalidSampleRate(0))
        ));
    }

    #[test]
    fn empty_input_fails_before_spawning() {
        let decoder = FfmpegAudioDecoder::default();
        let err = futures::executor::block_on(decoder.decode(Bytes::new())).unwrap_err();
        assert!(matches!(err, DecodeError::EmptyInput));
    }

    // Needs an ffmpeg binary on PATH or a network connection for the download.
    #[tokio::test]
    #[ignore]
    async fn decodes_wav_through_ffmpeg_at_configured_rate() {
        let tone: Vec<f32> = (0..16_000)
            .map(|i| 0.4 * (2.0 * std::f32::consts::PI * 440.0 * i as f32 / 16_000.0).sin())
            .collect();
        let bytes = wav_bytes(&tone, 16_000, 1);

        let decoder = FfmpegAudioDecoder::new(8_000).unwrap();
        let w = decoder.decode(Bytes::from(bytes)).await.expect("ffmpeg decodes wav");

        assert_eq!(w.sample_rate(), 8_000);
        assert!((w.duration_secs() - 1.0).abs() < 0.05, "{}", w.duration_secs());
        let peak = w.samples().iter().fold(0.0f32, |m, s| m.max(s.abs()));
        assert!(peak > 0.3 && peak < 0.5, "peak {peak}");
    }
}
