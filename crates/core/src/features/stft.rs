// Short-time Fourier analysis shared by the pitch tracker and the RMS framing.
// Frames are centered: frame `t` covers `[t * hop - n_fft / 2, t * hop + n_fft / 2)`,
// zero-padded outside the signal.

use realfft::{RealFftPlanner, RealToComplex};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub const DEFAULT_N_FFT: usize = 2048;
pub const DEFAULT_HOP_LENGTH: usize = 512;

const LOG_TARGET: &str = "features::stft";

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct StftConfig {
    /// Window and FFT size in samples.
    pub n_fft: usize,
    /// Advance between frames in samples.
    pub hop_length: usize,
}

impl Default for StftConfig {
    fn default() -> Self {
        Self {
            n_fft: DEFAULT_N_FFT,
            hop_length: DEFAULT_HOP_LENGTH,
        }
    }
}

impl StftConfig {
    /// Number of frequency bins per frame (`n_fft / 2 + 1`).
    pub fn bins(&self) -> usize {
        self.n_fft / 2 + 1
    }

    pub fn frame_count(&self, sample_count: usize) -> usize {
        frame_count(sample_count, self.hop_length)
    }

    pub fn bin_width_hz(&self, sample_rate: u32) -> f32 {
        sample_rate as f32 / self.n_fft as f32
    }
}

fn frame_count(sample_count: usize, hop: usize) -> usize {
    if sample_count == 0 || hop == 0 {
        return 0;
    }
    1 + sample_count / hop
}

/// Centered, zero-padded frames of `frame_len` samples every `hop` samples.
pub fn centered_frames(
    samples: &[f32],
    frame_len: usize,
    hop: usize,
) -> impl Iterator<Item = Vec<f32>> + '_ {
    let half = frame_len / 2;
    (0..frame_count(samples.len(), hop)).map(move |t| {
        let center = t * hop;
        let mut frame = vec![0.0f32; frame_len];
        let start = center.saturating_sub(half);
        let end = (center + frame_len - half).min(samples.len());
        if start < end {
            let offset = start + half - center;
            frame[offset..offset + (end - start)].copy_from_slice(&samples[start..end]);
        }
        frame
    })
}

/// Periodic Hann window, `0.5 - 0.5 cos(2 pi i / n)`.
pub fn hann_window(n: usize) -> Vec<f32> {
    if n == 0 {
        return Vec::new();
    }
    (0..n)
        .map(|i| 0.5 * (1.0 - (2.0 * std::f32::consts::PI * i as f32 / n as f32).cos()))
        .collect()
}

pub struct Stft {
    config: StftConfig,
    fft: Arc<dyn RealToComplex<f32>>,
    window: Vec<f32>,
}

impl Stft {
    pub fn new(config: StftConfig) -> Self {
        let mut planner = RealFftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(config.n_fft);
        Self {
            config,
            fft,
            window: hann_window(config.n_fft),
        }
    }

    /// Calls `on_frame` with the magnitude spectrum of every frame, in order.
    pub fn for_each_magnitude<F>(&self, samples: &[f32], mut on_frame: F)
    where
        F: FnMut(&[f32]),
    {
        let mut input = self.fft.make_input_vec();
        let mut spectrum = self.fft.make_output_vec();
        let mut magnitudes = vec![0.0f32; spectrum.len()];

        for frame in centered_frames(samples, self.config.n_fft, self.config.hop_length) {
            for ((dst, s), w) in input.iter_mut().zip(&frame).zip(&self.window) {
                *dst = s * w;
            }
            match self.fft.process(&mut input, &mut spectrum) {
                Ok(()) => {
                    for (m, c) in magnitudes.iter_mut().zip(&spectrum) {
                        *m = c.norm();
                    }
                }
                Err(e) => {
                    tracing::error!(target: LOG_TARGET, error = %e, "fft failed, frame treated as silent");
                    magnitudes.fill(0.0);
                }
            }
            on_frame(&magnitudes);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_count_matches_centered_padding() {
        let cfg = StftConfig::default();
        assert_eq!(cfg.frame_count(0), 0);
        assert_eq!(cfg.frame_count(1), 1);
        assert_eq!(cfg.frame_count(22_050), 44);
        assert_eq!(cfg.bins(), 1025);
    }

    #[test]
    fn centered_frames_zero_pad_edges() {
        let samples = [1.0f32, 2.0, 3.0, 4.0, 5.0];
        let frames: Vec<_> = centered_frames(&samples, 4, 2).collect();
        assert_eq!(frames.len(), 3);
        assert_eq!(frames[0], vec![0.0, 0.0, 1.0, 2.0]);
        assert_eq!(frames[1], vec![1.0, 2.0, 3.0, 4.0]);
        assert_eq!(frames[2], vec![3.0, 4.0, 5.0, 0.0]);
    }

    #[test]
    fn hann_window_is_periodic() {
        let w = hann_window(4);
        assert!((w[0] - 0.0).abs() < 1e-6);
        assert!((w[1] - 0.5).abs() < 1e-6);
        assert!((w[2] - 1.0).abs() < 1e-6);
        assert!((w[3] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn spectrum_peaks_at_tone_bin() {
        let sr = 8_000u32;
        let cfg = StftConfig {
            n_fft: 256,
            hop_length: 64,
        };
        // 1000 Hz lands exactly on bin 32 at 31.25 Hz per bin.
        let samples: Vec<f32> = (0..2_048)
            .map(|i| (2.0 * std::f32::consts::PI * 1_000.0 * i as f32 / sr as f32).sin())
            .collect();
        let stft = Stft::new(cfg);
        let mut peaks = Vec::new();
        stft.for_each_magnitude(&samples, |mags| {
            let (idx, _) = mags
                .iter()
                .enumerate()
                .fold((0, 0.0f32), |best, (i, &m)| if m > best.1 { (i, m) } else { best });
            peaks.push(idx);
        });
        assert_eq!(peaks.len(), cfg.frame_count(samples.len()));
        assert_eq!(peaks[peaks.len() / 2], 32);
    }
}
