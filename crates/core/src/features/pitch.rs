// Spectral peak pitch tracking with parabolic interpolation, followed by a
// salience gate that keeps only confident pitch candidates.

use crate::decode::Waveform;
use crate::features::stft::{Stft, StftConfig};
use crate::util::stats;
use serde::{Deserialize, Serialize};

pub const DEFAULT_FMIN_HZ: f32 = 150.0;
pub const DEFAULT_FMAX_HZ: f32 = 4_000.0;
pub const DEFAULT_PEAK_THRESHOLD: f32 = 0.1;
pub const DEFAULT_SALIENCE_PERCENTILE: f64 = 75.0;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct PitchTrackerConfig {
    /// Lowest bin center frequency considered, inclusive.
    pub fmin_hz: f32,
    /// Highest bin center frequency considered, exclusive.
    pub fmax_hz: f32,
    /// A bin must exceed this fraction of its frame's loudest bin.
    pub threshold: f32,
}

impl Default for PitchTrackerConfig {
    fn default() -> Self {
        Self {
            fmin_hz: DEFAULT_FMIN_HZ,
            fmax_hz: DEFAULT_FMAX_HZ,
            threshold: DEFAULT_PEAK_THRESHOLD,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PitchCandidate {
    pub frequency_hz: f32,
    pub magnitude: f32,
}

/// Per-frame pitch candidates, in ascending bin order. Bins that are not
/// candidates have an implicit pitch and magnitude of zero.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PitchTrack {
    frames: Vec<Vec<PitchCandidate>>,
    bins: usize,
}

impl PitchTrack {
    pub fn frames(&self) -> &[Vec<PitchCandidate>] {
        &self.frames
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    pub fn candidate_count(&self) -> usize {
        self.frames.iter().map(Vec::len).sum()
    }

    /// Largest magnitude in the frame's full bin column (implicit zeros included).
    fn frame_peak(frame: &[PitchCandidate]) -> f64 {
        frame
            .iter()
            .map(|c| f64::from(c.magnitude))
            .fold(0.0, f64::max)
    }

    /// First candidate holding the frame's peak magnitude, if that peak is positive.
    fn peak_candidate(frame: &[PitchCandidate]) -> Option<&PitchCandidate> {
        let mut best: Option<&PitchCandidate> = None;
        for c in frame {
            if c.magnitude > 0.0 && best.is_none_or(|b| c.magnitude > b.magnitude) {
                best = Some(c);
            }
        }
        best
    }

    /// Every bin magnitude of the track, implicit zeros included.
    fn dense_magnitudes(&self) -> Vec<f64> {
        let total = self.frames.len() * self.bins;
        let mut out = Vec::with_capacity(total);
        out.extend(
            self.frames
                .iter()
                .flatten()
                .map(|c| f64::from(c.magnitude)),
        );
        out.resize(total.max(out.len()), 0.0);
        out
    }
}

/// Runs the pitch tracker over the whole waveform.
pub fn track_pitch(waveform: &Waveform, stft: &StftConfig, cfg: &PitchTrackerConfig) -> PitchTrack {
    let bin_hz = stft.bin_width_hz(waveform.sample_rate());
    let mut frames = Vec::with_capacity(stft.frame_count(waveform.len()));
    Stft::new(*stft).for_each_magnitude(waveform.samples(), |spectrum| {
        frames.push(frame_candidates(spectrum, bin_hz, cfg));
    });
    PitchTrack {
        frames,
        bins: stft.bins(),
    }
}

fn frame_candidates(spectrum: &[f32], bin_hz: f32, cfg: &PitchTrackerConfig) -> Vec<PitchCandidate> {
    let n = spectrum.len();
    if n < 3 {
        return Vec::new();
    }
    let peak = spectrum.iter().copied().fold(0.0f32, f32::max);
    let floor = cfg.threshold * peak;
    let gated = |k: usize| if spectrum[k] > floor { spectrum[k] } else { 0.0 };

    let mut out = Vec::new();
    for i in 1..n - 1 {
        let center_hz = i as f32 * bin_hz;
        if center_hz < cfg.fmin_hz || center_hz >= cfg.fmax_hz {
            continue;
        }
        let here = gated(i);
        if !(here > gated(i - 1) && here >= gated(i + 1)) {
            continue;
        }

        let (prev, cur, next) = (spectrum[i - 1], spectrum[i], spectrum[i + 1]);
        let avg = 0.5 * (next - prev);
        let curvature = 2.0 * cur - next - prev;
        let shift = if curvature.abs() < f32::MIN_POSITIVE {
            avg / (curvature + 1.0)
        } else {
            avg / curvature
        };
        let skew = 0.5 * avg * shift;

        out.push(PitchCandidate {
            frequency_hz: (i as f32 + shift) * bin_hz,
            magnitude: cur + skew,
        });
    }
    out
}

/// How confident pitch candidates are separated from noise.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum SaliencePolicy {
    /// Keep frames whose peak magnitude exceeds the given percentile of all
    /// frame peaks, taking the pitch of each kept frame's loudest candidate.
    Percentile { percentile: f64 },
    /// Keep every candidate louder than the median of all bin magnitudes.
    Median,
}

impl Default for SaliencePolicy {
    fn default() -> Self {
        Self::Percentile {
            percentile: DEFAULT_SALIENCE_PERCENTILE,
        }
    }
}

impl SaliencePolicy {
    /// Positive pitch values, in Hz, that survive the gate.
    pub fn select(&self, track: &PitchTrack) -> Vec<f64> {
        match *self {
            Self::Percentile { percentile } => {
                let peaks: Vec<f64> = track.frames.iter().map(|f| PitchTrack::frame_peak(f)).collect();
                let Some(threshold) = stats::percentile(&peaks, percentile) else {
                    return Vec::new();
                };
                track
                    .frames
                    .iter()
                    .zip(&peaks)
                    .filter(|&(_, &peak)| peak > threshold)
                    .filter_map(|(frame, _)| PitchTrack::peak_candidate(frame))
                    .map(|c| f64::from(c.frequency_hz))
                    .filter(|&hz| hz > 0.0)
                    .collect()
            }
            Self::Median => {
                let Some(threshold) = stats::median(&track.dense_magnitudes()) else {
                    return Vec::new();
                };
                track
                    .frames
                    .iter()
                    .flatten()
                    .filter(|c| f64::from(c.magnitude) > threshold)
                    .map(|c| f64::from(c.frequency_hz))
                    .filter(|&hz| hz > 0.0)
                    .collect()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tone(freq: f32, amplitude: f32, secs: f32, sr: u32) -> Vec<f32> {
        let n = (secs * sr as f32) as usize;
        (0..n)
            .map(|i| amplitude * (2.0 * std::f32::consts::PI * freq * i as f32 / sr as f32).sin())
            .collect()
    }

    fn candidate(frequency_hz: f32, magnitude: f32) -> PitchCandidate {
        PitchCandidate {
            frequency_hz,
            magnitude,
        }
    }

    #[test]
    fn silent_frames_have_no_candidates() {
        let w = Waveform::new(vec![0.0; 4_096], 22_050).unwrap();
        let track = track_pitch(&w, &StftConfig::default(), &PitchTrackerConfig::default());
        assert_eq!(track.frame_count(), 9);
        assert_eq!(track.candidate_count(), 0);
        assert!(SaliencePolicy::default().select(&track).is_empty());
        assert!(SaliencePolicy::Median.select(&track).is_empty());
    }

    #[test]
    fn empty_waveform_yields_empty_track() {
        let w = Waveform::new(Vec::new(), 22_050).unwrap();
        let track = track_pitch(&w, &StftConfig::default(), &PitchTrackerConfig::default());
        assert_eq!(track.frame_count(), 0);
        assert!(SaliencePolicy::default().select(&track).is_empty());
    }

    #[test]
    fn sine_tone_pitch_is_recovered() {
        let w = Waveform::new(tone(220.0, 0.5, 1.0, 22_050), 22_050).unwrap();
        let track = track_pitch(&w, &StftConfig::default(), &PitchTrackerConfig::default());
        let pitches = SaliencePolicy::default().select(&track);
        assert!(!pitches.is_empty());
        let avg = stats::mean(&pitches);
        assert!((avg - 220.0).abs() < 5.0, "avg {avg}");
        assert!(stats::population_std(&pitches) < 5.0);
    }

    #[test]
    fn tones_below_fmin_are_ignored() {
        let w = Waveform::new(tone(100.0, 0.5, 0.5, 22_050), 22_050).unwrap();
        let track = track_pitch(&w, &StftConfig::default(), &PitchTrackerConfig::default());
        assert!(track
            .frames()
            .iter()
            .flatten()
            .all(|c| c.frequency_hz >= DEFAULT_FMIN_HZ - 11.0));
    }

    #[test]
    fn percentile_gate_keeps_loudest_frames_only() {
        let track = PitchTrack {
            frames: vec![
                vec![candidate(200.0, 1.0)],
                vec![candidate(210.0, 2.0)],
                vec![candidate(220.0, 3.0)],
                vec![candidate(300.0, 4.0), candidate(900.0, 10.0)],
            ],
            bins: 4,
        };
        // Peaks [1, 2, 3, 10]; 75th percentile = 4.75.
        let pitches = SaliencePolicy::default().select(&track);
        assert_eq!(pitches, vec![900.0]);
    }

    #[test]
    fn percentile_gate_with_uniform_peaks_keeps_nothing() {
        let track = PitchTrack {
            frames: vec![vec![candidate(200.0, 1.0)]; 4],
            bins: 2,
        };
        assert!(SaliencePolicy::default().select(&track).is_empty());
    }

    #[test]
    fn median_gate_flattens_all_candidates() {
        let track = PitchTrack {
            frames: vec![
                vec![candidate(200.0, 1.0), candidate(400.0, 3.0)],
                vec![candidate(250.0, 2.0), candidate(500.0, 4.0)],
            ],
            bins: 2,
        };
        // Median of [1, 3, 2, 4] = 2.5.
        let mut pitches = SaliencePolicy::Median.select(&track);
        pitches.sort_by(f64::total_cmp);
        assert_eq!(pitches, vec![400.0, 500.0]);
    }

    #[test]
    fn median_gate_counts_implicit_zero_bins() {
        let track = PitchTrack {
            frames: vec![vec![candidate(200.0, 1.0)], vec![candidate(300.0, 2.0)]],
            bins: 4,
        };
        // Six implicit zeros put the median at 0.0, so both candidates survive.
        assert_eq!(SaliencePolicy::Median.select(&track).len(), 2);
    }
}
