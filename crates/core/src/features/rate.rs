use serde::{Deserialize, Serialize};
use std::ops::Range;

pub const DEFAULT_TOP_DB: f64 = 60.0;
const POWER_FLOOR: f64 = 1e-10;

/// How the words-per-second proxy is obtained.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum SpeechRateStrategy {
    /// Count transcribed words.
    #[default]
    Transcription,
    /// Count non-silent segments; a frame is silent when it is quieter than
    /// the loudest frame by more than `top_db` decibels.
    Segmentation { top_db: f64 },
}

impl SpeechRateStrategy {
    pub fn segmentation() -> Self {
        Self::Segmentation {
            top_db: DEFAULT_TOP_DB,
        }
    }
}

/// Contiguous runs of non-silent frames, as frame index ranges.
///
/// All-zero input has no non-silent frames.
pub fn nonsilent_segments(rms: &[f64], top_db: f64) -> Vec<Range<usize>> {
    let ref_power = rms.iter().map(|r| r * r).fold(0.0, f64::max);
    let ref_db = 10.0 * ref_power.max(POWER_FLOOR).log10();

    let mut segments = Vec::new();
    let mut open: Option<usize> = None;
    for (i, r) in rms.iter().enumerate() {
        let power = r * r;
        let db = 10.0 * power.max(POWER_FLOOR).log10() - ref_db;
        let voiced = power > 0.0 && db > -top_db;
        match (voiced, open) {
            (true, None) => open = Some(i),
            (false, Some(start)) => {
                segments.push(start..i);
                open = None;
            }
            _ => {}
        }
    }
    if let Some(start) = open {
        segments.push(start..rms.len());
    }
    segments
}

/// `count / duration_secs`, or `0.0` for a non-positive duration.
pub fn per_second(count: usize, duration_secs: f64) -> f64 {
    if duration_secs <= 0.0 {
        return 0.0;
    }
    count as f64 / duration_secs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_runs_separated_by_silence() {
        let rms = [0.0, 0.3, 0.4, 0.0, 0.0, 0.5, 0.0, 0.2];
        let segments = nonsilent_segments(&rms, 60.0);
        assert_eq!(segments, vec![1..3, 5..6, 7..8]);
    }

    #[test]
    fn quiet_frames_below_top_db_are_silent() {
        // 1e-4 is 80 dB below 1.0.
        let rms = [1.0, 1e-4, 1.0];
        assert_eq!(nonsilent_segments(&rms, 60.0).len(), 2);
        assert_eq!(nonsilent_segments(&rms, 100.0).len(), 1);
    }

    #[test]
    fn all_silence_has_no_segments() {
        assert!(nonsilent_segments(&[0.0; 10], 60.0).is_empty());
        assert!(nonsilent_segments(&[], 60.0).is_empty());
    }

    #[test]
    fn per_second_guards_zero_duration() {
        assert_eq!(per_second(5, 0.0), 0.0);
        assert_eq!(per_second(6, 2.0), 3.0);
    }
}
