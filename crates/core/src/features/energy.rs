use crate::features::stft::centered_frames;

/// Root-mean-square amplitude of each centered, zero-padded frame.
pub fn rms_frames(samples: &[f32], frame_len: usize, hop: usize) -> Vec<f64> {
    if frame_len == 0 {
        return Vec::new();
    }
    centered_frames(samples, frame_len, hop)
        .map(|frame| {
            let power = frame.iter().map(|&s| f64::from(s) * f64::from(s)).sum::<f64>()
                / frame_len as f64;
            power.sqrt()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::stats;

    #[test]
    fn constant_signal_rms_equals_amplitude_inside() {
        let samples = vec![0.5f32; 8_192];
        let rms = rms_frames(&samples, 2_048, 512);
        assert_eq!(rms.len(), 17);
        assert!((rms[8] - 0.5).abs() < 1e-9);
        // Edge frames are half padding.
        assert!((rms[0] - (0.125f64).sqrt()).abs() < 1e-9);
    }

    #[test]
    fn silence_and_empty_have_zero_energy() {
        assert!(rms_frames(&[], 2_048, 512).is_empty());
        assert_eq!(stats::mean(&rms_frames(&[], 2_048, 512)), 0.0);
        let rms = rms_frames(&[0.0; 3_000], 2_048, 512);
        assert!(rms.iter().all(|&r| r == 0.0));
    }
}
