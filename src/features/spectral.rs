use std::f64::consts::PI;
use std::sync::{Arc, OnceLock};

use realfft::num_complex::Complex;
use realfft::{RealFftPlanner, RealToComplex};

use super::{HOP_LENGTH, N_FREQS, WIN_LENGTH};

struct StftPlan {
    window: Vec<f64>,
    fft: Arc<dyn RealToComplex<f64>>,
}

fn plan() -> &'static StftPlan {
    static PLAN: OnceLock<StftPlan> = OnceLock::new();
    PLAN.get_or_init(|| {
        let w = WIN_LENGTH as f64;
        let window = (0..WIN_LENGTH)
            .map(|i| 0.5 * (1.0 - (2.0 * PI * i as f64 / w).cos()))
            .collect();
        let fft = RealFftPlanner::<f64>::new().plan_fft_forward(WIN_LENGTH);
        StftPlan { window, fft }
    })
}

/// Periodic Hann window of `WIN_LENGTH` samples.
pub fn hann_window() -> &'static [f64] {
    &plan().window
}

/// Number of centered frames produced for `num_samples` input samples.
pub fn frame_count(num_samples: usize) -> usize {
    1 + num_samples / HOP_LENGTH
}

/// Centered one-sided power spectrogram, `frames x N_FREQS`.
///
/// The signal is padded with `WIN_LENGTH / 2` zeros on both sides, so frame
/// `f` is centered on sample `f * HOP_LENGTH`. An empty signal yields a
/// single all-zero frame.
pub fn power_spectrogram(samples: &[f32]) -> Vec<Vec<f32>> {
    let plan = plan();
    let pad = WIN_LENGTH / 2;
    let n_frames = frame_count(samples.len());
    let mut frame = plan.fft.make_input_vec();
    let mut spectrum = plan.fft.make_output_vec();
    let mut scratch = plan.fft.make_scratch_vec();
    let mut out = Vec::with_capacity(n_frames);

    for f in 0..n_frames {
        let origin = (f * HOP_LENGTH) as isize - pad as isize;
        for (n, slot) in frame.iter_mut().enumerate() {
            let idx = origin + n as isize;
            let x = if idx >= 0 && (idx as usize) < samples.len() {
                samples[idx as usize] as f64
            } else {
                0.0
            };
            *slot = x * plan.window[n];
        }

        // The input buffer is scrambled by the transform; it is refilled above.
        let row = match plan
            .fft
            .process_with_scratch(&mut frame, &mut spectrum, &mut scratch)
        {
            Ok(()) => spectrum.iter().map(|c: &Complex<f64>| c.norm_sqr() as f32).collect(),
            Err(err) => {
                tracing::warn!(frame = f, error = %err, "stft frame failed, emitting zeros");
                vec![0.0f32; N_FREQS]
            }
        };
        out.push(row);
    }
    out
}
