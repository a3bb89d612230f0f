use super::flux::spectral_flux;
use super::mel::mel_power;
use super::ppg::resample_linear;
use super::spectral::power_spectrogram;
use super::{hop_secs, FLUX_LAGS, HOP_LENGTH, SAMPLE_RATE_HZ};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeatureWindowSpec {
    /// Rows of the window at the spectral hop rate.
    pub time_steps: usize,
    /// Seconds per PPG row at the acoustic model's native rate.
    pub ppg_frame_secs: f64,
}

impl FeatureWindowSpec {
    pub fn window_samples(&self) -> usize {
        self.time_steps * HOP_LENGTH
    }

    pub fn window_secs(&self) -> f64 {
        self.time_steps as f64 * hop_secs()
    }

    /// Spectral frames per PPG row (4 for a 20 ms model and 5 ms hop).
    pub fn upsample_factor(&self) -> usize {
        (self.ppg_frame_secs / hop_secs()).round().max(1.0) as usize
    }
}

/// Row-major `time_steps x feature_dim` matrix: PPG columns first, then the
/// flux lags.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureWindow {
    pub time_steps: usize,
    pub feature_dim: usize,
    pub data: Vec<f32>,
}

impl FeatureWindow {
    pub fn row(&self, t: usize) -> &[f32] {
        &self.data[t * self.feature_dim..(t + 1) * self.feature_dim]
    }
}

/// Index into a signal of length `len`, mirrored about both edges with
/// period `2 * (len - 1)`.
pub fn reflect_index(idx: i64, len: usize) -> usize {
    if len <= 1 {
        return 0;
    }
    let period = 2 * (len as i64 - 1);
    let m = idx.rem_euclid(period);
    if m >= len as i64 {
        (period - m) as usize
    } else {
        m as usize
    }
}

fn audio_window(samples: &[f32], center_secs: f64, len: usize) -> Vec<f32> {
    if samples.is_empty() {
        return vec![0.0; len];
    }
    let center = (center_secs * SAMPLE_RATE_HZ as f64).round() as i64;
    let start = center - (len / 2) as i64;
    (0..len as i64)
        .map(|i| samples[reflect_index(start + i, samples.len())])
        .collect()
}

/// PPG rows covering the window, upsampled to the hop rate.
///
/// Both window edges are truncated to native frames independently, so the
/// slice is sometimes one row short; the caller zero-pads. The refiner was
/// trained on exactly this quantization.
fn ppg_window(ppg: &[Vec<f32>], center_secs: f64, spec: &FeatureWindowSpec) -> Vec<Vec<f32>> {
    if ppg.is_empty() || spec.ppg_frame_secs <= 0.0 {
        return Vec::new();
    }
    let half = spec.window_secs() / 2.0;
    let start = ((center_secs - half) / spec.ppg_frame_secs) as i64;
    let end = ((center_secs + half) / spec.ppg_frame_secs) as i64;
    let start = start.clamp(0, ppg.len() as i64) as usize;
    let end = end.clamp(0, ppg.len() as i64) as usize;
    if end <= start {
        return Vec::new();
    }
    let target = (end - start) * spec.upsample_factor();
    resample_linear(&ppg[start..end], target)
}

/// Builds the refiner input for a boundary at `center_secs`.
///
/// `ppg` is the cached posteriorgram at the model's native rate, each row
/// `ppg_dim` wide. Rows that either stream cannot fill are zero.
pub fn extract_feature_window(
    samples: &[f32],
    ppg: &[Vec<f32>],
    ppg_dim: usize,
    center_secs: f64,
    spec: &FeatureWindowSpec,
) -> FeatureWindow {
    let time_steps = spec.time_steps;
    let feature_dim = ppg_dim + FLUX_LAGS;
    let mut data = vec![0.0f32; time_steps * feature_dim];

    let audio = audio_window(samples, center_secs, spec.window_samples());
    let flux = spectral_flux(&mel_power(&power_spectrogram(&audio)));
    let ppg_rows = ppg_window(ppg, center_secs, spec);

    for t in 0..time_steps {
        let row = &mut data[t * feature_dim..(t + 1) * feature_dim];
        if let Some(p) = ppg_rows.get(t) {
            let n = p.len().min(ppg_dim);
            row[..n].copy_from_slice(&p[..n]);
        }
        if let Some(f) = flux.get(t) {
            row[ppg_dim..].copy_from_slice(&f[..FLUX_LAGS]);
        }
    }

    FeatureWindow {
        time_steps,
        feature_dim,
        data,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec() -> FeatureWindowSpec {
        FeatureWindowSpec {
            time_steps: 32,
            ppg_frame_secs: 0.02,
        }
    }

    #[test]
    fn reflect_index_mirrors_edges() {
        assert_eq!(reflect_index(-1, 5), 1);
        assert_eq!(reflect_index(-2, 5), 2);
        assert_eq!(reflect_index(4, 5), 4);
        assert_eq!(reflect_index(5, 5), 3);
        assert_eq!(reflect_index(8, 5), 0);
        assert_eq!(reflect_index(9, 5), 1);
        assert_eq!(reflect_index(7, 1), 0);
    }

    #[test]
    fn spec_geometry() {
        let s = spec();
        assert_eq!(s.window_samples(), 2_560);
        assert!((s.window_secs() - 0.16).abs() < 1e-12);
        assert_eq!(s.upsample_factor(), 4);
    }

    #[test]
    fn window_has_exact_shape() {
        let samples: Vec<f32> = (0..16_000).map(|i| ((i % 50) as f32 / 50.0) - 0.5).collect();
        let ppg = vec![vec![0.5f32, 0.5]; 50];
        let w = extract_feature_window(&samples, &ppg, 2, 0.5, &spec());
        assert_eq!(w.time_steps, 32);
        assert_eq!(w.feature_dim, 2 + FLUX_LAGS);
        assert_eq!(w.data.len(), 32 * 7);
        assert_eq!(&w.row(0)[..2], &[0.5, 0.5]);
        assert!(w.row(0)[2] > 0.0);
    }

    #[test]
    fn empty_audio_degrades_to_zeros() {
        let w = extract_feature_window(&[], &[], 3, 0.2, &spec());
        assert_eq!(w.data.len(), 32 * 8);
        assert!(w.data.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn ppg_slice_near_start_is_zero_padded() {
        // Window [-0.07, 0.09] keeps only native rows [0, 4): 16 upsampled rows.
        let ppg = vec![vec![1.0f32]; 50];
        let samples = vec![0.0f32; 16_000];
        let w = extract_feature_window(&samples, &ppg, 1, 0.01, &spec());
        assert_eq!(w.row(15)[0], 1.0);
        assert_eq!(w.row(16)[0], 0.0);
        assert_eq!(w.row(31)[0], 0.0);
    }

    #[test]
    fn window_past_audio_end_reflects() {
        let samples: Vec<f32> = (0..800).map(|i| i as f32 / 800.0).collect();
        let audio = audio_window(&samples, 0.05, 100);
        // Center sample 800 is past the end; reflection stays in bounds.
        assert_eq!(audio.len(), 100);
        assert!(audio.iter().all(|v| (0.0..1.0).contains(v)));
    }
}
