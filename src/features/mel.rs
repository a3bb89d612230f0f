use std::sync::OnceLock;

use super::{F_MAX_HZ, F_MIN_HZ, N_FREQS, N_MELS, SAMPLE_RATE_HZ, WIN_LENGTH};

const F_SP: f64 = 200.0 / 3.0;
const MIN_LOG_HZ: f64 = 1_000.0;
const MIN_LOG_MEL: f64 = MIN_LOG_HZ / F_SP;

fn log_step() -> f64 {
    6.4f64.ln() / 27.0
}

/// Slaney mel scale: linear below 1 kHz, logarithmic above.
pub fn hz_to_mel(hz: f64) -> f64 {
    if hz < MIN_LOG_HZ {
        hz / F_SP
    } else {
        MIN_LOG_MEL + (hz / MIN_LOG_HZ).ln() / log_step()
    }
}

pub fn mel_to_hz(mel: f64) -> f64 {
    if mel < MIN_LOG_MEL {
        mel * F_SP
    } else {
        MIN_LOG_HZ * (log_step() * (mel - MIN_LOG_MEL)).exp()
    }
}

/// Band edges in Hz, `N_MELS + 2` points.
pub fn mel_band_edges_hz() -> Vec<f64> {
    let lo = hz_to_mel(F_MIN_HZ);
    let hi = hz_to_mel(F_MAX_HZ);
    let n = N_MELS + 2;
    (0..n)
        .map(|i| mel_to_hz(lo + (hi - lo) * i as f64 / (n - 1) as f64))
        .collect()
}

/// Slaney-normalized triangular filterbank, `N_MELS x N_FREQS`.
pub fn mel_filterbank() -> &'static [Vec<f32>] {
    static FILTERBANK: OnceLock<Vec<Vec<f32>>> = OnceLock::new();
    FILTERBANK.get_or_init(build_filterbank)
}

fn build_filterbank() -> Vec<Vec<f32>> {
    let nyquist = SAMPLE_RATE_HZ as f64 / 2.0;
    let fft_freqs: Vec<f64> = (0..N_FREQS)
        .map(|k| nyquist * k as f64 / (N_FREQS - 1) as f64)
        .collect();
    debug_assert_eq!(N_FREQS, WIN_LENGTH / 2 + 1);
    let edges = mel_band_edges_hz();

    (0..N_MELS)
        .map(|m| {
            let lower_width = edges[m + 1] - edges[m];
            let upper_width = edges[m + 2] - edges[m + 1];
            let enorm = 2.0 / (edges[m + 2] - edges[m]);
            fft_freqs
                .iter()
                .map(|&f| {
                    let lower = (f - edges[m]) / lower_width;
                    let upper = (edges[m + 2] - f) / upper_width;
                    (lower.min(upper).max(0.0) * enorm) as f32
                })
                .collect()
        })
        .collect()
}

/// Projects a power spectrogram onto the mel bands, `frames x N_MELS`.
pub fn mel_power(power: &[Vec<f32>]) -> Vec<Vec<f32>> {
    let fb = mel_filterbank();
    power
        .iter()
        .map(|row| {
            fb.iter()
                .map(|filter| {
                    filter
                        .iter()
                        .zip(row)
                        .map(|(&w, &p)| w as f64 * p as f64)
                        .sum::<f64>() as f32
                })
                .collect()
        })
        .collect()
}
