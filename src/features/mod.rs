//! Deterministic spectral features shared by the refiner.
//!
//! The numbers here must line up with the pipeline the refiner model was
//! trained on: 16 kHz input, 25 ms periodic Hann window, 5 ms hop, 80 Slaney
//! mel bands over 0-8 kHz, and 5 orders of rectified mel flux.

pub mod flux;
pub mod mel;
pub mod ppg;
pub mod spectral;
pub mod window;

pub const SAMPLE_RATE_HZ: u32 = 16_000;
pub const WIN_LENGTH: usize = 400;
pub const HOP_LENGTH: usize = 80;
pub const N_FREQS: usize = WIN_LENGTH / 2 + 1;
pub const N_MELS: usize = 80;
pub const F_MIN_HZ: f64 = 0.0;
pub const F_MAX_HZ: f64 = 8_000.0;
pub const FLUX_LAGS: usize = 5;

/// Seconds per spectral frame.
pub fn hop_secs() -> f64 {
    HOP_LENGTH as f64 / SAMPLE_RATE_HZ as f64
}

pub use flux::spectral_flux;
pub use mel::{mel_filterbank, mel_power};
pub use ppg::resample_linear;
pub use spectral::power_spectrogram;
pub use window::{extract_feature_window, FeatureWindow, FeatureWindowSpec};
