use std::path::Path;

use crate::error::AlignmentError;

#[derive(Debug, Clone)]
pub struct AlignerConfig {
    pub model_path: String,
    pub vocab_path: String,
    /// Optional JSON describing the acoustic model's conv front-end.
    /// Empty means the HuBERT-base layout.
    pub model_config_path: String,
    pub refiner_model_path: String,
    pub refiner_metadata_path: String,
    pub device: String,
    pub expected_sample_rate_hz: u32,
    /// Chunk length for long files; `0.0` feeds the whole file at once.
    pub chunk_seconds: f64,
    pub chunk_context_seconds: f64,
    pub min_phoneme_duration_ms: f64,
    pub refine: bool,
    pub normalize_input: bool,
    pub cache_capacity: usize,
}

impl AlignerConfig {
    pub const DEFAULT_SAMPLE_RATE_HZ: u32 = 16_000;
    pub const DEFAULT_MIN_PHONEME_DURATION_MS: f64 = 10.0;
}

impl Default for AlignerConfig {
    fn default() -> Self {
        Self {
            model_path: String::new(),
            vocab_path: String::new(),
            model_config_path: String::new(),
            refiner_model_path: String::new(),
            refiner_metadata_path: String::new(),
            device: "cpu".to_string(),
            expected_sample_rate_hz: Self::DEFAULT_SAMPLE_RATE_HZ,
            chunk_seconds: 0.0,
            chunk_context_seconds: 1.0,
            min_phoneme_duration_ms: Self::DEFAULT_MIN_PHONEME_DURATION_MS,
            refine: true,
            normalize_input: false,
            cache_capacity: 2,
        }
    }
}

/// Conv front-end geometry of the acoustic model; drives the exact
/// output-frame formula used for chunk stitching.
#[derive(Debug, Clone, PartialEq, serde::Deserialize)]
pub struct AcousticModelConfig {
    #[serde(default = "default_conv_kernel")]
    pub conv_kernel: Vec<usize>,
    #[serde(default = "default_conv_stride")]
    pub conv_stride: Vec<usize>,
}

fn default_conv_kernel() -> Vec<usize> {
    vec![10, 3, 3, 3, 3, 2, 2]
}
fn default_conv_stride() -> Vec<usize> {
    vec![5, 2, 2, 2, 2, 2, 2]
}

impl Default for AcousticModelConfig {
    fn default() -> Self {
        Self {
            conv_kernel: default_conv_kernel(),
            conv_stride: default_conv_stride(),
        }
    }
}

impl AcousticModelConfig {
    pub fn load(path: &Path) -> Result<Self, AlignmentError> {
        let data = std::fs::read_to_string(path)
            .map_err(|e| AlignmentError::io("read model config", e))?;
        let cfg: Self = serde_json::from_str(&data)
            .map_err(|e| AlignmentError::json("parse model config", e))?;
        if cfg.conv_kernel.len() != cfg.conv_stride.len() || cfg.conv_stride.contains(&0) {
            return Err(AlignmentError::invalid_input(
                "model config conv_kernel/conv_stride must be the same length with non-zero strides",
            ));
        }
        Ok(cfg)
    }

    pub fn stride_samples(&self) -> usize {
        self.conv_stride.iter().product::<usize>().max(1)
    }

    pub fn frame_stride_ms(&self, sample_rate: u32) -> f64 {
        self.stride_samples() as f64 / sample_rate as f64 * 1000.0
    }

    /// Frames produced by the conv stack for `len` input samples.
    pub fn output_frames(&self, len: usize) -> usize {
        let mut l = len;
        for (&k, &s) in self.conv_kernel.iter().zip(&self.conv_stride) {
            if l < k {
                return 0;
            }
            l = (l - k) / s + 1;
        }
        l
    }
}

/// Companion metadata shipped next to the refiner model.
#[derive(Debug, Clone, PartialEq, serde::Deserialize)]
pub struct RefinerMetadata {
    pub feature_dim: usize,
    pub time_steps: usize,
    pub num_phonemes: usize,
    pub output_unit: String,
    #[serde(default = "default_features_input")]
    pub features_input: String,
    #[serde(default = "default_left_input")]
    pub left_phoneme_input: String,
    #[serde(default = "default_right_input")]
    pub right_phoneme_input: String,
}

fn default_features_input() -> String {
    "features".to_string()
}
fn default_left_input() -> String {
    "left_phoneme".to_string()
}
fn default_right_input() -> String {
    "right_phoneme".to_string()
}

impl RefinerMetadata {
    pub fn load(path: &Path) -> Result<Self, AlignmentError> {
        let data = std::fs::read_to_string(path)
            .map_err(|e| AlignmentError::io("read refiner metadata", e))?;
        serde_json::from_str(&data).map_err(|e| AlignmentError::json("parse refiner metadata", e))
    }

    /// Checks the metadata against the features this crate produces.
    pub fn validate(&self, ppg_dim: usize) -> Result<(), AlignmentError> {
        let expected_dim = ppg_dim + crate::features::FLUX_LAGS;
        if self.feature_dim != expected_dim {
            return Err(AlignmentError::invalid_input(format!(
                "refiner feature_dim {} does not match ppg dim {ppg_dim} + {} flux lags",
                self.feature_dim,
                crate::features::FLUX_LAGS
            )));
        }
        if self.time_steps == 0 {
            return Err(AlignmentError::invalid_input("refiner time_steps must be > 0"));
        }
        if self.num_phonemes == 0 {
            return Err(AlignmentError::invalid_input("refiner num_phonemes must be > 0"));
        }
        if !self.output_unit.eq_ignore_ascii_case("ms") {
            return Err(AlignmentError::invalid_input(format!(
                "unsupported refiner output_unit '{}', expected 'ms'",
                self.output_unit
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aligner_config_default() {
        let config = AlignerConfig::default();
        assert!(config.model_path.is_empty());
        assert_eq!(config.device, "cpu");
        assert_eq!(config.expected_sample_rate_hz, 16_000);
        assert!((config.min_phoneme_duration_ms - 10.0).abs() < 1e-12);
        assert!(config.refine);
    }

    #[test]
    fn default_model_config_has_20ms_stride() {
        let cfg = AcousticModelConfig::default();
        assert_eq!(cfg.stride_samples(), 320);
        assert!((cfg.frame_stride_ms(16_000) - 20.0).abs() < 1e-9);
    }

    #[test]
    fn output_frames_matches_conv_formula() {
        let cfg = AcousticModelConfig::default();
        // One second of 16 kHz audio through the HuBERT stack.
        assert_eq!(cfg.output_frames(16_000), 49);
        assert_eq!(cfg.output_frames(400), 1);
        assert_eq!(cfg.output_frames(399), 0);
        assert_eq!(cfg.output_frames(0), 0);
    }

    #[test]
    fn model_config_parses_partial_json() {
        let json = r#"{"conv_stride": [4], "conv_kernel": [4]}"#;
        let cfg: AcousticModelConfig = serde_json::from_str(json).expect("valid json");
        assert_eq!(cfg.stride_samples(), 4);
        assert_eq!(cfg.output_frames(8), 2);
        assert_eq!(cfg.output_frames(26), 6);
    }

    #[test]
    fn refiner_metadata_validation() {
        let json = r#"{"feature_dim": 13, "time_steps": 64, "num_phonemes": 8, "output_unit": "ms"}"#;
        let meta: RefinerMetadata = serde_json::from_str(json).expect("valid json");
        assert_eq!(meta.features_input, "features");
        assert!(meta.validate(8).is_ok());
        assert!(meta.validate(9).is_err());

        let mut bad_unit = meta.clone();
        bad_unit.output_unit = "s".to_string();
        assert!(bad_unit.validate(8).is_err());
    }

    #[test]
    fn refiner_metadata_missing_field_fails_to_parse() {
        let json = r#"{"feature_dim": 13, "time_steps": 64}"#;
        assert!(serde_json::from_str::<RefinerMetadata>(json).is_err());
    }
}
