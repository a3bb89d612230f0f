use std::path::Path;

use crate::alignment::tokenization::PhonemeVocab;
use crate::config::{AcousticModelConfig, AlignerConfig};
use crate::error::AlignmentError;
use crate::pipeline::defaults::ViterbiSequenceAligner;
use crate::pipeline::model_runtime::{build_emission_backend, build_refiner};
use crate::pipeline::runtime::{AlignmentEngine, AlignmentEngineParts};
use crate::pipeline::traits::{BoundaryRefiner, EmissionBackend, SequenceAligner};

pub struct AlignmentEngineBuilder {
    config: AlignerConfig,
    emission_backend: Option<Box<dyn EmissionBackend>>,
    refiner: Option<Box<dyn BoundaryRefiner>>,
    sequence_aligner: Option<Box<dyn SequenceAligner>>,
}

impl AlignmentEngineBuilder {
    pub fn new(config: AlignerConfig) -> Self {
        Self {
            config,
            emission_backend: None,
            refiner: None,
            sequence_aligner: None,
        }
    }

    pub fn with_emission_backend(mut self, emission_backend: Box<dyn EmissionBackend>) -> Self {
        self.emission_backend = Some(emission_backend);
        self
    }

    pub fn with_refiner_backend(mut self, refiner: Box<dyn BoundaryRefiner>) -> Self {
        self.refiner = Some(refiner);
        self
    }

    pub fn with_sequence_aligner(mut self, sequence_aligner: Box<dyn SequenceAligner>) -> Self {
        self.sequence_aligner = Some(sequence_aligner);
        self
    }

    /// Loads the vocabulary and model geometry and fills in the default
    /// backends. Fails with `ModelUnavailable` when no acoustic backend was
    /// supplied and the configured one cannot be loaded.
    pub fn build(self) -> Result<AlignmentEngine, AlignmentError> {
        let vocab = PhonemeVocab::load(Path::new(&self.config.vocab_path))?;
        let model_cfg = if self.config.model_config_path.is_empty() {
            AcousticModelConfig::default()
        } else {
            AcousticModelConfig::load(Path::new(&self.config.model_config_path))?
        };
        let expected_sample_rate_hz = if self.config.expected_sample_rate_hz == 0 {
            AlignerConfig::DEFAULT_SAMPLE_RATE_HZ
        } else {
            self.config.expected_sample_rate_hz
        };
        let min_duration_ms = if self.config.min_phoneme_duration_ms > 0.0 {
            self.config.min_phoneme_duration_ms
        } else {
            AlignerConfig::DEFAULT_MIN_PHONEME_DURATION_MS
        };
        let seconds_to_samples =
            |secs: f64| (secs.max(0.0) * expected_sample_rate_hz as f64).round() as usize;

        let emission_backend = match self.emission_backend {
            Some(backend) => backend,
            None => build_emission_backend(&self.config)?,
        };
        let refiner = match self.refiner {
            Some(refiner) => refiner,
            None => build_refiner(&self.config, vocab.phoneme_dim()),
        };

        tracing::info!(
            classes = vocab.len(),
            ppg_dim = vocab.phoneme_dim(),
            frame_stride_ms = model_cfg.frame_stride_ms(expected_sample_rate_hz),
            device = %emission_backend.device_label(),
            refine = refiner.time_steps().is_some(),
            "alignment engine ready"
        );

        Ok(AlignmentEngine::from_parts(AlignmentEngineParts {
            vocab,
            expected_sample_rate_hz,
            min_duration_secs: min_duration_ms / 1000.0,
            chunk_samples: seconds_to_samples(self.config.chunk_seconds),
            context_samples: seconds_to_samples(self.config.chunk_context_seconds),
            normalize_input: self.config.normalize_input,
            model_cfg,
            emission_backend,
            refiner,
            sequence_aligner: self
                .sequence_aligner
                .unwrap_or_else(|| Box::new(ViterbiSequenceAligner)),
            cache_capacity: self.config.cache_capacity,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AlignmentRequest, AudioInput};

    struct MockBackend;

    impl EmissionBackend for MockBackend {
        fn infer(&self, audio: &[f32]) -> Result<Vec<Vec<f32>>, AlignmentError> {
            Ok(vec![vec![0.0f32; 4]; audio.len() / 320])
        }

        fn device_label(&self) -> String {
            "mock".to_string()
        }
    }

    fn write_vocab(name: &str) -> String {
        let path = std::env::temp_dir().join(name);
        std::fs::write(&path, "<pad>\nsil\na\nk\n").expect("write vocab");
        path.to_string_lossy().to_string()
    }

    #[test]
    fn build_success_with_mock_backend_and_temp_files() {
        let vocab_path = write_vocab("phoneme_aligner_builder_vocab.txt");
        let config = AlignerConfig {
            vocab_path: vocab_path.clone(),
            ..AlignerConfig::default()
        };
        let engine = AlignmentEngineBuilder::new(config)
            .with_emission_backend(Box::new(MockBackend))
            .build()
            .expect("build should succeed");
        assert_eq!(engine.vocab().phoneme_dim(), 3);
        assert!(!engine.refinement_enabled());
        assert!((engine.frame_secs() - 0.02).abs() < 1e-12);

        let audio = AudioInput::new("builder.wav", 16_000, vec![0.0; 16_000]);
        let request = AlignmentRequest::new(vec!["sil".into(), "a".into()]);
        let out = engine.align(&audio, &request).unwrap();
        assert_eq!(out.intervals.len(), 2);
        assert_eq!(out.intervals[1].end, 1.0);
        let _ = std::fs::remove_file(&vocab_path);
    }

    #[test]
    fn build_without_acoustic_model_is_model_unavailable() {
        let vocab_path = write_vocab("phoneme_aligner_builder_vocab_nomodel.txt");
        let config = AlignerConfig {
            vocab_path: vocab_path.clone(),
            ..AlignerConfig::default()
        };
        let err = AlignmentEngineBuilder::new(config)
            .build()
            .err()
            .expect("no acoustic model");
        assert!(err.is_model_unavailable());
        let _ = std::fs::remove_file(&vocab_path);
    }

    #[test]
    fn build_fails_on_invalid_vocab_path() {
        let config = AlignerConfig {
            vocab_path: "/nonexistent/vocab.txt".to_string(),
            ..AlignerConfig::default()
        };
        let result = AlignmentEngineBuilder::new(config)
            .with_emission_backend(Box::new(MockBackend))
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn build_fails_on_invalid_model_config_path() {
        let vocab_path = write_vocab("phoneme_aligner_builder_vocab_badcfg.txt");
        let config = AlignerConfig {
            vocab_path: vocab_path.clone(),
            model_config_path: "/nonexistent/config.json".to_string(),
            ..AlignerConfig::default()
        };
        let result = AlignmentEngineBuilder::new(config)
            .with_emission_backend(Box::new(MockBackend))
            .build();
        assert!(result.is_err());
        let _ = std::fs::remove_file(&vocab_path);
    }
}
