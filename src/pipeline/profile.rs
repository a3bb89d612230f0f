//! Session-wide choice between model-backed and manual (elastic) alignment.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::alignment::elastic;
use crate::alignment::graph::PhonemeGraph;
use crate::error::AlignmentError;
use crate::pipeline::runtime::AlignmentEngine;
use crate::types::{AlignmentConstraint, AlignmentRequest, AudioInput, SegmentDiagnostic};

/// Result of a profile operation: the new graph and the cache generation it
/// was computed under.
#[derive(Debug, Clone, PartialEq)]
pub struct ProfileOutcome {
    pub graph: PhonemeGraph,
    pub diagnostics: Vec<SegmentDiagnostic>,
    pub generation: u64,
}

pub trait AlignmentProfile: Send + Sync {
    fn name(&self) -> &'static str;

    /// Re-aligns the whole grid. Multi-token intervals come back split into
    /// one interval per phoneme; locked boundaries keep their time.
    fn realign_grid(
        &self,
        audio: &AudioInput,
        graph: &PhonemeGraph,
    ) -> Result<ProfileOutcome, AlignmentError>;

    /// Moves `pivot` to `pivot_time` and re-aligns the spans on both sides.
    fn realign_around(
        &self,
        audio: &AudioInput,
        graph: &PhonemeGraph,
        pivot: usize,
        pivot_time: f64,
    ) -> Result<ProfileOutcome, AlignmentError>;

    fn generation(&self) -> Result<u64, AlignmentError>;

    /// Call on audio or model change; results from older generations are
    /// stale.
    fn invalidate(&self) -> Result<u64, AlignmentError>;
}

pub struct ModelBackedProfile {
    engine: Arc<AlignmentEngine>,
}

impl ModelBackedProfile {
    pub fn new(engine: Arc<AlignmentEngine>) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &Arc<AlignmentEngine> {
        &self.engine
    }
}

impl AlignmentProfile for ModelBackedProfile {
    fn name(&self) -> &'static str {
        "model"
    }

    fn realign_grid(
        &self,
        audio: &AudioInput,
        graph: &PhonemeGraph,
    ) -> Result<ProfileOutcome, AlignmentError> {
        graph.validate()?;
        let expanded = graph.expand_tokens();
        let last = expanded.last_boundary();
        // One token per interval after expansion, so a locked boundary's
        // index is also the number of tokens before it.
        let constraints: Vec<AlignmentConstraint> = (1..last)
            .filter(|&i| expanded.boundaries[i].locked)
            .map(|i| AlignmentConstraint {
                time: expanded.boundaries[i].time,
                token_index: i,
            })
            .collect();
        let phonemes = expanded
            .intervals
            .iter()
            .map(|iv| iv.text.clone())
            .collect();
        // Locked outer edges bound the timeline instead of the file.
        let first = &expanded.boundaries[0];
        let end = &expanded.boundaries[last];
        let request = AlignmentRequest::new(phonemes)
            .with_constraints(constraints)
            .with_start_time(if first.locked { first.time } else { 0.0 })
            .with_end_time(if end.locked { end.time } else { audio.duration_secs() });

        let output = self.engine.align(audio, &request)?;
        let mut aligned = PhonemeGraph::from_intervals(&output.intervals)?;
        for (i, b) in expanded.boundaries.iter().enumerate() {
            if b.locked {
                aligned.set_locked(i, true);
            }
        }
        Ok(ProfileOutcome {
            graph: aligned,
            diagnostics: output.diagnostics,
            generation: output.generation,
        })
    }

    fn realign_around(
        &self,
        audio: &AudioInput,
        graph: &PhonemeGraph,
        pivot: usize,
        pivot_time: f64,
    ) -> Result<ProfileOutcome, AlignmentError> {
        let scoped = self.engine.realign_scoped(audio, graph, pivot, pivot_time)?;
        let spliced = graph.splice_scoped(pivot, pivot_time, &scoped.left, &scoped.right)?;
        Ok(ProfileOutcome {
            graph: spliced,
            diagnostics: scoped.diagnostics,
            generation: scoped.generation,
        })
    }

    fn generation(&self) -> Result<u64, AlignmentError> {
        self.engine.cache_generation()
    }

    fn invalidate(&self) -> Result<u64, AlignmentError> {
        self.engine.invalidate_cache()
    }
}

/// Elastic alignment only; used when no acoustic model is available.
#[derive(Default)]
pub struct ManualProfile {
    generation: AtomicU64,
}

impl ManualProfile {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AlignmentProfile for ManualProfile {
    fn name(&self) -> &'static str {
        "manual"
    }

    fn realign_grid(
        &self,
        audio: &AudioInput,
        graph: &PhonemeGraph,
    ) -> Result<ProfileOutcome, AlignmentError> {
        Ok(ProfileOutcome {
            graph: elastic::realign_grid(graph, audio.duration_secs())?,
            diagnostics: Vec::new(),
            generation: self.generation.load(Ordering::SeqCst),
        })
    }

    fn realign_around(
        &self,
        _audio: &AudioInput,
        graph: &PhonemeGraph,
        pivot: usize,
        pivot_time: f64,
    ) -> Result<ProfileOutcome, AlignmentError> {
        Ok(ProfileOutcome {
            graph: elastic::redistribute_around(graph, pivot, pivot_time)?,
            diagnostics: Vec::new(),
            generation: self.generation.load(Ordering::SeqCst),
        })
    }

    fn generation(&self) -> Result<u64, AlignmentError> {
        Ok(self.generation.load(Ordering::SeqCst))
    }

    fn invalidate(&self) -> Result<u64, AlignmentError> {
        Ok(self.generation.fetch_add(1, Ordering::SeqCst) + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alignment::tokenization::PhonemeVocab;
    use crate::config::AcousticModelConfig;
    use crate::pipeline::defaults::{DisabledRefiner, ViterbiSequenceAligner};
    use crate::pipeline::runtime::AlignmentEngineParts;
    use crate::pipeline::traits::EmissionBackend;

    const SYMBOLS: [&str; 4] = ["<pad>", "sil", "k", "a"];

    /// sil, k, a, sil in four equal quarters of 100 frames.
    struct QuarterBackend;

    impl EmissionBackend for QuarterBackend {
        fn infer(&self, _audio: &[f32]) -> Result<Vec<Vec<f32>>, AlignmentError> {
            let classes = [1usize, 2, 3, 1];
            Ok((0..100)
                .map(|t| {
                    let mut row = vec![0.0f32; SYMBOLS.len()];
                    row[classes[t / 25]] = 10.0;
                    row
                })
                .collect())
        }

        fn device_label(&self) -> String {
            "mock".to_string()
        }
    }

    fn model_profile() -> ModelBackedProfile {
        let engine = AlignmentEngine::from_parts(AlignmentEngineParts {
            vocab: PhonemeVocab::from_symbols(SYMBOLS),
            model_cfg: AcousticModelConfig::default(),
            expected_sample_rate_hz: 16_000,
            min_duration_secs: 0.01,
            chunk_samples: 0,
            context_samples: 0,
            normalize_input: false,
            emission_backend: Box::new(QuarterBackend),
            refiner: Box::new(DisabledRefiner::new("test")),
            sequence_aligner: Box::new(ViterbiSequenceAligner),
            cache_capacity: 1,
        });
        ModelBackedProfile::new(Arc::new(engine))
    }

    fn audio() -> AudioInput {
        AudioInput::new("profile.wav", 16_000, vec![0.0; 32_000])
    }

    #[test]
    fn model_grid_splits_and_aligns() {
        let graph = PhonemeGraph::from_times(&[0.0, 1.2, 2.0], ["sil k", "a sil"]).unwrap();
        let out = model_profile().realign_grid(&audio(), &graph).unwrap();
        assert_eq!(out.graph.intervals.len(), 4);
        let times = out.graph.times();
        for (got, want) in times.iter().zip([0.0, 0.5, 1.0, 1.5, 2.0]) {
            assert!((got - want).abs() < 1e-9, "{times:?}");
        }
    }

    #[test]
    fn model_grid_keeps_locked_boundaries() {
        let mut graph =
            PhonemeGraph::from_times(&[0.0, 0.4, 1.1, 1.6, 2.0], ["sil", "k", "a", "sil"]).unwrap();
        graph.set_locked(2, true);
        let out = model_profile().realign_grid(&audio(), &graph).unwrap();
        assert!(out.graph.boundaries[2].locked);
        assert_eq!(out.graph.boundaries[2].time, 1.1);
    }

    #[test]
    fn model_grid_keeps_locked_edges() {
        let mut graph = PhonemeGraph::from_times(
            &[0.3, 0.8, 1.2, 1.6, 1.8],
            ["sil", "k", "a", "sil"],
        )
        .unwrap();
        graph.set_locked(0, true);
        graph.set_locked(4, true);
        let out = model_profile().realign_grid(&audio(), &graph).unwrap();
        let times = out.graph.times();
        assert_eq!(times.first().copied(), Some(0.3));
        assert_eq!(times.last().copied(), Some(1.8));
        assert!(out.graph.boundaries[0].locked && out.graph.boundaries[4].locked);
        assert!(times.windows(2).all(|w| w[0] < w[1]), "{times:?}");
        // Interior boundaries still follow the emissions.
        for (got, want) in times[1..4].iter().zip([0.5, 1.0, 1.5]) {
            assert!((got - want).abs() < 1e-9, "{times:?}");
        }
    }

    #[test]
    fn model_realign_around_splices_spans() {
        let graph = PhonemeGraph::from_times(&[0.0, 0.8, 2.0], ["sil k", "a sil"]).unwrap();
        let out = model_profile()
            .realign_around(&audio(), &graph, 1, 1.0)
            .unwrap();
        let times = out.graph.times();
        assert_eq!(times.len(), 5);
        for (got, want) in times.iter().zip([0.0, 0.5, 1.0, 1.5, 2.0]) {
            assert!((got - want).abs() < 1e-9, "{times:?}");
        }
    }

    #[test]
    fn manual_profile_uses_elastic_weights() {
        let profile = ManualProfile::new();
        let graph = PhonemeGraph::from_times(&[0.0, 1.0, 2.0], ["sil", "k a"]).unwrap();
        let audio = AudioInput::new("manual.wav", 16_000, vec![0.0; 36_800]);
        let out = profile.realign_grid(&audio, &graph).unwrap();
        // Weights 1.0, 0.3, 1.0 over 2.3 s.
        let times = out.graph.times();
        assert!((times[1] - 1.0).abs() < 1e-9);
        assert!((times[2] - 1.3).abs() < 1e-9);
        assert!((times[3] - 2.3).abs() < 1e-9);
    }

    #[test]
    fn generations_advance_on_invalidate() {
        let manual = ManualProfile::new();
        assert_eq!(manual.generation().unwrap(), 0);
        assert_eq!(manual.invalidate().unwrap(), 1);
        let model = model_profile();
        assert_eq!(model.invalidate().unwrap(), 1);
        assert_eq!(model.generation().unwrap(), 1);
        assert_eq!(model.name(), "model");
        assert_eq!(manual.name(), "manual");
    }
}
