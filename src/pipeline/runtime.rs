use std::sync::Arc;

use crate::alignment::graph::PhonemeGraph;
use crate::alignment::refine::{refine_spans, FeatureSource, RefineSpan};
use crate::alignment::scoped::{plan_scoped, ScopedSpan};
use crate::alignment::segments::{path_to_boundaries, plan_segments, time_to_frame};
use crate::alignment::tokenization::PhonemeVocab;
use crate::config::AcousticModelConfig;
use crate::error::AlignmentError;
use crate::pipeline::cache::{CachedAudio, FeatureCache};
use crate::pipeline::chunking::ChunkPlan;
use crate::pipeline::emissions::{log_softmax_row, normalize_audio, ppg_from_logits};
use crate::pipeline::traits::{BoundaryRefiner, EmissionBackend, SequenceAligner};
use crate::types::{
    AlignmentInterval, AlignmentOutput, AlignmentRequest, AudioInput, ScopedRealignment,
    SegmentDiagnostic,
};

/// Model-backed aligner: acoustic emissions, constrained Viterbi and
/// boundary refinement over a per-audio cache.
pub struct AlignmentEngine {
    vocab: PhonemeVocab,
    model_cfg: AcousticModelConfig,
    expected_sample_rate_hz: u32,
    frame_secs: f64,
    min_duration_secs: f64,
    chunk_samples: usize,
    context_samples: usize,
    normalize_input: bool,
    emission_backend: Box<dyn EmissionBackend>,
    refiner: Box<dyn BoundaryRefiner>,
    sequence_aligner: Box<dyn SequenceAligner>,
    cache: FeatureCache,
}

pub(crate) struct AlignmentEngineParts {
    pub vocab: PhonemeVocab,
    pub model_cfg: AcousticModelConfig,
    pub expected_sample_rate_hz: u32,
    pub min_duration_secs: f64,
    pub chunk_samples: usize,
    pub context_samples: usize,
    pub normalize_input: bool,
    pub emission_backend: Box<dyn EmissionBackend>,
    pub refiner: Box<dyn BoundaryRefiner>,
    pub sequence_aligner: Box<dyn SequenceAligner>,
    pub cache_capacity: usize,
}

/// Coarse result of one aligned stretch of tokens.
struct CoarseSpan {
    boundaries: Vec<f64>,
    tokens: Vec<usize>,
    refine: bool,
}

impl AlignmentEngine {
    pub(crate) fn from_parts(parts: AlignmentEngineParts) -> Self {
        let frame_secs = parts.model_cfg.frame_stride_ms(parts.expected_sample_rate_hz) / 1000.0;
        Self {
            vocab: parts.vocab,
            model_cfg: parts.model_cfg,
            expected_sample_rate_hz: parts.expected_sample_rate_hz,
            frame_secs,
            min_duration_secs: parts.min_duration_secs,
            chunk_samples: parts.chunk_samples,
            context_samples: parts.context_samples,
            normalize_input: parts.normalize_input,
            emission_backend: parts.emission_backend,
            refiner: parts.refiner,
            sequence_aligner: parts.sequence_aligner,
            cache: FeatureCache::new(parts.cache_capacity),
        }
    }

    pub fn vocab(&self) -> &PhonemeVocab {
        &self.vocab
    }

    /// Seconds per emission frame.
    pub fn frame_secs(&self) -> f64 {
        self.frame_secs
    }

    pub fn device_label(&self) -> String {
        self.emission_backend.device_label()
    }

    pub fn refinement_enabled(&self) -> bool {
        self.refiner.time_steps().is_some()
    }

    pub fn cache_generation(&self) -> Result<u64, AlignmentError> {
        self.cache.generation()
    }

    pub fn is_current(&self, entry: &CachedAudio) -> Result<bool, AlignmentError> {
        self.cache.is_current(entry)
    }

    /// Drops all cached model output; call on audio or model change.
    pub fn invalidate_cache(&self) -> Result<u64, AlignmentError> {
        self.cache.invalidate()
    }

    /// Model output for `audio`, computed on first use per audio key.
    pub fn emissions(&self, audio: &AudioInput) -> Result<Arc<CachedAudio>, AlignmentError> {
        if audio.sample_rate_hz != self.expected_sample_rate_hz {
            return Err(AlignmentError::invalid_input(format!(
                "audio '{}' is {} Hz, the acoustic model expects {} Hz",
                audio.key, audio.sample_rate_hz, self.expected_sample_rate_hz
            )));
        }
        self.cache
            .get_or_build(&audio.key, |generation| self.compute_emissions(audio, generation))
    }

    fn compute_emissions(
        &self,
        audio: &AudioInput,
        generation: u64,
    ) -> Result<CachedAudio, AlignmentError> {
        let normalized;
        let input: &[f32] = if self.normalize_input {
            normalized = normalize_audio(&audio.samples);
            &normalized
        } else {
            &audio.samples[..]
        };

        let plan = ChunkPlan::new(
            input.len(),
            self.chunk_samples,
            self.context_samples,
            &self.model_cfg,
        );
        let logits = if plan.chunks.len() == 1 {
            self.emission_backend.infer(input)?
        } else {
            let per_chunk = plan
                .chunks
                .iter()
                .map(|c| self.emission_backend.infer(&input[c.input_start..c.input_end]))
                .collect::<Result<Vec<_>, _>>()?;
            plan.stitch(per_chunk)?
        };

        let log_probs: Vec<Vec<f32>> = logits.iter().map(|row| log_softmax_row(row)).collect();
        let ppg = ppg_from_logits(&logits, &self.vocab);
        tracing::info!(
            key = %audio.key,
            generation,
            frames = logits.len(),
            chunks = plan.chunks.len(),
            device = %self.emission_backend.device_label(),
            "computed acoustic emissions"
        );
        Ok(CachedAudio {
            key: audio.key.clone(),
            generation,
            samples: Arc::clone(&audio.samples),
            logits,
            log_probs,
            ppg,
            ppg_dim: self.vocab.phoneme_dim(),
            frame_secs: self.frame_secs,
        })
    }

    fn feature_source<'a>(&self, cached: &'a CachedAudio) -> FeatureSource<'a> {
        FeatureSource {
            samples: &cached.samples[..],
            ppg: &cached.ppg,
            ppg_dim: cached.ppg_dim,
            ppg_frame_secs: cached.frame_secs,
        }
    }

    /// Viterbi-aligns `tokens` onto `[start_time, end_time]` and returns
    /// `tokens.len() + 1` boundary times.
    fn coarse_boundaries(
        &self,
        cached: &CachedAudio,
        tokens: &[usize],
        start_time: f64,
        end_time: f64,
    ) -> (Vec<f64>, bool, usize) {
        let n = cached.num_frames();
        let start_frame = time_to_frame(start_time, cached.frame_secs, n);
        let end_frame = time_to_frame(end_time, cached.frame_secs, n).max(start_frame);
        let path =
            self.sequence_aligner
                .align_segment(&cached.log_probs, start_frame, end_frame, tokens);
        let boundaries = path_to_boundaries(&path, start_time, end_time, cached.frame_secs);
        (boundaries, path.feasible, end_frame - start_frame)
    }

    fn refine(
        &self,
        cached: &CachedAudio,
        spans: &[RefineSpan],
    ) -> Result<Vec<Vec<f64>>, AlignmentError> {
        refine_spans(
            self.refiner.as_ref(),
            self.feature_source(cached),
            spans,
            self.min_duration_secs,
        )
    }

    /// Runs only the batched refiner over already aligned spans.
    pub fn refine_boundaries(
        &self,
        audio: &AudioInput,
        spans: &[RefineSpan],
    ) -> Result<Vec<Vec<f64>>, AlignmentError> {
        let cached = self.emissions(audio)?;
        self.refine(&cached, spans)
    }

    /// Full alignment of `request.phonemes` against `audio`.
    ///
    /// Constraints split the timeline into independently aligned segments.
    /// Infeasible segments and malformed constraints are reported in
    /// `diagnostics`; the intervals always cover `[start_time, end_time]`
    /// without gaps.
    pub fn align(
        &self,
        audio: &AudioInput,
        request: &AlignmentRequest,
    ) -> Result<AlignmentOutput, AlignmentError> {
        let cached = self.emissions(audio)?;
        let start_time = request.start_time.unwrap_or(0.0);
        let end_time = request.end_time.unwrap_or_else(|| audio.duration_secs());
        if request.phonemes.is_empty() {
            return Ok(AlignmentOutput {
                intervals: Vec::new(),
                diagnostics: Vec::new(),
                generation: cached.generation,
            });
        }

        let tokens = self.vocab.tokenize(&request.phonemes);
        let (plans, mut diagnostics) = plan_segments(tokens.len(), &request.constraints, start_time, end_time);

        let mut coarse = Vec::with_capacity(plans.len());
        for (segment, plan) in plans.iter().enumerate() {
            let seg_tokens = tokens[plan.token_start..plan.token_end].to_vec();
            if plan.violation.is_some() {
                coarse.push(CoarseSpan {
                    boundaries: vec![plan.start_time; seg_tokens.len() + 1],
                    tokens: seg_tokens,
                    refine: false,
                });
                continue;
            }
            let (boundaries, feasible, frames) =
                self.coarse_boundaries(&cached, &seg_tokens, plan.start_time, plan.end_time);
            if !feasible {
                tracing::warn!(
                    segment,
                    frames,
                    tokens = seg_tokens.len(),
                    "no monotone path through segment, spreading tokens evenly"
                );
                diagnostics.push(SegmentDiagnostic::InfeasiblePath {
                    segment,
                    frames,
                    tokens: seg_tokens.len(),
                });
            }
            coarse.push(CoarseSpan {
                boundaries,
                tokens: seg_tokens,
                refine: true,
            });
        }

        let refine_input: Vec<RefineSpan> = coarse
            .iter()
            .filter(|c| c.refine)
            .map(|c| RefineSpan {
                boundaries: c.boundaries.clone(),
                tokens: c.tokens.clone(),
            })
            .collect();
        let mut refined = self.refine(&cached, &refine_input)?.into_iter();
        for span in coarse.iter_mut().filter(|c| c.refine) {
            if let Some(b) = refined.next() {
                span.boundaries = b;
            }
        }

        let mut intervals = Vec::with_capacity(tokens.len());
        let mut phonemes = request.phonemes.iter();
        for span in &coarse {
            for pair in span.boundaries.windows(2) {
                let text = phonemes.next().cloned().unwrap_or_default();
                intervals.push(AlignmentInterval {
                    start: pair[0],
                    end: pair[1],
                    text,
                });
            }
        }

        tracing::debug!(
            key = %audio.key,
            intervals = intervals.len(),
            segments = plans.len(),
            diagnostics = diagnostics.len(),
            "alignment finished"
        );
        Ok(AlignmentOutput {
            intervals,
            diagnostics,
            generation: cached.generation,
        })
    }

    /// Re-aligns the two spans on either side of `pivot` after it was moved
    /// to `pivot_time`, reusing cached emissions.
    ///
    /// Returns the interior boundary times of each span. A span with a
    /// single phoneme is not aligned and yields an empty list.
    pub fn realign_scoped(
        &self,
        audio: &AudioInput,
        graph: &PhonemeGraph,
        pivot: usize,
        pivot_time: f64,
    ) -> Result<ScopedRealignment, AlignmentError> {
        let plan = plan_scoped(graph, pivot, pivot_time)?;
        let cached = self.emissions(audio)?;

        let sides = [&plan.left, &plan.right];
        let mut spans = Vec::with_capacity(2);
        let mut aligned = [false; 2];
        let mut diagnostics = Vec::new();
        for (i, side) in sides.iter().enumerate() {
            if !side.needs_alignment() {
                continue;
            }
            let (span, diagnostic) = self.coarse_span(&cached, side, i);
            spans.push(span);
            diagnostics.extend(diagnostic);
            aligned[i] = true;
        }

        let mut refined = self.refine(&cached, &spans)?.into_iter();
        let mut interior = |was_aligned: bool| -> Vec<f64> {
            if !was_aligned {
                return Vec::new();
            }
            refined
                .next()
                .and_then(|b| b.get(1..b.len().saturating_sub(1)).map(<[f64]>::to_vec))
                .unwrap_or_default()
        };
        let left = interior(aligned[0]);
        let right = interior(aligned[1]);

        tracing::debug!(
            pivot,
            pivot_time = plan.pivot_time,
            left = left.len(),
            right = right.len(),
            "scoped realignment finished"
        );
        Ok(ScopedRealignment {
            left,
            right,
            diagnostics,
            generation: cached.generation,
        })
    }

    fn coarse_span(
        &self,
        cached: &CachedAudio,
        side: &ScopedSpan,
        segment: usize,
    ) -> (RefineSpan, Option<SegmentDiagnostic>) {
        let tokens = self.vocab.tokenize(&side.tokens);
        let (boundaries, feasible, frames) =
            self.coarse_boundaries(cached, &tokens, side.start_time, side.end_time);
        let diagnostic = (!feasible).then(|| {
            tracing::debug!(
                segment,
                frames,
                tokens = tokens.len(),
                "scoped span too short for its phonemes, spreading evenly"
            );
            SegmentDiagnostic::InfeasiblePath {
                segment,
                frames,
                tokens: tokens.len(),
            }
        });
        (RefineSpan { boundaries, tokens }, diagnostic)
    }
}
