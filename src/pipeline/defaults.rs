use crate::alignment::refine::check_batch;
use crate::alignment::viterbi::{forced_align_viterbi, SegmentPath};
use crate::error::AlignmentError;
use crate::features::FeatureWindow;
use crate::pipeline::traits::{BoundaryRefiner, SequenceAligner};

pub struct ViterbiSequenceAligner;

impl SequenceAligner for ViterbiSequenceAligner {
    fn align_segment(
        &self,
        log_probs: &[Vec<f32>],
        start_frame: usize,
        end_frame: usize,
        tokens: &[usize],
    ) -> SegmentPath {
        forced_align_viterbi(log_probs, start_frame, end_frame, tokens)
    }
}

/// Stand-in used when the refiner model cannot be loaded. Every boundary
/// gets a zero offset.
#[derive(Debug, Clone)]
pub struct DisabledRefiner {
    reason: String,
}

impl DisabledRefiner {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }
}

impl BoundaryRefiner for DisabledRefiner {
    fn time_steps(&self) -> Option<usize> {
        None
    }

    fn refine_batch(
        &self,
        windows: &[FeatureWindow],
        left_phonemes: &[usize],
        right_phonemes: &[usize],
    ) -> Result<Vec<f32>, AlignmentError> {
        check_batch(windows.len(), left_phonemes.len(), right_phonemes.len())?;
        Ok(vec![0.0; windows.len()])
    }
}
