use crate::alignment::viterbi::SegmentPath;
use crate::error::AlignmentError;
use crate::features::FeatureWindow;

/// Acoustic model: mono 16 kHz audio in, `frames x classes` raw logits out.
pub trait EmissionBackend: Send + Sync {
    fn infer(&self, audio: &[f32]) -> Result<Vec<Vec<f32>>, AlignmentError>;

    fn device_label(&self) -> String;
}

/// Boundary refiner model: one millisecond offset per
/// `(window, left phoneme, right phoneme)` triple.
pub trait BoundaryRefiner: Send + Sync {
    /// Rows per feature window, or `None` when refinement is disabled.
    fn time_steps(&self) -> Option<usize>;

    fn refine_batch(
        &self,
        windows: &[FeatureWindow],
        left_phonemes: &[usize],
        right_phonemes: &[usize],
    ) -> Result<Vec<f32>, AlignmentError>;

    fn refine(
        &self,
        window: &FeatureWindow,
        left_phoneme: usize,
        right_phoneme: usize,
    ) -> Result<f32, AlignmentError> {
        let out = self.refine_batch(
            std::slice::from_ref(window),
            &[left_phoneme],
            &[right_phoneme],
        )?;
        match out.as_slice() {
            [offset] => Ok(*offset),
            _ => Err(AlignmentError::batch_size_mismatch("refiner outputs", 1, out.len())),
        }
    }
}

pub trait SequenceAligner: Send + Sync {
    /// Aligns `tokens` onto log-prob frames `[start_frame, end_frame)`.
    fn align_segment(
        &self,
        log_probs: &[Vec<f32>],
        start_frame: usize,
        end_frame: usize,
        tokens: &[usize],
    ) -> SegmentPath;
}
