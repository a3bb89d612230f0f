//! Splits long audio into overlapping chunks for the acoustic model and
//! stitches the per-chunk logits back into one matrix with exactly the
//! frame count a single full-length pass would produce.

use crate::config::AcousticModelConfig;
use crate::error::AlignmentError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioChunk {
    /// Sample range fed to the model, context included.
    pub input_start: usize,
    pub input_end: usize,
    /// Global output frames this chunk contributes.
    pub first_frame: usize,
    pub end_frame: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkPlan {
    pub chunks: Vec<AudioChunk>,
    pub stride: usize,
    pub total_frames: usize,
}

fn round_up(value: usize, multiple: usize) -> usize {
    value.div_ceil(multiple) * multiple
}

impl ChunkPlan {
    /// `chunk_samples == 0` (or a chunk at least as long as the audio) gives
    /// a single pass over the whole signal.
    pub fn new(
        total_samples: usize,
        chunk_samples: usize,
        context_samples: usize,
        model: &AcousticModelConfig,
    ) -> Self {
        let stride = model.stride_samples();
        let total_frames = model.output_frames(total_samples);
        let chunk = round_up(chunk_samples, stride);
        let context = round_up(context_samples, stride);

        if chunk == 0 || chunk >= total_samples {
            return Self {
                chunks: vec![AudioChunk {
                    input_start: 0,
                    input_end: total_samples,
                    first_frame: 0,
                    end_frame: total_frames,
                }],
                stride,
                total_frames,
            };
        }

        let mut chunks = Vec::with_capacity(total_samples.div_ceil(chunk));
        let mut start = 0usize;
        while start < total_samples {
            let end = (start + chunk).min(total_samples);
            let last = end == total_samples;
            let first_frame = (start / stride).min(total_frames);
            let end_frame = if last {
                total_frames
            } else {
                (end / stride).min(total_frames)
            };
            chunks.push(AudioChunk {
                input_start: start.saturating_sub(context),
                input_end: (end + context).min(total_samples),
                first_frame,
                end_frame,
            });
            start = end;
        }
        Self {
            chunks,
            stride,
            total_frames,
        }
    }

    /// Joins per-chunk logits in plan order. Frames a chunk is missing at
    /// its right edge repeat its last row.
    pub fn stitch(&self, per_chunk: Vec<Vec<Vec<f32>>>) -> Result<Vec<Vec<f32>>, AlignmentError> {
        if per_chunk.len() != self.chunks.len() {
            return Err(AlignmentError::invalid_input(format!(
                "expected logits for {} chunks, got {}",
                self.chunks.len(),
                per_chunk.len()
            )));
        }
        let mut out = Vec::with_capacity(self.total_frames);
        for (i, (chunk, logits)) in self.chunks.iter().zip(per_chunk).enumerate() {
            if chunk.first_frame >= chunk.end_frame {
                continue;
            }
            let Some(last_row) = logits.last().cloned() else {
                return Err(AlignmentError::invalid_input(format!(
                    "acoustic model returned no frames for chunk {i}"
                )));
            };
            let offset = chunk.input_start / self.stride;
            let wanted = chunk.end_frame - chunk.first_frame;
            let local_start = chunk.first_frame.saturating_sub(offset);
            let available = logits.len().saturating_sub(local_start).min(wanted);
            if available < wanted {
                tracing::debug!(
                    chunk = i,
                    missing = wanted - available,
                    "padding chunk edge with its last logits row"
                );
            }
            out.extend(logits.into_iter().skip(local_start).take(available));
            out.extend(std::iter::repeat(last_row).take(wanted - available));
        }
        Ok(out)
    }
}
