use crate::error::AlignmentError;
use crate::features::{extract_feature_window, FeatureWindow, FeatureWindowSpec};
use crate::pipeline::traits::BoundaryRefiner;

/// Boundaries of one coarse-aligned span plus the token ids between them.
#[derive(Debug, Clone, PartialEq)]
pub struct RefineSpan {
    /// `tokens.len() + 1` times; the first and last are fixed anchors.
    pub boundaries: Vec<f64>,
    pub tokens: Vec<usize>,
}

/// Cached signals the feature windows are cut from.
#[derive(Debug, Clone, Copy)]
pub struct FeatureSource<'a> {
    pub samples: &'a [f32],
    pub ppg: &'a [Vec<f32>],
    pub ppg_dim: usize,
    pub ppg_frame_secs: f64,
}

/// Fails with `BatchSizeMismatch` unless all refiner inputs line up.
pub fn check_batch(windows: usize, left: usize, right: usize) -> Result<(), AlignmentError> {
    if left != windows {
        return Err(AlignmentError::batch_size_mismatch("left phoneme ids", windows, left));
    }
    if right != windows {
        return Err(AlignmentError::batch_size_mismatch("right phoneme ids", windows, right));
    }
    Ok(())
}

/// Applies refiner offsets to one span's interior boundaries.
///
/// Each refined boundary is clamped into
/// `[refined previous + min, original next - min]`; using the original next
/// boundary keeps one correction from pushing into its neighbor. When that
/// room is empty the coarse value is kept.
pub fn clamp_refined(boundaries: &[f64], offsets_ms: &[f32], min_duration_secs: f64) -> Vec<f64> {
    let mut out = boundaries.to_vec();
    if boundaries.len() < 3 {
        return out;
    }
    for i in 1..boundaries.len() - 1 {
        let offset = offsets_ms.get(i - 1).copied().unwrap_or(0.0);
        let offset = if offset.is_finite() { offset as f64 } else { 0.0 };
        let lower = out[i - 1] + min_duration_secs;
        let upper = boundaries[i + 1] - min_duration_secs;
        if upper - lower <= 0.0 {
            continue;
        }
        out[i] = (boundaries[i] + offset / 1000.0).clamp(lower, upper);
    }
    out
}

/// Refines the interior boundaries of every span with one batched refiner
/// call and returns the corrected boundary lists in span order.
///
/// An unavailable or failing refiner leaves the coarse boundaries as they
/// are; only a batch-size mismatch is reported.
pub fn refine_spans(
    refiner: &dyn BoundaryRefiner,
    source: FeatureSource<'_>,
    spans: &[RefineSpan],
    min_duration_secs: f64,
) -> Result<Vec<Vec<f64>>, AlignmentError> {
    let Some(time_steps) = refiner.time_steps() else {
        return Ok(spans.iter().map(|s| s.boundaries.clone()).collect());
    };
    let spec = FeatureWindowSpec {
        time_steps,
        ppg_frame_secs: source.ppg_frame_secs,
    };

    let mut windows: Vec<FeatureWindow> = Vec::new();
    let mut left = Vec::new();
    let mut right = Vec::new();
    for span in spans {
        if span.boundaries.len() != span.tokens.len() + 1 {
            return Err(AlignmentError::batch_size_mismatch(
                "span boundaries",
                span.tokens.len() + 1,
                span.boundaries.len(),
            ));
        }
        for i in 1..span.tokens.len() {
            windows.push(extract_feature_window(
                source.samples,
                source.ppg,
                source.ppg_dim,
                span.boundaries[i],
                &spec,
            ));
            left.push(span.tokens[i - 1]);
            right.push(span.tokens[i]);
        }
    }

    let offsets = if windows.is_empty() {
        Vec::new()
    } else {
        match refiner.refine_batch(&windows, &left, &right) {
            Ok(offsets) => {
                if offsets.len() != windows.len() {
                    return Err(AlignmentError::batch_size_mismatch(
                        "refiner outputs",
                        windows.len(),
                        offsets.len(),
                    ));
                }
                offsets
            }
            Err(err @ AlignmentError::BatchSizeMismatch { .. }) => return Err(err),
            Err(err) => {
                tracing::warn!(error = %err, boundaries = windows.len(), "boundary refiner failed, keeping coarse boundaries");
                vec![0.0; windows.len()]
            }
        }
    };

    let mut cursor = 0usize;
    let mut out = Vec::with_capacity(spans.len());
    for span in spans {
        let interior = span.tokens.len().saturating_sub(1);
        let slice = &offsets[cursor..cursor + interior];
        cursor += interior;
        out.push(clamp_refined(&span.boundaries, slice, min_duration_secs));
    }
    Ok(out)
}
