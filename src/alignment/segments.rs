//! Splits a token sequence at hard anchors and aligns each piece on its own
//! frame range, so anchors hold exactly while the phonemes between them move
//! freely.

use crate::alignment::viterbi::SegmentPath;
use crate::types::{AlignmentConstraint, SegmentDiagnostic};

/// One independently aligned piece of the timeline.
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentPlan {
    pub token_start: usize,
    pub token_end: usize,
    pub start_time: f64,
    pub end_time: f64,
    /// Set when the segment came from malformed constraints; its tokens get
    /// zero-duration intervals at `start_time`.
    pub violation: Option<String>,
}

impl SegmentPlan {
    pub fn token_count(&self) -> usize {
        self.token_end - self.token_start
    }
}

/// Partitions `num_tokens` tokens on `[start_time, end_time]` at the given
/// anchors.
///
/// Anchors are taken in order. One that goes back in time gives its tokens
/// zero duration; one that adds no tokens is dropped; token indices past the
/// sequence are clamped. The first token starts at `start_time` and the last
/// always ends at `end_time`.
pub fn plan_segments(
    num_tokens: usize,
    constraints: &[AlignmentConstraint],
    start_time: f64,
    end_time: f64,
) -> (Vec<SegmentPlan>, Vec<SegmentDiagnostic>) {
    let start_time = if start_time.is_finite() { start_time.max(0.0) } else { 0.0 };
    let end_time = if end_time.is_finite() { end_time.max(start_time) } else { start_time };
    let mut plans: Vec<SegmentPlan> = Vec::new();
    let mut diagnostics = Vec::new();
    let mut prev_time = start_time;
    let mut prev_idx = 0usize;

    for (i, c) in constraints.iter().enumerate() {
        if prev_idx >= num_tokens {
            break;
        }
        let idx = c.token_index.min(num_tokens);
        if idx <= prev_idx {
            let message = format!(
                "anchor {i} at token {} adds no tokens after token {prev_idx}",
                c.token_index
            );
            tracing::warn!(anchor = i, token_index = c.token_index, "skipping empty alignment segment");
            diagnostics.push(SegmentDiagnostic::ConstraintViolation {
                segment: plans.len(),
                message,
            });
            continue;
        }
        if !c.time.is_finite() || c.time < prev_time {
            let message = format!(
                "anchor {i} at {:.3}s precedes the segment start at {prev_time:.3}s",
                c.time
            );
            tracing::warn!(anchor = i, time = c.time, prev_time, "alignment anchor out of order");
            diagnostics.push(SegmentDiagnostic::ConstraintViolation {
                segment: plans.len(),
                message: message.clone(),
            });
            plans.push(SegmentPlan {
                token_start: prev_idx,
                token_end: idx,
                start_time: prev_time,
                end_time: prev_time,
                violation: Some(message),
            });
            prev_idx = idx;
            continue;
        }
        let time = c.time.min(end_time);
        plans.push(SegmentPlan {
            token_start: prev_idx,
            token_end: idx,
            start_time: prev_time,
            end_time: time,
            violation: None,
        });
        prev_time = time;
        prev_idx = idx;
    }

    if prev_idx < num_tokens {
        plans.push(SegmentPlan {
            token_start: prev_idx,
            token_end: num_tokens,
            start_time: prev_time,
            end_time,
            violation: None,
        });
    } else if prev_time < end_time {
        // The final anchor stops short of the timeline end. Stretch the last
        // real segment and move the zero-duration ones after it along.
        match plans.iter().rposition(|p| p.violation.is_none()) {
            Some(last) => {
                plans[last].end_time = end_time;
                for p in &mut plans[last + 1..] {
                    p.start_time = end_time;
                    p.end_time = end_time;
                }
            }
            None => {
                if let Some(p) = plans.last_mut() {
                    p.end_time = end_time;
                    p.violation = None;
                }
            }
        }
    }

    (plans, diagnostics)
}

/// Seconds to the nearest frame index, clamped to the matrix.
pub fn time_to_frame(time: f64, frame_secs: f64, num_frames: usize) -> usize {
    if frame_secs <= 0.0 || !time.is_finite() || time <= 0.0 {
        return 0;
    }
    ((time / frame_secs).round() as usize).min(num_frames)
}

/// Turns a segment path into `tokens + 1` boundary times on
/// `[start_time, end_time]`. The outer edges are exact; interior boundaries
/// sit on frame edges, clamped into the span and kept non-decreasing.
///
/// An infeasible path carries no timing information, so its span is split
/// evenly in time instead of on the frame grid.
pub fn path_to_boundaries(
    path: &SegmentPath,
    start_time: f64,
    end_time: f64,
    frame_secs: f64,
) -> Vec<f64> {
    let n = path.token_ends.len();
    if !path.feasible && n > 0 {
        return even_boundaries(n, start_time, end_time);
    }
    let mut out = Vec::with_capacity(n + 1);
    out.push(start_time);
    for (i, &frame) in path.token_ends.iter().enumerate() {
        let t = if i + 1 == n {
            end_time
        } else {
            (frame as f64 * frame_secs).clamp(start_time, end_time.max(start_time))
        };
        let floor = *out.last().unwrap_or(&start_time);
        out.push(t.max(floor));
    }
    out
}

fn even_boundaries(tokens: usize, start_time: f64, end_time: f64) -> Vec<f64> {
    let span = (end_time - start_time).max(0.0);
    (0..=tokens)
        .map(|i| {
            if i == tokens {
                end_time.max(start_time)
            } else {
                start_time + span * i as f64 / tokens as f64
            }
        })
        .collect()
}
