use crate::alignment::graph::PhonemeGraph;
use crate::error::AlignmentError;

/// One side of a dragged boundary: the time range between the pivot and its
/// anchor, and the phonemes inside it.
#[derive(Debug, Clone, PartialEq)]
pub struct ScopedSpan {
    pub start_time: f64,
    pub end_time: f64,
    pub tokens: Vec<String>,
}

impl ScopedSpan {
    /// Spans with a single phoneme have nothing to place.
    pub fn needs_alignment(&self) -> bool {
        self.tokens.len() > 1
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScopedPlan {
    pub pivot: usize,
    pub pivot_time: f64,
    pub left_anchor: usize,
    pub right_anchor: usize,
    pub left: ScopedSpan,
    pub right: ScopedSpan,
}

/// Locates the anchors around `pivot` and collects the phonemes of both
/// spans. `pivot_time` is clamped between the anchor times.
pub fn plan_scoped(
    graph: &PhonemeGraph,
    pivot: usize,
    pivot_time: f64,
) -> Result<ScopedPlan, AlignmentError> {
    graph.validate()?;
    if pivot == 0 || pivot >= graph.last_boundary() {
        return Err(AlignmentError::invalid_input(format!(
            "boundary {pivot} is not an interior boundary of a {}-boundary graph",
            graph.boundaries.len()
        )));
    }
    if !pivot_time.is_finite() {
        return Err(AlignmentError::invalid_input(format!(
            "pivot time {pivot_time} is not finite"
        )));
    }
    let la = graph.left_anchor(pivot);
    let ra = graph.right_anchor(pivot);
    let lo = graph.boundaries[la].time;
    let hi = graph.boundaries[ra].time;
    let pivot_time = pivot_time.clamp(lo, hi);

    Ok(ScopedPlan {
        pivot,
        pivot_time,
        left_anchor: la,
        right_anchor: ra,
        left: ScopedSpan {
            start_time: lo,
            end_time: pivot_time,
            tokens: graph.tokens_between(la, pivot),
        },
        right: ScopedSpan {
            start_time: pivot_time,
            end_time: hi,
            tokens: graph.tokens_between(pivot, ra),
        },
    })
}
