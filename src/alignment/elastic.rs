//! Model-free alignment: spreads each span between locked boundaries over
//! its phonemes in proportion to a fixed per-phoneme weight.

use crate::alignment::graph::PhonemeGraph;
use crate::alignment::tokenization::split_phonemes;
use crate::error::AlignmentError;

pub const LONG_WEIGHT: f64 = 1.0;
pub const SHORT_WEIGHT: f64 = 0.3;

const SILENCE_SYMBOLS: &[&str] = &["", "sil", "sp", "SP", "AP", "pau", "SIL"];

const VOWEL_CHARS: &[char] = &[
    'a', 'e', 'i', 'o', 'u', 'ɑ', 'æ', 'ɐ', 'ə', 'ɚ', 'ɛ', 'ɜ', 'ɝ', 'ɪ', 'ɨ', 'ɔ', 'ø', 'œ', 'ɒ',
    'ʊ', 'ʉ', 'ʌ', 'ɯ', 'ɤ', 'ɵ', 'ɘ', 'ʏ',
];

/// Vowels and silence hold their length; everything else is short.
pub fn phoneme_weight(symbol: &str) -> f64 {
    if SILENCE_SYMBOLS.contains(&symbol) {
        return LONG_WEIGHT;
    }
    match symbol.chars().next() {
        Some(c) if VOWEL_CHARS.contains(&c.to_lowercase().next().unwrap_or(c)) => LONG_WEIGHT,
        _ => SHORT_WEIGHT,
    }
}

/// Sum of the phoneme weights of one interval's text; blank text weighs as
/// silence.
pub fn interval_weight(text: &str) -> f64 {
    let tokens = split_phonemes(text);
    if tokens.is_empty() {
        return LONG_WEIGHT;
    }
    tokens.into_iter().map(phoneme_weight).sum()
}

/// Interior boundary times that split `[start, end]` proportionally to
/// `weights`. Returns `weights.len() - 1` times; zero total weight splits
/// evenly.
pub fn distribute(start: f64, end: f64, weights: &[f64]) -> Vec<f64> {
    let n = weights.len();
    if n < 2 {
        return Vec::new();
    }
    let span = (end - start).max(0.0);
    let total: f64 = weights.iter().map(|w| w.max(0.0)).sum();
    let mut acc = 0.0;
    let mut out = Vec::with_capacity(n - 1);
    for (i, w) in weights[..n - 1].iter().enumerate() {
        let frac = if total > 0.0 {
            acc += w.max(0.0);
            acc / total
        } else {
            (i + 1) as f64 / n as f64
        };
        out.push((start + span * frac).min(end.max(start)));
    }
    out
}

/// Places every unlocked boundary strictly between `a` and `b`, treating
/// interior locked boundaries as fixed split points.
fn redistribute_in_place(graph: &mut PhonemeGraph, a: usize, b: usize) {
    let mut left = a;
    while left < b {
        let right = (left + 1..b)
            .find(|&i| graph.boundaries[i].locked)
            .unwrap_or(b);
        if right - left > 1 {
            let weights: Vec<f64> = graph.intervals[left..right]
                .iter()
                .map(|iv| interval_weight(&iv.text))
                .collect();
            let times = distribute(
                graph.boundaries[left].time,
                graph.boundaries[right].time,
                &weights,
            );
            for (offset, time) in times.into_iter().enumerate() {
                graph.boundaries[left + 1 + offset].time = time;
            }
        }
        left = right;
    }
}

fn check_span(graph: &PhonemeGraph, a: usize, b: usize) -> Result<(), AlignmentError> {
    if a > b || b > graph.last_boundary() || graph.intervals.is_empty() {
        return Err(AlignmentError::invalid_input(format!(
            "span {a}..{b} is outside a graph with {} boundaries",
            graph.boundaries.len()
        )));
    }
    Ok(())
}

/// Redistributes the single span between boundaries `a` and `b`.
pub fn redistribute_span(
    graph: &PhonemeGraph,
    a: usize,
    b: usize,
) -> Result<PhonemeGraph, AlignmentError> {
    check_span(graph, a, b)?;
    let mut out = graph.clone();
    redistribute_in_place(&mut out, a, b);
    Ok(out)
}

/// Moves `pivot` to `pivot_time` and redistributes the two spans between it
/// and its nearest locked neighbors. Used live while a boundary is dragged;
/// the pivot itself moves even when locked.
pub fn redistribute_around(
    graph: &PhonemeGraph,
    pivot: usize,
    pivot_time: f64,
) -> Result<PhonemeGraph, AlignmentError> {
    if pivot == 0 || pivot >= graph.last_boundary() {
        return Err(AlignmentError::invalid_input(format!(
            "boundary {pivot} is not an interior boundary"
        )));
    }
    let la = graph.left_anchor(pivot);
    let ra = graph.right_anchor(pivot);
    let mut out = graph.clone();
    out.boundaries[pivot].time =
        pivot_time.clamp(graph.boundaries[la].time, graph.boundaries[ra].time);
    redistribute_in_place(&mut out, la, pivot);
    redistribute_in_place(&mut out, pivot, ra);
    Ok(out)
}

/// Whole-file elastic alignment.
///
/// Multi-token intervals are first split into one interval per phoneme.
/// The file start and `duration` are pinned as implicit anchors (unless a
/// locked boundary already sits there) and every span between locked
/// boundaries is redistributed.
pub fn realign_grid(graph: &PhonemeGraph, duration: f64) -> Result<PhonemeGraph, AlignmentError> {
    graph.validate()?;
    if graph.intervals.is_empty() {
        return Ok(graph.clone());
    }
    let mut out = graph.expand_tokens();
    let last = out.last_boundary();
    if !out.boundaries[0].locked {
        out.boundaries[0].time = 0.0;
    }
    if !out.boundaries[last].locked && duration.is_finite() {
        out.boundaries[last].time = duration.max(out.boundaries[0].time);
    }
    redistribute_in_place(&mut out, 0, last);
    tracing::debug!(
        intervals = out.intervals.len(),
        duration,
        "elastic realignment of whole grid"
    );
    Ok(out)
}
