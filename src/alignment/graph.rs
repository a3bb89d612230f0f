//! Arena form of the editor's interval tier.
//!
//! Boundaries live in one ordered vector and intervals refer to them by
//! index, so moving a boundary is a single slot write seen by both
//! neighboring intervals.

use crate::alignment::tokenization::split_phonemes;
use crate::error::AlignmentError;
use crate::types::AlignmentInterval;

#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Boundary {
    pub time: f64,
    pub locked: bool,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Interval {
    pub start: usize,
    pub end: usize,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Default, serde::Serialize, serde::Deserialize)]
pub struct PhonemeGraph {
    pub boundaries: Vec<Boundary>,
    pub intervals: Vec<Interval>,
}

impl PhonemeGraph {
    /// Builds a chain of intervals over consecutive `times`; every boundary
    /// starts unlocked.
    pub fn from_times<S: Into<String>>(
        times: &[f64],
        texts: impl IntoIterator<Item = S>,
    ) -> Result<Self, AlignmentError> {
        let texts: Vec<String> = texts.into_iter().map(Into::into).collect();
        if times.len() != texts.len() + 1 {
            return Err(AlignmentError::invalid_input(format!(
                "{} boundary times cannot frame {} intervals",
                times.len(),
                texts.len()
            )));
        }
        let boundaries = times
            .iter()
            .map(|&time| Boundary {
                time,
                locked: false,
            })
            .collect();
        let intervals = texts
            .into_iter()
            .enumerate()
            .map(|(i, text)| Interval {
                start: i,
                end: i + 1,
                text,
            })
            .collect();
        let graph = Self {
            boundaries,
            intervals,
        };
        graph.validate()?;
        Ok(graph)
    }

    pub fn from_intervals(intervals: &[AlignmentInterval]) -> Result<Self, AlignmentError> {
        let Some(first) = intervals.first() else {
            return Ok(Self::default());
        };
        let mut times = Vec::with_capacity(intervals.len() + 1);
        times.push(first.start);
        for pair in intervals.windows(2) {
            if (pair[0].end - pair[1].start).abs() > 1e-9 {
                return Err(AlignmentError::invalid_input(format!(
                    "intervals are not contiguous at {:.6}s / {:.6}s",
                    pair[0].end, pair[1].start
                )));
            }
        }
        times.extend(intervals.iter().map(|iv| iv.end));
        Self::from_times(&times, intervals.iter().map(|iv| iv.text.clone()))
    }

    /// Checks that intervals chain the boundaries in order with
    /// non-decreasing times.
    pub fn validate(&self) -> Result<(), AlignmentError> {
        if self.intervals.is_empty() {
            return Ok(());
        }
        if self.boundaries.len() != self.intervals.len() + 1 {
            return Err(AlignmentError::invalid_input(format!(
                "{} boundaries for {} intervals",
                self.boundaries.len(),
                self.intervals.len()
            )));
        }
        for (i, iv) in self.intervals.iter().enumerate() {
            if iv.start != i || iv.end != i + 1 {
                return Err(AlignmentError::invalid_input(format!(
                    "interval {i} references boundaries {}..{}",
                    iv.start, iv.end
                )));
            }
        }
        for (i, pair) in self.boundaries.windows(2).enumerate() {
            if !(pair[1].time >= pair[0].time) {
                return Err(AlignmentError::invalid_input(format!(
                    "boundary {} at {}s precedes boundary {i} at {}s",
                    i + 1,
                    pair[1].time,
                    pair[0].time
                )));
            }
        }
        Ok(())
    }

    pub fn last_boundary(&self) -> usize {
        self.boundaries.len().saturating_sub(1)
    }

    pub fn times(&self) -> Vec<f64> {
        self.boundaries.iter().map(|b| b.time).collect()
    }

    pub fn set_locked(&mut self, idx: usize, locked: bool) {
        if let Some(b) = self.boundaries.get_mut(idx) {
            b.locked = locked;
        }
    }

    pub fn to_intervals(&self) -> Vec<AlignmentInterval> {
        self.intervals
            .iter()
            .map(|iv| AlignmentInterval {
                start: self.boundaries[iv.start].time,
                end: self.boundaries[iv.end].time,
                text: iv.text.clone(),
            })
            .collect()
    }

    /// Nearest locked boundary strictly left of `idx`, or the file start.
    pub fn left_anchor(&self, idx: usize) -> usize {
        (1..idx.min(self.boundaries.len()))
            .rev()
            .find(|&i| self.boundaries[i].locked)
            .unwrap_or(0)
    }

    /// Nearest locked boundary strictly right of `idx`, or the file end.
    pub fn right_anchor(&self, idx: usize) -> usize {
        let last = self.last_boundary();
        (idx + 1..last)
            .find(|&i| self.boundaries[i].locked)
            .unwrap_or(last)
    }

    /// Phoneme tokens of one interval. Empty text counts as one blank token
    /// so every interval keeps a slot.
    pub fn interval_tokens(&self, interval: usize) -> Vec<String> {
        let tokens: Vec<String> = split_phonemes(&self.intervals[interval].text)
            .into_iter()
            .map(str::to_string)
            .collect();
        if tokens.is_empty() {
            vec![String::new()]
        } else {
            tokens
        }
    }

    /// Tokens of all intervals between boundaries `a` and `b`, in order.
    pub fn tokens_between(&self, a: usize, b: usize) -> Vec<String> {
        (a..b).flat_map(|k| self.interval_tokens(k)).collect()
    }

    /// Replaces everything between boundaries `a` and `b` by one interval
    /// per token, with `interior` as the new boundary times.
    ///
    /// The outer boundaries keep their time and lock state; new boundaries
    /// are unlocked. Indices after `b` shift by the change in interval count.
    pub fn splice_span(
        &self,
        a: usize,
        b: usize,
        tokens: &[String],
        interior: &[f64],
    ) -> Result<Self, AlignmentError> {
        if a >= b || b > self.last_boundary() {
            return Err(AlignmentError::invalid_input(format!(
                "cannot splice span {a}..{b} of a {}-boundary graph",
                self.boundaries.len()
            )));
        }
        if tokens.is_empty() || interior.len() + 1 != tokens.len() {
            return Err(AlignmentError::batch_size_mismatch(
                "spliced boundary times",
                tokens.len().saturating_sub(1),
                interior.len(),
            ));
        }

        let mut boundaries = Vec::with_capacity(self.boundaries.len() + interior.len());
        boundaries.extend_from_slice(&self.boundaries[..=a]);
        boundaries.extend(interior.iter().map(|&time| Boundary {
            time,
            locked: false,
        }));
        boundaries.extend_from_slice(&self.boundaries[b..]);

        let mut texts: Vec<String> = Vec::with_capacity(boundaries.len() - 1);
        texts.extend(self.intervals[..a].iter().map(|iv| iv.text.clone()));
        texts.extend(tokens.iter().cloned());
        texts.extend(self.intervals[b..].iter().map(|iv| iv.text.clone()));

        let intervals = texts
            .into_iter()
            .enumerate()
            .map(|(i, text)| Interval {
                start: i,
                end: i + 1,
                text,
            })
            .collect();
        Ok(Self {
            boundaries,
            intervals,
        })
    }

    /// Splits interval `interval` into one interval per phoneme, evenly
    /// spaced. Single-token intervals are returned unchanged.
    pub fn expand_interval(&self, interval: usize) -> Result<Self, AlignmentError> {
        let Some(iv) = self.intervals.get(interval) else {
            return Err(AlignmentError::invalid_input(format!(
                "interval {interval} out of range ({} intervals)",
                self.intervals.len()
            )));
        };
        let tokens = self.interval_tokens(interval);
        if tokens.len() <= 1 {
            return Ok(self.clone());
        }
        let start = self.boundaries[iv.start].time;
        let end = self.boundaries[iv.end].time;
        let n = tokens.len();
        let interior: Vec<f64> = (1..n)
            .map(|j| start + (end - start) * j as f64 / n as f64)
            .collect();
        self.splice_span(iv.start, iv.end, &tokens, &interior)
    }

    /// Writes a scoped re-alignment back around `pivot`.
    ///
    /// The pivot moves to `pivot_time` and each span between the pivot and
    /// its nearest locked anchor is replaced by one interval per phoneme at
    /// the given interior times. A span whose list is empty and which holds
    /// a single token is left alone. The right span is spliced first so the
    /// left span's indices stay valid.
    pub fn splice_scoped(
        &self,
        pivot: usize,
        pivot_time: f64,
        left: &[f64],
        right: &[f64],
    ) -> Result<Self, AlignmentError> {
        if pivot == 0 || pivot >= self.last_boundary() {
            return Err(AlignmentError::invalid_input(format!(
                "boundary {pivot} is not an interior boundary"
            )));
        }
        let la = self.left_anchor(pivot);
        let ra = self.right_anchor(pivot);
        let mut out = self.clone();
        out.boundaries[pivot].time =
            pivot_time.clamp(self.boundaries[la].time, self.boundaries[ra].time);

        let right_tokens = out.tokens_between(pivot, ra);
        if right_tokens.len() > 1 || !right.is_empty() {
            out = out.splice_span(pivot, ra, &right_tokens, right)?;
        }
        let left_tokens = out.tokens_between(la, pivot);
        if left_tokens.len() > 1 || !left.is_empty() {
            out = out.splice_span(la, pivot, &left_tokens, left)?;
        }
        Ok(out)
    }

    /// Splits every multi-token interval into single-token intervals placed
    /// evenly inside it.
    pub fn expand_tokens(&self) -> Self {
        let mut boundaries = Vec::with_capacity(self.boundaries.len());
        let mut texts = Vec::with_capacity(self.intervals.len());
        if let Some(first) = self.boundaries.first() {
            boundaries.push(*first);
        }
        for (k, iv) in self.intervals.iter().enumerate() {
            let start = self.boundaries[iv.start].time;
            let end = self.boundaries[iv.end].time;
            let tokens = split_phonemes(&iv.text);
            if tokens.len() <= 1 {
                texts.push(iv.text.clone());
            } else {
                let n = tokens.len();
                for (j, tok) in tokens.iter().enumerate() {
                    texts.push((*tok).to_string());
                    if j + 1 < n {
                        boundaries.push(Boundary {
                            time: start + (end - start) * (j + 1) as f64 / n as f64,
                            locked: false,
                        });
                    }
                }
            }
            boundaries.push(self.boundaries[k + 1]);
        }
        let intervals = texts
            .into_iter()
            .enumerate()
            .map(|(i, text)| Interval {
                start: i,
                end: i + 1,
                text,
            })
            .collect();
        Self {
            boundaries,
            intervals,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph() -> PhonemeGraph {
        PhonemeGraph::from_times(&[0.0, 0.5, 1.0, 1.5, 2.0], ["sil", "k a", "i", "sil"])
            .expect("valid graph")
    }

    #[test]
    fn from_times_builds_chain() {
        let g = graph();
        assert_eq!(g.boundaries.len(), 5);
        assert_eq!(g.intervals[1].start, 1);
        assert_eq!(g.intervals[1].end, 2);
        assert!(g.boundaries.iter().all(|b| !b.locked));
        let ivs = g.to_intervals();
        assert_eq!(ivs[1].text, "k a");
        assert_eq!((ivs[1].start, ivs[1].end), (0.5, 1.0));
    }

    #[test]
    fn from_times_rejects_mismatched_lengths() {
        assert!(PhonemeGraph::from_times(&[0.0, 1.0], ["a", "b"]).is_err());
    }

    #[test]
    fn validate_rejects_inversions() {
        let mut g = graph();
        g.boundaries[2].time = 0.2;
        assert!(g.validate().is_err());
    }

    #[test]
    fn from_intervals_round_trips() {
        let g = graph();
        let back = PhonemeGraph::from_intervals(&g.to_intervals()).expect("contiguous");
        assert_eq!(back, g);
    }

    #[test]
    fn from_intervals_rejects_gaps() {
        let ivs = vec![
            AlignmentInterval {
                start: 0.0,
                end: 0.4,
                text: "a".into(),
            },
            AlignmentInterval {
                start: 0.5,
                end: 1.0,
                text: "b".into(),
            },
        ];
        assert!(PhonemeGraph::from_intervals(&ivs).is_err());
    }

    #[test]
    fn anchors_default_to_file_edges() {
        let mut g = graph();
        assert_eq!(g.left_anchor(2), 0);
        assert_eq!(g.right_anchor(2), 4);
        g.set_locked(1, true);
        g.set_locked(3, true);
        assert_eq!(g.left_anchor(2), 1);
        assert_eq!(g.right_anchor(2), 3);
        // Anchors are strictly outside the pivot.
        assert_eq!(g.left_anchor(1), 0);
        assert_eq!(g.right_anchor(3), 4);
    }

    #[test]
    fn tokens_between_flattens_multi_token_intervals() {
        let g = graph();
        assert_eq!(g.tokens_between(0, 3), vec!["sil", "k", "a", "i"]);
        let blank = PhonemeGraph::from_times(&[0.0, 1.0], [""]).unwrap();
        assert_eq!(blank.interval_tokens(0), vec![String::new()]);
    }

    #[test]
    fn splice_span_replaces_intervals() {
        let mut g = graph();
        g.set_locked(3, true);
        let tokens: Vec<String> = ["k", "a", "i"].iter().map(|s| s.to_string()).collect();
        let spliced = g.splice_span(1, 3, &tokens, &[0.6, 0.9]).expect("splice");
        assert_eq!(spliced.intervals.len(), 5);
        assert_eq!(spliced.times(), vec![0.0, 0.5, 0.6, 0.9, 1.5, 2.0]);
        assert_eq!(spliced.intervals[2].text, "a");
        assert!(spliced.boundaries[4].locked);
        assert!(!spliced.boundaries[2].locked);
        assert!(spliced.validate().is_ok());
    }

    #[test]
    fn splice_span_rejects_wrong_time_count() {
        let g = graph();
        let tokens: Vec<String> = vec!["k".into(), "a".into()];
        assert!(g.splice_span(1, 2, &tokens, &[]).is_err());
        assert!(g.splice_span(2, 1, &tokens, &[0.7]).is_err());
    }

    #[test]
    fn expand_interval_splits_one_interval() {
        let g = graph().expand_interval(1).expect("expand");
        assert_eq!(g.times(), vec![0.0, 0.5, 0.75, 1.0, 1.5, 2.0]);
        assert_eq!(graph().expand_interval(0).unwrap(), graph());
        assert!(graph().expand_interval(9).is_err());
    }

    #[test]
    fn splice_scoped_writes_both_spans() {
        // Pivot at boundary 2 (between "k a" and "i"), no locks: the left span
        // holds sil k a, the right span holds i sil.
        let g = graph();
        let out = g
            .splice_scoped(2, 1.1, &[0.4, 0.8], &[1.7])
            .expect("splice");
        assert_eq!(out.times(), vec![0.0, 0.4, 0.8, 1.1, 1.7, 2.0]);
        let texts: Vec<&str> = out.intervals.iter().map(|iv| iv.text.as_str()).collect();
        assert_eq!(texts, vec!["sil", "k", "a", "i", "sil"]);
        assert!(out.validate().is_ok());
    }

    #[test]
    fn splice_scoped_leaves_single_token_spans() {
        let mut g = graph();
        g.set_locked(1, true);
        g.set_locked(3, true);
        // Left span is "k a", right span is the lone "i".
        let out = g.splice_scoped(2, 1.2, &[0.7], &[]).expect("splice");
        assert_eq!(out.times(), vec![0.0, 0.5, 0.7, 1.2, 1.5, 2.0]);
        assert!(out.boundaries[1].locked);
        assert!(out.boundaries[4].locked);
        assert!(g.splice_scoped(0, 0.0, &[], &[]).is_err());
    }

    #[test]
    fn expand_tokens_places_evenly() {
        let g = graph().expand_tokens();
        assert_eq!(g.intervals.len(), 5);
        assert_eq!(g.times(), vec![0.0, 0.5, 0.75, 1.0, 1.5, 2.0]);
        assert_eq!(g.intervals[1].text, "k");
        assert_eq!(g.intervals[2].text, "a");
    }
}
