use std::sync::Arc;

/// Mono audio handed to the engine together with its cache identity.
#[derive(Debug, Clone)]
pub struct AudioInput {
    /// Identity of the audio (typically the file path). Two inputs with the
    /// same key are assumed to carry the same samples.
    pub key: String,
    pub sample_rate_hz: u32,
    pub samples: Arc<[f32]>,
}

impl AudioInput {
    pub fn new(key: impl Into<String>, sample_rate_hz: u32, samples: Vec<f32>) -> Self {
        Self {
            key: key.into(),
            sample_rate_hz,
            samples: samples.into(),
        }
    }

    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate_hz == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate_hz as f64
    }
}

/// Hard anchor: every token before `token_index` ends by `time`.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct AlignmentConstraint {
    pub time: f64,
    pub token_index: usize,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct AlignmentInterval {
    /// Seconds.
    pub start: f64,
    /// Seconds.
    pub end: f64,
    pub text: String,
}

impl AlignmentInterval {
    pub fn duration(&self) -> f64 {
        self.end - self.start
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AlignmentRequest {
    pub phonemes: Vec<String>,
    pub constraints: Vec<AlignmentConstraint>,
    /// Start of the aligned timeline in seconds; `None` starts at 0.
    pub start_time: Option<f64>,
    /// End of the aligned timeline in seconds; `None` uses the audio duration.
    pub end_time: Option<f64>,
}

impl AlignmentRequest {
    pub fn new(phonemes: Vec<String>) -> Self {
        Self {
            phonemes,
            constraints: Vec::new(),
            start_time: None,
            end_time: None,
        }
    }

    pub fn with_constraints(mut self, constraints: Vec<AlignmentConstraint>) -> Self {
        self.constraints = constraints;
        self
    }

    pub fn with_start_time(mut self, start_time: f64) -> Self {
        self.start_time = Some(start_time);
        self
    }

    pub fn with_end_time(mut self, end_time: f64) -> Self {
        self.end_time = Some(end_time);
        self
    }
}

/// Locally recovered conditions, reported instead of failing the call.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SegmentDiagnostic {
    /// No monotone path reached the last token; boundaries were spread evenly.
    InfeasiblePath {
        segment: usize,
        frames: usize,
        tokens: usize,
    },
    /// Constraint ordering was malformed; the segment's tokens got
    /// zero-duration intervals.
    ConstraintViolation { segment: usize, message: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct AlignmentOutput {
    pub intervals: Vec<AlignmentInterval>,
    pub diagnostics: Vec<SegmentDiagnostic>,
    /// Cache generation the emissions came from.
    pub generation: u64,
}

/// Interior boundary times produced by a scoped re-alignment, left span
/// first. Each list excludes the span's anchors and the pivot itself.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ScopedRealignment {
    pub left: Vec<f64>,
    pub right: Vec<f64>,
    /// Segment 0 is the left span, 1 the right.
    pub diagnostics: Vec<SegmentDiagnostic>,
    pub generation: u64,
}
