pub mod alignment;
pub mod config;
pub mod error;
pub mod features;
pub mod pipeline;
pub mod types;

pub use alignment::graph::{Boundary, Interval, PhonemeGraph};
pub use alignment::tokenization::PhonemeVocab;
pub use config::{AcousticModelConfig, AlignerConfig, RefinerMetadata};
pub use error::AlignmentError;
pub use pipeline::builder::AlignmentEngineBuilder;
pub use pipeline::profile::{AlignmentProfile, ManualProfile, ModelBackedProfile, ProfileOutcome};
pub use pipeline::runtime::AlignmentEngine;
pub use pipeline::traits::{BoundaryRefiner, EmissionBackend, SequenceAligner};
pub use pipeline::worker::{AlignmentJob, AlignmentWorker, JobResult};
pub use types::{
    AlignmentConstraint, AlignmentInterval, AlignmentOutput, AlignmentRequest, AudioInput,
    ScopedRealignment, SegmentDiagnostic,
};
