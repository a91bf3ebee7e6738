//! Segment preparation, concurrent synthesis and run reporting
//!
//! - `segment`: caller inputs and prepared segments
//! - `orchestrator`: bounded worker pool, failure policy, cancellation
//! - `report`: final artifact and per-run report

pub mod orchestrator;
pub mod report;
pub mod segment;

pub use orchestrator::{
    FailurePolicy, ProgressCallback, ProgressEvent, SegmentStatus, SynthesisOrchestrator,
};
pub use report::{FinalArtifact, RunReport, SegmentFailure};
pub use segment::{select_range, Segment, SegmentInput};
