//! Synthesis engine process and backend abstraction
//!
//! - `supervisor`: launches, probes and terminates the AivisSpeech engine
//! - `traits`: the [`SynthesisBackend`] seam used by the orchestrator

pub mod supervisor;
pub mod traits;

pub use supervisor::{EngineProcessState, ProcessSupervisor};
pub use traits::SynthesisBackend;
