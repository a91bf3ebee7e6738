//! Backend abstraction for segment synthesis
//!
//! The orchestrator talks to a [`SynthesisBackend`] rather than to the
//! supervisor and HTTP client directly, so the pair can be replaced by a
//! scripted double in tests.

use async_trait::async_trait;

use crate::audio::AudioBuffer;
use crate::core::error::Result;
use crate::pipeline::Segment;

/// Ready-check, synthesize and shutdown capability
#[async_trait]
pub trait SynthesisBackend: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &str;

    /// Non-mutating liveness check
    async fn is_ready(&self) -> bool;

    /// Bring the backend to a ready state; failures are supervisor-level
    async fn ensure_ready(&self) -> Result<()>;

    /// Synthesize one segment into a mono buffer at the target rate
    async fn synthesize(&self, segment: &Segment) -> Result<AudioBuffer>;

    /// Release every external resource; must be idempotent
    async fn shutdown(&self) -> Result<()>;
}
