//! The stage capability contract.

use async_trait::async_trait;

use crate::errors::StageError;
use crate::state::PipelineState;

/// One unit of work in a pipeline.
///
/// A stage transforms the shared [`PipelineState`] in place, asynchronously.
/// It may signal failure two ways, both recovered by the orchestrator:
///
/// - appending to `state.errors` (self-reported), or
/// - returning `Err(StageError)` (raised).
///
/// Neither halts the chain — every configured stage runs exactly once per
/// pipeline execution. Implementations must not block the scheduler; anything
/// network- or CPU-bound belongs behind an `.await`.
#[async_trait]
pub trait Stage: Send + Sync {
    /// Unique stage name. Uniqueness is enforced at `build()`.
    fn name(&self) -> &str;

    /// Short human-readable description, used in diagram rendering.
    fn description(&self) -> &str {
        ""
    }

    /// Transform the state. Runs exactly once per pipeline execution.
    async fn process(&self, state: &mut PipelineState) -> Result<(), StageError>;
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
