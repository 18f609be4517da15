//! Error hierarchy for the pipeline engine.
//!
//! Two families, with deliberately different lifecycles:
//!
//! - [`ConfigError`] — raised at build/construction time (empty stage list,
//!   duplicate names, missing pricing). Fatal at setup, never at call time.
//! - [`StageError`] — raised inside a stage. The orchestrator recovers it
//!   locally by appending to the run's error list; it never aborts the chain.
//!
//! Run-level failures (timeout, orchestration defect) are *data* — fields of
//! a `RunResult` — not error returns. Callers of `execute` only ever see
//! [`ConfigError::NotBuilt`] as an `Err`.

use thiserror::Error;

/// Setup-time configuration errors. All variants are fatal at construction.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// `build()` was called with no stages added.
    #[error("pipeline has no stages")]
    EmptyPipeline,

    /// Two stages share the same name.
    #[error("duplicate stage name: {0}")]
    DuplicateStage(String),

    /// `add_stage()` was called after `build()` froze the stage order.
    #[error("stages cannot be added after build()")]
    AlreadyBuilt,

    /// `execute()` was called before `build()`.
    #[error("pipeline not built; call build() first")]
    NotBuilt,

    /// Cost tracking is enabled but the pricing map is empty.
    #[error("cost tracking enabled with no pricing models configured")]
    NoPricingModels,

    /// A referenced model has no pricing entry and `requireKnownModels` is set.
    #[error("no pricing entry for model '{model}'")]
    UnknownModel {
        /// The model identifier that failed the lookup.
        model: String,
    },
}

/// Failure signalled by a stage during `process`.
///
/// The orchestrator converts this into an entry on the shared error list
/// (`"<stage>: <error>"`) and continues with the next stage.
#[derive(Debug, Error)]
pub enum StageError {
    /// Stage-reported failure with a human-readable message.
    #[error("{0}")]
    Failed(String),

    /// The state payload did not have the shape the stage expected.
    #[error("invalid stage payload: {0}")]
    InvalidPayload(#[from] serde_json::Error),
}

impl StageError {
    /// Construct a [`StageError::Failed`] from any displayable message.
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
