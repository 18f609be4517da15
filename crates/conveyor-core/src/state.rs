//! Pipeline state and telemetry records.
//!
//! A [`PipelineState`] is the mutable record threaded through one run: each
//! stage mutates it in place, in build order, and nothing is ever rolled
//! back. The error list and the stage-result list are append-only within a
//! run. [`StageResult`] and [`RunResult`] are immutable once created.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Mutable record threaded through a single pipeline run.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineState {
    /// Open keyed payload — stage input/output.
    pub data: Map<String, Value>,
    /// Open keyed metadata, carried alongside the payload.
    pub metadata: Map<String, Value>,
    /// Accumulated error messages. Append-only within a run.
    pub errors: Vec<String>,
    /// Per-stage outcomes, appended in build order.
    pub stage_results: Vec<StageResult>,
}

impl PipelineState {
    /// Create the initial state for a run from input data and metadata.
    pub fn new(data: Map<String, Value>, metadata: Map<String, Value>) -> Self {
        Self {
            data,
            metadata,
            errors: Vec::new(),
            stage_results: Vec::new(),
        }
    }

    /// Append an error message to the shared error list.
    pub fn add_error(&mut self, error: impl Into<String>) {
        self.errors.push(error.into());
    }

    /// Set a data key.
    pub fn set_data(&mut self, key: impl Into<String>, value: Value) {
        let _ = self.data.insert(key.into(), value);
    }

    /// Set a metadata key.
    pub fn set_metadata(&mut self, key: impl Into<String>, value: Value) {
        let _ = self.metadata.insert(key.into(), value);
    }
}

/// Outcome of one stage execution. Created once, never revised.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageResult {
    /// Stage name.
    pub stage: String,
    /// True iff the stage appended no new errors during its run.
    pub success: bool,
    /// Wall-clock stage duration, serialized as fractional seconds.
    #[serde(with = "duration_secs")]
    pub duration: Duration,
    /// Completion timestamp (UTC).
    pub timestamp: DateTime<Utc>,
    /// Snapshot of the run's error list at the time this stage completed.
    pub errors: Vec<String>,
}

/// Final outcome of one pipeline run. Appended to the run history,
/// never mutated after creation. `success == errors.is_empty()` always.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunResult {
    /// Overall success: the error list is empty.
    pub success: bool,
    /// Final data payload (the original input when the run failed early).
    pub data: Map<String, Value>,
    /// Final metadata.
    pub metadata: Map<String, Value>,
    /// Accumulated error messages.
    pub errors: Vec<String>,
    /// Per-stage telemetry in build order. Empty when the run timed out.
    pub stage_results: Vec<StageResult>,
    /// Unique run identifier.
    pub run_id: String,
    /// Total run duration, serialized as fractional seconds.
    #[serde(with = "duration_secs")]
    pub total_duration: Duration,
    /// Completion timestamp (UTC).
    pub timestamp: DateTime<Utc>,
}

/// Aggregate metrics derived from a pipeline's run history.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineMetrics {
    /// Total number of recorded runs.
    pub total_runs: usize,
    /// Runs with an empty error list.
    pub successful_runs: usize,
    /// `successful_runs / total_runs`.
    pub success_rate: f64,
    /// Mean run duration across the history.
    #[serde(with = "duration_secs")]
    pub average_duration: Duration,
    /// Sum of error-list lengths across the history.
    pub total_errors: usize,
    /// Number of configured stages.
    pub stage_count: usize,
}

/// Serde adapter: `Duration` as fractional seconds (f64).
pub mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    /// Serialize a duration as fractional seconds.
    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    /// Deserialize fractional seconds into a duration. Negative or
    /// non-finite inputs clamp to zero.
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        if secs.is_finite() && secs > 0.0 {
            Ok(Duration::from_secs_f64(secs))
        } else {
            Ok(Duration::ZERO)
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
