//! One-call pipeline composition.

use std::sync::Arc;

use conveyor_core::{ConfigError, Stage};
use conveyor_settings::ConveyorSettings;

use crate::metrics::MetricsSink;
use crate::pipeline::orchestrator::PipelineOrchestrator;

/// Assemble and build a pipeline in one call.
///
/// Adds `stages` in order, wires the optional metrics sink, and freezes the
/// chain. The returned orchestrator is ready for `execute` /
/// `execute_batch` and cheap to share across tasks.
pub fn compose(
    name: impl Into<String>,
    stages: Vec<Arc<dyn Stage>>,
    settings: &ConveyorSettings,
    metrics: Option<Arc<dyn MetricsSink>>,
) -> Result<Arc<PipelineOrchestrator>, ConfigError> {
    let mut pipeline = PipelineOrchestrator::new(name, settings);
    if let Some(sink) = metrics {
        pipeline = pipeline.with_metrics(sink);
    }
    for stage in stages {
        pipeline.add_stage(stage)?;
    }
    pipeline.build()?;
    Ok(Arc::new(pipeline))
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
