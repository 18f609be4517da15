//! The pipeline orchestrator.
//!
//! Owns an ordered stage chain and runs it sequentially over a shared
//! [`PipelineState`]. Policy decisions, all of them load-bearing:
//!
//! - **Continue-on-error**: a stage that fails or appends errors never
//!   halts the chain; every configured stage runs exactly once per
//!   `execute` call.
//! - **Whole-run deadline**: an optional timeout bounds the sequential
//!   chain as a unit. On expiry the run fails with a single synthetic
//!   error, the original input as final data, and no per-stage telemetry.
//! - **One history entry per call**: every `execute`, whether it
//!   completes or times out, appends exactly one [`RunResult`].
//! - **Batch fan-out**: `execute_batch` spawns one task per input,
//!   unbounded unless a concurrency cap is configured; results preserve
//!   input order and a defective run never cancels its siblings.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use conveyor_core::{ConfigError, PipelineMetrics, PipelineState, RunResult, Stage, StageResult};
use conveyor_settings::ConveyorSettings;
use parking_lot::Mutex;
use serde_json::{Map, Value};
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::context;
use crate::metrics::MetricsSink;

/// Runs an ordered chain of stages over a shared state record.
///
/// Construct with [`new`](Self::new), add stages, then [`build`](Self::build)
/// to freeze the chain. `execute` and `execute_batch` are safe to call
/// concurrently once built.
pub struct PipelineOrchestrator {
    name: String,
    stages: Vec<Arc<dyn Stage>>,
    built: bool,
    default_timeout: Option<Duration>,
    batch_limit: Option<usize>,
    history: Mutex<Vec<RunResult>>,
    metrics: Option<Arc<dyn MetricsSink>>,
}

impl std::fmt::Debug for PipelineOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineOrchestrator")
            .field("name", &self.name)
            .field("stages", &self.stages.len())
            .field("built", &self.built)
            .field("runs", &self.history.lock().len())
            .finish_non_exhaustive()
    }
}

impl PipelineOrchestrator {
    /// Create an empty pipeline.
    ///
    /// The default run timeout comes from the settings entry under
    /// `workflows.<name>`; the batch concurrency cap from `batch`.
    pub fn new(name: impl Into<String>, settings: &ConveyorSettings) -> Self {
        let name = name.into();
        let default_timeout = settings
            .workflows
            .get(&name)
            .and_then(|w| w.timeout_secs)
            .map(Duration::from_secs);
        Self {
            name,
            stages: Vec::new(),
            built: false,
            default_timeout,
            batch_limit: settings.batch.max_concurrency,
            history: Mutex::new(Vec::new()),
            metrics: None,
        }
    }

    /// Attach a metrics sink; per-request, per-error, and per-stage-timing
    /// telemetry flows into it.
    pub fn with_metrics(mut self, sink: Arc<dyn MetricsSink>) -> Self {
        self.metrics = Some(sink);
        self
    }

    /// Pipeline name; also the workflow tag every run carries.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Append a stage to the chain. Fails once the pipeline is built.
    pub fn add_stage(&mut self, stage: Arc<dyn Stage>) -> Result<(), ConfigError> {
        if self.built {
            return Err(ConfigError::AlreadyBuilt);
        }
        self.stages.push(stage);
        Ok(())
    }

    /// Freeze the stage chain.
    ///
    /// Fails on an empty chain or a duplicate stage name; these are setup
    /// defects and never surface at call time.
    pub fn build(&mut self) -> Result<(), ConfigError> {
        if self.stages.is_empty() {
            return Err(ConfigError::EmptyPipeline);
        }
        let mut seen = std::collections::BTreeSet::new();
        for stage in &self.stages {
            if !seen.insert(stage.name()) {
                return Err(ConfigError::DuplicateStage(stage.name().to_string()));
            }
        }
        self.built = true;
        info!(pipeline = %self.name, stages = self.stages.len(), "pipeline built");
        Ok(())
    }

    /// Run the stage chain once.
    ///
    /// Errs only when the pipeline has not been built; everything that goes
    /// wrong during the run itself is reported inside the returned
    /// [`RunResult`]. An explicit `timeout` overrides the configured
    /// default.
    pub async fn execute(
        &self,
        input: Map<String, Value>,
        metadata: Option<Map<String, Value>>,
        timeout: Option<Duration>,
    ) -> Result<RunResult, ConfigError> {
        if !self.built {
            return Err(ConfigError::NotBuilt);
        }
        let run_id = format!("{}-{}", self.name, Uuid::now_v7());
        let limit = timeout.or(self.default_timeout);
        let metadata = metadata.unwrap_or_default();

        let (result, status) = context::scope(self.run(input, metadata, limit, run_id)).await;

        self.history.lock().push(result.clone());
        if let Some(sink) = &self.metrics {
            sink.record_request(&self.name, status);
        }
        Ok(result)
    }

    /// Run the chain and return the result together with the terminal
    /// status tag for the metrics sink.
    async fn run(
        &self,
        input: Map<String, Value>,
        metadata: Map<String, Value>,
        limit: Option<Duration>,
        run_id: String,
    ) -> (RunResult, &'static str) {
        let _wf = context::set_workflow(self.name.clone());
        let _rq = context::set_request_id(run_id.clone());
        let started = Instant::now();
        let mut state = PipelineState::new(input.clone(), metadata.clone());

        let timed_out = match limit {
            Some(limit) => tokio::time::timeout(limit, self.run_stages(&mut state))
                .await
                .err()
                .map(|_| limit),
            None => {
                self.run_stages(&mut state).await;
                None
            }
        };

        match timed_out {
            Some(limit) => {
                warn!(run_id, timeout_secs = limit.as_secs_f64(), "pipeline run timed out");
                let result = RunResult {
                    success: false,
                    data: input,
                    metadata,
                    errors: vec![format!(
                        "pipeline timed out after {:.1}s",
                        limit.as_secs_f64()
                    )],
                    stage_results: Vec::new(),
                    run_id,
                    total_duration: started.elapsed(),
                    timestamp: Utc::now(),
                };
                (result, "timeout")
            }
            None => {
                let success = state.errors.is_empty();
                info!(
                    run_id,
                    success,
                    errors = state.errors.len(),
                    duration_ms = started.elapsed().as_millis() as u64,
                    "pipeline run complete"
                );
                let result = RunResult {
                    success,
                    data: state.data,
                    metadata: state.metadata,
                    errors: state.errors,
                    stage_results: state.stage_results,
                    run_id,
                    total_duration: started.elapsed(),
                    timestamp: Utc::now(),
                };
                (result, if success { "success" } else { "error" })
            }
        }
    }

    async fn run_stages(&self, state: &mut PipelineState) {
        for stage in &self.stages {
            let _st = context::set_stage(stage.name());
            let errors_before = state.errors.len();
            let started = Instant::now();

            if let Err(e) = stage.process(state).await {
                state.add_error(format!("{}: {e}", stage.name()));
            }

            let duration = started.elapsed();
            let success = state.errors.len() == errors_before;
            debug!(stage = stage.name(), success, duration_ms = duration.as_millis() as u64, "stage complete");

            if let Some(sink) = &self.metrics {
                sink.record_processing_time(&self.name, stage.name(), duration);
                for _ in errors_before..state.errors.len() {
                    sink.record_error(stage.name(), "stage_error");
                }
            }

            state.stage_results.push(StageResult {
                stage: stage.name().to_string(),
                success,
                duration,
                timestamp: Utc::now(),
                errors: state.errors.clone(),
            });
        }
    }

    /// Run the chain once per input, concurrently.
    ///
    /// Fan-out is unbounded unless `batch.maxConcurrency` is configured.
    /// The returned list preserves input order. A run that panics yields a
    /// synthesized failed result for its slot without cancelling siblings;
    /// such a run leaves no history entry.
    pub async fn execute_batch(
        self: &Arc<Self>,
        inputs: Vec<Map<String, Value>>,
    ) -> Result<Vec<RunResult>, ConfigError> {
        if !self.built {
            return Err(ConfigError::NotBuilt);
        }
        let semaphore = self.batch_limit.map(|n| Arc::new(Semaphore::new(n.max(1))));
        let handles: Vec<_> = inputs
            .into_iter()
            .map(|input| {
                let this = Arc::clone(self);
                let semaphore = semaphore.clone();
                tokio::spawn(async move {
                    let _permit = match &semaphore {
                        Some(s) => s.acquire().await.ok(),
                        None => None,
                    };
                    this.execute(input, None, None).await
                })
            })
            .collect();

        let mut results = Vec::with_capacity(handles.len());
        for handle in handles {
            match handle.await {
                Ok(Ok(result)) => results.push(result),
                // Unreachable post-build; kept total rather than panicking.
                Ok(Err(e)) => results.push(self.defect_result(e.to_string())),
                Err(e) => {
                    warn!(error = %e, "batch run aborted");
                    results.push(self.defect_result(format!("batch run aborted: {e}")));
                }
            }
        }
        Ok(results)
    }

    fn defect_result(&self, error: String) -> RunResult {
        RunResult {
            success: false,
            data: Map::new(),
            metadata: Map::new(),
            errors: vec![error],
            stage_results: Vec::new(),
            run_id: format!("{}-{}", self.name, Uuid::now_v7()),
            total_duration: Duration::ZERO,
            timestamp: Utc::now(),
        }
    }

    /// The most recent `limit` run results (all of them when `None`),
    /// most-recent-last.
    pub fn history(&self, limit: Option<usize>) -> Vec<RunResult> {
        let history = self.history.lock();
        let start = limit.map_or(0, |l| history.len().saturating_sub(l));
        history[start..].to_vec()
    }

    /// Aggregate metrics over the run history, or `None` when no run has
    /// been recorded yet.
    pub fn metrics(&self) -> Option<PipelineMetrics> {
        let history = self.history.lock();
        if history.is_empty() {
            return None;
        }
        let total_runs = history.len();
        let successful_runs = history.iter().filter(|r| r.success).count();
        let total: Duration = history.iter().map(|r| r.total_duration).sum();
        Some(PipelineMetrics {
            total_runs,
            successful_runs,
            success_rate: successful_runs as f64 / total_runs as f64,
            average_duration: total / total_runs as u32,
            total_errors: history.iter().map(|r| r.errors.len()).sum(),
            stage_count: self.stages.len(),
        })
    }

    /// Mermaid `graph LR` rendering of the stage chain.
    ///
    /// Stages with a non-empty description render it on a second label line.
    pub fn mermaid(&self) -> String {
        let mut out = String::from("graph LR\n");
        let mut prev = "input([Input])".to_string();
        for (i, stage) in self.stages.iter().enumerate() {
            let node = if stage.description().is_empty() {
                format!("s{i}[{}]", stage.name())
            } else {
                format!("s{i}[\"{}<br/>{}\"]", stage.name(), stage.description())
            };
            out.push_str(&format!("    {prev} --> {node}\n"));
            prev = node;
        }
        out.push_str(&format!("    {prev} --> output([Result])\n"));
        out
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::RecordingSink;
    use async_trait::async_trait;
    use conveyor_core::StageError;
    use serde_json::json;

    struct Trace(&'static str);

    #[async_trait]
    impl Stage for Trace {
        fn name(&self) -> &str {
            self.0
        }

        async fn process(&self, state: &mut PipelineState) -> Result<(), StageError> {
            let trace = state.data.entry("trace").or_insert_with(|| json!([]));
            if let Some(arr) = trace.as_array_mut() {
                arr.push(json!(self.0));
            }
            Ok(())
        }
    }

    struct Failing(&'static str);

    #[async_trait]
    impl Stage for Failing {
        fn name(&self) -> &str {
            self.0
        }

        async fn process(&self, _state: &mut PipelineState) -> Result<(), StageError> {
            Err(StageError::failed("boom"))
        }
    }

    struct SoftError;

    #[async_trait]
    impl Stage for SoftError {
        fn name(&self) -> &str {
            "soft"
        }

        async fn process(&self, state: &mut PipelineState) -> Result<(), StageError> {
            state.add_error("soft: candidate list empty");
            Ok(())
        }
    }

    struct Slow;

    #[async_trait]
    impl Stage for Slow {
        fn name(&self) -> &str {
            "slow"
        }

        async fn process(&self, _state: &mut PipelineState) -> Result<(), StageError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(())
        }
    }

    struct ContextProbe;

    #[async_trait]
    impl Stage for ContextProbe {
        fn name(&self) -> &str {
            "probe"
        }

        async fn process(&self, state: &mut PipelineState) -> Result<(), StageError> {
            let ctx = context::current();
            state.set_data("seenWorkflow", json!(ctx.workflow));
            state.set_data("seenStage", json!(ctx.stage));
            state.set_data("seenRequestId", json!(ctx.request_id));
            Ok(())
        }
    }

    fn pipeline(stages: Vec<Arc<dyn Stage>>) -> PipelineOrchestrator {
        let mut p = PipelineOrchestrator::new("match", &ConveyorSettings::default());
        for stage in stages {
            p.add_stage(stage).unwrap();
        }
        p.build().unwrap();
        p
    }

    #[test]
    fn build_rejects_empty_chain() {
        let mut p = PipelineOrchestrator::new("match", &ConveyorSettings::default());
        assert_eq!(p.build().unwrap_err(), ConfigError::EmptyPipeline);
    }

    #[test]
    fn build_rejects_duplicate_stage_names() {
        let mut p = PipelineOrchestrator::new("match", &ConveyorSettings::default());
        p.add_stage(Arc::new(Trace("matcher"))).unwrap();
        p.add_stage(Arc::new(Trace("matcher"))).unwrap();
        assert_eq!(
            p.build().unwrap_err(),
            ConfigError::DuplicateStage("matcher".into())
        );
    }

    #[test]
    fn add_stage_after_build_is_rejected() {
        let mut p = PipelineOrchestrator::new("match", &ConveyorSettings::default());
        p.add_stage(Arc::new(Trace("a"))).unwrap();
        p.build().unwrap();
        assert_eq!(
            p.add_stage(Arc::new(Trace("b"))).unwrap_err(),
            ConfigError::AlreadyBuilt
        );
    }

    #[tokio::test]
    async fn execute_before_build_is_rejected() {
        let mut p = PipelineOrchestrator::new("match", &ConveyorSettings::default());
        p.add_stage(Arc::new(Trace("a"))).unwrap();
        let err = p.execute(Map::new(), None, None).await.unwrap_err();
        assert_eq!(err, ConfigError::NotBuilt);
    }

    #[tokio::test]
    async fn stages_run_in_build_order() {
        let p = pipeline(vec![
            Arc::new(Trace("profiler")),
            Arc::new(Trace("matcher")),
            Arc::new(Trace("ranker")),
        ]);
        let result = p.execute(Map::new(), None, None).await.unwrap();
        assert!(result.success);
        assert_eq!(result.data["trace"], json!(["profiler", "matcher", "ranker"]));
        let order: Vec<&str> =
            result.stage_results.iter().map(|r| r.stage.as_str()).collect();
        assert_eq!(order, ["profiler", "matcher", "ranker"]);
    }

    #[tokio::test]
    async fn failing_stage_does_not_halt_the_chain() {
        let p = pipeline(vec![
            Arc::new(Trace("profiler")),
            Arc::new(Failing("matcher")),
            Arc::new(Trace("ranker")),
        ]);
        let result = p.execute(Map::new(), None, None).await.unwrap();
        assert!(!result.success);
        // The failing stage's error is prefixed with its name, and the
        // stage after it still ran.
        assert_eq!(result.errors, vec!["matcher: boom"]);
        assert_eq!(result.data["trace"], json!(["profiler", "ranker"]));
        assert_eq!(result.stage_results.len(), 3);
        assert!(result.stage_results[0].success);
        assert!(!result.stage_results[1].success);
        assert!(result.stage_results[2].success);
    }

    #[tokio::test]
    async fn stage_success_means_no_new_errors() {
        // A stage that appends to the error list but returns Ok still
        // counts as failed for its StageResult.
        let p = pipeline(vec![Arc::new(SoftError), Arc::new(Trace("after"))]);
        let result = p.execute(Map::new(), None, None).await.unwrap();
        assert!(!result.success);
        assert!(!result.stage_results[0].success);
        assert!(result.stage_results[1].success);
        // Each StageResult snapshots the full error list at completion.
        assert_eq!(result.stage_results[0].errors.len(), 1);
        assert_eq!(result.stage_results[1].errors.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_discards_stage_telemetry() {
        let p = pipeline(vec![Arc::new(Trace("profiler")), Arc::new(Slow)]);
        let input: Map<String, Value> =
            [("petId".to_string(), json!(7))].into_iter().collect();
        let result = p
            .execute(input.clone(), None, Some(Duration::from_secs(1)))
            .await
            .unwrap();
        assert!(!result.success);
        assert_eq!(result.errors.len(), 1);
        assert!(result.errors[0].contains("timed out after 1.0s"));
        // Completed-stage telemetry is dropped wholesale; the final data is
        // the untouched original input.
        assert!(result.stage_results.is_empty());
        assert_eq!(result.data, input);
    }

    #[tokio::test(start_paused = true)]
    async fn default_timeout_comes_from_settings() {
        let mut settings = ConveyorSettings::default();
        let _ = settings.workflows.insert(
            "match".into(),
            conveyor_settings::WorkflowSettings { timeout_secs: Some(2), model: None },
        );
        let mut p = PipelineOrchestrator::new("match", &settings);
        p.add_stage(Arc::new(Slow)).unwrap();
        p.build().unwrap();
        let result = p.execute(Map::new(), None, None).await.unwrap();
        assert!(!result.success);
        assert!(result.errors[0].contains("timed out"));
    }

    #[tokio::test(start_paused = true)]
    async fn every_execute_appends_one_history_entry() {
        let p = pipeline(vec![Arc::new(Trace("a")), Arc::new(Slow)]);
        let _ok = p.execute(Map::new(), None, Some(Duration::from_secs(120))).await.unwrap();
        let _timed = p.execute(Map::new(), None, Some(Duration::from_secs(1))).await.unwrap();
        assert_eq!(p.history(None).len(), 2);
        assert!(!p.history(Some(1))[0].success);
    }

    #[tokio::test]
    async fn history_limit_returns_tail_most_recent_last() {
        let p = pipeline(vec![Arc::new(Trace("a"))]);
        for _ in 0..3 {
            let _ = p.execute(Map::new(), None, None).await.unwrap();
        }
        let all = p.history(None);
        let tail = p.history(Some(2));
        assert_eq!(tail.len(), 2);
        assert_eq!(tail[1].run_id, all[2].run_id);
    }

    #[tokio::test]
    async fn run_ids_carry_pipeline_name_and_are_unique() {
        let p = pipeline(vec![Arc::new(Trace("a"))]);
        let first = p.execute(Map::new(), None, None).await.unwrap();
        let second = p.execute(Map::new(), None, None).await.unwrap();
        assert!(first.run_id.starts_with("match-"));
        assert_ne!(first.run_id, second.run_id);
    }

    #[tokio::test]
    async fn stages_observe_run_context() {
        let p = pipeline(vec![Arc::new(ContextProbe)]);
        let result = p.execute(Map::new(), None, None).await.unwrap();
        assert_eq!(result.data["seenWorkflow"], json!("match"));
        assert_eq!(result.data["seenStage"], json!("probe"));
        assert_eq!(result.data["seenRequestId"], json!(result.run_id));
    }

    #[tokio::test]
    async fn metrics_none_until_first_run() {
        let p = pipeline(vec![Arc::new(Trace("a"))]);
        assert!(p.metrics().is_none());
    }

    #[tokio::test]
    async fn metrics_aggregate_history() {
        let p = pipeline(vec![Arc::new(Trace("a")), Arc::new(SoftError)]);
        let _ = p.execute(Map::new(), None, None).await.unwrap();
        let _ = p.execute(Map::new(), None, None).await.unwrap();
        let metrics = p.metrics().unwrap();
        assert_eq!(metrics.total_runs, 2);
        assert_eq!(metrics.successful_runs, 0);
        assert!((metrics.success_rate - 0.0).abs() < 1e-9);
        assert_eq!(metrics.total_errors, 2);
        assert_eq!(metrics.stage_count, 2);
    }

    #[tokio::test]
    async fn batch_preserves_input_order() {
        let p = Arc::new(pipeline(vec![Arc::new(ContextProbe)]));
        let inputs: Vec<Map<String, Value>> = (0..5)
            .map(|i| [("slot".to_string(), json!(i))].into_iter().collect())
            .collect();
        let results = p.execute_batch(inputs).await.unwrap();
        assert_eq!(results.len(), 5);
        for (i, result) in results.iter().enumerate() {
            assert_eq!(result.data["slot"], json!(i));
        }
        assert_eq!(p.history(None).len(), 5);
    }

    #[tokio::test]
    async fn batch_runs_carry_distinct_request_ids() {
        let p = Arc::new(pipeline(vec![Arc::new(ContextProbe)]));
        let results = p.execute_batch(vec![Map::new(), Map::new()]).await.unwrap();
        let seen_a = &results[0].data["seenRequestId"];
        let seen_b = &results[1].data["seenRequestId"];
        assert_eq!(seen_a, &json!(results[0].run_id));
        assert_eq!(seen_b, &json!(results[1].run_id));
        assert_ne!(seen_a, seen_b);
    }

    struct SlowProbe;

    #[async_trait]
    impl Stage for SlowProbe {
        fn name(&self) -> &str {
            "probe"
        }

        async fn process(&self, state: &mut PipelineState) -> Result<(), StageError> {
            // Re-read the context across suspension points so interleaved
            // sibling runs would be caught leaking their tags.
            for _ in 0..5 {
                tokio::time::sleep(Duration::from_millis(1)).await;
                state.set_data("seenWorkflow", json!(context::current().workflow));
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn concurrent_pipelines_never_observe_each_others_workflow() {
        let alpha = {
            let mut p = PipelineOrchestrator::new("alpha", &ConveyorSettings::default());
            p.add_stage(Arc::new(SlowProbe)).unwrap();
            p.build().unwrap();
            Arc::new(p)
        };
        let beta = {
            let mut p = PipelineOrchestrator::new("beta", &ConveyorSettings::default());
            p.add_stage(Arc::new(SlowProbe)).unwrap();
            p.build().unwrap();
            Arc::new(p)
        };
        let (a, b) = tokio::join!(
            alpha.execute(Map::new(), None, None),
            beta.execute(Map::new(), None, None),
        );
        assert_eq!(a.unwrap().data["seenWorkflow"], json!("alpha"));
        assert_eq!(b.unwrap().data["seenWorkflow"], json!("beta"));
    }

    #[tokio::test]
    async fn batch_respects_concurrency_bound() {
        let mut settings = ConveyorSettings::default();
        settings.batch.max_concurrency = Some(1);
        let mut p = PipelineOrchestrator::new("match", &settings);
        p.add_stage(Arc::new(Trace("a"))).unwrap();
        p.build().unwrap();
        let p = Arc::new(p);
        let results = p
            .execute_batch(vec![Map::new(), Map::new(), Map::new()])
            .await
            .unwrap();
        assert_eq!(results.len(), 3);
        assert!(results.iter().all(|r| r.success));
    }

    #[tokio::test]
    async fn failed_batch_item_does_not_cancel_siblings() {
        let p = Arc::new(pipeline(vec![Arc::new(Failing("matcher")), Arc::new(Trace("after"))]));
        let results = p.execute_batch(vec![Map::new(), Map::new()]).await.unwrap();
        assert_eq!(results.len(), 2);
        for result in &results {
            assert!(!result.success);
            assert_eq!(result.data["trace"], json!(["after"]));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn metrics_sink_sees_terminal_statuses() {
        let sink = Arc::new(RecordingSink::default());
        let mut p = PipelineOrchestrator::new("match", &ConveyorSettings::default());
        p.add_stage(Arc::new(Trace("ok"))).unwrap();
        p.add_stage(Arc::new(SoftError)).unwrap();
        p.build().unwrap();
        let p = p.with_metrics(Arc::clone(&sink) as Arc<dyn MetricsSink>);

        let _ = p.execute(Map::new(), None, None).await.unwrap();
        let events = sink.events.lock().clone();
        assert!(events.contains(&"timing match ok".to_string()));
        assert!(events.contains(&"error soft stage_error".to_string()));
        assert!(events.contains(&"request match error".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn metrics_sink_sees_timeout_status() {
        let sink = Arc::new(RecordingSink::default());
        let mut p = PipelineOrchestrator::new("match", &ConveyorSettings::default());
        p.add_stage(Arc::new(Slow)).unwrap();
        p.build().unwrap();
        let p = p.with_metrics(Arc::clone(&sink) as Arc<dyn MetricsSink>);

        let _ = p.execute(Map::new(), None, Some(Duration::from_secs(1))).await.unwrap();
        let events = sink.events.lock().clone();
        assert!(events.contains(&"request match timeout".to_string()));
    }

    struct Described;

    #[async_trait]
    impl Stage for Described {
        fn name(&self) -> &str {
            "matcher"
        }

        fn description(&self) -> &str {
            "Scores pet candidates"
        }

        async fn process(&self, _state: &mut PipelineState) -> Result<(), StageError> {
            Ok(())
        }
    }

    #[test]
    fn mermaid_renders_the_chain() {
        let p = pipeline(vec![Arc::new(Trace("profiler")), Arc::new(Trace("matcher"))]);
        let diagram = p.mermaid();
        assert!(diagram.starts_with("graph LR\n"));
        assert!(diagram.contains("input([Input]) --> s0[profiler]"));
        assert!(diagram.contains("s0[profiler] --> s1[matcher]"));
        assert!(diagram.contains("s1[matcher] --> output([Result])"));
    }

    #[test]
    fn mermaid_includes_stage_descriptions() {
        let p = pipeline(vec![Arc::new(Trace("profiler")), Arc::new(Described)]);
        let diagram = p.mermaid();
        // Described stages get a two-line label; bare stages stay name-only.
        assert!(diagram.contains("s0[profiler] --> s1[\"matcher<br/>Scores pet candidates\"]"));
        assert!(diagram.contains("s1[\"matcher<br/>Scores pet candidates\"] --> output([Result])"));
    }

    #[test]
    fn debug_output_summarizes_the_pipeline() {
        let p = pipeline(vec![Arc::new(Trace("profiler"))]);
        let rendered = format!("{p:?}");
        assert!(rendered.contains("PipelineOrchestrator"));
        assert!(rendered.contains("built: true"));
    }
}
