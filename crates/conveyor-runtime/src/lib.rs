//! # conveyor-runtime
//!
//! Pipeline orchestration and cost metering.
//!
//! - **Orchestrator**: runs an ordered stage chain over a shared state
//!   record with per-stage timing, continue-on-error, a whole-run deadline,
//!   and parallel batch fan-out
//! - **Execution context**: task-scoped (workflow, stage, request id) triple
//!   used to attribute telemetry without parameter threading
//! - **Pricing**: resolves (model × modality × usage tier) into a concrete
//!   rate table
//! - **Ledger**: bounded, FIFO-evicting store of per-call cost entries with
//!   summary/recent read APIs and optional JSONL export
//! - **Metrics**: the sink contract consumed by the orchestrator and ledger
//!
//! ## Crate Position
//!
//! Aggregation layer. Depends on: conveyor-core, conveyor-settings.

#![deny(unsafe_code)]

pub mod context;
pub mod costs;
pub mod metrics;
pub mod pipeline;

pub use context::{ContextGuard, ContextValues};
pub use costs::ledger::{CallUsage, CostBreakdown, CostEntry, CostLedger, CostSummary, CostTotals};
pub use costs::pricing::{PricingResolver, ResolvedRates};
pub use metrics::{FacadeMetricsSink, MetricsSink};
pub use pipeline::orchestrator::PipelineOrchestrator;
pub use pipeline::presets::compose;
