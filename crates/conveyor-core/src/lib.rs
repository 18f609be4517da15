//! # conveyor-core
//!
//! Foundation types for the conveyor pipeline engine.
//!
//! This crate provides the shared vocabulary the other conveyor crates
//! depend on:
//!
//! - **State**: [`state::PipelineState`] threaded through a run,
//!   [`state::StageResult`] and [`state::RunResult`] telemetry records
//! - **Stages**: the [`stage::Stage`] trait implemented by every unit of work
//! - **Errors**: [`errors::ConfigError`] (fatal at setup) and
//!   [`errors::StageError`] (recovered per-stage) via `thiserror`
//! - **Logging**: [`logging::init_subscriber`] for the `tracing` subscriber
//!
//! ## Crate Position
//!
//! Foundation crate. Depended on by conveyor-settings and conveyor-runtime.

#![deny(unsafe_code)]

pub mod errors;
pub mod logging;
pub mod stage;
pub mod state;

pub use errors::{ConfigError, StageError};
pub use stage::Stage;
pub use state::{PipelineMetrics, PipelineState, RunResult, StageResult};
