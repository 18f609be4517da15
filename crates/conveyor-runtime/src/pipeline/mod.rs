//! Pipeline orchestration: the stage-chain runner and composition helpers.

pub mod orchestrator;
pub mod presets;
