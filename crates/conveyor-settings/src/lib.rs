//! # conveyor-settings
//!
//! Configuration types for the conveyor pipeline engine.
//!
//! Settings are an explicitly constructed, immutable object passed to each
//! component's constructor — there is no process-wide configuration cache.
//! Two ways to obtain one:
//!
//! 1. **Compiled defaults** — [`ConveyorSettings::default()`]
//! 2. **JSON file** — [`load_settings_from_path`] (deep-merged over defaults,
//!    then validated)
//!
//! All types use `#[serde(rename_all = "camelCase", default)]`, so partial
//! JSON is accepted and missing fields take their defaults.
//!
//! # Usage
//!
//! ```no_run
//! use conveyor_settings::load_settings_from_path;
//!
//! let settings = load_settings_from_path("config/conveyor.json".as_ref())?;
//! println!("cost tracking: {}", settings.costs.enabled);
//! # Ok::<(), conveyor_settings::SettingsError>(())
//! ```

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{deep_merge, load_settings_from_path};
pub use types::*;
