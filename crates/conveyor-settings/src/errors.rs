//! Settings loading errors.

use conveyor_core::ConfigError;
use thiserror::Error;

/// Errors produced while loading or validating settings.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// The settings file could not be read.
    #[error("failed to read settings file: {0}")]
    Io(#[from] std::io::Error),

    /// The settings file is not valid JSON (or has the wrong shape).
    #[error("failed to parse settings: {0}")]
    Parse(#[from] serde_json::Error),

    /// The merged settings failed semantic validation.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Convenience alias for settings operations.
pub type Result<T> = std::result::Result<T, SettingsError>;
