//! Settings type definitions.
//!
//! Each type implements [`Default`] with production default values and
//! accepts partial JSON via `#[serde(default)]`. Semantic checks live in
//! [`ConveyorSettings::validate`] and are fatal at setup, never at call time.

use std::collections::BTreeMap;
use std::path::PathBuf;

use conveyor_core::ConfigError;
use serde::{Deserialize, Serialize};

/// Root settings type for the conveyor pipeline engine.
///
/// # JSON Format
///
/// All field names are camelCase. Example:
///
/// ```json
/// {
///   "version": "0.1.0",
///   "costs": {
///     "models": { "gpt-4o-mini": { "inputPer1k": 0.00015, "outputPer1k": 0.0006 } }
///   },
///   "workflows": { "recommendation": { "timeoutSecs": 30 } }
/// }
/// ```
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConveyorSettings {
    /// Settings schema version.
    pub version: String,
    /// Application name.
    pub name: String,
    /// Cost tracking and pricing configuration.
    pub costs: CostSettings,
    /// Per-workflow overrides, keyed by workflow name.
    pub workflows: BTreeMap<String, WorkflowSettings>,
    /// Batch fan-out configuration.
    pub batch: BatchSettings,
    /// Metrics sink gating.
    pub monitoring: MonitoringSettings,
    /// Logging configuration.
    pub logging: LoggingSettings,
}

impl Default for ConveyorSettings {
    fn default() -> Self {
        Self {
            version: "0.1.0".to_string(),
            name: "conveyor".to_string(),
            costs: CostSettings::default(),
            workflows: BTreeMap::new(),
            batch: BatchSettings::default(),
            monitoring: MonitoringSettings::default(),
            logging: LoggingSettings::default(),
        }
    }
}

impl ConveyorSettings {
    /// Semantic validation of the merged settings.
    ///
    /// Checks that fail here are configuration defects: cost tracking enabled
    /// with an empty pricing map, or a referenced model (default or
    /// per-workflow) missing a pricing entry while `requireKnownModels` is
    /// set.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.costs.validate()?;
        if self.costs.enabled && self.costs.require_known_models {
            for workflow in self.workflows.values() {
                if let Some(model) = &workflow.model {
                    if !self.costs.models.contains_key(model) {
                        return Err(ConfigError::UnknownModel { model: model.clone() });
                    }
                }
            }
        }
        Ok(())
    }
}

/// Cost tracking and pricing configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CostSettings {
    /// Master switch: when false, `record` is a no-op.
    pub enabled: bool,
    /// Treat a referenced model without a pricing entry as a setup error.
    pub require_known_models: bool,
    /// Ledger capacity; the oldest entry is evicted on overflow (FIFO).
    pub max_entries: usize,
    /// Optional newline-delimited JSON export file.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub export_path: Option<PathBuf>,
    /// Fallback model used when a recorded model has no pricing entry.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_model: Option<String>,
    /// Per-model rate specifications.
    pub models: BTreeMap<String, ModelPricing>,
}

impl Default for CostSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            require_known_models: true,
            max_entries: 10_000,
            export_path: None,
            default_model: None,
            models: BTreeMap::new(),
        }
    }
}

impl CostSettings {
    /// Validate the pricing configuration in isolation.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.enabled {
            return Ok(());
        }
        if self.models.is_empty() {
            return Err(ConfigError::NoPricingModels);
        }
        if self.require_known_models {
            if let Some(model) = &self.default_model {
                if !self.models.contains_key(model) {
                    return Err(ConfigError::UnknownModel { model: model.clone() });
                }
            }
        }
        Ok(())
    }
}

/// Per-model rate specification.
///
/// Base rates live directly on the model; a model may instead declare
/// per-modality rate tables and/or prompt-token usage tiers. When tiers are
/// declared, the selected tier's rates replace the base rates wholesale.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ModelPricing {
    /// Base rates, used when no modality/tier narrows the selection.
    #[serde(flatten)]
    pub rates: RateCard,
    /// Per-modality rate tables, in declaration order. The first entry is
    /// the fallback when neither the requested modality nor `"text"` exists.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modalities: Option<Vec<ModalityPricing>>,
    /// Prompt-token usage tiers, in declaration order. The last tier is the
    /// catch-all when no bounds match.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tiers: Option<Vec<PricingTier>>,
}

/// Rates for one input/output medium (text, audio, ...).
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ModalityPricing {
    /// Modality name, e.g. `"text"` or `"audio"`.
    pub modality: String,
    /// Rates for this modality.
    #[serde(flatten)]
    pub rates: RateCard,
    /// Optional usage tiers within this modality.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tiers: Option<Vec<PricingTier>>,
}

/// A token-count-bounded pricing bracket. Either bound may be open.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PricingTier {
    /// Inclusive lower prompt-token bound (open when absent).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_prompt_tokens: Option<u64>,
    /// Inclusive upper prompt-token bound (open when absent).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_prompt_tokens: Option<u64>,
    /// Rates for this bracket.
    #[serde(flatten)]
    pub rates: RateCard,
}

/// One complete rate table: per-1k-token rates, cache classes, unit costs.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RateCard {
    /// Base input rate per 1,000 prompt tokens (USD).
    pub input_per_1k: f64,
    /// Base output rate per 1,000 completion tokens (USD).
    pub output_per_1k: f64,
    /// Discounted rate for previously-cached prompt tokens.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cached_input_per_1k: Option<f64>,
    /// Generic cache-write rate.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_write_per_1k: Option<f64>,
    /// 5-minute TTL cache-write rate.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_write_5m_per_1k: Option<f64>,
    /// 1-hour TTL cache-write rate.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_write_1h_per_1k: Option<f64>,
    /// Label for unit-billed models (e.g. `"second"` for video generation).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit_label: Option<String>,
    /// Flat cost per unit (USD).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit_cost: Option<f64>,
    /// Named unit-cost tiers, looked up by the caller's `unitTier`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit_costs: Option<BTreeMap<String, f64>>,
}

/// Per-workflow overrides.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WorkflowSettings {
    /// Default whole-run deadline in seconds. `execute`'s explicit timeout
    /// argument takes precedence.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
    /// Model this workflow's stages call, checked against the pricing map
    /// when `requireKnownModels` is set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

/// Batch fan-out configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BatchSettings {
    /// Maximum concurrent runs during `execute_batch`. `None` preserves the
    /// historical unbounded fan-out.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_concurrency: Option<usize>,
}

/// Metrics sink gating.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MonitoringSettings {
    /// When true, the application wires a metrics sink into the
    /// orchestrator and ledger.
    pub enabled: bool,
}

/// Logging configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Minimum level for the tracing subscriber (`RUST_LOG` overrides).
    pub level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self { level: "info".to_string() }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
