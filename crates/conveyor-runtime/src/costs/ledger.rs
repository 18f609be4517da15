//! The cost ledger — bounded, task-safe store of per-call charges.
//!
//! Every metered call lands here as an immutable [`CostEntry`]: the charge
//! is computed from usage counters and the resolved rate table, tagged with
//! the current execution context, appended under a single mutex, optionally
//! exported as one JSON line, and optionally forwarded to the metrics sink.
//! Capacity pressure evicts the oldest entry (FIFO ring buffer semantics).

use std::collections::{BTreeMap, VecDeque};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use conveyor_core::ConfigError;
use conveyor_settings::CostSettings;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::context;
use crate::metrics::MetricsSink;
use crate::costs::pricing::PricingResolver;

/// Caller-supplied usage detail for one metered call.
///
/// The three cache-write counts are mutually exclusive buckets the caller
/// partitions upstream; the ledger clamps each independently against the
/// non-cached remainder of the prompt.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CallUsage {
    /// Input/output medium; defaults to `"text"`.
    pub modality: Option<String>,
    /// Prompt tokens served from cache.
    pub cached_tokens: u64,
    /// Prompt tokens written to the generic cache class.
    pub cache_write_tokens: u64,
    /// Prompt tokens written with a 5-minute TTL.
    pub cache_write_5m_tokens: u64,
    /// Prompt tokens written with a 1-hour TTL.
    pub cache_write_1h_tokens: u64,
    /// Billable unit count for unit-priced models (e.g. seconds of video).
    pub unit_count: f64,
    /// Named unit-cost tier to select, when the model declares one.
    pub unit_tier: Option<String>,
    /// Arbitrary caller metadata, carried through onto the entry.
    pub extra: Map<String, Value>,
}

/// One immutable charge record.
///
/// Serializes with snake_case keys; exported JSONL lines are meant to be
/// ingested by external analysis tooling that expects that shape.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CostEntry {
    /// Creation timestamp (UTC).
    pub timestamp: DateTime<Utc>,
    /// Workflow tag from the execution context.
    pub workflow: String,
    /// Stage tag from the execution context.
    pub stage: String,
    /// Request/run id from the execution context.
    pub request_id: String,
    /// Model that served the call.
    pub model: String,
    /// Prompt tokens reported by the provider.
    pub prompt_tokens: u64,
    /// Cached prompt tokens (clamped to the prompt total).
    pub cached_tokens: u64,
    /// Generic cache-write tokens.
    pub cache_write_tokens: u64,
    /// 5-minute TTL cache-write tokens.
    pub cache_write_5m_tokens: u64,
    /// 1-hour TTL cache-write tokens.
    pub cache_write_1h_tokens: u64,
    /// Completion tokens reported by the provider.
    pub completion_tokens: u64,
    /// Total tokens reported by the provider.
    pub total_tokens: u64,
    /// Computed charge in USD, rounded to 8 decimal places. Never negative.
    pub cost_usd: f64,
    /// Caller metadata.
    pub metadata: Map<String, Value>,
}

/// Aggregate totals over a set of entries.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CostTotals {
    /// Summed cost in USD, rounded to 6 decimal places.
    pub cost_usd: f64,
    /// Summed prompt tokens.
    pub prompt_tokens: u64,
    /// Summed completion tokens.
    pub completion_tokens: u64,
    /// Summed total tokens.
    pub total_tokens: u64,
    /// Number of entries.
    pub count: usize,
}

/// Cost sums bucketed by workflow, stage, and model.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CostBreakdown {
    /// Cost per workflow tag.
    pub workflow: BTreeMap<String, f64>,
    /// Cost per stage tag.
    pub stage: BTreeMap<String, f64>,
    /// Cost per model.
    pub model: BTreeMap<String, f64>,
}

/// Result of [`CostLedger::summary`].
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CostSummary {
    /// Aggregate totals.
    pub totals: CostTotals,
    /// Per-bucket cost sums, each rounded to 6 decimal places.
    pub breakdown: CostBreakdown,
}

/// Bounded, task-safe store of cost entries.
pub struct CostLedger {
    enabled: bool,
    max_entries: usize,
    export_path: Option<PathBuf>,
    resolver: PricingResolver,
    entries: Mutex<VecDeque<CostEntry>>,
    metrics: Option<Arc<dyn MetricsSink>>,
}

impl std::fmt::Debug for CostLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CostLedger")
            .field("enabled", &self.enabled)
            .field("max_entries", &self.max_entries)
            .field("export_path", &self.export_path)
            .field("entries", &self.entries.lock().len())
            .finish_non_exhaustive()
    }
}

impl CostLedger {
    /// Build a ledger from cost settings.
    ///
    /// Fails with [`ConfigError::NoPricingModels`] when tracking is enabled
    /// with an empty pricing map. Creates the export file's parent
    /// directory eagerly so the append path stays cheap.
    pub fn new(settings: &CostSettings) -> Result<Self, ConfigError> {
        if settings.enabled && settings.models.is_empty() {
            return Err(ConfigError::NoPricingModels);
        }
        if let Some(path) = &settings.export_path {
            if let Some(parent) = path.parent() {
                if let Err(e) = std::fs::create_dir_all(parent) {
                    warn!(error = %e, ?parent, "failed to create cost export directory");
                }
            }
        }
        Ok(Self {
            enabled: settings.enabled,
            max_entries: settings.max_entries,
            export_path: settings.export_path.clone(),
            resolver: PricingResolver::new(settings),
            entries: Mutex::new(VecDeque::new()),
            metrics: None,
        })
    }

    /// Attach a metrics sink; summarized fields of every recorded entry are
    /// forwarded to it.
    pub fn with_metrics(mut self, sink: Arc<dyn MetricsSink>) -> Self {
        self.metrics = Some(sink);
        self
    }

    /// Compute and append one charge. Returns `None` when tracking is
    /// disabled.
    ///
    /// Never fails: an unresolvable model yields a zero-rate charge, and an
    /// export write failure degrades to a warning.
    pub fn record(
        &self,
        model: &str,
        prompt_tokens: u64,
        completion_tokens: u64,
        total_tokens: u64,
        usage: Option<CallUsage>,
    ) -> Option<CostEntry> {
        if !self.enabled {
            return None;
        }

        let usage = usage.unwrap_or_default();
        let modality = usage.modality.as_deref().unwrap_or("text");
        let rates = self.resolver.resolve(model, prompt_tokens, modality);

        let cached = usage.cached_tokens.min(prompt_tokens);
        // Each cache-write class is clamped against the same non-cached
        // remainder; the classes are exclusive buckets partitioned upstream.
        let writable = prompt_tokens.saturating_sub(cached);
        let write = usage.cache_write_tokens.min(writable);
        let write_5m = usage.cache_write_5m_tokens.min(writable);
        let write_1h = usage.cache_write_1h_tokens.min(writable);
        let billable_prompt =
            prompt_tokens.saturating_sub(cached + write + write_5m + write_1h);

        let per_1k = |tokens: u64, rate: f64| (tokens as f64 / 1000.0) * rate;
        let mut cost = per_1k(billable_prompt, rates.input_per_1k)
            + per_1k(cached, rates.cached_rate())
            + per_1k(write, rates.cache_write_rate())
            + per_1k(write_5m, rates.cache_write_5m_rate())
            + per_1k(write_1h, rates.cache_write_1h_rate())
            + per_1k(completion_tokens, rates.output_per_1k);
        if usage.unit_count > 0.0 {
            if let Some(unit_cost) = rates.unit_cost_for(usage.unit_tier.as_deref()) {
                cost += usage.unit_count * unit_cost;
            }
        }

        let ctx = context::current();
        let entry = CostEntry {
            timestamp: Utc::now(),
            workflow: ctx.workflow,
            stage: ctx.stage,
            request_id: ctx.request_id,
            model: model.to_string(),
            prompt_tokens,
            cached_tokens: cached,
            cache_write_tokens: write,
            cache_write_5m_tokens: write_5m,
            cache_write_1h_tokens: write_1h,
            completion_tokens,
            total_tokens,
            cost_usd: round_places(cost.max(0.0), 8),
            metadata: usage.extra,
        };

        {
            let mut entries = self.entries.lock();
            if self.max_entries > 0 && entries.len() >= self.max_entries {
                let _ = entries.pop_front();
            }
            entries.push_back(entry.clone());
        }
        debug!(model, cost_usd = entry.cost_usd, "cost entry recorded");

        if let Some(path) = &self.export_path {
            if let Err(e) = append_json_line(path, &entry) {
                warn!(error = %e, ?path, "cost export append failed");
            }
        }

        if let Some(sink) = &self.metrics {
            sink.record_cost(
                &entry.workflow,
                &entry.stage,
                &entry.model,
                entry.prompt_tokens,
                entry.completion_tokens,
                entry.total_tokens,
                entry.cached_tokens,
                entry.cost_usd,
            );
        }

        Some(entry)
    }

    /// Totals and per-bucket breakdown, optionally windowed to entries no
    /// older than `since_minutes`.
    pub fn summary(&self, since_minutes: Option<i64>) -> CostSummary {
        let entries = self.entries.lock();
        let cutoff = since_minutes.map(|m| Utc::now() - chrono::Duration::minutes(m));
        let selected: Vec<&CostEntry> = entries
            .iter()
            .filter(|e| cutoff.is_none_or(|cut| e.timestamp >= cut))
            .collect();

        let mut totals = CostTotals { count: selected.len(), ..CostTotals::default() };
        let mut breakdown = CostBreakdown::default();
        let mut cost_sum = 0.0;
        for entry in &selected {
            cost_sum += entry.cost_usd;
            totals.prompt_tokens += entry.prompt_tokens;
            totals.completion_tokens += entry.completion_tokens;
            totals.total_tokens += entry.total_tokens;
            for (bucket, key) in [
                (&mut breakdown.workflow, &entry.workflow),
                (&mut breakdown.stage, &entry.stage),
                (&mut breakdown.model, &entry.model),
            ] {
                *bucket.entry(key.clone()).or_insert(0.0) += entry.cost_usd;
            }
        }
        totals.cost_usd = round_places(cost_sum, 6);
        for bucket in [&mut breakdown.workflow, &mut breakdown.stage, &mut breakdown.model] {
            for value in bucket.values_mut() {
                *value = round_places(*value, 6);
            }
        }

        CostSummary { totals, breakdown }
    }

    /// The most recent `limit` entries, most-recent-last.
    pub fn recent(&self, limit: usize) -> Vec<CostEntry> {
        let entries = self.entries.lock();
        let start = entries.len().saturating_sub(limit);
        entries.iter().skip(start).cloned().collect()
    }

    /// Number of stored entries.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether the ledger holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

// One buffer, one write: concurrent appenders on the same O_APPEND file
// must never interleave a line with another line's newline.
fn append_json_line(path: &std::path::Path, entry: &CostEntry) -> std::io::Result<()> {
    let mut line = serde_json::to_string(entry).map_err(std::io::Error::other)?;
    line.push('\n');
    let mut file = std::fs::OpenOptions::new().create(true).append(true).open(path)?;
    file.write_all(line.as_bytes())
}

fn round_places(value: f64, places: u32) -> f64 {
    let factor = 10f64.powi(places as i32);
    (value * factor).round() / factor
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
