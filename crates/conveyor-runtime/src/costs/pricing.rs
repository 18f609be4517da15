//! Pricing resolution — (model × modality × usage tier) to a concrete
//! rate table.
//!
//! Resolution never fails: an unknown model falls back to the configured
//! default model, and failing that to an all-zero rate table. Cost accuracy
//! is sacrificed for call-path availability.

use std::collections::BTreeMap;

use conveyor_settings::{CostSettings, ModelPricing, PricingTier, RateCard};

/// Concrete rates selected for one call.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ResolvedRates {
    /// Base input rate per 1,000 prompt tokens (USD).
    pub input_per_1k: f64,
    /// Base output rate per 1,000 completion tokens (USD).
    pub output_per_1k: f64,
    /// Discounted rate for previously-cached prompt tokens.
    pub cached_input_per_1k: Option<f64>,
    /// Generic cache-write rate.
    pub cache_write_per_1k: Option<f64>,
    /// 5-minute TTL cache-write rate.
    pub cache_write_5m_per_1k: Option<f64>,
    /// 1-hour TTL cache-write rate.
    pub cache_write_1h_per_1k: Option<f64>,
    /// Unit label for unit-billed models.
    pub unit_label: Option<String>,
    /// Flat cost per unit.
    pub unit_cost: Option<f64>,
    /// Named unit-cost tiers.
    pub unit_costs: Option<BTreeMap<String, f64>>,
}

impl ResolvedRates {
    fn from_card(card: &RateCard) -> Self {
        Self {
            input_per_1k: card.input_per_1k,
            output_per_1k: card.output_per_1k,
            cached_input_per_1k: card.cached_input_per_1k,
            cache_write_per_1k: card.cache_write_per_1k,
            cache_write_5m_per_1k: card.cache_write_5m_per_1k,
            cache_write_1h_per_1k: card.cache_write_1h_per_1k,
            unit_label: card.unit_label.clone(),
            unit_cost: card.unit_cost,
            unit_costs: card.unit_costs.clone(),
        }
    }

    /// Rate for previously-cached prompt tokens (base input rate when no
    /// discounted rate is configured).
    pub fn cached_rate(&self) -> f64 {
        self.cached_input_per_1k.unwrap_or(self.input_per_1k)
    }

    /// Generic cache-write rate (base input rate fallback).
    pub fn cache_write_rate(&self) -> f64 {
        self.cache_write_per_1k.unwrap_or(self.input_per_1k)
    }

    /// 5-minute TTL cache-write rate (generic cache-write fallback).
    pub fn cache_write_5m_rate(&self) -> f64 {
        self.cache_write_5m_per_1k.unwrap_or_else(|| self.cache_write_rate())
    }

    /// 1-hour TTL cache-write rate (generic cache-write fallback).
    pub fn cache_write_1h_rate(&self) -> f64 {
        self.cache_write_1h_per_1k.unwrap_or_else(|| self.cache_write_rate())
    }

    /// Unit cost for an optional named tier, falling back to the flat
    /// unit cost.
    pub fn unit_cost_for(&self, tier: Option<&str>) -> Option<f64> {
        if let (Some(tiers), Some(tier)) = (&self.unit_costs, tier) {
            if let Some(cost) = tiers.get(tier) {
                return Some(*cost);
            }
        }
        self.unit_cost
    }
}

/// Resolves model pricing from configuration.
#[derive(Clone, Debug)]
pub struct PricingResolver {
    models: BTreeMap<String, ModelPricing>,
    default_model: Option<String>,
}

impl PricingResolver {
    /// Build a resolver from cost settings.
    pub fn new(settings: &CostSettings) -> Self {
        Self {
            models: settings.models.clone(),
            default_model: settings.default_model.clone(),
        }
    }

    /// Whether a model has its own pricing entry.
    pub fn is_known(&self, model: &str) -> bool {
        self.models.contains_key(model)
    }

    /// Resolve the rate table for one call.
    ///
    /// Selection order: model (default-model fallback, then all-zero) →
    /// modality (requested → `"text"` → first declared) → usage tier
    /// (first containing `prompt_tokens`, last tier as catch-all).
    pub fn resolve(&self, model: &str, prompt_tokens: u64, modality: &str) -> ResolvedRates {
        let Some(config) = self.lookup(model) else {
            return ResolvedRates::default();
        };

        let (rates, tiers) = Self::select_modality(config, modality);
        match tiers {
            Some(tiers) if !tiers.is_empty() => {
                ResolvedRates::from_card(&Self::select_tier(tiers, prompt_tokens).rates)
            }
            _ => ResolvedRates::from_card(rates),
        }
    }

    fn lookup(&self, model: &str) -> Option<&ModelPricing> {
        self.models.get(model).or_else(|| {
            self.default_model.as_ref().and_then(|default| self.models.get(default))
        })
    }

    fn select_modality<'a>(
        config: &'a ModelPricing,
        modality: &str,
    ) -> (&'a RateCard, Option<&'a Vec<PricingTier>>) {
        let Some(modalities) = config.modalities.as_ref().filter(|m| !m.is_empty()) else {
            return (&config.rates, config.tiers.as_ref());
        };
        let selected = modalities
            .iter()
            .find(|m| m.modality == modality)
            .or_else(|| modalities.iter().find(|m| m.modality == "text"))
            .unwrap_or(&modalities[0]);
        (&selected.rates, selected.tiers.as_ref())
    }

    fn select_tier(tiers: &[PricingTier], prompt_tokens: u64) -> &PricingTier {
        tiers
            .iter()
            .find(|tier| {
                prompt_tokens >= tier.min_prompt_tokens.unwrap_or(0)
                    && tier.max_prompt_tokens.is_none_or(|max| prompt_tokens <= max)
            })
            .unwrap_or_else(|| &tiers[tiers.len() - 1])
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
