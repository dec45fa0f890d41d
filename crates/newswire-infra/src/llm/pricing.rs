//! Default pricing for known models.
//!
//! Provider prices left out of `config.toml` are filled from a hardcoded
//! table matched by model prefix. Unknown models get a conservative fallback
//! so the budget errs on the side of over-counting.

use newswire_types::config::ProviderConfig;
use newswire_types::llm::{ProviderKind, ProviderProfile};

struct PricingEntry {
    kind: ProviderKind,
    model_pattern: &'static str,
    input_cost_per_million: f64,
    output_cost_per_million: f64,
}

/// Conservative fallback pricing when no model match is found.
const FALLBACK_INPUT_COST: f64 = 5.0;
const FALLBACK_OUTPUT_COST: f64 = 15.0;

/// USD per million tokens. More specific patterns come first.
const DEFAULT_PRICING: &[PricingEntry] = &[
    PricingEntry {
        kind: ProviderKind::Anthropic,
        model_pattern: "claude-sonnet-4",
        input_cost_per_million: 3.0,
        output_cost_per_million: 15.0,
    },
    PricingEntry {
        kind: ProviderKind::Anthropic,
        model_pattern: "claude-opus-4",
        input_cost_per_million: 15.0,
        output_cost_per_million: 75.0,
    },
    PricingEntry {
        kind: ProviderKind::Anthropic,
        model_pattern: "claude-3-5-haiku",
        input_cost_per_million: 0.80,
        output_cost_per_million: 4.0,
    },
    PricingEntry {
        kind: ProviderKind::Anthropic,
        model_pattern: "claude-3-haiku",
        input_cost_per_million: 0.25,
        output_cost_per_million: 1.25,
    },
    PricingEntry {
        kind: ProviderKind::OpenAi,
        model_pattern: "gpt-4o-mini",
        input_cost_per_million: 0.15,
        output_cost_per_million: 0.60,
    },
    PricingEntry {
        kind: ProviderKind::OpenAi,
        model_pattern: "gpt-4o",
        input_cost_per_million: 2.50,
        output_cost_per_million: 10.0,
    },
    PricingEntry {
        kind: ProviderKind::OpenAi,
        model_pattern: "gpt-4.1-mini",
        input_cost_per_million: 0.40,
        output_cost_per_million: 1.60,
    },
];

/// Table price for a model as `(input, output)` per million tokens.
pub fn default_price(kind: ProviderKind, model: &str) -> Option<(f64, f64)> {
    DEFAULT_PRICING
        .iter()
        .find(|e| e.kind == kind && model.starts_with(e.model_pattern))
        .map(|e| (e.input_cost_per_million, e.output_cost_per_million))
}

/// Build the static profile for a configured provider.
///
/// Lookup order per price: explicit config value, default table, fallback.
pub fn resolve_profile(config: &ProviderConfig) -> ProviderProfile {
    let table = default_price(config.kind, &config.model);
    if table.is_none()
        && (config.input_price_per_million.is_none() || config.output_price_per_million.is_none())
    {
        tracing::warn!(
            provider = %config.name,
            model = %config.model,
            "No known pricing for model, using conservative fallback"
        );
    }
    let (table_in, table_out) = table.unwrap_or((FALLBACK_INPUT_COST, FALLBACK_OUTPUT_COST));

    ProviderProfile {
        name: config.name.clone(),
        model: config.model.clone(),
        input_price_per_million: config.input_price_per_million.unwrap_or(table_in),
        output_price_per_million: config.output_price_per_million.unwrap_or(table_out),
        requests_per_minute: config.requests_per_minute,
    }
}

/// Format a dollar amount for display.
///
/// - Amounts below $0.01 use 4 decimal places: `$0.0012`
/// - Larger amounts use 2 decimal places: `$1.25`
pub fn format_cost(cost: f64) -> String {
    if cost < 0.01 {
        format!("${cost:.4}")
    } else {
        format!("${cost:.2}")
    }
}
