use crate::config::PricingConfig;

const TOKENS_PER_MILLION: f64 = 1_000_000.0;

/// Linear cost model over the three billable axes of a deep-research run.
/// Token rates are cents per million tokens; web searches bill per call.
#[allow(clippy::cast_precision_loss)]
pub fn estimate_cost_cents(
    pricing: &PricingConfig,
    input_tokens: i64,
    output_tokens: i64,
    web_search_calls: i64,
) -> f64 {
    let input = input_tokens as f64 / TOKENS_PER_MILLION * pricing.input_cents_per_million;
    let output = output_tokens as f64 / TOKENS_PER_MILLION * pricing.output_cents_per_million;
    let searches = web_search_calls as f64 * pricing.web_search_cents_per_call;
    input + output + searches
}
