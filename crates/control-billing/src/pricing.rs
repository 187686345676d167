/// Cost formula shared by the meter's per-request estimate and the
/// exporter's hourly rollup: tokens priced per million, region pricing
/// applied as a flat multiplier on top of the model's base rate, cached
/// prompt tokens billed at the model's discounted rate when it configures
/// one (§3, §4.7, §4.12).
#[allow(clippy::too_many_arguments)]
pub fn compute_cost(
    prompt_tokens: u64,
    completion_tokens: u64,
    cached_tokens: u64,
    input_price_per_million: f64,
    output_price_per_million: f64,
    cached_input_price_per_million: Option<f64>,
    region_pricing_multiplier: f64,
) -> f64 {
    let cached_tokens = cached_tokens.min(prompt_tokens);
    let uncached_prompt_tokens = prompt_tokens - cached_tokens;
    let cached_price = cached_input_price_per_million.unwrap_or(input_price_per_million);

    let prompt_cost = uncached_prompt_tokens as f64 / 1_000_000.0 * input_price_per_million;
    let cached_cost = cached_tokens as f64 / 1_000_000.0 * cached_price;
    let completion_cost = completion_tokens as f64 / 1_000_000.0 * output_price_per_million;

    (prompt_cost + cached_cost + completion_cost) * region_pricing_multiplier
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn applies_region_multiplier_on_top_of_base_rate() {
        let cost = compute_cost(1_000_000, 0, 0, 1.0, 2.0, None, 1.5);
        assert!((cost - 1.5).abs() < 1e-9);
    }

    #[test]
    fn zero_tokens_costs_nothing() {
        assert_eq!(compute_cost(0, 0, 0, 5.0, 5.0, None, 1.0), 0.0);
    }

    #[test]
    fn cached_tokens_bill_at_the_discounted_rate_when_configured() {
        let cost = compute_cost(1_000_000, 0, 400_000, 2.0, 2.0, Some(0.5), 1.0);
        // 600k uncached @ $2/M + 400k cached @ $0.5/M
        assert!((cost - (1.2 + 0.2)).abs() < 1e-9);
    }

    #[test]
    fn cached_tokens_bill_at_the_base_rate_when_no_discount_is_configured() {
        let with_cache = compute_cost(1_000_000, 0, 400_000, 2.0, 2.0, None, 1.0);
        let without_cache = compute_cost(1_000_000, 0, 0, 2.0, 2.0, None, 1.0);
        assert!((with_cache - without_cache).abs() < 1e-9);
    }
}
