//! Cost estimation for engine invocations.
//!
//! Token-based pricing is used when the engine reports usage and a non-zero
//! per-token rate is configured for it; otherwise we fall back to a
//! time-based estimate from the measured latency. Rates come from the
//! environment so they can be tuned without code edits.

use std::env;

use schemars::JsonSchema;

use crate::prelude::*;

/// The default compute rate, in USD per hour, for the time-based estimate.
const DEFAULT_CPU_PER_HOUR_USD: f64 = 0.05;

/// Token usage reported by an LLM-backed engine.
#[derive(Clone, Copy, Debug, Default, Deserialize, JsonSchema, PartialEq, Serialize)]
pub struct TokenUsage {
    /// Tokens consumed by the prompt (including the encoded image).
    pub input_tokens: u64,

    /// Tokens produced in the response.
    pub output_tokens: u64,
}

/// What a cost estimate was computed from.
#[derive(Clone, Copy, Debug, Deserialize, JsonSchema, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BillingBasis {
    /// Actual token counts times configured per-token rates.
    Tokens,

    /// Wall-clock runtime times an hourly compute rate.
    LatencyMs,
}

/// A cost estimate for one engine invocation.
#[derive(Clone, Debug, Deserialize, JsonSchema, Serialize)]
pub struct Billing {
    /// What the estimate was computed from.
    pub basis: BillingBasis,

    /// Always `"USD"` for now.
    pub currency: String,

    /// The engine this estimate is for.
    pub model: String,

    /// The estimated cost.
    pub cost_usd: Option<f64>,

    /// Token usage, when the basis is tokens (also echoed on the time basis
    /// when the engine reported usage without configured pricing).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_usage: Option<TokenUsage>,

    /// The hourly rate used, when the basis is latency.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rate_usd_per_hour: Option<f64>,
}

/// Per-token pricing for one engine, in USD.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct TokenPricing {
    pub input_usd: f64,
    pub output_usd: f64,
}

impl TokenPricing {
    /// Look up pricing for an engine from the environment.
    ///
    /// `gpt` reads `GPT_USD_PER_INPUT_TOKEN` / `GPT_USD_PER_OUTPUT_TOKEN`,
    /// and so on. Unset or unparseable rates are treated as zero, which means
    /// "pricing unknown".
    pub fn from_env(model: &str) -> Self {
        let prefix = model.replace('-', "_").to_ascii_uppercase();
        let rate = |suffix: &str| -> f64 {
            env::var(format!("{}_USD_PER_{}_TOKEN", prefix, suffix))
                .ok()
                .and_then(|raw| raw.trim().parse::<f64>().ok())
                .unwrap_or(0.0)
        };
        Self {
            input_usd: rate("INPUT"),
            output_usd: rate("OUTPUT"),
        }
    }

    /// Is any non-zero rate configured?
    fn is_configured(&self) -> bool {
        self.input_usd != 0.0 || self.output_usd != 0.0
    }
}

/// Round to 6 decimal places, enough for per-request token costs.
fn round_usd(cost: f64) -> f64 {
    (cost * 1_000_000.0).round() / 1_000_000.0
}

/// The time-based estimate: runtime in hours times the hourly rate.
pub fn estimate_cost_time_usd(latency_ms: u64, rate_usd_per_hour: f64) -> f64 {
    (latency_ms as f64 / 1000.0 / 3600.0) * rate_usd_per_hour
}

/// Build a billing record for one invocation.
///
/// Engines that already attach their own billing record keep it; the
/// dispatcher only calls this when `billing` is unset.
pub fn build_billing(
    model: &str,
    latency_ms: u64,
    token_usage: Option<TokenUsage>,
) -> Billing {
    if let Some(usage) = token_usage {
        let pricing = TokenPricing::from_env(model);
        if pricing.is_configured() {
            let cost = usage.input_tokens as f64 * pricing.input_usd
                + usage.output_tokens as f64 * pricing.output_usd;
            return Billing {
                basis: BillingBasis::Tokens,
                currency: "USD".to_owned(),
                model: model.to_owned(),
                cost_usd: Some(round_usd(cost)),
                token_usage: Some(usage),
                rate_usd_per_hour: None,
            };
        }
    }

    let rate = env::var("CPU_PER_HOUR_USD")
        .ok()
        .and_then(|raw| raw.trim().parse::<f64>().ok())
        .unwrap_or(DEFAULT_CPU_PER_HOUR_USD);
    Billing {
        basis: BillingBasis::LatencyMs,
        currency: "USD".to_owned(),
        model: model.to_owned(),
        cost_usd: Some(round_usd(estimate_cost_time_usd(latency_ms, rate))),
        token_usage,
        rate_usd_per_hour: Some(rate),
    }
}
