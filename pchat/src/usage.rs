//! Local token counting and cost accounting.
//!
//! The endpoint's streamed responses carry no usage block, so both
//! sides of a call are counted locally with the model's BPE encoder
//! and priced from a static table.

use pclient::{WireContent, WireMessage, WirePart};
use tiktoken_rs::CoreBPE;

use crate::ChatError;

/// Cumulative token and cost totals for one agent instance.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Usage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub cost: f64,
}

/// Per-million-token pricing for one model family.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelPricing {
    pub model: &'static str,
    pub prompt_per_million: f64,
    pub completion_per_million: f64,
}

impl ModelPricing {
    pub fn estimate_cost(&self, prompt_tokens: u64, completion_tokens: u64) -> f64 {
        (prompt_tokens as f64 * self.prompt_per_million
            + completion_tokens as f64 * self.completion_per_million)
            / 1_000_000.0
    }
}

pub static MODEL_PRICING: &[ModelPricing] = &[
    ModelPricing {
        model: "gpt-4o-mini",
        prompt_per_million: 0.15,
        completion_per_million: 0.60,
    },
    ModelPricing {
        model: "gpt-4o",
        prompt_per_million: 2.50,
        completion_per_million: 10.00,
    },
    ModelPricing {
        model: "gpt-4.1-nano",
        prompt_per_million: 0.10,
        completion_per_million: 0.40,
    },
    ModelPricing {
        model: "gpt-4.1-mini",
        prompt_per_million: 0.40,
        completion_per_million: 1.60,
    },
    ModelPricing {
        model: "gpt-4.1",
        prompt_per_million: 2.00,
        completion_per_million: 8.00,
    },
    ModelPricing {
        model: "gpt-4-turbo",
        prompt_per_million: 10.00,
        completion_per_million: 30.00,
    },
    ModelPricing {
        model: "gpt-4",
        prompt_per_million: 30.00,
        completion_per_million: 60.00,
    },
    ModelPricing {
        model: "gpt-3.5-turbo",
        prompt_per_million: 0.50,
        completion_per_million: 1.50,
    },
    ModelPricing {
        model: "o3-mini",
        prompt_per_million: 1.10,
        completion_per_million: 4.40,
    },
    ModelPricing {
        model: "o1",
        prompt_per_million: 15.00,
        completion_per_million: 60.00,
    },
];

/// Finds pricing by exact model name, falling back to the longest
/// matching family prefix. Unknown models have no pricing and accrue
/// zero cost.
pub fn pricing_for(model: &str) -> Option<&'static ModelPricing> {
    if let Some(pricing) = MODEL_PRICING.iter().find(|pricing| pricing.model == model) {
        return Some(pricing);
    }

    MODEL_PRICING
        .iter()
        .filter(|pricing| model.starts_with(pricing.model))
        .max_by_key(|pricing| pricing.model.len())
}

/// Counts tokens with the model's own encoder and accumulates usage
/// across the network calls of an agent's lifetime.
pub struct UsageMeter {
    encoder: CoreBPE,
    pricing: Option<&'static ModelPricing>,
    totals: Usage,
}

impl std::fmt::Debug for UsageMeter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UsageMeter")
            .field("pricing", &self.pricing)
            .field("totals", &self.totals)
            .finish_non_exhaustive()
    }
}

impl UsageMeter {
    /// Builds a meter for the model, approximating unknown model names
    /// with the `cl100k_base` encoder.
    pub fn new(model: &str) -> Result<Self, ChatError> {
        let encoder = match tiktoken_rs::get_bpe_from_model(model) {
            Ok(encoder) => encoder,
            Err(_) => tiktoken_rs::cl100k_base()
                .map_err(|err| ChatError::setup(format!("tokenizer unavailable: {err}")))?,
        };

        Ok(Self {
            encoder,
            pricing: pricing_for(model),
            totals: Usage::default(),
        })
    }

    pub fn count_text(&self, text: &str) -> u64 {
        self.encoder.encode_ordinary(text).len() as u64
    }

    /// Estimates the prompt size of a message list: per-message framing
    /// overhead plus text content and tool-call payloads. Image parts
    /// are not counted.
    pub fn count_messages(&self, messages: &[WireMessage]) -> u64 {
        let mut total = 0;
        for message in messages {
            total += 4;

            if let Some(content) = &message.content {
                total += self.count_content(content);
            }

            if let Some(calls) = &message.tool_calls {
                for call in calls {
                    total += self.count_text(&call.function.name);
                    total += self.count_text(&call.function.arguments);
                }
            }
        }

        total + 2
    }

    fn count_content(&self, content: &WireContent) -> u64 {
        match content {
            WireContent::Text(text) => self.count_text(text),
            WireContent::Parts(parts) => parts
                .iter()
                .map(|part| match part {
                    WirePart::Text { text } => self.count_text(text),
                    WirePart::ImageUrl { .. } => 0,
                })
                .sum(),
        }
    }

    pub fn record_call(&mut self, prompt_tokens: u64, completion_tokens: u64) {
        self.totals.prompt_tokens += prompt_tokens;
        self.totals.completion_tokens += completion_tokens;
        if let Some(pricing) = self.pricing {
            self.totals.cost += pricing.estimate_cost(prompt_tokens, completion_tokens);
        }
    }

    pub fn totals(&self) -> Usage {
        self.totals
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pclient::{WireRole, WireToolCall};

    #[test]
    fn pricing_prefers_exact_then_longest_prefix() {
        assert_eq!(pricing_for("gpt-4o").expect("known").model, "gpt-4o");
        assert_eq!(
            pricing_for("gpt-4o-mini-2024-07-18").expect("prefix").model,
            "gpt-4o-mini"
        );
        assert_eq!(
            pricing_for("gpt-4o-2024-08-06").expect("prefix").model,
            "gpt-4o"
        );
        assert_eq!(
            pricing_for("gpt-4-turbo-preview").expect("prefix").model,
            "gpt-4-turbo"
        );
        assert!(pricing_for("claude-sonnet").is_none());
    }

    #[test]
    fn estimated_cost_scales_per_million_tokens() {
        let pricing = pricing_for("gpt-4o-mini").expect("known");
        let cost = pricing.estimate_cost(1_000_000, 1_000_000);
        assert!((cost - 0.75).abs() < 1e-9);
    }

    #[test]
    fn meter_counts_text_and_message_overhead() {
        let meter = UsageMeter::new("gpt-4o-mini").expect("meter");

        assert_eq!(meter.count_text(""), 0);
        assert!(meter.count_text("What's the weather in Paris?") > 0);

        assert_eq!(meter.count_messages(&[]), 2);
        let messages = vec![WireMessage::text(WireRole::User, "hello there")];
        assert!(meter.count_messages(&messages) > meter.count_messages(&[]));
    }

    #[test]
    fn tool_call_payloads_count_toward_the_prompt() {
        let meter = UsageMeter::new("gpt-4o-mini").expect("meter");

        let mut plain = WireMessage::new(WireRole::Assistant, None);
        let bare = meter.count_messages(std::slice::from_ref(&plain));

        plain.tool_calls = Some(vec![WireToolCall::function(
            "call_0",
            "get_weather",
            "{\"city\": \"Paris\"}",
        )]);
        assert!(meter.count_messages(&[plain]) > bare);
    }

    #[test]
    fn recorded_calls_accumulate_tokens_and_cost() {
        let mut meter = UsageMeter::new("gpt-4o-mini").expect("meter");

        meter.record_call(100, 20);
        meter.record_call(250, 50);

        let totals = meter.totals();
        assert_eq!(totals.prompt_tokens, 350);
        assert_eq!(totals.completion_tokens, 70);
        assert!(totals.cost > 0.0);
    }

    #[test]
    fn unknown_models_accrue_zero_cost() {
        let mut meter = UsageMeter::new("mystery-model").expect("meter");
        meter.record_call(1_000, 1_000);

        let totals = meter.totals();
        assert_eq!(totals.prompt_tokens, 1_000);
        assert_eq!(totals.cost, 0.0);
    }
}
