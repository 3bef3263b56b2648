//! Per-family pricing for cost estimates.
//!
//! Prices are in USD per 1 000 tokens. Families are detected from the
//! model name, so dated variants (`gpt-4o-mini-2024-07-18`) price the
//! same as their base name.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Rate {
    /// Separate input and output prices.
    Split { input_per_1k: f64, output_per_1k: f64 },
    /// One price for all tokens.
    Flat { per_1k: f64 },
    /// Not priced.
    Free,
}

impl Rate {
    pub fn cost(&self, input_tokens: u64, output_tokens: u64) -> f64 {
        match *self {
            Rate::Split {
                input_per_1k,
                output_per_1k,
            } => {
                (input_tokens as f64 * input_per_1k + output_tokens as f64 * output_per_1k)
                    / 1_000.0
            }
            Rate::Flat { per_1k } => (input_tokens + output_tokens) as f64 * per_1k / 1_000.0,
            Rate::Free => 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModelFamily {
    Gpt4,
    Gpt35,
    Unknown,
}

impl ModelFamily {
    pub fn detect(model: &str) -> Self {
        let model = model.to_ascii_lowercase();
        if model.contains("gpt-4") {
            ModelFamily::Gpt4
        } else if model.contains("gpt-3.5") {
            ModelFamily::Gpt35
        } else {
            ModelFamily::Unknown
        }
    }

    pub fn rate(&self) -> Rate {
        match self {
            ModelFamily::Gpt4 => Rate::Split {
                input_per_1k: 0.03,
                output_per_1k: 0.06,
            },
            ModelFamily::Gpt35 => Rate::Flat { per_1k: 0.002 },
            ModelFamily::Unknown => Rate::Free,
        }
    }

    /// Estimated cost in USD for a model call.
    pub fn estimate(model: &str, input_tokens: u64, output_tokens: u64) -> f64 {
        Self::detect(model).rate().cost(input_tokens, output_tokens)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_families() {
        assert_eq!(ModelFamily::detect("gpt-4o-mini"), ModelFamily::Gpt4);
        assert_eq!(ModelFamily::detect("GPT-4-turbo"), ModelFamily::Gpt4);
        assert_eq!(ModelFamily::detect("gpt-3.5-turbo-0125"), ModelFamily::Gpt35);
        assert_eq!(ModelFamily::detect("llama3:8b"), ModelFamily::Unknown);
    }

    #[test]
    fn gpt4_splits_input_and_output() {
        let cost = ModelFamily::estimate("gpt-4", 1_000, 1_000);
        assert!((cost - 0.09).abs() < 1e-9);
    }

    #[test]
    fn gpt35_charges_total() {
        let cost = ModelFamily::estimate("gpt-3.5-turbo", 1_500, 500);
        assert!((cost - 0.004).abs() < 1e-9);
    }

    #[test]
    fn unknown_is_free() {
        assert_eq!(ModelFamily::estimate("mistral-small", 10_000, 10_000), 0.0);
    }
}
