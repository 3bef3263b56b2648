//! Token counting with a per-(model, text) cache.
//!
//! Exact counts need the `exact-tokens` feature and a `tokenizer.json`
//! registered for the model's family prefix. Everything else falls back
//! to characters / 4 with a floor of 1. Counting never fails.

use crate::pricing::ModelFamily;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::PathBuf;
use std::sync::Mutex;
use tracing::{debug, info};

/// Cache entries kept before the cache is cleared.
const CACHE_CAPACITY: usize = 4_096;

/// Approximate token count: characters / 4, never below 1.
pub fn approximate_tokens(text: &str) -> u64 {
    ((text.chars().count() / 4) as u64).max(1)
}

/// What one request consumed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageSummary {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_tokens: u64,
    pub estimated_cost_usd: f64,
    pub model: String,
}

pub struct TokenAccountant {
    cache: Mutex<HashMap<(String, u64), u64>>,
    #[cfg(feature = "exact-tokens")]
    tokenizers: Vec<(String, tokenizers::Tokenizer)>,
}

impl TokenAccountant {
    /// An accountant that only approximates.
    pub fn new() -> Self {
        Self {
            cache: Mutex::new(HashMap::new()),
            #[cfg(feature = "exact-tokens")]
            tokenizers: Vec::new(),
        }
    }

    /// Load `tokenizer.json` files keyed by model-name prefix. Files that
    /// fail to load are skipped with a warning.
    pub fn with_tokenizer_files(files: &HashMap<String, PathBuf>) -> Self {
        #[allow(unused_mut)]
        let mut accountant = Self::new();

        #[cfg(feature = "exact-tokens")]
        {
            for (prefix, path) in files {
                match tokenizers::Tokenizer::from_file(path) {
                    Ok(tokenizer) => {
                        info!(prefix = %prefix, path = %path.display(), "Loaded tokenizer");
                        accountant.tokenizers.push((prefix.to_lowercase(), tokenizer));
                    }
                    Err(e) => {
                        tracing::warn!(prefix = %prefix, path = %path.display(), error = %e, "Failed to load tokenizer, using approximation");
                    }
                }
            }
            // Longest prefix first so "gpt-4o" wins over "gpt-4".
            accountant
                .tokenizers
                .sort_by(|a, b| b.0.len().cmp(&a.0.len()));
        }

        #[cfg(not(feature = "exact-tokens"))]
        if !files.is_empty() {
            debug!(
                count = files.len(),
                "Tokenizer files configured but exact-tokens feature is off, using approximation"
            );
        }

        accountant
    }

    /// Count tokens of `text` for `model`.
    pub fn count(&self, text: &str, model: &str) -> u64 {
        let key = (model.to_string(), hash_text(text));
        {
            let cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(&n) = cache.get(&key) {
                return n;
            }
        }

        let n = self.count_uncached(text, model);

        let mut cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
        if cache.len() >= CACHE_CAPACITY {
            cache.clear();
        }
        cache.insert(key, n);
        n
    }

    #[cfg(feature = "exact-tokens")]
    fn count_uncached(&self, text: &str, model: &str) -> u64 {
        let model = model.to_lowercase();
        if let Some((_, tokenizer)) = self.tokenizers.iter().find(|(p, _)| model.starts_with(p.as_str())) {
            match tokenizer.encode(text, false) {
                Ok(encoding) => return encoding.get_ids().len() as u64,
                Err(e) => debug!(error = %e, "Tokenizer failed, using approximation"),
            }
        }
        approximate_tokens(text)
    }

    #[cfg(not(feature = "exact-tokens"))]
    fn count_uncached(&self, text: &str, _model: &str) -> u64 {
        approximate_tokens(text)
    }

    /// Log the usage block for one request and return it as a value.
    pub fn summarize(&self, input_tokens: u64, output_tokens: u64, model: &str) -> UsageSummary {
        let total_tokens = input_tokens + output_tokens;
        let estimated_cost_usd = ModelFamily::estimate(model, input_tokens, output_tokens);

        info!(
            "\n==================== TOKEN USAGE ====================\n\
             Model:          {model}\n\
             Input tokens:   {input_tokens}\n\
             Output tokens:  {output_tokens}\n\
             Total tokens:   {total_tokens}\n\
             Estimated cost: ${estimated_cost_usd:.6} USD\n\
             ====================================================="
        );
        info!(
            input_tokens,
            output_tokens,
            total_tokens,
            estimated_cost_usd,
            model,
            "token_usage"
        );

        UsageSummary {
            input_tokens,
            output_tokens,
            total_tokens,
            estimated_cost_usd,
            model: model.to_string(),
        }
    }

    #[cfg(test)]
    fn cached_entries(&self) -> usize {
        self.cache.lock().map(|c| c.len()).unwrap_or(0)
    }
}

impl Default for TokenAccountant {
    fn default() -> Self {
        Self::new()
    }
}

fn hash_text(text: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    text.hash(&mut hasher);
    hasher.finish()
}
