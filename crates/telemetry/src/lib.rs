//! Token accounting and cost estimation.
//!
//! [`TokenAccountant`] counts tokens for a model (exactly when a tokenizer
//! for its family is loaded, approximately otherwise) and logs the
//! per-request usage block. [`ModelFamily`] carries the cost table.

pub mod pricing;
pub mod tokens;

pub use pricing::{ModelFamily, Rate};
pub use tokens::{TokenAccountant, UsageSummary, approximate_tokens};
