//! The question pipeline.
//!
//! A question flows through a three-node graph:
//!
//! 1. **decide**: the model sees the question with the `retrieve` tool bound
//! 2. **retrieve**: runs only if the model asked for it; fragments land in
//!    the state as a tool message and the count in the request context
//! 3. **generate**: the [`AnswerComposer`] grounds the model in the
//!    retrieved text, or refuses, or apologizes
//!
//! [`QuestionPipeline`] wraps the graph with timing, token accounting and
//! persistence of one consultation per question.

pub mod composer;
pub mod graph;
pub mod pipeline;
pub mod prompt_provider;
pub mod state;

pub use composer::{AnswerComposer, Composition, ReplyKind, APOLOGY_TEXT, REFUSAL_TEXT};
pub use graph::{GraphOutcome, Node, QuestionGraph};
pub use pipeline::{AnalysisMetadata, AnalysisResponse, QuestionPipeline, QuestionRequest};
pub use prompt_provider::{HARD_CODED_PROMPT, PromptProvider};
pub use state::{Failure, FailureKind, GraphState, RequestContext};

#[cfg(test)]
pub(crate) mod test_helpers;
