//! Grounded answer composition: the generate step.
//!
//! The composer resolves the system prompt, counts the three input
//! components once, decides between a model answer, the refusal and the
//! apology, and tags model answers with the prompt provenance.

use crate::prompt_provider::PromptProvider;
use crate::state::{Failure, FailureKind, GraphState};
use simap_core::message::Message;
use simap_core::prompt::PromptProvenance;
use simap_core::provider::{Provider, ProviderRequest};
use simap_telemetry::TokenAccountant;
use std::borrow::Cow;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Returned when the knowledge base has nothing that matches the question.
pub const REFUSAL_TEXT: &str =
    "Lo siento, no tengo información suficiente para responder esa pregunta.";

/// Returned when an upstream service failed.
pub const APOLOGY_TEXT: &str = "Lo siento, en este momento no puedo procesar tu consulta por un \
problema técnico. Por favor, intentá nuevamente en unos minutos.";

/// Appended where the system content was cut to the word budget.
pub const TRUNCATION_MARKER: &str = "\n\n[... contenido truncado por exceder el límite de palabras ...]";

pub const DEFAULT_WORD_BUDGET: usize = 10_000;

/// Lowercased, whitespace-separated question terms, punctuation included.
pub fn question_terms(question: &str) -> Vec<String> {
    question
        .to_lowercase()
        .split_whitespace()
        .map(String::from)
        .collect()
}

/// True when some question term occurs verbatim in `docs`. A question
/// with no terms never passes.
pub fn passes_term_guard(question: &str, docs: &str) -> bool {
    question_terms(question)
        .iter()
        .any(|t| docs.contains(t.as_str()))
}

/// Cut `text` after `budget` whitespace-separated words and append the
/// truncation marker. Text within budget is returned unchanged.
pub fn enforce_word_budget(text: &str, budget: usize) -> Cow<'_, str> {
    let mut words = 0usize;
    let mut in_word = false;
    for (i, c) in text.char_indices() {
        if c.is_whitespace() {
            in_word = false;
        } else if !in_word {
            in_word = true;
            words += 1;
            if words > budget {
                return Cow::Owned(format!("{}{}", text[..i].trim_end(), TRUNCATION_MARKER));
            }
        }
    }
    Cow::Borrowed(text)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyKind {
    /// Generated by the model from retrieved context.
    Answer,
    Refusal,
    Apology,
}

/// The generate step's result.
#[derive(Debug, Clone)]
pub struct Composition {
    /// Final text; model answers end with `\nvp:<provenance>`.
    pub reply: String,
    pub kind: ReplyKind,
    pub provenance: PromptProvenance,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub failure: Option<Failure>,
}

pub struct AnswerComposer {
    provider: Arc<dyn Provider>,
    prompts: Arc<PromptProvider>,
    accountant: Arc<TokenAccountant>,
    model: String,
    temperature: f32,
    max_tokens: Option<u32>,
    word_budget: usize,
}

impl AnswerComposer {
    pub fn new(
        provider: Arc<dyn Provider>,
        prompts: Arc<PromptProvider>,
        accountant: Arc<TokenAccountant>,
        model: impl Into<String>,
        temperature: f32,
    ) -> Self {
        Self {
            provider,
            prompts,
            accountant,
            model: model.into(),
            temperature,
            max_tokens: None,
            word_budget: DEFAULT_WORD_BUDGET,
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: Option<u32>) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_word_budget(mut self, budget: usize) -> Self {
        self.word_budget = budget.max(1);
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub async fn compose(&self, state: &GraphState) -> Composition {
        let prompt = self.prompts.current_prompt().await;
        let docs_content = state.docs_content();
        let question_context = state
            .conversation()
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n");

        let input_tokens = self.accountant.count(&question_context, &self.model)
            + self.accountant.count(&prompt.content, &self.model)
            + self.accountant.count(&docs_content, &self.model);

        let (text, kind, failure) = self.reply(state, &prompt.content, &docs_content).await;
        let output_tokens = self.accountant.count(&text, &self.model);

        let reply = match kind {
            ReplyKind::Answer => format!("{text}\nvp:{}", prompt.provenance),
            ReplyKind::Refusal | ReplyKind::Apology => text,
        };

        Composition {
            reply,
            kind,
            provenance: prompt.provenance,
            input_tokens,
            output_tokens,
            failure,
        }
    }

    async fn reply(
        &self,
        state: &GraphState,
        prompt: &str,
        docs_content: &str,
    ) -> (String, ReplyKind, Option<Failure>) {
        if let Some(failure) = &state.ctx.failure {
            let kind = match failure.kind {
                FailureKind::CollectionMissing => ReplyKind::Refusal,
                FailureKind::LlmUnavailable | FailureKind::StoreUnavailable => ReplyKind::Apology,
            };
            return (canned(kind), kind, Some(failure.clone()));
        }

        if state.ctx.document_count == 0 {
            info!("No fragments retrieved, refusing");
            return (REFUSAL_TEXT.to_string(), ReplyKind::Refusal, None);
        }

        if !passes_term_guard(state.question(), docs_content) {
            info!(
                document_count = state.ctx.document_count,
                "No question term found in retrieved context, refusing"
            );
            return (REFUSAL_TEXT.to_string(), ReplyKind::Refusal, None);
        }

        let system_content = format!("{prompt}\n\n{docs_content}");
        let system_content = enforce_word_budget(&system_content, self.word_budget);
        if let Cow::Owned(_) = system_content {
            warn!(word_budget = self.word_budget, "System content truncated to word budget");
        }

        let mut messages = vec![Message::system(system_content.into_owned())];
        messages.extend(state.conversation().cloned());

        let request = ProviderRequest {
            model: self.model.clone(),
            messages,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            tools: vec![],
        };

        debug!(model = %self.model, "Generating grounded answer");
        match self.provider.complete(request).await {
            Ok(response) => (response.message.content, ReplyKind::Answer, None),
            Err(e) => {
                warn!(error = %e, "Generate step failed");
                (
                    APOLOGY_TEXT.to_string(),
                    ReplyKind::Apology,
                    Some(Failure::new(FailureKind::LlmUnavailable, e.to_string())),
                )
            }
        }
    }
}

fn canned(kind: ReplyKind) -> String {
    match kind {
        ReplyKind::Refusal => REFUSAL_TEXT.to_string(),
        ReplyKind::Answer | ReplyKind::Apology => APOLOGY_TEXT.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{SequentialMockProvider, StaticPrompts, make_text_response};
    use simap_config::PromptConfig;
    use simap_core::error::ProviderError;
    use simap_core::message::Role;

    fn composer(provider: Arc<SequentialMockProvider>) -> AnswerComposer {
        let prompts = PromptProvider::new(
            Some(Arc::new(StaticPrompts::active(3, "Reglas del asistente."))),
            &PromptConfig::default(),
        );
        AnswerComposer::new(
            provider,
            Arc::new(prompts),
            Arc::new(TokenAccountant::new()),
            "gpt-4o-mini",
            0.0,
        )
    }

    fn state_with_docs(question: &str, docs: &str, count: usize) -> GraphState {
        let mut state = GraphState::new(question);
        state.push(Message::tool_result("call_retrieve", docs));
        state.ctx.document_count = count;
        state
    }

    #[test]
    fn terms_keep_short_words_and_punctuation() {
        assert_eq!(
            question_terms("¿Cómo tramitar la Insulina?"),
            vec!["¿cómo", "tramitar", "la", "insulina?"]
        );
        assert!(question_terms("  \n ").is_empty());
    }

    #[test]
    fn guard_matches_lowercased_terms_as_substrings() {
        assert!(passes_term_guard("Tramitar INSULINA", "FRAGMENT: entrega de insulina glargina"));
        assert!(!passes_term_guard("INSULINA", "FRAGMENT: Entrega de INSULINA glargina"));
        // Short words count like any other term.
        assert!(passes_term_guard("¿Cuál es el clima?", "FRAGMENT: historia médica del afiliado"));
        assert!(!passes_term_guard(
            "¿Pronóstico climático porteño?",
            "FRAGMENT: Pensión no contributiva por vejez"
        ));
    }

    #[test]
    fn acronym_only_question_needs_a_match() {
        assert!(!passes_term_guard("¿Qué es PMO?", "FRAGMENT: Pensión no contributiva por vejez"));
        assert!(!passes_term_guard("", "FRAGMENT: Pensión no contributiva por vejez"));
        assert!(passes_term_guard("PMO", "FRAGMENT: alta en el pmo"));
    }

    #[test]
    fn word_budget_truncates_and_marks() {
        assert_eq!(enforce_word_budget("uno dos tres", 3), "uno dos tres");
        let cut = enforce_word_budget("uno dos\ntres cuatro", 2);
        assert_eq!(cut, format!("uno dos{TRUNCATION_MARKER}"));
        let long = "palabra ".repeat(10_050);
        let cut = enforce_word_budget(&long, DEFAULT_WORD_BUDGET);
        assert!(cut.ends_with(TRUNCATION_MARKER));
        assert_eq!(
            cut.trim_end_matches(TRUNCATION_MARKER).split_whitespace().count(),
            DEFAULT_WORD_BUDGET
        );
    }

    #[tokio::test]
    async fn answer_is_tagged_and_counted() {
        let provider = Arc::new(SequentialMockProvider::new(vec![Ok(make_text_response(
            "Para la insulina glargina presentá la receta electrónica.",
        ))]));
        let composer = composer(provider.clone());
        let docs = "FRAGMENT: Insulina glargina\nMETADATA: {}";
        let state = state_with_docs("¿Cómo tramitar la insulina?", docs, 1);

        let composition = composer.compose(&state).await;
        assert_eq!(composition.kind, ReplyKind::Answer);
        assert!(composition.reply.ends_with("\nvp:database:3"));

        let accountant = TokenAccountant::new();
        let expected = accountant.count("¿Cómo tramitar la insulina?", "gpt-4o-mini")
            + accountant.count("Reglas del asistente.", "gpt-4o-mini")
            + accountant.count(docs, "gpt-4o-mini");
        assert_eq!(composition.input_tokens, expected);
        assert_eq!(
            composition.output_tokens,
            accountant.count("Para la insulina glargina presentá la receta electrónica.", "gpt-4o-mini")
        );

        let request = provider.request(0);
        assert!(request.tools.is_empty());
        assert_eq!(request.messages[0].role, Role::System);
        assert!(request.messages[0].content.starts_with("Reglas del asistente.\n\nFRAGMENT:"));
        assert_eq!(request.messages.len(), 2);
        assert_eq!(request.messages[1].role, Role::User);
    }

    #[tokio::test]
    async fn off_topic_question_is_refused_without_llm_call() {
        let provider = Arc::new(SequentialMockProvider::new(vec![]));
        let state = state_with_docs(
            "¿Pronóstico climático porteño?",
            "FRAGMENT: Pensión no contributiva por vejez",
            4,
        );
        let composition = composer(provider.clone()).compose(&state).await;
        assert_eq!(composition.reply, REFUSAL_TEXT);
        assert_eq!(composition.kind, ReplyKind::Refusal);
        assert!(composition.input_tokens > 0);
        assert_eq!(provider.call_count(), 0);
    }

    #[tokio::test]
    async fn zero_fragments_refuse_even_if_sentinel_matches() {
        let provider = Arc::new(SequentialMockProvider::new(vec![]));
        let state = state_with_docs(
            "¿Hay información?",
            simap_retrieval::NO_RESULTS_SENTINEL,
            0,
        );
        let composition = composer(provider).compose(&state).await;
        assert_eq!(composition.reply, REFUSAL_TEXT);
        assert!(composition.failure.is_none());
    }

    #[tokio::test]
    async fn generate_failure_becomes_apology() {
        let provider = Arc::new(SequentialMockProvider::new(vec![Err(ProviderError::Timeout(
            "60s".into(),
        ))]));
        let state = state_with_docs("¿Entrega de insulina?", "FRAGMENT: insulina", 1);
        let composition = composer(provider).compose(&state).await;
        assert_eq!(composition.reply, APOLOGY_TEXT);
        let failure = composition.failure.unwrap();
        assert_eq!(failure.kind, FailureKind::LlmUnavailable);
        assert!(failure.message.contains("60s"));
    }

    #[tokio::test]
    async fn missing_collection_refuses_with_failure() {
        let provider = Arc::new(SequentialMockProvider::new(vec![]));
        let mut state = GraphState::new("¿Insulina?");
        state
            .ctx
            .fail(Failure::new(FailureKind::CollectionMissing, "simap_servicios"));
        let composition = composer(provider).compose(&state).await;
        assert_eq!(composition.reply, REFUSAL_TEXT);
        assert_eq!(composition.failure.unwrap().kind, FailureKind::CollectionMissing);
    }
}
