//! Assembles the question pipeline from configuration.

use simap_agent::{AnswerComposer, PromptProvider, QuestionGraph, QuestionPipeline};
use simap_config::AppConfig;
use simap_core::knowledge::VectorStore;
use simap_core::provider::Provider;
use simap_core::tool::ToolRegistry;
use simap_providers::{OpenAiCompatProvider, RetryPolicy, RetryProvider};
use simap_retrieval::{QdrantStore, RetrieveTool, RetryVectorStore, Retriever};
use simap_storage::{ConsultationPersister, Database};
use simap_telemetry::TokenAccountant;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

pub fn load_config(path: Option<&Path>) -> Result<AppConfig, Box<dyn std::error::Error>> {
    Ok(AppConfig::load(path)?)
}

pub async fn open_database(config: &AppConfig) -> Result<Arc<Database>, Box<dyn std::error::Error>> {
    let db = Database::connect(&config.database)
        .await?
        .with_fallback_user(config.defaults.user_id);
    info!(driver = %db.driver(), "Database ready");
    Ok(Arc::new(db))
}

pub fn vector_store(config: &AppConfig) -> Result<Arc<dyn VectorStore>, Box<dyn std::error::Error>> {
    let qdrant = QdrantStore::from_config(&config.vector_store)?;
    Ok(Arc::new(RetryVectorStore::new(
        Arc::new(qdrant),
        RetryPolicy::from(&config.retry.vector_store),
    )))
}

pub fn llm_provider(config: &AppConfig) -> Result<Arc<dyn Provider>, Box<dyn std::error::Error>> {
    let provider = OpenAiCompatProvider::from_config(&config.llm)?;
    Ok(Arc::new(RetryProvider::new(
        Arc::new(provider),
        RetryPolicy::from(&config.retry.llm),
    )))
}

/// Wire provider, store and database into a ready pipeline.
pub fn build_pipeline(
    config: &AppConfig,
    provider: Arc<dyn Provider>,
    store: Arc<dyn VectorStore>,
    db: Arc<Database>,
) -> QuestionPipeline {
    let retriever = Retriever::new(
        provider.clone(),
        store,
        config.llm.embedding_model.clone(),
        config.vector_store.collection.clone(),
        config.vector_store.max_results,
    );
    let mut tools = ToolRegistry::new();
    tools.register(Box::new(RetrieveTool::new(Arc::new(retriever))));

    let accountant = Arc::new(TokenAccountant::with_tokenizer_files(
        &config.composer.tokenizer_files,
    ));
    let prompts = Arc::new(PromptProvider::new(Some(db.clone()), &config.prompt));

    let composer = AnswerComposer::new(
        provider.clone(),
        prompts,
        accountant.clone(),
        config.llm.model.clone(),
        config.llm.temperature,
    )
    .with_max_tokens(config.llm.max_tokens)
    .with_word_budget(config.composer.word_budget);

    let graph = QuestionGraph::new(provider, Arc::new(tools), composer, config.llm.temperature);
    QuestionPipeline::new(
        graph,
        accountant,
        ConsultationPersister::new(db),
        config.defaults.clone(),
    )
}
