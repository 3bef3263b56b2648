//! `simap serve`: Start the HTTP API server.

use crate::services;
use simap_gateway::AppState;
use std::path::Path;
use std::sync::Arc;

pub async fn run(
    config_path: Option<&Path>,
    host: Option<String>,
    port: Option<u16>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut config =
        services::load_config(config_path).map_err(|e| format!("Failed to load config: {e}"))?;
    if let Some(host) = host {
        config.gateway.host = host;
    }
    if let Some(port) = port {
        config.gateway.port = port;
    }

    if !config.has_api_key() {
        return Err("No LLM API key configured. Set OPENAI_API_KEY or llm.api_key".into());
    }

    let provider = services::llm_provider(&config)?;
    let db = services::open_database(&config).await?;
    let store = services::vector_store(&config)?;
    let pipeline = services::build_pipeline(&config, provider, store, db.clone());

    println!("SIMAP gateway");
    println!("   Listening: {}:{}", config.gateway.host, config.gateway.port);
    println!("   Model:     {}", pipeline.model());
    println!("   Database:  {}", db.driver());
    println!("   Qdrant:    {} ({})", config.vector_store.url, config.vector_store.collection);

    let state = Arc::new(AppState {
        pipeline: Arc::new(pipeline),
        consultations: db.clone(),
        database_driver: db.driver().to_string(),
    });

    let addr = format!("{}:{}", config.gateway.host, config.gateway.port);
    let served = simap_gateway::serve(&addr, state).await;
    db.close().await;
    served
}
