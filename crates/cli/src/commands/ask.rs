//! `simap ask`: Answer one question from the command line.

use crate::services;
use simap_agent::QuestionRequest;
use std::path::Path;

pub async fn run(
    config_path: Option<&Path>,
    question: String,
    user_id: Option<i64>,
    unit: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let question = question.trim().to_string();
    if question.is_empty() {
        return Err("question must not be empty".into());
    }

    let config = services::load_config(config_path)?;
    let db = services::open_database(&config).await?;
    let pipeline = services::build_pipeline(
        &config,
        services::llm_provider(&config)?,
        services::vector_store(&config)?,
        db.clone(),
    );

    let mut request = QuestionRequest::new(question);
    request.user_id = user_id;
    request.unit = unit;

    let response = pipeline.handle(request).await;
    println!("{}", serde_json::to_string_pretty(&response)?);

    db.close().await;
    Ok(())
}
