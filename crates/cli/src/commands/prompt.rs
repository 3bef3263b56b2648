//! `simap prompt activate`: Load a system prompt into the database.

use crate::services;
use simap_core::prompt::PromptRepository;
use std::path::Path;

pub async fn activate(
    config_path: Option<&Path>,
    file: &Path,
    name: &str,
    version: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let content = std::fs::read_to_string(file)
        .map_err(|e| format!("Failed to read {}: {e}", file.display()))?;
    if content.trim().is_empty() {
        return Err(format!("{} is empty", file.display()).into());
    }

    let config = services::load_config(config_path)?;
    let db = services::open_database(&config).await?;
    let id = db.activate_prompt(name, content.trim(), version).await?;

    println!("Prompt '{name}' v{version} is now active (id {id}, {})", db.driver());
    db.close().await;
    Ok(())
}
