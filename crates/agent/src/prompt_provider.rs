//! System prompt resolution: database, then fallback file, then built-in.
//!
//! Resolved on every call; operators may rotate the active prompt at any
//! time.

use simap_config::PromptConfig;
use simap_core::prompt::{PromptProvenance, PromptRepository, SystemPrompt};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Minimal prompt used when neither the database nor a file provides one.
pub const HARD_CODED_PROMPT: &str = "Sos un asistente del PAMI especializado en trámites y \
servicios del SIMAP. Respondé únicamente con la información de los fragmentos provistos a \
continuación. Si esa información no alcanza para responder, decilo explícitamente. No inventes \
requisitos, plazos, montos ni procedimientos. Respondé en español, de forma clara y ordenada.";

pub struct PromptProvider {
    repository: Option<Arc<dyn PromptRepository>>,
    fallback_file: PathBuf,
    search_dirs: Vec<PathBuf>,
}

impl PromptProvider {
    pub fn new(repository: Option<Arc<dyn PromptRepository>>, config: &PromptConfig) -> Self {
        Self {
            repository,
            fallback_file: config.fallback_file.clone(),
            search_dirs: config.search_dirs.clone(),
        }
    }

    pub async fn current_prompt(&self) -> SystemPrompt {
        if let Some(repository) = &self.repository {
            match repository.active_prompt().await {
                Ok(Some(row)) if !row.content.trim().is_empty() => {
                    info!(source = "database", id = row.id, name = %row.name, version = %row.version, "System prompt resolved");
                    return SystemPrompt {
                        content: row.content,
                        provenance: PromptProvenance::Database(row.id),
                    };
                }
                Ok(_) => debug!("No active prompt in database"),
                Err(e) => warn!(error = %e, "Active prompt lookup failed"),
            }
        }

        if let Some((path, content)) = self.read_fallback_file() {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string());
            info!(source = "file", path = %path.display(), "System prompt resolved");
            return SystemPrompt {
                content,
                provenance: PromptProvenance::File(name),
            };
        }

        warn!(source = "hard-coded", "System prompt resolved from built-in text");
        SystemPrompt {
            content: HARD_CODED_PROMPT.to_string(),
            provenance: PromptProvenance::HardCoded,
        }
    }

    /// Candidate paths, in search order. An absolute fallback path is the
    /// only candidate.
    fn candidates(&self) -> Vec<PathBuf> {
        if self.fallback_file.is_absolute() || self.search_dirs.is_empty() {
            return vec![self.fallback_file.clone()];
        }
        self.search_dirs
            .iter()
            .map(|dir| dir.join(&self.fallback_file))
            .collect()
    }

    fn read_fallback_file(&self) -> Option<(PathBuf, String)> {
        self.candidates().into_iter().find_map(|path| read_non_empty(&path).map(|c| (path, c)))
    }
}

fn read_non_empty(path: &Path) -> Option<String> {
    match std::fs::read_to_string(path) {
        Ok(content) if !content.trim().is_empty() => Some(content),
        Ok(_) => {
            debug!(path = %path.display(), "Prompt file is empty");
            None
        }
        Err(_) => None,
    }
}
