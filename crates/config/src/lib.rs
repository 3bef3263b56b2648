//! Configuration loading and validation for the SIMAP service.
//!
//! Loads `simap.toml` (or the file named by `--config` / `SIMAP_CONFIG`)
//! and applies environment variable overrides on top. Environment always
//! wins. Everything is validated once at startup.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Default config file name, looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "simap.toml";

/// The root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Chat-completion and embedding provider
    #[serde(default)]
    pub llm: LlmConfig,

    /// Semantic search backend holding the SIMAP fragments
    #[serde(default)]
    pub vector_store: VectorStoreConfig,

    /// Relational store for consultations and prompts
    #[serde(default)]
    pub database: DatabaseConfig,

    /// System prompt fallback file
    #[serde(default)]
    pub prompt: PromptConfig,

    /// Grounded prompt assembly
    #[serde(default)]
    pub composer: ComposerConfig,

    /// Backoff policies for outbound calls
    #[serde(default)]
    pub retry: RetrySection,

    /// HTTP listener
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Values used when the request omits them
    #[serde(default)]
    pub defaults: DefaultsConfig,
}

/// Redact a secret for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

// ── LLM ──

#[derive(Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "default_llm_base_url")]
    pub base_url: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default)]
    pub temperature: f32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,

    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,
}

fn default_llm_base_url() -> String {
    "https://api.openai.com/v1".into()
}
fn default_model() -> String {
    "gpt-4o-mini".into()
}
fn default_embedding_model() -> String {
    "text-embedding-3-small".into()
}
fn default_llm_timeout() -> u64 {
    60
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: default_llm_base_url(),
            api_key: None,
            model: default_model(),
            temperature: 0.0,
            max_tokens: None,
            embedding_model: default_embedding_model(),
            timeout_secs: default_llm_timeout(),
        }
    }
}

impl std::fmt::Debug for LlmConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &redact(&self.api_key))
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("embedding_model", &self.embedding_model)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

// ── Vector store ──

#[derive(Clone, Serialize, Deserialize)]
pub struct VectorStoreConfig {
    #[serde(default = "default_qdrant_url")]
    pub url: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_collection")]
    pub collection: String,

    /// Top-k per query. Never taken from the request.
    #[serde(default = "default_max_results")]
    pub max_results: usize,

    /// Payload key holding the fragment text
    #[serde(default = "default_content_key")]
    pub content_key: String,

    /// Payload key holding the metadata map
    #[serde(default = "default_metadata_key")]
    pub metadata_key: String,

    #[serde(default = "default_vector_timeout")]
    pub timeout_secs: u64,
}

fn default_qdrant_url() -> String {
    "http://localhost:6333".into()
}
fn default_collection() -> String {
    "simap_servicios".into()
}
fn default_max_results() -> usize {
    4
}
fn default_content_key() -> String {
    "page_content".into()
}
fn default_metadata_key() -> String {
    "metadata".into()
}
fn default_vector_timeout() -> u64 {
    30
}

impl Default for VectorStoreConfig {
    fn default() -> Self {
        Self {
            url: default_qdrant_url(),
            api_key: None,
            collection: default_collection(),
            max_results: default_max_results(),
            content_key: default_content_key(),
            metadata_key: default_metadata_key(),
            timeout_secs: default_vector_timeout(),
        }
    }
}

impl std::fmt::Debug for VectorStoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VectorStoreConfig")
            .field("url", &self.url)
            .field("api_key", &redact(&self.api_key))
            .field("collection", &self.collection)
            .field("max_results", &self.max_results)
            .field("content_key", &self.content_key)
            .field("metadata_key", &self.metadata_key)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

// ── Database ──

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseBackend {
    /// MySQL first, embedded SQLite file if the server is unreachable
    Mysql,
    /// Embedded SQLite file only
    Sqlite,
}

impl std::str::FromStr for DatabaseBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mysql" => Ok(DatabaseBackend::Mysql),
            "sqlite" => Ok(DatabaseBackend::Sqlite),
            other => Err(ConfigError::ValidationError(format!(
                "database backend must be 'mysql' or 'sqlite', got '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_backend")]
    pub backend: DatabaseBackend,

    #[serde(default)]
    pub mysql: MysqlConfig,

    #[serde(default = "default_sqlite_path")]
    pub sqlite_path: PathBuf,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_backend() -> DatabaseBackend {
    DatabaseBackend::Mysql
}
fn default_sqlite_path() -> PathBuf {
    PathBuf::from("data/consultas.db")
}
fn default_max_connections() -> u32 {
    5
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            mysql: MysqlConfig::default(),
            sqlite_path: default_sqlite_path(),
            max_connections: default_max_connections(),
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct MysqlConfig {
    #[serde(default = "default_mysql_host")]
    pub host: String,

    #[serde(default = "default_mysql_port")]
    pub port: u16,

    #[serde(default = "default_mysql_database")]
    pub database: String,

    #[serde(default = "default_mysql_user")]
    pub user: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,

    /// Seconds to wait for the server before falling back to SQLite
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

fn default_mysql_host() -> String {
    "localhost".into()
}
fn default_mysql_port() -> u16 {
    3306
}
fn default_mysql_database() -> String {
    "simap".into()
}
fn default_mysql_user() -> String {
    "simap".into()
}
fn default_connect_timeout() -> u64 {
    5
}

impl Default for MysqlConfig {
    fn default() -> Self {
        Self {
            host: default_mysql_host(),
            port: default_mysql_port(),
            database: default_mysql_database(),
            user: default_mysql_user(),
            password: None,
            connect_timeout_secs: default_connect_timeout(),
        }
    }
}

impl std::fmt::Debug for MysqlConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MysqlConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &redact(&self.password))
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .finish()
    }
}

// ── Prompt / composer ──

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptConfig {
    /// File name (or path) of the fallback system prompt
    #[serde(default = "default_prompt_file")]
    pub fallback_file: PathBuf,

    /// Directories searched, in order, when `fallback_file` is relative
    #[serde(default = "default_search_dirs")]
    pub search_dirs: Vec<PathBuf>,
}

fn default_prompt_file() -> PathBuf {
    PathBuf::from("system_prompt.txt")
}
fn default_search_dirs() -> Vec<PathBuf> {
    vec![
        PathBuf::from("."),
        PathBuf::from("prompts"),
        PathBuf::from("config"),
    ]
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            fallback_file: default_prompt_file(),
            search_dirs: default_search_dirs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComposerConfig {
    /// Maximum whitespace-separated words in the system message
    #[serde(default = "default_word_budget")]
    pub word_budget: usize,

    /// Model family prefix → `tokenizer.json` path for exact counts
    #[serde(default)]
    pub tokenizer_files: HashMap<String, PathBuf>,
}

fn default_word_budget() -> usize {
    10_000
}

impl Default for ComposerConfig {
    fn default() -> Self {
        Self {
            word_budget: default_word_budget(),
            tokenizer_files: HashMap::new(),
        }
    }
}

// ── Retry ──

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Base of the exponential: wait = multiplier * 2^(attempt-1)
    #[serde(default = "default_multiplier_ms")]
    pub multiplier_ms: u64,

    pub min_wait_ms: u64,

    pub max_wait_ms: u64,
}

fn default_max_attempts() -> u32 {
    5
}
fn default_multiplier_ms() -> u64 {
    1000
}

impl RetryConfig {
    pub fn llm_default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            multiplier_ms: default_multiplier_ms(),
            min_wait_ms: 4_000,
            max_wait_ms: 60_000,
        }
    }

    pub fn vector_store_default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            multiplier_ms: default_multiplier_ms(),
            min_wait_ms: 2_000,
            max_wait_ms: 30_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrySection {
    /// Chat completions and embeddings
    #[serde(default = "RetryConfig::llm_default")]
    pub llm: RetryConfig,

    #[serde(default = "RetryConfig::vector_store_default")]
    pub vector_store: RetryConfig,
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            llm: RetryConfig::llm_default(),
            vector_store: RetryConfig::vector_store_default(),
        }
    }
}

// ── Gateway / defaults ──

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "127.0.0.1".into()
}
fn default_port() -> u16 {
    8000
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    #[serde(default = "default_user_id")]
    pub user_id: i64,

    #[serde(default = "default_unit")]
    pub unit: String,
}

fn default_user_id() -> i64 {
    321
}
fn default_unit() -> String {
    "Formosa".into()
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            user_id: default_user_id(),
            unit: default_unit(),
        }
    }
}

impl AppConfig {
    /// Load configuration with environment overrides.
    ///
    /// The file is `explicit` if given, else `SIMAP_CONFIG`, else
    /// `./simap.toml`. A missing file yields defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let path = match explicit {
            Some(p) => p.to_path_buf(),
            None => std::env::var("SIMAP_CONFIG")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_FILE)),
        };
        let mut config = Self::load_from(&path)?;
        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path, without env overrides.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from `lookup` (the process environment in production).
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("OPENAI_API_KEY") {
            self.llm.api_key = Some(v);
        }
        if let Some(v) = lookup("SIMAP_LLM_BASE_URL") {
            self.llm.base_url = v;
        }
        if let Some(v) = lookup("SIMAP_LLM_MODEL") {
            self.llm.model = v;
        }
        if let Some(v) = lookup("SIMAP_EMBEDDING_MODEL") {
            self.llm.embedding_model = v;
        }

        if let Some(v) = lookup("SIMAP_QDRANT_URL") {
            self.vector_store.url = v;
        }
        if let Some(v) = lookup("SIMAP_QDRANT_API_KEY") {
            self.vector_store.api_key = Some(v);
        }
        if let Some(v) = lookup("SIMAP_QDRANT_COLLECTION") {
            self.vector_store.collection = v;
        }
        if let Some(v) = lookup("SIMAP_MAX_RESULTS") {
            self.vector_store.max_results = parse_env("SIMAP_MAX_RESULTS", &v)?;
        }

        if let Some(v) = lookup("SIMAP_DB_BACKEND") {
            self.database.backend = v.parse()?;
        }
        if let Some(v) = lookup("SIMAP_MYSQL_HOST") {
            self.database.mysql.host = v;
        }
        if let Some(v) = lookup("SIMAP_MYSQL_PORT") {
            self.database.mysql.port = parse_env("SIMAP_MYSQL_PORT", &v)?;
        }
        if let Some(v) = lookup("SIMAP_MYSQL_DATABASE") {
            self.database.mysql.database = v;
        }
        if let Some(v) = lookup("SIMAP_MYSQL_USER") {
            self.database.mysql.user = v;
        }
        if let Some(v) = lookup("SIMAP_MYSQL_PASSWORD") {
            self.database.mysql.password = Some(v);
        }
        if let Some(v) = lookup("SIMAP_SQLITE_PATH") {
            self.database.sqlite_path = PathBuf::from(v);
        }

        if let Some(v) = lookup("SIMAP_PROMPT_FILE") {
            self.prompt.fallback_file = PathBuf::from(v);
        }
        if let Some(v) = lookup("SIMAP_WORD_BUDGET") {
            self.composer.word_budget = parse_env("SIMAP_WORD_BUDGET", &v)?;
        }
        if let Some(v) = lookup("SIMAP_HOST") {
            self.gateway.host = v;
        }
        if let Some(v) = lookup("SIMAP_PORT") {
            self.gateway.port = parse_env("SIMAP_PORT", &v)?;
        }
        Ok(())
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=2.0).contains(&self.llm.temperature) {
            return Err(ConfigError::ValidationError(
                "llm.temperature must be between 0.0 and 2.0".into(),
            ));
        }
        if self.vector_store.max_results == 0 {
            return Err(ConfigError::ValidationError(
                "vector_store.max_results must be at least 1".into(),
            ));
        }
        if self.composer.word_budget == 0 {
            return Err(ConfigError::ValidationError(
                "composer.word_budget must be at least 1".into(),
            ));
        }
        for (name, retry) in [("llm", &self.retry.llm), ("vector_store", &self.retry.vector_store)] {
            if retry.max_attempts == 0 {
                return Err(ConfigError::ValidationError(format!(
                    "retry.{name}.max_attempts must be at least 1"
                )));
            }
            if retry.min_wait_ms > retry.max_wait_ms {
                return Err(ConfigError::ValidationError(format!(
                    "retry.{name}.min_wait_ms must not exceed max_wait_ms"
                )));
            }
        }
        Ok(())
    }

    /// Check if an LLM API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.llm.api_key.as_deref().is_some_and(|k| !k.is_empty())
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::ValidationError(format!("{key} has an invalid value: '{value}'")))
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.llm.model, "gpt-4o-mini");
        assert_eq!(config.vector_store.max_results, 4);
        assert_eq!(config.vector_store.collection, "simap_servicios");
        assert_eq!(config.composer.word_budget, 10_000);
        assert_eq!(config.defaults.user_id, 321);
        assert_eq!(config.defaults.unit, "Formosa");
        assert_eq!(config.retry.llm.min_wait_ms, 4_000);
        assert_eq!(config.retry.vector_store.max_wait_ms, 30_000);
    }

    #[test]
    fn missing_config_file_returns_defaults() {
        let config = AppConfig::load_from(Path::new("/nonexistent/simap.toml")).unwrap();
        assert_eq!(config.database.backend, DatabaseBackend::Mysql);
    }

    #[test]
    fn partial_file_keeps_section_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("simap.toml");
        std::fs::write(
            &path,
            r#"
[vector_store]
collection = "pruebas"
max_results = 6

[database]
backend = "sqlite"
sqlite_path = "/tmp/simap.db"

[retry.llm]
max_attempts = 3
min_wait_ms = 100
max_wait_ms = 200
"#,
        )
        .unwrap();

        let config = AppConfig::load_from(&path).unwrap();
        assert_eq!(config.vector_store.collection, "pruebas");
        assert_eq!(config.vector_store.max_results, 6);
        assert_eq!(config.vector_store.content_key, "page_content");
        assert_eq!(config.database.backend, DatabaseBackend::Sqlite);
        assert_eq!(config.retry.llm.max_attempts, 3);
        assert_eq!(config.retry.llm.multiplier_ms, 1000);
        assert_eq!(config.retry.vector_store.min_wait_ms, 2_000);
    }

    #[test]
    fn unparseable_file_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("simap.toml");
        std::fs::write(&path, "[llm\nmodel = ").unwrap();
        assert!(matches!(
            AppConfig::load_from(&path),
            Err(ConfigError::ParseError { .. })
        ));
    }

    #[test]
    fn environment_wins_over_file() {
        let mut config = AppConfig::default();
        config.llm.model = "gpt-3.5-turbo".into();
        config
            .apply_env_overrides(env(&[
                ("OPENAI_API_KEY", "sk-test"),
                ("SIMAP_LLM_MODEL", "gpt-4"),
                ("SIMAP_MAX_RESULTS", "8"),
                ("SIMAP_DB_BACKEND", "SQLite"),
                ("SIMAP_MYSQL_PORT", "3307"),
                ("SIMAP_WORD_BUDGET", "500"),
                ("SIMAP_PORT", "9000"),
            ]))
            .unwrap();
        assert!(config.has_api_key());
        assert_eq!(config.llm.model, "gpt-4");
        assert_eq!(config.vector_store.max_results, 8);
        assert_eq!(config.database.backend, DatabaseBackend::Sqlite);
        assert_eq!(config.database.mysql.port, 3307);
        assert_eq!(config.composer.word_budget, 500);
        assert_eq!(config.gateway.port, 9000);
    }

    #[test]
    fn bad_env_values_are_rejected() {
        let mut config = AppConfig::default();
        assert!(config
            .apply_env_overrides(env(&[("SIMAP_DB_BACKEND", "postgres")]))
            .is_err());
        assert!(config
            .apply_env_overrides(env(&[("SIMAP_MAX_RESULTS", "muchos")]))
            .is_err());
    }

    #[test]
    fn invalid_values_fail_validation() {
        let mut config = AppConfig::default();
        config.llm.temperature = 5.0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.vector_store.max_results = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.retry.vector_store.min_wait_ms = 90_000;
        assert!(config.validate().is_err());
    }

    #[test]
    fn debug_output_redacts_secrets() {
        let mut config = AppConfig::default();
        config.llm.api_key = Some("sk-secret".into());
        config.database.mysql.password = Some("hunter2".into());
        let dbg = format!("{config:?}");
        assert!(!dbg.contains("sk-secret"));
        assert!(!dbg.contains("hunter2"));
        assert!(dbg.contains("[REDACTED]"));
    }
}
