//! Configuration loading, validation, and management for Storyloom.
//!
//! Loads configuration from `~/.storyloom/config.toml` with environment
//! variable overrides. Range checks run at load time; provider completeness
//! (API key, base URL, model) is checked by [`AppConfig::require_llm`] and
//! [`AppConfig::require_embedding`] right before a stage needs them.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.storyloom/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Text generation backend
    #[serde(default)]
    pub llm: LlmConfig,

    /// Embedding backend used by the knowledge store
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Context assembly and retrieval settings
    #[serde(default)]
    pub retrieval: RetrievalConfig,

    /// Defaults for generation parameters
    #[serde(default)]
    pub generation: GenerationConfig,
}

fn default_provider() -> String {
    "openai".into()
}
fn default_model() -> String {
    "gpt-4o-mini".into()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_tokens() -> u32 {
    8192
}
fn default_timeout_secs() -> u64 {
    600
}
fn default_embedding_model() -> String {
    "text-embedding-ada-002".into()
}
fn default_embedding_timeout_secs() -> u64 {
    120
}

/// Redact a secret for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Provider selector: "openai", "anthropic", "deepseek", "ollama", or any
    /// OpenAI-compatible name paired with `base_url`.
    #[serde(default = "default_provider")]
    pub provider: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            api_key: None,
            base_url: None,
            model: default_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl std::fmt::Debug for LlmConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmConfig")
            .field("provider", &self.provider)
            .field("api_key", &redact(&self.api_key))
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    #[serde(default = "default_embedding_model")]
    pub model: String,

    #[serde(default = "default_embedding_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            api_key: None,
            base_url: None,
            model: default_embedding_model(),
            timeout_secs: default_embedding_timeout_secs(),
        }
    }
}

impl std::fmt::Debug for EmbeddingConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddingConfig")
            .field("provider", &self.provider)
            .field("api_key", &redact(&self.api_key))
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Knowledge store hits per draft
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// Maximum characters per knowledge chunk
    #[serde(default = "default_chunk_chars")]
    pub chunk_chars: usize,

    /// How many preceding chapters feed the draft context
    #[serde(default = "default_recent_chapters")]
    pub recent_chapters: usize,

    /// Character budget for the preceding-chapter text
    #[serde(default = "default_recent_budget")]
    pub recent_chapter_budget: usize,

    /// Characters quoted from the end of the previous chapter
    #[serde(default = "default_tail_excerpt")]
    pub tail_excerpt_chars: usize,
}

fn default_top_k() -> usize {
    4
}
fn default_chunk_chars() -> usize {
    500
}
fn default_recent_chapters() -> usize {
    3
}
fn default_recent_budget() -> usize {
    6000
}
fn default_tail_excerpt() -> usize {
    800
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            chunk_chars: default_chunk_chars(),
            recent_chapters: default_recent_chapters(),
            recent_chapter_budget: default_recent_budget(),
            tail_excerpt_chars: default_tail_excerpt(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    #[serde(default = "default_chapters")]
    pub chapters: u32,

    #[serde(default = "default_words")]
    pub words_per_chapter: u32,

    #[serde(default = "default_genre")]
    pub genre: String,

    /// Output language for chapter text; empty = follow the prompt language
    #[serde(default)]
    pub language: String,
}

fn default_chapters() -> u32 {
    10
}
fn default_words() -> u32 {
    3000
}
fn default_genre() -> String {
    "fantasy".into()
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            chapters: default_chapters(),
            words_per_chapter: default_words(),
            genre: default_genre(),
            language: String::new(),
        }
    }
}

/// Fully-resolved connection settings for one backend.
#[derive(Clone)]
pub struct Endpoint {
    pub provider: String,
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub timeout_secs: u64,
}

impl std::fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Endpoint")
            .field("provider", &self.provider)
            .field("api_key", &"[REDACTED]")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

/// Providers that run locally and need no API key.
fn is_keyless(provider: &str) -> bool {
    matches!(provider, "ollama" | "vllm" | "llamacpp" | "llama.cpp" | "lmstudio")
}

/// Default base URL for well-known providers.
pub fn default_base_url(provider: &str) -> Option<&'static str> {
    match provider {
        "openai" => Some("https://api.openai.com/v1"),
        "anthropic" => Some("https://api.anthropic.com"),
        "deepseek" => Some("https://api.deepseek.com/v1"),
        "openrouter" => Some("https://openrouter.ai/api/v1"),
        "groq" => Some("https://api.groq.com/openai/v1"),
        "ollama" => Some("http://localhost:11434/v1"),
        "vllm" => Some("http://localhost:8000/v1"),
        "llamacpp" | "llama.cpp" => Some("http://localhost:8080/v1"),
        "lmstudio" => Some("http://localhost:1234/v1"),
        _ => None,
    }
}

fn resolve_endpoint(
    section: &'static str,
    provider: &str,
    api_key: &Option<String>,
    base_url: &Option<String>,
    model: &str,
    timeout_secs: u64,
) -> Result<Endpoint, ConfigError> {
    let provider = provider.trim().to_lowercase();
    if provider.is_empty() {
        return Err(ConfigError::Missing { section, field: "provider" });
    }

    let api_key = api_key.as_deref().map(str::trim).unwrap_or_default();
    if api_key.is_empty() && !is_keyless(&provider) {
        return Err(ConfigError::Missing { section, field: "api_key" });
    }

    let base_url = match base_url.as_deref().map(str::trim).filter(|u| !u.is_empty()) {
        Some(url) => url.to_string(),
        None => default_base_url(&provider)
            .ok_or(ConfigError::Missing { section, field: "base_url" })?
            .to_string(),
    };
    if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
        return Err(ConfigError::ValidationError(format!(
            "[{section}] base_url must start with http:// or https://"
        )));
    }

    if model.trim().is_empty() {
        return Err(ConfigError::Missing { section, field: "model" });
    }

    Ok(Endpoint {
        provider,
        api_key: api_key.to_string(),
        base_url: base_url.trim_end_matches('/').to_string(),
        model: model.trim().to_string(),
        timeout_secs,
    })
}

impl AppConfig {
    /// Load configuration from the default path (~/.storyloom/config.toml).
    ///
    /// Environment variables override the file:
    /// - `STORYLOOM_API_KEY`, then `OPENAI_API_KEY` (LLM key, if unset)
    /// - `STORYLOOM_PROVIDER`, `STORYLOOM_MODEL`, `STORYLOOM_BASE_URL`
    /// - `STORYLOOM_EMBEDDING_API_KEY` (falls back to the LLM key for the
    ///   same provider)
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        Self::load_from(&config_path)
    }

    /// Load configuration from a specific file path, then apply env overrides.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::read_file(path)?;
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    fn read_file(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    fn apply_env(&mut self) {
        if self.llm.api_key.is_none() {
            self.llm.api_key = std::env::var("STORYLOOM_API_KEY")
                .ok()
                .or_else(|| std::env::var("OPENAI_API_KEY").ok());
        }
        if let Ok(provider) = std::env::var("STORYLOOM_PROVIDER") {
            self.llm.provider = provider;
        }
        if let Ok(model) = std::env::var("STORYLOOM_MODEL") {
            self.llm.model = model;
        }
        if let Ok(url) = std::env::var("STORYLOOM_BASE_URL") {
            self.llm.base_url = Some(url);
        }

        if self.embedding.api_key.is_none() {
            self.embedding.api_key = std::env::var("STORYLOOM_EMBEDDING_API_KEY").ok();
        }
        if self.embedding.api_key.is_none() && self.embedding.provider == self.llm.provider {
            self.embedding.api_key = self.llm.api_key.clone();
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".storyloom")
    }

    /// Validate value ranges. Missing credentials are not an error here.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=2.0).contains(&self.llm.temperature) {
            return Err(ConfigError::ValidationError(
                "llm.temperature must be between 0.0 and 2.0".into(),
            ));
        }
        if self.llm.max_tokens == 0 {
            return Err(ConfigError::ValidationError("llm.max_tokens must be > 0".into()));
        }
        if self.llm.timeout_secs == 0 || self.embedding.timeout_secs == 0 {
            return Err(ConfigError::ValidationError("timeouts must be > 0 seconds".into()));
        }
        if self.retrieval.top_k == 0 {
            return Err(ConfigError::ValidationError("retrieval.top_k must be >= 1".into()));
        }
        if self.retrieval.chunk_chars < 50 {
            return Err(ConfigError::ValidationError(
                "retrieval.chunk_chars must be >= 50".into(),
            ));
        }
        if self.generation.chapters == 0 || self.generation.words_per_chapter == 0 {
            return Err(ConfigError::ValidationError(
                "generation.chapters and generation.words_per_chapter must be >= 1".into(),
            ));
        }
        Ok(())
    }

    /// Resolve the LLM endpoint or report which setting is missing.
    pub fn require_llm(&self) -> Result<Endpoint, ConfigError> {
        resolve_endpoint(
            "llm",
            &self.llm.provider,
            &self.llm.api_key,
            &self.llm.base_url,
            &self.llm.model,
            self.llm.timeout_secs,
        )
    }

    /// Resolve the embedding endpoint or report which setting is missing.
    pub fn require_embedding(&self) -> Result<Endpoint, ConfigError> {
        resolve_endpoint(
            "embedding",
            &self.embedding.provider,
            &self.embedding.api_key,
            &self.embedding.base_url,
            &self.embedding.model,
            self.embedding.timeout_secs,
        )
    }

    /// Generate a default config TOML string (for the `init` command).
    pub fn default_toml() -> String {
        toml::to_string_pretty(&Self::default()).unwrap_or_default()
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
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

    #[error("[{section}] {field} is not set")]
    Missing {
        section: &'static str,
        field: &'static str,
    },
}

impl From<ConfigError> for storyloom_core::Error {
    fn from(err: ConfigError) -> Self {
        storyloom_core::Error::config(err.to_string())
    }
}
