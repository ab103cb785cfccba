pub mod validation;

use serde::{Deserialize, Serialize};
use std::fmt;

use self::validation::validate_config;

/// Error type for configuration loading and validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Upstream chat-completions provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    #[default]
    Perplexity,
    OpenAi,
}

impl ProviderKind {
    #[must_use]
    pub fn display_name(self) -> &'static str {
        match self {
            ProviderKind::Perplexity => "Perplexity",
            ProviderKind::OpenAi => "OpenAI",
        }
    }

    #[must_use]
    pub fn default_base_url(self) -> &'static str {
        match self {
            ProviderKind::Perplexity => "https://api.perplexity.ai",
            ProviderKind::OpenAi => "https://api.openai.com/v1",
        }
    }

    #[must_use]
    pub fn default_model(self) -> &'static str {
        match self {
            ProviderKind::Perplexity => "sonar-pro",
            ProviderKind::OpenAi => "gpt-4o-mini-search-preview",
        }
    }

    #[must_use]
    pub fn default_api_key_env(self) -> &'static str {
        match self {
            ProviderKind::Perplexity => "PERPLEXITY_API_KEY",
            ProviderKind::OpenAi => "OPENAI_API_KEY",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderKind::Perplexity => write!(f, "perplexity"),
            ProviderKind::OpenAi => write!(f, "openai"),
        }
    }
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_timeout")]
    pub timeout: u64,
    #[serde(default = "default_http_pool_max_idle_per_host")]
    pub http_pool_max_idle_per_host: usize,
    #[serde(default = "default_http_pool_idle_timeout_secs")]
    pub http_pool_idle_timeout_secs: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime_worker_threads: Option<usize>,
    #[serde(default)]
    pub base_path: String,
    #[serde(default)]
    pub http_use_env_proxy: bool,
}

fn default_port() -> u16 {
    8000
}
fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_timeout() -> u64 {
    180
}
fn default_http_pool_max_idle_per_host() -> usize {
    16
}
fn default_http_pool_idle_timeout_secs() -> u64 {
    15
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
            timeout: default_timeout(),
            http_pool_max_idle_per_host: default_http_pool_max_idle_per_host(),
            http_pool_idle_timeout_secs: default_http_pool_idle_timeout_secs(),
            runtime_worker_threads: None,
            base_path: String::new(),
            http_use_env_proxy: false,
        }
    }
}

/// Upstream provider configuration.
///
/// `base_url`, `model` and `api_key_env` fall back to per-provider defaults
/// when left empty.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default)]
    pub kind: ProviderKind,
    #[serde(default)]
    pub base_url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub api_key_env: Option<String>,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub web_search: bool,
    #[serde(default)]
    pub proxy: Option<String>,
}

impl ProviderConfig {
    #[must_use]
    pub fn effective_base_url(&self) -> &str {
        let trimmed = self.base_url.trim();
        if trimmed.is_empty() {
            self.kind.default_base_url()
        } else {
            trimmed.trim_end_matches('/')
        }
    }

    #[must_use]
    pub fn effective_model(&self) -> &str {
        let trimmed = self.model.trim();
        if trimmed.is_empty() {
            self.kind.default_model()
        } else {
            trimmed
        }
    }

    #[must_use]
    pub fn chat_completions_url(&self) -> String {
        format!("{}/chat/completions", self.effective_base_url())
    }

    #[must_use]
    pub fn api_key_env_name(&self) -> &str {
        self.api_key_env
            .as_deref()
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| self.kind.default_api_key_env())
    }

    /// Resolve the bearer key: explicit `api_key` first, then the env var.
    #[must_use]
    pub fn resolve_api_key(&self) -> Option<String> {
        let explicit = self.api_key.trim();
        if !explicit.is_empty() {
            return Some(explicit.to_string());
        }
        std::env::var(self.api_key_env_name())
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    }
}

/// System prompt prepended to every conversation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PromptConfig {
    #[serde(default)]
    pub system_prompt: Option<String>,
    #[serde(default)]
    pub system_prompt_file: Option<String>,
}

/// Citation filtering and reference block rendering.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CitationConfig {
    #[serde(default = "default_reference_header")]
    pub header: String,
    #[serde(default)]
    pub exclude_domains: Vec<String>,
    #[serde(default)]
    pub trusted_domains: Vec<String>,
    #[serde(default = "default_trusted_label")]
    pub trusted_label: String,
    #[serde(default = "default_other_label")]
    pub other_label: String,
    #[serde(default = "default_true")]
    pub prefer_search_results: bool,
}

fn default_reference_header() -> String {
    "참고문헌:".to_string()
}
fn default_trusted_label() -> String {
    "📚 학술 자료".to_string()
}
fn default_other_label() -> String {
    "🌐 기타 자료".to_string()
}

impl Default for CitationConfig {
    fn default() -> Self {
        Self {
            header: default_reference_header(),
            exclude_domains: Vec::new(),
            trusted_domains: Vec::new(),
            trusted_label: default_trusted_label(),
            other_label: default_other_label(),
            prefer_search_results: true,
        }
    }
}

/// Feature flags and settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeaturesConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_true")]
    pub streaming_fallback: bool,
}

fn default_true() -> bool {
    true
}
fn default_log_level() -> String {
    "INFO".to_string()
}

impl Default for FeaturesConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            streaming_fallback: true,
        }
    }
}

/// Top-level application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub provider: ProviderConfig,
    #[serde(default)]
    pub prompt: PromptConfig,
    #[serde(default)]
    pub citations: CitationConfig,
    #[serde(default)]
    pub features: FeaturesConfig,
}

/// Load configuration from a YAML file and validate it.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] when reading the file fails, [`ConfigError::Yaml`]
/// when parsing fails, or [`ConfigError::Validation`] when semantic validation fails.
pub fn load_config(path: &str) -> Result<AppConfig, ConfigError> {
    let contents = std::fs::read_to_string(path)?;
    let config: AppConfig = serde_yaml::from_str(&contents)?;
    validate_config(&config)?;
    Ok(config)
}

/// Resolve the system prompt text: inline prompt, then prompt file, then the
/// built-in research assistant prompt.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] when `system_prompt_file` cannot be read.
pub fn resolve_system_prompt(prompt: &PromptConfig) -> Result<String, ConfigError> {
    if let Some(inline) = prompt.system_prompt.as_deref() {
        if !inline.trim().is_empty() {
            return Ok(inline.to_string());
        }
    }
    if let Some(path) = prompt.system_prompt_file.as_deref() {
        return Ok(std::fs::read_to_string(path)?);
    }
    Ok(crate::protocol::request::DEFAULT_SYSTEM_PROMPT.to_string())
}
