//! Configuration loading, validation, and management for openloop.
//!
//! Loads configuration from `~/.openloop/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Providers the factory knows how to build.
pub const SUPPORTED_PROVIDERS: &[&str] = &["anthropic", "openai", "ollama"];

/// The root configuration structure.
///
/// Maps directly to `~/.openloop/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// LLM provider: anthropic, openai or ollama
    #[serde(default = "default_provider")]
    pub provider: String,

    /// API key for the selected provider
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Anthropic OAuth token, sent as a bearer token instead of the API key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_token: Option<String>,

    /// Model name; empty picks the provider's default
    #[serde(default)]
    pub model: String,

    /// Base URL override (Ollama and OpenAI-compatible endpoints)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    /// Sampling temperature
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Max tokens per LLM response
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Agent loop and context budgeting
    #[serde(default)]
    pub agent: AgentConfig,

    /// Persistence
    #[serde(default)]
    pub store: StoreConfig,

    /// Scheduled check-ins and reminders
    #[serde(default)]
    pub scheduler: SchedulerConfig,
}

fn default_provider() -> String {
    "anthropic".into()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_tokens() -> u32 {
    4096
}

/// Redact a secret for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("provider", &self.provider)
            .field("api_key", &redact(&self.api_key))
            .field("auth_token", &redact(&self.auth_token))
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("agent", &self.agent)
            .field("store", &self.store)
            .field("scheduler", &self.scheduler)
            .finish()
    }
}

/// Agent loop settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Total context budget per request: system prompt + tool catalog + history
    #[serde(default = "default_max_context_tokens")]
    pub max_context_tokens: usize,

    /// Round trips to the model allowed in one turn
    #[serde(default = "default_max_tool_rounds")]
    pub max_tool_rounds: usize,

    /// Floor for the history budget when fixed overhead eats the context
    #[serde(default = "default_min_message_budget")]
    pub min_message_budget: usize,

    /// Budget used to cap stored conversation history between turns
    #[serde(default = "default_history_retention_tokens")]
    pub history_retention_tokens: usize,

    /// Run the tool calls of one round concurrently
    #[serde(default)]
    pub parallel_tools: bool,

    /// Token estimation constants
    #[serde(default)]
    pub estimation: EstimationConfig,
}

fn default_max_context_tokens() -> usize {
    100_000
}
fn default_max_tool_rounds() -> usize {
    10
}
fn default_min_message_budget() -> usize {
    1000
}
fn default_history_retention_tokens() -> usize {
    50_000
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_context_tokens: default_max_context_tokens(),
            max_tool_rounds: default_max_tool_rounds(),
            min_message_budget: default_min_message_budget(),
            history_retention_tokens: default_history_retention_tokens(),
            parallel_tools: false,
            estimation: EstimationConfig::default(),
        }
    }
}

/// Heuristic constants for token estimation.
///
/// These are tuning values, not a tokenizer. Adjust them if estimates drift
/// from what the provider reports in its usage numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EstimationConfig {
    /// Characters (bytes of UTF-8) per token
    #[serde(default = "default_chars_per_token")]
    pub chars_per_token: usize,

    /// Role and framing cost of every message
    #[serde(default = "default_message_overhead")]
    pub message_overhead: usize,

    /// Framing cost of each tool call inside an invocation
    #[serde(default = "default_tool_call_overhead")]
    pub tool_call_overhead: usize,

    /// Framing cost of the result marker on a tool result
    #[serde(default = "default_tool_result_overhead")]
    pub tool_result_overhead: usize,

    /// Framing cost of each tool definition in the catalog
    #[serde(default = "default_tool_definition_overhead")]
    pub tool_definition_overhead: usize,
}

fn default_chars_per_token() -> usize {
    EstimationConfig::DEFAULT.chars_per_token
}
fn default_message_overhead() -> usize {
    EstimationConfig::DEFAULT.message_overhead
}
fn default_tool_call_overhead() -> usize {
    EstimationConfig::DEFAULT.tool_call_overhead
}
fn default_tool_result_overhead() -> usize {
    EstimationConfig::DEFAULT.tool_result_overhead
}
fn default_tool_definition_overhead() -> usize {
    EstimationConfig::DEFAULT.tool_definition_overhead
}

impl EstimationConfig {
    pub const DEFAULT: Self = Self {
        chars_per_token: 4,
        message_overhead: 4,
        tool_call_overhead: 4,
        tool_result_overhead: 2,
        tool_definition_overhead: 10,
    };
}

impl Default for EstimationConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// SQLite database file
    #[serde(default = "default_database_path")]
    pub database_path: String,
}

fn default_database_path() -> String {
    "./data.db".into()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Cron expression for the default morning check-in; empty disables seeding
    #[serde(default = "default_check_in_cron")]
    pub check_in_cron: String,

    /// Webhook receiving scheduled output; unset logs it instead
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webhook_url: Option<String>,

    /// How often due reminders are polled
    #[serde(default = "default_reminder_poll_secs")]
    pub reminder_poll_secs: u64,

    /// How often schedules are reloaded from the store
    #[serde(default = "default_reload_secs")]
    pub reload_secs: u64,
}

fn default_check_in_cron() -> String {
    "0 9 * * *".into()
}
fn default_reminder_poll_secs() -> u64 {
    60
}
fn default_reload_secs() -> u64 {
    300
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            check_in_cron: default_check_in_cron(),
            webhook_url: None,
            reminder_poll_secs: default_reminder_poll_secs(),
            reload_secs: default_reload_secs(),
        }
    }
}

// Webhook URLs embed credentials.
impl std::fmt::Debug for SchedulerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchedulerConfig")
            .field("check_in_cron", &self.check_in_cron)
            .field("webhook_url", &redact(&self.webhook_url))
            .field("reminder_poll_secs", &self.reminder_poll_secs)
            .field("reload_secs", &self.reload_secs)
            .finish()
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.openloop/config.toml),
    /// then apply environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_path();
        let mut config = Self::load_from(&config_path)?;
        config.apply_env_overrides(|key| std::env::var(key).ok().filter(|v| !v.is_empty()));
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
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

    /// Apply environment overrides through `lookup`.
    ///
    /// - `OPENLOOP_PROVIDER`, `OPENLOOP_MODEL`
    /// - `OPENLOOP_API_KEY` (highest priority), then the provider's own key
    ///   (`ANTHROPIC_API_KEY` or `OPENAI_API_KEY`) when none is configured
    /// - `ANTHROPIC_AUTH_TOKEN`, `OLLAMA_BASE_URL`
    /// - `OPENLOOP_DATABASE_PATH`, `OPENLOOP_WEBHOOK_URL`, `OPENLOOP_MAX_CONTEXT_TOKENS`
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(provider) = lookup("OPENLOOP_PROVIDER") {
            self.provider = provider;
        }
        if let Some(model) = lookup("OPENLOOP_MODEL") {
            self.model = model;
        }

        if let Some(key) = lookup("OPENLOOP_API_KEY") {
            self.api_key = Some(key);
        } else if self.api_key.is_none() {
            self.api_key = match self.provider.as_str() {
                "anthropic" => lookup("ANTHROPIC_API_KEY"),
                "openai" => lookup("OPENAI_API_KEY"),
                _ => None,
            };
        }

        if self.auth_token.is_none() {
            self.auth_token = lookup("ANTHROPIC_AUTH_TOKEN");
        }
        if self.provider == "ollama" {
            if let Some(url) = lookup("OLLAMA_BASE_URL") {
                self.base_url = Some(url);
            }
        }
        if let Some(path) = lookup("OPENLOOP_DATABASE_PATH") {
            self.store.database_path = path;
        }
        if let Some(url) = lookup("OPENLOOP_WEBHOOK_URL") {
            self.scheduler.webhook_url = Some(url);
        }
        if let Some(tokens) = lookup("OPENLOOP_MAX_CONTEXT_TOKENS") {
            match tokens.parse() {
                Ok(n) => self.agent.max_context_tokens = n,
                Err(_) => tracing::warn!(value = %tokens, "Ignoring invalid OPENLOOP_MAX_CONTEXT_TOKENS"),
            }
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".openloop")
    }

    /// Path of the default config file.
    pub fn config_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !SUPPORTED_PROVIDERS.contains(&self.provider.as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "unsupported provider '{}' (expected one of: {})",
                self.provider,
                SUPPORTED_PROVIDERS.join(", ")
            )));
        }

        if self.temperature < 0.0 || self.temperature > 2.0 {
            return Err(ConfigError::ValidationError(
                "temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.agent.max_tool_rounds == 0 {
            return Err(ConfigError::ValidationError(
                "agent.max_tool_rounds must be at least 1".into(),
            ));
        }

        if self.agent.estimation.chars_per_token == 0 {
            return Err(ConfigError::ValidationError(
                "agent.estimation.chars_per_token must be at least 1".into(),
            ));
        }

        let cron = self.scheduler.check_in_cron.trim();
        if !cron.is_empty() && cron.split_whitespace().count() != 5 {
            return Err(ConfigError::ValidationError(format!(
                "scheduler.check_in_cron must have 5 fields, got '{cron}'"
            )));
        }

        Ok(())
    }

    /// Whether credentials are available for the selected provider.
    pub fn has_credentials(&self) -> bool {
        self.provider == "ollama" || self.api_key.is_some() || self.auth_token.is_some()
    }

    /// Generate a default config TOML string (for `onboard` command).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            api_key: None,
            auth_token: None,
            model: String::new(),
            base_url: None,
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            agent: AgentConfig::default(),
            store: StoreConfig::default(),
            scheduler: SchedulerConfig::default(),
        }
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
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        assert_eq!(config.provider, "anthropic");
        assert_eq!(config.agent.max_tool_rounds, 10);
        assert_eq!(config.agent.min_message_budget, 1000);
        assert_eq!(config.store.database_path, "./data.db");
        assert_eq!(config.scheduler.check_in_cron, "0 9 * * *");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn config_roundtrip_toml() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.provider, config.provider);
        assert_eq!(parsed.agent.max_context_tokens, config.agent.max_context_tokens);
        assert_eq!(parsed.agent.estimation, EstimationConfig::DEFAULT);
    }

    #[test]
    fn partial_sections_fill_defaults() {
        let config: AppConfig = toml::from_str(
            r#"
provider = "ollama"
model = "llama3.1"

[agent]
max_context_tokens = 8000

[agent.estimation]
message_overhead = 6
"#,
        )
        .unwrap();
        assert_eq!(config.agent.max_context_tokens, 8000);
        assert_eq!(config.agent.max_tool_rounds, 10);
        assert_eq!(config.agent.estimation.message_overhead, 6);
        assert_eq!(config.agent.estimation.chars_per_token, 4);
    }

    #[test]
    fn invalid_temperature_rejected() {
        let config = AppConfig {
            temperature: 5.0,
            ..AppConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn unknown_provider_rejected() {
        let config = AppConfig {
            provider: "openrouter".into(),
            ..AppConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("openrouter"));
    }

    #[test]
    fn malformed_cron_rejected_but_empty_allowed() {
        let mut config = AppConfig::default();
        config.scheduler.check_in_cron = "0 9 *".into();
        assert!(config.validate().is_err());
        config.scheduler.check_in_cron = String::new();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn missing_config_file_returns_defaults() {
        let result = AppConfig::load_from(Path::new("/nonexistent/config.toml"));
        assert!(result.is_ok());
        let config = result.unwrap();
        assert_eq!(config.provider, "anthropic");
    }

    #[test]
    fn load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "provider = \"openai\"\n[store]\ndatabase_path = \"/tmp/x.db\"\n").unwrap();
        let config = AppConfig::load_from(&path).unwrap();
        assert_eq!(config.provider, "openai");
        assert_eq!(config.store.database_path, "/tmp/x.db");
    }

    #[test]
    fn unparseable_file_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "provider = [").unwrap();
        let err = AppConfig::load_from(&path).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }));
    }

    #[test]
    fn env_overrides_pick_provider_key() {
        let mut config = AppConfig::default();
        config.apply_env_overrides(env(&[
            ("OPENLOOP_PROVIDER", "openai"),
            ("ANTHROPIC_API_KEY", "sk-ant"),
            ("OPENAI_API_KEY", "sk-oai"),
            ("OPENLOOP_MAX_CONTEXT_TOKENS", "32000"),
        ]));
        assert_eq!(config.provider, "openai");
        assert_eq!(config.api_key.as_deref(), Some("sk-oai"));
        assert_eq!(config.agent.max_context_tokens, 32000);
    }

    #[test]
    fn openloop_api_key_wins() {
        let mut config = AppConfig {
            api_key: Some("from-file".into()),
            ..AppConfig::default()
        };
        config.apply_env_overrides(env(&[("OPENLOOP_API_KEY", "from-env")]));
        assert_eq!(config.api_key.as_deref(), Some("from-env"));
    }

    #[test]
    fn invalid_max_context_env_is_ignored() {
        let mut config = AppConfig::default();
        config.apply_env_overrides(env(&[("OPENLOOP_MAX_CONTEXT_TOKENS", "lots")]));
        assert_eq!(config.agent.max_context_tokens, 100_000);
    }

    #[test]
    fn debug_redacts_secrets() {
        let mut config = AppConfig {
            api_key: Some("sk-secret".into()),
            ..AppConfig::default()
        };
        config.scheduler.webhook_url = Some("https://hooks.example/abc".into());
        let dbg = format!("{config:?}");
        assert!(!dbg.contains("sk-secret"));
        assert!(!dbg.contains("hooks.example"));
        assert!(dbg.contains("[REDACTED]"));
    }

    #[test]
    fn default_toml_generation() {
        let toml_str = AppConfig::default_toml();
        assert!(toml_str.contains("anthropic"));
        assert!(toml_str.contains("max_context_tokens"));
    }
}
