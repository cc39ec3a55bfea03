//! LLM provider implementations for openloop.
//!
//! All providers implement the `openloop_core::Provider` trait.
//! [`build_provider`] picks one from configuration.

pub mod anthropic;
mod http;
pub mod openai_compat;

pub use anthropic::AnthropicProvider;
pub use openai_compat::OpenAiCompatProvider;

use openloop_config::AppConfig;
use openloop_core::error::ProviderError;
use openloop_core::provider::Provider;
use std::sync::Arc;

/// The model used when the configuration leaves `model` empty.
pub fn default_model(provider: &str) -> &'static str {
    match provider {
        "openai" => openai_compat::OPENAI_DEFAULT_MODEL,
        "ollama" => openai_compat::OLLAMA_DEFAULT_MODEL,
        _ => anthropic::DEFAULT_MODEL,
    }
}

/// The configured model, or the provider's default.
pub fn resolve_model(config: &AppConfig) -> String {
    if config.model.trim().is_empty() {
        default_model(&config.provider).to_string()
    } else {
        config.model.clone()
    }
}

/// Build the provider selected by `config.provider`.
///
/// Anthropic prefers `auth_token` over `api_key` when both are set.
pub fn build_provider(config: &AppConfig) -> Result<Arc<dyn Provider>, ProviderError> {
    let provider: Arc<dyn Provider> = match config.provider.as_str() {
        "anthropic" => {
            let provider = match (&config.auth_token, &config.api_key) {
                (Some(token), _) => AnthropicProvider::with_auth_token(token),
                (None, Some(key)) => AnthropicProvider::new(key),
                (None, None) => {
                    return Err(ProviderError::NotConfigured(
                        "anthropic needs api_key or auth_token (ANTHROPIC_API_KEY / ANTHROPIC_AUTH_TOKEN)".into(),
                    ));
                }
            };
            match &config.base_url {
                Some(url) => Arc::new(provider.with_base_url(url)),
                None => Arc::new(provider),
            }
        }
        "openai" => {
            let key = config.api_key.as_deref().ok_or_else(|| {
                ProviderError::NotConfigured("openai needs api_key (OPENAI_API_KEY)".into())
            })?;
            let base_url = config.base_url.as_deref().unwrap_or(openai_compat::OPENAI_BASE_URL);
            Arc::new(OpenAiCompatProvider::new("openai", base_url, key))
        }
        "ollama" => Arc::new(OpenAiCompatProvider::ollama(config.base_url.as_deref())),
        other => return Err(ProviderError::NotConfigured(format!("unknown provider: {other}"))),
    };

    tracing::info!(provider = provider.name(), model = %resolve_model(config), "Provider ready");
    Ok(provider)
}
