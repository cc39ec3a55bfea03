//! Wiring shared by `chat` and `daemon`: store, tools, provider, agent.

use openloop_agent::AgentLoop;
use openloop_config::AppConfig;
use openloop_core::event::EventBus;
use openloop_core::store::Store;
use openloop_store::SqliteStore;
use std::sync::Arc;
use tracing::info;

pub struct Runtime {
    pub store: Arc<dyn Store>,
    pub agent: Arc<AgentLoop>,
    pub event_bus: Arc<EventBus>,
    pub model: String,
}

/// Load the config and fail early with setup hints when credentials are missing.
pub fn load_config() -> Result<AppConfig, Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    if !config.has_credentials() {
        eprintln!();
        eprintln!("  ERROR: No credentials configured for provider '{}'.", config.provider);
        eprintln!();
        eprintln!("  Set one of these environment variables:");
        eprintln!("    ANTHROPIC_API_KEY     (provider = \"anthropic\")");
        eprintln!("    ANTHROPIC_AUTH_TOKEN  (provider = \"anthropic\", OAuth)");
        eprintln!("    OPENAI_API_KEY        (provider = \"openai\")");
        eprintln!("    OPENLOOP_API_KEY      (any provider)");
        eprintln!();
        eprintln!("  Or add api_key to {}", AppConfig::config_path().display());
        eprintln!("  (run `openloop onboard` to create it).");
        eprintln!();
        return Err("No credentials found. See above for setup instructions.".into());
    }

    Ok(config)
}

impl Runtime {
    pub async fn build(config: &AppConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let store: Arc<dyn Store> = Arc::new(
            SqliteStore::new(&config.store.database_path)
                .await
                .map_err(|e| format!("Failed to open {}: {e}", config.store.database_path))?,
        );

        let provider = openloop_providers::build_provider(config)?;
        let tools = Arc::new(openloop_tools::default_registry(store.clone()));
        let model = openloop_providers::resolve_model(config);
        let event_bus = Arc::new(EventBus::default());

        let agent = AgentLoop::new(provider, tools, model.clone())
            .with_config(config.agent.clone())
            .with_temperature(config.temperature)
            .with_max_tokens(config.max_tokens)
            .with_event_bus(event_bus.clone());

        info!(
            provider = %config.provider,
            model = %model,
            database = %config.store.database_path,
            "Runtime ready"
        );

        Ok(Self {
            store,
            agent: Arc::new(agent),
            event_bus,
            model,
        })
    }
}
