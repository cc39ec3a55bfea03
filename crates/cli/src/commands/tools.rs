//! `openloop tools`: the tool catalog and what it costs per request.

use openloop_agent::TokenEstimator;
use openloop_config::AppConfig;
use openloop_core::tool::ToolDispatcher;
use openloop_store::InMemoryStore;
use std::sync::Arc;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let estimator = TokenEstimator::new(config.agent.estimation);

    // Only the definitions are needed; nothing is executed.
    let registry = openloop_tools::default_registry(Arc::new(InMemoryStore::new()));
    let definitions = registry.definitions();

    for definition in &definitions {
        println!(
            "  {:<22} {:>5}  {}",
            definition.name,
            estimator.tool(definition),
            first_line(&definition.description)
        );
    }
    println!();
    println!(
        "{} tools, ~{} tokens per request",
        definitions.len(),
        estimator.tools(&definitions)
    );

    Ok(())
}

fn first_line(text: &str) -> &str {
    text.lines().next().unwrap_or_default()
}
