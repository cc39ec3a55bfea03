//! `openloop config`: the effective configuration.

use openloop_config::AppConfig;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let path = AppConfig::config_path();
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    if path.exists() {
        println!("Config file: {}", path.display());
    } else {
        println!("Config file: {} (not found, using defaults)", path.display());
    }
    println!("Model:       {}", openloop_providers::resolve_model(&config));
    println!("Credentials: {}", if config.has_credentials() { "set" } else { "missing" });
    println!();
    println!("{config:#?}");

    Ok(())
}
