//! `openloop onboard`: first-time setup.

use openloop_config::AppConfig;

pub async fn run(force: bool) -> Result<(), Box<dyn std::error::Error>> {
    let config_dir = AppConfig::config_dir();
    let config_path = AppConfig::config_path();

    println!("openloop: first-time setup");
    println!("==========================\n");

    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir)?;
        println!("  Created config directory: {}", config_dir.display());
    } else {
        println!("  Config directory exists: {}", config_dir.display());
    }

    if config_path.exists() && !force {
        println!("  Config file exists: {}", config_path.display());
        println!("  (use --force to overwrite it with defaults)");
    } else {
        std::fs::write(&config_path, AppConfig::default_toml())?;
        println!("  Wrote default config: {}", config_path.display());
    }

    println!();
    println!("Next steps:");
    println!("  1. Set credentials, e.g. export ANTHROPIC_API_KEY=sk-ant-...");
    println!("     (or provider = \"ollama\" in the config for a local model)");
    println!("  2. openloop chat");
    println!("  3. openloop daemon   # morning check-ins and reminders");

    Ok(())
}
