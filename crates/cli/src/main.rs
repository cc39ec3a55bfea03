//! openloop CLI: the main entry point.
//!
//! Commands:
//! - `chat`: interactive chat, or one exchange with `-m` / piped stdin
//! - `daemon`: run scheduled check-ins and reminders until Ctrl+C
//! - `onboard`: write a starter config file
//! - `tools`: list the tool catalog with token estimates
//! - `config`: show the effective configuration

use clap::{Parser, Subcommand};

mod commands;
mod runtime;

#[derive(Parser)]
#[command(
    name = "openloop",
    about = "openloop: keep track of everything on your mind",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Chat with the assistant
    Chat {
        /// Send a single message instead of entering interactive mode
        #[arg(short, long)]
        message: Option<String>,
    },

    /// Run scheduled check-ins and reminders
    Daemon,

    /// Write a default config file
    Onboard {
        /// Overwrite an existing config file
        #[arg(long)]
        force: bool,
    },

    /// List the tools offered to the model
    Tools,

    /// Show the effective configuration (secrets redacted)
    Config,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    match cli.command {
        Commands::Chat { message } => commands::chat::run(message).await?,
        Commands::Daemon => commands::daemon::run().await?,
        Commands::Onboard { force } => commands::onboard::run(force).await?,
        Commands::Tools => commands::tools::run().await?,
        Commands::Config => commands::config_cmd::run().await?,
    }

    Ok(())
}
