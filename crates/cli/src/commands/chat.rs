//! `openloop chat`: interactive or single-message chat mode.

use crate::runtime::{Runtime, load_config};
use openloop_agent::{ChatService, TokenEstimator};
use openloop_channels::CliChannel;
use std::io::{IsTerminal, Read};

/// Conversation key for the terminal session.
const SESSION_KEY: &str = "cli";

pub async fn run(message: Option<String>) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config()?;
    let runtime = Runtime::build(&config).await?;

    let chat = ChatService::new(runtime.agent.clone(), config.agent.history_retention_tokens)
        .with_estimator(TokenEstimator::new(config.agent.estimation));

    // A message on the command line or piped stdin means one exchange.
    let single = match message {
        Some(text) => Some(text),
        None if !std::io::stdin().is_terminal() => {
            let mut input = String::new();
            std::io::stdin().read_to_string(&mut input)?;
            Some(input)
        }
        None => None,
    };

    if let Some(text) = single {
        let text = text.trim();
        if text.is_empty() {
            return Err("Nothing to send: the message is empty.".into());
        }
        let outcome = chat.handle(SESSION_KEY, text).await?;
        println!("{}", outcome.reply);
        return Ok(());
    }

    interactive(&chat, &config.provider, &runtime.model).await
}

async fn interactive(
    chat: &ChatService,
    provider: &str,
    model: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    println!();
    println!("  openloop: interactive mode");
    println!();
    println!("  Provider:  {provider}");
    println!("  Model:     {model}");
    println!();
    println!("  Type your message and press Enter.");
    println!("  Type 'exit' or press Ctrl+C to quit.");
    println!();

    let channel = CliChannel::default();
    let mut rx = channel.start();

    loop {
        channel.show_prompt();

        let line = tokio::select! {
            line = rx.recv() => line,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else { break };

        let text = match line {
            Ok(text) => text,
            Err(e) => {
                eprintln!("  Input error: {e}");
                break;
            }
        };

        eprint!("  ...");
        let result = tokio::select! {
            result = chat.handle(SESSION_KEY, &text) => Some(result),
            _ = tokio::signal::ctrl_c() => None,
        };
        eprint!("\r     \r");

        match result {
            Some(Ok(outcome)) => {
                if outcome.round_limit_reached {
                    tracing::warn!(rounds = outcome.rounds, "Turn stopped at the round limit");
                }
                channel.send(&outcome.reply);
            }
            Some(Err(e)) => eprintln!("  Error: {e}\n"),
            None => break,
        }
    }

    println!("\n  Goodbye!");
    Ok(())
}
