//! CLI channel: interactive terminal-based chat.
//!
//! Reads lines from stdin on a background task and hands them over through
//! an mpsc receiver; replies are printed to stdout. Used by `openloop chat`.

use openloop_core::error::ChannelError;
use std::io::Write;
use tokio::io::{self, AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

/// Words that end an interactive session.
pub const EXIT_COMMANDS: &[&str] = &["exit", "quit", "/exit", "/quit", ":q"];

pub fn is_exit_command(line: &str) -> bool {
    EXIT_COMMANDS.contains(&line.trim())
}

/// Interactive CLI channel for terminal-based chat.
pub struct CliChannel {
    prompt: String,
}

impl CliChannel {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
        }
    }

    /// Start reading stdin.
    pub fn start(&self) -> mpsc::Receiver<Result<String, ChannelError>> {
        Self::start_with(BufReader::new(io::stdin()))
    }

    /// Start reading from any line source.
    ///
    /// Blank lines are skipped. The receiver closes on EOF or on an exit
    /// command; a read error is forwarded once before it closes.
    pub fn start_with<R>(reader: R) -> mpsc::Receiver<Result<String, ChannelError>>
    where
        R: AsyncBufRead + Unpin + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(32);

        tokio::spawn(async move {
            let mut lines = reader.lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        let line = line.trim().to_string();
                        if line.is_empty() {
                            continue;
                        }
                        if is_exit_command(&line) {
                            break;
                        }
                        if tx.send(Ok(line)).await.is_err() {
                            break;
                        }
                    }
                    Ok(None) => break, // EOF (Ctrl+D)
                    Err(e) => {
                        let _ = tx.send(Err(ChannelError::ConnectionLost(e.to_string()))).await;
                        break;
                    }
                }
            }
        });

        rx
    }

    /// Print the input prompt without a newline.
    pub fn show_prompt(&self) {
        print!("{}", self.prompt);
        let _ = std::io::stdout().flush();
    }

    pub fn send(&self, content: &str) {
        println!("{content}\n");
    }
}

impl Default for CliChannel {
    fn default() -> Self {
        Self::new("openloop> ")
    }
}
