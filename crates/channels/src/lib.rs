//! Channels for openloop.
//!
//! - **CLI**: interactive terminal chat (stdin/stdout)
//! - **Webhook** / **Log**: outbound [`Notifier`]s for scheduled output
//! - **Text**: message chunking

pub mod cli;
pub mod text;
pub mod webhook;

pub use cli::CliChannel;
pub use text::split_message;
pub use webhook::{LogNotifier, WebhookNotifier};

use openloop_core::channel::Notifier;
use std::sync::Arc;

/// The webhook notifier when a URL is configured, otherwise the log.
pub fn notifier_for(webhook_url: Option<&str>) -> Arc<dyn Notifier> {
    match webhook_url.map(str::trim).filter(|url| !url.is_empty()) {
        Some(url) => Arc::new(WebhookNotifier::new(url)),
        None => Arc::new(LogNotifier),
    }
}
