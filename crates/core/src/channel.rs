//! Notifier trait: outbound delivery of agent output.
//!
//! Scheduled check-ins and reminders run without a user at the keyboard; their
//! replies are pushed somewhere through a Notifier (a chat webhook, the log).

use async_trait::async_trait;
use crate::error::ChannelError;

#[async_trait]
pub trait Notifier: Send + Sync {
    /// Short name used in logs (e.g., "webhook", "log").
    fn name(&self) -> &str;

    /// Deliver one message. Implementations may split long content.
    async fn deliver(&self, content: &str) -> std::result::Result<(), ChannelError>;
}
