//! Outbound notifiers for output produced without a user present.
//!
//! - **Webhook**: POSTs `{"content": ...}` to a chat webhook (Discord-style),
//!   one request per chunk.
//! - **Log**: writes the content to the tracing log when no webhook is set.

use crate::text::{DEFAULT_CHUNK_LIMIT, split_message};
use async_trait::async_trait;
use openloop_core::channel::Notifier;
use openloop_core::error::ChannelError;
use std::time::Duration;
use tracing::{debug, info};

pub struct WebhookNotifier {
    url: String,
    chunk_limit: usize,
    client: reqwest::Client,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_default();
        Self {
            url: url.into(),
            chunk_limit: DEFAULT_CHUNK_LIMIT,
            client,
        }
    }

    pub fn with_chunk_limit(mut self, limit: usize) -> Self {
        self.chunk_limit = limit;
        self
    }

    fn failed(reason: impl Into<String>) -> ChannelError {
        ChannelError::DeliveryFailed {
            channel: "webhook".into(),
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    fn name(&self) -> &str {
        "webhook"
    }

    async fn deliver(&self, content: &str) -> Result<(), ChannelError> {
        let chunks = split_message(content, self.chunk_limit);
        debug!(chunks = chunks.len(), "Delivering via webhook");

        for chunk in chunks {
            let response = self
                .client
                .post(&self.url)
                .json(&serde_json::json!({ "content": chunk }))
                .send()
                .await
                .map_err(|e| Self::failed(e.to_string()))?;

            let status = response.status();
            if status.as_u16() >= 400 {
                let body = response.text().await.unwrap_or_default();
                return Err(Self::failed(format!("status {}: {body}", status.as_u16())));
            }
        }
        Ok(())
    }
}

/// Falls back to the log so scheduled output is never silently dropped.
#[derive(Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    fn name(&self) -> &str {
        "log"
    }

    async fn deliver(&self, content: &str) -> Result<(), ChannelError> {
        info!(content = %content, "Scheduled output");
        Ok(())
    }
}
