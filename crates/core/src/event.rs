//! Domain event system: decoupled observation of what the agent does.
//!
//! The agent loop and the scheduler publish events; anything interested
//! (tests, a future metrics sink) subscribes without the publisher knowing.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

/// All domain events in the system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DomainEvent {
    /// History was trimmed before being sent to the model
    ContextTrimmed {
        messages_before: usize,
        messages_after: usize,
        tokens_before: usize,
        tokens_after: usize,
        budget: usize,
        timestamp: DateTime<Utc>,
    },

    /// The model produced a final answer
    ResponseGenerated {
        model: String,
        rounds: usize,
        tokens_used: u32,
        timestamp: DateTime<Utc>,
    },

    /// A tool was executed
    ToolExecuted {
        tool_name: String,
        success: bool,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// A turn ran out of tool rounds
    RoundLimitReached {
        rounds: usize,
        timestamp: DateTime<Utc>,
    },

    /// A cron schedule fired
    ScheduleFired {
        name: String,
        success: bool,
        timestamp: DateTime<Utc>,
    },

    /// A one-shot reminder fired
    ReminderFired {
        id: i64,
        success: bool,
        timestamp: DateTime<Utc>,
    },

    /// An error occurred
    ErrorOccurred {
        context: String,
        error_message: String,
        timestamp: DateTime<Utc>,
    },
}

/// Fan-out of [`DomainEvent`]s over a `tokio::sync::broadcast` channel.
///
/// Slow subscribers lag and lose the oldest events; publishers never wait.
pub struct EventBus {
    sender: broadcast::Sender<Arc<DomainEvent>>,
}

impl EventBus {
    /// `capacity` is how many events a subscriber may fall behind.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn publish(&self, event: DomainEvent) {
        // Err only means nobody is listening.
        let _ = self.sender.send(Arc::new(event));
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Arc<DomainEvent>> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_see_events_in_order() {
        let bus = EventBus::new(8);
        let mut rx = bus.subscribe();

        bus.publish(DomainEvent::ScheduleFired {
            name: "morning-checkin".into(),
            success: true,
            timestamp: Utc::now(),
        });
        bus.publish(DomainEvent::ReminderFired {
            id: 7,
            success: false,
            timestamp: Utc::now(),
        });

        let first = rx.recv().await.unwrap();
        assert!(matches!(
            first.as_ref(),
            DomainEvent::ScheduleFired { name, success: true, .. } if name == "morning-checkin"
        ));
        let second = rx.recv().await.unwrap();
        assert!(matches!(second.as_ref(), DomainEvent::ReminderFired { id: 7, success: false, .. }));
    }

    #[test]
    fn publishing_without_subscribers_is_a_no_op() {
        let bus = EventBus::default();
        bus.publish(DomainEvent::RoundLimitReached {
            rounds: 10,
            timestamp: Utc::now(),
        });
    }
}
