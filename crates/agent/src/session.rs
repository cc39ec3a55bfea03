//! Per-conversation history with per-key serialization.
//!
//! Each conversation key owns its own async mutex, so two turns on the same
//! conversation run one after the other while unrelated conversations never
//! wait on each other. The map itself is only locked long enough to find or
//! create a slot.

use std::collections::HashMap;
use std::sync::Arc;

use openloop_core::error::Result;
use openloop_core::message::Message;
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

use crate::context::TokenEstimator;
use crate::loop_runner::{TurnOutcome, TurnRunner};

type Slot = Arc<Mutex<Vec<Message>>>;

/// Conversation histories keyed by conversation id.
#[derive(Default)]
pub struct SessionStore {
    sessions: RwLock<HashMap<String, Slot>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    async fn slot(&self, key: &str) -> Slot {
        if let Some(slot) = self.sessions.read().await.get(key) {
            return slot.clone();
        }
        self.sessions
            .write()
            .await
            .entry(key.to_string())
            .or_default()
            .clone()
    }

    // Clones the slot so the map lock is released before waiting on it.
    async fn existing_slot(&self, key: &str) -> Option<Slot> {
        self.sessions.read().await.get(key).cloned()
    }

    /// A copy of the stored history (empty for unknown keys).
    ///
    /// Waits for a turn in progress on `key` to finish.
    pub async fn history(&self, key: &str) -> Vec<Message> {
        let Some(slot) = self.existing_slot(key).await else {
            return Vec::new();
        };
        let history = slot.lock().await;
        history.clone()
    }

    /// Clear one conversation.
    ///
    /// The slot stays in place and is cleared under its own lock, so a turn
    /// already running on `key` finishes first and later turns still queue
    /// behind it.
    pub async fn reset(&self, key: &str) {
        if let Some(slot) = self.existing_slot(key).await {
            slot.lock().await.clear();
        }
    }

    /// Number of conversation keys seen, including cleared ones.
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

/// Runs turns against stored histories and caps what is kept.
pub struct ChatService {
    runner: Arc<dyn TurnRunner>,
    sessions: Arc<SessionStore>,
    retention_tokens: usize,
    estimator: TokenEstimator,
}

impl ChatService {
    pub fn new(runner: Arc<dyn TurnRunner>, retention_tokens: usize) -> Self {
        Self {
            runner,
            sessions: Arc::new(SessionStore::new()),
            retention_tokens,
            estimator: TokenEstimator::DEFAULT,
        }
    }

    pub fn with_sessions(mut self, sessions: Arc<SessionStore>) -> Self {
        self.sessions = sessions;
        self
    }

    pub fn with_estimator(mut self, estimator: TokenEstimator) -> Self {
        self.estimator = estimator;
        self
    }

    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }

    /// Run one turn for `key` and store the capped history.
    ///
    /// On error the stored history is left as it was.
    pub async fn handle(&self, key: &str, text: &str) -> Result<TurnOutcome> {
        let slot = self.sessions.slot(key).await;
        let mut history = slot.lock().await;

        let outcome = self.runner.run_turn(&history, text).await?;

        let kept = self.estimator.trim(&outcome.history, self.retention_tokens);
        debug!(
            key,
            stored = kept.messages.len(),
            produced = outcome.history.len(),
            "Storing conversation history"
        );
        *history = kept.messages.to_vec();

        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::estimate_messages_tokens;
    use async_trait::async_trait;
    use openloop_core::error::{Error, ProviderError};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::Semaphore;

    /// Echoes the user text; records how many turns overlapped.
    struct EchoRunner {
        active: AtomicUsize,
        max_active: AtomicUsize,
        delay: Duration,
        fail_on: Option<&'static str>,
        /// Turns on this text wait for a permit before answering
        hold_on: Option<(&'static str, Arc<Semaphore>)>,
    }

    impl EchoRunner {
        fn new(delay_ms: u64) -> Self {
            Self {
                active: AtomicUsize::new(0),
                max_active: AtomicUsize::new(0),
                delay: Duration::from_millis(delay_ms),
                fail_on: None,
                hold_on: None,
            }
        }
    }

    #[async_trait]
    impl TurnRunner for EchoRunner {
        async fn run_turn(&self, history: &[Message], user_text: &str) -> Result<TurnOutcome> {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_active.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            if let Some((text, gate)) = &self.hold_on {
                if *text == user_text {
                    gate.acquire().await.unwrap().forget();
                }
            }
            self.active.fetch_sub(1, Ordering::SeqCst);

            if self.fail_on == Some(user_text) {
                return Err(Error::Provider(ProviderError::Network("down".into())));
            }

            let mut history = history.to_vec();
            history.push(Message::user(user_text));
            let reply = format!("echo: {user_text}");
            history.push(Message::assistant(reply.clone()));
            Ok(TurnOutcome {
                reply,
                history,
                rounds: 1,
                round_limit_reached: false,
            })
        }
    }

    #[tokio::test]
    async fn history_accumulates_per_key() {
        let service = ChatService::new(Arc::new(EchoRunner::new(0)), 10_000);
        service.handle("a", "one").await.unwrap();
        let outcome = service.handle("a", "two").await.unwrap();
        service.handle("b", "other").await.unwrap();

        assert_eq!(outcome.reply, "echo: two");
        assert_eq!(service.sessions().history("a").await.len(), 4);
        assert_eq!(service.sessions().history("b").await.len(), 2);
        assert_eq!(service.sessions().len().await, 2);
    }

    #[tokio::test]
    async fn stored_history_is_capped_by_retention_budget() {
        let service = ChatService::new(Arc::new(EchoRunner::new(0)), 40);
        for i in 0..20 {
            service.handle("a", &format!("message number {i}")).await.unwrap();
        }
        let stored = service.sessions().history("a").await;
        assert!(estimate_messages_tokens(&stored) <= 40);
        assert_eq!(stored.last().unwrap().content, "echo: message number 19");
    }

    #[tokio::test]
    async fn failed_turn_leaves_history_untouched() {
        let runner = EchoRunner {
            fail_on: Some("boom"),
            ..EchoRunner::new(0)
        };
        let service = ChatService::new(Arc::new(runner), 10_000);
        service.handle("a", "fine").await.unwrap();
        assert!(service.handle("a", "boom").await.is_err());
        assert_eq!(service.sessions().history("a").await.len(), 2);
    }

    #[tokio::test]
    async fn same_key_turns_are_serialized() {
        let runner = Arc::new(EchoRunner::new(20));
        let service = Arc::new(ChatService::new(runner.clone(), 10_000));

        let handles: Vec<_> = (0..4)
            .map(|i| {
                let service = service.clone();
                tokio::spawn(async move { service.handle("same", &format!("m{i}")).await })
            })
            .collect();
        for h in handles {
            h.await.unwrap().unwrap();
        }

        assert_eq!(runner.max_active.load(Ordering::SeqCst), 1);
        assert_eq!(service.sessions().history("same").await.len(), 8);
    }

    #[tokio::test]
    async fn different_keys_run_concurrently() {
        let runner = Arc::new(EchoRunner::new(50));
        let service = Arc::new(ChatService::new(runner.clone(), 10_000));

        let a = {
            let service = service.clone();
            tokio::spawn(async move { service.handle("a", "x").await })
        };
        let b = {
            let service = service.clone();
            tokio::spawn(async move { service.handle("b", "y").await })
        };
        a.await.unwrap().unwrap();
        b.await.unwrap().unwrap();

        assert_eq!(runner.max_active.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn reader_waiting_on_busy_key_does_not_block_new_keys() {
        let gate = Arc::new(Semaphore::new(0));
        let runner = Arc::new(EchoRunner {
            hold_on: Some(("slow", gate.clone())),
            ..EchoRunner::new(0)
        });
        let service = Arc::new(ChatService::new(runner.clone(), 10_000));

        let slow = {
            let service = service.clone();
            tokio::spawn(async move { service.handle("a", "slow").await })
        };
        while runner.active.load(Ordering::SeqCst) == 0 {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }

        // Queues on the busy slot for "a".
        let reader = {
            let service = service.clone();
            tokio::spawn(async move { service.sessions().history("a").await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        let fast = tokio::time::timeout(Duration::from_secs(1), service.handle("b", "fast")).await;
        assert_eq!(fast.expect("new key waited on an unrelated turn").unwrap().reply, "echo: fast");

        gate.add_permits(1);
        slow.await.unwrap().unwrap();
        assert_eq!(reader.await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn reset_during_a_turn_keeps_same_key_turns_serialized() {
        let runner = Arc::new(EchoRunner::new(50));
        let service = Arc::new(ChatService::new(runner.clone(), 10_000));

        let first = {
            let service = service.clone();
            tokio::spawn(async move { service.handle("a", "first").await })
        };
        while runner.active.load(Ordering::SeqCst) == 0 {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }

        service.sessions().reset("a").await;
        let second = {
            let service = service.clone();
            tokio::spawn(async move { service.handle("a", "second").await })
        };
        first.await.unwrap().unwrap();
        second.await.unwrap().unwrap();

        assert_eq!(runner.max_active.load(Ordering::SeqCst), 1);
        let history = service.sessions().history("a").await;
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].content, "second");
    }

    #[tokio::test]
    async fn reset_forgets_one_conversation() {
        let service = ChatService::new(Arc::new(EchoRunner::new(0)), 10_000);
        service.handle("a", "one").await.unwrap();
        service.handle("b", "two").await.unwrap();
        service.sessions().reset("a").await;
        assert!(service.sessions().history("a").await.is_empty());
        assert_eq!(service.sessions().history("b").await.len(), 2);
    }
}
