//! The tool-calling control loop.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use chrono::Utc;
use futures::future::join_all;
use openloop_config::AgentConfig;
use openloop_core::error::{Error, Result};
use openloop_core::event::{DomainEvent, EventBus};
use openloop_core::message::{Message, ToolCall};
use openloop_core::provider::{Provider, ProviderRequest, ToolDefinition};
use openloop_core::tool::ToolDispatcher;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::context::TokenEstimator;
use crate::prompt::SYSTEM_PROMPT;

/// Reply returned when a turn runs out of tool rounds.
pub const ROUND_LIMIT_REPLY: &str = "I hit the maximum number of tool calls. Here's what I have so far.";

/// Longest tool result echoed into the logs.
const LOG_RESULT_CHARS: usize = 200;

/// What one turn produced.
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    /// Final text for the user
    pub reply: String,

    /// The full, untrimmed history including this turn
    pub history: Vec<Message>,

    /// Model round trips made
    pub rounds: usize,

    /// True when the turn ended on the round limit rather than an answer
    pub round_limit_reached: bool,
}

/// Anything that can run one conversational turn.
///
/// Implemented by [`AgentLoop`]; the session layer and the scheduler depend on
/// this trait so they can be driven by scripted runners in tests.
#[async_trait]
pub trait TurnRunner: Send + Sync {
    async fn run_turn(&self, history: &[Message], user_text: &str) -> Result<TurnOutcome>;
}

/// The core agent loop that orchestrates LLM calls and tool execution.
pub struct AgentLoop {
    /// The LLM provider to use
    provider: Arc<dyn Provider>,

    /// Executes tool calls and supplies the catalog
    tools: Arc<dyn ToolDispatcher>,

    /// The model to use
    model: String,

    /// Sent out of band on every request
    system_prompt: String,

    /// Temperature setting
    temperature: f32,

    /// Default max tokens per response
    max_tokens: Option<u32>,

    /// Budgets and round limits
    config: AgentConfig,

    estimator: TokenEstimator,

    /// Event bus for domain events
    event_bus: Arc<EventBus>,
}

impl AgentLoop {
    /// Create a new agent loop with the built-in system prompt and default settings.
    pub fn new(
        provider: Arc<dyn Provider>,
        tools: Arc<dyn ToolDispatcher>,
        model: impl Into<String>,
    ) -> Self {
        let config = AgentConfig::default();
        Self {
            provider,
            tools,
            model: model.into(),
            system_prompt: SYSTEM_PROMPT.to_string(),
            temperature: 0.7,
            max_tokens: None,
            estimator: TokenEstimator::new(config.estimation),
            config,
            event_bus: Arc::new(EventBus::default()),
        }
    }

    /// Replace the agent settings (budgets, round limit, estimation constants).
    pub fn with_config(mut self, config: AgentConfig) -> Self {
        self.estimator = TokenEstimator::new(config.estimation);
        self.config = config;
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Set the default max tokens per LLM response.
    pub fn with_max_tokens(mut self, max: u32) -> Self {
        self.max_tokens = Some(max);
        self
    }

    /// Publish events on a shared bus.
    pub fn with_event_bus(mut self, event_bus: Arc<EventBus>) -> Self {
        self.event_bus = event_bus;
        self
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn estimator(&self) -> &TokenEstimator {
        &self.estimator
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.event_bus
    }

    /// Tokens left for history once the system prompt and catalog are paid for,
    /// never below the configured floor.
    pub fn message_budget(&self, catalog: &[ToolDefinition]) -> usize {
        let fixed = self.estimator.tokens(&self.system_prompt) + self.estimator.tools(catalog);
        self.config
            .max_context_tokens
            .saturating_sub(fixed)
            .max(self.config.min_message_budget)
    }

    /// Run one turn: append `user_text`, call the model until it answers
    /// without tools or the round limit is hit.
    pub async fn run(&self, history: &[Message], user_text: &str) -> Result<TurnOutcome> {
        self.run_with_cancel(history, user_text, &CancellationToken::new()).await
    }

    /// Like [`run`](Self::run), aborting with [`Error::Cancelled`] as soon as
    /// `cancel` fires. The caller's history is never modified.
    pub async fn run_with_cancel(
        &self,
        history: &[Message],
        user_text: &str,
        cancel: &CancellationToken,
    ) -> Result<TurnOutcome> {
        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.extend_from_slice(history);
        messages.push(Message::user(user_text));

        let catalog = self.tools.definitions();
        let budget = self.message_budget(&catalog);
        let mut tokens_used = 0u32;

        info!(
            history = history.len(),
            budget,
            tools = catalog.len(),
            "Processing turn"
        );

        for round in 1..=self.config.max_tool_rounds {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }

            let trimmed = self.estimator.trim(&messages, budget);
            if trimmed.was_trimmed() {
                info!(
                    from = messages.len(),
                    to = trimmed.messages.len(),
                    tokens_before = trimmed.tokens_before,
                    tokens_after = trimmed.tokens_after,
                    "Context trimmed"
                );
                self.event_bus.publish(DomainEvent::ContextTrimmed {
                    messages_before: messages.len(),
                    messages_after: trimmed.messages.len(),
                    tokens_before: trimmed.tokens_before,
                    tokens_after: trimmed.tokens_after,
                    budget,
                    timestamp: Utc::now(),
                });
            }

            let request = ProviderRequest {
                model: self.model.clone(),
                system_prompt: self.system_prompt.clone(),
                messages: trimmed.messages.to_vec(),
                tools: catalog.clone(),
                temperature: self.temperature,
                max_tokens: self.max_tokens,
            };

            debug!(round, messages = request.messages.len(), "Calling provider");

            let response = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(Error::Cancelled),
                response = self.provider.complete(request) => response?,
            };

            if let Some(usage) = &response.usage {
                tokens_used = tokens_used.saturating_add(usage.total_tokens);
            }

            if response.tool_calls.is_empty() {
                self.event_bus.publish(DomainEvent::ResponseGenerated {
                    model: response.model.clone(),
                    rounds: round,
                    tokens_used,
                    timestamp: Utc::now(),
                });
                messages.push(Message::assistant(response.content.clone()));
                return Ok(TurnOutcome {
                    reply: response.content,
                    history: messages,
                    rounds: round,
                    round_limit_reached: false,
                });
            }

            debug!(round, tool_count = response.tool_calls.len(), "Executing tool calls");

            let results = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(Error::Cancelled),
                results = self.dispatch(&response.tool_calls) => results,
            };

            messages.push(Message::invocation(response.content, response.tool_calls.clone()));
            for (call, result) in response.tool_calls.iter().zip(results) {
                messages.push(Message::tool_result(&call.id, result));
            }
        }

        warn!(rounds = self.config.max_tool_rounds, "Max tool rounds reached");
        self.event_bus.publish(DomainEvent::RoundLimitReached {
            rounds: self.config.max_tool_rounds,
            timestamp: Utc::now(),
        });

        Ok(TurnOutcome {
            reply: ROUND_LIMIT_REPLY.to_string(),
            history: messages,
            rounds: self.config.max_tool_rounds,
            round_limit_reached: true,
        })
    }

    /// Execute one round's calls, returning results in call order.
    async fn dispatch(&self, calls: &[ToolCall]) -> Vec<String> {
        if self.config.parallel_tools && calls.len() > 1 {
            return join_all(calls.iter().map(|call| self.dispatch_one(call))).await;
        }

        let mut results = Vec::with_capacity(calls.len());
        for call in calls {
            results.push(self.dispatch_one(call).await);
        }
        results
    }

    async fn dispatch_one(&self, call: &ToolCall) -> String {
        let start = Instant::now();
        let result = self.tools.execute(&call.name, &call.arguments).await;
        let duration_ms = start.elapsed().as_millis() as u64;

        let success = !is_error_payload(&result);
        info!(
            tool = %call.name,
            duration_ms,
            result = %truncate(&result, LOG_RESULT_CHARS),
            "Tool executed"
        );
        self.event_bus.publish(DomainEvent::ToolExecuted {
            tool_name: call.name.clone(),
            success,
            duration_ms,
            timestamp: Utc::now(),
        });

        result
    }
}

#[async_trait]
impl TurnRunner for AgentLoop {
    async fn run_turn(&self, history: &[Message], user_text: &str) -> Result<TurnOutcome> {
        self.run(history, user_text).await
    }
}

/// Whether a dispatcher payload is an `{"error": ...}` object.
fn is_error_payload(payload: &str) -> bool {
    serde_json::from_str::<serde_json::Value>(payload)
        .ok()
        .is_some_and(|v| v.get("error").is_some())
}

fn truncate(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{estimate_messages_tokens, group_messages};
    use crate::test_helpers::{
        RecordingDispatcher, SequentialMockProvider, make_text_response, make_tool_call,
        make_tool_call_response,
    };
    use openloop_core::error::ProviderError;
    use openloop_core::message::{MessageKind, Role};
    use serde_json::json;

    fn agent(provider: Arc<SequentialMockProvider>, tools: Arc<RecordingDispatcher>) -> AgentLoop {
        AgentLoop::new(provider, tools, "mock-model").with_system_prompt("You track things.")
    }

    #[tokio::test]
    async fn simple_text_response() {
        let provider = Arc::new(SequentialMockProvider::single_text("Hello! How can I help?"));
        let tools = Arc::new(RecordingDispatcher::new());
        let agent = agent(provider.clone(), tools.clone());

        let outcome = agent.run(&[], "Hello!").await.unwrap();
        assert_eq!(outcome.reply, "Hello! How can I help?");
        assert_eq!(outcome.rounds, 1);
        assert!(!outcome.round_limit_reached);
        // user + assistant
        assert_eq!(outcome.history.len(), 2);
        assert_eq!(outcome.history[1].role, Role::Assistant);
        assert_eq!(provider.call_count(), 1);
        assert!(tools.calls().is_empty());
    }

    #[tokio::test]
    async fn caller_history_is_not_modified() {
        let provider = Arc::new(SequentialMockProvider::single_text("noted"));
        let agent = agent(provider, Arc::new(RecordingDispatcher::new()));
        let history = vec![Message::user("earlier"), Message::assistant("ok")];

        let outcome = agent.run(&history, "again").await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(outcome.history.len(), 4);
        assert_eq!(&outcome.history[..2], history.as_slice());
    }

    #[tokio::test]
    async fn tool_round_appends_exchange_in_call_order() {
        let provider = Arc::new(SequentialMockProvider::new(vec![
            make_tool_call_response(
                vec![
                    make_tool_call("get_time", json!({})),
                    make_tool_call("list_things", json!({"status": "open"})),
                ],
                "Checking.",
            ),
            make_text_response("You have nothing open."),
        ]));
        let tools = Arc::new(RecordingDispatcher::new());
        let agent = agent(provider.clone(), tools.clone());

        let outcome = agent.run(&[], "what's open?").await.unwrap();
        assert_eq!(outcome.reply, "You have nothing open.");
        assert_eq!(outcome.rounds, 2);

        let kinds: Vec<MessageKind> = outcome.history.iter().map(|m| m.kind()).collect();
        assert_eq!(
            kinds,
            vec![
                MessageKind::Ordinary,
                MessageKind::Invocation,
                MessageKind::Result,
                MessageKind::Result,
                MessageKind::Ordinary,
            ]
        );
        assert_eq!(outcome.history[1].content, "Checking.");
        assert_eq!(outcome.history[2].tool_call_id.as_deref(), Some("call_get_time"));
        assert_eq!(outcome.history[3].tool_call_id.as_deref(), Some("call_list_things"));
        assert_eq!(outcome.history[2].role, Role::User);
        assert_eq!(tools.calls(), vec!["get_time", "list_things"]);

        // The second request carried the whole exchange.
        let requests = provider.requests();
        assert_eq!(requests[1].messages.len(), 4);
        assert_eq!(requests[1].system_prompt, "You track things.");
    }

    #[tokio::test]
    async fn parallel_dispatch_keeps_call_order() {
        let provider = Arc::new(SequentialMockProvider::new(vec![
            make_tool_call_response(
                vec![
                    make_tool_call("slow", json!({})),
                    make_tool_call("fast", json!({})),
                ],
                "",
            ),
            make_text_response("done"),
        ]));
        let tools = Arc::new(RecordingDispatcher::new().with_delay("slow", 50));
        let config = AgentConfig {
            parallel_tools: true,
            ..AgentConfig::default()
        };
        let agent = agent(provider, tools).with_config(config);

        let outcome = agent.run(&[], "go").await.unwrap();
        assert_eq!(outcome.history[2].tool_call_id.as_deref(), Some("call_slow"));
        assert_eq!(outcome.history[2].content, r#"{"tool":"slow"}"#);
        assert_eq!(outcome.history[3].tool_call_id.as_deref(), Some("call_fast"));
    }

    #[tokio::test]
    async fn round_limit_returns_fallback_with_all_exchanges() {
        let rounds = 3;
        let responses = (0..rounds)
            .map(|i| make_tool_call_response(vec![make_tool_call(&format!("t{i}"), json!({}))], ""))
            .collect();
        let provider = Arc::new(SequentialMockProvider::new(responses));
        let config = AgentConfig {
            max_tool_rounds: rounds,
            ..AgentConfig::default()
        };
        let agent = agent(provider.clone(), Arc::new(RecordingDispatcher::new())).with_config(config);
        let mut events = agent.event_bus().subscribe();

        let outcome = agent.run(&[], "loop forever").await.unwrap();
        assert_eq!(outcome.reply, ROUND_LIMIT_REPLY);
        assert!(outcome.round_limit_reached);
        assert_eq!(outcome.rounds, rounds);
        // user + 3 × (invocation + result)
        assert_eq!(outcome.history.len(), 1 + 2 * rounds);
        assert_eq!(provider.call_count(), rounds);

        let mut saw_limit = false;
        while let Ok(event) = events.try_recv() {
            if matches!(event.as_ref(), DomainEvent::RoundLimitReached { .. }) {
                saw_limit = true;
            }
        }
        assert!(saw_limit);
    }

    #[tokio::test]
    async fn tool_errors_are_fed_back_not_raised() {
        let provider = Arc::new(SequentialMockProvider::new(vec![
            make_tool_call_response(vec![make_tool_call("explode", json!({}))], ""),
            make_text_response("Sorry, that failed."),
        ]));
        let tools = Arc::new(RecordingDispatcher::new().with_error("explode", "database is locked"));
        let agent = agent(provider, tools);

        let outcome = agent.run(&[], "try it").await.unwrap();
        assert_eq!(outcome.reply, "Sorry, that failed.");
        let result: serde_json::Value = serde_json::from_str(&outcome.history[2].content).unwrap();
        assert_eq!(result["error"], "database is locked");
    }

    #[tokio::test]
    async fn transport_error_aborts_turn() {
        let provider = Arc::new(SequentialMockProvider::failing(ProviderError::Network(
            "connection refused".into(),
        )));
        let agent = agent(provider, Arc::new(RecordingDispatcher::new()));

        let err = agent.run(&[Message::user("hi")], "hello").await.unwrap_err();
        assert!(matches!(err, Error::Provider(ProviderError::Network(_))));
    }

    #[tokio::test]
    async fn cancelled_turn_stops_before_calling_provider() {
        let provider = Arc::new(SequentialMockProvider::single_text("never"));
        let agent = agent(provider.clone(), Arc::new(RecordingDispatcher::new()));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = agent.run_with_cancel(&[], "hi", &cancel).await.unwrap_err();
        assert!(matches!(err, Error::Cancelled));
        assert_eq!(provider.call_count(), 0);
    }

    #[tokio::test]
    async fn cancellation_interrupts_pending_provider_call() {
        let provider = Arc::new(SequentialMockProvider::single_text("late").with_delay_ms(10_000));
        let agent = agent(provider, Arc::new(RecordingDispatcher::new()));
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let err = agent.run_with_cancel(&[], "hi", &cancel).await.unwrap_err();
        assert!(matches!(err, Error::Cancelled));
    }

    #[test]
    fn budget_subtracts_fixed_costs_and_respects_floor() {
        let provider = Arc::new(SequentialMockProvider::new(vec![]));
        let tools = Arc::new(RecordingDispatcher::new());
        let catalog = tools.definitions();

        let roomy = agent(provider.clone(), tools.clone()).with_config(AgentConfig {
            max_context_tokens: 10_000,
            ..AgentConfig::default()
        });
        let fixed = roomy.estimator().tokens("You track things.") + roomy.estimator().tools(&catalog);
        assert_eq!(roomy.message_budget(&catalog), 10_000 - fixed);

        let cramped = agent(provider, tools).with_config(AgentConfig {
            max_context_tokens: 10,
            ..AgentConfig::default()
        });
        assert_eq!(cramped.message_budget(&catalog), 1000);
    }

    #[tokio::test]
    async fn requests_are_trimmed_but_returned_history_is_not() {
        let long_history: Vec<Message> = (0..200)
            .flat_map(|i| {
                [
                    Message::user(format!("question {i} {}", "x".repeat(100))),
                    Message::assistant(format!("answer {i} {}", "y".repeat(100))),
                ]
            })
            .collect();
        let provider = Arc::new(SequentialMockProvider::single_text("fine"));
        let agent = agent(provider.clone(), Arc::new(RecordingDispatcher::new())).with_config(
            AgentConfig {
                max_context_tokens: 1500,
                min_message_budget: 1000,
                ..AgentConfig::default()
            },
        );
        let budget = agent.message_budget(&RecordingDispatcher::new().definitions());
        let mut events = agent.event_bus().subscribe();

        let outcome = agent.run(&long_history, "latest").await.unwrap();
        assert_eq!(outcome.history.len(), long_history.len() + 2);

        let sent = &provider.requests()[0].messages;
        assert!(sent.len() < long_history.len());
        assert!(estimate_messages_tokens(sent) <= budget);
        assert_eq!(sent.last().unwrap().content, "latest");

        let event = events.try_recv().unwrap();
        assert!(matches!(event.as_ref(), DomainEvent::ContextTrimmed { .. }));
    }

    #[tokio::test]
    async fn trimming_each_round_keeps_exchanges_whole() {
        let provider = Arc::new(SequentialMockProvider::new(vec![
            make_tool_call_response(vec![make_tool_call("a", json!({"pad": "z".repeat(2000)}))], ""),
            make_tool_call_response(vec![make_tool_call("b", json!({"pad": "z".repeat(2000)}))], ""),
            make_text_response("done"),
        ]));
        let agent = agent(provider.clone(), Arc::new(RecordingDispatcher::new())).with_config(
            AgentConfig {
                max_context_tokens: 0,
                min_message_budget: 700,
                ..AgentConfig::default()
            },
        );

        let outcome = agent.run(&[], "go").await.unwrap();
        assert_eq!(outcome.reply, "done");
        assert_eq!(outcome.history.len(), 6);

        for request in provider.requests() {
            for group in group_messages(&request.messages) {
                if group.messages[0].is_invocation() {
                    assert_eq!(group.len(), 2);
                }
            }
            assert!(!request.messages[0].is_result());
        }
        // The third request could not fit both exchanges.
        let third = &provider.requests()[2].messages;
        assert_eq!(third.len(), 2);
        assert_eq!(third[0].tool_calls[0].name, "b");
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate("héllo", 2), "hé...");
        assert_eq!(truncate("short", 200), "short");
    }

    #[test]
    fn error_payload_detection() {
        assert!(is_error_payload(r#"{"error":"boom"}"#));
        assert!(!is_error_payload(r#"{"status":"saved"}"#));
        assert!(!is_error_payload("not json"));
    }

    #[tokio::test]
    async fn empty_round_limit_is_degraded_immediately() {
        let provider = Arc::new(SequentialMockProvider::new(vec![]));
        let agent = agent(provider.clone(), Arc::new(RecordingDispatcher::new())).with_config(
            AgentConfig {
                max_tool_rounds: 0,
                ..AgentConfig::default()
            },
        );
        let outcome = agent.run(&[], "hi").await.unwrap();
        assert!(outcome.round_limit_reached);
        assert_eq!(provider.call_count(), 0);
    }
}
