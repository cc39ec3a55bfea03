//! Shared test helpers for agent tests.

use async_trait::async_trait;
use openloop_core::error::ProviderError;
use openloop_core::message::ToolCall;
use openloop_core::provider::{Provider, ProviderRequest, ProviderResponse, ToolDefinition, Usage};
use openloop_core::tool::{ToolDispatcher, error_payload};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

/// A mock provider that returns a sequence of scripted responses.
///
/// Each call to `complete` returns the next response in the queue and records
/// the request it was given. Panics if more calls are made than responses provided.
pub struct SequentialMockProvider {
    responses: Mutex<Vec<Result<ProviderResponse, ProviderError>>>,
    requests: Mutex<Vec<ProviderRequest>>,
    delay: Option<Duration>,
}

impl SequentialMockProvider {
    pub fn new(responses: Vec<ProviderResponse>) -> Self {
        Self {
            responses: Mutex::new(responses.into_iter().map(Ok).collect()),
            requests: Mutex::new(Vec::new()),
            delay: None,
        }
    }

    /// Create a provider that returns a single text response (no tool calls).
    pub fn single_text(text: &str) -> Self {
        Self::new(vec![make_text_response(text)])
    }

    /// Create a provider whose first call fails.
    pub fn failing(error: ProviderError) -> Self {
        Self {
            responses: Mutex::new(vec![Err(error)]),
            requests: Mutex::new(Vec::new()),
            delay: None,
        }
    }

    /// Sleep before answering each call.
    pub fn with_delay_ms(mut self, ms: u64) -> Self {
        self.delay = Some(Duration::from_millis(ms));
        self
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Provider for SequentialMockProvider {
    fn name(&self) -> &str {
        "sequential_mock"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let next = {
            let mut requests = self.requests.lock().unwrap();
            let mut responses = self.responses.lock().unwrap();
            let call = requests.len();
            requests.push(request);
            assert!(
                !responses.is_empty(),
                "SequentialMockProvider: no more responses (call #{call})"
            );
            responses.remove(0)
        };

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        next
    }
}

/// Create a simple text response (no tool calls).
pub fn make_text_response(text: &str) -> ProviderResponse {
    ProviderResponse {
        content: text.to_string(),
        tool_calls: vec![],
        usage: Some(Usage {
            prompt_tokens: 10,
            completion_tokens: 5,
            total_tokens: 15,
        }),
        model: "mock-model".into(),
    }
}

/// Create a response with tool calls and optional text content.
pub fn make_tool_call_response(tool_calls: Vec<ToolCall>, text: &str) -> ProviderResponse {
    ProviderResponse {
        tool_calls,
        ..make_text_response(text)
    }
}

/// Helper to create a tool call with id `call_<name>`.
pub fn make_tool_call(name: &str, args: Value) -> ToolCall {
    ToolCall::new(format!("call_{name}"), name, args)
}

/// A dispatcher that answers `{"tool": <name>}` and records what was called.
pub struct RecordingDispatcher {
    calls: Mutex<Vec<String>>,
    errors: HashMap<String, String>,
    delays: HashMap<String, Duration>,
}

impl RecordingDispatcher {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            errors: HashMap::new(),
            delays: HashMap::new(),
        }
    }

    /// Make `tool` answer with an error payload.
    pub fn with_error(mut self, tool: &str, message: &str) -> Self {
        self.errors.insert(tool.to_string(), message.to_string());
        self
    }

    /// Make `tool` take `ms` milliseconds.
    pub fn with_delay(mut self, tool: &str, ms: u64) -> Self {
        self.delays.insert(tool.to_string(), Duration::from_millis(ms));
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ToolDispatcher for RecordingDispatcher {
    fn definitions(&self) -> Vec<ToolDefinition> {
        vec![ToolDefinition {
            name: "get_time".into(),
            description: "Get the current date and time".into(),
            parameters: json!({"type": "object", "properties": {}}),
        }]
    }

    async fn execute(&self, name: &str, _params: &Value) -> String {
        self.calls.lock().unwrap().push(name.to_string());
        if let Some(delay) = self.delays.get(name) {
            tokio::time::sleep(*delay).await;
        }
        match self.errors.get(name) {
            Some(message) => error_payload(message),
            None => json!({ "tool": name }).to_string(),
        }
    }
}
