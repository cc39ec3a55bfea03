//! OpenAI-compatible provider implementation.
//!
//! Works with OpenAI itself and with Ollama's `/v1` endpoint, plus any other
//! server exposing `/chat/completions` with function calling.

use crate::http;
use async_trait::async_trait;
use openloop_core::error::ProviderError;
use openloop_core::message::{Message, Role, ToolCall};
use openloop_core::provider::{Provider, ProviderRequest, ProviderResponse, ToolDefinition, Usage};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const OLLAMA_BASE_URL: &str = "http://localhost:11434/v1";
pub const OPENAI_DEFAULT_MODEL: &str = "gpt-4o";
pub const OLLAMA_DEFAULT_MODEL: &str = "llama3.1";

/// An OpenAI-compatible LLM provider.
pub struct OpenAiCompatProvider {
    name: String,
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAiCompatProvider {
    pub fn new(name: impl Into<String>, base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            client: http::client(Duration::from_secs(120)),
        }
    }

    /// OpenAI proper.
    pub fn openai(api_key: impl Into<String>) -> Self {
        Self::new("openai", OPENAI_BASE_URL, api_key)
    }

    /// Ollama ignores the key, but the header must still be present.
    pub fn ollama(base_url: Option<&str>) -> Self {
        Self::new("ollama", base_url.unwrap_or(OLLAMA_BASE_URL), "ollama")
    }

    /// Convert history to chat-completions messages, system prompt first.
    fn to_api_messages(system_prompt: &str, messages: &[Message]) -> Vec<ApiMessage> {
        let mut result = Vec::with_capacity(messages.len() + 1);
        if !system_prompt.is_empty() {
            result.push(ApiMessage {
                role: "system".into(),
                content: Some(system_prompt.to_string()),
                tool_calls: None,
                tool_call_id: None,
            });
        }

        for m in messages {
            if m.is_result() {
                result.push(ApiMessage {
                    role: "tool".into(),
                    content: Some(m.content.clone()),
                    tool_calls: None,
                    tool_call_id: m.tool_call_id.clone(),
                });
                continue;
            }

            let role = match m.role {
                Role::User => "user",
                Role::Assistant => "assistant",
            };
            let tool_calls = (!m.tool_calls.is_empty()).then(|| {
                m.tool_calls
                    .iter()
                    .map(|tc| ApiToolCall {
                        id: Some(tc.id.clone()),
                        r#type: "function".into(),
                        function: ApiFunction {
                            name: tc.name.clone(),
                            arguments: tc.arguments.to_string(),
                        },
                    })
                    .collect::<Vec<_>>()
            });
            let content = if tool_calls.is_some() && m.content.is_empty() {
                None
            } else {
                Some(m.content.clone())
            };
            result.push(ApiMessage {
                role: role.into(),
                content,
                tool_calls,
                tool_call_id: None,
            });
        }

        result
    }

    fn to_api_tools(tools: &[ToolDefinition]) -> Vec<ApiToolDefinition<'_>> {
        tools
            .iter()
            .map(|t| ApiToolDefinition {
                r#type: "function",
                function: ApiToolFunction {
                    name: &t.name,
                    description: &t.description,
                    parameters: &t.parameters,
                },
            })
            .collect()
    }

    fn request_body(request: &ProviderRequest) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": request.model,
            "messages": Self::to_api_messages(&request.system_prompt, &request.messages),
            "temperature": request.temperature,
            "stream": false,
        });
        if let Some(max_tokens) = request.max_tokens {
            body["max_tokens"] = serde_json::json!(max_tokens);
        }
        if !request.tools.is_empty() {
            body["tools"] = serde_json::json!(Self::to_api_tools(&request.tools));
        }
        body
    }

    fn into_provider_response(resp: ApiResponse) -> Result<ProviderResponse, ProviderError> {
        let choice = resp
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::InvalidResponse("No choices in response".into()))?;

        let tool_calls = choice
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(|tc| {
                let id = tc
                    .id
                    .filter(|id| !id.is_empty())
                    .unwrap_or_else(|| format!("call_{}", uuid::Uuid::new_v4().simple()));
                let arguments = parse_arguments(&tc.function.name, &tc.function.arguments);
                ToolCall::new(id, tc.function.name, arguments)
            })
            .collect();

        Ok(ProviderResponse {
            content: choice.message.content.unwrap_or_default(),
            tool_calls,
            usage: resp.usage.map(|u| Usage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
                total_tokens: u.total_tokens,
            }),
            model: resp.model,
        })
    }
}

/// Function arguments arrive as a JSON string. Unparseable text is passed
/// through as a string so the tool reports the problem to the model.
fn parse_arguments(tool: &str, raw: &str) -> serde_json::Value {
    if raw.trim().is_empty() {
        return serde_json::json!({});
    }
    match serde_json::from_str(raw) {
        Ok(value) => value,
        Err(e) => {
            warn!(tool, error = %e, "Tool call arguments are not valid JSON");
            serde_json::Value::String(raw.to_string())
        }
    }
}

#[async_trait]
impl Provider for OpenAiCompatProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = Self::request_body(&request);

        debug!(
            provider = %self.name,
            model = %request.model,
            messages = request.messages.len(),
            tools = request.tools.len(),
            "Sending completion request"
        );

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(http::network_error)?;
        let response = http::check_status(&self.name, response).await?;

        let api_response: ApiResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(format!("Failed to parse response: {e}")))?;

        Self::into_provider_response(api_response)
    }
}

// --- OpenAI API types ---

#[derive(Debug, Serialize, Deserialize)]
struct ApiMessage {
    role: String,
    #[serde(default)]
    content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<ApiToolCall>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolCall {
    #[serde(default)]
    id: Option<String>,
    #[serde(default = "function_type")]
    r#type: String,
    function: ApiFunction,
}

fn function_type() -> String {
    "function".into()
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiFunction {
    name: String,
    #[serde(default)]
    arguments: String,
}

#[derive(Debug, Serialize)]
struct ApiToolDefinition<'a> {
    r#type: &'static str,
    function: ApiToolFunction<'a>,
}

#[derive(Debug, Serialize)]
struct ApiToolFunction<'a> {
    name: &'a str,
    description: &'a str,
    parameters: &'a serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    model: String,
    choices: Vec<ApiChoice>,
    #[serde(default)]
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiMessage,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn constructors() {
        let provider = OpenAiCompatProvider::ollama(None);
        assert_eq!(provider.name(), "ollama");
        assert_eq!(provider.base_url, OLLAMA_BASE_URL);

        let provider = OpenAiCompatProvider::new("custom", "http://gpu-box:8000/v1/", "k");
        assert_eq!(provider.base_url, "http://gpu-box:8000/v1");
    }

    #[test]
    fn system_prompt_leads_and_results_use_tool_role() {
        let messages = vec![
            Message::user("What time is it?"),
            Message::invocation("", vec![ToolCall::new("call_1", "get_time", json!({}))]),
            Message::tool_result("call_1", r#"{"day":"Friday"}"#),
        ];
        let api = serde_json::to_value(OpenAiCompatProvider::to_api_messages("Be brief.", &messages)).unwrap();
        assert_eq!(api[0], json!({"role": "system", "content": "Be brief."}));
        assert_eq!(api[1], json!({"role": "user", "content": "What time is it?"}));
        assert_eq!(
            api[2],
            json!({
                "role": "assistant",
                "content": null,
                "tool_calls": [{
                    "id": "call_1",
                    "type": "function",
                    "function": {"name": "get_time", "arguments": "{}"}
                }]
            })
        );
        assert_eq!(
            api[3],
            json!({"role": "tool", "content": "{\"day\":\"Friday\"}", "tool_call_id": "call_1"})
        );
    }

    #[test]
    fn body_includes_tools_and_max_tokens() {
        let request = ProviderRequest {
            model: OPENAI_DEFAULT_MODEL.into(),
            system_prompt: String::new(),
            messages: vec![Message::user("hi")],
            tools: vec![ToolDefinition {
                name: "get_time".into(),
                description: "Current time".into(),
                parameters: json!({"type": "object", "properties": {}}),
            }],
            temperature: 0.2,
            max_tokens: Some(512),
        };
        let body = OpenAiCompatProvider::request_body(&request);
        assert_eq!(body["max_tokens"], 512);
        assert_eq!(body["stream"], false);
        assert_eq!(body["messages"].as_array().unwrap().len(), 1);
        assert_eq!(body["tools"][0]["type"], "function");
        assert_eq!(body["tools"][0]["function"]["name"], "get_time");
    }

    #[test]
    fn stringified_arguments_are_parsed() {
        let resp: ApiResponse = serde_json::from_value(json!({
            "model": "gpt-4o",
            "choices": [{
                "message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [{
                        "id": "call_9",
                        "type": "function",
                        "function": {"name": "create_thing", "arguments": "{\"title\":\"Call plumber\"}"}
                    }]
                }
            }],
            "usage": {"prompt_tokens": 12, "completion_tokens": 8, "total_tokens": 20}
        }))
        .unwrap();

        let pr = OpenAiCompatProvider::into_provider_response(resp).unwrap();
        assert!(pr.content.is_empty());
        assert_eq!(
            pr.tool_calls,
            vec![ToolCall::new("call_9", "create_thing", json!({"title": "Call plumber"}))]
        );
        assert_eq!(pr.usage.unwrap().total_tokens, 20);
    }

    #[test]
    fn missing_ids_and_empty_arguments() {
        let resp: ApiResponse = serde_json::from_value(json!({
            "model": "llama3.1",
            "choices": [{
                "message": {
                    "role": "assistant",
                    "content": "",
                    "tool_calls": [{"function": {"name": "get_time", "arguments": ""}}]
                }
            }]
        }))
        .unwrap();

        let pr = OpenAiCompatProvider::into_provider_response(resp).unwrap();
        assert!(pr.tool_calls[0].id.starts_with("call_"));
        assert_eq!(pr.tool_calls[0].arguments, json!({}));
    }

    #[test]
    fn malformed_arguments_pass_through_as_text() {
        assert_eq!(parse_arguments("get_note", "{key:"), json!("{key:"));
    }

    #[test]
    fn empty_choices_is_invalid() {
        let resp: ApiResponse = serde_json::from_value(json!({"model": "gpt-4o", "choices": []})).unwrap();
        let err = OpenAiCompatProvider::into_provider_response(resp).unwrap_err();
        assert!(matches!(err, ProviderError::InvalidResponse(_)));
    }
}
