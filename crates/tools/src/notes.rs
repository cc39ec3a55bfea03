//! Key/value notes: a scratchpad for facts that don't fit anywhere else.

use crate::args::required_str;
use async_trait::async_trait;
use openloop_core::error::ToolError;
use openloop_core::store::Store;
use openloop_core::tool::Tool;
use serde_json::{Value, json};
use std::sync::Arc;

pub struct GetNoteTool {
    store: Arc<dyn Store>,
}

impl GetNoteTool {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for GetNoteTool {
    fn name(&self) -> &str {
        "get_note"
    }

    fn description(&self) -> &str {
        "Read a note by key."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": { "key": { "type": "string" } },
            "required": ["key"]
        })
    }

    async fn execute(&self, arguments: Value) -> Result<Value, ToolError> {
        let key = required_str(&arguments, "key")?;
        Ok(match self.store.get_note(key).await? {
            Some(value) => json!({ "key": key, "value": value }),
            None => json!({ "value": null, "message": "no note found for this key" }),
        })
    }
}

pub struct SetNoteTool {
    store: Arc<dyn Store>,
}

impl SetNoteTool {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for SetNoteTool {
    fn name(&self) -> &str {
        "set_note"
    }

    fn description(&self) -> &str {
        "Save a note under a key, replacing any previous value."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "key": { "type": "string" },
                "value": { "type": "string" }
            },
            "required": ["key", "value"]
        })
    }

    async fn execute(&self, arguments: Value) -> Result<Value, ToolError> {
        let key = required_str(&arguments, "key")?;
        let value = arguments
            .get("value")
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::InvalidArguments("'value' is required".into()))?;
        self.store.set_note(key, value).await?;
        Ok(json!({ "status": "saved" }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use openloop_store::InMemoryStore;

    #[tokio::test]
    async fn missing_note_is_not_an_error() {
        let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
        let result = GetNoteTool::new(store).execute(json!({"key": "wifi"})).await.unwrap();
        assert_eq!(result, json!({"value": null, "message": "no note found for this key"}));
    }

    #[tokio::test]
    async fn set_then_get() {
        let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
        let saved = SetNoteTool::new(store.clone())
            .execute(json!({"key": "wifi", "value": "hunter2"}))
            .await
            .unwrap();
        assert_eq!(saved, json!({"status": "saved"}));

        let got = GetNoteTool::new(store).execute(json!({"key": "wifi"})).await.unwrap();
        assert_eq!(got["value"], "hunter2");
    }
}
