//! Memory tools: the assistant's journal of observations, decisions and blockers.

use crate::args::{
    limit, optional_datetime, optional_enum, optional_i64, optional_str, optional_tags,
    required_i64, required_str,
};
use crate::payload;
use async_trait::async_trait;
use openloop_core::error::ToolError;
use openloop_core::store::{DEFAULT_MEMORY_LIMIT, MemoryQuery, MemoryUpdate, NewMemory, Store};
use openloop_core::tool::Tool;
use serde_json::{Value, json};
use std::sync::Arc;

const MAX_MEMORY_LIMIT: usize = 50;

const CATEGORIES: [&str; 6] = [
    "observation",
    "decision",
    "blocker",
    "preference",
    "event",
    "reflection",
];

pub struct SaveMemoryTool {
    store: Arc<dyn Store>,
}

impl SaveMemoryTool {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for SaveMemoryTool {
    fn name(&self) -> &str {
        "save_memory"
    }

    fn description(&self) -> &str {
        "Remember something worth recalling later: an observation, a decision, a blocker, \
         a preference, an event or a reflection. Set expires_at for facts that go stale."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "content": { "type": "string" },
                "category": {
                    "type": "string",
                    "enum": CATEGORIES,
                    "description": "Defaults to observation"
                },
                "tags": { "type": "array", "items": { "type": "string" } },
                "thing_id": { "type": "integer", "description": "Related thing, if any" },
                "expires_at": {
                    "type": "string",
                    "description": "When to forget this (RFC 3339 or YYYY-MM-DD HH:MM)"
                }
            },
            "required": ["content"]
        })
    }

    async fn execute(&self, arguments: Value) -> Result<Value, ToolError> {
        let memory = NewMemory {
            content: required_str(&arguments, "content")?.to_string(),
            category: optional_enum(&arguments, "category")?.unwrap_or_default(),
            source: "agent".into(),
            tags: optional_tags(&arguments, "tags")?.unwrap_or_default(),
            thing_id: optional_i64(&arguments, "thing_id")?,
            expires_at: optional_datetime(&arguments, "expires_at")?,
        };
        let id = self.store.save_memory(memory).await?;
        Ok(json!({ "id": id, "status": "saved" }))
    }
}

pub struct SearchMemoriesTool {
    store: Arc<dyn Store>,
}

impl SearchMemoriesTool {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for SearchMemoriesTool {
    fn name(&self) -> &str {
        "search_memories"
    }

    fn description(&self) -> &str {
        "Search memories by text and filters. Without a query, returns the newest matches."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": { "type": "string", "description": "Full-text search terms" },
                "category": { "type": "string", "enum": CATEGORIES },
                "tag": { "type": "string" },
                "thing_id": { "type": "integer" },
                "since": { "type": "string", "description": "Only memories created after this time" },
                "limit": { "type": "integer", "description": "Default 10, at most 50" }
            }
        })
    }

    async fn execute(&self, arguments: Value) -> Result<Value, ToolError> {
        let query = MemoryQuery {
            query: optional_str(&arguments, "query").map(str::to_string),
            category: optional_enum(&arguments, "category")?,
            tag: optional_str(&arguments, "tag").map(str::to_string),
            thing_id: optional_i64(&arguments, "thing_id")?,
            since: optional_datetime(&arguments, "since")?,
            limit: limit(&arguments, DEFAULT_MEMORY_LIMIT, MAX_MEMORY_LIMIT)?,
        };
        let memories = self.store.search_memories(&query).await?;
        payload(self.name(), &memories)
    }
}

pub struct ListRecentMemoriesTool {
    store: Arc<dyn Store>,
}

impl ListRecentMemoriesTool {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for ListRecentMemoriesTool {
    fn name(&self) -> &str {
        "list_recent_memories"
    }

    fn description(&self) -> &str {
        "The most recent memories, optionally of one category."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "category": { "type": "string", "enum": CATEGORIES },
                "limit": { "type": "integer", "description": "Default 10, at most 50" }
            }
        })
    }

    async fn execute(&self, arguments: Value) -> Result<Value, ToolError> {
        let category = optional_enum(&arguments, "category")?;
        let limit = limit(&arguments, DEFAULT_MEMORY_LIMIT, MAX_MEMORY_LIMIT)?;
        let memories = self.store.list_recent_memories(category, limit).await?;
        payload(self.name(), &memories)
    }
}

pub struct UpdateMemoryTool {
    store: Arc<dyn Store>,
}

impl UpdateMemoryTool {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for UpdateMemoryTool {
    fn name(&self) -> &str {
        "update_memory"
    }

    fn description(&self) -> &str {
        "Correct or reclassify a memory. Only the fields given are updated."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "id": { "type": "integer" },
                "content": { "type": "string" },
                "category": { "type": "string", "enum": CATEGORIES },
                "tags": { "type": "array", "items": { "type": "string" } },
                "expires_at": { "type": "string" }
            },
            "required": ["id"]
        })
    }

    async fn execute(&self, arguments: Value) -> Result<Value, ToolError> {
        let id = required_i64(&arguments, "id")?;
        let update = MemoryUpdate {
            content: optional_str(&arguments, "content").map(str::to_string),
            category: optional_enum(&arguments, "category")?,
            tags: optional_tags(&arguments, "tags")?,
            expires_at: optional_datetime(&arguments, "expires_at")?,
        };
        if update.is_empty() {
            return Err(ToolError::InvalidArguments("nothing to update".into()));
        }
        self.store.update_memory(id, update).await?;
        Ok(json!({ "status": "updated" }))
    }
}

pub struct DeleteMemoryTool {
    store: Arc<dyn Store>,
}

impl DeleteMemoryTool {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for DeleteMemoryTool {
    fn name(&self) -> &str {
        "delete_memory"
    }

    fn description(&self) -> &str {
        "Forget a memory that is wrong or no longer relevant."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": { "id": { "type": "integer" } },
            "required": ["id"]
        })
    }

    async fn execute(&self, arguments: Value) -> Result<Value, ToolError> {
        let id = required_i64(&arguments, "id")?;
        self.store.delete_memory(id).await?;
        Ok(json!({ "status": "deleted" }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use openloop_store::InMemoryStore;

    fn store() -> Arc<dyn Store> {
        Arc::new(InMemoryStore::new())
    }

    #[tokio::test]
    async fn save_and_search() {
        let store = store();
        let saved = SaveMemoryTool::new(store.clone())
            .execute(json!({
                "content": "Waiting on the landlord about the lease",
                "category": "blocker",
                "tags": ["home"]
            }))
            .await
            .unwrap();
        assert_eq!(saved["status"], "saved");

        let found = SearchMemoriesTool::new(store.clone())
            .execute(json!({"query": "landlord", "category": "blocker"}))
            .await
            .unwrap();
        assert_eq!(found.as_array().unwrap().len(), 1);
        assert_eq!(found[0]["source"], "agent");
        assert_eq!(found[0]["tags"], json!(["home"]));

        let none = SearchMemoriesTool::new(store)
            .execute(json!({"query": "landlord", "category": "decision"}))
            .await
            .unwrap();
        assert_eq!(none, json!([]));
    }

    #[tokio::test]
    async fn invalid_category_is_reported() {
        let err = SaveMemoryTool::new(store())
            .execute(json!({"content": "x", "category": "gossip"}))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "invalid arguments: invalid category 'gossip'");
    }

    #[tokio::test]
    async fn recent_respects_limit() {
        let store = store();
        let save = SaveMemoryTool::new(store.clone());
        for i in 0..5 {
            save.execute(json!({"content": format!("fact {i}")})).await.unwrap();
        }
        let recent = ListRecentMemoriesTool::new(store)
            .execute(json!({"limit": 2}))
            .await
            .unwrap();
        assert_eq!(recent.as_array().unwrap().len(), 2);
        assert_eq!(recent[0]["content"], "fact 4");
    }

    #[tokio::test]
    async fn update_then_delete() {
        let store = store();
        let saved = SaveMemoryTool::new(store.clone())
            .execute(json!({"content": "Likes tea"}))
            .await
            .unwrap();
        let id = saved["id"].clone();

        let updated = UpdateMemoryTool::new(store.clone())
            .execute(json!({"id": id, "category": "preference"}))
            .await
            .unwrap();
        assert_eq!(updated, json!({"status": "updated"}));

        let deleted = DeleteMemoryTool::new(store.clone())
            .execute(json!({"id": id}))
            .await
            .unwrap();
        assert_eq!(deleted, json!({"status": "deleted"}));

        assert!(DeleteMemoryTool::new(store).execute(json!({"id": id})).await.is_err());
    }
}
