//! Tools over things: the open loops the assistant tracks.

use crate::payload;
use crate::args::{
    optional_date, optional_enum, optional_str, optional_tags, required_i64, required_str,
};
use async_trait::async_trait;
use chrono::Local;
use openloop_core::error::ToolError;
use openloop_core::store::{NewThing, Store, ThingFilter, ThingUpdate};
use openloop_core::tool::Tool;
use serde_json::{Value, json};
use std::sync::Arc;

pub struct ListThingsTool {
    store: Arc<dyn Store>,
}

impl ListThingsTool {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for ListThingsTool {
    fn name(&self) -> &str {
        "list_things"
    }

    fn description(&self) -> &str {
        "List tracked things (tasks, commitments, open loops), most urgent first. \
         Filter by status, priority or tag."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "status": {
                    "type": "string",
                    "enum": ["open", "active", "done", "dropped"],
                    "description": "Only things with this status"
                },
                "priority": {
                    "type": "string",
                    "enum": ["low", "normal", "high", "urgent"]
                },
                "tag": { "type": "string", "description": "Only things carrying this tag" }
            }
        })
    }

    async fn execute(&self, arguments: Value) -> Result<Value, ToolError> {
        let filter = ThingFilter {
            status: optional_enum(&arguments, "status")?,
            priority: optional_enum(&arguments, "priority")?,
            tag: optional_str(&arguments, "tag").map(str::to_string),
        };
        let things = self.store.list_things(&filter).await?;
        payload(self.name(), &things)
    }
}

pub struct CreateThingTool {
    store: Arc<dyn Store>,
}

impl CreateThingTool {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for CreateThingTool {
    fn name(&self) -> &str {
        "create_thing"
    }

    fn description(&self) -> &str {
        "Start tracking something the user needs to do or follow up on."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "title": { "type": "string", "description": "Short description" },
                "notes": { "type": "string", "description": "Longer context" },
                "priority": {
                    "type": "string",
                    "enum": ["low", "normal", "high", "urgent"],
                    "description": "Defaults to normal"
                },
                "due_date": { "type": "string", "description": "YYYY-MM-DD" },
                "tags": { "type": "array", "items": { "type": "string" } }
            },
            "required": ["title"]
        })
    }

    async fn execute(&self, arguments: Value) -> Result<Value, ToolError> {
        let thing = NewThing {
            title: required_str(&arguments, "title")?.to_string(),
            notes: optional_str(&arguments, "notes").map(str::to_string),
            priority: optional_enum(&arguments, "priority")?.unwrap_or_default(),
            due_date: optional_date(&arguments, "due_date")?,
            tags: optional_tags(&arguments, "tags")?.unwrap_or_default(),
        };
        let id = self.store.create_thing(thing).await?;
        Ok(json!({ "id": id, "status": "created" }))
    }
}

pub struct UpdateThingTool {
    store: Arc<dyn Store>,
}

impl UpdateThingTool {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for UpdateThingTool {
    fn name(&self) -> &str {
        "update_thing"
    }

    fn description(&self) -> &str {
        "Change a tracked thing. Only the fields given are updated."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "id": { "type": "integer" },
                "title": { "type": "string" },
                "notes": { "type": "string" },
                "status": { "type": "string", "enum": ["open", "active", "done", "dropped"] },
                "priority": { "type": "string", "enum": ["low", "normal", "high", "urgent"] },
                "due_date": { "type": "string", "description": "YYYY-MM-DD" },
                "tags": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "Replaces the existing tags"
                }
            },
            "required": ["id"]
        })
    }

    async fn execute(&self, arguments: Value) -> Result<Value, ToolError> {
        let id = required_i64(&arguments, "id")?;
        let update = ThingUpdate {
            title: optional_str(&arguments, "title").map(str::to_string),
            notes: optional_str(&arguments, "notes").map(str::to_string),
            status: optional_enum(&arguments, "status")?,
            priority: optional_enum(&arguments, "priority")?,
            due_date: optional_date(&arguments, "due_date")?,
            tags: optional_tags(&arguments, "tags")?,
        };
        if update.is_empty() {
            return Err(ToolError::InvalidArguments("nothing to update".into()));
        }
        self.store.update_thing(id, update).await?;
        Ok(json!({ "status": "updated" }))
    }
}

pub struct CompleteThingTool {
    store: Arc<dyn Store>,
}

impl CompleteThingTool {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for CompleteThingTool {
    fn name(&self) -> &str {
        "complete_thing"
    }

    fn description(&self) -> &str {
        "Mark a thing as done."
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
        self.store.complete_thing(id).await?;
        Ok(json!({ "status": "completed" }))
    }
}

pub struct GetSummaryTool {
    store: Arc<dyn Store>,
}

impl GetSummaryTool {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for GetSummaryTool {
    fn name(&self) -> &str {
        "get_summary"
    }

    fn description(&self) -> &str {
        "Overview of open work: how many things are open, which are overdue, and what was added recently."
    }

    fn parameters_schema(&self) -> Value {
        json!({ "type": "object", "properties": {} })
    }

    async fn execute(&self, _arguments: Value) -> Result<Value, ToolError> {
        let summary = self.store.summary(Local::now().date_naive()).await?;
        payload(self.name(), &summary)
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
    async fn create_then_list() {
        let store = store();
        let created = CreateThingTool::new(store.clone())
            .execute(json!({
                "title": "Renew passport",
                "priority": "high",
                "due_date": "2026-05-01",
                "tags": "travel, errand"
            }))
            .await
            .unwrap();
        assert_eq!(created["status"], "created");
        assert!(created["id"].as_i64().is_some());

        let listed = ListThingsTool::new(store)
            .execute(json!({"tag": "travel"}))
            .await
            .unwrap();
        assert_eq!(listed[0]["title"], "Renew passport");
        assert_eq!(listed[0]["priority"], "high");
        assert_eq!(listed[0]["due_date"], "2026-05-01");
    }

    #[tokio::test]
    async fn create_requires_title() {
        let err = CreateThingTool::new(store()).execute(json!({})).await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }

    #[tokio::test]
    async fn update_and_complete() {
        let store = store();
        let created = CreateThingTool::new(store.clone())
            .execute(json!({"title": "Draft report"}))
            .await
            .unwrap();
        let id = created["id"].clone();

        let updated = UpdateThingTool::new(store.clone())
            .execute(json!({"id": id, "status": "active"}))
            .await
            .unwrap();
        assert_eq!(updated, json!({"status": "updated"}));

        let done = CompleteThingTool::new(store.clone())
            .execute(json!({"id": id}))
            .await
            .unwrap();
        assert_eq!(done, json!({"status": "completed"}));

        let summary = GetSummaryTool::new(store).execute(json!({})).await.unwrap();
        assert_eq!(summary["open_count"], 0);
    }

    #[tokio::test]
    async fn update_with_no_fields_is_rejected() {
        let err = UpdateThingTool::new(store())
            .execute(json!({"id": 1}))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "invalid arguments: nothing to update");
    }

    #[tokio::test]
    async fn completing_unknown_thing_surfaces_store_error() {
        let err = CompleteThingTool::new(store())
            .execute(json!({"id": 99}))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "thing 99 not found");
    }
}
