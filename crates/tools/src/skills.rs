//! Skills: named procedures the assistant writes for itself and follows later.
//!
//! A skill tagged `check-in` is appended to every scheduled check-in prompt.

use crate::args::{optional_str, optional_tags, required_str};
use crate::payload;
use async_trait::async_trait;
use openloop_core::error::ToolError;
use openloop_core::store::{NewSkill, SkillUpdate, Store};
use openloop_core::tool::Tool;
use serde_json::{Value, json};
use std::sync::Arc;

pub struct CreateSkillTool {
    store: Arc<dyn Store>,
}

impl CreateSkillTool {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for CreateSkillTool {
    fn name(&self) -> &str {
        "create_skill"
    }

    fn description(&self) -> &str {
        "Write down a reusable procedure. Tag it 'check-in' to have it included in every scheduled check-in."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "name": { "type": "string", "description": "Unique, kebab-case" },
                "description": { "type": "string", "description": "One line on when to use it" },
                "content": { "type": "string", "description": "The procedure itself" },
                "tags": { "type": "array", "items": { "type": "string" } }
            },
            "required": ["name", "content"]
        })
    }

    async fn execute(&self, arguments: Value) -> Result<Value, ToolError> {
        let skill = NewSkill {
            name: required_str(&arguments, "name")?.to_string(),
            description: optional_str(&arguments, "description")
                .unwrap_or_default()
                .to_string(),
            content: required_str(&arguments, "content")?.to_string(),
            tags: optional_tags(&arguments, "tags")?.unwrap_or_default(),
        };
        let id = self.store.create_skill(skill).await?;
        Ok(json!({ "id": id, "status": "created" }))
    }
}

pub struct GetSkillTool {
    store: Arc<dyn Store>,
}

impl GetSkillTool {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for GetSkillTool {
    fn name(&self) -> &str {
        "get_skill"
    }

    fn description(&self) -> &str {
        "Read a skill by name."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": { "name": { "type": "string" } },
            "required": ["name"]
        })
    }

    async fn execute(&self, arguments: Value) -> Result<Value, ToolError> {
        let name = required_str(&arguments, "name")?;
        match self.store.get_skill(name).await? {
            Some(skill) => payload(self.name(), &skill),
            None => Ok(json!({ "error": "skill not found", "name": name })),
        }
    }
}

pub struct ListSkillsTool {
    store: Arc<dyn Store>,
}

impl ListSkillsTool {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for ListSkillsTool {
    fn name(&self) -> &str {
        "list_skills"
    }

    fn description(&self) -> &str {
        "List skills, newest first, optionally only those with a tag."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": { "tag": { "type": "string" } }
        })
    }

    async fn execute(&self, arguments: Value) -> Result<Value, ToolError> {
        let skills = self.store.list_skills(optional_str(&arguments, "tag")).await?;
        payload(self.name(), &skills)
    }
}

pub struct UpdateSkillTool {
    store: Arc<dyn Store>,
}

impl UpdateSkillTool {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for UpdateSkillTool {
    fn name(&self) -> &str {
        "update_skill"
    }

    fn description(&self) -> &str {
        "Revise a skill. Only the fields given are updated."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "name": { "type": "string" },
                "description": { "type": "string" },
                "content": { "type": "string" },
                "tags": { "type": "array", "items": { "type": "string" } }
            },
            "required": ["name"]
        })
    }

    async fn execute(&self, arguments: Value) -> Result<Value, ToolError> {
        let name = required_str(&arguments, "name")?;
        let update = SkillUpdate {
            description: optional_str(&arguments, "description").map(str::to_string),
            content: optional_str(&arguments, "content").map(str::to_string),
            tags: optional_tags(&arguments, "tags")?,
        };
        self.store.update_skill(name, update).await?;
        Ok(json!({ "status": "updated" }))
    }
}

pub struct DeleteSkillTool {
    store: Arc<dyn Store>,
}

impl DeleteSkillTool {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for DeleteSkillTool {
    fn name(&self) -> &str {
        "delete_skill"
    }

    fn description(&self) -> &str {
        "Delete a skill by name."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": { "name": { "type": "string" } },
            "required": ["name"]
        })
    }

    async fn execute(&self, arguments: Value) -> Result<Value, ToolError> {
        let name = required_str(&arguments, "name")?;
        self.store.delete_skill(name).await?;
        Ok(json!({ "status": "deleted" }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use openloop_core::tool::{ToolDispatcher, ToolRegistry};
    use openloop_store::InMemoryStore;

    fn registry() -> ToolRegistry {
        let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(CreateSkillTool::new(store.clone())));
        registry.register(Box::new(GetSkillTool::new(store.clone())));
        registry.register(Box::new(ListSkillsTool::new(store.clone())));
        registry.register(Box::new(UpdateSkillTool::new(store.clone())));
        registry.register(Box::new(DeleteSkillTool::new(store)));
        registry
    }

    #[tokio::test]
    async fn skill_lifecycle_through_dispatcher() {
        let registry = registry();
        let args = json!({
            "name": "weekly-review",
            "description": "Friday wrap-up",
            "content": "List what got done",
            "tags": ["check-in"]
        });
        let created: Value =
            serde_json::from_str(&registry.execute("create_skill", &args).await).unwrap();
        assert_eq!(created["status"], "created");

        let duplicate: Value =
            serde_json::from_str(&registry.execute("create_skill", &args).await).unwrap();
        assert_eq!(duplicate["error"], "skill already exists: weekly-review");

        let listed: Value = serde_json::from_str(
            &registry.execute("list_skills", &json!({"tag": "check-in"})).await,
        )
        .unwrap();
        assert_eq!(listed[0]["name"], "weekly-review");

        registry
            .execute("update_skill", &json!({"name": "weekly-review", "content": "Plan next week"}))
            .await;
        let got: Value = serde_json::from_str(
            &registry.execute("get_skill", &json!({"name": "weekly-review"})).await,
        )
        .unwrap();
        assert_eq!(got["content"], "Plan next week");
        assert_eq!(got["description"], "Friday wrap-up");
    }

    #[tokio::test]
    async fn missing_skills() {
        let registry = registry();
        let got: Value =
            serde_json::from_str(&registry.execute("get_skill", &json!({"name": "nope"})).await)
                .unwrap();
        assert_eq!(got, json!({"error": "skill not found", "name": "nope"}));

        let deleted: Value =
            serde_json::from_str(&registry.execute("delete_skill", &json!({"name": "nope"})).await)
                .unwrap();
        assert_eq!(deleted["error"], "no such skill exists: nope");
    }
}
