//! Schedules (recurring, cron-driven prompts) and one-shot reminders.
//!
//! The scheduler picks up schedule changes on its next reload and polls
//! reminders on its own interval; these tools only write the store.

use crate::args::{optional_bool, optional_str, required_i64, required_str, parse_datetime};
use crate::payload;
use async_trait::async_trait;
use openloop_core::cron::CronExpr;
use openloop_core::error::ToolError;
use openloop_core::store::{NewSchedule, ScheduleUpdate, Store};
use openloop_core::tool::Tool;
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::debug;

fn parse_cron(text: &str) -> Result<String, ToolError> {
    CronExpr::parse(text)
        .map(|expr| expr.to_string())
        .map_err(|e| ToolError::InvalidArguments(e.to_string()))
}

pub struct ListSchedulesTool {
    store: Arc<dyn Store>,
}

impl ListSchedulesTool {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for ListSchedulesTool {
    fn name(&self) -> &str {
        "list_schedules"
    }

    fn description(&self) -> &str {
        "List recurring schedules and when each last ran."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "enabled_only": { "type": "boolean", "description": "Default false" }
            }
        })
    }

    async fn execute(&self, arguments: Value) -> Result<Value, ToolError> {
        let enabled_only = optional_bool(&arguments, "enabled_only")?.unwrap_or(false);
        let schedules = self.store.list_schedules(enabled_only).await?;
        payload(self.name(), &schedules)
    }
}

pub struct CreateScheduleTool {
    store: Arc<dyn Store>,
}

impl CreateScheduleTool {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for CreateScheduleTool {
    fn name(&self) -> &str {
        "create_schedule"
    }

    fn description(&self) -> &str {
        "Run a prompt on a recurring cron schedule (local time). Each run starts with a \
         fresh check-in context and its reply is delivered to the user."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "name": { "type": "string", "description": "Unique, kebab-case" },
                "cron_expr": {
                    "type": "string",
                    "description": "Five fields: minute hour day-of-month month day-of-week, e.g. '0 18 * * 1-5'"
                },
                "prompt": { "type": "string", "description": "What to do when it fires" },
                "enabled": { "type": "boolean", "description": "Default true" }
            },
            "required": ["name", "cron_expr", "prompt"]
        })
    }

    async fn execute(&self, arguments: Value) -> Result<Value, ToolError> {
        let schedule = NewSchedule {
            name: required_str(&arguments, "name")?.to_string(),
            cron_expr: parse_cron(required_str(&arguments, "cron_expr")?)?,
            prompt: required_str(&arguments, "prompt")?.to_string(),
            enabled: optional_bool(&arguments, "enabled")?.unwrap_or(true),
        };
        let id = self.store.create_schedule(schedule).await?;
        Ok(json!({ "id": id, "status": "created" }))
    }
}

pub struct UpdateScheduleTool {
    store: Arc<dyn Store>,
}

impl UpdateScheduleTool {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for UpdateScheduleTool {
    fn name(&self) -> &str {
        "update_schedule"
    }

    fn description(&self) -> &str {
        "Change a schedule's cron expression or prompt, or enable/disable it."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "name": { "type": "string" },
                "cron_expr": { "type": "string" },
                "prompt": { "type": "string" },
                "enabled": { "type": "boolean" }
            },
            "required": ["name"]
        })
    }

    async fn execute(&self, arguments: Value) -> Result<Value, ToolError> {
        let name = required_str(&arguments, "name")?;
        let update = ScheduleUpdate {
            cron_expr: optional_str(&arguments, "cron_expr").map(parse_cron).transpose()?,
            prompt: optional_str(&arguments, "prompt").map(str::to_string),
            enabled: optional_bool(&arguments, "enabled")?,
        };
        self.store.update_schedule(name, update).await?;
        Ok(json!({ "status": "updated" }))
    }
}

pub struct DeleteScheduleTool {
    store: Arc<dyn Store>,
}

impl DeleteScheduleTool {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for DeleteScheduleTool {
    fn name(&self) -> &str {
        "delete_schedule"
    }

    fn description(&self) -> &str {
        "Delete a schedule by name."
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
        self.store.delete_schedule(name).await?;
        Ok(json!({ "status": "deleted" }))
    }
}

pub struct CreateReminderTool {
    store: Arc<dyn Store>,
}

impl CreateReminderTool {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for CreateReminderTool {
    fn name(&self) -> &str {
        "create_reminder"
    }

    fn description(&self) -> &str {
        "Remind the user of something once, at a specific time. Use get_time first to resolve relative times."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "prompt": { "type": "string", "description": "What to remind about" },
                "fire_at": {
                    "type": "string",
                    "description": "RFC 3339, or local time as YYYY-MM-DD HH:MM"
                }
            },
            "required": ["prompt", "fire_at"]
        })
    }

    async fn execute(&self, arguments: Value) -> Result<Value, ToolError> {
        let prompt = required_str(&arguments, "prompt")?;
        let fire_at = parse_datetime(required_str(&arguments, "fire_at")?)?;
        let id = self.store.create_reminder(prompt, fire_at).await?;
        debug!(id, %fire_at, "Reminder created");
        Ok(json!({
            "id": id,
            "status": "created",
            "fire_at": fire_at.to_rfc3339(),
        }))
    }
}

pub struct ListRemindersTool {
    store: Arc<dyn Store>,
}

impl ListRemindersTool {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for ListRemindersTool {
    fn name(&self) -> &str {
        "list_reminders"
    }

    fn description(&self) -> &str {
        "List upcoming reminders, soonest first."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "include_fired": { "type": "boolean", "description": "Also show past reminders" }
            }
        })
    }

    async fn execute(&self, arguments: Value) -> Result<Value, ToolError> {
        let include_fired = optional_bool(&arguments, "include_fired")?.unwrap_or(false);
        let reminders = self.store.list_reminders(include_fired).await?;
        payload(self.name(), &reminders)
    }
}

pub struct CancelReminderTool {
    store: Arc<dyn Store>,
}

impl CancelReminderTool {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for CancelReminderTool {
    fn name(&self) -> &str {
        "cancel_reminder"
    }

    fn description(&self) -> &str {
        "Cancel a pending reminder."
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
        self.store.delete_reminder(id).await?;
        Ok(json!({ "status": "cancelled" }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use openloop_core::tool::{ToolDispatcher, ToolRegistry};
    use openloop_store::InMemoryStore;

    fn setup() -> (Arc<dyn Store>, ToolRegistry) {
        let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(ListSchedulesTool::new(store.clone())));
        registry.register(Box::new(CreateScheduleTool::new(store.clone())));
        registry.register(Box::new(UpdateScheduleTool::new(store.clone())));
        registry.register(Box::new(DeleteScheduleTool::new(store.clone())));
        registry.register(Box::new(CreateReminderTool::new(store.clone())));
        registry.register(Box::new(ListRemindersTool::new(store.clone())));
        registry.register(Box::new(CancelReminderTool::new(store.clone())));
        (store, registry)
    }

    async fn call(registry: &ToolRegistry, name: &str, args: Value) -> Value {
        serde_json::from_str(&registry.execute(name, &args).await).unwrap()
    }

    #[tokio::test]
    async fn create_schedule_validates_cron() {
        let (store, registry) = setup();
        let bad = call(
            &registry,
            "create_schedule",
            json!({"name": "x", "cron_expr": "every day", "prompt": "p"}),
        )
        .await;
        assert!(bad["error"].as_str().unwrap().contains("invalid cron expression"));

        let ok = call(
            &registry,
            "create_schedule",
            json!({"name": "evening", "cron_expr": "0  18 * * 1-5", "prompt": "Wrap up"}),
        )
        .await;
        assert_eq!(ok["status"], "created");
        let saved = store.get_schedule("evening").await.unwrap().unwrap();
        assert_eq!(saved.cron_expr, "0 18 * * 1-5");
        assert!(saved.enabled);
    }

    #[tokio::test]
    async fn update_unknown_schedule() {
        let (_, registry) = setup();
        let result = call(&registry, "update_schedule", json!({"name": "ghost", "enabled": false})).await;
        assert_eq!(result, json!({"error": "schedule not found: ghost"}));
    }

    #[tokio::test]
    async fn disable_and_list() {
        let (_, registry) = setup();
        call(
            &registry,
            "create_schedule",
            json!({"name": "weekly", "cron_expr": "0 10 * * 1", "prompt": "Plan the week"}),
        )
        .await;
        let updated = call(&registry, "update_schedule", json!({"name": "weekly", "enabled": false})).await;
        assert_eq!(updated, json!({"status": "updated"}));

        let enabled = call(&registry, "list_schedules", json!({"enabled_only": true})).await;
        assert_eq!(enabled, json!([]));
        let all = call(&registry, "list_schedules", json!({})).await;
        assert_eq!(all[0]["name"], "weekly");

        let deleted = call(&registry, "delete_schedule", json!({"name": "weekly"})).await;
        assert_eq!(deleted, json!({"status": "deleted"}));
    }

    #[tokio::test]
    async fn reminders_create_list_cancel() {
        let (_, registry) = setup();
        let bad = call(
            &registry,
            "create_reminder",
            json!({"prompt": "stretch", "fire_at": "in five minutes"}),
        )
        .await;
        assert!(bad["error"].as_str().unwrap().contains("invalid time"));

        let created = call(
            &registry,
            "create_reminder",
            json!({"prompt": "call mom", "fire_at": "2099-01-01T18:00:00Z"}),
        )
        .await;
        assert_eq!(created["status"], "created");
        assert_eq!(created["fire_at"], "2099-01-01T18:00:00+00:00");

        let listed = call(&registry, "list_reminders", json!({})).await;
        assert_eq!(listed[0]["prompt"], "call mom");

        let cancelled = call(&registry, "cancel_reminder", json!({"id": created["id"]})).await;
        assert_eq!(cancelled, json!({"status": "cancelled"}));
        assert_eq!(call(&registry, "list_reminders", json!({})).await, json!([]));
    }
}
