//! The openloop tool catalog.
//!
//! Every tool is a thin adapter from loosely-typed model arguments to one
//! [`Store`] operation:
//!
//! | Module | Tools |
//! |--------|-------|
//! | [`things`] | list_things, create_thing, update_thing, complete_thing, get_summary |
//! | [`notes`] | get_note, set_note |
//! | [`memories`] | save_memory, search_memories, list_recent_memories, update_memory, delete_memory |
//! | [`skills`] | create_skill, get_skill, list_skills, update_skill, delete_skill |
//! | [`schedules`] | list/create/update/delete_schedule, create_reminder, list_reminders, cancel_reminder |
//! | [`time`] | get_time |
//!
//! Errors are returned as [`ToolError`]; the registry's dispatcher turns them
//! into `{"error": ...}` payloads for the model.

pub mod args;
pub mod memories;
pub mod notes;
pub mod schedules;
pub mod skills;
pub mod things;
pub mod time;

use openloop_core::error::ToolError;
use openloop_core::store::Store;
use openloop_core::tool::ToolRegistry;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

/// Build the registry with every built-in tool bound to `store`.
pub fn default_registry(store: Arc<dyn Store>) -> ToolRegistry {
    let mut registry = ToolRegistry::new();

    registry.register(Box::new(things::ListThingsTool::new(store.clone())));
    registry.register(Box::new(things::CreateThingTool::new(store.clone())));
    registry.register(Box::new(things::UpdateThingTool::new(store.clone())));
    registry.register(Box::new(things::CompleteThingTool::new(store.clone())));
    registry.register(Box::new(things::GetSummaryTool::new(store.clone())));

    registry.register(Box::new(notes::GetNoteTool::new(store.clone())));
    registry.register(Box::new(notes::SetNoteTool::new(store.clone())));

    registry.register(Box::new(memories::SaveMemoryTool::new(store.clone())));
    registry.register(Box::new(memories::SearchMemoriesTool::new(store.clone())));
    registry.register(Box::new(memories::ListRecentMemoriesTool::new(store.clone())));
    registry.register(Box::new(memories::UpdateMemoryTool::new(store.clone())));
    registry.register(Box::new(memories::DeleteMemoryTool::new(store.clone())));

    registry.register(Box::new(skills::CreateSkillTool::new(store.clone())));
    registry.register(Box::new(skills::GetSkillTool::new(store.clone())));
    registry.register(Box::new(skills::ListSkillsTool::new(store.clone())));
    registry.register(Box::new(skills::UpdateSkillTool::new(store.clone())));
    registry.register(Box::new(skills::DeleteSkillTool::new(store.clone())));

    registry.register(Box::new(schedules::ListSchedulesTool::new(store.clone())));
    registry.register(Box::new(schedules::CreateScheduleTool::new(store.clone())));
    registry.register(Box::new(schedules::UpdateScheduleTool::new(store.clone())));
    registry.register(Box::new(schedules::DeleteScheduleTool::new(store.clone())));
    registry.register(Box::new(schedules::CreateReminderTool::new(store.clone())));
    registry.register(Box::new(schedules::ListRemindersTool::new(store.clone())));
    registry.register(Box::new(schedules::CancelReminderTool::new(store)));

    registry.register(Box::new(time::GetTimeTool));
    registry
}

/// Serialize a store result as a tool payload.
pub(crate) fn payload<T: Serialize>(tool: &str, value: &T) -> Result<Value, ToolError> {
    serde_json::to_value(value).map_err(|e| ToolError::ExecutionFailed {
        tool_name: tool.to_string(),
        reason: format!("serializing result: {e}"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use openloop_core::tool::ToolDispatcher;
    use openloop_store::InMemoryStore;
    use serde_json::json;

    fn registry() -> ToolRegistry {
        default_registry(Arc::new(InMemoryStore::new()))
    }

    #[test]
    fn registers_the_full_catalog() {
        let registry = registry();
        assert_eq!(registry.len(), 25);
        for name in [
            "list_things",
            "get_summary",
            "set_note",
            "search_memories",
            "get_time",
            "delete_skill",
            "update_schedule",
            "cancel_reminder",
        ] {
            assert!(registry.get(name).is_some(), "missing {name}");
        }
    }

    #[test]
    fn every_schema_is_an_object() {
        for def in registry().definitions() {
            assert_eq!(def.parameters["type"], "object", "{}", def.name);
            assert!(def.parameters["properties"].is_object(), "{}", def.name);
            assert!(!def.description.is_empty(), "{}", def.name);
            if let Some(required) = def.parameters.get("required") {
                for field in required.as_array().unwrap() {
                    let field = field.as_str().unwrap();
                    assert!(
                        def.parameters["properties"].get(field).is_some(),
                        "{} requires undeclared '{field}'",
                        def.name
                    );
                }
            }
        }
    }

    #[tokio::test]
    async fn missing_required_argument_becomes_error_payload() {
        let out = registry().execute("create_thing", &json!({})).await;
        let value: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(value["error"], "invalid arguments: 'title' is required");
    }

    #[tokio::test]
    async fn unknown_tool_becomes_error_payload() {
        let out = registry().execute("launch_rocket", &json!({})).await;
        let value: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(value["error"], "unknown tool: launch_rocket");
    }
}
