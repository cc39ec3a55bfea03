//! The clock, so the model can resolve "tomorrow" and "in two hours".

use async_trait::async_trait;
use chrono::{DateTime, Local, Utc};
use openloop_core::error::ToolError;
use openloop_core::tool::Tool;
use serde_json::{Value, json};

pub struct GetTimeTool;

impl GetTimeTool {
    fn snapshot(now: DateTime<Utc>) -> Value {
        let local = now.with_timezone(&Local);
        json!({
            "local": local.format("%Y-%m-%d %H:%M:%S %Z").to_string(),
            "utc": now.to_rfc3339(),
            "date": local.format("%Y-%m-%d").to_string(),
            "day": local.format("%A").to_string(),
        })
    }
}

#[async_trait]
impl Tool for GetTimeTool {
    fn name(&self) -> &str {
        "get_time"
    }

    fn description(&self) -> &str {
        "Get the current date and time, in local time and UTC."
    }

    fn parameters_schema(&self) -> Value {
        json!({ "type": "object", "properties": {} })
    }

    async fn execute(&self, _arguments: Value) -> Result<Value, ToolError> {
        Ok(Self::snapshot(Utc::now()))
    }
}
