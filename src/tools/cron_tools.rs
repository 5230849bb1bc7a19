//! `schedule_cron` / `cancel_cron` / `edit_heartbeat` — scheduling surface
//! exposed to the model.

use std::{path::PathBuf, sync::Arc};

use async_trait::async_trait;
use serde_json::{Value, json};

use crate::{
    config::ToolCategory,
    error::{CoreError, Result},
    scheduler::heartbeat_path,
    triggers::{ActionKind, Trigger, TriggerAction, TriggerRegistry, TriggerType},
};

use super::traits::{Tool, ToolContext, ToolResult};

pub struct ScheduleCronTool {
    registry: Arc<TriggerRegistry>,
}

impl ScheduleCronTool {
    pub fn new(registry: Arc<TriggerRegistry>) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl Tool for ScheduleCronTool {
    fn name(&self) -> &str {
        "schedule_cron"
    }

    fn description(&self) -> &str {
        "Register a recurring cron job (5-field expression). When it fires, \
         the agent runs the given prompt."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "name":       { "type": "string", "description": "Short job name." },
                "expression": { "type": "string", "description": "Cron expression: minute hour day-of-month month day-of-week." },
                "prompt":     { "type": "string", "description": "What the agent should do when the job fires." }
            },
            "required": ["name", "expression", "prompt"]
        })
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Automation
    }

    async fn execute(&self, args: Value) -> Result<ToolResult> {
        self.execute_with_ctx(args, &ToolContext::default()).await
    }

    async fn execute_with_ctx(&self, args: Value, ctx: &ToolContext) -> Result<ToolResult> {
        let name = args
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| CoreError::validation("missing required argument 'name'"))?;
        let expression = args
            .get("expression")
            .and_then(Value::as_str)
            .ok_or_else(|| CoreError::validation("missing required argument 'expression'"))?;
        let prompt = args
            .get("prompt")
            .and_then(Value::as_str)
            .ok_or_else(|| CoreError::validation("missing required argument 'prompt'"))?;

        let trigger = Trigger::new(
            TriggerType::Cron,
            name,
            json!({"expression": expression}),
            TriggerAction {
                kind: ActionKind::Message,
                content: prompt.to_string(),
                channel: (!ctx.channel.is_empty()).then(|| ctx.channel.clone()),
                user: (!ctx.user.is_empty()).then(|| ctx.user.clone()),
            },
        );
        let added = self.registry.add(trigger)?;
        Ok(ToolResult::ok(format!(
            "scheduled '{name}' ({expression}), id {}",
            &added.id[..8]
        )))
    }
}

pub struct CancelCronTool {
    registry: Arc<TriggerRegistry>,
}

impl CancelCronTool {
    pub fn new(registry: Arc<TriggerRegistry>) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl Tool for CancelCronTool {
    fn name(&self) -> &str {
        "cancel_cron"
    }

    fn description(&self) -> &str {
        "Cancel a previously scheduled cron job by id prefix or exact name."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "id": { "type": "string", "description": "Job id prefix or exact name." }
            },
            "required": ["id"]
        })
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Automation
    }

    async fn execute(&self, args: Value) -> Result<ToolResult> {
        let needle = args
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| CoreError::validation("missing required argument 'id'"))?;

        let target = self
            .registry
            .all()
            .into_iter()
            .filter(|t| t.trigger_type == TriggerType::Cron)
            .find(|t| t.id.starts_with(needle) || t.name == needle)
            .ok_or_else(|| CoreError::validation(format!("no cron job matches '{needle}'")))?;
        self.registry.remove(&target.id)?;
        Ok(ToolResult::ok(format!("cancelled '{}'", target.name)))
    }
}

pub struct EditHeartbeatTool {
    workspace: PathBuf,
}

impl EditHeartbeatTool {
    pub fn new(workspace: PathBuf) -> Self {
        Self { workspace }
    }
}

#[async_trait]
impl Tool for EditHeartbeatTool {
    fn name(&self) -> &str {
        "edit_heartbeat"
    }

    fn description(&self) -> &str {
        "Replace or append to the heartbeat checklist (HEARTBEAT.md). Items \
         are markdown checkboxes; unchecked items are reviewed every \
         heartbeat."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "content": { "type": "string", "description": "New checklist content (markdown)." },
                "append":  { "type": "boolean", "description": "Append instead of replace (default: false)." }
            },
            "required": ["content"]
        })
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Automation
    }

    async fn execute(&self, args: Value) -> Result<ToolResult> {
        let content = args
            .get("content")
            .and_then(Value::as_str)
            .ok_or_else(|| CoreError::validation("missing required argument 'content'"))?;
        let append = args.get("append").and_then(Value::as_bool).unwrap_or(false);

        let path = heartbeat_path(&self.workspace);
        let new_content = if append && path.exists() {
            let existing = std::fs::read_to_string(&path)
                .map_err(|e| CoreError::transport(format!("failed to read checklist: {e}")))?;
            format!("{}\n{}", existing.trim_end(), content)
        } else {
            content.to_string()
        };
        crate::util::atomic_write(&path, &new_content)?;
        Ok(ToolResult::ok("heartbeat checklist updated"))
    }
}
