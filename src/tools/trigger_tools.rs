//! Trigger CRUD exposed to the model.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Value, json};

use crate::{
    config::ToolCategory,
    error::{CoreError, Result},
    security::RiskLevel,
    triggers::{ActionKind, Trigger, TriggerAction, TriggerRegistry, TriggerType},
};

use super::traits::{Tool, ToolContext, ToolResult};

pub struct CreateTriggerTool {
    registry: Arc<TriggerRegistry>,
}

impl CreateTriggerTool {
    pub fn new(registry: Arc<TriggerRegistry>) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl Tool for CreateTriggerTool {
    fn name(&self) -> &str {
        "create_trigger"
    }

    fn description(&self) -> &str {
        "Create an event trigger (file_watch, webhook, cron, calendar, or \
         email_watch). When it fires the agent handles the configured action."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "type": {
                    "type": "string",
                    "enum": ["file_watch", "webhook", "cron", "calendar", "email_watch"]
                },
                "name":   { "type": "string" },
                "config": {
                    "type": "object",
                    "description": "Type-specific settings, e.g. {\"path\": \"inbox\", \"pattern\": \"\\\\.pdf$\"} for file_watch."
                },
                "action_kind":    { "type": "string", "enum": ["message", "task"], "description": "Default: message." },
                "action_content": { "type": "string", "description": "Instruction for the agent when the trigger fires." }
            },
            "required": ["type", "name", "config", "action_content"]
        })
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Automation
    }

    async fn execute(&self, args: Value) -> Result<ToolResult> {
        self.execute_with_ctx(args, &ToolContext::default()).await
    }

    async fn execute_with_ctx(&self, args: Value, ctx: &ToolContext) -> Result<ToolResult> {
        let type_str = args
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| CoreError::validation("missing required argument 'type'"))?;
        let trigger_type = TriggerType::parse(type_str)
            .ok_or_else(|| CoreError::validation(format!("unknown trigger type '{type_str}'")))?;
        let name = args
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| CoreError::validation("missing required argument 'name'"))?;
        let config = args
            .get("config")
            .cloned()
            .ok_or_else(|| CoreError::validation("missing required argument 'config'"))?;
        let content = args
            .get("action_content")
            .and_then(Value::as_str)
            .ok_or_else(|| CoreError::validation("missing required argument 'action_content'"))?;
        let kind = match args.get("action_kind").and_then(Value::as_str) {
            Some("task") => ActionKind::Task,
            _ => ActionKind::Message,
        };

        let trigger = Trigger::new(
            trigger_type,
            name,
            config,
            TriggerAction {
                kind,
                content: content.to_string(),
                channel: (!ctx.channel.is_empty()).then(|| ctx.channel.clone()),
                user: (!ctx.user.is_empty()).then(|| ctx.user.clone()),
            },
        );
        let added = self.registry.add(trigger)?;
        Ok(ToolResult::ok(format!(
            "created {type_str} trigger '{name}' (id {}). It becomes active on the next restart or registry reload.",
            &added.id[..8]
        )))
    }
}

pub struct ListTriggersTool {
    registry: Arc<TriggerRegistry>,
}

impl ListTriggersTool {
    pub fn new(registry: Arc<TriggerRegistry>) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl Tool for ListTriggersTool {
    fn name(&self) -> &str {
        "list_triggers"
    }

    fn description(&self) -> &str {
        "List all registered triggers with their state and fire counts."
    }

    fn parameters_schema(&self) -> Value {
        json!({ "type": "object", "properties": {} })
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Automation
    }

    fn risk(&self) -> RiskLevel {
        RiskLevel::Low
    }

    async fn execute(&self, _args: Value) -> Result<ToolResult> {
        let triggers = self.registry.all();
        if triggers.is_empty() {
            return Ok(ToolResult::ok("no triggers registered"));
        }
        let lines: Vec<String> = triggers
            .iter()
            .map(|t| {
                format!(
                    "{} [{}] {} — {}, fired {} time(s)",
                    &t.id[..8],
                    t.trigger_type.as_str(),
                    t.name,
                    if t.enabled { "enabled" } else { "disabled" },
                    t.fire_count,
                )
            })
            .collect();
        Ok(ToolResult::ok(lines.join("\n")))
    }
}

pub struct DeleteTriggerTool {
    registry: Arc<TriggerRegistry>,
}

impl DeleteTriggerTool {
    pub fn new(registry: Arc<TriggerRegistry>) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl Tool for DeleteTriggerTool {
    fn name(&self) -> &str {
        "delete_trigger"
    }

    fn description(&self) -> &str {
        "Delete a trigger by id prefix."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "id": { "type": "string", "description": "Trigger id prefix." }
            },
            "required": ["id"]
        })
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Automation
    }

    async fn execute(&self, args: Value) -> Result<ToolResult> {
        let prefix = args
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| CoreError::validation("missing required argument 'id'"))?;
        let target = self
            .registry
            .all()
            .into_iter()
            .find(|t| t.id.starts_with(prefix))
            .ok_or_else(|| CoreError::validation(format!("no trigger matches '{prefix}'")))?;
        self.registry.remove(&target.id)?;
        Ok(ToolResult::ok(format!("deleted trigger '{}'", target.name)))
    }
}
