//! Central tool registry and the execute pipeline.
//!
//! Execution: look up → tool-called event → handler → truncate → audit →
//! tool-result event. Security and validation errors never unwind past this
//! seam; they come back as `{is_error: true, content: "Error: …"}` results
//! for the model to react to.

use std::{collections::HashMap, sync::Arc};

use crate::{
    ai::types::{ToolCall, ToolSpec},
    config::{SettingsStore, ToolPermissions},
    error::CoreError,
    event_bus::{AppEvent, EventBus},
    security::{AuditEntry, AuditLog, RiskLevel},
    tasks::TaskSource,
    util::truncate_chars,
};

use super::traits::Tool;

/// What the session loop appends as the tool-result turn.
#[derive(Debug, Clone)]
pub struct ToolOutcome {
    pub content: String,
    pub is_error: bool,
}

pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
    bus: Option<Arc<dyn EventBus>>,
    audit: Option<Arc<AuditLog>>,
    settings: Option<Arc<SettingsStore>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
            bus: None,
            audit: None,
            settings: None,
        }
    }

    pub fn with_bus(mut self, bus: Arc<dyn EventBus>) -> Self {
        self.bus = Some(bus);
        self
    }

    pub fn with_audit(mut self, audit: Arc<AuditLog>) -> Self {
        self.audit = Some(audit);
        self
    }

    pub fn with_settings(mut self, settings: Arc<SettingsStore>) -> Self {
        self.settings = Some(settings);
        self
    }

    /// Register a tool. Overwrites any previous tool with the same name.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// Risk label for the approval policy (unknown tools read as high).
    pub fn risk_of(&self, name: &str) -> RiskLevel {
        self.get(name).map(|t| t.risk()).unwrap_or(RiskLevel::High)
    }

    /// Tool definitions for the LLM request, filtered by category permission.
    pub fn definitions(&self, permissions: &ToolPermissions) -> Vec<ToolSpec> {
        let mut specs: Vec<ToolSpec> = self
            .tools
            .values()
            .filter(|t| permissions.allows(t.category()))
            .map(|t| ToolSpec {
                name: t.name().to_string(),
                description: t.description().to_string(),
                parameters: t.parameters_schema(),
            })
            .collect();
        specs.sort_by(|a, b| a.name.cmp(&b.name));
        specs
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Run one tool call through the full pipeline.
    #[tracing::instrument(name = "tools.execute", skip_all, fields(tool = %call.name))]
    pub async fn execute(&self, call: &ToolCall, source: &TaskSource) -> ToolOutcome {
        let Some(tool) = self.get(&call.name) else {
            return ToolOutcome {
                content: format!("Error: unknown tool '{}'", call.name),
                is_error: true,
            };
        };

        if let Some(bus) = &self.bus {
            let _ = bus.publish(AppEvent::ToolCalled {
                tool_name: call.name.clone(),
                args: call.arguments.clone(),
            });
        }

        let max_chars = self
            .settings
            .as_ref()
            .map(|s| s.get().limits.max_tool_output_chars)
            .unwrap_or(30_000);

        let ctx = super::traits::ToolContext {
            channel: source.channel.clone(),
            user: source.user.clone(),
        };
        let (content, is_error, blocked_reason) = match tool
            .execute_with_ctx(call.arguments.clone(), &ctx)
            .await
        {
            Ok(result) => {
                let content = truncate_chars(&result.output, max_chars);
                (content, !result.success, None)
            }
            Err(err) => {
                let blocked = err.is_security().then(|| err.to_string());
                (err.to_string(), true, blocked)
            }
        };

        if let Some(audit) = &self.audit {
            let mut entry = AuditEntry::new("tool_call")
                .tool(&call.name)
                .input(&call.arguments)
                .result(&content)
                .source(&source.channel, &source.user);
            if let Some(reason) = &blocked_reason {
                entry = entry.blocked(reason.clone());
            }
            audit.record(entry);
        }

        if let Some(bus) = &self.bus {
            let _ = bus.publish(AppEvent::ToolResult {
                tool_name: call.name.clone(),
                result: truncate_chars(&content, 500),
                success: !is_error,
            });
        }

        ToolOutcome { content, is_error }
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// Convert a guard error into the tool-result error shape directly (used by
// tools that fail before producing a ToolResult).
impl From<CoreError> for ToolOutcome {
    fn from(err: CoreError) -> Self {
        Self {
            content: err.to_string(),
            is_error: true,
        }
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ToolCategory;
    use crate::tools::traits::ToolResult;
    use async_trait::async_trait;
    use serde_json::{Value, json};

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }
        fn description(&self) -> &str {
            "echoes its input"
        }
        fn parameters_schema(&self) -> Value {
            json!({"type": "object"})
        }
        fn category(&self) -> ToolCategory {
            ToolCategory::Automation
        }
        fn risk(&self) -> RiskLevel {
            RiskLevel::Low
        }
        async fn execute(&self, args: Value) -> crate::error::Result<ToolResult> {
            let msg = args.get("message").and_then(Value::as_str).unwrap_or("(empty)");
            Ok(ToolResult::ok(msg))
        }
    }

    struct JailedTool;

    #[async_trait]
    impl Tool for JailedTool {
        fn name(&self) -> &str {
            "jailed"
        }
        fn description(&self) -> &str {
            "always blocked"
        }
        fn parameters_schema(&self) -> Value {
            json!({"type": "object"})
        }
        fn category(&self) -> ToolCategory {
            ToolCategory::Shell
        }
        async fn execute(&self, _args: Value) -> crate::error::Result<ToolResult> {
            Err(CoreError::security("blocked by policy"))
        }
    }

    fn call(name: &str, args: Value) -> ToolCall {
        ToolCall { id: "c1".into(), name: name.into(), arguments: args }
    }

    #[tokio::test]
    async fn execute_known_tool() {
        let mut reg = ToolRegistry::new();
        reg.register(Arc::new(EchoTool));
        let out = reg.execute(&call("echo", json!({"message": "hi"})), &TaskSource::default()).await;
        assert!(!out.is_error);
        assert_eq!(out.content, "hi");
    }

    #[tokio::test]
    async fn unknown_tool_is_error_result() {
        let reg = ToolRegistry::new();
        let out = reg.execute(&call("nope", json!({})), &TaskSource::default()).await;
        assert!(out.is_error);
        assert!(out.content.starts_with("Error: unknown tool"));
    }

    #[tokio::test]
    async fn security_error_becomes_error_result_not_panic() {
        let mut reg = ToolRegistry::new();
        reg.register(Arc::new(JailedTool));
        let out = reg.execute(&call("jailed", json!({})), &TaskSource::default()).await;
        assert!(out.is_error);
        assert!(out.content.starts_with("Error: "));
    }

    #[tokio::test]
    async fn definitions_respect_permissions() {
        let mut reg = ToolRegistry::new();
        reg.register(Arc::new(EchoTool));
        reg.register(Arc::new(JailedTool));

        let mut perms = ToolPermissions::default();
        perms.shell = false;
        let names: Vec<String> = reg.definitions(&perms).into_iter().map(|s| s.name).collect();
        assert!(names.contains(&"echo".to_string()));
        assert!(!names.contains(&"jailed".to_string()));
    }

    #[tokio::test]
    async fn risk_of_unknown_is_high() {
        let reg = ToolRegistry::new();
        assert_eq!(reg.risk_of("mystery"), RiskLevel::High);
    }

    #[tokio::test]
    async fn events_emitted_around_execution() {
        use crate::event_bus::{EventBus, TokioBroadcastBus};
        let bus: Arc<dyn EventBus> = Arc::new(TokioBroadcastBus::new());
        let mut rx = bus.subscribe();

        let mut reg = ToolRegistry::new().with_bus(bus);
        reg.register(Arc::new(EchoTool));
        reg.execute(&call("echo", json!({"message": "x"})), &TaskSource::default()).await;

        assert!(matches!(rx.try_recv().unwrap(), AppEvent::ToolCalled { .. }));
        assert!(matches!(rx.try_recv().unwrap(), AppEvent::ToolResult { .. }));
    }
}
