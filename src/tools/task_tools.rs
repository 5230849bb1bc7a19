//! Task tools: `create_task` (with the orchestration heuristic),
//! `list_tasks`, `get_task`, `cancel_task`.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Value, json};

use crate::{
    config::ToolCategory,
    error::{CoreError, Result},
    orchestrator::{OrchestrateRequest, OrchestrateSender, should_orchestrate},
    security::RiskLevel,
    tasks::{NewTask, TaskPriority, TaskSource, TaskStatus, TaskStore},
};

use super::traits::{Tool, ToolContext, ToolResult};

pub struct CreateTaskTool {
    tasks: Arc<TaskStore>,
    orchestrate: Option<OrchestrateSender>,
}

impl CreateTaskTool {
    pub fn new(tasks: Arc<TaskStore>, orchestrate: Option<OrchestrateSender>) -> Self {
        Self { tasks, orchestrate }
    }
}

#[async_trait]
impl Tool for CreateTaskTool {
    fn name(&self) -> &str {
        "create_task"
    }

    fn description(&self) -> &str {
        "Create a tracked task. Complex requests (multi-part research, \
         compare-and-report work) are decomposed and run by a team of \
         sub-agents; set orchestrate to force or suppress that."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "title":       { "type": "string" },
                "description": { "type": "string" },
                "priority":    { "type": "string", "enum": ["critical", "high", "normal", "low"] },
                "orchestrate": { "type": "boolean", "description": "Force (true) or suppress (false) sub-agent decomposition." }
            },
            "required": ["title", "description"]
        })
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Automation
    }

    async fn execute(&self, args: Value) -> Result<ToolResult> {
        self.execute_with_ctx(args, &ToolContext::default()).await
    }

    async fn execute_with_ctx(&self, args: Value, ctx: &ToolContext) -> Result<ToolResult> {
        let title = args
            .get("title")
            .and_then(Value::as_str)
            .ok_or_else(|| CoreError::validation("missing required argument 'title'"))?;
        let description = args
            .get("description")
            .and_then(Value::as_str)
            .ok_or_else(|| CoreError::validation("missing required argument 'description'"))?;
        let priority = match args.get("priority").and_then(Value::as_str) {
            Some("critical") => TaskPriority::Critical,
            Some("high") => TaskPriority::High,
            Some("low") => TaskPriority::Low,
            _ => TaskPriority::Normal,
        };

        let task = self.tasks.create(NewTask {
            title: title.to_string(),
            description: description.to_string(),
            priority,
            source: TaskSource {
                channel: ctx.channel.clone(),
                user: ctx.user.clone(),
            },
            ..Default::default()
        })?;

        let orchestrate = args
            .get("orchestrate")
            .and_then(Value::as_bool)
            .unwrap_or_else(|| should_orchestrate(description));

        if orchestrate {
            if let Some(sender) = &self.orchestrate {
                let _ = sender.send(OrchestrateRequest { task_id: task.id.clone() });
                return Ok(ToolResult::ok(format!(
                    "task '{title}' created (id {}); orchestration started with sub-agents",
                    &task.id[..8]
                )));
            }
            log::warn!("create_task: orchestration requested but no orchestrator attached");
        }

        Ok(ToolResult::ok(format!(
            "task '{title}' created (id {}), status pending",
            &task.id[..8]
        )))
    }
}

pub struct ListTasksTool {
    tasks: Arc<TaskStore>,
}

impl ListTasksTool {
    pub fn new(tasks: Arc<TaskStore>) -> Self {
        Self { tasks }
    }
}

#[async_trait]
impl Tool for ListTasksTool {
    fn name(&self) -> &str {
        "list_tasks"
    }

    fn description(&self) -> &str {
        "List recent tasks with status, progress, and cost."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "status": {
                    "type": "string",
                    "enum": ["pending", "running", "waiting_approval", "paused", "completed", "failed", "cancelled"]
                }
            }
        })
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Automation
    }

    fn risk(&self) -> RiskLevel {
        RiskLevel::Low
    }

    async fn execute(&self, args: Value) -> Result<ToolResult> {
        let tasks = match args.get("status").and_then(Value::as_str) {
            Some(raw) => {
                let status = TaskStatus::parse(raw)
                    .ok_or_else(|| CoreError::validation(format!("unknown status '{raw}'")))?;
                self.tasks.list_by_status(status)
            }
            None => self.tasks.list_recent(15),
        };
        if tasks.is_empty() {
            return Ok(ToolResult::ok("no matching tasks"));
        }
        let lines: Vec<String> = tasks
            .iter()
            .map(|t| {
                format!(
                    "{} [{}] {} — {}%",
                    &t.id[..8],
                    t.status.as_str(),
                    t.title,
                    t.progress
                )
            })
            .collect();
        Ok(ToolResult::ok(lines.join("\n")))
    }
}

pub struct GetTaskTool {
    tasks: Arc<TaskStore>,
}

impl GetTaskTool {
    pub fn new(tasks: Arc<TaskStore>) -> Self {
        Self { tasks }
    }
}

#[async_trait]
impl Tool for GetTaskTool {
    fn name(&self) -> &str {
        "get_task"
    }

    fn description(&self) -> &str {
        "Show one task in full: steps, result, scratchpad, and usage."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "id": { "type": "string", "description": "Task id or prefix." }
            },
            "required": ["id"]
        })
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Automation
    }

    fn risk(&self) -> RiskLevel {
        RiskLevel::Low
    }

    async fn execute(&self, args: Value) -> Result<ToolResult> {
        let prefix = args
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| CoreError::validation("missing required argument 'id'"))?;
        let task = self
            .tasks
            .get_by_prefix(prefix)
            .ok_or_else(|| CoreError::validation(format!("no task matches '{prefix}'")))?;
        Ok(ToolResult::ok(
            serde_json::to_string_pretty(&task).unwrap_or_else(|_| "unrenderable task".into()),
        ))
    }
}

pub struct CancelTaskTool {
    tasks: Arc<TaskStore>,
}

impl CancelTaskTool {
    pub fn new(tasks: Arc<TaskStore>) -> Self {
        Self { tasks }
    }
}

#[async_trait]
impl Tool for CancelTaskTool {
    fn name(&self) -> &str {
        "cancel_task"
    }

    fn description(&self) -> &str {
        "Cancel a pending, running, or paused task by id prefix."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "id": { "type": "string", "description": "Task id or prefix." }
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
        let task = self
            .tasks
            .get_by_prefix(prefix)
            .ok_or_else(|| CoreError::validation(format!("no task matches '{prefix}'")))?;
        if task.status.is_terminal() {
            return Err(CoreError::validation(format!(
                "task '{}' is already {}",
                task.title,
                task.status.as_str()
            )));
        }
        self.tasks
            .update_status(&task.id, TaskStatus::Cancelled, None, None, None)?;
        Ok(ToolResult::ok(format!("cancelled '{}'", task.title)))
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn create_simple_task_stays_pending() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(TaskStore::load(dir.path(), None).unwrap());
        let tool = CreateTaskTool::new(store.clone(), None);
        let r = tool
            .execute(json!({"title": "reminder", "description": "water the plants"}))
            .await
            .unwrap();
        assert!(r.output.contains("pending"));
        assert_eq!(store.all().len(), 1);
    }

    #[tokio::test]
    async fn complex_description_queues_orchestration() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(TaskStore::load(dir.path(), None).unwrap());
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let tool = CreateTaskTool::new(store.clone(), Some(tx));

        let r = tool
            .execute(json!({
                "title": "energy report",
                "description": "Research three renewable energy sources and write a comparison report with pros and cons"
            }))
            .await
            .unwrap();
        assert!(r.output.contains("orchestration started"));

        let request = rx.try_recv().unwrap();
        assert_eq!(request.task_id, store.all()[0].id);
    }

    #[tokio::test]
    async fn explicit_orchestrate_false_overrides_heuristic() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(TaskStore::load(dir.path(), None).unwrap());
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let tool = CreateTaskTool::new(store, Some(tx));

        tool.execute(json!({
            "title": "t",
            "description": "Research everything and write a comparison with multiple steps",
            "orchestrate": false
        }))
        .await
        .unwrap();
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn caller_identity_recorded_as_source() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(TaskStore::load(dir.path(), None).unwrap());
        let tool = CreateTaskTool::new(store.clone(), None);
        let ctx = ToolContext { channel: "discord".into(), user: "bob".into() };
        tool.execute_with_ctx(json!({"title": "t", "description": "d"}), &ctx)
            .await
            .unwrap();
        let task = &store.all()[0];
        assert_eq!(task.source.channel, "discord");
        assert_eq!(task.source.user, "bob");
    }

    #[tokio::test]
    async fn cancel_task_by_prefix() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(TaskStore::load(dir.path(), None).unwrap());
        let create = CreateTaskTool::new(store.clone(), None);
        let cancel = CancelTaskTool::new(store.clone());

        create.execute(json!({"title": "t", "description": "d"})).await.unwrap();
        let id = store.all()[0].id.clone();
        cancel.execute(json!({"id": &id[..8]})).await.unwrap();
        assert_eq!(store.get(&id).unwrap().status, TaskStatus::Cancelled);

        // Cancelling a terminal task is refused.
        assert!(cancel.execute(json!({"id": &id[..8]})).await.is_err());
    }

    #[tokio::test]
    async fn list_filters_by_status() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(TaskStore::load(dir.path(), None).unwrap());
        let create = CreateTaskTool::new(store.clone(), None);
        let list = ListTasksTool::new(store.clone());

        create.execute(json!({"title": "a", "description": "d"})).await.unwrap();
        let id = store.all()[0].id.clone();
        store.update_status(&id, TaskStatus::Completed, None, None, None).unwrap();
        create.execute(json!({"title": "b", "description": "d"})).await.unwrap();

        let pending = list.execute(json!({"status": "pending"})).await.unwrap();
        assert!(pending.output.contains("b"));
        assert!(!pending.output.contains("[completed]"));
    }
}
