//! End-to-end scenarios through the public API: guard rejections with audit
//! evidence, the approval round trip, budget hard-stop, and crash recovery.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::json;
use tempfile::TempDir;

use talon::{
    agent::{BUDGET_BANNER, InboundMessage, SessionLoop},
    ai::{
        CompletionRequest, CompletionResponse, LLMProvider, Message, ModelRouter, ProviderSet,
        TokenUsage, ToolCall,
    },
    approvals::ApprovalBroker,
    config::SettingsStore,
    cost::{BudgetConfig, CostTracker},
    error::Result,
    memory::{KeywordMemory, ThreadStore},
    security::AuditLog,
    tasks::{NewTask, TaskSource, TaskStatus, TaskStore},
    tools::{BuiltinToolDeps, ToolRegistry, register_builtins},
    triggers::TriggerRegistry,
};

// ─── Scripted provider ────────────────────────────────────────────────────────

struct Scripted {
    responses: Mutex<Vec<CompletionResponse>>,
}

impl Scripted {
    fn new(mut responses: Vec<CompletionResponse>) -> Arc<Self> {
        responses.reverse();
        Arc::new(Self {
            responses: Mutex::new(responses),
        })
    }
}

fn text(content: &str) -> CompletionResponse {
    CompletionResponse {
        content: content.to_string(),
        tool_calls: vec![],
        model: "scripted".into(),
        usage: Some(TokenUsage { input_tokens: 10, output_tokens: 5 }),
        finish_reason: Some("stop".into()),
    }
}

fn tool_call(name: &str, args: serde_json::Value) -> CompletionResponse {
    CompletionResponse {
        content: String::new(),
        tool_calls: vec![ToolCall { id: "call_1".into(), name: name.into(), arguments: args }],
        model: "scripted".into(),
        usage: Some(TokenUsage { input_tokens: 10, output_tokens: 5 }),
        finish_reason: Some("tool_use".into()),
    }
}

#[async_trait]
impl LLMProvider for Scripted {
    async fn complete(&self, _request: CompletionRequest) -> Result<CompletionResponse> {
        Ok(self
            .responses
            .lock()
            .unwrap()
            .pop()
            .unwrap_or_else(|| text("No more responses")))
    }

    fn provider_name(&self) -> &str {
        "scripted"
    }
}

// ─── Fixture ──────────────────────────────────────────────────────────────────

struct Host {
    session: SessionLoop,
    tasks: Arc<TaskStore>,
    approvals: Arc<ApprovalBroker>,
    cost: Arc<CostTracker>,
    audit: Arc<AuditLog>,
}

fn host(dir: &TempDir, provider: Arc<Scripted>) -> Host {
    let workspace = dir.path().to_path_buf();
    let settings = Arc::new(SettingsStore::load(&workspace, "integration").unwrap());
    let audit = Arc::new(AuditLog::open(&workspace).unwrap());
    let tasks = Arc::new(TaskStore::load(&workspace, None).unwrap());
    let approvals = ApprovalBroker::load(&workspace, None).unwrap();
    let cost = Arc::new(CostTracker::load(&workspace).unwrap());
    let triggers = Arc::new(TriggerRegistry::load(&workspace, None).unwrap());
    let memory = Arc::new(KeywordMemory::new());

    let mut registry = ToolRegistry::new()
        .with_audit(audit.clone())
        .with_settings(settings.clone());
    register_builtins(
        &mut registry,
        BuiltinToolDeps {
            workspace: workspace.clone(),
            settings: settings.clone(),
            memory: memory.clone(),
            tasks: tasks.clone(),
            triggers,
            cost: cost.clone(),
            orchestrate: None,
            mail: None,
            inbox: None,
        },
    );

    let session = SessionLoop::new(
        ProviderSet::new("scripted", provider),
        Arc::new(ModelRouter::default_routes("scripted")),
        Arc::new(registry),
        Arc::new(ThreadStore::new(&workspace)),
        memory,
        tasks.clone(),
        approvals.clone(),
        cost.clone(),
        settings,
        None,
        workspace,
    );

    Host { session, tasks, approvals, cost, audit }
}

fn msg(text: &str) -> InboundMessage {
    InboundMessage {
        channel: "telegram".into(),
        user: "alice".into(),
        text: text.into(),
    }
}

fn today() -> String {
    chrono::Utc::now().format("%Y-%m-%d").to_string()
}

// ─── Scenarios ────────────────────────────────────────────────────────────────

/// Shell jail: `rm -rf /` comes back as an error result, leaves a
/// `blocked: true` audit entry, and touches nothing on disk.
#[tokio::test]
async fn shell_jail_blocks_and_audits() {
    let dir = TempDir::new().unwrap();
    let host = host(
        &dir,
        Scripted::new(vec![
            tool_call("run_shell", json!({"command": "rm -rf /"})),
            text("That command is not allowed, sorry."),
        ]),
    );

    // Alice approves whatever comes up so the filter itself is what blocks.
    let approvals = host.approvals.clone();
    let approver = tokio::spawn(async move {
        for _ in 0..100 {
            if let Some(req) = approvals.pending().first().cloned() {
                approvals.resolve(&req.id, true, "alice").unwrap();
                return;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
    });

    let reply = host.session.handle_message(&msg("wipe the disk")).await.unwrap();
    approver.abort();
    assert_eq!(reply, "That command is not allowed, sorry.");

    let entries = host.audit.entries_for(&today()).unwrap();
    let blocked: Vec<_> = entries.iter().filter(|e| e.blocked).collect();
    assert_eq!(blocked.len(), 1);
    assert_eq!(blocked[0].tool_name.as_deref(), Some("run_shell"));
    assert!(blocked[0].reason.as_deref().unwrap().starts_with("Error:"));
}

/// SSRF block: the metadata endpoint never sees a request.
#[tokio::test]
async fn ssrf_block_is_an_error_result() {
    let dir = TempDir::new().unwrap();
    let host = host(
        &dir,
        Scripted::new(vec![
            tool_call("web_fetch", json!({"url": "http://169.254.169.254/latest/meta-data"})),
            text("I cannot reach that address."),
        ]),
    );

    let reply = host.session.handle_message(&msg("fetch the metadata")).await.unwrap();
    assert_eq!(reply, "I cannot reach that address.");

    let entries = host.audit.entries_for(&today()).unwrap();
    assert!(entries.iter().any(|e| e.blocked && e.tool_name.as_deref() == Some("web_fetch")));
}

/// Approval round trip: a gated write suspends, `/approve <prefix>` from a
/// second message resolves it, and the worker completes the write.
#[tokio::test]
async fn approval_round_trip_across_messages() {
    let dir = TempDir::new().unwrap();
    let host = Arc::new(host(
        &dir,
        Scripted::new(vec![
            tool_call("write_file", json!({"path": "notes.txt", "content": "hello"})),
            text("Wrote the file."),
        ]),
    ));

    // Second "channel message" arrives while the first turn is suspended.
    let resolver = {
        let host = Arc::clone(&host);
        tokio::spawn(async move {
            for _ in 0..200 {
                if let Some(req) = host.approvals.pending().first().cloned() {
                    let command = format!("/approve {}", &req.id[..8]);
                    let reply = host.session.handle_message(&msg(&command)).await.unwrap();
                    assert!(reply.starts_with("Approved:"));
                    return;
                }
                tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            }
            panic!("approval never appeared");
        })
    };

    let reply = host.session.handle_message(&msg("save a note")).await.unwrap();
    resolver.await.unwrap();
    assert_eq!(reply, "Wrote the file.");
    assert_eq!(std::fs::read_to_string(dir.path().join("notes.txt")).unwrap(), "hello");
}

/// Budget hard-stop: once today's cost reaches the budget, the next message
/// returns the fixed banner without an LLM call.
#[tokio::test]
async fn budget_hard_stop_end_to_end() {
    let dir = TempDir::new().unwrap();
    let host = host(&dir, Scripted::new(vec![text("expensive reply")]));
    host.cost
        .set_config(BudgetConfig { daily_budget: 0.01, weekly_budget: None, hard_stop: true })
        .unwrap();

    host.cost.track_usage("m", TokenUsage { input_tokens: 100, output_tokens: 100 }, 0.02);
    assert!(host.cost.today().cost >= 0.01);

    let reply = host.session.handle_message(&msg("one more thing")).await.unwrap();
    assert_eq!(reply, BUDGET_BANNER);
}

/// Crash recovery: a task left `running` is `paused` after the store
/// reloads, same id, other fields intact.
#[tokio::test]
async fn crash_recovery_pauses_running_tasks() {
    let dir = TempDir::new().unwrap();
    let id = {
        let tasks = TaskStore::load(dir.path(), None).unwrap();
        let task = tasks
            .create(NewTask {
                title: "long research".into(),
                description: "gather sources".into(),
                source: TaskSource { channel: "telegram".into(), user: "alice".into() },
                ..Default::default()
            })
            .unwrap();
        tasks.update_status(&task.id, TaskStatus::Running, Some(40), None, None).unwrap();
        task.id
        // Store dropped here — the "crash".
    };

    let reloaded = TaskStore::load(dir.path(), None).unwrap();
    let task = reloaded.get(&id).unwrap();
    assert_eq!(task.status, TaskStatus::Paused);
    assert_eq!(task.title, "long research");
    assert_eq!(task.progress, 40);
    assert_eq!(reloaded.list_by_status(TaskStatus::Paused).len(), 1);
}

/// `/tasks`, `/cost`, and `/pending` answer without the model.
#[tokio::test]
async fn chat_commands_work_without_provider() {
    let dir = TempDir::new().unwrap();
    let host = host(&dir, Scripted::new(vec![]));
    host.tasks
        .create(NewTask { title: "visible".into(), ..Default::default() })
        .unwrap();

    let tasks_reply = host.session.handle_message(&msg("/tasks")).await.unwrap();
    assert!(tasks_reply.contains("visible"));

    let cost_reply = host.session.handle_message(&msg("/cost")).await.unwrap();
    assert!(cost_reply.contains("0 LLM calls"));

    let pending_reply = host.session.handle_message(&msg("/pending")).await.unwrap();
    assert_eq!(pending_reply, "No approvals pending for you.");
}
