//! `SessionLoop` — one conversational turn.
//!
//! ```text
//! inbound message
//!   │  chat command?  ──► handled locally, no LLM
//!   │  budget gate    ──► fixed banner when the hard stop is active
//!   ▼
//! load thread → system prompt → append user turn
//!   ▼
//! up to max_tool_calls times:
//!   LLM.complete(thread, tools)  ── usage recorded before anything else
//!     no tool calls → final text, persist thread, reply
//!     tool calls    → approval gate → execute (parallel, id order) → append results
//!   ▼
//! iteration cap → fixed notice
//! ```
//!
//! Heartbeat and trigger turns run the same loop with synthetic user turns;
//! orchestrated workers run it without thread persistence via
//! [`SessionLoop::run_worker`].

use std::{path::PathBuf, sync::Arc};

use crate::{
    ai::{
        CompletionRequest, Message, ModelRoute, ModelRouter, ModelTier, ProviderSet, TokenUsage,
    },
    approvals::{ApprovalBroker, NewApproval, ProposedAction},
    config::SettingsStore,
    cost::CostTracker,
    error::{CoreError, Result},
    event_bus::{AppEvent, EventBus},
    memory::{ChatTurn, Memory, ThreadStore},
    scheduler::HEARTBEAT_OK,
    tasks::{TaskSource, TaskStatus, TaskStore, TaskTokenUsage},
    tools::{ToolOutcome, ToolRegistry},
};

use super::{commands, prompts};

/// Fixed reply when the cost hard-stop refuses a turn.
pub const BUDGET_BANNER: &str = "Daily LLM budget exceeded";
/// Fixed reply when the iteration cap is hit.
pub const MAX_ITERATIONS_NOTICE: &str =
    "Reached the maximum number of tool calls for one turn; stopping here. \
     What was accomplished so far has been saved.";
/// Synthetic tool result after a rejected or expired approval.
const APPROVAL_REJECTED_RESULT: &str =
    "Approval was rejected or expired. Do not retry this action; find an \
     alternative approach or explain what you could not do.";

/// An inbound chat message.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub channel: String,
    pub user: String,
    pub text: String,
}

pub struct SessionLoop {
    providers: ProviderSet,
    router: Arc<ModelRouter>,
    registry: Arc<ToolRegistry>,
    threads: Arc<ThreadStore>,
    memory: Arc<dyn Memory>,
    tasks: Arc<TaskStore>,
    approvals: Arc<ApprovalBroker>,
    cost: Arc<CostTracker>,
    settings: Arc<SettingsStore>,
    bus: Option<Arc<dyn EventBus>>,
    /// Instructions of loaded SKILL files, injected into the system prompt.
    skills: Vec<String>,
    workspace: PathBuf,
}

impl SessionLoop {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        providers: ProviderSet,
        router: Arc<ModelRouter>,
        registry: Arc<ToolRegistry>,
        threads: Arc<ThreadStore>,
        memory: Arc<dyn Memory>,
        tasks: Arc<TaskStore>,
        approvals: Arc<ApprovalBroker>,
        cost: Arc<CostTracker>,
        settings: Arc<SettingsStore>,
        bus: Option<Arc<dyn EventBus>>,
        workspace: PathBuf,
    ) -> Self {
        Self {
            providers,
            router,
            registry,
            threads,
            memory,
            tasks,
            approvals,
            cost,
            settings,
            bus,
            skills: Vec::new(),
            workspace,
        }
    }

    /// Attach loaded skill instructions.
    pub fn with_skills(mut self, skills: Vec<String>) -> Self {
        self.skills = skills;
        self
    }

    // ── Public entry points ───────────────────────────────────────────────────

    /// Handle one inbound chat message and return the reply.
    #[tracing::instrument(name = "session.turn", skip_all, fields(channel = %msg.channel, user = %msg.user))]
    pub async fn handle_message(&self, msg: &InboundMessage) -> Result<String> {
        if let Some(command) = commands::parse(&msg.text) {
            return Ok(commands::execute(
                command,
                &msg.user,
                &self.approvals,
                &self.tasks,
                &self.cost,
            ));
        }

        if !self.cost.can_make_call() {
            return Ok(BUDGET_BANNER.to_string());
        }

        self.emit(AppEvent::AgentStarted {
            channel: msg.channel.clone(),
            user: msg.user.clone(),
        });

        let source = TaskSource {
            channel: msg.channel.clone(),
            user: msg.user.clone(),
        };
        let mut thread = self.threads.load(&msg.channel, &msg.user);
        thread.push(ChatTurn::from_message(&Message::user(&msg.text)));

        let reply = self.drive_thread(&mut thread, &source).await;
        // Persist whatever was accomplished, success or not.
        self.threads.save(&mut thread)?;
        let reply = reply?;

        self.emit(AppEvent::AgentCompleted {
            channel: msg.channel.clone(),
            user: msg.user.clone(),
            reply: crate::util::truncate_chars(&reply, 200),
        });
        Ok(reply)
    }

    /// Heartbeat mode: review outstanding checklist items. Returns `None`
    /// when the reply is the `HEARTBEAT_OK` sentinel (suppressed).
    pub async fn heartbeat_turn(&self, items: &[String]) -> Result<Option<String>> {
        if !self.cost.can_make_call() {
            log::warn!("heartbeat skipped: {BUDGET_BANNER}");
            return Ok(None);
        }
        let source = TaskSource {
            channel: "heartbeat".to_string(),
            user: "system".to_string(),
        };
        let mut thread = self.threads.load(&source.channel, &source.user);
        thread.push(ChatTurn::from_message(&Message::user(
            prompts::heartbeat_user_prompt(items),
        )));
        let reply = self.drive_thread(&mut thread, &source).await;
        self.threads.save(&mut thread)?;
        let reply = reply?;

        if reply.trim() == HEARTBEAT_OK {
            Ok(None)
        } else {
            Ok(Some(reply))
        }
    }

    /// Trigger mode: a synthetic user turn embedding the trigger context.
    pub async fn trigger_turn(
        &self,
        name: &str,
        trigger_type: &str,
        action_content: &str,
        channel: Option<&str>,
        user: Option<&str>,
        payload: &serde_json::Value,
    ) -> Result<String> {
        if !self.cost.can_make_call() {
            return Ok(BUDGET_BANNER.to_string());
        }
        let source = TaskSource {
            channel: channel.unwrap_or("trigger").to_string(),
            user: user.unwrap_or("system").to_string(),
        };
        let mut thread = self.threads.load(&source.channel, &source.user);
        thread.push(ChatTurn::from_message(&Message::user(
            prompts::trigger_user_prompt(name, trigger_type, action_content, payload),
        )));
        let reply = self.drive_thread(&mut thread, &source).await;
        self.threads.save(&mut thread)?;
        reply
    }

    /// Orchestrated worker turn: same loop against an explicit route, without
    /// thread persistence. Cost is charged to the child task *and* its
    /// parent.
    pub async fn run_worker(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        route: &ModelRoute,
        source: &TaskSource,
        child_task_id: &str,
        parent_task_id: &str,
    ) -> Result<String> {
        let settings = self.settings.get();
        let tools = self.registry.definitions(&settings.permissions);
        let provider = self.providers.get(&route.provider_id);
        let mut messages = vec![Message::user(user_prompt)];
        let charge_to = [child_task_id, parent_task_id];

        for _ in 0..settings.limits.max_tool_calls {
            if !self.cost.can_make_call() {
                return Err(CoreError::BudgetExhausted);
            }
            let request = CompletionRequest::new(route.model.clone(), messages.clone())
                .with_system(system_prompt.to_string())
                .with_tools(tools.clone());
            let response = provider.complete(request).await?;
            self.record_usage(route, response.usage, &charge_to);

            if response.tool_calls.is_empty() {
                return Ok(response.content);
            }

            messages.push(Message::assistant_with_tools(
                response.content.clone(),
                response.tool_calls.clone(),
            ));
            let outcomes = self
                .run_tool_calls(&response.tool_calls, source, Some(child_task_id))
                .await;
            for (call, outcome) in response.tool_calls.iter().zip(outcomes) {
                messages.push(Message::tool_result(call.id.clone(), outcome.content));
            }
        }
        Ok(MAX_ITERATIONS_NOTICE.to_string())
    }

    // ── Internal ─────────────────────────────────────────────────────────────

    /// Default route for interactive turns.
    fn default_route(&self) -> Result<ModelRoute> {
        self.router
            .route_for(ModelTier::Balanced)
            .or_else(|| self.router.route_for(ModelTier::Fast))
            .cloned()
            .ok_or_else(|| CoreError::fatal("no model routes configured"))
    }

    async fn drive_thread(
        &self,
        thread: &mut crate::memory::ConversationThread,
        source: &TaskSource,
    ) -> Result<String> {
        let settings = self.settings.get();
        let bullets = self.memory.bullets(10).await.unwrap_or_default();
        let system = prompts::system_prompt(
            &settings,
            &self.workspace,
            &bullets,
            &self.skills,
            &self.cost.today(),
        );
        let tools = self.registry.definitions(&settings.permissions);
        let route = self.default_route()?;
        let provider = self.providers.get(&route.provider_id);

        for _ in 0..settings.limits.max_tool_calls {
            if !self.cost.can_make_call() {
                return Ok(BUDGET_BANNER.to_string());
            }

            // Summary of trimmed history rides in front of the live turns.
            let mut messages = Vec::new();
            if !thread.summary.is_empty() {
                messages.push(Message::user(format!(
                    "(Earlier conversation summary)\n{}",
                    thread.summary
                )));
            }
            messages.extend(thread.to_messages());

            let request = CompletionRequest::new(route.model.clone(), messages)
                .with_system(system.clone())
                .with_tools(tools.clone());
            let response = provider.complete(request).await?;
            self.record_usage(&route, response.usage, &[]);

            if response.tool_calls.is_empty() {
                thread.push(ChatTurn::from_message(&Message::assistant(&response.content)));
                return Ok(response.content);
            }

            thread.push(ChatTurn::from_message(&Message::assistant_with_tools(
                response.content.clone(),
                response.tool_calls.clone(),
            )));
            let outcomes = self.run_tool_calls(&response.tool_calls, source, None).await;
            for (call, outcome) in response.tool_calls.iter().zip(outcomes) {
                thread.push(ChatTurn::from_message(&Message::tool_result(
                    call.id.clone(),
                    outcome.content,
                )));
            }
        }
        Ok(MAX_ITERATIONS_NOTICE.to_string())
    }

    /// Execute a batch of tool calls. Results come back in request order.
    ///
    /// When no call needs an approval the batch runs in parallel; otherwise
    /// the batch runs sequentially so at most one pending approval blocks
    /// this turn at a time.
    async fn run_tool_calls(
        &self,
        calls: &[crate::ai::ToolCall],
        source: &TaskSource,
        task_id: Option<&str>,
    ) -> Vec<ToolOutcome> {
        let autonomy = self.settings.get().autonomy;
        let any_gated = calls
            .iter()
            .any(|c| crate::security::needs_approval(autonomy, &c.name));

        if !any_gated {
            return futures::future::join_all(
                calls.iter().map(|call| self.registry.execute(call, source)),
            )
            .await;
        }

        let mut outcomes = Vec::with_capacity(calls.len());
        for call in calls {
            outcomes.push(self.gated_execute(call, source, task_id).await);
        }
        outcomes
    }

    async fn gated_execute(
        &self,
        call: &crate::ai::ToolCall,
        source: &TaskSource,
        task_id: Option<&str>,
    ) -> ToolOutcome {
        let autonomy = self.settings.get().autonomy;
        if crate::security::needs_approval(autonomy, &call.name) {
            let risk = self.registry.risk_of(&call.name);
            let waiter = match self.approvals.request(NewApproval {
                task_id: task_id.unwrap_or_default().to_string(),
                description: format!("run tool '{}'", call.name),
                action: ProposedAction {
                    tool_name: call.name.clone(),
                    input: call.arguments.clone(),
                    reasoning: String::new(),
                },
                risk,
                risk_explanation: format!("'{}' is a {risk}-risk tool", call.name),
                channel: source.channel.clone(),
                user: source.user.clone(),
            }) {
                Ok(w) => w,
                Err(e) => return ToolOutcome { content: e.to_string(), is_error: true },
            };

            if let Some(id) = task_id {
                let _ = self.tasks.update_status(id, TaskStatus::WaitingApproval, None, None, None);
            }
            let approved = waiter.wait().await;
            if let Some(id) = task_id {
                let _ = self.tasks.update_status(id, TaskStatus::Running, None, None, None);
            }
            if !approved {
                return ToolOutcome {
                    content: APPROVAL_REJECTED_RESULT.to_string(),
                    is_error: true,
                };
            }
        }
        self.registry.execute(call, source).await
    }

    /// Record usage with the cost tracker (always) and the given tasks.
    /// Runs before the caller acts on the response, so accounting is
    /// monotonic.
    fn record_usage(&self, route: &ModelRoute, usage: Option<TokenUsage>, task_ids: &[&str]) {
        let usage = usage.unwrap_or_default();
        let cost = route.cost_of(usage);
        self.cost.track_usage(&route.model, usage, cost);
        for id in task_ids {
            if id.is_empty() {
                continue;
            }
            let _ = self.tasks.add_usage(
                id,
                TaskTokenUsage {
                    input_tokens: usage.input_tokens,
                    output_tokens: usage.output_tokens,
                    cost,
                },
            );
        }
    }

    fn emit(&self, event: AppEvent) {
        if let Some(bus) = &self.bus {
            let _ = bus.publish(event);
        }
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::provider::scripted::{ScriptedProvider, with_usage};
    use crate::ai::types::{CompletionResponse, ToolCall};
    use crate::config::ToolCategory;
    use crate::memory::KeywordMemory;
    use crate::tools::{Tool, ToolResult};
    use async_trait::async_trait;
    use serde_json::{Value, json};
    use tempfile::TempDir;

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }
        fn description(&self) -> &str {
            "echoes"
        }
        fn parameters_schema(&self) -> Value {
            json!({"type": "object"})
        }
        fn category(&self) -> ToolCategory {
            ToolCategory::Automation
        }
        fn risk(&self) -> crate::security::RiskLevel {
            crate::security::RiskLevel::Low
        }
        async fn execute(&self, args: Value) -> crate::error::Result<ToolResult> {
            Ok(ToolResult::ok(
                args.get("message").and_then(Value::as_str).unwrap_or("(empty)"),
            ))
        }
    }

    fn session(dir: &TempDir, provider: Arc<ScriptedProvider>) -> SessionLoop {
        let settings = Arc::new(SettingsStore::load(dir.path(), "test").unwrap());
        let mut registry = ToolRegistry::new().with_settings(settings.clone());
        registry.register(Arc::new(EchoTool));

        SessionLoop::new(
            ProviderSet::new("scripted", provider),
            Arc::new(ModelRouter::default_routes("scripted")),
            Arc::new(registry),
            Arc::new(ThreadStore::new(dir.path())),
            Arc::new(KeywordMemory::new()),
            Arc::new(TaskStore::load(dir.path(), None).unwrap()),
            crate::approvals::ApprovalBroker::load(dir.path(), None).unwrap(),
            Arc::new(CostTracker::load(dir.path()).unwrap()),
            settings,
            None,
            dir.path().to_path_buf(),
        )
    }

    fn msg(text: &str) -> InboundMessage {
        InboundMessage {
            channel: "telegram".into(),
            user: "alice".into(),
            text: text.into(),
        }
    }

    #[tokio::test]
    async fn plain_reply_round_trip() {
        let dir = TempDir::new().unwrap();
        let s = session(&dir, ScriptedProvider::text("Hello Alice."));
        let reply = s.handle_message(&msg("hi")).await.unwrap();
        assert_eq!(reply, "Hello Alice.");

        // Thread persisted with user + assistant turns.
        let thread = ThreadStore::new(dir.path()).load("telegram", "alice");
        assert_eq!(thread.turns.len(), 2);
    }

    #[tokio::test]
    async fn tool_call_loops_until_final_answer() {
        let dir = TempDir::new().unwrap();
        let provider = ScriptedProvider::tool_then(
            "echo",
            json!({"message": "ping"}),
            vec![CompletionResponse::text("The echo said ping.")],
        );
        let s = session(&dir, provider.clone());
        let reply = s.handle_message(&msg("test the echo tool")).await.unwrap();
        assert_eq!(reply, "The echo said ping.");
        assert_eq!(provider.request_count(), 2);

        // The tool result turn went back to the model with the call id.
        let second_request = &provider.requests.lock().unwrap()[1];
        let tool_turn = second_request
            .messages
            .iter()
            .find(|m| m.tool_call_id.is_some())
            .expect("tool result turn present");
        assert_eq!(tool_turn.tool_call_id.as_deref(), Some("call_1"));
        assert_eq!(tool_turn.content, "ping");
    }

    #[tokio::test]
    async fn unknown_tool_surfaces_as_error_result_and_continues() {
        let dir = TempDir::new().unwrap();
        let provider = ScriptedProvider::tool_then(
            "not_a_tool",
            json!({}),
            vec![CompletionResponse::text("I could not find that tool.")],
        );
        let s = session(&dir, provider.clone());
        let reply = s.handle_message(&msg("x")).await.unwrap();
        assert_eq!(reply, "I could not find that tool.");

        let second_request = &provider.requests.lock().unwrap()[1];
        let tool_turn = second_request.messages.iter().find(|m| m.tool_call_id.is_some()).unwrap();
        assert!(tool_turn.content.starts_with("Error: unknown tool"));
    }

    #[tokio::test]
    async fn iteration_cap_returns_notice() {
        let dir = TempDir::new().unwrap();
        // Always calls a tool — never terminates on its own.
        let responses: Vec<CompletionResponse> = (0..40)
            .map(|i| {
                with_usage(CompletionResponse {
                    content: String::new(),
                    tool_calls: vec![ToolCall {
                        id: format!("call_{i}"),
                        name: "echo".into(),
                        arguments: json!({"message": "again"}),
                    }],
                    model: "scripted".into(),
                    usage: None,
                    finish_reason: None,
                })
            })
            .collect();
        let s = session(&dir, ScriptedProvider::new(responses));
        let reply = s.handle_message(&msg("loop forever")).await.unwrap();
        assert_eq!(reply, MAX_ITERATIONS_NOTICE);
    }

    #[tokio::test]
    async fn budget_hard_stop_returns_banner_without_llm_call() {
        let dir = TempDir::new().unwrap();
        let provider = ScriptedProvider::text("should never be seen");
        let s = session(&dir, provider.clone());
        s.cost
            .set_config(crate::cost::BudgetConfig {
                daily_budget: 0.01,
                weekly_budget: None,
                hard_stop: true,
            })
            .unwrap();
        s.cost.track_usage("m", TokenUsage { input_tokens: 1, output_tokens: 1 }, 0.02);

        let reply = s.handle_message(&msg("hello")).await.unwrap();
        assert_eq!(reply, BUDGET_BANNER);
        assert_eq!(provider.request_count(), 0);
    }

    #[tokio::test]
    async fn usage_is_recorded_per_llm_call() {
        let dir = TempDir::new().unwrap();
        let provider = ScriptedProvider::tool_then(
            "echo",
            json!({"message": "x"}),
            vec![CompletionResponse::text("done")],
        );
        let s = session(&dir, provider);
        s.handle_message(&msg("go")).await.unwrap();
        assert_eq!(s.cost.today().call_count, 2);
    }

    #[tokio::test]
    async fn chat_command_bypasses_llm() {
        let dir = TempDir::new().unwrap();
        let provider = ScriptedProvider::text("nope");
        let s = session(&dir, provider.clone());
        let reply = s.handle_message(&msg("/tasks")).await.unwrap();
        assert_eq!(reply, "No tasks yet.");
        assert_eq!(provider.request_count(), 0);
    }

    #[tokio::test]
    async fn heartbeat_ok_is_suppressed() {
        let dir = TempDir::new().unwrap();
        let s = session(&dir, ScriptedProvider::text("HEARTBEAT_OK"));
        let out = s.heartbeat_turn(&["check disk".into()]).await.unwrap();
        assert!(out.is_none());
    }

    #[tokio::test]
    async fn heartbeat_alert_is_forwarded() {
        let dir = TempDir::new().unwrap();
        let s = session(&dir, ScriptedProvider::text("Disk is 95% full!"));
        let out = s.heartbeat_turn(&["check disk".into()]).await.unwrap();
        assert_eq!(out.as_deref(), Some("Disk is 95% full!"));
    }

    #[tokio::test]
    async fn trigger_turn_embeds_payload() {
        let dir = TempDir::new().unwrap();
        let provider = ScriptedProvider::text("Handled the deploy hook.");
        let s = session(&dir, provider.clone());
        let reply = s
            .trigger_turn(
                "deploy-hook",
                "webhook",
                "verify the deployment",
                Some("telegram"),
                Some("alice"),
                &json!({"status": "green"}),
            )
            .await
            .unwrap();
        assert_eq!(reply, "Handled the deploy hook.");

        let request = &provider.requests.lock().unwrap()[0];
        let user_turn = &request.messages[request.messages.len() - 1];
        assert!(user_turn.content.contains("deploy-hook"));
        assert!(user_turn.content.contains("verify the deployment"));
        assert!(user_turn.content.contains("green"));
    }

    #[tokio::test]
    async fn medium_autonomy_gates_dangerous_tool_and_honors_rejection() {
        let dir = TempDir::new().unwrap();
        let provider = ScriptedProvider::tool_then(
            "run_shell",
            json!({"command": "ls"}),
            vec![CompletionResponse::text("Okay, I will not run it.")],
        );
        let s = session(&dir, provider.clone());
        let approvals = s.approvals.clone();

        // Reject the approval as soon as it shows up.
        let rejecter = tokio::spawn(async move {
            for _ in 0..200 {
                if let Some(req) = approvals.pending().first().cloned() {
                    approvals.resolve(&req.id, false, "alice").unwrap();
                    return;
                }
                tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            }
            panic!("approval never appeared");
        });

        let reply = s.handle_message(&msg("run ls for me")).await.unwrap();
        rejecter.await.unwrap();
        assert_eq!(reply, "Okay, I will not run it.");

        // The model saw the rejection as a tool result.
        let second_request = &provider.requests.lock().unwrap()[1];
        let tool_turn = second_request.messages.iter().find(|m| m.tool_call_id.is_some()).unwrap();
        assert!(tool_turn.content.contains("rejected or expired"));
    }
}
