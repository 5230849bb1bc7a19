//! Orchestrator: decomposes a complex task into a plan of sub-agents, runs
//! parallel groups in label order, and synthesizes the results into the
//! parent task's result.

pub mod agents;
pub mod plan;

pub use agents::{AgentStatus, SubAgent, SubAgentIndex};
pub use plan::{
    Plan, PlanStatus, PlannedSubtask, SubtaskRole, SubtaskStatus, fallback_plan,
    parse_plan_response, planning_prompt, should_orchestrate,
};

use std::{collections::BTreeMap, sync::Arc};

use crate::{
    agent::SessionLoop,
    ai::{CompletionRequest, Message, ModelRouter, ModelTier, ProviderSet},
    cost::CostTracker,
    error::{CoreError, Result},
    tasks::{NewTask, Task, TaskStatus, TaskStore, TaskTokenUsage},
    util::truncate_chars,
};

/// Per-result cap inside the synthesis prompt.
const SYNTHESIS_RESULT_CHARS: usize = 5000;
/// Progress is held below this until synthesis completes.
const PRE_SYNTHESIS_PROGRESS_CAP: u8 = 90;

/// Request to orchestrate a task, sent by the `create_task` tool.
#[derive(Debug, Clone)]
pub struct OrchestrateRequest {
    pub task_id: String,
}

pub type OrchestrateSender = tokio::sync::mpsc::UnboundedSender<OrchestrateRequest>;
pub type OrchestrateReceiver = tokio::sync::mpsc::UnboundedReceiver<OrchestrateRequest>;

pub struct Orchestrator {
    session: Arc<SessionLoop>,
    providers: ProviderSet,
    router: Arc<ModelRouter>,
    tasks: Arc<TaskStore>,
    cost: Arc<CostTracker>,
    agents: Arc<SubAgentIndex>,
}

impl Orchestrator {
    pub fn new(
        session: Arc<SessionLoop>,
        providers: ProviderSet,
        router: Arc<ModelRouter>,
        tasks: Arc<TaskStore>,
        cost: Arc<CostTracker>,
        agents: Arc<SubAgentIndex>,
    ) -> Self {
        Self {
            session,
            providers,
            router,
            tasks,
            cost,
            agents,
        }
    }

    /// Run a full orchestration for `task_id`: plan → execute → synthesize.
    #[tracing::instrument(name = "orchestrator.run", skip_all, fields(task = %task_id))]
    pub async fn orchestrate(&self, task_id: &str) -> Result<String> {
        let task = self
            .tasks
            .get(task_id)
            .ok_or_else(|| CoreError::validation(format!("unknown task '{task_id}'")))?;

        if !self.cost.can_make_call() {
            self.tasks.update_status(
                task_id,
                TaskStatus::Failed,
                None,
                None,
                Some(crate::agent::BUDGET_BANNER.to_string()),
            )?;
            return Err(CoreError::BudgetExhausted);
        }

        self.tasks
            .update_status(task_id, TaskStatus::Running, Some(5), None, None)?;
        self.tasks.append_scratchpad(task_id, "planning subtasks")?;

        let subtasks = self.build_plan(&task).await?;
        let mut plan = Plan::new(&task.id, &task.description, subtasks);
        plan.status = PlanStatus::Executing;
        self.tasks.append_scratchpad(
            task_id,
            &format!("plan ready: {} subtask(s)", plan.subtasks.len()),
        )?;

        // Group by parallel label. BTreeMap iteration gives lexicographic
        // label order; ungrouped subtasks run sequentially afterwards.
        let mut groups: BTreeMap<String, Vec<usize>> = BTreeMap::new();
        let mut sequential: Vec<usize> = Vec::new();
        for (i, subtask) in plan.subtasks.iter().enumerate() {
            match &subtask.parallel_group {
                Some(label) => groups.entry(label.clone()).or_default().push(i),
                None => sequential.push(i),
            }
        }

        let total = plan.subtasks.len();
        let mut done = 0usize;
        let mut results: Vec<(String, String)> = Vec::new();

        for (label, indices) in &groups {
            warn_in_group_dependencies(&plan, indices, label);
            let snapshot = results.clone();
            let futures: Vec<_> = indices
                .iter()
                .map(|&i| self.run_subtask(plan.subtasks[i].clone(), &task, snapshot.clone()))
                .collect();
            let settled = futures::future::join_all(futures).await;
            for (&i, updated) in indices.iter().zip(settled) {
                if updated.status == SubtaskStatus::Completed
                    && let Some(result) = &updated.result
                {
                    results.push((updated.title.clone(), result.clone()));
                }
                plan.subtasks[i] = updated;
                done += 1;
            }
            self.advance_progress(task_id, done, total)?;
        }

        for i in sequential {
            let updated = self
                .run_subtask(plan.subtasks[i].clone(), &task, results.clone())
                .await;
            if updated.status == SubtaskStatus::Completed
                && let Some(result) = &updated.result
            {
                results.push((updated.title.clone(), result.clone()));
            }
            plan.subtasks[i] = updated;
            done += 1;
            self.advance_progress(task_id, done, total)?;
        }

        let failures: Vec<&PlannedSubtask> = plan
            .subtasks
            .iter()
            .filter(|s| s.status == SubtaskStatus::Failed)
            .collect();

        // Synthesis: one final call over every subtask's result.
        let summary = match self.synthesize(&task, &plan, &results, &failures).await {
            Ok(summary) => summary,
            Err(e) => {
                plan.status = PlanStatus::Failed;
                self.tasks.update_status(
                    task_id,
                    TaskStatus::Failed,
                    None,
                    None,
                    Some(e.to_string()),
                )?;
                return Err(e);
            }
        };

        plan.status = PlanStatus::Completed;
        self.tasks.update_status(
            task_id,
            TaskStatus::Completed,
            Some(100),
            Some(summary.clone()),
            None,
        )?;
        Ok(summary)
    }

    // ── Planning ─────────────────────────────────────────────────────────────

    async fn build_plan(&self, task: &Task) -> Result<Vec<PlannedSubtask>> {
        let route = self
            .router
            .route_for(ModelTier::Balanced)
            .or_else(|| self.router.route_for(ModelTier::Fast))
            .cloned()
            .ok_or_else(|| CoreError::fatal("no model routes configured"))?;
        let provider = self.providers.get(&route.provider_id);

        let request = CompletionRequest::new(
            route.model.clone(),
            vec![Message::user(planning_prompt(&task.description))],
        );
        let response = provider.complete(request).await?;
        let usage = response.usage.unwrap_or_default();
        self.cost
            .track_usage(&route.model, usage, route.cost_of(usage));
        let _ = self.tasks.add_usage(
            &task.id,
            TaskTokenUsage {
                input_tokens: usage.input_tokens,
                output_tokens: usage.output_tokens,
                cost: route.cost_of(usage),
            },
        );

        match parse_plan_response(&response.content) {
            Ok(subtasks) => Ok(subtasks),
            Err(e) => {
                log::warn!("orchestrator: {e}; degrading to a single-subtask plan");
                Ok(fallback_plan(&task.description))
            }
        }
    }

    // ── Execution ────────────────────────────────────────────────────────────

    async fn run_subtask(
        &self,
        mut subtask: PlannedSubtask,
        parent: &Task,
        previous: Vec<(String, String)>,
    ) -> PlannedSubtask {
        let decision = self.router.route_subtask(
            subtask.requires_privacy,
            Some(subtask.tier),
            subtask.complexity,
            Some(self.cost.remaining_budget()),
        );

        let child = match self.tasks.create(NewTask {
            title: subtask.title.clone(),
            description: subtask.description.clone(),
            parent_id: Some(parent.id.clone()),
            source: parent.source.clone(),
            model_override: Some(decision.route.model.clone()),
            ..Default::default()
        }) {
            Ok(child) => child,
            Err(e) => {
                subtask.status = SubtaskStatus::Failed;
                subtask.result = Some(e.to_string());
                return subtask;
            }
        };
        let _ = self
            .tasks
            .update_status(&child.id, TaskStatus::Running, None, None, None);

        let agent_id = self.agents.spawn(
            subtask.role,
            &decision.route.provider_id,
            &decision.route.model,
            &child.id,
            &decision.rationale,
        );
        subtask.assigned_agent = Some(agent_id.clone());
        subtask.status = SubtaskStatus::Running;

        let system = crate::agent::prompts::worker_prompt(
            subtask.role.as_str(),
            &parent.description,
            &subtask.title,
            &previous,
        );
        let outcome = self
            .session
            .run_worker(
                &system,
                &subtask.description,
                &decision.route,
                &parent.source,
                &child.id,
                &parent.id,
            )
            .await;

        // Mirror the child task's usage onto the agent record.
        if let Some(child_after) = self.tasks.get(&child.id) {
            self.agents.add_usage(
                &agent_id,
                crate::ai::TokenUsage {
                    input_tokens: child_after.usage.input_tokens,
                    output_tokens: child_after.usage.output_tokens,
                },
            );
        }

        match outcome {
            Ok(result) => {
                let _ = self.tasks.update_status(
                    &child.id,
                    TaskStatus::Completed,
                    Some(100),
                    Some(result.clone()),
                    None,
                );
                self.agents.finish(&agent_id, AgentStatus::Idle);
                subtask.status = SubtaskStatus::Completed;
                subtask.result = Some(result);
            }
            Err(e) => {
                let _ = self.tasks.update_status(
                    &child.id,
                    TaskStatus::Failed,
                    None,
                    None,
                    Some(e.to_string()),
                );
                self.agents.finish(&agent_id, AgentStatus::Error);
                subtask.status = SubtaskStatus::Failed;
                subtask.result = Some(e.to_string());
            }
        }
        subtask
    }

    /// Parent progress: proportional to settled subtasks, capped below the
    /// synthesis threshold. Monotonically non-decreasing by construction.
    fn advance_progress(&self, task_id: &str, done: usize, total: usize) -> Result<()> {
        let progress = (10 + (done * 80) / total.max(1)).min(PRE_SYNTHESIS_PROGRESS_CAP as usize);
        self.tasks.set_progress(task_id, progress as u8)?;
        Ok(())
    }

    // ── Synthesis ────────────────────────────────────────────────────────────

    async fn synthesize(
        &self,
        task: &Task,
        plan: &Plan,
        results: &[(String, String)],
        failures: &[&PlannedSubtask],
    ) -> Result<String> {
        if !self.cost.can_make_call() {
            return Err(CoreError::BudgetExhausted);
        }
        let route = self
            .router
            .route_for(ModelTier::Balanced)
            .or_else(|| self.router.route_for(ModelTier::Fast))
            .cloned()
            .ok_or_else(|| CoreError::fatal("no model routes configured"))?;
        let provider = self.providers.get(&route.provider_id);

        let mut prompt = format!(
            "Combine the subtask results below into one coherent answer to \
             the original objective.\n\nObjective: {}\n",
            plan.objective
        );
        for (title, result) in results {
            prompt.push_str(&format!(
                "\n## {title}\n{}\n",
                truncate_chars(result, SYNTHESIS_RESULT_CHARS)
            ));
        }
        for failure in failures {
            prompt.push_str(&format!(
                "\n## {} (FAILED)\n{}\n",
                failure.title,
                failure.result.as_deref().unwrap_or("no detail"),
            ));
        }

        let request = CompletionRequest::new(route.model.clone(), vec![Message::user(prompt)]);
        let response = provider.complete(request).await?;
        let usage = response.usage.unwrap_or_default();
        self.cost
            .track_usage(&route.model, usage, route.cost_of(usage));
        let _ = self.tasks.add_usage(
            &task.id,
            TaskTokenUsage {
                input_tokens: usage.input_tokens,
                output_tokens: usage.output_tokens,
                cost: route.cost_of(usage),
            },
        );
        Ok(response.content)
    }
}

fn warn_in_group_dependencies(plan: &Plan, indices: &[usize], label: &str) {
    let group_ids: Vec<&str> = indices
        .iter()
        .map(|&i| plan.subtasks[i].id.as_str())
        .collect();
    for &i in indices {
        let subtask = &plan.subtasks[i];
        for dep in &subtask.depends_on {
            if group_ids.contains(&dep.as_str()) {
                // Groups are the ordering mechanism; an in-group dependency
                // is planner error and runs unordered.
                log::warn!(
                    "orchestrator: '{}' depends on a subtask in its own parallel group '{label}'",
                    subtask.title
                );
            }
        }
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────
