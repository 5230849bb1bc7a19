//! Sub-agent records: ephemeral per-subtask workers, kept in a process-global
//! index for the admin snapshot.

use std::{collections::HashMap, sync::RwLock};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::ai::TokenUsage;

use super::plan::SubtaskRole;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    Idle,
    Busy,
    Error,
    Stopped,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubAgent {
    pub id: String,
    pub name: String,
    pub role: SubtaskRole,
    pub provider: String,
    pub model: String,
    pub status: AgentStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_task_id: Option<String>,
    /// Why the router picked this provider/model.
    pub routing_rationale: String,
    #[serde(default)]
    pub usage: TokenUsage,
}

/// Process-global index of sub-agents.
pub struct SubAgentIndex {
    agents: RwLock<HashMap<String, SubAgent>>,
}

impl SubAgentIndex {
    pub fn new() -> Self {
        Self {
            agents: RwLock::new(HashMap::new()),
        }
    }

    /// Register a fresh worker; returns its id.
    pub fn spawn(
        &self,
        role: SubtaskRole,
        provider: &str,
        model: &str,
        task_id: &str,
        rationale: &str,
    ) -> String {
        let id = Uuid::new_v4().to_string();
        let agent = SubAgent {
            id: id.clone(),
            name: format!("{}-{}", role.as_str(), &id[..8]),
            role,
            provider: provider.to_string(),
            model: model.to_string(),
            status: AgentStatus::Busy,
            current_task_id: Some(task_id.to_string()),
            routing_rationale: rationale.to_string(),
            usage: TokenUsage::default(),
        };
        self.agents
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(id.clone(), agent);
        id
    }

    pub fn finish(&self, id: &str, status: AgentStatus) {
        if let Ok(mut agents) = self.agents.write()
            && let Some(agent) = agents.get_mut(id)
        {
            agent.status = status;
            agent.current_task_id = None;
        }
    }

    pub fn add_usage(&self, id: &str, usage: TokenUsage) {
        if let Ok(mut agents) = self.agents.write()
            && let Some(agent) = agents.get_mut(id)
        {
            agent.usage.input_tokens += usage.input_tokens;
            agent.usage.output_tokens += usage.output_tokens;
        }
    }

    pub fn snapshot(&self) -> Vec<SubAgent> {
        let mut agents: Vec<SubAgent> = self
            .agents
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .cloned()
            .collect();
        agents.sort_by(|a, b| a.name.cmp(&b.name));
        agents
    }
}

impl Default for SubAgentIndex {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spawn_finish_lifecycle() {
        let index = SubAgentIndex::new();
        let id = index.spawn(SubtaskRole::Researcher, "openai", "gpt-4o-mini", "task-1", "fast tier");
        let snapshot = index.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].status, AgentStatus::Busy);
        assert_eq!(snapshot[0].current_task_id.as_deref(), Some("task-1"));

        index.finish(&id, AgentStatus::Idle);
        let snapshot = index.snapshot();
        assert_eq!(snapshot[0].status, AgentStatus::Idle);
        assert!(snapshot[0].current_task_id.is_none());
    }

    #[test]
    fn usage_accumulates_per_agent() {
        let index = SubAgentIndex::new();
        let id = index.spawn(SubtaskRole::Coder, "p", "m", "t", "r");
        index.add_usage(&id, TokenUsage { input_tokens: 5, output_tokens: 2 });
        index.add_usage(&id, TokenUsage { input_tokens: 3, output_tokens: 1 });
        let agent = &index.snapshot()[0];
        assert_eq!(agent.usage.input_tokens, 8);
        assert_eq!(agent.usage.output_tokens, 3);
    }
}
