//! Task records: the unit of work tracked by the persistent queue.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ─── Status / priority ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Running,
    WaitingApproval,
    Paused,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    /// Terminal statuses stamp `completed_at`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::WaitingApproval => "waiting_approval",
            Self::Paused => "paused",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "running" => Some(Self::Running),
            "waiting_approval" => Some(Self::WaitingApproval),
            "paused" => Some(Self::Paused),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TaskPriority {
    Critical,
    High,
    #[default]
    Normal,
    Low,
}

impl TaskPriority {
    /// Sort key: critical first.
    pub fn order(&self) -> u8 {
        match self {
            Self::Critical => 0,
            Self::High => 1,
            Self::Normal => 2,
            Self::Low => 3,
        }
    }
}

// ─── Steps / usage / source ───────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskStep {
    pub description: String,
    pub completed: bool,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TaskTokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cost: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TaskSource {
    pub channel: String,
    pub user: String,
}

// ─── Task ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    pub title: String,
    pub description: String,
    pub status: TaskStatus,
    pub priority: TaskPriority,
    /// 0–100; 100 iff completed.
    pub progress: u8,
    #[serde(default)]
    pub steps: Vec<TaskStep>,
    #[serde(default)]
    pub current_step_index: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub source: TaskSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_override: Option<String>,
    #[serde(default)]
    pub usage: TaskTokenUsage,
    /// Append-only free-text diary the owning worker writes as it goes.
    #[serde(default)]
    pub scratchpad: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// Parameters for [`crate::tasks::TaskStore::create`].
#[derive(Debug, Clone, Default)]
pub struct NewTask {
    pub title: String,
    pub description: String,
    pub priority: TaskPriority,
    pub parent_id: Option<String>,
    pub source: TaskSource,
    pub model_override: Option<String>,
    pub tags: Vec<String>,
}

impl Task {
    pub fn new(params: NewTask) -> Self {
        let now = chrono::Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            parent_id: params.parent_id,
            title: params.title,
            description: params.description,
            status: TaskStatus::Pending,
            priority: params.priority,
            progress: 0,
            steps: Vec::new(),
            current_step_index: 0,
            result: None,
            error: None,
            source: params.source,
            model_override: params.model_override,
            usage: TaskTokenUsage::default(),
            scratchpad: String::new(),
            tags: params.tags,
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }

    /// Progress derived from step completion when steps exist.
    pub fn derived_progress(&self) -> u8 {
        if self.steps.is_empty() {
            return self.progress;
        }
        let done = self.steps.iter().filter(|s| s.completed).count();
        ((done * 100) / self.steps.len()) as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_ordering() {
        assert!(TaskPriority::Critical.order() < TaskPriority::High.order());
        assert!(TaskPriority::High.order() < TaskPriority::Normal.order());
        assert!(TaskPriority::Normal.order() < TaskPriority::Low.order());
    }

    #[test]
    fn status_terminality() {
        assert!(TaskStatus::Completed.is_terminal());
        assert!(TaskStatus::Failed.is_terminal());
        assert!(TaskStatus::Cancelled.is_terminal());
        assert!(!TaskStatus::Running.is_terminal());
        assert!(!TaskStatus::Paused.is_terminal());
    }

    #[test]
    fn status_string_round_trip() {
        for s in [
            TaskStatus::Pending,
            TaskStatus::Running,
            TaskStatus::WaitingApproval,
            TaskStatus::Paused,
            TaskStatus::Completed,
            TaskStatus::Failed,
            TaskStatus::Cancelled,
        ] {
            assert_eq!(TaskStatus::parse(s.as_str()), Some(s));
        }
    }

    #[test]
    fn derived_progress_from_steps() {
        let mut task = Task::new(NewTask {
            title: "t".into(),
            ..Default::default()
        });
        task.steps = vec![
            TaskStep { description: "a".into(), completed: true },
            TaskStep { description: "b".into(), completed: true },
            TaskStep { description: "c".into(), completed: false },
            TaskStep { description: "d".into(), completed: false },
        ];
        assert_eq!(task.derived_progress(), 50);
    }

    #[test]
    fn json_round_trip_preserves_timestamps() {
        let task = Task::new(NewTask { title: "t".into(), ..Default::default() });
        let raw = serde_json::to_string(&task).unwrap();
        let back: Task = serde_json::from_str(&raw).unwrap();
        assert_eq!(back.id, task.id);
        assert_eq!(back.created_at, task.created_at);
        assert_eq!(back.updated_at, task.updated_at);
    }
}
