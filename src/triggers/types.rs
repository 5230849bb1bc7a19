//! Trigger records: external events that wake the agent.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerType {
    FileWatch,
    Webhook,
    Cron,
    Calendar,
    EmailWatch,
}

impl TriggerType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FileWatch => "file_watch",
            Self::Webhook => "webhook",
            Self::Cron => "cron",
            Self::Calendar => "calendar",
            Self::EmailWatch => "email_watch",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "file_watch" => Some(Self::FileWatch),
            "webhook" => Some(Self::Webhook),
            "cron" => Some(Self::Cron),
            "calendar" => Some(Self::Calendar),
            "email_watch" => Some(Self::EmailWatch),
            _ => None,
        }
    }
}

/// What happens when a trigger fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    /// Run a session turn with the configured content as context.
    #[default]
    Message,
    /// Create a task from the configured content.
    Task,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct TriggerAction {
    pub kind: ActionKind,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trigger {
    pub id: String,
    pub trigger_type: TriggerType,
    pub name: String,
    pub enabled: bool,
    /// Type-specific configuration, carried opaquely:
    /// - file_watch: `{path, pattern}`
    /// - webhook:    `{path, secret?}`
    /// - cron:       `{expression}`
    /// - calendar:   `{url, pollMinutes}`
    /// - email_watch:`{pollMinutes, fromContains?, subjectContains?}`
    pub config: Value,
    pub action: TriggerAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_triggered: Option<chrono::DateTime<chrono::Utc>>,
    #[serde(default)]
    pub fire_count: u64,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl Trigger {
    pub fn new(
        trigger_type: TriggerType,
        name: impl Into<String>,
        config: Value,
        action: TriggerAction,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            trigger_type,
            name: name.into(),
            enabled: true,
            config,
            action,
            last_triggered: None,
            fire_count: 0,
            created_at: chrono::Utc::now(),
        }
    }

    pub fn config_str(&self, key: &str) -> Option<&str> {
        self.config.get(key).and_then(Value::as_str)
    }

    pub fn config_u64(&self, key: &str) -> Option<u64> {
        self.config.get(key).and_then(Value::as_u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn type_string_round_trip() {
        for t in [
            TriggerType::FileWatch,
            TriggerType::Webhook,
            TriggerType::Cron,
            TriggerType::Calendar,
            TriggerType::EmailWatch,
        ] {
            assert_eq!(TriggerType::parse(t.as_str()), Some(t));
        }
    }

    #[test]
    fn config_accessors() {
        let t = Trigger::new(
            TriggerType::Cron,
            "nightly",
            json!({"expression": "0 3 * * *", "retries": 2}),
            TriggerAction::default(),
        );
        assert_eq!(t.config_str("expression"), Some("0 3 * * *"));
        assert_eq!(t.config_u64("retries"), Some(2));
        assert_eq!(t.config_str("missing"), None);
    }

    #[test]
    fn json_round_trip() {
        let t = Trigger::new(
            TriggerType::Webhook,
            "deploy-hook",
            json!({"path": "/hooks/deploy", "secret": "s3cret"}),
            TriggerAction {
                kind: ActionKind::Task,
                content: "Deploy finished; verify the site".into(),
                channel: Some("telegram".into()),
                user: Some("ops".into()),
            },
        );
        let raw = serde_json::to_string(&t).unwrap();
        let back: Trigger = serde_json::from_str(&raw).unwrap();
        assert_eq!(back.id, t.id);
        assert_eq!(back.trigger_type, TriggerType::Webhook);
        assert_eq!(back.action.kind, ActionKind::Task);
    }
}
