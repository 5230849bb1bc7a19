use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// All events that flow through the application event bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AppEvent {
    /// An inbound chat message arrived on a channel.
    MessageReceived {
        channel: String,
        user: String,
        content: String,
    },
    /// A session turn started processing a request.
    AgentStarted { channel: String, user: String },
    /// A session turn finished with a reply (possibly suppressed).
    AgentCompleted {
        channel: String,
        user: String,
        reply: String,
    },
    ToolCalled {
        tool_name: String,
        args: serde_json::Value,
    },
    ToolResult {
        tool_name: String,
        result: String,
        success: bool,
    },
    /// Emitted when a tool call suspends on a pending human approval.
    ApprovalRequested {
        approval_id: String,
        task_id: String,
        tool_name: String,
        risk: String,
        description: String,
        channel: String,
        user: String,
    },
    ApprovalResolved {
        approval_id: String,
        approved: bool,
        resolver: String,
    },
    /// The heartbeat timer found unchecked checklist items.
    HeartbeatDue { items: Vec<String> },
    TriggerFired {
        trigger_id: String,
        name: String,
        trigger_type: String,
        payload: serde_json::Value,
    },
    TaskUpdated {
        task_id: String,
        status: String,
        progress: u8,
    },
    SystemError { message: String },
}

/// Central pub/sub bus for application events.
///
/// All returned `Receiver`s receive every published event; consumers discard
/// what they are not interested in.
pub trait EventBus: Send + Sync {
    /// Publish an event to all active subscribers.
    fn publish(&self, event: AppEvent) -> Result<(), String>;

    /// Subscribe to all events.
    fn subscribe(&self) -> broadcast::Receiver<AppEvent>;
}
