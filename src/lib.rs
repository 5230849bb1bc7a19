//! talon — a headless local AI agent host.
//!
//! Inbound requests (chat channels, webhooks, timers, watched files,
//! calendars, inboxes) become sequences of LLM calls and guarded tool
//! invocations under budget, approval, and persistence contracts.

pub mod agent;
pub mod ai;
pub mod approvals;
pub mod channels;
pub mod config;
pub mod cost;
pub mod error;
pub mod event_bus;
pub mod gateway;
pub mod logging;
pub mod memory;
pub mod orchestrator;
pub mod runtime;
pub mod scheduler;
pub mod security;
pub mod tasks;
pub mod tools;
pub mod triggers;
pub mod util;

/// Convenience re-exports for the most commonly used types.
///
/// ```rust
/// use talon::prelude::*;
/// ```
pub mod prelude {
    // Session loop + orchestration
    pub use crate::agent::{InboundMessage, SessionLoop};
    pub use crate::orchestrator::{Orchestrator, SubAgentIndex, should_orchestrate};

    // AI provider seam
    pub use crate::ai::{
        CompletionRequest, CompletionResponse, LLMProvider, Message, ModelRouter, ModelTier,
        ProviderSet, TokenUsage, ToolCall,
    };

    // Tool system
    pub use crate::tools::{Tool, ToolRegistry, ToolResult};

    // Stores
    pub use crate::approvals::ApprovalBroker;
    pub use crate::cost::CostTracker;
    pub use crate::memory::{Memory, ThreadStore};
    pub use crate::tasks::{Task, TaskStatus, TaskStore};
    pub use crate::triggers::TriggerRegistry;

    // Security guard
    pub use crate::security::{
        RiskLevel, safe_path, validate_shell_command, validate_url, wrap_untrusted,
    };

    // Configuration + events
    pub use crate::config::{AutonomyLevel, RuntimeSettings, SettingsStore};
    pub use crate::error::{CoreError, Result};
    pub use crate::event_bus::{AppEvent, EventBus, TokioBroadcastBus};

    // Runtime assembly
    pub use crate::runtime::{AgentRuntime, Collaborators, RuntimeOptions};

    // External collaborator interfaces
    pub use crate::channels::{Channel, ChannelManager, ChannelMessage};
    pub use crate::tools::MailTransport;
    pub use crate::triggers::{InboxClient, InboxMessage};
}
