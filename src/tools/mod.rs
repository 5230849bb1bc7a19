//! The tool system: trait, registry with its execute pipeline, and the
//! built-in tool set.

#[cfg(feature = "browser")]
pub mod browser;
pub mod cost_tools;
pub mod cron_tools;
pub mod file_ops;
pub mod integrations;
pub mod memory_tools;
pub mod registry;
pub mod shell;
pub mod system;
pub mod task_tools;
pub mod traits;
pub mod trigger_tools;
pub mod web;

pub use integrations::MailTransport;
pub use registry::{ToolOutcome, ToolRegistry};
pub use traits::{Tool, ToolContext, ToolResult};

use std::{path::PathBuf, sync::Arc};

use crate::{
    config::SettingsStore,
    cost::CostTracker,
    memory::Memory,
    orchestrator::OrchestrateSender,
    tasks::TaskStore,
    triggers::TriggerRegistry,
};

/// Everything the built-in tool set needs.
pub struct BuiltinToolDeps {
    pub workspace: PathBuf,
    pub settings: Arc<SettingsStore>,
    pub memory: Arc<dyn Memory>,
    pub tasks: Arc<TaskStore>,
    pub triggers: Arc<TriggerRegistry>,
    pub cost: Arc<CostTracker>,
    pub orchestrate: Option<OrchestrateSender>,
    pub mail: Option<Arc<dyn MailTransport>>,
    pub inbox: Option<Arc<dyn crate::triggers::InboxClient>>,
}

/// Register the full built-in tool set.
pub fn register_builtins(registry: &mut ToolRegistry, deps: BuiltinToolDeps) {
    let ws = deps.workspace;

    registry.register(Arc::new(shell::ShellTool::new(ws.clone(), deps.settings.clone())));
    registry.register(Arc::new(file_ops::ReadFileTool::new(ws.clone())));
    registry.register(Arc::new(file_ops::WriteFileTool::new(ws.clone())));
    registry.register(Arc::new(file_ops::ListDirectoryTool::new(ws.clone())));
    registry.register(Arc::new(web::WebFetchTool::new(deps.settings.clone())));
    #[cfg(feature = "browser")]
    registry.register(Arc::new(browser::BrowserActionTool::new(
        ws.clone(),
        deps.settings.clone(),
    )));

    registry.register(Arc::new(memory_tools::RememberTool::new(deps.memory.clone())));
    registry.register(Arc::new(memory_tools::RecallTool::new(deps.memory)));

    registry.register(Arc::new(task_tools::CreateTaskTool::new(
        deps.tasks.clone(),
        deps.orchestrate,
    )));
    registry.register(Arc::new(task_tools::ListTasksTool::new(deps.tasks.clone())));
    registry.register(Arc::new(task_tools::GetTaskTool::new(deps.tasks.clone())));
    registry.register(Arc::new(task_tools::CancelTaskTool::new(deps.tasks)));

    registry.register(Arc::new(cron_tools::ScheduleCronTool::new(deps.triggers.clone())));
    registry.register(Arc::new(cron_tools::CancelCronTool::new(deps.triggers.clone())));
    registry.register(Arc::new(cron_tools::EditHeartbeatTool::new(ws)));

    registry.register(Arc::new(trigger_tools::CreateTriggerTool::new(deps.triggers.clone())));
    registry.register(Arc::new(trigger_tools::ListTriggersTool::new(deps.triggers.clone())));
    registry.register(Arc::new(trigger_tools::DeleteTriggerTool::new(deps.triggers)));

    registry.register(Arc::new(cost_tools::GetUsageTool::new(deps.cost.clone())));
    registry.register(Arc::new(cost_tools::ConfigureBudgetTool::new(deps.cost)));

    registry.register(Arc::new(system::SystemInfoTool));
    registry.register(Arc::new(system::ClipboardWriteTool));
    registry.register(Arc::new(system::OpenApplicationTool));

    registry.register(Arc::new(integrations::EmailSendTool::new(
        deps.settings.clone(),
        deps.mail,
    )));
    registry.register(Arc::new(integrations::EmailReadTool::new(
        deps.settings.clone(),
        deps.inbox,
    )));
    registry.register(Arc::new(integrations::GithubTool::new(deps.settings.clone())));
    registry.register(Arc::new(integrations::MastodonPostTool::new(deps.settings.clone())));
    registry.register(Arc::new(integrations::RedditPostTool::new(deps.settings)));
}
