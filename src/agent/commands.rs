//! Chat commands handled before the LLM ever sees the message.

use std::sync::Arc;

use crate::{
    approvals::ApprovalBroker,
    cost::CostTracker,
    tasks::TaskStore,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatCommand {
    Approve(String),
    Reject(String),
    Pending,
    Tasks,
    Cost,
}

/// Case-insensitive match against the command table. Returns `None` for
/// ordinary messages (including unknown slash commands, which fall through to
/// the model).
pub fn parse(text: &str) -> Option<ChatCommand> {
    let trimmed = text.trim();
    let lower = trimmed.to_ascii_lowercase();
    let mut parts = lower.split_whitespace();
    let head = parts.next()?;

    match head {
        "/approve" | "/reject" => {
            // Take the id prefix from the *original* text to preserve case.
            let prefix = trimmed.split_whitespace().nth(1)?.to_string();
            if head == "/approve" {
                Some(ChatCommand::Approve(prefix))
            } else {
                Some(ChatCommand::Reject(prefix))
            }
        }
        "/pending" => Some(ChatCommand::Pending),
        "/tasks" => Some(ChatCommand::Tasks),
        "/cost" | "/costs" => Some(ChatCommand::Cost),
        _ => None,
    }
}

/// Execute a chat command on behalf of `user`.
pub fn execute(
    command: ChatCommand,
    user: &str,
    approvals: &Arc<ApprovalBroker>,
    tasks: &Arc<TaskStore>,
    cost: &Arc<CostTracker>,
) -> String {
    match command {
        ChatCommand::Approve(prefix) => match approvals.resolve(&prefix, true, user) {
            Ok(req) => format!("Approved: {}", req.description),
            Err(e) => e.to_string(),
        },
        ChatCommand::Reject(prefix) => match approvals.resolve(&prefix, false, user) {
            Ok(req) => format!("Rejected: {}", req.description),
            Err(e) => e.to_string(),
        },
        ChatCommand::Pending => {
            let pending = approvals.pending_for(user);
            if pending.is_empty() {
                return "No approvals pending for you.".to_string();
            }
            pending
                .iter()
                .map(|r| {
                    format!(
                        "{} [{}] {} — expires {}",
                        &r.id[..8],
                        r.risk,
                        r.description,
                        r.expires_at.format("%H:%M UTC"),
                    )
                })
                .collect::<Vec<_>>()
                .join("\n")
        }
        ChatCommand::Tasks => {
            let recent = tasks.list_recent(15);
            if recent.is_empty() {
                return "No tasks yet.".to_string();
            }
            recent
                .iter()
                .map(|t| {
                    format!(
                        "{} [{}] {} — {}%, ${:.4}",
                        &t.id[..8],
                        t.status.as_str(),
                        t.title,
                        t.progress,
                        t.usage.cost,
                    )
                })
                .collect::<Vec<_>>()
                .join("\n")
        }
        ChatCommand::Cost => {
            let today = cost.today();
            format!(
                "Today: {} LLM calls, {} tokens ({} in / {} out), estimated ${:.4}.",
                today.call_count,
                today.input_tokens + today.output_tokens,
                today.input_tokens,
                today.output_tokens,
                today.cost,
            )
        }
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────
