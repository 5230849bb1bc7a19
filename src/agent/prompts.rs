//! Prompt assembly for the session loop and orchestrated workers.

use crate::{
    config::RuntimeSettings,
    cost::DailyUsage,
    util::truncate_chars,
};

/// Per-result context cap inside worker prompts.
const PREVIOUS_RESULT_CHARS: usize = 2000;
/// Trigger payload cap inside the synthetic user turn.
const TRIGGER_PAYLOAD_CHARS: usize = 3000;

/// The session system prompt: identity, time, workspace, autonomy policy,
/// memory bullets, skill instructions, usage.
pub fn system_prompt(
    settings: &RuntimeSettings,
    workspace: &std::path::Path,
    memory_bullets: &[String],
    skills: &[String],
    usage: &DailyUsage,
) -> String {
    let mut prompt = format!(
        "You are {name}, a local agent running on the user's machine.\n\
         Current time: {now}.\n\
         Workspace root: {ws} — all file operations are confined to it.\n\
         Autonomy policy: {policy}\n",
        name = settings.agent_name,
        now = chrono::Utc::now().to_rfc3339(),
        ws = workspace.display(),
        policy = settings.autonomy.instruction(),
    );

    if !memory_bullets.is_empty() {
        prompt.push_str("\nWhat you remember:\n");
        for bullet in memory_bullets {
            prompt.push_str(&format!("- {bullet}\n"));
        }
    }

    if !skills.is_empty() {
        prompt.push_str("\nLoaded skills:\n");
        for skill in skills {
            prompt.push_str(skill);
            prompt.push('\n');
        }
    }

    prompt.push_str(&format!(
        "\nToday so far: {} LLM calls, ${:.4} spent.\n\
         Use tools when they help; reply in plain text when you are done.",
        usage.call_count, usage.cost,
    ));
    prompt
}

/// System prompt for one orchestrated subtask worker.
pub fn worker_prompt(
    role: &str,
    objective: &str,
    subtask_title: &str,
    previous_results: &[(String, String)],
) -> String {
    let mut prompt = format!(
        "You are a {role} sub-agent working on one part of a larger objective.\n\
         Overall objective: {objective}\n\
         Your assignment: {subtask_title}\n",
    );
    if !previous_results.is_empty() {
        prompt.push_str("\nResults from earlier subtasks:\n");
        for (title, result) in previous_results {
            prompt.push_str(&format!(
                "## {title}\n{}\n",
                truncate_chars(result, PREVIOUS_RESULT_CHARS)
            ));
        }
    }
    prompt.push_str("\nComplete only your assignment. Your final message becomes this subtask's result.");
    prompt
}

/// Synthetic user turn for heartbeat mode.
pub fn heartbeat_user_prompt(items: &[String]) -> String {
    let mut prompt = String::from(
        "Heartbeat check. Review these outstanding checklist items and act on \
         anything that needs attention:\n",
    );
    for item in items {
        prompt.push_str(&format!("- {item}\n"));
    }
    prompt.push_str(
        "\nIf nothing needs to be done right now, respond with exactly HEARTBEAT_OK.",
    );
    prompt
}

/// Synthetic user turn for trigger mode.
pub fn trigger_user_prompt(
    name: &str,
    trigger_type: &str,
    action_content: &str,
    payload: &serde_json::Value,
) -> String {
    let payload_text = truncate_chars(&payload.to_string(), TRIGGER_PAYLOAD_CHARS);
    format!(
        "Trigger '{name}' ({trigger_type}) fired.\n\
         Configured instruction: {action_content}\n\
         Event payload:\n{payload_text}",
    )
}
