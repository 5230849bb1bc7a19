//! Conversation threads, keyed by `(channel, user)`.
//!
//! Each turn loads its thread, mutates it, and saves it back; there is no
//! long-lived in-memory session. When a thread exceeds the soft cap the
//! oldest prefix is digested into the bounded `summary` field and dropped —
//! re-trimming an already-trimmed thread is a no-op.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::{
    ai::types::{Message, MessageRole, ToolCall},
    error::Result,
    util::atomic_write,
};

/// Threads longer than this are trimmed down to [`KEEP_RECENT`] turns.
pub const SOFT_TURN_CAP: usize = 100;
const KEEP_RECENT: usize = 50;
/// Upper bound on the rolling summary.
pub const SUMMARY_MAX_CHARS: usize = 2000;

// ─── ChatTurn ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatTurn {
    pub role: MessageRole,
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl ChatTurn {
    pub fn from_message(msg: &Message) -> Self {
        Self {
            role: msg.role,
            content: msg.content.clone(),
            tool_calls: msg.tool_calls.clone(),
            tool_call_id: msg.tool_call_id.clone(),
            timestamp: chrono::Utc::now(),
        }
    }

    pub fn to_message(&self) -> Message {
        Message {
            role: self.role,
            content: self.content.clone(),
            tool_calls: self.tool_calls.clone(),
            tool_call_id: self.tool_call_id.clone(),
        }
    }
}

// ─── ConversationThread ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationThread {
    pub channel: String,
    pub user: String,
    pub turns: Vec<ChatTurn>,
    /// Rolling digest of trimmed history, at most [`SUMMARY_MAX_CHARS`].
    #[serde(default)]
    pub summary: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl ConversationThread {
    pub fn new(channel: impl Into<String>, user: impl Into<String>) -> Self {
        let now = chrono::Utc::now();
        Self {
            channel: channel.into(),
            user: user.into(),
            turns: Vec::new(),
            summary: String::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn push(&mut self, turn: ChatTurn) {
        self.turns.push(turn);
        self.updated_at = chrono::Utc::now();
    }

    /// Messages for the LLM call (system role is supplied separately).
    pub fn to_messages(&self) -> Vec<Message> {
        self.turns.iter().map(ChatTurn::to_message).collect()
    }

    /// Digest the oldest prefix into `summary` once the soft cap is crossed.
    ///
    /// Idempotent: a thread at or under the cap is left untouched.
    pub fn trim(&mut self) {
        if self.turns.len() <= SOFT_TURN_CAP {
            return;
        }
        let drop_count = self.turns.len() - KEEP_RECENT;
        let dropped: Vec<ChatTurn> = self.turns.drain(..drop_count).collect();

        for turn in &dropped {
            let line = match turn.role {
                MessageRole::User => format!("User: {}", one_line(&turn.content, 120)),
                MessageRole::Assistant if !turn.content.is_empty() => {
                    format!("Agent: {}", one_line(&turn.content, 120))
                }
                MessageRole::Assistant => {
                    let names: Vec<&str> =
                        turn.tool_calls.iter().map(|c| c.name.as_str()).collect();
                    format!("Agent used tools: {}", names.join(", "))
                }
                MessageRole::Tool => continue,
                MessageRole::System => continue,
            };
            if !self.summary.is_empty() {
                self.summary.push('\n');
            }
            self.summary.push_str(&line);
        }

        // Keep the newest tail of the summary within the bound.
        if self.summary.chars().count() > SUMMARY_MAX_CHARS {
            let excess = self.summary.chars().count() - SUMMARY_MAX_CHARS;
            self.summary = self.summary.chars().skip(excess).collect();
            // Drop the possibly-truncated first line.
            if let Some(idx) = self.summary.find('\n') {
                self.summary = self.summary.split_off(idx + 1);
            }
        }
        self.updated_at = chrono::Utc::now();
    }
}

fn one_line(s: &str, max: usize) -> String {
    let flat = s.replace('\n', " ");
    crate::util::truncate_chars(&flat, max)
}

// ─── ThreadStore ──────────────────────────────────────────────────────────────

/// File-per-thread persistence under `threads/`.
pub struct ThreadStore {
    dir: PathBuf,
}

impl ThreadStore {
    pub fn new(workspace: &std::path::Path) -> Self {
        Self {
            dir: workspace.join("threads"),
        }
    }

    fn path_for(&self, channel: &str, user: &str) -> PathBuf {
        self.dir.join(format!("{}__{}.json", sanitize(channel), sanitize(user)))
    }

    /// Load the thread for `(channel, user)`, creating an empty one if absent.
    pub fn load(&self, channel: &str, user: &str) -> ConversationThread {
        let path = self.path_for(channel, user);
        std::fs::read_to_string(&path)
            .ok()
            .and_then(|raw| serde_json::from_str(&raw).ok())
            .unwrap_or_else(|| ConversationThread::new(channel, user))
    }

    /// Trim and persist.
    pub fn save(&self, thread: &mut ConversationThread) -> Result<()> {
        thread.trim();
        let path = self.path_for(&thread.channel, &thread.user);
        let raw = serde_json::to_string_pretty(thread)?;
        atomic_write(&path, &raw)
    }
}

fn sanitize(part: &str) -> String {
    part.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

// ─── Tests ────────────────────────────────────────────────────────────────────
