//! The security guard: path jail, SSRF-safe URL validation, shell filter,
//! prompt-injection framing, rate limiting, audit trail, and gateway
//! authentication.

pub mod audit;
pub mod injection;
pub mod paths;
pub mod ratelimit;
pub mod shell_filter;
pub mod token;
pub mod urlcheck;

pub use audit::{AuditEntry, AuditLog};
pub use injection::wrap_untrusted;
pub use paths::safe_path;
pub use ratelimit::RateLimiter;
pub use shell_filter::validate_shell_command;
pub use token::{load_or_create_token, token_matches, token_path};
pub use urlcheck::{domain_in_list, is_blocked_ip, validate_url, validate_url_literal};

use serde::{Deserialize, Serialize};

use crate::config::AutonomyLevel;

// ─── RiskLevel ────────────────────────────────────────────────────────────────

/// Risk tier of a tool call, used by the approval policy and audit trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
            RiskLevel::Critical => "critical",
        };
        write!(f, "{s}")
    }
}

// ─── Approval policy ──────────────────────────────────────────────────────────

/// Tools that require approval at medium autonomy regardless of risk label.
pub const DANGEROUS_TOOLS: &[&str] = &[
    "run_shell",
    "write_file",
    "email_send",
    "mastodon_post",
    "reddit_post",
    "open_application",
    "clipboard_write",
];

/// Decide whether a call to `tool` requires a human approval under `level`.
pub fn needs_approval(level: AutonomyLevel, tool: &str) -> bool {
    match level {
        AutonomyLevel::Low => true,
        AutonomyLevel::Medium => DANGEROUS_TOOLS.contains(&tool),
        AutonomyLevel::High => false,
    }
}
