//! Runtime settings schema, persisted as `settings.json` under the workspace.
//!
//! All sections carry `#[serde(default)]` so a partially-filled file works;
//! missing sections fall back to their `Default` impl. Environment variables
//! override file values at load time (see [`super::store`]).

use serde::{Deserialize, Serialize};

// ─── AutonomyLevel ────────────────────────────────────────────────────────────

/// Controls which tool calls require a human approval before executing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AutonomyLevel {
    /// Every tool call asks first.
    Low,
    /// Safe tools run automatically; the dangerous set asks.
    #[default]
    Medium,
    /// Nothing asks. Rate limits still apply.
    High,
}

impl AutonomyLevel {
    /// The sentence embedded into the system prompt describing this level.
    pub fn instruction(&self) -> &'static str {
        match self {
            AutonomyLevel::Low => "Always ask for approval before using any tool.",
            AutonomyLevel::Medium => {
                "Act autonomously for safe operations; ask for approval before destructive ones."
            }
            AutonomyLevel::High => "Act autonomously; only ask when an action is irreversible.",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            _ => None,
        }
    }
}

// ─── SecuritySwitches ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SecuritySwitches {
    /// Confine file tools to the workspace root (path jail).
    pub sandbox_enabled: bool,
    /// DNS-resolving URL validation against private/metadata ranges.
    pub ssrf_guard: bool,
    /// Wrap untrusted fetched content in a boundary-token envelope.
    pub injection_guard: bool,
    /// Require the bearer token on every gateway endpoint except `/health`.
    pub gateway_auth: bool,
    /// Append guard decisions to the JSONL audit log.
    pub audit_log: bool,
    /// Permit fetches to loopback addresses (development only).
    pub allow_localhost: bool,
}

impl Default for SecuritySwitches {
    fn default() -> Self {
        Self {
            sandbox_enabled: true,
            ssrf_guard: true,
            injection_guard: true,
            gateway_auth: true,
            audit_log: true,
            allow_localhost: false,
        }
    }
}

// ─── Limits ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Limits {
    /// Shell timeout in seconds, hard-capped at 120.
    pub shell_timeout_secs: u64,
    /// Tool results larger than this are truncated before reaching the model.
    pub max_tool_output_chars: usize,
    /// Token-bucket capacity per minute for gateway/channel callers.
    pub rate_limit_per_minute: u32,
    /// Maximum accepted HTTP request body in bytes.
    pub max_request_body_bytes: usize,
    /// Iteration cap for one session-loop turn.
    pub max_tool_calls: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            shell_timeout_secs: 60,
            max_tool_output_chars: 30_000,
            rate_limit_per_minute: 60,
            max_request_body_bytes: 1024 * 1024,
            max_tool_calls: 20,
        }
    }
}

// ─── ToolPermissions ──────────────────────────────────────────────────────────

/// Category switches deciding which tool families are advertised to the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ToolPermissions {
    pub filesystem: bool,
    pub shell: bool,
    pub web: bool,
    pub browser: bool,
    pub email: bool,
    pub social: bool,
    pub system_control: bool,
    pub automation: bool,
}

impl Default for ToolPermissions {
    fn default() -> Self {
        Self {
            filesystem: true,
            shell: true,
            web: true,
            browser: false,
            email: false,
            social: false,
            system_control: false,
            automation: true,
        }
    }
}

/// Tool family used for permission filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolCategory {
    Filesystem,
    Shell,
    Web,
    Browser,
    Email,
    Social,
    SystemControl,
    /// Tasks, triggers, cron, memory, cost — the agent's own plumbing.
    Automation,
}

impl ToolPermissions {
    pub fn allows(&self, category: ToolCategory) -> bool {
        match category {
            ToolCategory::Filesystem => self.filesystem,
            ToolCategory::Shell => self.shell,
            ToolCategory::Web => self.web,
            ToolCategory::Browser => self.browser,
            ToolCategory::Email => self.email,
            ToolCategory::Social => self.social,
            ToolCategory::SystemControl => self.system_control,
            ToolCategory::Automation => self.automation,
        }
    }
}

// ─── HeartbeatConfig ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct HeartbeatConfig {
    pub enabled: bool,
    pub interval_minutes: u64,
    /// Channel that receives heartbeat alerts (empty = none).
    pub channel: String,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_minutes: 30,
            channel: String::new(),
        }
    }
}

// ─── IntegrationCredentials ───────────────────────────────────────────────────

/// Secrets for the optional integrations. Sourced from the environment; the
/// file copy is only a mirror of whatever was exported (no at-rest encryption
/// — workspace permissions are the boundary).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct IntegrationCredentials {
    pub github_token: Option<String>,
    pub mastodon_base_url: Option<String>,
    pub mastodon_token: Option<String>,
    pub reddit_token: Option<String>,
    pub smtp_from: Option<String>,
    pub imap_host: Option<String>,
}

// ─── RuntimeSettings ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RuntimeSettings {
    pub agent_name: String,
    pub autonomy: AutonomyLevel,
    pub security: SecuritySwitches,
    pub limits: Limits,
    pub permissions: ToolPermissions,
    /// Domains always allowed by `web_fetch` even without DNS validation.
    pub allowed_domains: Vec<String>,
    /// Domains always refused by `web_fetch`.
    pub blocked_domains: Vec<String>,
    pub heartbeat: HeartbeatConfig,
    pub integrations: IntegrationCredentials,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            agent_name: "Talon".to_string(),
            autonomy: AutonomyLevel::default(),
            security: SecuritySwitches::default(),
            limits: Limits::default(),
            permissions: ToolPermissions::default(),
            allowed_domains: Vec::new(),
            blocked_domains: Vec::new(),
            heartbeat: HeartbeatConfig::default(),
            integrations: IntegrationCredentials::default(),
        }
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_locked_down() {
        let s = RuntimeSettings::default();
        assert!(s.security.ssrf_guard);
        assert!(s.security.sandbox_enabled);
        assert!(!s.security.allow_localhost);
        assert!(!s.permissions.email);
        assert!(!s.permissions.system_control);
    }

    #[test]
    fn partial_json_fills_missing_sections() {
        let s: RuntimeSettings =
            serde_json::from_str(r#"{"agentName":"Iris","limits":{"maxToolCalls":5}}"#).unwrap();
        assert_eq!(s.agent_name, "Iris");
        assert_eq!(s.limits.max_tool_calls, 5);
        // Untouched fields keep their defaults.
        assert_eq!(s.limits.shell_timeout_secs, 60);
        assert!(s.security.gateway_auth);
    }

    #[test]
    fn autonomy_parse_round_trip() {
        assert_eq!(AutonomyLevel::parse("HIGH"), Some(AutonomyLevel::High));
        assert_eq!(AutonomyLevel::parse("medium"), Some(AutonomyLevel::Medium));
        assert_eq!(AutonomyLevel::parse("nope"), None);
    }

    #[test]
    fn permission_category_mapping() {
        let p = ToolPermissions::default();
        assert!(p.allows(ToolCategory::Filesystem));
        assert!(!p.allows(ToolCategory::Browser));
        assert!(!p.allows(ToolCategory::SystemControl));
    }
}
