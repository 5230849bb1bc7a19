//! Error kinds shared across the agent core.
//!
//! Security and validation errors are *always* caught at the tool-registry
//! seam and turned into error tool-results; they never unwind past a session
//! turn. Fatal errors are reserved for start-up (unopenable audit log,
//! unwritable workspace) and abort the process.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, CoreError>;

#[derive(Debug, Error)]
pub enum CoreError {
    /// Guard rejection: path jail, SSRF, shell filter, missing credentials.
    #[error("Error: {0}")]
    Security(String),

    /// Malformed arguments, invalid URL/email/cron expression.
    #[error("Error: {0}")]
    Validation(String),

    /// LLM, HTTP, or mailbox transport failure. Never retried by the core.
    #[error("Error: {0}")]
    Transport(String),

    /// The cost hard-stop refused a new LLM call.
    #[error("Daily LLM budget exceeded")]
    BudgetExhausted,

    /// A human (or the expiry timer) rejected a pending approval.
    #[error("Error: approval rejected: {0}")]
    ApprovalRejected(String),

    /// The orchestrator could not parse a plan from the model.
    #[error("Error: plan parse failure: {0}")]
    Plan(String),

    /// Unrecoverable start-up failure; the process exits non-zero.
    #[error("fatal: {0}")]
    Fatal(String),
}

impl CoreError {
    pub fn security(msg: impl Into<String>) -> Self {
        Self::Security(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    pub fn fatal(msg: impl Into<String>) -> Self {
        Self::Fatal(msg.into())
    }

    /// True for guard rejections, which are audit-logged with `blocked: true`.
    pub fn is_security(&self) -> bool {
        matches!(self, Self::Security(_))
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(e: serde_json::Error) -> Self {
        Self::Validation(format!("malformed JSON: {e}"))
    }
}

impl From<reqwest::Error> for CoreError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Transport(format!("request timed out: {e}"))
        } else {
            Self::Transport(e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn security_errors_render_with_error_prefix() {
        let e = CoreError::security("path escapes workspace");
        assert!(e.to_string().starts_with("Error: "));
        assert!(e.is_security());
    }

    #[test]
    fn budget_error_is_fixed_banner() {
        assert_eq!(
            CoreError::BudgetExhausted.to_string(),
            "Daily LLM budget exceeded"
        );
    }

    #[test]
    fn json_error_maps_to_validation() {
        let bad: std::result::Result<serde_json::Value, _> = serde_json::from_str("{nope");
        let e: CoreError = bad.unwrap_err().into();
        assert!(matches!(e, CoreError::Validation(_)));
    }
}
