use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{config::ToolCategory, error::Result, security::RiskLevel};

/// The result of executing a [`Tool`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    /// Human-readable output (stdout, file contents, fetch body, etc.).
    pub output: String,
    /// Whether the tool considered the execution successful.
    pub success: bool,
}

impl ToolResult {
    pub fn ok(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            success: true,
        }
    }

    pub fn err(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            success: false,
        }
    }
}

/// Who asked for this tool call (flows into task attribution and audit).
#[derive(Debug, Clone, Default)]
pub struct ToolContext {
    pub channel: String,
    pub user: String,
}

/// A capability the session loop can invoke.
///
/// Implementations must be `Send + Sync` so they can be held in a shared
/// `Arc<dyn Tool>` registry.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Stable machine identifier (snake_case), e.g. `"run_shell"`.
    fn name(&self) -> &str;

    /// Natural-language description used in LLM tool definitions.
    fn description(&self) -> &str;

    /// JSON Schema object describing the accepted parameters. Carried as
    /// opaque data — validation happens inside the handler.
    fn parameters_schema(&self) -> Value;

    /// Tool family, used for runtime permission filtering.
    fn category(&self) -> ToolCategory;

    /// Implicit risk label feeding the approval policy and audit trail.
    fn risk(&self) -> RiskLevel {
        RiskLevel::Medium
    }

    /// Execute with the given arguments. Security and validation failures are
    /// returned as errors and converted at the registry seam.
    async fn execute(&self, args: Value) -> Result<ToolResult>;

    /// Context-aware entry point used by the registry. Tools that need the
    /// caller identity override this; everything else falls through to
    /// [`Tool::execute`].
    async fn execute_with_ctx(&self, args: Value, _ctx: &ToolContext) -> Result<ToolResult> {
        self.execute(args).await
    }
}
