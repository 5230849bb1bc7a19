//! `run_shell` — guarded shell execution.
//!
//! The command is screened by the deny-list filter, runs with its cwd jailed
//! to the workspace, inherits the host environment minus API credentials, and
//! is killed at the configured timeout (hard cap 120 s).

use std::{path::PathBuf, process::Stdio, sync::Arc, time::Duration};

use async_trait::async_trait;
use serde_json::{Value, json};

use crate::{
    config::{SettingsStore, ToolCategory},
    error::{CoreError, Result},
    security::{RiskLevel, safe_path, validate_shell_command},
};

use super::traits::{Tool, ToolResult};

/// Hard ceiling regardless of configuration.
const MAX_TIMEOUT_SECS: u64 = 120;
/// Raw capture cap before the per-stream character limits apply.
const MAX_CAPTURE_BYTES: usize = 5 * 1024 * 1024;
const STDOUT_CHARS: usize = 10_000;
const STDERR_CHARS: usize = 5_000;

/// Environment variables with these suffixes never reach child processes.
const STRIPPED_ENV_SUFFIXES: &[&str] = &["_API_KEY", "_TOKEN", "_BOT_TOKEN"];

pub struct ShellTool {
    workspace: PathBuf,
    settings: Arc<SettingsStore>,
}

impl ShellTool {
    pub fn new(workspace: PathBuf, settings: Arc<SettingsStore>) -> Self {
        Self { workspace, settings }
    }

    fn timeout(&self) -> Duration {
        let configured = self.settings.get().limits.shell_timeout_secs;
        Duration::from_secs(configured.clamp(1, MAX_TIMEOUT_SECS))
    }
}

fn is_stripped(key: &str) -> bool {
    STRIPPED_ENV_SUFFIXES.iter().any(|suffix| key.ends_with(suffix))
}

#[async_trait]
impl Tool for ShellTool {
    fn name(&self) -> &str {
        "run_shell"
    }

    fn description(&self) -> &str {
        "Execute a shell command inside the workspace and return its output. \
         Destructive commands are refused by the security filter."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "description": "The shell command to execute."
                },
                "working_dir": {
                    "type": "string",
                    "description": "Optional working directory, relative to the workspace."
                }
            },
            "required": ["command"]
        })
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Shell
    }

    fn risk(&self) -> RiskLevel {
        RiskLevel::High
    }

    async fn execute(&self, args: Value) -> Result<ToolResult> {
        let command = args
            .get("command")
            .and_then(Value::as_str)
            .ok_or_else(|| CoreError::validation("missing required argument 'command'"))?
            .to_string();

        validate_shell_command(&command)?;

        let cwd = match args.get("working_dir").and_then(Value::as_str) {
            Some(dir) => safe_path(&self.workspace, dir)?,
            None => self.workspace.clone(),
        };

        let mut cmd = tokio::process::Command::new("sh");
        cmd.arg("-c")
            .arg(&command)
            .current_dir(&cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        // Inherit the host environment minus credential-bearing variables.
        for (key, _) in std::env::vars() {
            if is_stripped(&key) {
                cmd.env_remove(&key);
            }
        }

        let timeout = self.timeout();
        let output = tokio::time::timeout(timeout, cmd.output())
            .await
            .map_err(|_| {
                CoreError::validation(format!(
                    "command timed out after {} seconds",
                    timeout.as_secs()
                ))
            })?
            .map_err(|e| CoreError::transport(format!("failed to spawn process: {e}")))?;

        let mut stdout = output.stdout;
        stdout.truncate(MAX_CAPTURE_BYTES);
        let mut stderr = output.stderr;
        stderr.truncate(MAX_CAPTURE_BYTES);

        let stdout = crate::util::truncate_chars(&String::from_utf8_lossy(&stdout), STDOUT_CHARS);
        let stderr = crate::util::truncate_chars(&String::from_utf8_lossy(&stderr), STDERR_CHARS);
        let success = output.status.success();

        let mut text = String::new();
        if !stdout.is_empty() {
            text.push_str(&stdout);
        }
        if !stderr.is_empty() {
            if !text.is_empty() {
                text.push('\n');
            }
            text.push_str("STDERR: ");
            text.push_str(&stderr);
        }
        if text.is_empty() {
            text = format!("(no output, exit code {:?})", output.status.code());
        }

        if success {
            Ok(ToolResult::ok(text))
        } else {
            Ok(ToolResult::err(text))
        }
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────
