//! System-control tools, gated by the `system_control` permission. The
//! concrete OS invocation is a thin platform shim; inputs are sanitized
//! before they reach it.

use async_trait::async_trait;
use serde_json::{Value, json};

use crate::{
    config::ToolCategory,
    error::{CoreError, Result},
    security::RiskLevel,
};

use super::traits::{Tool, ToolResult};

const MAX_INPUT_CHARS: usize = 10_000;

/// Strip control characters and cap length before anything reaches the OS.
fn sanitize(input: &str) -> String {
    input
        .chars()
        .filter(|c| !c.is_control() || *c == '\n' || *c == '\t')
        .take(MAX_INPUT_CHARS)
        .collect()
}

// ─── system_info ──────────────────────────────────────────────────────────────

pub struct SystemInfoTool;

#[async_trait]
impl Tool for SystemInfoTool {
    fn name(&self) -> &str {
        "system_info"
    }

    fn description(&self) -> &str {
        "Report OS, architecture, and agent process details."
    }

    fn parameters_schema(&self) -> Value {
        json!({ "type": "object", "properties": {} })
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::SystemControl
    }

    fn risk(&self) -> RiskLevel {
        RiskLevel::Low
    }

    async fn execute(&self, _args: Value) -> Result<ToolResult> {
        Ok(ToolResult::ok(format!(
            "os: {} ({})\nversion: talon {}\npid: {}",
            std::env::consts::OS,
            std::env::consts::ARCH,
            env!("CARGO_PKG_VERSION"),
            std::process::id(),
        )))
    }
}

// ─── clipboard_write ──────────────────────────────────────────────────────────

pub struct ClipboardWriteTool;

#[async_trait]
impl Tool for ClipboardWriteTool {
    fn name(&self) -> &str {
        "clipboard_write"
    }

    fn description(&self) -> &str {
        "Copy text to the system clipboard."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "text": { "type": "string" }
            },
            "required": ["text"]
        })
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::SystemControl
    }

    async fn execute(&self, args: Value) -> Result<ToolResult> {
        let text = sanitize(
            args.get("text")
                .and_then(Value::as_str)
                .ok_or_else(|| CoreError::validation("missing required argument 'text'"))?,
        );

        let mut command = clipboard_command()?;
        let mut child = command
            .stdin(std::process::Stdio::piped())
            .spawn()
            .map_err(|e| CoreError::transport(format!("clipboard helper failed to start: {e}")))?;
        if let Some(stdin) = child.stdin.as_mut() {
            use tokio::io::AsyncWriteExt;
            stdin
                .write_all(text.as_bytes())
                .await
                .map_err(|e| CoreError::transport(format!("clipboard write failed: {e}")))?;
        }
        drop(child.stdin.take());
        let status = child
            .wait()
            .await
            .map_err(|e| CoreError::transport(e.to_string()))?;
        if status.success() {
            Ok(ToolResult::ok(format!("copied {} characters", text.chars().count())))
        } else {
            Ok(ToolResult::err("clipboard helper exited with an error"))
        }
    }
}

fn clipboard_command() -> Result<tokio::process::Command> {
    #[cfg(target_os = "macos")]
    {
        Ok(tokio::process::Command::new("pbcopy"))
    }
    #[cfg(target_os = "windows")]
    {
        Ok(tokio::process::Command::new("clip"))
    }
    #[cfg(not(any(target_os = "macos", target_os = "windows")))]
    {
        let mut cmd = tokio::process::Command::new("xclip");
        cmd.args(["-selection", "clipboard"]);
        Ok(cmd)
    }
}

// ─── open_application ─────────────────────────────────────────────────────────

pub struct OpenApplicationTool;

#[async_trait]
impl Tool for OpenApplicationTool {
    fn name(&self) -> &str {
        "open_application"
    }

    fn description(&self) -> &str {
        "Launch an application by name."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "name": { "type": "string", "description": "Application name (letters, digits, dash, underscore, dot, space)." }
            },
            "required": ["name"]
        })
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::SystemControl
    }

    fn risk(&self) -> RiskLevel {
        RiskLevel::High
    }

    async fn execute(&self, args: Value) -> Result<ToolResult> {
        let name = args
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| CoreError::validation("missing required argument 'name'"))?
            .trim();
        if name.is_empty() || name.len() > 128 {
            return Err(CoreError::validation("application name length out of range"));
        }
        if !name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | ' '))
        {
            return Err(CoreError::security(
                "application name contains disallowed characters",
            ));
        }

        let mut command = open_command(name);
        command
            .spawn()
            .map_err(|e| CoreError::transport(format!("failed to launch '{name}': {e}")))?;
        Ok(ToolResult::ok(format!("launched '{name}'")))
    }
}

fn open_command(name: &str) -> tokio::process::Command {
    #[cfg(target_os = "macos")]
    {
        let mut cmd = tokio::process::Command::new("open");
        cmd.args(["-a", name]);
        cmd
    }
    #[cfg(target_os = "windows")]
    {
        let mut cmd = tokio::process::Command::new("cmd");
        cmd.args(["/C", "start", "", name]);
        cmd
    }
    #[cfg(not(any(target_os = "macos", target_os = "windows")))]
    {
        tokio::process::Command::new(name)
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn system_info_reports_os() {
        let r = SystemInfoTool.execute(json!({})).await.unwrap();
        assert!(r.output.contains(std::env::consts::OS));
    }

    #[test]
    fn sanitize_strips_control_chars() {
        let dirty = "hello\u{0007}\u{001b}[31mworld\nnewline ok";
        let clean = sanitize(dirty);
        assert!(!clean.contains('\u{0007}'));
        assert!(!clean.contains('\u{001b}'));
        assert!(clean.contains("\nnewline ok"));
    }

    #[test]
    fn sanitize_caps_length() {
        let huge = "x".repeat(50_000);
        assert_eq!(sanitize(&huge).chars().count(), MAX_INPUT_CHARS);
    }

    #[tokio::test]
    async fn open_application_rejects_shell_metacharacters() {
        for bad in ["firefox; rm -rf /", "app && evil", "a|b", "x$(y)"] {
            let err = OpenApplicationTool
                .execute(json!({"name": bad}))
                .await
                .unwrap_err();
            assert!(err.is_security(), "'{bad}' must be refused");
        }
    }

    #[tokio::test]
    async fn open_application_rejects_empty_and_huge_names() {
        assert!(OpenApplicationTool.execute(json!({"name": ""})).await.is_err());
        let huge = "a".repeat(200);
        assert!(OpenApplicationTool.execute(json!({"name": huge})).await.is_err());
    }
}
