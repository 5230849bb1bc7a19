//! File tools: `read_file`, `write_file`, `list_directory`. Every path goes
//! through the jail; writes refuse executable extensions and create parent
//! directories.

use std::{fs, path::Path, path::PathBuf};

use async_trait::async_trait;
use serde_json::{Value, json};

use crate::{
    config::ToolCategory,
    error::{CoreError, Result},
    security::{RiskLevel, safe_path},
};

use super::traits::{Tool, ToolResult};

/// Extensions `write_file` refuses to create.
const EXECUTABLE_EXTENSIONS: &[&str] = &[
    "exe", "bat", "cmd", "com", "msi", "scr", "ps1", "vbs", "wsf",
];

fn required_str<'a>(args: &'a Value, key: &str) -> Result<&'a str> {
    args.get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| CoreError::validation(format!("missing required argument '{key}'")))
}

// ─── ReadFileTool ─────────────────────────────────────────────────────────────

pub struct ReadFileTool {
    workspace: PathBuf,
}

impl ReadFileTool {
    pub fn new(workspace: PathBuf) -> Self {
        Self { workspace }
    }
}

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Read the contents of a file inside the workspace."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "Path relative to the workspace." },
                "max_lines": {
                    "type": "integer",
                    "description": "Maximum number of lines to return (default: all).",
                    "minimum": 1
                }
            },
            "required": ["path"]
        })
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Filesystem
    }

    fn risk(&self) -> RiskLevel {
        RiskLevel::Low
    }

    async fn execute(&self, args: Value) -> Result<ToolResult> {
        let path = safe_path(&self.workspace, required_str(&args, "path")?)?;
        let max_lines = args.get("max_lines").and_then(Value::as_u64).map(|n| n as usize);

        let contents = fs::read_to_string(&path)
            .map_err(|e| CoreError::validation(format!("failed to read '{}': {e}", path.display())))?;

        let output = match max_lines {
            Some(n) => contents.lines().take(n).collect::<Vec<_>>().join("\n"),
            None => contents,
        };
        Ok(ToolResult::ok(output))
    }
}

// ─── WriteFileTool ────────────────────────────────────────────────────────────

pub struct WriteFileTool {
    workspace: PathBuf,
}

impl WriteFileTool {
    pub fn new(workspace: PathBuf) -> Self {
        Self { workspace }
    }
}

#[async_trait]
impl Tool for WriteFileTool {
    fn name(&self) -> &str {
        "write_file"
    }

    fn description(&self) -> &str {
        "Write content to a file inside the workspace, creating parent \
         directories as needed. Set append to add to the end instead of \
         overwriting."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path":    { "type": "string", "description": "Path relative to the workspace." },
                "content": { "type": "string", "description": "Content to write." },
                "append":  { "type": "boolean", "description": "Append instead of overwrite (default: false)." }
            },
            "required": ["path", "content"]
        })
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Filesystem
    }

    async fn execute(&self, args: Value) -> Result<ToolResult> {
        let raw = required_str(&args, "path")?;
        let content = required_str(&args, "content")?;
        let append = args.get("append").and_then(Value::as_bool).unwrap_or(false);

        let path = safe_path(&self.workspace, raw)?;
        if let Some(ext) = path.extension().and_then(|e| e.to_str())
            && EXECUTABLE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str())
        {
            return Err(CoreError::security(format!(
                "writing executable files ('.{ext}') is not permitted"
            )));
        }

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| CoreError::transport(format!("failed to create parent dirs: {e}")))?;
        }

        let bytes = content.len();
        if append {
            use std::io::Write;
            let mut file = fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .map_err(|e| CoreError::transport(format!("failed to open '{}': {e}", path.display())))?;
            file.write_all(content.as_bytes())
                .map_err(|e| CoreError::transport(format!("failed to append: {e}")))?;
        } else {
            fs::write(&path, content)
                .map_err(|e| CoreError::transport(format!("failed to write '{}': {e}", path.display())))?;
        }

        Ok(ToolResult::ok(format!(
            "{} {} bytes to '{}'",
            if append { "appended" } else { "wrote" },
            bytes,
            raw
        )))
    }
}

// ─── ListDirectoryTool ────────────────────────────────────────────────────────

pub struct ListDirectoryTool {
    workspace: PathBuf,
}

impl ListDirectoryTool {
    pub fn new(workspace: PathBuf) -> Self {
        Self { workspace }
    }
}

#[async_trait]
impl Tool for ListDirectoryTool {
    fn name(&self) -> &str {
        "list_directory"
    }

    fn description(&self) -> &str {
        "List the contents of a workspace directory, optionally recursively."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "Path relative to the workspace (default: the workspace root)." },
                "recursive": { "type": "boolean", "description": "List all files recursively (default: false)." }
            }
        })
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Filesystem
    }

    fn risk(&self) -> RiskLevel {
        RiskLevel::Low
    }

    async fn execute(&self, args: Value) -> Result<ToolResult> {
        let raw = args.get("path").and_then(Value::as_str).unwrap_or(".");
        let recursive = args.get("recursive").and_then(Value::as_bool).unwrap_or(false);

        let path = safe_path(&self.workspace, raw)?;
        let mut entries = Vec::new();
        collect_entries(&path, &self.workspace, recursive, &mut entries)
            .map_err(|e| CoreError::validation(format!("failed to list '{raw}': {e}")))?;
        entries.sort();
        Ok(ToolResult::ok(entries.join("\n")))
    }
}

fn collect_entries(
    dir: &Path,
    root: &Path,
    recursive: bool,
    out: &mut Vec<String>,
) -> std::io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let display = path
            .strip_prefix(root)
            .unwrap_or(&path)
            .display()
            .to_string();
        if path.is_dir() {
            out.push(format!("{display}/"));
            if recursive {
                collect_entries(&path, root, true, out)?;
            }
        } else {
            out.push(display);
        }
    }
    Ok(())
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn read_existing_file() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("hello.txt"), "hello world").unwrap();

        let tool = ReadFileTool::new(dir.path().to_path_buf());
        let r = tool.execute(json!({"path": "hello.txt"})).await.unwrap();
        assert!(r.success);
        assert_eq!(r.output, "hello world");
    }

    #[tokio::test]
    async fn read_respects_max_lines() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("lines.txt"), "a\nb\nc\nd\ne").unwrap();

        let tool = ReadFileTool::new(dir.path().to_path_buf());
        let r = tool
            .execute(json!({"path": "lines.txt", "max_lines": 3}))
            .await
            .unwrap();
        assert_eq!(r.output.lines().count(), 3);
    }

    #[tokio::test]
    async fn read_outside_workspace_is_security_error() {
        let dir = TempDir::new().unwrap();
        let tool = ReadFileTool::new(dir.path().to_path_buf());
        let err = tool.execute(json!({"path": "../../etc/passwd"})).await.unwrap_err();
        assert!(err.is_security());
    }

    #[tokio::test]
    async fn write_creates_parents() {
        let dir = TempDir::new().unwrap();
        let tool = WriteFileTool::new(dir.path().to_path_buf());
        let r = tool
            .execute(json!({"path": "nested/dir/out.txt", "content": "data"}))
            .await
            .unwrap();
        assert!(r.success);
        assert_eq!(fs::read_to_string(dir.path().join("nested/dir/out.txt")).unwrap(), "data");
    }

    #[tokio::test]
    async fn write_append_mode() {
        let dir = TempDir::new().unwrap();
        let tool = WriteFileTool::new(dir.path().to_path_buf());
        tool.execute(json!({"path": "log.txt", "content": "one\n"})).await.unwrap();
        tool.execute(json!({"path": "log.txt", "content": "two\n", "append": true}))
            .await
            .unwrap();
        assert_eq!(fs::read_to_string(dir.path().join("log.txt")).unwrap(), "one\ntwo\n");
    }

    #[tokio::test]
    async fn write_rejects_executable_extensions() {
        let dir = TempDir::new().unwrap();
        let tool = WriteFileTool::new(dir.path().to_path_buf());
        for name in ["evil.exe", "evil.bat", "evil.ps1", "evil.VBS"] {
            let err = tool
                .execute(json!({"path": name, "content": "x"}))
                .await
                .unwrap_err();
            assert!(err.is_security(), "{name} should be refused");
        }
    }

    #[tokio::test]
    async fn list_directory_relative_paths() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.txt"), "").unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("sub/nested.txt"), "").unwrap();

        let tool = ListDirectoryTool::new(dir.path().to_path_buf());
        let r = tool.execute(json!({"recursive": true})).await.unwrap();
        assert!(r.output.contains("a.txt"));
        assert!(r.output.contains("sub/"));
        assert!(r.output.contains("sub/nested.txt"));
    }

    #[tokio::test]
    async fn list_non_recursive_stays_shallow() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("sub/deep.txt"), "").unwrap();

        let tool = ListDirectoryTool::new(dir.path().to_path_buf());
        let r = tool.execute(json!({})).await.unwrap();
        assert!(r.output.contains("sub/"));
        assert!(!r.output.contains("deep.txt"));
    }
}
