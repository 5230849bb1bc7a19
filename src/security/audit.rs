//! Append-only JSONL audit trail, one file per calendar date under
//! `logs/audit-YYYY-MM-DD.jsonl`. Blocked entries are additionally echoed to
//! the error log.

use std::{
    fs::{self, File, OpenOptions},
    io::Write,
    path::PathBuf,
    sync::{
        Mutex,
        atomic::{AtomicBool, Ordering},
    },
};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    error::{CoreError, Result},
    util::truncate_chars,
};

const RESULT_PREVIEW_CHARS: usize = 500;
const INPUT_PREVIEW_CHARS: usize = 1000;

// ─── AuditEntry ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    pub timestamp: chrono::DateTime<Utc>,
    pub action: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_preview: Option<String>,
    pub blocked: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
}

impl AuditEntry {
    pub fn new(action: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            action: action.into(),
            tool_name: None,
            input: None,
            result_preview: None,
            blocked: false,
            reason: None,
            user: None,
            channel: None,
        }
    }

    pub fn tool(mut self, name: impl Into<String>) -> Self {
        self.tool_name = Some(name.into());
        self
    }

    pub fn input(mut self, input: &Value) -> Self {
        let raw = input.to_string();
        self.input = Some(if raw.chars().count() > INPUT_PREVIEW_CHARS {
            Value::String(truncate_chars(&raw, INPUT_PREVIEW_CHARS))
        } else {
            input.clone()
        });
        self
    }

    pub fn result(mut self, result: &str) -> Self {
        self.result_preview = Some(truncate_chars(result, RESULT_PREVIEW_CHARS));
        self
    }

    pub fn blocked(mut self, reason: impl Into<String>) -> Self {
        self.blocked = true;
        self.reason = Some(reason.into());
        self
    }

    pub fn source(mut self, channel: impl Into<String>, user: impl Into<String>) -> Self {
        self.channel = Some(channel.into());
        self.user = Some(user.into());
        self
    }
}

// ─── AuditLog ─────────────────────────────────────────────────────────────────

pub struct AuditLog {
    dir: PathBuf,
    enabled: AtomicBool,
    // (date-stamp, open handle) — rotated when the date rolls over.
    current: Mutex<Option<(String, File)>>,
}

impl AuditLog {
    /// Open the audit directory. An unopenable log is a fatal start-up error.
    pub fn open(workspace: &std::path::Path) -> Result<Self> {
        let dir = workspace.join("logs");
        fs::create_dir_all(&dir)
            .map_err(|e| CoreError::fatal(format!("cannot create audit log dir: {e}")))?;
        let log = Self {
            dir,
            enabled: AtomicBool::new(true),
            current: Mutex::new(None),
        };
        // Probe writability now so a permission problem aborts start-up
        // instead of silently dropping the trail later.
        log.with_file(|_| Ok(()))
            .map_err(|e| CoreError::fatal(format!("cannot open audit log: {e}")))?;
        Ok(log)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    /// Append one entry. Blocked entries are also logged at error level.
    pub fn record(&self, entry: AuditEntry) {
        if entry.blocked {
            log::error!(
                "audit: BLOCKED action={} tool={:?} reason={:?}",
                entry.action,
                entry.tool_name,
                entry.reason
            );
        }
        if !self.enabled.load(Ordering::SeqCst) {
            return;
        }
        let line = match serde_json::to_string(&entry) {
            Ok(l) => l,
            Err(e) => {
                log::warn!("audit: serialisation failed: {e}");
                return;
            }
        };
        if let Err(e) = self.with_file(|f| {
            writeln!(f, "{line}").map_err(|e| CoreError::transport(e.to_string()))?;
            f.flush().map_err(|e| CoreError::transport(e.to_string()))
        }) {
            log::warn!("audit: write failed: {e}");
        }
    }

    /// All entries recorded on `date` (format `YYYY-MM-DD`), oldest first.
    pub fn entries_for(&self, date: &str) -> Result<Vec<AuditEntry>> {
        if !date.chars().all(|c| c.is_ascii_digit() || c == '-') {
            return Err(CoreError::validation("invalid audit date"));
        }
        let path = self.dir.join(format!("audit-{date}.jsonl"));
        let raw = match fs::read_to_string(&path) {
            Ok(r) => r,
            Err(_) => return Ok(Vec::new()),
        };
        Ok(raw
            .lines()
            .filter_map(|l| serde_json::from_str(l).ok())
            .collect())
    }

    /// Dates (newest first) for which an audit file exists.
    pub fn dates(&self) -> Vec<String> {
        let mut dates: Vec<String> = fs::read_dir(&self.dir)
            .into_iter()
            .flatten()
            .flatten()
            .filter_map(|e| {
                let name = e.file_name().to_string_lossy().into_owned();
                name.strip_prefix("audit-")?
                    .strip_suffix(".jsonl")
                    .map(str::to_string)
            })
            .collect();
        dates.sort();
        dates.reverse();
        dates
    }

    /// Flush and drop the current handle (shutdown hook).
    pub fn close(&self) {
        if let Ok(mut guard) = self.current.lock() {
            if let Some((_, file)) = guard.as_mut() {
                let _ = file.flush();
            }
            *guard = None;
        }
    }

    fn with_file(&self, op: impl FnOnce(&mut File) -> Result<()>) -> Result<()> {
        let today = crate::util::today_stamp();
        let mut guard = self.current.lock().unwrap_or_else(|e| e.into_inner());
        let rotate = match guard.as_ref() {
            Some((date, _)) => date != &today,
            None => true,
        };
        if rotate {
            let path = self.dir.join(format!("audit-{today}.jsonl"));
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .map_err(|e| CoreError::transport(format!("open {}: {e}", path.display())))?;
            *guard = Some((today, file));
        }
        let (_, file) = guard.as_mut().ok_or_else(|| CoreError::fatal("audit handle missing"))?;
        op(file)
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn record_and_read_back() {
        let dir = TempDir::new().unwrap();
        let log = AuditLog::open(dir.path()).unwrap();

        log.record(
            AuditEntry::new("tool_call")
                .tool("run_shell")
                .input(&json!({"command": "ls"}))
                .result("ok")
                .source("telegram", "u1"),
        );

        let today = crate::util::today_stamp();
        let entries = log.entries_for(&today).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].tool_name.as_deref(), Some("run_shell"));
        assert!(!entries[0].blocked);
    }

    #[test]
    fn blocked_entry_carries_reason() {
        let dir = TempDir::new().unwrap();
        let log = AuditLog::open(dir.path()).unwrap();

        log.record(AuditEntry::new("tool_call").tool("run_shell").blocked("rm -rf /"));

        let entries = log.entries_for(&crate::util::today_stamp()).unwrap();
        assert!(entries[0].blocked);
        assert_eq!(entries[0].reason.as_deref(), Some("rm -rf /"));
    }

    #[test]
    fn result_preview_is_bounded() {
        let dir = TempDir::new().unwrap();
        let log = AuditLog::open(dir.path()).unwrap();
        let huge = "x".repeat(5000);
        log.record(AuditEntry::new("tool_call").result(&huge));

        let entries = log.entries_for(&crate::util::today_stamp()).unwrap();
        let preview = entries[0].result_preview.as_ref().unwrap();
        assert!(preview.chars().count() < 600);
    }

    #[test]
    fn disabled_log_records_nothing() {
        let dir = TempDir::new().unwrap();
        let log = AuditLog::open(dir.path()).unwrap();
        log.set_enabled(false);
        log.record(AuditEntry::new("tool_call"));
        // The probe from open() leaves an empty file; no entries inside.
        assert!(log.entries_for(&crate::util::today_stamp()).unwrap().is_empty());
    }

    #[test]
    fn dates_lists_existing_files() {
        let dir = TempDir::new().unwrap();
        let log = AuditLog::open(dir.path()).unwrap();
        log.record(AuditEntry::new("x"));
        let dates = log.dates();
        assert_eq!(dates, vec![crate::util::today_stamp()]);
    }

    #[test]
    fn malformed_date_rejected() {
        let dir = TempDir::new().unwrap();
        let log = AuditLog::open(dir.path()).unwrap();
        assert!(log.entries_for("../../../etc/passwd").is_err());
    }
}
