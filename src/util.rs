//! Small filesystem and text helpers shared across the persistence layers.

use std::{fs, io::Write, path::Path};

use crate::error::{CoreError, Result};

/// Write `contents` to `path` via a temp file + rename so a crash mid-write
/// never leaves a torn document behind.
pub fn atomic_write(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| CoreError::fatal(format!("no parent directory for {}", path.display())))?;
    fs::create_dir_all(parent)
        .map_err(|e| CoreError::transport(format!("create {}: {e}", parent.display())))?;

    let tmp = path.with_extension("tmp");
    {
        let mut f = fs::File::create(&tmp)
            .map_err(|e| CoreError::transport(format!("create {}: {e}", tmp.display())))?;
        f.write_all(contents.as_bytes())
            .map_err(|e| CoreError::transport(format!("write {}: {e}", tmp.display())))?;
        f.sync_all().ok();
    }
    fs::rename(&tmp, path)
        .map_err(|e| CoreError::transport(format!("rename into {}: {e}", path.display())))
}

/// Truncate to at most `max` characters on a char boundary, appending an
/// ellipsis marker when anything was dropped.
pub fn truncate_chars(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let cut: String = s.chars().take(max).collect();
    format!("{cut}… [truncated]")
}

/// Current date as `YYYY-MM-DD` (UTC).
pub fn today_stamp() -> String {
    chrono::Utc::now().format("%Y-%m-%d").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn atomic_write_creates_parents_and_file() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("nested/deep/file.json");
        atomic_write(&target, "{\"ok\":true}").unwrap();
        assert_eq!(fs::read_to_string(&target).unwrap(), "{\"ok\":true}");
    }

    #[test]
    fn atomic_write_replaces_existing() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("f.txt");
        atomic_write(&target, "one").unwrap();
        atomic_write(&target, "two").unwrap();
        assert_eq!(fs::read_to_string(&target).unwrap(), "two");
    }

    #[test]
    fn truncate_no_op_under_limit() {
        assert_eq!(truncate_chars("short", 10), "short");
    }

    #[test]
    fn truncate_appends_marker() {
        let out = truncate_chars("abcdefghij", 4);
        assert!(out.starts_with("abcd"));
        assert!(out.contains("truncated"));
    }

    #[test]
    fn truncate_respects_multibyte_boundaries() {
        let out = truncate_chars("héllo wörld", 3);
        assert!(out.starts_with("hél"));
    }
}
