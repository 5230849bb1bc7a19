//! Filesystem path jail.
//!
//! Every path that reaches a file tool goes through [`safe_path`]. The
//! normalized absolute result must be the workspace root or lie strictly
//! beneath it; `..` components are resolved lexically so the check also holds
//! for files that do not exist yet.

use std::path::{Component, Path, PathBuf};

use crate::error::{CoreError, Result};

/// Resolve `raw` relative to `workspace` and reject anything that escapes it.
pub fn safe_path(workspace: &Path, raw: &str) -> Result<PathBuf> {
    if raw.contains('\0') {
        return Err(CoreError::security("path contains a NUL byte"));
    }
    if raw.is_empty() {
        return Err(CoreError::validation("empty path"));
    }

    let requested = Path::new(raw);
    let joined = if requested.is_absolute() {
        requested.to_path_buf()
    } else {
        workspace.join(requested)
    };

    let normalized = normalize(&joined);
    let root = normalize(workspace);

    if normalized.starts_with(&root) {
        Ok(normalized)
    } else {
        Err(CoreError::security(format!(
            "path '{raw}' escapes the workspace root"
        )))
    }
}

/// Lexical normalization: resolves `.` and `..` without touching the
/// filesystem, so nonexistent targets are handled uniformly.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for comp in path.components() {
        match comp {
            Component::Prefix(p) => out.push(p.as_os_str()),
            Component::RootDir => out.push(comp.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            Component::Normal(c) => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ws() -> PathBuf {
        PathBuf::from("/home/agent/workspace")
    }

    #[test]
    fn relative_path_lands_inside_workspace() {
        let p = safe_path(&ws(), "notes/todo.md").unwrap();
        assert_eq!(p, PathBuf::from("/home/agent/workspace/notes/todo.md"));
    }

    #[test]
    fn workspace_root_itself_is_allowed() {
        let p = safe_path(&ws(), ".").unwrap();
        assert_eq!(p, ws());
    }

    #[test]
    fn absolute_path_inside_workspace_is_allowed() {
        let p = safe_path(&ws(), "/home/agent/workspace/a.txt").unwrap();
        assert_eq!(p, PathBuf::from("/home/agent/workspace/a.txt"));
    }

    #[test]
    fn dotdot_escape_is_rejected() {
        assert!(safe_path(&ws(), "../secrets").is_err());
        assert!(safe_path(&ws(), "notes/../../other").is_err());
    }

    #[test]
    fn deep_dotdot_within_workspace_is_allowed() {
        let p = safe_path(&ws(), "a/b/../c.txt").unwrap();
        assert_eq!(p, PathBuf::from("/home/agent/workspace/a/c.txt"));
    }

    #[test]
    fn absolute_path_outside_workspace_is_rejected() {
        assert!(safe_path(&ws(), "/etc/passwd").is_err());
    }

    #[test]
    fn sibling_prefix_directory_is_rejected() {
        // "/home/agent/workspace2" shares a string prefix but is a sibling.
        assert!(safe_path(&ws(), "/home/agent/workspace2/file").is_err());
    }

    #[test]
    fn nul_byte_is_rejected() {
        let err = safe_path(&ws(), "file\0.txt").unwrap_err();
        assert!(err.is_security());
    }

    #[test]
    fn empty_path_is_invalid() {
        assert!(safe_path(&ws(), "").is_err());
    }
}
