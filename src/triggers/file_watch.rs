//! File-watch triggers: a recursive `notify` watcher with an optional
//! filename regex filter.

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use notify::{RecursiveMode, Watcher};
use regex::Regex;
use serde_json::json;
use tokio::sync::watch;

use crate::error::{CoreError, Result};

use super::{registry::TriggerRegistry, types::Trigger};

fn event_kind_label(kind: &notify::EventKind) -> &'static str {
    use notify::EventKind;
    match kind {
        EventKind::Create(_) => "create",
        EventKind::Modify(_) => "modify",
        EventKind::Remove(_) => "remove",
        EventKind::Access(_) => "access",
        _ => "other",
    }
}

/// Start watching one file_watch trigger. Returns the join handle of the
/// forwarding task (the watcher itself lives inside it).
pub fn spawn(
    registry: Arc<TriggerRegistry>,
    trigger: Trigger,
    workspace: &Path,
    mut shutdown: watch::Receiver<bool>,
) -> Result<tokio::task::JoinHandle<()>> {
    let raw = trigger
        .config_str("path")
        .ok_or_else(|| CoreError::validation("file_watch trigger needs 'path'"))?;
    let target = if Path::new(raw).is_absolute() {
        PathBuf::from(raw)
    } else {
        workspace.join(raw)
    };
    let pattern = match trigger.config_str("pattern") {
        Some(p) => Some(
            Regex::new(p).map_err(|e| CoreError::validation(format!("invalid pattern: {e}")))?,
        ),
        None => None,
    };

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
        let _ = tx.send(res);
    })
    .map_err(|e| CoreError::transport(format!("failed to create watcher: {e}")))?;
    watcher
        .watch(&target, RecursiveMode::Recursive)
        .map_err(|e| CoreError::validation(format!("cannot watch '{}': {e}", target.display())))?;

    Ok(tokio::spawn(async move {
        // Keep the watcher alive for the lifetime of this task.
        let _watcher = watcher;
        loop {
            tokio::select! {
                event = rx.recv() => {
                    let Some(event) = event else { return };
                    let event = match event {
                        Ok(e) => e,
                        Err(e) => {
                            log::warn!("file watch '{}': {e}", trigger.name);
                            continue;
                        }
                    };
                    let kind = event_kind_label(&event.kind);
                    if kind == "access" || kind == "other" {
                        continue;
                    }
                    for path in &event.paths {
                        let filename = path
                            .file_name()
                            .map(|f| f.to_string_lossy().into_owned())
                            .unwrap_or_default();
                        if let Some(re) = &pattern
                            && !re.is_match(&filename)
                        {
                            continue;
                        }
                        let payload = json!({
                            "eventType": kind,
                            "filename": filename,
                            "path": path.display().to_string(),
                        });
                        if let Err(e) = registry.record_fire(&trigger.id, payload) {
                            log::warn!("file watch '{}': fire failed: {e}", trigger.name);
                        }
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        return;
                    }
                }
            }
        }
    }))
}
