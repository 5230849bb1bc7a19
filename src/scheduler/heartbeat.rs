//! Heartbeat: the periodic self-check driven by the `HEARTBEAT.md` checklist.
//!
//! Every `interval_minutes` the runner re-reads the checklist; if any items
//! are unchecked it publishes a [`AppEvent::HeartbeatDue`] carrying them, and
//! the session loop consumes it in heartbeat mode.

use std::{path::PathBuf, sync::Arc};

use tokio::sync::watch;

use crate::event_bus::{AppEvent, EventBus};

/// Reply sentinel that suppresses outbound heartbeat messages.
pub const HEARTBEAT_OK: &str = "HEARTBEAT_OK";

/// Parse *unchecked* checklist items (`- [ ] item`) from `HEARTBEAT.md`.
///
/// Checked items (`- [x]`) are considered handled and skipped.
pub fn parse_unchecked_items(content: &str) -> Vec<String> {
    content
        .lines()
        .filter_map(|line| {
            line.trim()
                .strip_prefix("- [ ]")
                .map(|rest| rest.trim().to_owned())
        })
        .filter(|s| !s.is_empty())
        .collect()
}

/// Path of the checklist inside the workspace.
pub fn heartbeat_path(workspace: &std::path::Path) -> PathBuf {
    workspace.join("HEARTBEAT.md")
}

/// Periodic runner. Reads the checklist fresh on every tick so edits made by
/// the `edit_heartbeat` tool apply without a restart.
pub fn spawn(
    bus: Arc<dyn EventBus>,
    workspace: PathBuf,
    interval_minutes: u64,
    mut shutdown: watch::Receiver<bool>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let interval = std::time::Duration::from_secs(interval_minutes.max(1) * 60);
        loop {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {
                    let path = heartbeat_path(&workspace);
                    let Ok(content) = std::fs::read_to_string(&path) else {
                        log::debug!("heartbeat: no checklist at {}", path.display());
                        continue;
                    };
                    let items = parse_unchecked_items(&content);
                    if items.is_empty() {
                        continue;
                    }
                    let _ = bus.publish(AppEvent::HeartbeatDue { items });
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        return;
                    }
                }
            }
        }
    })
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"# Heartbeat Checks

Run these periodically:

- [ ] Verify disk space is below 90%
- [ ] Check API key validity
- [x] Confirm log rotation is active
- [X] Validate config files exist

## Notes

Handled automatically by the agent.
"#;

    #[test]
    fn unchecked_items_extracted() {
        let items = parse_unchecked_items(SAMPLE);
        assert_eq!(
            items,
            vec![
                "Verify disk space is below 90%".to_string(),
                "Check API key validity".to_string(),
            ]
        );
    }

    #[test]
    fn checked_items_skipped() {
        let items = parse_unchecked_items(SAMPLE);
        assert!(!items.iter().any(|i| i.contains("log rotation")));
        assert!(!items.iter().any(|i| i.contains("config files")));
    }

    #[test]
    fn prose_lines_ignored() {
        let items = parse_unchecked_items(SAMPLE);
        assert!(!items.iter().any(|i| i.contains("Notes")));
        assert!(!items.iter().any(|i| i.contains("periodically")));
    }

    #[test]
    fn empty_content_returns_empty() {
        assert!(parse_unchecked_items("").is_empty());
        assert!(parse_unchecked_items("# Just a header\n\ntext").is_empty());
    }

    #[test]
    fn blank_item_text_dropped() {
        assert!(parse_unchecked_items("- [ ]   \n").is_empty());
    }
}
