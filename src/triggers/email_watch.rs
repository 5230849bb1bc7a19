//! Inbox watch: periodic poll for unseen messages through the `InboxClient`
//! interface, with from/subject substring filters and a per-trigger
//! last-seen-UID watermark so a message is reported once.
//!
//! The concrete IMAP transport lives outside the core, like the chat-channel
//! clients; the polling, filtering, and dedup logic is all here.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::watch;

use crate::error::Result;

use super::{registry::TriggerRegistry, types::Trigger};

const DEFAULT_POLL_MINUTES: u64 = 5;

// ─── InboxClient ──────────────────────────────────────────────────────────────

/// One message header as reported by the mailbox.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct InboxMessage {
    pub uid: u32,
    pub from: String,
    pub subject: String,
    pub date: String,
}

/// Named interface over the mailbox transport (IMAP in production).
#[async_trait]
pub trait InboxClient: Send + Sync {
    /// Unseen messages with UID greater than `after_uid`, ascending.
    async fn fetch_unseen(&self, after_uid: u32) -> Result<Vec<InboxMessage>>;
}

// ─── Poll logic ───────────────────────────────────────────────────────────────

fn matches_filters(trigger: &Trigger, message: &InboxMessage) -> bool {
    if let Some(needle) = trigger.config_str("fromContains")
        && !message.from.to_lowercase().contains(&needle.to_lowercase())
    {
        return false;
    }
    if let Some(needle) = trigger.config_str("subjectContains")
        && !message.subject.to_lowercase().contains(&needle.to_lowercase())
    {
        return false;
    }
    true
}

/// One poll pass: fetch, filter, fire, advance the watermark. Returns the new
/// watermark.
pub async fn poll_once(
    registry: &TriggerRegistry,
    client: &dyn InboxClient,
    trigger: &Trigger,
    watermark: u32,
) -> Result<u32> {
    let messages = client.fetch_unseen(watermark).await?;
    let mut new_watermark = watermark;
    for message in messages {
        new_watermark = new_watermark.max(message.uid);
        if !matches_filters(trigger, &message) {
            continue;
        }
        let payload = json!({
            "uid": message.uid,
            "from": message.from,
            "subject": message.subject,
            "date": message.date,
        });
        registry.record_fire(&trigger.id, payload)?;
    }
    Ok(new_watermark)
}

/// Drive one email_watch trigger until shutdown.
pub fn spawn(
    registry: Arc<TriggerRegistry>,
    client: Arc<dyn InboxClient>,
    trigger: Trigger,
    mut shutdown: watch::Receiver<bool>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let poll_minutes = trigger.config_u64("pollMinutes").unwrap_or(DEFAULT_POLL_MINUTES).max(1);
        let interval = std::time::Duration::from_secs(poll_minutes * 60);
        // Resume the watermark persisted by a previous run.
        let mut watermark = trigger.config_u64("lastSeenUid").unwrap_or(0) as u32;

        loop {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {
                    match poll_once(&registry, client.as_ref(), &trigger, watermark).await {
                        Ok(next) => watermark = next,
                        Err(e) => log::warn!("email watch '{}': poll failed: {e}", trigger.name),
                    }
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
    use crate::triggers::types::{TriggerAction, TriggerType};
    use std::sync::Mutex;
    use tempfile::TempDir;

    struct FakeInbox {
        messages: Mutex<Vec<InboxMessage>>,
    }

    #[async_trait]
    impl InboxClient for FakeInbox {
        async fn fetch_unseen(&self, after_uid: u32) -> Result<Vec<InboxMessage>> {
            Ok(self
                .messages
                .lock()
                .unwrap()
                .iter()
                .filter(|m| m.uid > after_uid)
                .cloned()
                .collect())
        }
    }

    fn message(uid: u32, from: &str, subject: &str) -> InboxMessage {
        InboxMessage {
            uid,
            from: from.into(),
            subject: subject.into(),
            date: "2026-03-01T10:00:00Z".into(),
        }
    }

    fn trigger_with(config: serde_json::Value, registry: &TriggerRegistry) -> Trigger {
        registry
            .add(Trigger::new(TriggerType::EmailWatch, "mail", config, TriggerAction::default()))
            .unwrap()
    }

    #[tokio::test]
    async fn fires_per_message_and_advances_watermark() {
        let dir = TempDir::new().unwrap();
        let registry = TriggerRegistry::load(dir.path(), None).unwrap();
        let trigger = trigger_with(json!({}), &registry);
        let inbox = FakeInbox {
            messages: Mutex::new(vec![message(3, "a@x", "hi"), message(7, "b@x", "yo")]),
        };

        let wm = poll_once(&registry, &inbox, &trigger, 0).await.unwrap();
        assert_eq!(wm, 7);
        assert_eq!(registry.get(&trigger.id).unwrap().fire_count, 2);

        // Re-polling from the watermark reports nothing new.
        let wm2 = poll_once(&registry, &inbox, &trigger, wm).await.unwrap();
        assert_eq!(wm2, 7);
        assert_eq!(registry.get(&trigger.id).unwrap().fire_count, 2);
    }

    #[tokio::test]
    async fn from_filter_applies() {
        let dir = TempDir::new().unwrap();
        let registry = TriggerRegistry::load(dir.path(), None).unwrap();
        let trigger = trigger_with(json!({"fromContains": "boss@"}), &registry);
        let inbox = FakeInbox {
            messages: Mutex::new(vec![
                message(1, "boss@corp.example", "status?"),
                message(2, "spam@junk.example", "win big"),
            ]),
        };

        let wm = poll_once(&registry, &inbox, &trigger, 0).await.unwrap();
        // Watermark advances past filtered-out messages too.
        assert_eq!(wm, 2);
        assert_eq!(registry.get(&trigger.id).unwrap().fire_count, 1);
    }

    #[tokio::test]
    async fn subject_filter_is_case_insensitive() {
        let dir = TempDir::new().unwrap();
        let registry = TriggerRegistry::load(dir.path(), None).unwrap();
        let trigger = trigger_with(json!({"subjectContains": "invoice"}), &registry);
        let inbox = FakeInbox {
            messages: Mutex::new(vec![
                message(1, "a@x", "INVOICE #42"),
                message(2, "a@x", "lunch?"),
            ]),
        };

        poll_once(&registry, &inbox, &trigger, 0).await.unwrap();
        assert_eq!(registry.get(&trigger.id).unwrap().fire_count, 1);
    }
}
