//! Channel abstraction: the transports that carry user messages in and
//! replies out. Concrete clients (Telegram, Discord) live outside the core
//! and implement [`Channel`]; the manager routes outbound replies to the
//! right one.

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

// ─── ChannelMessage ───────────────────────────────────────────────────────────

/// A message received from a channel peer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelMessage {
    /// Which channel this message came from (e.g. `"telegram"`).
    pub channel: String,
    /// Peer identifier (user id, chat id).
    pub sender: String,
    pub content: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl ChannelMessage {
    pub fn new(
        channel: impl Into<String>,
        sender: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            channel: channel.into(),
            sender: sender.into(),
            content: content.into(),
            timestamp: chrono::Utc::now(),
        }
    }
}

// ─── Channel trait ────────────────────────────────────────────────────────────

/// Transport abstraction for one chat backend.
#[async_trait]
pub trait Channel: Send + Sync {
    /// Stable channel identifier (e.g. `"telegram"`, `"discord"`).
    fn name(&self) -> &str;

    /// Send a message to `recipient` on this channel.
    async fn send(&self, recipient: &str, message: &str) -> Result<(), String>;

    /// Start listening for inbound messages, forwarding them on `tx`. Runs
    /// until the transport disconnects or `tx` is dropped.
    async fn listen(&self, tx: mpsc::Sender<ChannelMessage>) -> Result<(), String>;

    /// Lightweight liveness check.
    async fn health_check(&self) -> bool;
}

// ─── ChannelManager ───────────────────────────────────────────────────────────

/// Outbound routing table over the registered channels.
pub struct ChannelManager {
    channels: HashMap<String, Arc<dyn Channel>>,
}

impl ChannelManager {
    pub fn new() -> Self {
        Self {
            channels: HashMap::new(),
        }
    }

    pub fn register(&mut self, channel: Arc<dyn Channel>) {
        self.channels.insert(channel.name().to_string(), channel);
    }

    pub fn names(&self) -> Vec<&str> {
        self.channels.keys().map(String::as_str).collect()
    }

    /// Deliver a reply; unknown channels are logged and dropped (a trigger
    /// may reference a channel that is not connected in this run).
    pub async fn deliver(&self, channel: &str, recipient: &str, message: &str) {
        match self.channels.get(channel) {
            Some(c) => {
                if let Err(e) = c.send(recipient, message).await {
                    log::warn!("channel '{channel}': delivery to {recipient} failed: {e}");
                }
            }
            None => log::debug!("channel '{channel}' not connected; reply dropped"),
        }
    }
}

impl Default for ChannelManager {
    fn default() -> Self {
        Self::new()
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct RecordingChannel {
        sent: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl Channel for RecordingChannel {
        fn name(&self) -> &str {
            "recording"
        }
        async fn send(&self, recipient: &str, message: &str) -> Result<(), String> {
            self.sent
                .lock()
                .unwrap()
                .push((recipient.to_string(), message.to_string()));
            Ok(())
        }
        async fn listen(&self, _tx: mpsc::Sender<ChannelMessage>) -> Result<(), String> {
            Ok(())
        }
        async fn health_check(&self) -> bool {
            true
        }
    }

    #[tokio::test]
    async fn deliver_routes_to_registered_channel() {
        let channel = Arc::new(RecordingChannel { sent: Mutex::new(vec![]) });
        let mut manager = ChannelManager::new();
        manager.register(channel.clone());

        manager.deliver("recording", "alice", "hi").await;
        assert_eq!(channel.sent.lock().unwrap()[0], ("alice".to_string(), "hi".to_string()));
    }

    #[tokio::test]
    async fn deliver_to_unknown_channel_is_silent() {
        let manager = ChannelManager::new();
        // Must not panic.
        manager.deliver("ghost", "nobody", "hello?").await;
    }
}
