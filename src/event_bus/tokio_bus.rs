use tokio::sync::broadcast;

use super::traits::{AppEvent, EventBus};

const DEFAULT_CAPACITY: usize = 1024;

/// [`EventBus`] implementation backed by a `tokio::sync::broadcast` channel.
pub struct TokioBroadcastBus {
    sender: broadcast::Sender<AppEvent>,
}

impl TokioBroadcastBus {
    /// Create with the default channel capacity (1024).
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Create with an explicit channel capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }
}

impl Default for TokioBroadcastBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus for TokioBroadcastBus {
    fn publish(&self, event: AppEvent) -> Result<(), String> {
        // `send` only fails when there are no receivers — that is fine.
        let _ = self.sender.send(event);
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<AppEvent> {
        self.sender.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_then_receive() {
        let bus = TokioBroadcastBus::new();
        let mut rx = bus.subscribe();

        bus.publish(AppEvent::SystemError {
            message: "disk full".to_string(),
        })
        .unwrap();

        match rx.recv().await.unwrap() {
            AppEvent::SystemError { message } => assert_eq!(message, "disk full"),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn multiple_subscribers_all_receive() {
        let bus = TokioBroadcastBus::new();
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        bus.publish(AppEvent::HeartbeatDue { items: vec![] }).unwrap();

        assert!(matches!(rx1.recv().await.unwrap(), AppEvent::HeartbeatDue { .. }));
        assert!(matches!(rx2.recv().await.unwrap(), AppEvent::HeartbeatDue { .. }));
    }

    #[tokio::test]
    async fn publish_without_subscribers_is_ok() {
        let bus = TokioBroadcastBus::new();
        assert!(
            bus.publish(AppEvent::MessageReceived {
                channel: "telegram".into(),
                user: "u1".into(),
                content: "hi".into(),
            })
            .is_ok()
        );
    }
}
