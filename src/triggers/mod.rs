//! The event plane: triggers that wake the agent (file watch, webhook, cron,
//! calendar, inbox), their registry, and the per-trigger watcher tasks.

pub mod calendar;
pub mod cron_watch;
pub mod email_watch;
pub mod file_watch;
pub mod registry;
pub mod types;
pub mod webhook;

pub use email_watch::{InboxClient, InboxMessage};
pub use registry::TriggerRegistry;
pub use types::{ActionKind, Trigger, TriggerAction, TriggerType};
pub use webhook::DEFAULT_WEBHOOK_PORT;

use std::sync::Arc;

use tokio::sync::watch;

/// Spawn watcher tasks for every enabled trigger plus the webhook listener.
/// Returns the join handles (the runtime aborts them on shutdown).
pub fn start_all(
    registry: Arc<TriggerRegistry>,
    workspace: &std::path::Path,
    webhook_port: u16,
    inbox: Option<Arc<dyn InboxClient>>,
    shutdown: watch::Receiver<bool>,
) -> Vec<tokio::task::JoinHandle<()>> {
    let mut handles = Vec::new();

    for trigger in registry.all().into_iter().filter(|t| t.enabled) {
        match trigger.trigger_type {
            TriggerType::Cron => {
                handles.push(cron_watch::spawn(registry.clone(), trigger, shutdown.clone()));
            }
            TriggerType::FileWatch => {
                match file_watch::spawn(registry.clone(), trigger.clone(), workspace, shutdown.clone()) {
                    Ok(handle) => handles.push(handle),
                    Err(e) => log::warn!("file watch '{}' not started: {e}", trigger.name),
                }
            }
            TriggerType::Calendar => {
                handles.push(calendar::spawn(registry.clone(), trigger, shutdown.clone()));
            }
            TriggerType::EmailWatch => {
                if let Some(client) = &inbox {
                    handles.push(email_watch::spawn(
                        registry.clone(),
                        client.clone(),
                        trigger,
                        shutdown.clone(),
                    ));
                } else {
                    log::warn!("email watch '{}' skipped: no inbox client configured", trigger.name);
                }
            }
            // Webhook triggers are all served by the shared listener below.
            TriggerType::Webhook => {}
        }
    }

    let webhook_registry = registry.clone();
    let webhook_shutdown = shutdown.clone();
    handles.push(tokio::spawn(async move {
        if let Err(e) = webhook::serve(webhook_registry, webhook_port, webhook_shutdown).await {
            log::error!("webhook listener: {e}");
        }
    }));

    handles
}
