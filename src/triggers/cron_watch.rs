//! Cron triggers: standard 5-field expressions, validated at registration,
//! driven by a per-trigger sleep-until-next-fire task.

use std::{str::FromStr, sync::Arc};

use chrono::{DateTime, Utc};
use serde_json::json;
use tokio::sync::watch;

use crate::error::{CoreError, Result};

use super::{registry::TriggerRegistry, types::Trigger};

/// Validate a 5-field cron expression (minute hour dom month dow).
pub fn validate_expression(expr: &str) -> Result<()> {
    if expr.split_whitespace().count() != 5 {
        return Err(CoreError::validation(
            "cron expression must have exactly 5 fields (minute hour dom month dow)",
        ));
    }
    // The `cron` crate wants a seconds field in front.
    cron::Schedule::from_str(&format!("0 {expr}"))
        .map(|_| ())
        .map_err(|e| CoreError::validation(format!("invalid cron expression: {e}")))
}

/// Next fire time after now, `None` for an unparseable expression.
pub fn next_fire(expr: &str) -> Option<DateTime<Utc>> {
    cron::Schedule::from_str(&format!("0 {expr}"))
        .ok()?
        .upcoming(Utc)
        .next()
}

/// Drive one cron trigger until shutdown.
pub fn spawn(
    registry: Arc<TriggerRegistry>,
    trigger: Trigger,
    mut shutdown: watch::Receiver<bool>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let Some(expr) = trigger.config_str("expression").map(str::to_string) else {
            log::warn!("cron trigger '{}' has no expression", trigger.name);
            return;
        };
        loop {
            let Some(next) = next_fire(&expr) else {
                log::warn!("cron trigger '{}': expression no longer parseable", trigger.name);
                return;
            };
            let wait = (next - Utc::now()).to_std().unwrap_or_default();
            tokio::select! {
                _ = tokio::time::sleep(wait) => {
                    let payload = json!({
                        "expression": expr,
                        "scheduledFor": next.to_rfc3339(),
                    });
                    if let Err(e) = registry.record_fire(&trigger.id, payload) {
                        log::warn!("cron trigger '{}': fire failed: {e}", trigger.name);
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
