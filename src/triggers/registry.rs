//! Trigger registry: whole-array persistence in `triggers.json`, fire
//! bookkeeping, and the trigger-fired event.

use std::{
    path::PathBuf,
    sync::{Arc, RwLock},
};

use serde_json::Value;

use crate::{
    error::{CoreError, Result},
    event_bus::{AppEvent, EventBus},
    util::atomic_write,
};

use super::types::{Trigger, TriggerType};

pub struct TriggerRegistry {
    path: PathBuf,
    triggers: RwLock<Vec<Trigger>>,
    bus: Option<Arc<dyn EventBus>>,
}

impl TriggerRegistry {
    pub fn load(workspace: &std::path::Path, bus: Option<Arc<dyn EventBus>>) -> Result<Self> {
        let path = workspace.join("triggers.json");
        let triggers: Vec<Trigger> = std::fs::read_to_string(&path)
            .ok()
            .and_then(|raw| serde_json::from_str(&raw).ok())
            .unwrap_or_default();
        Ok(Self {
            path,
            triggers: RwLock::new(triggers),
            bus,
        })
    }

    pub fn all(&self) -> Vec<Trigger> {
        self.triggers.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn get(&self, id: &str) -> Option<Trigger> {
        self.all().into_iter().find(|t| t.id == id)
    }

    pub fn enabled_of_type(&self, trigger_type: TriggerType) -> Vec<Trigger> {
        self.all()
            .into_iter()
            .filter(|t| t.enabled && t.trigger_type == trigger_type)
            .collect()
    }

    /// Validate type-specific config, then add and persist.
    pub fn add(&self, trigger: Trigger) -> Result<Trigger> {
        validate_config(&trigger)?;
        {
            let mut triggers = self.triggers.write().unwrap_or_else(|e| e.into_inner());
            triggers.push(trigger.clone());
        }
        self.persist()?;
        Ok(trigger)
    }

    pub fn remove(&self, id: &str) -> Result<bool> {
        let removed = {
            let mut triggers = self.triggers.write().unwrap_or_else(|e| e.into_inner());
            let before = triggers.len();
            triggers.retain(|t| t.id != id);
            triggers.len() != before
        };
        if removed {
            self.persist()?;
        }
        Ok(removed)
    }

    pub fn set_enabled(&self, id: &str, enabled: bool) -> Result<Trigger> {
        let updated = {
            let mut triggers = self.triggers.write().unwrap_or_else(|e| e.into_inner());
            let trigger = triggers
                .iter_mut()
                .find(|t| t.id == id)
                .ok_or_else(|| CoreError::validation(format!("unknown trigger '{id}'")))?;
            trigger.enabled = enabled;
            trigger.clone()
        };
        self.persist()?;
        Ok(updated)
    }

    /// Stamp a fire: bump the counter, persist, publish the event.
    pub fn record_fire(&self, id: &str, payload: Value) -> Result<()> {
        let fired = {
            let mut triggers = self.triggers.write().unwrap_or_else(|e| e.into_inner());
            let trigger = triggers
                .iter_mut()
                .find(|t| t.id == id)
                .ok_or_else(|| CoreError::validation(format!("unknown trigger '{id}'")))?;
            trigger.fire_count += 1;
            trigger.last_triggered = Some(chrono::Utc::now());
            trigger.clone()
        };
        self.persist()?;
        if let Some(bus) = &self.bus {
            let _ = bus.publish(AppEvent::TriggerFired {
                trigger_id: fired.id.clone(),
                name: fired.name.clone(),
                trigger_type: fired.trigger_type.as_str().to_string(),
                payload,
            });
        }
        Ok(())
    }

    fn persist(&self) -> Result<()> {
        let snapshot = self.all();
        let raw = serde_json::to_string_pretty(&snapshot)?;
        atomic_write(&self.path, &raw)
    }
}

/// Per-type config validation at registration time.
fn validate_config(trigger: &Trigger) -> Result<()> {
    match trigger.trigger_type {
        TriggerType::Cron => {
            let expr = trigger
                .config_str("expression")
                .ok_or_else(|| CoreError::validation("cron trigger needs 'expression'"))?;
            super::cron_watch::validate_expression(expr)?;
        }
        TriggerType::FileWatch => {
            let _ = trigger
                .config_str("path")
                .ok_or_else(|| CoreError::validation("file_watch trigger needs 'path'"))?;
            if let Some(pattern) = trigger.config_str("pattern") {
                regex::Regex::new(pattern)
                    .map_err(|e| CoreError::validation(format!("invalid filename pattern: {e}")))?;
            }
        }
        TriggerType::Webhook => {
            let path = trigger
                .config_str("path")
                .ok_or_else(|| CoreError::validation("webhook trigger needs 'path'"))?;
            if !path.starts_with('/') {
                return Err(CoreError::validation("webhook path must start with '/'"));
            }
        }
        TriggerType::Calendar => {
            let _ = trigger
                .config_str("url")
                .ok_or_else(|| CoreError::validation("calendar trigger needs 'url'"))?;
        }
        TriggerType::EmailWatch => {}
    }
    Ok(())
}

// ─── Tests ────────────────────────────────────────────────────────────────────
