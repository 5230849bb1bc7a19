//! Settings persistence and the guarded mutation path.
//!
//! Every mutation goes through [`SettingsStore::apply_patch`]. Patches that
//! would flip a dangerous switch (table below) must carry a matching one-time
//! confirmation token; without it the safe subset is applied and the caller
//! is told which confirmations are still required.

use std::{
    fs,
    path::{Path, PathBuf},
    sync::RwLock,
};

use serde_json::{Value, json};
use sha2::{Digest, Sha256};

use crate::{
    error::{CoreError, Result},
    util::atomic_write,
};

use super::schema::{AutonomyLevel, RuntimeSettings};

// ─── Dangerous-setting table ──────────────────────────────────────────────────

/// (dotted key, forbidden value, human-readable reason).
const DANGEROUS: &[(&str, fn() -> Value, &str)] = &[
    ("security.sandboxEnabled", || json!(false), "disables the filesystem path jail"),
    ("security.ssrfGuard", || json!(false), "disables SSRF-safe URL validation"),
    ("security.injectionGuard", || json!(false), "disables prompt-injection framing"),
    ("security.gatewayAuth", || json!(false), "exposes the control plane without authentication"),
    ("security.auditLog", || json!(false), "stops recording the audit trail"),
    ("security.allowLocalhost", || json!(true), "permits fetches to loopback services"),
    ("autonomy", || json!("high"), "removes all human approval gates"),
    ("permissions.systemControl", || json!(true), "grants OS-control tools to the model"),
];

/// Confirmation tokens remain valid for one 10-minute bucket — wide enough to
/// span the read-confirm-write round trip, far narrower than an hour.
const CONFIRM_BUCKET_SECS: i64 = 600;

/// A confirmation the caller still has to supply.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequiredConfirmation {
    pub key: String,
    pub reason: String,
    pub token: String,
}

/// Result of a guarded patch.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PatchOutcome {
    pub settings: RuntimeSettings,
    /// Empty when the whole patch was applied.
    pub required_confirmations: Vec<RequiredConfirmation>,
}

// ─── SettingsStore ────────────────────────────────────────────────────────────

pub struct SettingsStore {
    path: PathBuf,
    secret: String,
    inner: RwLock<RuntimeSettings>,
}

impl SettingsStore {
    /// Load `settings.json` from the workspace (or write defaults), then apply
    /// environment overrides. An unparseable file is backed up and replaced
    /// with defaults rather than aborting start-up.
    pub fn load(workspace: &Path, secret: impl Into<String>) -> Result<Self> {
        let path = workspace.join("settings.json");
        let mut settings = match fs::read_to_string(&path) {
            Ok(raw) => match serde_json::from_str::<RuntimeSettings>(&raw) {
                Ok(s) => s,
                Err(e) => {
                    log::warn!("settings.json unreadable ({e}); backing up and rewriting defaults");
                    let _ = fs::rename(&path, path.with_extension("json.bak"));
                    RuntimeSettings::default()
                }
            },
            Err(_) => RuntimeSettings::default(),
        };
        apply_env_overrides(&mut settings);

        let store = Self {
            path,
            secret: secret.into(),
            inner: RwLock::new(settings),
        };
        store.persist()?;
        Ok(store)
    }

    /// Snapshot of the current settings.
    pub fn get(&self) -> RuntimeSettings {
        self.inner.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Deterministic confirmation token for flipping `key` to `value` within
    /// the current time bucket.
    pub fn confirmation_token(&self, key: &str, value: &Value) -> String {
        self.token_for_bucket(key, value, current_bucket())
    }

    /// Deep-merge `patch` into the settings, holding back any dangerous
    /// key/value pair that lacks a matching confirmation token. The safe
    /// subset is applied and persisted either way.
    pub fn apply_patch(&self, patch: Value, confirmations: &[String]) -> Result<PatchOutcome> {
        if !patch.is_object() {
            return Err(CoreError::validation("settings patch must be a JSON object"));
        }

        let mut required = Vec::new();
        let mut patch = patch;
        for (key, forbidden, reason) in DANGEROUS {
            let forbidden = forbidden();
            let Some(requested) = lookup_path(&patch, key) else {
                continue;
            };
            if requested != &forbidden {
                continue;
            }
            let token = self.confirmation_token(key, &forbidden);
            // Accept the current bucket and the previous one so a token
            // issued just before a boundary still works.
            let prev = self.token_for_bucket(key, &forbidden, current_bucket() - 1);
            if confirmations.iter().any(|c| c == &token || c == &prev) {
                continue;
            }
            required.push(RequiredConfirmation {
                key: (*key).to_string(),
                reason: (*reason).to_string(),
                token,
            });
            remove_path(&mut patch, key);
        }

        let merged = {
            let mut guard = self.inner.write().unwrap_or_else(|e| e.into_inner());
            let mut doc = serde_json::to_value(&*guard)?;
            deep_merge(&mut doc, &patch);
            let merged: RuntimeSettings = serde_json::from_value(doc)
                .map_err(|e| CoreError::validation(format!("invalid settings value: {e}")))?;
            *guard = merged.clone();
            merged
        };
        self.persist()?;

        Ok(PatchOutcome {
            settings: merged,
            required_confirmations: required,
        })
    }

    fn persist(&self) -> Result<()> {
        let snapshot = self.get();
        let raw = serde_json::to_string_pretty(&snapshot)?;
        atomic_write(&self.path, &raw)
    }

    fn token_for_bucket(&self, key: &str, value: &Value, bucket: i64) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.secret.as_bytes());
        hasher.update(b"\n");
        hasher.update(key.as_bytes());
        hasher.update(b"\n");
        hasher.update(value.to_string().as_bytes());
        hasher.update(b"\n");
        hasher.update(bucket.to_string().as_bytes());
        hex::encode(hasher.finalize())[..16].to_string()
    }
}

fn current_bucket() -> i64 {
    chrono::Utc::now().timestamp() / CONFIRM_BUCKET_SECS
}

// ─── Helpers ──────────────────────────────────────────────────────────────────

fn apply_env_overrides(settings: &mut RuntimeSettings) {
    if let Ok(name) = std::env::var("AGENT_NAME")
        && !name.is_empty()
    {
        settings.agent_name = name;
    }
    if let Ok(level) = std::env::var("AGENT_AUTONOMY_LEVEL")
        && let Some(parsed) = AutonomyLevel::parse(&level)
    {
        settings.autonomy = parsed;
    }
    if let Ok(n) = std::env::var("AGENT_MAX_TOOL_CALLS")
        && let Ok(n) = n.parse::<usize>()
    {
        settings.limits.max_tool_calls = n;
    }
    if let Ok(v) = std::env::var("HEARTBEAT_ENABLED") {
        settings.heartbeat.enabled = v == "1" || v.eq_ignore_ascii_case("true");
    }
    if let Ok(v) = std::env::var("HEARTBEAT_INTERVAL")
        && let Ok(mins) = v.parse::<u64>()
    {
        settings.heartbeat.interval_minutes = mins;
    }
    if let Ok(v) = std::env::var("HEARTBEAT_CHANNEL") {
        settings.heartbeat.channel = v;
    }
}

fn deep_merge(base: &mut Value, patch: &Value) {
    match (base, patch) {
        (Value::Object(base_map), Value::Object(patch_map)) => {
            for (k, v) in patch_map {
                match base_map.get_mut(k) {
                    Some(slot) if slot.is_object() && v.is_object() => deep_merge(slot, v),
                    Some(slot) => *slot = v.clone(),
                    None => {
                        base_map.insert(k.clone(), v.clone());
                    }
                }
            }
        }
        (base, patch) => *base = patch.clone(),
    }
}

fn lookup_path<'a>(doc: &'a Value, dotted: &str) -> Option<&'a Value> {
    let mut cursor = doc;
    for part in dotted.split('.') {
        cursor = cursor.get(part)?;
    }
    Some(cursor)
}

fn remove_path(doc: &mut Value, dotted: &str) {
    let parts: Vec<&str> = dotted.split('.').collect();
    let mut cursor = doc;
    for part in &parts[..parts.len() - 1] {
        match cursor.get_mut(*part) {
            Some(next) => cursor = next,
            None => return,
        }
    }
    if let Some(map) = cursor.as_object_mut()
        && let Some(last) = parts.last()
    {
        map.remove(*last);
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────
