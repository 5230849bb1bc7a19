//! Approval broker: suspends an in-flight tool call until a human resolves
//! it on any surface (chat command, admin API, in-process), or the 30-minute
//! expiry fires.
//!
//! `request` persists a pending [`ApprovalRequest`] and hands back a waiter;
//! `resolve` is idempotent, records the resolver, and wakes at most one
//! waiting future.

use std::{
    collections::HashMap,
    path::PathBuf,
    sync::{Arc, Mutex},
    time::Duration,
};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::{
    error::{CoreError, Result},
    event_bus::{AppEvent, EventBus},
    security::RiskLevel,
    util::atomic_write,
};

/// Wall-clock expiry for a pending approval.
pub const APPROVAL_TIMEOUT: Duration = Duration::from_secs(30 * 60);

// ─── Types ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
    Expired,
}

/// The tool call a pending approval is holding back.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProposedAction {
    pub tool_name: String,
    pub input: Value,
    pub reasoning: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalRequest {
    pub id: String,
    pub task_id: String,
    pub description: String,
    pub action: ProposedAction,
    pub risk: RiskLevel,
    pub risk_explanation: String,
    pub status: ApprovalStatus,
    pub channel: String,
    pub user: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub expires_at: chrono::DateTime<chrono::Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<chrono::DateTime<chrono::Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_by: Option<String>,
}

/// Parameters for [`ApprovalBroker::request`].
#[derive(Debug, Clone)]
pub struct NewApproval {
    pub task_id: String,
    pub description: String,
    pub action: ProposedAction,
    pub risk: RiskLevel,
    pub risk_explanation: String,
    pub channel: String,
    pub user: String,
}

/// Handed to the suspended worker; resolves to the human's decision.
pub struct ApprovalWaiter {
    pub id: String,
    rx: tokio::sync::oneshot::Receiver<bool>,
    broker: Arc<ApprovalBroker>,
}

impl ApprovalWaiter {
    /// Wait for a resolution. Expiry (or a dropped resolver) reads as
    /// rejection.
    pub async fn wait(self) -> bool {
        match tokio::time::timeout(APPROVAL_TIMEOUT, self.rx).await {
            Ok(Ok(approved)) => approved,
            Ok(Err(_)) => false,
            Err(_) => {
                // Single-shot timer fired: mark the request expired.
                let _ = self.broker.expire(&self.id);
                false
            }
        }
    }
}

// ─── ApprovalBroker ───────────────────────────────────────────────────────────

pub struct ApprovalBroker {
    dir: PathBuf,
    index: Mutex<HashMap<String, ApprovalRequest>>,
    waiters: Mutex<HashMap<String, tokio::sync::oneshot::Sender<bool>>>,
    bus: Option<Arc<dyn EventBus>>,
}

impl ApprovalBroker {
    /// Load persisted approvals; anything still pending past its expiry (a
    /// previous run was interrupted) transitions to `expired`.
    pub fn load(workspace: &std::path::Path, bus: Option<Arc<dyn EventBus>>) -> Result<Arc<Self>> {
        let dir = workspace.join("approvals");
        std::fs::create_dir_all(&dir)
            .map_err(|e| CoreError::fatal(format!("cannot create approvals dir: {e}")))?;

        let mut index = HashMap::new();
        for entry in std::fs::read_dir(&dir)
            .map_err(|e| CoreError::fatal(format!("cannot read approvals dir: {e}")))?
            .flatten()
        {
            if let Some(mut req) = std::fs::read_to_string(entry.path())
                .ok()
                .and_then(|raw| serde_json::from_str::<ApprovalRequest>(&raw).ok())
            {
                if req.status == ApprovalStatus::Pending && req.expires_at <= chrono::Utc::now() {
                    req.status = ApprovalStatus::Expired;
                    req.resolved_at = Some(chrono::Utc::now());
                    req.resolved_by = Some("system:expiry".to_string());
                }
                index.insert(req.id.clone(), req);
            }
        }

        let broker = Arc::new(Self {
            dir,
            index: Mutex::new(index),
            waiters: Mutex::new(HashMap::new()),
            bus,
        });
        for req in broker.all() {
            if req.status != ApprovalStatus::Pending {
                broker.persist(&req)?;
            }
        }
        Ok(broker)
    }

    /// Create a pending request and return the waiter for its outcome.
    pub fn request(self: &Arc<Self>, params: NewApproval) -> Result<ApprovalWaiter> {
        let now = chrono::Utc::now();
        let req = ApprovalRequest {
            id: Uuid::new_v4().to_string(),
            task_id: params.task_id,
            description: params.description,
            action: params.action,
            risk: params.risk,
            risk_explanation: params.risk_explanation,
            status: ApprovalStatus::Pending,
            channel: params.channel,
            user: params.user,
            created_at: now,
            expires_at: now + chrono::Duration::seconds(APPROVAL_TIMEOUT.as_secs() as i64),
            resolved_at: None,
            resolved_by: None,
        };
        self.persist(&req)?;

        let (tx, rx) = tokio::sync::oneshot::channel();
        self.waiters
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(req.id.clone(), tx);
        self.index
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(req.id.clone(), req.clone());

        if let Some(bus) = &self.bus {
            let _ = bus.publish(AppEvent::ApprovalRequested {
                approval_id: req.id.clone(),
                task_id: req.task_id.clone(),
                tool_name: req.action.tool_name.clone(),
                risk: req.risk.to_string(),
                description: req.description.clone(),
                channel: req.channel.clone(),
                user: req.user.clone(),
            });
        }

        Ok(ApprovalWaiter {
            id: req.id,
            rx,
            broker: Arc::clone(self),
        })
    }

    /// Resolve by full id or unique prefix. Terminal resolutions are
    /// idempotent: resolving an already-resolved request returns it unchanged
    /// and wakes nobody.
    pub fn resolve(&self, id_or_prefix: &str, approved: bool, resolver: &str) -> Result<ApprovalRequest> {
        let id = self.expand_prefix(id_or_prefix)?;
        let updated = {
            let mut index = self.index.lock().unwrap_or_else(|e| e.into_inner());
            let req = index
                .get_mut(&id)
                .ok_or_else(|| CoreError::validation(format!("unknown approval '{id_or_prefix}'")))?;
            if req.status != ApprovalStatus::Pending {
                return Ok(req.clone());
            }
            req.status = if approved { ApprovalStatus::Approved } else { ApprovalStatus::Rejected };
            req.resolved_at = Some(chrono::Utc::now());
            req.resolved_by = Some(resolver.to_string());
            req.clone()
        };
        self.persist(&updated)?;

        if let Some(tx) = self
            .waiters
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&id)
        {
            let _ = tx.send(approved);
        }
        if let Some(bus) = &self.bus {
            let _ = bus.publish(AppEvent::ApprovalResolved {
                approval_id: id,
                approved,
                resolver: resolver.to_string(),
            });
        }
        Ok(updated)
    }

    /// Timer path: flip a still-pending request to `expired`.
    fn expire(&self, id: &str) -> Result<()> {
        let updated = {
            let mut index = self.index.lock().unwrap_or_else(|e| e.into_inner());
            let Some(req) = index.get_mut(id) else { return Ok(()) };
            if req.status != ApprovalStatus::Pending {
                return Ok(());
            }
            req.status = ApprovalStatus::Expired;
            req.resolved_at = Some(chrono::Utc::now());
            req.resolved_by = Some("system:expiry".to_string());
            req.clone()
        };
        self.waiters.lock().unwrap_or_else(|e| e.into_inner()).remove(id);
        self.persist(&updated)
    }

    pub fn get(&self, id: &str) -> Option<ApprovalRequest> {
        self.index.lock().unwrap_or_else(|e| e.into_inner()).get(id).cloned()
    }

    pub fn all(&self) -> Vec<ApprovalRequest> {
        let mut reqs: Vec<ApprovalRequest> = self
            .index
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .cloned()
            .collect();
        reqs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        reqs
    }

    pub fn pending(&self) -> Vec<ApprovalRequest> {
        self.all()
            .into_iter()
            .filter(|r| r.status == ApprovalStatus::Pending)
            .collect()
    }

    pub fn pending_for(&self, user: &str) -> Vec<ApprovalRequest> {
        self.pending().into_iter().filter(|r| r.user == user).collect()
    }

    // ── Internal ─────────────────────────────────────────────────────────────

    fn expand_prefix(&self, prefix: &str) -> Result<String> {
        if prefix.is_empty() {
            return Err(CoreError::validation("empty approval id"));
        }
        let index = self.index.lock().unwrap_or_else(|e| e.into_inner());
        let mut matches = index.keys().filter(|k| k.starts_with(prefix));
        let first = matches
            .next()
            .ok_or_else(|| CoreError::validation(format!("no approval matches '{prefix}'")))?
            .clone();
        if matches.next().is_some() {
            return Err(CoreError::validation(format!("approval prefix '{prefix}' is ambiguous")));
        }
        Ok(first)
    }

    fn persist(&self, req: &ApprovalRequest) -> Result<()> {
        let raw = serde_json::to_string_pretty(req)?;
        atomic_write(&self.dir.join(format!("{}.json", req.id)), &raw)
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────
