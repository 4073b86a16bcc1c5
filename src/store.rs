//! `AgentStore`: the persistence abstraction the core depends on.
//!
//! The core treats persistence mechanics as an external collaborator (see
//! spec §1/§6.1); only the interface and a minimal in-memory implementation
//! live here, grounded in the shape of the teacher's `neomind_storage::
//! AgentStore` (a redb-backed store this crate does not carry over, since
//! concrete persistence is out of scope).

use crate::error::{Error, Result};
use crate::priority::Priority;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Status of an agent as tracked by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AgentStatus {
    Idle,
    Running,
    Paused,
    Error,
    Completed,
}

/// Persisted agent record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentRecord {
    pub id: String,
    pub name: String,
    pub schedule_expression: Option<String>,
    pub schedule_enabled: bool,
    /// Agent kind, used by the priority-derivation table (§4.9) when no
    /// explicit or configured priority is present.
    pub kind: Option<String>,
    pub priority_hint: Option<Priority>,
    pub next_run_at: Option<DateTime<Utc>>,
    pub last_run_at: Option<DateTime<Utc>>,
    pub status: AgentStatus,
    /// Opaque configuration blob. Holds `isPaused`/`pausedAt`/`resumedAt`
    /// for persistence only; the hot path never reads it (see DESIGN.md —
    /// pause state is a first-class `ScheduledTask` field).
    pub configuration: HashMap<String, Value>,
}

/// Patch applied by `update_schedule`; `None` fields are left unchanged.
#[derive(Debug, Clone, Default)]
pub struct SchedulePatch {
    pub expression: Option<Option<String>>,
    pub enabled: Option<bool>,
    pub next_run_at: Option<Option<DateTime<Utc>>>,
    pub status: Option<AgentStatus>,
    pub configuration_patch: Option<HashMap<String, Value>>,
}

/// Persistence abstraction consumed by the scheduler core.
#[async_trait]
pub trait AgentStore: Send + Sync {
    async fn get_agent(&self, id: &str) -> Result<AgentRecord>;
    async fn list_scheduled_enabled(&self) -> Result<Vec<AgentRecord>>;
    async fn update_schedule(&self, id: &str, patch: SchedulePatch) -> Result<()>;
    async fn set_status(&self, id: &str, status: AgentStatus) -> Result<()>;
}

/// In-memory `AgentStore`, sufficient to drive this crate's own tests and
/// to serve as a worked reference for downstream implementers.
#[derive(Default)]
pub struct MemoryAgentStore {
    records: Arc<RwLock<HashMap<String, AgentRecord>>>,
}

impl MemoryAgentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, record: AgentRecord) {
        self.records.write().await.insert(record.id.clone(), record);
    }

    pub async fn snapshot(&self, id: &str) -> Option<AgentRecord> {
        self.records.read().await.get(id).cloned()
    }
}

#[async_trait]
impl AgentStore for MemoryAgentStore {
    async fn get_agent(&self, id: &str) -> Result<AgentRecord> {
        self.records
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| Error::NotFound(id.to_string()))
    }

    async fn list_scheduled_enabled(&self) -> Result<Vec<AgentRecord>> {
        Ok(self
            .records
            .read()
            .await
            .values()
            .filter(|r| r.schedule_enabled)
            .cloned()
            .collect())
    }

    async fn update_schedule(&self, id: &str, patch: SchedulePatch) -> Result<()> {
        let mut guard = self.records.write().await;
        let record = guard
            .get_mut(id)
            .ok_or_else(|| Error::NotFound(id.to_string()))?;

        if let Some(expr) = patch.expression {
            record.schedule_expression = expr;
        }
        if let Some(enabled) = patch.enabled {
            record.schedule_enabled = enabled;
        }
        if let Some(next_run_at) = patch.next_run_at {
            record.next_run_at = next_run_at;
        }
        if let Some(status) = patch.status {
            record.status = status;
        }
        if let Some(cfg) = patch.configuration_patch {
            record.configuration.extend(cfg);
        }
        Ok(())
    }

    async fn set_status(&self, id: &str, status: AgentStatus) -> Result<()> {
        let mut guard = self.records.write().await;
        let record = guard
            .get_mut(id)
            .ok_or_else(|| Error::NotFound(id.to_string()))?;
        record.status = status;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str) -> AgentRecord {
        AgentRecord {
            id: id.to_string(),
            name: id.to_string(),
            schedule_expression: Some("* * * * *".to_string()),
            schedule_enabled: true,
            kind: None,
            priority_hint: None,
            next_run_at: None,
            last_run_at: None,
            status: AgentStatus::Idle,
            configuration: HashMap::new(),
        }
    }

    #[tokio::test]
    async fn get_missing_agent_errors() {
        let store = MemoryAgentStore::new();
        let err = store.get_agent("ghost").await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn update_schedule_patches_fields() {
        let store = MemoryAgentStore::new();
        store.insert(record("a")).await;

        store
            .update_schedule(
                "a",
                SchedulePatch {
                    enabled: Some(false),
                    status: Some(AgentStatus::Error),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let got = store.get_agent("a").await.unwrap();
        assert!(!got.schedule_enabled);
        assert_eq!(got.status, AgentStatus::Error);
    }
}
