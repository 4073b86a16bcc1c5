//! `ScheduledTask` and the `TaskTable` that holds them.

use crate::priority::Priority;
use crate::store::AgentRecord;
use chrono::{DateTime, Utc};
use std::collections::HashMap;

/// An in-memory scheduling record attached to one agent.
#[derive(Debug, Clone)]
pub struct ScheduledTask {
    /// Primary key; unique across the `TaskTable`.
    pub agent_id: String,
    /// Configuration snapshot captured when this task was last `schedule()`d.
    pub agent_snapshot: AgentRecord,
    /// Cron expression driving `next_run_time`.
    pub cron_expression: String,
    /// Timestamp at which the task becomes eligible.
    pub next_run_time: DateTime<Utc>,
    pub priority: Priority,
    /// Consecutive failed attempts since the last success.
    pub retry_count: u32,
    /// While in the future, the task is ineligible even if `next_run_time`
    /// has passed.
    pub backoff_until: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    /// Paused tasks remain in the table but are never dispatched.
    pub is_paused: bool,
    /// Set when this task was injected via `run_now` rather than `schedule`.
    pub is_manual_run: bool,
    /// Stable handle used to pause/resume this scheduled instance.
    /// Defaults to `agent_id` (see Open Question #3 in DESIGN.md).
    pub job_id: String,
}

impl ScheduledTask {
    pub fn new(
        agent_id: String,
        agent_snapshot: AgentRecord,
        cron_expression: String,
        next_run_time: DateTime<Utc>,
        priority: Priority,
    ) -> Self {
        Self {
            job_id: agent_id.clone(),
            agent_id,
            agent_snapshot,
            cron_expression,
            next_run_time,
            priority,
            retry_count: 0,
            backoff_until: None,
            last_error: None,
            is_paused: false,
            is_manual_run: false,
        }
    }

    /// Whether `now` would select this task for dispatch, per §4.3's
    /// eligibility filter.
    pub fn is_eligible(&self, now: DateTime<Utc>, running: &std::collections::HashSet<String>) -> bool {
        if self.is_paused {
            return false;
        }
        if self.next_run_time > now {
            return false;
        }
        if let Some(until) = self.backoff_until {
            if until > now {
                return false;
            }
        }
        !running.contains(&self.agent_id)
    }
}

/// In-memory mirror of scheduled agents, keyed by agent id.
///
/// All operations are synchronous; callers serialize access against the
/// scheduler lock (see `SchedulerLock` in `scheduler.rs`) so the invariants
/// in spec §3 hold between ticks.
#[derive(Debug, Default)]
pub struct TaskTable {
    tasks: HashMap<String, ScheduledTask>,
}

impl TaskTable {
    pub fn new() -> Self {
        Self {
            tasks: HashMap::new(),
        }
    }

    pub fn upsert(&mut self, task: ScheduledTask) {
        self.tasks.insert(task.agent_id.clone(), task);
    }

    pub fn remove(&mut self, agent_id: &str) -> Option<ScheduledTask> {
        self.tasks.remove(agent_id)
    }

    pub fn get(&self, agent_id: &str) -> Option<&ScheduledTask> {
        self.tasks.get(agent_id)
    }

    pub fn get_mut(&mut self, agent_id: &str) -> Option<&mut ScheduledTask> {
        self.tasks.get_mut(agent_id)
    }

    pub fn list(&self) -> impl Iterator<Item = &ScheduledTask> {
        self.tasks.values()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn set_next_run(&mut self, agent_id: &str, t: DateTime<Utc>) {
        if let Some(task) = self.tasks.get_mut(agent_id) {
            task.next_run_time = t;
        }
    }

    pub fn set_paused(&mut self, agent_id: &str, paused: bool) {
        if let Some(task) = self.tasks.get_mut(agent_id) {
            task.is_paused = paused;
        }
    }

    pub fn paused_jobs(&self) -> Vec<(&str, &str)> {
        self.tasks
            .values()
            .filter(|t| t.is_paused)
            .map(|t| (t.agent_id.as_str(), t.job_id.as_str()))
            .collect()
    }
}
