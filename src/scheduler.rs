//! `AgentScheduler`: the `ControlAPI` + `SchedulerLoop` orchestrator.
//!
//! Constructed as an explicit value (store, runner, clock, event bus all
//! supplied through the constructor) rather than a process-wide singleton,
//! per the Design Notes re-architecture guidance — this is what makes a
//! `ManualClock` usable in tests at all.

use crate::clock::{Clock, SystemClock};
use crate::config::SchedulerConfig;
use crate::cron::CronSchedule;
use crate::error::{Error, Result};
use crate::events::{Event, EventBus, EventKind, SchedulerStats};
use crate::pool::WorkerPool;
use crate::priority::{derive_priority, Priority};
use crate::queue::eligible_candidates;
use crate::retry::RetryDecision;
use crate::runner::AgentRunner;
use crate::store::{AgentStatus, AgentStore, SchedulePatch};
use crate::task::{ScheduledTask, TaskTable};
use chrono::{DateTime, Utc};
use serde_json::json;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;

/// Snapshot of one scheduled task, as returned by `get_task_details`.
#[derive(Debug, Clone, serde::Serialize)]
pub struct TaskDetails {
    pub agent_id: String,
    pub agent_name: String,
    pub priority: Priority,
    pub next_run_time: DateTime<Utc>,
    pub retry_count: u32,
    pub last_error: Option<String>,
    pub backoff_until: Option<DateTime<Utc>>,
    pub is_running: bool,
    pub is_paused: bool,
    pub job_id: String,
}

/// Joint state guarded by the single scheduler lock (spec §5): the
/// `TaskTable` and the set of currently in-flight agent ids. Kept together
/// so a single lock acquisition sees a consistent view of both.
struct Inner {
    tasks: TaskTable,
    running_agents: HashSet<String>,
}

pub struct AgentScheduler<S, R, C = SystemClock>
where
    S: AgentStore + 'static,
    R: AgentRunner + 'static,
    C: Clock + 'static,
{
    store: Arc<S>,
    runner: Arc<R>,
    clock: Arc<C>,
    events: Arc<EventBus>,
    pool: Arc<WorkerPool>,
    inner: Arc<Mutex<Inner>>,
    config: SchedulerConfig,
    running: Arc<AtomicBool>,
    shutdown: CancellationToken,
    loop_handle: Mutex<Option<JoinHandle<()>>>,
    /// Handles for in-flight `spawn_dispatch` tasks, drained by `stop()` so
    /// shutdown can best-effort wait for them (spec §5).
    dispatches: Mutex<JoinSet<()>>,
}

impl<S, R, C> AgentScheduler<S, R, C>
where
    S: AgentStore + 'static,
    R: AgentRunner + 'static,
    C: Clock + 'static,
{
    pub fn new(store: Arc<S>, runner: Arc<R>, clock: Arc<C>, config: SchedulerConfig) -> Self {
        let pool = Arc::new(WorkerPool::new(config.max_concurrent_agents));
        Self {
            store,
            runner,
            clock,
            events: Arc::new(EventBus::default()),
            pool,
            inner: Arc::new(Mutex::new(Inner {
                tasks: TaskTable::new(),
                running_agents: HashSet::new(),
            })),
            config,
            running: Arc::new(AtomicBool::new(false)),
            shutdown: CancellationToken::new(),
            loop_handle: Mutex::new(None),
            dispatches: Mutex::new(JoinSet::new()),
        }
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    // ---- ControlAPI -----------------------------------------------------

    /// Validates `cron`, updates the `AgentStore`, and (if `enabled`)
    /// upserts a `ScheduledTask` with a freshly computed `next_run_time`.
    /// Idempotent.
    pub async fn schedule(
        &self,
        agent_id: &str,
        cron: &str,
        priority: Option<Priority>,
        enabled: bool,
    ) -> Result<()> {
        let parsed = CronSchedule::parse(cron)?;
        let now = self.clock.now();

        let mut record = self.store.get_agent(agent_id).await?;
        record.schedule_expression = Some(cron.to_string());
        record.schedule_enabled = enabled;

        self.store
            .update_schedule(
                agent_id,
                SchedulePatch {
                    expression: Some(Some(cron.to_string())),
                    enabled: Some(enabled),
                    ..Default::default()
                },
            )
            .await?;

        let mut guard = self.inner.lock().await;
        if enabled {
            let next_run = parsed.next_after(now)?;
            let effective_priority = derive_priority(
                priority,
                record
                    .configuration
                    .get("priority")
                    .and_then(|v| v.as_str()),
                record.kind.as_deref(),
            );
            let task = ScheduledTask::new(
                agent_id.to_string(),
                record,
                cron.to_string(),
                next_run,
                effective_priority,
            );
            guard.tasks.upsert(task);
        } else {
            guard.tasks.remove(agent_id);
        }

        tracing::debug!(agent_id, cron, enabled, "agent scheduled");
        Ok(())
    }

    /// Removes the task from the `TaskTable` and clears schedule fields in
    /// the `AgentStore`. Safe if the task is absent.
    pub async fn unschedule(&self, agent_id: &str) -> Result<()> {
        self.inner.lock().await.tasks.remove(agent_id);
        if let Err(e) = self
            .store
            .update_schedule(
                agent_id,
                SchedulePatch {
                    expression: Some(None),
                    enabled: Some(false),
                    next_run_at: Some(None),
                    ..Default::default()
                },
            )
            .await
        {
            tracing::warn!(
                agent_id,
                error = %Error::StoreFailure(e.to_string()),
                "failed to clear schedule fields in store; task already removed from table"
            );
        }
        tracing::debug!(agent_id, "agent unscheduled");
        Ok(())
    }

    /// Dispatches immediately, bypassing the queue and the concurrency cap
    /// (the documented reference behavior for Open Question #1 — see
    /// DESIGN.md).
    pub async fn run_now(&self, agent_id: &str) -> Result<()> {
        // Validate existence up front so `NotFound` beats `AlreadyRunning`.
        self.store.get_agent(agent_id).await?;

        // Single guard scope: check, reserve `running_agents`, mark the
        // existing `ScheduledTask` (if any) as manually run, and read its
        // `job_id`, all atomically with respect to `tick()`.
        let job_id = {
            let mut guard = self.inner.lock().await;
            if guard.running_agents.contains(agent_id) {
                return Err(Error::AlreadyRunning(agent_id.to_string()));
            }
            guard.running_agents.insert(agent_id.to_string());
            let job_id = guard
                .tasks
                .get(agent_id)
                .map(|t| t.job_id.clone())
                .unwrap_or_else(|| agent_id.to_string());
            if let Some(task) = guard.tasks.get_mut(agent_id) {
                task.is_manual_run = true;
            }
            job_id
        };

        self.spawn_dispatch(agent_id.to_string(), job_id, true, None).await;
        Ok(())
    }

    /// Sets `is_paused=true`, persists the pause in the store's
    /// configuration blob (mirror only; the hot path never reads it back),
    /// and emits `AGENT_PAUSED`.
    pub async fn pause_job(&self, agent_id: &str) -> Result<()> {
        let now = self.clock.now();

        // Check-and-set inside one guard scope so a `tick()` cannot mark
        // the agent running between the `Conflict` check and the pause.
        {
            let mut guard = self.inner.lock().await;
            if guard.tasks.get(agent_id).is_none() {
                return Err(Error::NotScheduled(agent_id.to_string()));
            }
            if guard.running_agents.contains(agent_id) {
                return Err(Error::Conflict(agent_id.to_string()));
            }
            guard.tasks.set_paused(agent_id, true);
        }

        if let Err(e) = self
            .store
            .update_schedule(
                agent_id,
                SchedulePatch {
                    configuration_patch: Some(
                        [
                            ("isPaused".to_string(), json!(true)),
                            ("pausedAt".to_string(), json!(now.to_rfc3339())),
                        ]
                        .into_iter()
                        .collect(),
                    ),
                    ..Default::default()
                },
            )
            .await
        {
            tracing::warn!(
                agent_id,
                error = %Error::StoreFailure(e.to_string()),
                "failed to persist pause in store; task paused in memory regardless"
            );
        }

        self.events.publish(
            Event::new(EventKind::AgentPaused, agent_id, now).with_job_id(agent_id),
        );
        Ok(())
    }

    /// Clears the pause flag; if `next_run_time` is already in the past,
    /// recomputes it from the task's cron expression.
    pub async fn resume_job(&self, agent_id: &str) -> Result<()> {
        let now = self.clock.now();
        let next_run = {
            let mut guard = self.inner.lock().await;
            let task = guard
                .tasks
                .get_mut(agent_id)
                .ok_or_else(|| Error::NotScheduled(agent_id.to_string()))?;
            if !task.is_paused {
                return Err(Error::NotPaused(agent_id.to_string()));
            }
            task.is_paused = false;
            if task.next_run_time < now {
                let parsed = CronSchedule::parse(&task.cron_expression)?;
                task.next_run_time = parsed.next_after(now)?;
            }
            task.next_run_time
        };

        if let Err(e) = self
            .store
            .update_schedule(
                agent_id,
                SchedulePatch {
                    next_run_at: Some(Some(next_run)),
                    configuration_patch: Some(
                        [
                            ("isPaused".to_string(), json!(false)),
                            ("resumedAt".to_string(), json!(now.to_rfc3339())),
                        ]
                        .into_iter()
                        .collect(),
                    ),
                    ..Default::default()
                },
            )
            .await
        {
            tracing::warn!(
                agent_id,
                error = %Error::StoreFailure(e.to_string()),
                "failed to persist resume in store; task resumed in memory regardless"
            );
        }

        self.events.publish(
            Event::new(EventKind::AgentResumed, agent_id, now).with_job_id(agent_id),
        );
        Ok(())
    }

    pub async fn get_stats(&self) -> SchedulerStats {
        let guard = self.inner.lock().await;
        SchedulerStats {
            is_running: self.running.load(Ordering::SeqCst),
            scheduled_tasks_count: guard.tasks.len(),
            running_agents_count: guard.running_agents.len(),
            queued_tasks_count: guard
                .tasks
                .list()
                .filter(|t| t.is_eligible(self.clock.now(), &guard.running_agents))
                .count(),
            max_concurrent_agents: self.pool.max_concurrent(),
            paused_jobs_count: guard.tasks.paused_jobs().len(),
        }
    }

    pub async fn get_task_details(&self) -> Vec<TaskDetails> {
        let guard = self.inner.lock().await;
        guard
            .tasks
            .list()
            .map(|t| TaskDetails {
                agent_id: t.agent_id.clone(),
                agent_name: t.agent_snapshot.name.clone(),
                priority: t.priority,
                next_run_time: t.next_run_time,
                retry_count: t.retry_count,
                last_error: t.last_error.clone(),
                backoff_until: t.backoff_until,
                is_running: guard.running_agents.contains(&t.agent_id),
                is_paused: t.is_paused,
                job_id: t.job_id.clone(),
            })
            .collect()
    }

    pub async fn get_paused_jobs(&self) -> Vec<(String, String)> {
        self.inner
            .lock()
            .await
            .tasks
            .paused_jobs()
            .into_iter()
            .map(|(a, j)| (a.to_string(), j.to_string()))
            .collect()
    }

    // ---- Startup ----------------------------------------------------------

    /// Replays all `schedule_enabled=true` agents into the `TaskTable`,
    /// restoring `is_paused` from the store's configuration blob.
    /// `next_run_time` comes from the stored `next_run_at` if present and
    /// future, otherwise is recomputed from the cron expression.
    pub async fn load_from_store(&self) -> Result<()> {
        let now = self.clock.now();
        let records = self.store.list_scheduled_enabled().await?;

        let mut guard = self.inner.lock().await;
        for record in records {
            let Some(expr) = record.schedule_expression.clone() else {
                continue;
            };
            let Ok(parsed) = CronSchedule::parse(&expr) else {
                tracing::warn!(agent_id = %record.id, "skipping agent with invalid stored cron");
                continue;
            };

            let is_paused = record
                .configuration
                .get("isPaused")
                .and_then(|v| v.as_bool())
                .unwrap_or(false);

            // A stored `next_run_at` in the past is preserved as-is so
            // `dispatch_missed` below can find and fire it; only a missing
            // stored value is freshly computed from the cron expression.
            let next_run = match record.next_run_at {
                Some(t) => t,
                None => match parsed.next_after(now) {
                    Ok(t) => t,
                    Err(e) => {
                        tracing::warn!(agent_id = %record.id, error = %e, "could not compute next run on load");
                        continue;
                    }
                },
            };

            let priority = derive_priority(
                record.priority_hint,
                record.configuration.get("priority").and_then(|v| v.as_str()),
                record.kind.as_deref(),
            );

            let mut task =
                ScheduledTask::new(record.id.clone(), record.clone(), expr, next_run, priority);
            task.is_paused = is_paused;
            guard.tasks.upsert(task);
        }
        drop(guard);

        if self.config.run_missed_on_startup {
            self.dispatch_missed(now).await;
        }

        Ok(())
    }

    /// Convenience for the binary boundary: `load_from_store()` followed by
    /// `start()` when `config.auto_start` is set (spec §6.4). Requires
    /// `Arc<Self>` because `start()` does; callers that manage the tick
    /// loop themselves should call `load_from_store()` directly instead.
    pub async fn boot(self: &Arc<Self>) -> Result<()> {
        self.load_from_store().await?;
        if self.config.auto_start {
            self.start().await;
        }
        Ok(())
    }

    async fn dispatch_missed(&self, now: DateTime<Utc>) {
        let overdue: Vec<(String, String)> = {
            let guard = self.inner.lock().await;
            guard
                .tasks
                .list()
                .filter(|t| !t.is_paused && t.next_run_time < now)
                .map(|t| (t.agent_id.clone(), t.job_id.clone()))
                .collect()
        };

        for (agent_id, job_id) in overdue {
            let Some(slot) = self.pool.try_acquire() else {
                tracing::warn!(agent_id, "skipping missed-on-startup dispatch, pool full");
                continue;
            };
            let mut guard = self.inner.lock().await;
            if guard.running_agents.contains(&agent_id) {
                continue;
            }
            guard.running_agents.insert(agent_id.clone());
            drop(guard);
            self.spawn_dispatch(agent_id, job_id, false, Some(slot)).await;
        }
    }

    // ---- Loop control -------------------------------------------------

    /// Starts the tick loop as a background task. A no-op if already
    /// running.
    pub async fn start(self: &Arc<Self>) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }

        let this = self.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(this.config.check_interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    _ = this.shutdown.cancelled() => break,
                }
                if !this.running.load(Ordering::SeqCst) {
                    break;
                }
                this.tick().await;
            }
            tracing::info!("scheduler loop stopped");
        });

        *self.loop_handle.lock().await = Some(handle);
        tracing::info!(
            check_interval_ms = self.config.check_interval.as_millis() as u64,
            max_concurrent = self.config.max_concurrent_agents,
            "scheduler started"
        );
    }

    /// Stops accepting new dispatches after the current tick. Does not
    /// forcibly cancel in-flight runners (they may choose to honor the
    /// cancellation token), but best-effort waits for every dispatch spawned
    /// via `spawn_dispatch` to finish before returning (spec §5 Shutdown).
    pub async fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.shutdown.cancel();
        if let Some(handle) = self.loop_handle.lock().await.take() {
            let _ = handle.await;
        }

        let mut dispatches = self.dispatches.lock().await;
        while let Some(res) = dispatches.join_next().await {
            if let Err(e) = res {
                tracing::warn!(error = %e, "dispatch task panicked during shutdown drain");
            }
        }
    }

    /// Runs one tick synchronously — selects eligible candidates, sorts
    /// them, and dispatches up to the available slots.
    pub async fn tick(&self) {
        let now = self.clock.now();

        let to_dispatch: Vec<(String, String)> = {
            let guard = self.inner.lock().await;
            eligible_candidates(&guard.tasks, now, &guard.running_agents)
                .into_iter()
                .map(|t| (t.agent_id.clone(), t.job_id.clone()))
                .collect()
        };

        let mut dispatched = Vec::new();
        for (agent_id, job_id) in to_dispatch {
            let Some(slot) = self.pool.try_acquire() else {
                break;
            };
            dispatched.push((agent_id, job_id, slot));
        }

        if dispatched.is_empty() {
            self.publish_stats(now).await;
            return;
        }

        let mut guard = self.inner.lock().await;
        for (agent_id, _, _) in &dispatched {
            guard.running_agents.insert(agent_id.clone());
        }
        drop(guard);

        for (agent_id, job_id, slot) in dispatched {
            self.spawn_dispatch(agent_id, job_id, false, Some(slot)).await;
        }

        self.publish_stats(now).await;
    }

    async fn publish_stats(&self, now: DateTime<Utc>) {
        let stats = self.get_stats().await;
        self.events.publish_scheduler(
            Event::new(EventKind::SchedulerStatus, "scheduler", now).with_stats(stats),
        );
    }

    /// Spawns one dispatch onto `self.dispatches`, so `stop()` can drain it.
    /// The scheduler lock is never held across the `AgentRunner.run` await
    /// (spec §5): candidates are selected under lock, then the lock is
    /// released before I/O and the runner call, and re-acquired only to
    /// record the outcome. `slot` is `None` for `run_now`, which bypasses
    /// the concurrency cap by design (Open Question #1 — see DESIGN.md);
    /// when present it is held for the lifetime of the dispatch and only
    /// released once the outcome is recorded.
    async fn spawn_dispatch(
        &self,
        agent_id: String,
        job_id: String,
        is_manual: bool,
        slot: Option<crate::pool::Slot>,
    ) {
        let store = self.store.clone();
        let runner = self.runner.clone();
        let clock = self.clock.clone();
        let events = self.events.clone();
        let inner = self.inner.clone();
        let retry_policy = self.config.retry;
        let cancel = self.shutdown.child_token();

        let fut = async move {
            let _slot = slot;
            let now = clock.now();
            if let Err(e) = store.set_status(&agent_id, AgentStatus::Running).await {
                tracing::warn!(
                    agent_id = %agent_id,
                    error = %Error::StoreFailure(e.to_string()),
                    "failed to persist RUNNING status"
                );
            }
            if let Err(e) = store
                .update_schedule(
                    &agent_id,
                    SchedulePatch {
                        status: Some(AgentStatus::Running),
                        ..Default::default()
                    },
                )
                .await
            {
                tracing::warn!(
                    agent_id = %agent_id,
                    error = %Error::StoreFailure(e.to_string()),
                    "failed to persist dispatch start in store"
                );
            }

            events.publish(
                Event::new(EventKind::AgentStarted, agent_id.clone(), now)
                    .with_job_id(job_id.clone()),
            );

            let start = std::time::Instant::now();
            let outcome = runner.run(&agent_id, cancel).await;
            let duration_ms = outcome
                .duration_ms
                .max(start.elapsed().as_millis() as u64);

            if outcome.success {
                let mut guard = inner.lock().await;
                if let Some(task) = guard.tasks.get_mut(&agent_id) {
                    task.retry_count = 0;
                    task.last_error = None;
                    task.backoff_until = None;
                    task.is_manual_run = false;
                    if !is_manual {
                        if let Ok(parsed) = CronSchedule::parse(&task.cron_expression) {
                            if let Ok(next) = parsed.next_after(clock.now()) {
                                task.next_run_time = next;
                            }
                        }
                    }
                }
                guard.running_agents.remove(&agent_id);
                let next_run_at = guard
                    .tasks
                    .get(&agent_id)
                    .filter(|_| !is_manual)
                    .map(|t| t.next_run_time);
                drop(guard);

                if let Err(e) = store
                    .update_schedule(
                        &agent_id,
                        SchedulePatch {
                            next_run_at: Some(next_run_at),
                            status: Some(AgentStatus::Idle),
                            ..Default::default()
                        },
                    )
                    .await
                {
                    tracing::warn!(
                        agent_id = %agent_id,
                        error = %Error::StoreFailure(e.to_string()),
                        "failed to persist successful outcome in store"
                    );
                }

                events.publish(
                    Event::new(EventKind::AgentCompleted, agent_id.clone(), clock.now())
                        .with_job_id(job_id)
                        .with_duration(duration_ms),
                );
            } else {
                let error_message = outcome.error.unwrap_or_else(|| "unknown error".to_string());
                let mut guard = inner.lock().await;
                let mut terminal = false;

                if let Some(task) = guard.tasks.get_mut(&agent_id) {
                    task.retry_count += 1;
                    task.last_error = Some(error_message.clone());
                    task.is_manual_run = false;
                    match retry_policy.decide(task.retry_count) {
                        RetryDecision::Retry(delay) => {
                            task.backoff_until = Some(clock.now() + delay);
                        }
                        RetryDecision::Terminal => {
                            terminal = true;
                        }
                    }
                }
                if terminal {
                    guard.tasks.remove(&agent_id);
                }
                guard.running_agents.remove(&agent_id);
                drop(guard);

                if terminal {
                    if let Err(e) = store.set_status(&agent_id, AgentStatus::Error).await {
                        tracing::error!(
                            agent_id = %agent_id,
                            error = %Error::StoreFailure(e.to_string()),
                            "failed to persist terminal ERROR status"
                        );
                    }
                } else if let Err(e) = store.set_status(&agent_id, AgentStatus::Idle).await {
                    tracing::warn!(
                        agent_id = %agent_id,
                        error = %Error::StoreFailure(e.to_string()),
                        "failed to persist IDLE status after retryable failure"
                    );
                }

                events.publish(
                    Event::new(EventKind::AgentFailed, agent_id.clone(), clock.now())
                        .with_job_id(job_id)
                        .with_error(error_message)
                        .with_duration(duration_ms),
                );
            }
        };

        self.dispatches.lock().await.spawn(fut);
    }
}

/// Convenience alias for constructing a scheduler with the real system
/// clock.
pub type DefaultScheduler<S, R> = AgentScheduler<S, R, SystemClock>;
