//! Event fan-out: agent lifecycle events published to subscribed
//! `EventSink`s.
//!
//! Grounded in the teacher's `CommandEventBus`
//! (`neomind-commands/src/events.rs`): a `tokio::sync::broadcast` channel is
//! the transport, so a slow or absent subscriber can never block the
//! publisher — a lagging receiver just drops its own backlog.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Kinds of lifecycle event the scheduler emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventKind {
    AgentStarted,
    AgentCompleted,
    AgentFailed,
    AgentProgress,
    AgentPaused,
    AgentResumed,
    SchedulerStatus,
}

/// Aggregate stats reported with `SCHEDULER_STATUS` events and returned by
/// `get_stats()`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerStats {
    pub is_running: bool,
    pub scheduled_tasks_count: usize,
    pub running_agents_count: usize,
    pub queued_tasks_count: usize,
    pub max_concurrent_agents: usize,
    pub paused_jobs_count: usize,
}

/// One lifecycle event. The wire shape matches spec §6.3: a fixed envelope
/// plus event-kind-specific optional fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Unique per-emission id, the way the teacher's `CommandEvent` tags
    /// each event for downstream de-duplication.
    pub id: Uuid,
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub agent_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_step: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_steps: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats: Option<SchedulerStats>,
}

impl Event {
    pub fn new(kind: EventKind, agent_id: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            agent_id: agent_id.into(),
            job_id: None,
            timestamp,
            duration_ms: None,
            error: None,
            progress: None,
            message: None,
            current_step: None,
            total_steps: None,
            stats: None,
        }
    }

    pub fn with_job_id(mut self, job_id: impl Into<String>) -> Self {
        self.job_id = Some(job_id.into());
        self
    }

    pub fn with_duration(mut self, duration_ms: u64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    pub fn with_stats(mut self, stats: SchedulerStats) -> Self {
        self.stats = Some(stats);
        self
    }

    /// The topic this event belongs to: `agent:<id>`.
    pub fn agent_topic(&self) -> String {
        format!("agent:{}", self.agent_id)
    }
}

/// The global topic carrying `SCHEDULER_STATUS` events.
pub const SCHEDULER_TOPIC: &str = "scheduler";

/// Subscriber callback capability. Delivery is best-effort and
/// fire-and-forget; a sink that errors or panics must not affect other
/// sinks or the scheduler loop.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn on_event(&self, topic: &str, event: Event);
}

/// Bridges a `broadcast::Receiver` to the `EventSink` interface, the way an
/// out-of-process transport (socket, message bus) would subscribe.
pub struct ChannelEventSink<S: EventSink> {
    inner: S,
}

impl<S: EventSink> ChannelEventSink<S> {
    pub fn new(inner: S) -> Self {
        Self { inner }
    }

    /// Drive this sink from a broadcast receiver until the bus is dropped.
    pub async fn run(self, mut rx: broadcast::Receiver<(String, Event)>) {
        loop {
            match rx.recv().await {
                Ok((topic, event)) => self.inner.on_event(&topic, event).await,
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    }
}

/// In-process event bus. Publishing never blocks: a full or lagging
/// receiver only drops its own backlog (broadcast semantics), never the
/// publisher.
pub struct EventBus {
    tx: broadcast::Sender<(String, Event)>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Publish to both the agent-specific topic and, implicitly, every
    /// subscriber — filtering by topic is the subscriber's job.
    pub fn publish(&self, event: Event) {
        let topic = event.agent_topic();
        let _ = self.tx.send((topic, event));
    }

    pub fn publish_scheduler(&self, event: Event) {
        let _ = self.tx.send((SCHEDULER_TOPIC.to_string(), event));
    }

    pub fn subscribe(&self) -> broadcast::Receiver<(String, Event)> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn publish_never_blocks_without_subscribers() {
        let bus = EventBus::new(8);
        bus.publish(Event::new(EventKind::AgentStarted, "a", Utc::now()));
    }

    #[tokio::test]
    async fn subscriber_receives_published_event() {
        let bus = EventBus::new(8);
        let mut rx = bus.subscribe();
        bus.publish(Event::new(EventKind::AgentStarted, "a", Utc::now()));
        let (topic, event) = rx.recv().await.unwrap();
        assert_eq!(topic, "agent:a");
        assert_eq!(event.kind, EventKind::AgentStarted);
    }

    struct CountingSink {
        count: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl EventSink for CountingSink {
        async fn on_event(&self, _topic: &str, _event: Event) {
            self.count.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn channel_sink_forwards_events() {
        let bus = EventBus::new(8);
        let count = Arc::new(AtomicUsize::new(0));
        let sink = ChannelEventSink::new(CountingSink {
            count: count.clone(),
        });
        let rx = bus.subscribe();
        let handle = tokio::spawn(sink.run(rx));

        bus.publish(Event::new(EventKind::AgentCompleted, "a", Utc::now()));
        bus.publish(Event::new(EventKind::AgentCompleted, "b", Utc::now()));

        // give the spawned task a chance to drain
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        drop(bus);
        let _ = handle.await;

        assert_eq!(count.load(Ordering::SeqCst), 2);
    }
}
