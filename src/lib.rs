//! Core of a multi-tenant agent scheduler: a long-lived in-process service
//! driving recurring and on-demand executions of named "agents" by cron
//! expression, with bounded concurrency, priority dispatch, retry with
//! exponential backoff, pause/resume, manual override, and a real-time
//! event stream for subscribers.
//!
//! HTTP/auth surface, durable persistence, agent business logic, and remote
//! event transport are all external collaborators, consumed through the
//! [`AgentStore`], [`AgentRunner`], and [`EventSink`] traits in this crate.
//! [`AgentScheduler`] is constructed as an explicit value — no global
//! singleton — so tests can swap in a [`ManualClock`] and an in-memory
//! [`MemoryAgentStore`].

pub mod clock;
pub mod config;
pub mod cron;
pub mod error;
pub mod events;
pub mod pool;
pub mod priority;
pub mod queue;
pub mod retry;
pub mod runner;
pub mod scheduler;
pub mod store;
pub mod task;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::SchedulerConfig;
pub use cron::CronSchedule;
pub use error::{Error, Result};
pub use events::{Event, EventBus, EventKind, EventSink, SchedulerStats};
pub use priority::Priority;
pub use retry::{RetryDecision, RetryPolicy};
pub use runner::{AgentRunner, RunOutcome};
pub use scheduler::{AgentScheduler, DefaultScheduler, TaskDetails};
pub use store::{AgentRecord, AgentStatus, AgentStore, MemoryAgentStore, SchedulePatch};
pub use task::{ScheduledTask, TaskTable};

/// Installs a `tracing-subscriber` `EnvFilter` subscriber for binaries and
/// examples. The library itself never installs a global subscriber.
pub fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).try_init();
}
