//! Logical priority ordering over `TaskTable` entries.
//!
//! Not a physically separate data structure — `TaskTable` is the source of
//! truth; this module is the comparator and eligibility filter the
//! scheduler loop sorts candidates by on each tick.

use crate::task::{ScheduledTask, TaskTable};
use chrono::{DateTime, Utc};
use std::cmp::Ordering;
use std::collections::HashSet;

/// Comparator: higher priority first, then earlier `next_run_time`, then
/// `agent_id` lexicographically for deterministic ordering among ties.
pub fn compare(a: &ScheduledTask, b: &ScheduledTask) -> Ordering {
    b.priority
        .cmp(&a.priority)
        .then_with(|| a.next_run_time.cmp(&b.next_run_time))
        .then_with(|| a.agent_id.cmp(&b.agent_id))
}

/// Candidates eligible for dispatch at `now`, sorted per `compare`.
pub fn eligible_candidates<'a>(
    table: &'a TaskTable,
    now: DateTime<Utc>,
    running: &HashSet<String>,
) -> Vec<&'a ScheduledTask> {
    let mut candidates: Vec<&ScheduledTask> = table
        .list()
        .filter(|t| t.is_eligible(now, running))
        .collect();
    candidates.sort_by(|a, b| compare(a, b));
    candidates
}
