//! Task priority: a closed sum type with an explicit total order, replacing
//! the stringly-typed priority the source config carried.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::str::FromStr;

/// Dispatch priority. Ordered `Low < Normal < High < Critical`; the
/// `PriorityQueue` comparator sorts higher priority first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Priority {
    Low = 1,
    Normal = 2,
    High = 3,
    Critical = 4,
}

impl Priority {
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// Default priority for a known agent kind, case-insensitive, per the
    /// `CUSTOMER_SUPPORT` / `PERFORMANCE_OPTIMIZER` -> HIGH table; all other
    /// kinds fall through to `Normal`.
    pub fn for_kind(kind: &str) -> Priority {
        match kind.to_ascii_uppercase().as_str() {
            "CUSTOMER_SUPPORT" | "PERFORMANCE_OPTIMIZER" => Priority::High,
            _ => Priority::Normal,
        }
    }
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Normal
    }
}

impl PartialOrd for Priority {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Priority {
    fn cmp(&self, other: &Self) -> Ordering {
        self.as_i32().cmp(&other.as_i32())
    }
}

impl FromStr for Priority {
    type Err = String;

    /// Accepted only at API boundaries; internal code should construct
    /// `Priority` directly.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "LOW" => Ok(Priority::Low),
            "NORMAL" => Ok(Priority::Normal),
            "HIGH" => Ok(Priority::High),
            "CRITICAL" => Ok(Priority::Critical),
            other => Err(format!("unknown priority: {other}")),
        }
    }
}

/// Resolve the effective priority for a task being scheduled, per the
/// precedence chain: explicit override, then the agent's stored
/// configuration string, then the kind table, then `Normal`.
pub fn derive_priority(
    explicit: Option<Priority>,
    configured: Option<&str>,
    kind: Option<&str>,
) -> Priority {
    if let Some(p) = explicit {
        return p;
    }
    if let Some(s) = configured {
        if let Ok(p) = s.parse::<Priority>() {
            return p;
        }
    }
    if let Some(k) = kind {
        return Priority::for_kind(k);
    }
    Priority::Normal
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordering() {
        assert!(Priority::Critical > Priority::High);
        assert!(Priority::High > Priority::Normal);
        assert!(Priority::Normal > Priority::Low);
    }

    #[test]
    fn precedence_chain() {
        assert_eq!(
            derive_priority(Some(Priority::Low), Some("CRITICAL"), Some("CUSTOMER_SUPPORT")),
            Priority::Low
        );
        assert_eq!(
            derive_priority(None, Some("high"), Some("CUSTOMER_SUPPORT")),
            Priority::High
        );
        assert_eq!(
            derive_priority(None, None, Some("customer_support")),
            Priority::High
        );
        assert_eq!(derive_priority(None, None, Some("billing")), Priority::Normal);
        assert_eq!(derive_priority(None, None, None), Priority::Normal);
    }
}
