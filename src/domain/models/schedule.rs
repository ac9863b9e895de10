//! Periodic schedule domain model.
//!
//! A Schedule binds a template task to a cron expression in a timezone and
//! carries the firing forecast (`next_run_at`) the scheduler loop advances.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Policy governing a firing that would exceed `max_instances`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverlapPolicy {
    /// Decline the firing and advance `next_run_at`; no instance row.
    Skip,
    /// Materialize unconditionally; the executor serializes execution by
    /// honoring `max_instances`.
    Queue,
    /// Transition live instances to `skipped`, then materialize.
    Replace,
}

impl Default for OverlapPolicy {
    fn default() -> Self {
        Self::Skip
    }
}

impl OverlapPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Skip => "skip",
            Self::Queue => "queue",
            Self::Replace => "replace",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "skip" => Some(Self::Skip),
            "queue" => Some(Self::Queue),
            "replace" => Some(Self::Replace),
            _ => None,
        }
    }
}

/// A persistent periodic schedule over a template task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Schedule {
    pub id: Uuid,
    /// The template task whose payload is cloned on every firing.
    pub template_task_id: i64,
    /// Validated 5-field cron expression.
    pub cron_expression: String,
    /// IANA zone the expression is evaluated in.
    pub timezone: String,
    /// Gate on materialization. A disabled schedule keeps a valid forecast.
    pub enabled: bool,
    /// Next intended firing, UTC.
    pub next_run_at: DateTime<Utc>,
    /// Most recent firing, UTC.
    pub last_run_at: Option<DateTime<Utc>>,
    /// Monotonic count of firings.
    pub run_count: u64,
    /// Upper bound on concurrent scheduled+running instances.
    pub max_instances: u32,
    pub overlap_policy: OverlapPolicy,
    /// Set when the stored row can no longer be interpreted (e.g. the
    /// expression fails to re-parse); an errored schedule never fires.
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Schedule {
    pub fn new(
        template_task_id: i64,
        cron_expression: impl Into<String>,
        timezone: impl Into<String>,
        next_run_at: DateTime<Utc>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            template_task_id,
            cron_expression: cron_expression.into(),
            timezone: timezone.into(),
            enabled: true,
            next_run_at,
            last_run_at: None,
            run_count: 0,
            max_instances: 1,
            overlap_policy: OverlapPolicy::Skip,
            last_error: None,
            created_at: now,
            updated_at: now,
        }
    }

    // Builder methods
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_max_instances(mut self, max_instances: u32) -> Self {
        self.max_instances = max_instances.max(1);
        self
    }

    pub fn with_overlap_policy(mut self, policy: OverlapPolicy) -> Self {
        self.overlap_policy = policy;
        self
    }
}

/// Filter for listing schedules.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScheduleFilter {
    pub only_enabled: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overlap_policy_round_trips() {
        for policy in [OverlapPolicy::Skip, OverlapPolicy::Queue, OverlapPolicy::Replace] {
            assert_eq!(OverlapPolicy::from_str(policy.as_str()), Some(policy));
        }
        assert_eq!(OverlapPolicy::from_str("cancel"), None);
    }

    #[test]
    fn new_schedule_defaults() {
        let next = Utc::now();
        let schedule = Schedule::new(7, "0 * * * *", "UTC", next);
        assert!(schedule.enabled);
        assert_eq!(schedule.max_instances, 1);
        assert_eq!(schedule.overlap_policy, OverlapPolicy::Skip);
        assert_eq!(schedule.run_count, 0);
        assert!(schedule.last_run_at.is_none());
    }

    #[test]
    fn max_instances_floor_is_one() {
        let schedule = Schedule::new(1, "* * * * *", "UTC", Utc::now()).with_max_instances(0);
        assert_eq!(schedule.max_instances, 1);
    }
}
