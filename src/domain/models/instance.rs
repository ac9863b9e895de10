//! Schedule instance domain model.
//!
//! An instance tracks one firing's lifecycle. The scheduler creates it in
//! `scheduled`; the external executor drives it through `running` to
//! `completed` or `failed`; overlap-policy enforcement may short-circuit it
//! to `skipped`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Status of a materialized instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceStatus {
    /// Materialized; waiting for the executor to pick it up.
    Scheduled,
    /// The executor is running the linked task.
    Running,
    /// Finished successfully.
    Completed,
    /// Finished with an error.
    Failed,
    /// Retired by overlap-policy enforcement before (or during) execution.
    Skipped,
}

impl Default for InstanceStatus {
    fn default() -> Self {
        Self::Scheduled
    }
}

impl InstanceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Scheduled => "scheduled",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "scheduled" => Some(Self::Scheduled),
            "running" => Some(Self::Running),
            "completed" | "complete" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "skipped" => Some(Self::Skipped),
            _ => None,
        }
    }

    /// Terminal states admit no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Skipped)
    }

    /// Live states count against a schedule's `max_instances`.
    pub fn is_live(&self) -> bool {
        matches!(self, Self::Scheduled | Self::Running)
    }

    /// Valid transitions from this status.
    pub fn valid_transitions(&self) -> &'static [InstanceStatus] {
        match self {
            Self::Scheduled => &[Self::Running, Self::Skipped],
            Self::Running => &[Self::Completed, Self::Failed, Self::Skipped],
            Self::Completed | Self::Failed | Self::Skipped => &[],
        }
    }

    pub fn can_transition_to(&self, new_status: Self) -> bool {
        self.valid_transitions().contains(&new_status)
    }
}

/// One materialization of a schedule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleInstance {
    pub id: Uuid,
    pub schedule_id: Uuid,
    /// Redundant pointer for lookup without a join.
    pub template_task_id: i64,
    /// The cloned task row on the queue; set inside the materialization
    /// transaction.
    pub instance_task_id: Option<i64>,
    /// The firing window this instance serves, UTC.
    pub scheduled_for: DateTime<Utc>,
    pub status: InstanceStatus,
    // Execution-time observations; written by the executor, never by the
    // scheduler.
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub execution_time_ms: Option<i64>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl ScheduleInstance {
    pub fn new(schedule_id: Uuid, template_task_id: i64, scheduled_for: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            schedule_id,
            template_task_id,
            instance_task_id: None,
            scheduled_for,
            status: InstanceStatus::Scheduled,
            started_at: None,
            completed_at: None,
            execution_time_ms: None,
            error_message: None,
            created_at: Utc::now(),
        }
    }
}
