//! Read models for the metrics snapshot.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Instance counts keyed by status.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct InstanceStatusCounts {
    pub scheduled: u64,
    pub running: u64,
    pub completed: u64,
    pub failed: u64,
    pub skipped: u64,
}

/// One upcoming firing across the enabled schedules.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpcomingFiring {
    pub schedule_id: Uuid,
    pub cron_expression: String,
    pub timezone: String,
    pub next_run_at: DateTime<Utc>,
}

/// Point-in-time aggregate over schedules and instances. Producing one
/// never mutates anything.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub taken_at: DateTime<Utc>,
    pub total_schedules: u64,
    pub enabled_schedules: u64,
    /// Instances materialized during the current UTC calendar day.
    pub instances_today: InstanceStatusCounts,
    /// Live instances across all schedules, regardless of day.
    pub live_scheduled: u64,
    pub live_running: u64,
    /// The next firings (at most 10), ascending.
    pub upcoming: Vec<UpcomingFiring>,
}
