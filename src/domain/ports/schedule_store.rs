//! Repository port for schedule and instance persistence.
//!
//! The store is the single owner of the `task_schedules`, `task_instances`,
//! and (for annotation purposes) `tasks` tables. Callers hold identifiers
//! and ask the store for joined reads; no other module touches payload
//! blobs or annotation columns.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::{
    MetricsSnapshot, Schedule, ScheduleFilter, ScheduleInstance, TemplateTask,
};

#[async_trait]
pub trait ScheduleStore: Send + Sync {
    /// Insert a schedule and stamp the template's annotation columns in one
    /// transaction. Fails with `TemplateNotFound` if the template row does
    /// not exist.
    async fn create_schedule(&self, schedule: &Schedule) -> DomainResult<()>;

    /// Get a schedule by ID.
    async fn get(&self, id: Uuid) -> DomainResult<Option<Schedule>>;

    /// List schedules, soonest firing first.
    async fn list(&self, filter: ScheduleFilter) -> DomainResult<Vec<Schedule>>;

    /// Enabled, non-errored schedules with `next_run_at <= now`, ascending,
    /// bounded by `limit`.
    async fn list_due(&self, now: DateTime<Utc>, limit: u32) -> DomainResult<Vec<Schedule>>;

    /// Count instances in a live state (scheduled or running) for one
    /// schedule.
    async fn count_live_instances(&self, schedule_id: Uuid) -> DomainResult<u64>;

    /// Count live instances across every schedule.
    async fn count_all_live_instances(&self) -> DomainResult<u64>;

    /// Fetch a template task row (must be flagged as a template).
    async fn get_template(&self, id: i64) -> DomainResult<Option<TemplateTask>>;

    /// Materialize one firing in a single transaction: claim the firing via
    /// compare-and-swap on `next_run_at` (the caller's observed value in
    /// `schedule.next_run_at`), clone the template payload into a new
    /// `pending` task row, insert the instance linked to it, and mirror the
    /// template's annotation columns. Returns the new instance and task
    /// ids. Losing the claim yields `MaterializationConflict`.
    async fn materialize(
        &self,
        schedule: &Schedule,
        scheduled_for: DateTime<Utc>,
        new_next_run_at: DateTime<Utc>,
    ) -> DomainResult<(Uuid, i64)>;

    /// Advance `next_run_at` without materializing (overlap policy `skip`
    /// declined the firing). Uses the same compare-and-swap claim as
    /// `materialize`.
    async fn advance_next_only(
        &self,
        schedule_id: Uuid,
        observed_next_run_at: DateTime<Utc>,
        new_next_run_at: DateTime<Utc>,
    ) -> DomainResult<()>;

    /// Transition every live instance of a schedule to `skipped` and cancel
    /// their pending task rows. Returns the affected instance ids.
    async fn transition_to_replace(&self, schedule_id: Uuid) -> DomainResult<Vec<Uuid>>;

    /// Flip `enabled`; `next_run_at` is left untouched.
    async fn toggle(&self, schedule_id: Uuid, enabled: bool) -> DomainResult<Schedule>;

    /// Delete a schedule; instances cascade away with it.
    async fn delete(&self, schedule_id: Uuid) -> DomainResult<()>;

    /// Record that the stored row can no longer be interpreted. An errored
    /// schedule is excluded from `list_due`.
    async fn mark_schedule_error(&self, schedule_id: Uuid, message: &str) -> DomainResult<()>;

    /// Remove terminal instances older than `cutoff`. Returns how many rows
    /// were purged.
    async fn purge_terminal_instances(&self, cutoff: DateTime<Utc>) -> DomainResult<u64>;

    /// Read-only aggregate for dashboards.
    async fn metrics_snapshot(&self, now: DateTime<Utc>) -> DomainResult<MetricsSnapshot>;

    /// Get an instance by ID.
    async fn get_instance(&self, id: Uuid) -> DomainResult<Option<ScheduleInstance>>;

    /// All instances of a schedule, newest first.
    async fn list_instances(&self, schedule_id: Uuid) -> DomainResult<Vec<ScheduleInstance>>;
}
