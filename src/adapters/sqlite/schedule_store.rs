//! SQLite adapter for the ScheduleStore port.
//!
//! Materialization correctness rests on two constraints: the UPDATE that
//! advances `next_run_at` carries the previously observed value in its
//! predicate (compare-and-swap), and `task_instances` is unique on
//! (schedule_id, scheduled_for). Either failing means another worker owns
//! the firing, which surfaces as `MaterializationConflict`.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveTime, Utc};
use serde_json::json;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::adapters::sqlite::{fmt_utc, parse_datetime, parse_optional_datetime, parse_uuid};
use crate::domain::errors::{DomainResult, SchedulerError};
use crate::domain::models::{
    InstanceStatus, InstanceStatusCounts, MetricsSnapshot, OverlapPolicy, Schedule,
    ScheduleFilter, ScheduleInstance, TemplateTask, UpcomingFiring,
};
use crate::domain::ports::schedule_store::ScheduleStore;

/// Default bound on a single store operation. On expiry the caller gets a
/// transient `StoreTimeout` and retries at the next tick.
const DEFAULT_OP_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Clone)]
pub struct SqliteScheduleStore {
    pool: SqlitePool,
    op_timeout: Duration,
}

impl SqliteScheduleStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            op_timeout: DEFAULT_OP_TIMEOUT,
        }
    }

    pub fn with_op_timeout(mut self, timeout: Duration) -> Self {
        self.op_timeout = timeout;
        self
    }

    async fn bounded<T>(&self, fut: impl Future<Output = DomainResult<T>> + Send) -> DomainResult<T> {
        match tokio::time::timeout(self.op_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(SchedulerError::StoreTimeout),
        }
    }
}

#[derive(sqlx::FromRow)]
struct ScheduleRow {
    id: String,
    template_task_id: i64,
    cron_expression: String,
    timezone: String,
    enabled: i64,
    next_run_at: String,
    last_run_at: Option<String>,
    run_count: i64,
    max_instances: i64,
    overlap_policy: String,
    last_error: Option<String>,
    created_at: String,
    updated_at: String,
}

fn row_to_schedule(row: ScheduleRow) -> DomainResult<Schedule> {
    Ok(Schedule {
        id: parse_uuid(&row.id)?,
        template_task_id: row.template_task_id,
        cron_expression: row.cron_expression,
        timezone: row.timezone,
        enabled: row.enabled != 0,
        next_run_at: parse_datetime(&row.next_run_at)?,
        last_run_at: parse_optional_datetime(row.last_run_at)?,
        run_count: row.run_count as u64,
        max_instances: row.max_instances as u32,
        overlap_policy: OverlapPolicy::from_str(&row.overlap_policy).unwrap_or_default(),
        last_error: row.last_error,
        created_at: parse_datetime(&row.created_at)?,
        updated_at: parse_datetime(&row.updated_at)?,
    })
}

#[derive(sqlx::FromRow)]
struct InstanceRow {
    id: String,
    schedule_id: String,
    template_task_id: i64,
    instance_task_id: Option<i64>,
    scheduled_for: String,
    status: String,
    started_at: Option<String>,
    completed_at: Option<String>,
    execution_time_ms: Option<i64>,
    error_message: Option<String>,
    created_at: String,
}

fn row_to_instance(row: InstanceRow) -> DomainResult<ScheduleInstance> {
    Ok(ScheduleInstance {
        id: parse_uuid(&row.id)?,
        schedule_id: parse_uuid(&row.schedule_id)?,
        template_task_id: row.template_task_id,
        instance_task_id: row.instance_task_id,
        scheduled_for: parse_datetime(&row.scheduled_for)?,
        status: InstanceStatus::from_str(&row.status).unwrap_or_default(),
        started_at: parse_optional_datetime(row.started_at)?,
        completed_at: parse_optional_datetime(row.completed_at)?,
        execution_time_ms: row.execution_time_ms,
        error_message: row.error_message,
        created_at: parse_datetime(&row.created_at)?,
    })
}

#[derive(sqlx::FromRow)]
struct TemplateRow {
    id: i64,
    task_type: String,
    description: String,
    args: Option<String>,
    metadata: Option<String>,
}

impl From<TemplateRow> for TemplateTask {
    fn from(row: TemplateRow) -> Self {
        Self {
            id: row.id,
            task_type: row.task_type,
            description: row.description,
            args: row.args,
            metadata: row.metadata,
        }
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.message().contains("UNIQUE constraint failed"))
}

/// Merge scheduling annotations into the template's metadata blob. The blob
/// stays opaque everywhere else; an unreadable blob is replaced by a fresh
/// object rather than blocking the firing.
fn annotate_metadata(
    existing: Option<&str>,
    instance_id: Uuid,
    scheduled_for: DateTime<Utc>,
    template_task_id: i64,
) -> String {
    let mut value = match existing {
        Some(raw) if !raw.trim().is_empty() => {
            serde_json::from_str::<serde_json::Value>(raw).unwrap_or_else(|_| json!({}))
        }
        _ => json!({}),
    };
    if !value.is_object() {
        value = json!({});
    }
    if let Some(map) = value.as_object_mut() {
        map.insert("scheduled_instance_id".into(), json!(instance_id.to_string()));
        map.insert("scheduled_at".into(), json!(fmt_utc(scheduled_for)));
        map.insert("template_task_id".into(), json!(template_task_id));
    }
    value.to_string()
}

#[async_trait]
impl ScheduleStore for SqliteScheduleStore {
    async fn create_schedule(&self, schedule: &Schedule) -> DomainResult<()> {
        self.bounded(async {
            let mut tx = self.pool.begin().await?;

            let template: Option<(i64,)> = sqlx::query_as("SELECT id FROM tasks WHERE id = ?")
                .bind(schedule.template_task_id)
                .fetch_optional(&mut *tx)
                .await?;
            if template.is_none() {
                return Err(SchedulerError::TemplateNotFound(schedule.template_task_id));
            }

            sqlx::query(
                "INSERT INTO task_schedules
                 (id, template_task_id, cron_expression, timezone, enabled,
                  next_run_at, last_run_at, run_count, max_instances,
                  overlap_policy, last_error, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            )
            .bind(schedule.id.to_string())
            .bind(schedule.template_task_id)
            .bind(&schedule.cron_expression)
            .bind(&schedule.timezone)
            .bind(i64::from(schedule.enabled))
            .bind(fmt_utc(schedule.next_run_at))
            .bind(schedule.last_run_at.map(fmt_utc))
            .bind(schedule.run_count as i64)
            .bind(i64::from(schedule.max_instances))
            .bind(schedule.overlap_policy.as_str())
            .bind(&schedule.last_error)
            .bind(fmt_utc(schedule.created_at))
            .bind(fmt_utc(schedule.updated_at))
            .execute(&mut *tx)
            .await?;

            sqlx::query(
                "UPDATE tasks SET is_template = 1, cron_expression = ?2, timezone = ?3,
                 schedule_enabled = ?4, next_execution = ?5, updated_at = ?6
                 WHERE id = ?1",
            )
            .bind(schedule.template_task_id)
            .bind(&schedule.cron_expression)
            .bind(&schedule.timezone)
            .bind(i64::from(schedule.enabled))
            .bind(fmt_utc(schedule.next_run_at))
            .bind(fmt_utc(Utc::now()))
            .execute(&mut *tx)
            .await?;

            tx.commit().await?;
            Ok(())
        })
        .await
    }

    async fn get(&self, id: Uuid) -> DomainResult<Option<Schedule>> {
        let row: Option<ScheduleRow> = sqlx::query_as("SELECT * FROM task_schedules WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.map(row_to_schedule).transpose()
    }

    async fn list(&self, filter: ScheduleFilter) -> DomainResult<Vec<Schedule>> {
        let rows: Vec<ScheduleRow> = if filter.only_enabled {
            sqlx::query_as("SELECT * FROM task_schedules WHERE enabled = 1 ORDER BY next_run_at ASC")
                .fetch_all(&self.pool)
                .await?
        } else {
            sqlx::query_as("SELECT * FROM task_schedules ORDER BY next_run_at ASC")
                .fetch_all(&self.pool)
                .await?
        };
        rows.into_iter().map(row_to_schedule).collect()
    }

    async fn list_due(&self, now: DateTime<Utc>, limit: u32) -> DomainResult<Vec<Schedule>> {
        let rows: Vec<ScheduleRow> = sqlx::query_as(
            "SELECT * FROM task_schedules
             WHERE enabled = 1 AND last_error IS NULL AND next_run_at <= ?1
             ORDER BY next_run_at ASC
             LIMIT ?2",
        )
        .bind(fmt_utc(now))
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(row_to_schedule).collect()
    }

    async fn count_live_instances(&self, schedule_id: Uuid) -> DomainResult<u64> {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM task_instances
             WHERE schedule_id = ? AND status IN ('scheduled', 'running')",
        )
        .bind(schedule_id.to_string())
        .fetch_one(&self.pool)
        .await?;
        Ok(count as u64)
    }

    async fn count_all_live_instances(&self) -> DomainResult<u64> {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM task_instances WHERE status IN ('scheduled', 'running')",
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(count as u64)
    }

    async fn get_template(&self, id: i64) -> DomainResult<Option<TemplateTask>> {
        let row: Option<TemplateRow> = sqlx::query_as(
            "SELECT id, type AS task_type, description, args, metadata
             FROM tasks WHERE id = ? AND is_template = 1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(TemplateTask::from))
    }

    async fn materialize(
        &self,
        schedule: &Schedule,
        scheduled_for: DateTime<Utc>,
        new_next_run_at: DateTime<Utc>,
    ) -> DomainResult<(Uuid, i64)> {
        self.bounded(async {
            let now = Utc::now();
            let mut tx = self.pool.begin().await?;

            // Claim the firing. Zero rows affected means another worker
            // advanced next_run_at first.
            let claimed = sqlx::query(
                "UPDATE task_schedules
                 SET next_run_at = ?3, last_run_at = ?4, run_count = run_count + 1, updated_at = ?4
                 WHERE id = ?1 AND next_run_at = ?2",
            )
            .bind(schedule.id.to_string())
            .bind(fmt_utc(schedule.next_run_at))
            .bind(fmt_utc(new_next_run_at))
            .bind(fmt_utc(now))
            .execute(&mut *tx)
            .await?;
            if claimed.rows_affected() == 0 {
                return Err(SchedulerError::MaterializationConflict {
                    schedule_id: schedule.id,
                });
            }

            let template: Option<TemplateRow> = sqlx::query_as(
                "SELECT id, type AS task_type, description, args, metadata
                 FROM tasks WHERE id = ? AND is_template = 1",
            )
            .bind(schedule.template_task_id)
            .fetch_optional(&mut *tx)
            .await?;
            let template = template
                .map(TemplateTask::from)
                .ok_or(SchedulerError::TemplateNotFound(schedule.template_task_id))?;

            let mut instance =
                ScheduleInstance::new(schedule.id, template.id, scheduled_for);
            let metadata =
                annotate_metadata(template.metadata.as_deref(), instance.id, scheduled_for, template.id);

            // Clone the payload into a fresh pending task row.
            let inserted = sqlx::query(
                "INSERT INTO tasks (type, description, status, args, metadata, template_id, created_at, updated_at)
                 VALUES (?1, ?2, 'pending', ?3, ?4, ?5, ?6, ?6)",
            )
            .bind(&template.task_type)
            .bind(&template.description)
            .bind(&template.args)
            .bind(&metadata)
            .bind(template.id)
            .bind(fmt_utc(now))
            .execute(&mut *tx)
            .await?;
            let task_id = inserted.last_insert_rowid();
            instance.instance_task_id = Some(task_id);

            let insert_instance = sqlx::query(
                "INSERT INTO task_instances
                 (id, schedule_id, template_task_id, instance_task_id, scheduled_for, status, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            )
            .bind(instance.id.to_string())
            .bind(instance.schedule_id.to_string())
            .bind(instance.template_task_id)
            .bind(instance.instance_task_id)
            .bind(fmt_utc(instance.scheduled_for))
            .bind(instance.status.as_str())
            .bind(fmt_utc(instance.created_at))
            .execute(&mut *tx)
            .await;
            if let Err(err) = insert_instance {
                // The (schedule_id, scheduled_for) index makes retries of the
                // same firing idempotent.
                if is_unique_violation(&err) {
                    return Err(SchedulerError::MaterializationConflict {
                        schedule_id: schedule.id,
                    });
                }
                return Err(err.into());
            }

            sqlx::query(
                "UPDATE tasks
                 SET next_execution = ?2, last_execution = ?3, execution_count = execution_count + 1, updated_at = ?3
                 WHERE id = ?1",
            )
            .bind(template.id)
            .bind(fmt_utc(new_next_run_at))
            .bind(fmt_utc(now))
            .execute(&mut *tx)
            .await?;

            tx.commit().await?;
            Ok((instance.id, task_id))
        })
        .await
    }

    async fn advance_next_only(
        &self,
        schedule_id: Uuid,
        observed_next_run_at: DateTime<Utc>,
        new_next_run_at: DateTime<Utc>,
    ) -> DomainResult<()> {
        self.bounded(async {
            let mut tx = self.pool.begin().await?;

            let claimed = sqlx::query(
                "UPDATE task_schedules SET next_run_at = ?3, updated_at = ?4
                 WHERE id = ?1 AND next_run_at = ?2",
            )
            .bind(schedule_id.to_string())
            .bind(fmt_utc(observed_next_run_at))
            .bind(fmt_utc(new_next_run_at))
            .bind(fmt_utc(Utc::now()))
            .execute(&mut *tx)
            .await?;
            if claimed.rows_affected() == 0 {
                return Err(SchedulerError::MaterializationConflict { schedule_id });
            }

            sqlx::query(
                "UPDATE tasks SET next_execution = ?2
                 WHERE id = (SELECT template_task_id FROM task_schedules WHERE id = ?1)",
            )
            .bind(schedule_id.to_string())
            .bind(fmt_utc(new_next_run_at))
            .execute(&mut *tx)
            .await?;

            tx.commit().await?;
            Ok(())
        })
        .await
    }

    async fn transition_to_replace(&self, schedule_id: Uuid) -> DomainResult<Vec<Uuid>> {
        self.bounded(async {
            let now = fmt_utc(Utc::now());
            let mut tx = self.pool.begin().await?;

            let live: Vec<(String, Option<i64>)> = sqlx::query_as(
                "SELECT id, instance_task_id FROM task_instances
                 WHERE schedule_id = ?1 AND status IN ('scheduled', 'running')",
            )
            .bind(schedule_id.to_string())
            .fetch_all(&mut *tx)
            .await?;

            sqlx::query(
                "UPDATE task_instances SET status = 'skipped', completed_at = ?2
                 WHERE schedule_id = ?1 AND status IN ('scheduled', 'running')",
            )
            .bind(schedule_id.to_string())
            .bind(&now)
            .execute(&mut *tx)
            .await?;

            // Tombstone pending task rows. Rows already running are left for
            // the executor to observe the skip.
            for (_, task_id) in &live {
                if let Some(task_id) = task_id {
                    sqlx::query(
                        "UPDATE tasks SET status = 'cancelled', updated_at = ?2
                         WHERE id = ?1 AND status = 'pending'",
                    )
                    .bind(task_id)
                    .bind(&now)
                    .execute(&mut *tx)
                    .await?;
                }
            }

            tx.commit().await?;
            live.iter().map(|(id, _)| parse_uuid(id)).collect()
        })
        .await
    }

    async fn toggle(&self, schedule_id: Uuid, enabled: bool) -> DomainResult<Schedule> {
        self.bounded(async {
            let mut tx = self.pool.begin().await?;

            let updated = sqlx::query(
                "UPDATE task_schedules SET enabled = ?2, updated_at = ?3 WHERE id = ?1",
            )
            .bind(schedule_id.to_string())
            .bind(i64::from(enabled))
            .bind(fmt_utc(Utc::now()))
            .execute(&mut *tx)
            .await?;
            if updated.rows_affected() == 0 {
                return Err(SchedulerError::ScheduleNotFound(schedule_id));
            }

            sqlx::query(
                "UPDATE tasks SET schedule_enabled = ?2
                 WHERE id = (SELECT template_task_id FROM task_schedules WHERE id = ?1)",
            )
            .bind(schedule_id.to_string())
            .bind(i64::from(enabled))
            .execute(&mut *tx)
            .await?;

            tx.commit().await?;
            Ok(())
        })
        .await?;

        self.get(schedule_id)
            .await?
            .ok_or(SchedulerError::ScheduleNotFound(schedule_id))
    }

    async fn delete(&self, schedule_id: Uuid) -> DomainResult<()> {
        self.bounded(async {
            let mut tx = self.pool.begin().await?;

            let template: Option<(i64,)> = sqlx::query_as(
                "SELECT template_task_id FROM task_schedules WHERE id = ?",
            )
            .bind(schedule_id.to_string())
            .fetch_optional(&mut *tx)
            .await?;
            let Some((template_task_id,)) = template else {
                return Err(SchedulerError::ScheduleNotFound(schedule_id));
            };

            // Instances go with the schedule via ON DELETE CASCADE.
            sqlx::query("DELETE FROM task_schedules WHERE id = ?")
                .bind(schedule_id.to_string())
                .execute(&mut *tx)
                .await?;

            let (remaining,): (i64,) = sqlx::query_as(
                "SELECT COUNT(*) FROM task_schedules WHERE template_task_id = ?",
            )
            .bind(template_task_id)
            .fetch_one(&mut *tx)
            .await?;
            if remaining == 0 {
                sqlx::query(
                    "UPDATE tasks SET schedule_enabled = 0, cron_expression = NULL,
                     timezone = NULL, next_execution = NULL, updated_at = ?2
                     WHERE id = ?1",
                )
                .bind(template_task_id)
                .bind(fmt_utc(Utc::now()))
                .execute(&mut *tx)
                .await?;
            }

            tx.commit().await?;
            Ok(())
        })
        .await
    }

    async fn mark_schedule_error(&self, schedule_id: Uuid, message: &str) -> DomainResult<()> {
        let updated = sqlx::query(
            "UPDATE task_schedules SET last_error = ?2, updated_at = ?3 WHERE id = ?1",
        )
        .bind(schedule_id.to_string())
        .bind(message)
        .bind(fmt_utc(Utc::now()))
        .execute(&self.pool)
        .await?;
        if updated.rows_affected() == 0 {
            return Err(SchedulerError::ScheduleNotFound(schedule_id));
        }
        Ok(())
    }

    async fn purge_terminal_instances(&self, cutoff: DateTime<Utc>) -> DomainResult<u64> {
        let purged = sqlx::query(
            "DELETE FROM task_instances
             WHERE status IN ('completed', 'failed', 'skipped') AND created_at < ?",
        )
        .bind(fmt_utc(cutoff))
        .execute(&self.pool)
        .await?;
        Ok(purged.rows_affected())
    }

    async fn metrics_snapshot(&self, now: DateTime<Utc>) -> DomainResult<MetricsSnapshot> {
        self.bounded(async {
            let (total_schedules,): (i64,) =
                sqlx::query_as("SELECT COUNT(*) FROM task_schedules")
                    .fetch_one(&self.pool)
                    .await?;
            let (enabled_schedules,): (i64,) =
                sqlx::query_as("SELECT COUNT(*) FROM task_schedules WHERE enabled = 1")
                    .fetch_one(&self.pool)
                    .await?;

            let day_start = now.date_naive().and_time(NaiveTime::MIN).and_utc();
            let today: Vec<(String, i64)> = sqlx::query_as(
                "SELECT status, COUNT(*) FROM task_instances
                 WHERE created_at >= ? GROUP BY status",
            )
            .bind(fmt_utc(day_start))
            .fetch_all(&self.pool)
            .await?;

            let mut instances_today = InstanceStatusCounts::default();
            for (status, count) in today {
                let count = count as u64;
                match InstanceStatus::from_str(&status) {
                    Some(InstanceStatus::Scheduled) => instances_today.scheduled = count,
                    Some(InstanceStatus::Running) => instances_today.running = count,
                    Some(InstanceStatus::Completed) => instances_today.completed = count,
                    Some(InstanceStatus::Failed) => instances_today.failed = count,
                    Some(InstanceStatus::Skipped) => instances_today.skipped = count,
                    None => {}
                }
            }

            let (live_scheduled,): (i64,) = sqlx::query_as(
                "SELECT COUNT(*) FROM task_instances WHERE status = 'scheduled'",
            )
            .fetch_one(&self.pool)
            .await?;
            let (live_running,): (i64,) = sqlx::query_as(
                "SELECT COUNT(*) FROM task_instances WHERE status = 'running'",
            )
            .fetch_one(&self.pool)
            .await?;

            let upcoming_rows: Vec<(String, String, String, String)> = sqlx::query_as(
                "SELECT id, cron_expression, timezone, next_run_at FROM task_schedules
                 WHERE enabled = 1 AND last_error IS NULL
                 ORDER BY next_run_at ASC LIMIT 10",
            )
            .fetch_all(&self.pool)
            .await?;
            let mut upcoming = Vec::with_capacity(upcoming_rows.len());
            for (id, cron_expression, timezone, next_run_at) in upcoming_rows {
                upcoming.push(UpcomingFiring {
                    schedule_id: parse_uuid(&id)?,
                    cron_expression,
                    timezone,
                    next_run_at: parse_datetime(&next_run_at)?,
                });
            }

            Ok(MetricsSnapshot {
                taken_at: now,
                total_schedules: total_schedules as u64,
                enabled_schedules: enabled_schedules as u64,
                instances_today,
                live_scheduled: live_scheduled as u64,
                live_running: live_running as u64,
                upcoming,
            })
        })
        .await
    }

    async fn get_instance(&self, id: Uuid) -> DomainResult<Option<ScheduleInstance>> {
        let row: Option<InstanceRow> = sqlx::query_as("SELECT * FROM task_instances WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.map(row_to_instance).transpose()
    }

    async fn list_instances(&self, schedule_id: Uuid) -> DomainResult<Vec<ScheduleInstance>> {
        let rows: Vec<InstanceRow> = sqlx::query_as(
            "SELECT * FROM task_instances WHERE schedule_id = ? ORDER BY created_at DESC",
        )
        .bind(schedule_id.to_string())
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(row_to_instance).collect()
    }
}
