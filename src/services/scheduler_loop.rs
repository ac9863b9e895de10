//! Periodic scheduler loop.
//!
//! Turns "time passed" into "instances materialized": every tick it fetches
//! due schedules, applies the overlap-policy decision, and executes the
//! outcome against the store. One schedule failing never aborts the batch,
//! and a lost materialization race is silently abandoned; the winner has
//! already advanced `next_run_at`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use tokio::sync::Notify;
use uuid::Uuid;

use crate::cron::CronExpression;
use crate::domain::errors::{DomainResult, SchedulerError};
use crate::domain::models::Schedule;
use crate::domain::ports::ScheduleStore;
use crate::services::config::SchedulerConfig;
use crate::services::overlap::{decide, OverlapAction};

/// Counters for one tick. Surfaced in logs and asserted on in tests.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TickSummary {
    pub due: usize,
    pub materialized: usize,
    /// Skip-policy declines that only advanced `next_run_at`.
    pub advanced: usize,
    /// Firings that retired live instances before materializing.
    pub replaced: usize,
    /// Firings abandoned because another worker claimed them.
    pub conflicts: usize,
    /// Firings deferred without state change (global ceiling, look-ahead).
    pub deferred: usize,
    pub errors: usize,
}

enum FireOutcome {
    Materialized { instance_id: Uuid, task_id: i64 },
    Advanced,
    Replaced { retired: usize },
    Deferred,
}

pub struct SchedulerLoop<S: ScheduleStore + 'static> {
    store: Arc<S>,
    config: SchedulerConfig,
    running: Arc<AtomicBool>,
    wake: Arc<Notify>,
}

impl<S: ScheduleStore + 'static> SchedulerLoop<S> {
    pub fn new(store: Arc<S>, config: SchedulerConfig) -> Self {
        Self {
            store,
            config,
            running: Arc::new(AtomicBool::new(false)),
            wake: Arc::new(Notify::new()),
        }
    }

    /// Start the tick loop. Returns a JoinHandle that resolves once the
    /// loop has observed `stop()` and finished its in-flight tick.
    pub fn start(&self) -> tokio::task::JoinHandle<()> {
        self.running.store(true, Ordering::SeqCst);

        let this = Self {
            store: self.store.clone(),
            config: self.config.clone(),
            running: self.running.clone(),
            wake: self.wake.clone(),
        };

        tokio::spawn(async move {
            let mut tick_count: u64 = 0;
            tracing::info!(
                interval_secs = this.config.check_interval_secs,
                "scheduler loop started"
            );

            while this.running.load(Ordering::SeqCst) {
                tick_count += 1;
                let summary = this.tick(Utc::now()).await;
                if summary.due > 0 {
                    tracing::debug!(?summary, "tick complete");
                }

                if tick_count % this.config.cleanup_every_ticks.max(1) == 0 {
                    this.cleanup(Utc::now()).await;
                }

                tokio::select! {
                    () = this.wake.notified() => {}
                    () = tokio::time::sleep(this.config.check_interval()) => {}
                }
            }

            tracing::info!("scheduler loop stopped");
        })
    }

    /// Stop after the in-flight tick completes.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.wake.notify_waiters();
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// One pass over the due schedules, soonest first. Public so embedding
    /// hosts and tests can drive ticks deterministically.
    pub async fn tick(&self, now: DateTime<Utc>) -> TickSummary {
        let mut summary = TickSummary::default();

        let due = match self.store.list_due(now, self.config.batch_size).await {
            Ok(due) => due,
            Err(err) => {
                tracing::warn!(error = %err, "failed to fetch due schedules");
                summary.errors += 1;
                return summary;
            }
        };
        summary.due = due.len();

        for schedule in due {
            match self.fire(&schedule, now).await {
                Ok(FireOutcome::Materialized { instance_id, task_id }) => {
                    summary.materialized += 1;
                    tracing::info!(
                        schedule_id = %schedule.id,
                        instance_id = %instance_id,
                        task_id,
                        scheduled_for = %schedule.next_run_at,
                        "instance materialized"
                    );
                }
                Ok(FireOutcome::Advanced) => {
                    summary.advanced += 1;
                    tracing::info!(
                        schedule_id = %schedule.id,
                        "firing skipped at capacity; schedule advanced"
                    );
                }
                Ok(FireOutcome::Replaced { retired }) => {
                    summary.materialized += 1;
                    summary.replaced += 1;
                    tracing::info!(
                        schedule_id = %schedule.id,
                        retired,
                        "live instances replaced by new firing"
                    );
                }
                Ok(FireOutcome::Deferred) => summary.deferred += 1,
                Err(SchedulerError::MaterializationConflict { .. }) => {
                    // Another loop won the race; its transaction already
                    // advanced the schedule. Nothing to retry.
                    summary.conflicts += 1;
                    tracing::debug!(schedule_id = %schedule.id, "lost firing race; abandoned");
                }
                Err(err) => {
                    // next_run_at is untouched, so the next tick retries.
                    summary.errors += 1;
                    tracing::warn!(
                        schedule_id = %schedule.id,
                        error = %err,
                        transient = err.is_transient(),
                        "firing failed; schedule left for retry"
                    );
                }
            }
        }

        summary
    }

    async fn fire(&self, schedule: &Schedule, now: DateTime<Utc>) -> DomainResult<FireOutcome> {
        let expr = match CronExpression::parse(&schedule.cron_expression) {
            Ok(expr) => expr,
            Err(err) => return self.quarantine(schedule.id, &err.to_string()).await,
        };
        let tz: Tz = match schedule.timezone.parse() {
            Ok(tz) => tz,
            Err(_) => {
                let detail = format!("unknown timezone '{}'", schedule.timezone);
                return self.quarantine(schedule.id, &detail).await;
            }
        };

        // Catch-up coalescing: the advance is computed from now, so firings
        // missed during downtime collapse into this one.
        let new_next = match expr.next_after_within(now, tz, self.config.max_lookahead()) {
            Ok(next) => next,
            Err(err) => {
                tracing::debug!(
                    schedule_id = %schedule.id,
                    error = %err,
                    "next firing beyond look-ahead horizon; deferring"
                );
                return Ok(FireOutcome::Deferred);
            }
        };

        let global_live = self.store.count_all_live_instances().await?;
        if global_live >= u64::from(self.config.max_concurrent_instances) {
            tracing::warn!(
                live = global_live,
                ceiling = self.config.max_concurrent_instances,
                "global live-instance ceiling reached; deferring firing"
            );
            return Ok(FireOutcome::Deferred);
        }

        let live = self.store.count_live_instances(schedule.id).await?;
        match decide(schedule.overlap_policy, live, schedule.max_instances) {
            OverlapAction::DoNothingAdvance => {
                self.store
                    .advance_next_only(schedule.id, schedule.next_run_at, new_next)
                    .await?;
                Ok(FireOutcome::Advanced)
            }
            OverlapAction::Materialize => {
                let (instance_id, task_id) = self
                    .store
                    .materialize(schedule, schedule.next_run_at, new_next)
                    .await?;
                Ok(FireOutcome::Materialized { instance_id, task_id })
            }
            OverlapAction::ReplaceThenMaterialize => {
                let retired = self.store.transition_to_replace(schedule.id).await?;
                self.store
                    .materialize(schedule, schedule.next_run_at, new_next)
                    .await?;
                Ok(FireOutcome::Replaced { retired: retired.len() })
            }
        }
    }

    /// A stored row that can no longer be interpreted is marked in error and
    /// excluded from future firings; the loop itself keeps going.
    async fn quarantine(&self, schedule_id: Uuid, detail: &str) -> DomainResult<FireOutcome> {
        tracing::error!(schedule_id = %schedule_id, detail, "schedule row is corrupt; marking in error");
        self.store.mark_schedule_error(schedule_id, detail).await?;
        Err(SchedulerError::StoreCorruption {
            schedule_id,
            detail: detail.to_string(),
        })
    }

    /// Retention sweep for terminal instance rows.
    async fn cleanup(&self, now: DateTime<Utc>) {
        let cutoff = now - self.config.cleanup_older_than();
        match self.store.purge_terminal_instances(cutoff).await {
            Ok(0) => {}
            Ok(purged) => tracing::info!(purged, "purged old terminal instances"),
            Err(err) => tracing::warn!(error = %err, "instance cleanup failed"),
        }
    }
}
