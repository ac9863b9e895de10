//! Management service for schedules.
//!
//! Validates inputs, delegates cron parsing to the expression engine and
//! persistence to the store. Used by the CLI and by embedding hosts.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::Serialize;
use uuid::Uuid;

use crate::cron::CronExpression;
use crate::domain::errors::{DomainResult, SchedulerError};
use crate::domain::models::{OverlapPolicy, Schedule, ScheduleFilter};
use crate::domain::ports::ScheduleStore;
use crate::services::config::SchedulerConfig;

/// Options for creating a schedule; unset fields fall back to configuration.
#[derive(Debug, Default, Clone)]
pub struct CreateScheduleOptions {
    pub timezone: Option<String>,
    pub enabled: Option<bool>,
    pub max_instances: Option<u32>,
    pub overlap_policy: Option<OverlapPolicy>,
}

/// Outcome of validating an expression without touching the store.
#[derive(Debug, Clone, Serialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: Vec<String>,
    pub next_runs: Vec<DateTime<Utc>>,
}

/// Pure validation: parse the expression, resolve the zone (falling back to
/// `default_timezone`), and compute up to `count` (<= 10) upcoming firings.
pub fn validate_expression(
    default_timezone: &str,
    cron_text: &str,
    timezone: Option<&str>,
    count: usize,
) -> ValidationReport {
    let mut errors = Vec::new();

    let expr = match CronExpression::parse(cron_text) {
        Ok(expr) => Some(expr),
        Err(err) => {
            errors.push(err.to_string());
            None
        }
    };

    let tz_name = timezone.unwrap_or(default_timezone);
    let tz: Option<Tz> = match tz_name.parse() {
        Ok(tz) => Some(tz),
        Err(_) => {
            errors.push(SchedulerError::InvalidTimezone(tz_name.to_string()).to_string());
            None
        }
    };

    let next_runs = match (expr, tz) {
        (Some(expr), Some(tz)) => match expr.preview(Utc::now(), tz, count) {
            Ok(runs) => runs,
            Err(err) => {
                errors.push(err.to_string());
                Vec::new()
            }
        },
        _ => Vec::new(),
    };

    ValidationReport {
        valid: errors.is_empty(),
        errors,
        next_runs,
    }
}

pub struct ScheduleService<S: ScheduleStore> {
    store: Arc<S>,
    config: SchedulerConfig,
}

impl<S: ScheduleStore> ScheduleService<S> {
    pub fn new(store: Arc<S>, config: SchedulerConfig) -> Self {
        Self { store, config }
    }

    fn resolve_timezone(&self, timezone: Option<&str>) -> DomainResult<(String, Tz)> {
        let name = timezone.unwrap_or(&self.config.default_timezone);
        let tz = name
            .parse()
            .map_err(|_| SchedulerError::InvalidTimezone(name.to_string()))?;
        Ok((name.to_string(), tz))
    }

    /// Validate the expression and timezone, compute the first firing, and
    /// persist the schedule (annotating the template row in the same
    /// transaction).
    pub async fn create(
        &self,
        template_task_id: i64,
        cron_text: &str,
        opts: CreateScheduleOptions,
    ) -> DomainResult<Schedule> {
        let expr = CronExpression::parse(cron_text)?;
        let (tz_name, tz) = self.resolve_timezone(opts.timezone.as_deref())?;
        let first_next_run_at = expr.next_after(Utc::now(), tz)?;

        let schedule = Schedule::new(template_task_id, expr.source(), tz_name, first_next_run_at)
            .with_enabled(opts.enabled.unwrap_or(self.config.enabled_by_default))
            .with_max_instances(opts.max_instances.unwrap_or(1))
            .with_overlap_policy(opts.overlap_policy.unwrap_or_default());

        self.store.create_schedule(&schedule).await?;
        tracing::info!(
            schedule_id = %schedule.id,
            template_task_id,
            cron = %schedule.cron_expression,
            timezone = %schedule.timezone,
            "schedule created"
        );
        Ok(schedule)
    }

    /// Pure validation against this service's configured default timezone.
    /// Never touches the store.
    pub fn validate(&self, cron_text: &str, timezone: Option<&str>, count: usize) -> ValidationReport {
        validate_expression(&self.config.default_timezone, cron_text, timezone, count)
    }

    pub async fn get(&self, id: Uuid) -> DomainResult<Schedule> {
        self.store
            .get(id)
            .await?
            .ok_or(SchedulerError::ScheduleNotFound(id))
    }

    pub async fn list(&self, filter: ScheduleFilter) -> DomainResult<Vec<Schedule>> {
        self.store.list(filter).await
    }

    /// Enable or disable; takes effect at the next tick boundary and leaves
    /// `next_run_at` unchanged.
    pub async fn toggle(&self, id: Uuid, enabled: bool) -> DomainResult<Schedule> {
        let schedule = self.store.toggle(id, enabled).await?;
        tracing::info!(schedule_id = %id, enabled, "schedule toggled");
        Ok(schedule)
    }

    /// Delete a schedule and, by cascade, all of its instances. A running
    /// instance's task is not aborted; it simply loses its history row.
    pub async fn delete(&self, id: Uuid) -> DomainResult<()> {
        self.store.delete(id).await?;
        tracing::info!(schedule_id = %id, "schedule deleted");
        Ok(())
    }
}
