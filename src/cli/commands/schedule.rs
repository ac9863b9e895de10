//! Schedule CLI commands: create, list, enable/disable, delete, validate.

use std::io::{BufRead, Write};

use anyhow::{Context, Result};
use chrono_tz::Tz;
use serde::Serialize;
use sqlx::SqlitePool;

use crate::adapters::sqlite::SqliteScheduleStore;
use crate::cli::id_resolver::resolve_schedule_id;
use crate::cli::output::{format_ts, output, truncate, CommandOutput};
use crate::cron::CronExpression;
use crate::domain::errors::SchedulerError;
use crate::domain::models::{OverlapPolicy, Schedule, ScheduleFilter};
use crate::services::config::SchedulerConfig;
use crate::services::schedule_service::{
    validate_expression, CreateScheduleOptions, ScheduleService,
};

// -- Output structs --

#[derive(Debug, Serialize)]
pub struct ScheduleOutput {
    pub id: String,
    pub template_task_id: i64,
    pub cron_expression: String,
    pub timezone: String,
    pub enabled: bool,
    pub next_run_at: String,
    pub last_run_at: Option<String>,
    pub run_count: u64,
    pub max_instances: u32,
    pub overlap_policy: String,
    pub last_error: Option<String>,
}

impl From<&Schedule> for ScheduleOutput {
    fn from(s: &Schedule) -> Self {
        Self {
            id: s.id.to_string(),
            template_task_id: s.template_task_id,
            cron_expression: s.cron_expression.clone(),
            timezone: s.timezone.clone(),
            enabled: s.enabled,
            next_run_at: format_ts(s.next_run_at),
            last_run_at: s.last_run_at.map(format_ts),
            run_count: s.run_count,
            max_instances: s.max_instances,
            overlap_policy: s.overlap_policy.as_str().to_string(),
            last_error: s.last_error.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CreateOutput {
    pub schedule: ScheduleOutput,
    pub next_runs: Vec<String>,
}

impl CommandOutput for CreateOutput {
    fn to_human(&self) -> String {
        let mut lines = vec![
            format!(
                "Created schedule {} for task {}",
                self.schedule.id, self.schedule.template_task_id
            ),
            format!(
                "  Cron: {} ({})",
                self.schedule.cron_expression, self.schedule.timezone
            ),
            format!(
                "  Policy: {} (max {} instance(s)), {}",
                self.schedule.overlap_policy,
                self.schedule.max_instances,
                if self.schedule.enabled { "enabled" } else { "disabled" },
            ),
            "  Next firings:".to_string(),
        ];
        for (i, run) in self.next_runs.iter().enumerate() {
            lines.push(format!("    {}. {}", i + 1, run));
        }
        lines.join("\n")
    }
}

#[derive(Debug, Serialize)]
pub struct ScheduleListOutput {
    pub schedules: Vec<ScheduleOutput>,
    pub total: usize,
}

impl CommandOutput for ScheduleListOutput {
    fn to_human(&self) -> String {
        if self.schedules.is_empty() {
            return "No schedules found.".to_string();
        }

        let mut lines = vec![format!("Found {} schedule(s):\n", self.total)];
        lines.push(format!(
            "{:<10} {:<6} {:<9} {:<21} {:<8} {:<6} {:<20} {:<16}",
            "ID", "TASK", "ENABLED", "NEXT RUN", "POLICY", "RUNS", "CRON", "TIMEZONE"
        ));
        lines.push("-".repeat(102));

        for s in &self.schedules {
            lines.push(format!(
                "{:<10} {:<6} {:<9} {:<21} {:<8} {:<6} {:<20} {:<16}",
                &s.id[..8],
                s.template_task_id,
                if s.enabled { "yes" } else { "no" },
                s.next_run_at,
                s.overlap_policy,
                s.run_count,
                truncate(&s.cron_expression, 18),
                truncate(&s.timezone, 14),
            ));
        }

        lines.join("\n")
    }
}

#[derive(Debug, Serialize)]
pub struct ActionOutput {
    pub success: bool,
    pub message: String,
}

impl CommandOutput for ActionOutput {
    fn to_human(&self) -> String {
        self.message.clone()
    }
}

#[derive(Debug, Serialize)]
pub struct ValidateOutput {
    pub expression: String,
    pub timezone: String,
    pub valid: bool,
    pub errors: Vec<String>,
    pub next_runs: Vec<String>,
}

impl CommandOutput for ValidateOutput {
    fn to_human(&self) -> String {
        let mut lines = vec![
            format!("Expression: {}", self.expression),
            format!("Timezone: {}", self.timezone),
            format!("Valid: {}", if self.valid { "yes" } else { "no" }),
        ];
        if !self.errors.is_empty() {
            lines.push("Errors:".to_string());
            for err in &self.errors {
                lines.push(format!("  - {err}"));
            }
        }
        if !self.next_runs.is_empty() {
            lines.push("Next firings (UTC):".to_string());
            for (i, run) in self.next_runs.iter().enumerate() {
                lines.push(format!("  {}. {}", i + 1, run));
            }
        }
        lines.join("\n")
    }
}

// -- Handlers --

#[allow(clippy::too_many_arguments)]
pub async fn handle_create(
    service: &ScheduleService<SqliteScheduleStore>,
    task_id: i64,
    cron: &str,
    timezone: Option<String>,
    disabled: bool,
    max_instances: u32,
    overlap: &str,
    json_mode: bool,
) -> Result<()> {
    let opts = CreateScheduleOptions {
        timezone,
        enabled: if disabled { Some(false) } else { None },
        max_instances: Some(max_instances),
        // clap constrains the value; an unknown policy cannot get this far.
        overlap_policy: OverlapPolicy::from_str(overlap),
    };

    let schedule = service.create(task_id, cron, opts).await?;

    let tz: Tz = schedule
        .timezone
        .parse()
        .map_err(|_| SchedulerError::InvalidTimezone(schedule.timezone.clone()))?;
    let expr = CronExpression::parse(&schedule.cron_expression)?;
    let mut next_runs = vec![format_ts(schedule.next_run_at)];
    for run in expr.preview(schedule.next_run_at, tz, 2)? {
        next_runs.push(format_ts(run));
    }

    let out = CreateOutput {
        schedule: ScheduleOutput::from(&schedule),
        next_runs,
    };
    output(&out, json_mode);
    Ok(())
}

pub async fn handle_list(
    service: &ScheduleService<SqliteScheduleStore>,
    include_disabled: bool,
    json_mode: bool,
) -> Result<()> {
    let schedules = service
        .list(ScheduleFilter {
            only_enabled: !include_disabled,
        })
        .await?;

    let out = ScheduleListOutput {
        total: schedules.len(),
        schedules: schedules.iter().map(ScheduleOutput::from).collect(),
    };
    output(&out, json_mode);
    Ok(())
}

pub async fn handle_toggle(
    service: &ScheduleService<SqliteScheduleStore>,
    pool: &SqlitePool,
    id_or_prefix: &str,
    enabled: bool,
    json_mode: bool,
) -> Result<()> {
    let id = resolve_schedule_id(pool, id_or_prefix).await?;
    let schedule = service.toggle(id, enabled).await?;

    let out = ActionOutput {
        success: true,
        message: format!(
            "Schedule {} {}. Next run: {}",
            schedule.id,
            if enabled { "enabled" } else { "disabled" },
            format_ts(schedule.next_run_at),
        ),
    };
    output(&out, json_mode);
    Ok(())
}

pub async fn handle_delete(
    service: &ScheduleService<SqliteScheduleStore>,
    pool: &SqlitePool,
    id_or_prefix: &str,
    force: bool,
    json_mode: bool,
) -> Result<()> {
    let id = resolve_schedule_id(pool, id_or_prefix).await?;
    let schedule = service.get(id).await?;

    if !force && !confirm_deletion(&schedule)? {
        let out = ActionOutput {
            success: false,
            message: "Deletion cancelled.".to_string(),
        };
        output(&out, json_mode);
        return Ok(());
    }

    service.delete(id).await?;

    let out = ActionOutput {
        success: true,
        message: format!("Schedule {} deleted (instances removed with it).", id),
    };
    output(&out, json_mode);
    Ok(())
}

pub async fn handle_validate(
    scheduler_config: &SchedulerConfig,
    cron: &str,
    timezone: Option<String>,
    json_mode: bool,
) -> Result<()> {
    // The CLI previews 5 firings; the API-level cap is 10.
    let report = validate_expression(
        &scheduler_config.default_timezone,
        cron,
        timezone.as_deref(),
        5,
    );

    let tz_name = timezone.unwrap_or_else(|| scheduler_config.default_timezone.clone());
    let out = ValidateOutput {
        expression: cron.to_string(),
        timezone: tz_name.clone(),
        valid: report.valid,
        errors: report.errors,
        next_runs: report.next_runs.iter().map(|r| format_ts(*r)).collect(),
    };
    output(&out, json_mode);

    if !out.valid {
        // Re-derive the typed error so the process exits with the
        // validation code.
        return match CronExpression::parse(cron) {
            Err(err) => Err(SchedulerError::from(err).into()),
            Ok(_) => Err(SchedulerError::InvalidTimezone(tz_name).into()),
        };
    }
    Ok(())
}

fn confirm_deletion(schedule: &Schedule) -> Result<bool> {
    eprint!(
        "Delete schedule {} ({} in {}) and all of its instances? [y/N] ",
        schedule.id, schedule.cron_expression, schedule.timezone
    );
    std::io::stderr().flush().context("Failed to flush prompt")?;

    let mut answer = String::new();
    std::io::stdin()
        .lock()
        .read_line(&mut answer)
        .context("Failed to read confirmation")?;
    Ok(matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"))
}
