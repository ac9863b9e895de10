//! Metrics snapshot command.

use anyhow::Result;
use serde::Serialize;

use crate::adapters::sqlite::SqliteScheduleStore;
use crate::cli::output::{format_ts, output, CommandOutput};
use crate::domain::models::MetricsSnapshot;
use crate::services::metrics::MetricsService;

#[derive(Debug, Serialize)]
pub struct MetricsOutput {
    pub snapshot: MetricsSnapshot,
}

impl CommandOutput for MetricsOutput {
    fn to_human(&self) -> String {
        let s = &self.snapshot;
        let t = &s.instances_today;
        let mut lines = vec![
            format!("Metrics at {}", format_ts(s.taken_at)),
            String::new(),
            format!("Schedules: {} total, {} enabled", s.total_schedules, s.enabled_schedules),
            format!("Live instances: {} scheduled, {} running", s.live_scheduled, s.live_running),
            format!(
                "Today (UTC): {} scheduled, {} running, {} completed, {} failed, {} skipped",
                t.scheduled, t.running, t.completed, t.failed, t.skipped
            ),
        ];

        if s.upcoming.is_empty() {
            lines.push("No upcoming firings.".to_string());
        } else {
            lines.push(String::new());
            lines.push("Upcoming firings:".to_string());
            for firing in &s.upcoming {
                lines.push(format!(
                    "  {}  {:<10}  {} ({})",
                    format_ts(firing.next_run_at),
                    &firing.schedule_id.to_string()[..8],
                    firing.cron_expression,
                    firing.timezone,
                ));
            }
        }

        lines.join("\n")
    }
}

pub async fn handle_metrics(
    service: &MetricsService<SqliteScheduleStore>,
    json_mode: bool,
) -> Result<()> {
    let snapshot = service.snapshot().await?;
    output(&MetricsOutput { snapshot }, json_mode);
    Ok(())
}
