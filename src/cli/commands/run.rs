//! Foreground scheduler loop command.

use std::sync::Arc;

use anyhow::{Context, Result};

use crate::adapters::sqlite::SqliteScheduleStore;
use crate::domain::ports::ScheduleStore;
use crate::services::config::SchedulerConfig;
use crate::services::scheduler_loop::SchedulerLoop;

/// Run the scheduler loop until Ctrl-C. Any in-flight materialization
/// transaction completes before the process exits.
pub async fn handle_run(store: Arc<SqliteScheduleStore>, config: SchedulerConfig) -> Result<()> {
    let live = store.count_all_live_instances().await?;
    tracing::info!(
        live_instances = live,
        check_interval_secs = config.check_interval_secs,
        "starting scheduler"
    );

    let scheduler = SchedulerLoop::new(store, config);
    let handle = scheduler.start();

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    tracing::info!("shutdown signal received; finishing in-flight work");

    scheduler.stop();
    handle.await.context("Scheduler loop panicked")?;
    Ok(())
}
