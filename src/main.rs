//! Metronome CLI entry point

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;

use metronome::adapters::sqlite::{initialize_database, SqliteScheduleStore};
use metronome::cli::commands::{metrics, run, schedule, Cli, Commands};
use metronome::domain::errors::SchedulerError;
use metronome::services::config::ConfigLoader;
use metronome::services::logging::init_tracing;
use metronome::services::metrics::MetricsService;
use metronome::services::schedule_service::ScheduleService;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match dispatch(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err:#}");
            exit_code_for(&err)
        }
    }
}

/// 2 for validation failures, 1 for operational ones. (clap itself exits
/// with 2 on usage errors, before we get here.)
fn exit_code_for(err: &anyhow::Error) -> ExitCode {
    match err.downcast_ref::<SchedulerError>() {
        Some(domain_err) if domain_err.is_validation() => ExitCode::from(2),
        _ => ExitCode::from(1),
    }
}

async fn dispatch(cli: Cli) -> anyhow::Result<()> {
    let config = ConfigLoader::load().context("Failed to load configuration")?;
    init_tracing(&config.logging);

    // validate is pure; it never needs the database.
    if let Commands::Validate { cron, timezone } = &cli.command {
        return schedule::handle_validate(&config.scheduler, cron, timezone.clone(), cli.json)
            .await;
    }

    let database_url = format!("sqlite:{}", config.database.path);
    let pool = initialize_database(&database_url)
        .await
        .context("Failed to initialize database")?;

    let store = Arc::new(SqliteScheduleStore::new(pool.clone()));
    let service = ScheduleService::new(store.clone(), config.scheduler.clone());

    match cli.command {
        Commands::Create {
            task_id,
            cron,
            timezone,
            disabled,
            max_instances,
            overlap,
        } => {
            schedule::handle_create(
                &service,
                task_id,
                &cron,
                timezone,
                disabled,
                max_instances,
                &overlap,
                cli.json,
            )
            .await
        }
        Commands::List { all } => schedule::handle_list(&service, all, cli.json).await,
        Commands::Enable { schedule_id } => {
            schedule::handle_toggle(&service, &pool, &schedule_id, true, cli.json).await
        }
        Commands::Disable { schedule_id } => {
            schedule::handle_toggle(&service, &pool, &schedule_id, false, cli.json).await
        }
        Commands::Delete { schedule_id, force } => {
            schedule::handle_delete(&service, &pool, &schedule_id, force, cli.json).await
        }
        Commands::Metrics => {
            let metrics_service = MetricsService::new(store.clone());
            metrics::handle_metrics(&metrics_service, cli.json).await
        }
        Commands::Run => run::handle_run(store, config.scheduler.clone()).await,
        Commands::Validate { .. } => unreachable!("validate is handled before database setup"),
    }
}
