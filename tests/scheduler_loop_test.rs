mod helpers;

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{Duration, Timelike, Utc};
use metronome::adapters::sqlite::{
    create_pool, initialize_database, SqliteScheduleStore,
};
use metronome::domain::models::{OverlapPolicy, Schedule};
use metronome::domain::ports::ScheduleStore;
use metronome::services::config::SchedulerConfig;
use metronome::services::scheduler_loop::SchedulerLoop;
use sqlx::SqlitePool;

use helpers::database::{seed_template, setup_test_db, teardown_test_db};

/// Wall clock truncated to whole seconds, so instants survive the store's
/// microsecond storage format unchanged.
fn test_now() -> chrono::DateTime<Utc> {
    Utc::now().with_nanosecond(0).unwrap()
}

fn test_config() -> SchedulerConfig {
    SchedulerConfig {
        check_interval_secs: 1,
        ..SchedulerConfig::default()
    }
}

fn loop_over(pool: &SqlitePool) -> (Arc<SqliteScheduleStore>, SchedulerLoop<SqliteScheduleStore>) {
    let store = Arc::new(SqliteScheduleStore::new(pool.clone()));
    let scheduler = SchedulerLoop::new(store.clone(), test_config());
    (store, scheduler)
}

async fn instance_count(pool: &SqlitePool, schedule_id: uuid::Uuid) -> i64 {
    let (count,): (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM task_instances WHERE schedule_id = ?")
            .bind(schedule_id.to_string())
            .fetch_one(pool)
            .await
            .unwrap();
    count
}

#[tokio::test]
async fn due_schedule_fires_exactly_once_across_consecutive_ticks() {
    let pool = setup_test_db().await;
    let (store, scheduler) = loop_over(&pool);
    let template_id = seed_template(&pool, "media_transcode").await;

    let now = test_now();
    let schedule = Schedule::new(template_id, "0 * * * *", "UTC", now - Duration::minutes(1));
    store.create_schedule(&schedule).await.unwrap();

    // Two consecutive ticks within the same firing minute.
    let first = scheduler.tick(now).await;
    let second = scheduler.tick(now).await;

    assert_eq!(first.due, 1);
    assert_eq!(first.materialized, 1);
    assert_eq!(second.due, 0, "next_run_at advanced once, schedule no longer due");
    assert_eq!(instance_count(&pool, schedule.id).await, 1);

    let updated = store.get(schedule.id).await.unwrap().unwrap();
    assert!(updated.next_run_at > now);
    assert_eq!(updated.run_count, 1);

    teardown_test_db(pool).await;
}

#[tokio::test]
async fn skip_policy_at_capacity_advances_without_instance() {
    let pool = setup_test_db().await;
    let (store, scheduler) = loop_over(&pool);
    let template_id = seed_template(&pool, "media_transcode").await;

    let now = test_now();
    let schedule = Schedule::new(template_id, "0 * * * *", "UTC", now - Duration::minutes(1));
    store.create_schedule(&schedule).await.unwrap();

    // First firing materializes one live instance.
    scheduler.tick(now).await;
    assert_eq!(instance_count(&pool, schedule.id).await, 1);

    // Force the schedule due again while the instance is still live.
    sqlx::query("UPDATE task_schedules SET next_run_at = ? WHERE id = ?")
        .bind((now - Duration::minutes(1)).to_rfc3339_opts(chrono::SecondsFormat::Micros, true))
        .bind(schedule.id.to_string())
        .execute(&pool)
        .await
        .unwrap();

    let summary = scheduler.tick(now).await;
    assert_eq!(summary.due, 1);
    assert_eq!(summary.advanced, 1);
    assert_eq!(summary.materialized, 0);
    // No new instance; the non-terminal count stays within max_instances.
    assert_eq!(instance_count(&pool, schedule.id).await, 1);

    let updated = store.get(schedule.id).await.unwrap().unwrap();
    assert!(updated.next_run_at > now);

    teardown_test_db(pool).await;
}

#[tokio::test]
async fn queue_policy_materializes_past_capacity() {
    let pool = setup_test_db().await;
    let (store, scheduler) = loop_over(&pool);
    let template_id = seed_template(&pool, "media_index").await;

    let now = test_now();
    let schedule = Schedule::new(template_id, "0 * * * *", "UTC", now - Duration::minutes(1))
        .with_overlap_policy(OverlapPolicy::Queue);
    store.create_schedule(&schedule).await.unwrap();

    scheduler.tick(now).await;
    sqlx::query("UPDATE task_schedules SET next_run_at = ? WHERE id = ?")
        .bind((now - Duration::minutes(1)).to_rfc3339_opts(chrono::SecondsFormat::Micros, true))
        .bind(schedule.id.to_string())
        .execute(&pool)
        .await
        .unwrap();

    let summary = scheduler.tick(now).await;
    assert_eq!(summary.materialized, 1);
    // Both instances sit on the queue; the executor serializes them.
    assert_eq!(instance_count(&pool, schedule.id).await, 2);

    teardown_test_db(pool).await;
}

#[tokio::test]
async fn replace_policy_retires_live_instance_before_new_firing() {
    let pool = setup_test_db().await;
    let (store, scheduler) = loop_over(&pool);
    let template_id = seed_template(&pool, "media_transcode").await;

    let now = test_now();
    let schedule = Schedule::new(template_id, "0 * * * *", "UTC", now - Duration::minutes(1))
        .with_overlap_policy(OverlapPolicy::Replace);
    store.create_schedule(&schedule).await.unwrap();

    scheduler.tick(now).await;
    let instances = store.list_instances(schedule.id).await.unwrap();
    let first_id = instances[0].id;

    sqlx::query("UPDATE task_schedules SET next_run_at = ? WHERE id = ?")
        .bind((now - Duration::minutes(1)).to_rfc3339_opts(chrono::SecondsFormat::Micros, true))
        .bind(schedule.id.to_string())
        .execute(&pool)
        .await
        .unwrap();

    let summary = scheduler.tick(now).await;
    assert_eq!(summary.replaced, 1);
    assert_eq!(summary.materialized, 1);

    let instances = store.list_instances(schedule.id).await.unwrap();
    assert_eq!(instances.len(), 2);
    let old = instances.iter().find(|i| i.id == first_id).unwrap();
    assert_eq!(old.status.as_str(), "skipped");
    let live: Vec<_> = instances.iter().filter(|i| i.status.is_live()).collect();
    assert_eq!(live.len(), 1, "live count stays within max_instances");

    teardown_test_db(pool).await;
}

#[tokio::test]
async fn missed_firings_coalesce_into_one() {
    let pool = setup_test_db().await;
    let (store, scheduler) = loop_over(&pool);
    let template_id = seed_template(&pool, "media_scan").await;

    // Stopped for six hours: six hourly firings were missed.
    let now = test_now();
    let schedule = Schedule::new(template_id, "0 * * * *", "UTC", now - Duration::hours(6));
    store.create_schedule(&schedule).await.unwrap();

    let summary = scheduler.tick(now).await;
    assert_eq!(summary.materialized, 1);
    assert_eq!(instance_count(&pool, schedule.id).await, 1);

    // The instance records the stale window; the forecast jumps past now.
    let instance = &store.list_instances(schedule.id).await.unwrap()[0];
    assert_eq!(instance.scheduled_for, schedule.next_run_at);
    let updated = store.get(schedule.id).await.unwrap().unwrap();
    assert!(updated.next_run_at > now);

    let quiet = scheduler.tick(now).await;
    assert_eq!(quiet.due, 0);

    teardown_test_db(pool).await;
}

#[tokio::test]
async fn corrupt_expression_is_quarantined_not_fatal() {
    let pool = setup_test_db().await;
    let (store, scheduler) = loop_over(&pool);
    let template_id = seed_template(&pool, "media_scan").await;

    let now = test_now();
    let healthy = Schedule::new(template_id, "0 * * * *", "UTC", now - Duration::minutes(2));
    let corrupt = Schedule::new(template_id, "0 * * * *", "UTC", now - Duration::minutes(3));
    store.create_schedule(&healthy).await.unwrap();
    store.create_schedule(&corrupt).await.unwrap();

    // Corruption appears after creation (validation happened upstream).
    sqlx::query("UPDATE task_schedules SET cron_expression = 'not a cron' WHERE id = ?")
        .bind(corrupt.id.to_string())
        .execute(&pool)
        .await
        .unwrap();

    let summary = scheduler.tick(now).await;
    assert_eq!(summary.due, 2);
    assert_eq!(summary.errors, 1);
    assert_eq!(summary.materialized, 1, "healthy schedule still fires");

    let marked = store.get(corrupt.id).await.unwrap().unwrap();
    assert!(marked.last_error.is_some());
    assert_eq!(instance_count(&pool, corrupt.id).await, 0);

    // The quarantined row stays out of later ticks.
    let quiet = scheduler.tick(now).await;
    assert_eq!(quiet.due, 0);

    teardown_test_db(pool).await;
}

#[tokio::test]
async fn unknown_timezone_is_quarantined() {
    let pool = setup_test_db().await;
    let (store, scheduler) = loop_over(&pool);
    let template_id = seed_template(&pool, "media_scan").await;

    let now = test_now();
    let schedule = Schedule::new(template_id, "0 * * * *", "UTC", now - Duration::minutes(1));
    store.create_schedule(&schedule).await.unwrap();
    sqlx::query("UPDATE task_schedules SET timezone = 'Mars/Olympus' WHERE id = ?")
        .bind(schedule.id.to_string())
        .execute(&pool)
        .await
        .unwrap();

    let summary = scheduler.tick(now).await;
    assert_eq!(summary.errors, 1);
    let marked = store.get(schedule.id).await.unwrap().unwrap();
    assert!(marked.last_error.is_some());

    teardown_test_db(pool).await;
}

#[tokio::test]
async fn global_ceiling_defers_firings() {
    let pool = setup_test_db().await;
    let template_id = seed_template(&pool, "media_transcode").await;
    let store = Arc::new(SqliteScheduleStore::new(pool.clone()));
    let config = SchedulerConfig {
        max_concurrent_instances: 1,
        ..test_config()
    };
    let scheduler = SchedulerLoop::new(store.clone(), config);

    let now = test_now();
    let first = Schedule::new(template_id, "0 * * * *", "UTC", now - Duration::minutes(2));
    let second = Schedule::new(template_id, "0 * * * *", "UTC", now - Duration::minutes(1));
    store.create_schedule(&first).await.unwrap();
    store.create_schedule(&second).await.unwrap();

    let summary = scheduler.tick(now).await;
    assert_eq!(summary.materialized, 1);
    assert_eq!(summary.deferred, 1);

    // The deferred schedule is untouched and retries next tick.
    let untouched = store.get(second.id).await.unwrap().unwrap();
    assert_eq!(untouched.next_run_at, second.next_run_at);

    teardown_test_db(pool).await;
}

#[tokio::test]
async fn concurrent_loops_materialize_a_firing_at_most_once() {
    // File-backed database so two stores race over real connections.
    let dir = tempfile::tempdir().expect("tempdir");
    let url = format!("sqlite:{}/race.db", dir.path().display());
    let pool_a = initialize_database(&url).await.expect("init db");
    let pool_b = create_pool(&url, None).await.expect("second pool");

    let template_id = seed_template(&pool_a, "media_transcode").await;
    let store_a = Arc::new(SqliteScheduleStore::new(pool_a.clone()));
    let store_b = Arc::new(SqliteScheduleStore::new(pool_b.clone()));
    let loop_a = SchedulerLoop::new(store_a.clone(), test_config());
    let loop_b = SchedulerLoop::new(store_b.clone(), test_config());

    let now = test_now();
    let schedule = Schedule::new(template_id, "0 * * * *", "UTC", now - Duration::minutes(1));
    store_a.create_schedule(&schedule).await.unwrap();

    let (summary_a, summary_b) = tokio::join!(loop_a.tick(now), loop_b.tick(now));

    let total_materialized = summary_a.materialized + summary_b.materialized;
    assert_eq!(total_materialized, 1, "exactly one loop wins the firing");

    let (count,): (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM task_instances WHERE schedule_id = ?")
            .bind(schedule.id.to_string())
            .fetch_one(&pool_a)
            .await
            .unwrap();
    assert_eq!(count, 1);

    let updated = store_a.get(schedule.id).await.unwrap().unwrap();
    assert_eq!(updated.run_count, 1);

    pool_b.close().await;
    pool_a.close().await;
}

#[tokio::test]
async fn start_and_stop_complete_cleanly() {
    let pool = setup_test_db().await;
    let (_store, scheduler) = loop_over(&pool);

    let handle = scheduler.start();
    assert!(scheduler.is_running());

    // Give the loop a moment to run its first tick.
    tokio::time::sleep(StdDuration::from_millis(50)).await;

    scheduler.stop();
    tokio::time::timeout(StdDuration::from_secs(5), handle)
        .await
        .expect("loop did not stop in time")
        .expect("loop panicked");
    assert!(!scheduler.is_running());

    teardown_test_db(pool).await;
}
