use metronome::adapters::sqlite::create_migrated_test_pool;
use sqlx::SqlitePool;

/// Create an in-memory SQLite database with all migrations applied.
#[allow(dead_code)]
pub async fn setup_test_db() -> SqlitePool {
    create_migrated_test_pool()
        .await
        .expect("failed to create test database")
}

/// Teardown test database
#[allow(dead_code)]
pub async fn teardown_test_db(pool: SqlitePool) {
    pool.close().await;
}

/// Insert a template task row on the queue and return its id.
#[allow(dead_code)]
pub async fn seed_template(pool: &SqlitePool, task_type: &str) -> i64 {
    sqlx::query(
        "INSERT INTO tasks (type, description, status, args, metadata, is_template)
         VALUES (?1, 'seeded test template', 'pending', '{\"cmd\":\"noop\"}', '{\"origin\":\"seed\"}', 1)",
    )
    .bind(task_type)
    .execute(pool)
    .await
    .expect("failed to seed template task")
    .last_insert_rowid()
}
