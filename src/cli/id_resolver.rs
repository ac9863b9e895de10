//! Short ID prefix resolution for schedule commands.
//!
//! Allows users to specify any unique prefix of a schedule UUID instead of
//! the full 32-char ID, similar to git short hashes.

use anyhow::{bail, Result};
use sqlx::SqlitePool;
use uuid::Uuid;

const SCHEDULE_QUERY: &str = "SELECT id FROM task_schedules WHERE id LIKE ?";

fn validate_prefix(prefix: &str) -> Result<()> {
    if prefix.is_empty() {
        bail!("ID prefix must not be empty");
    }
    if !prefix.chars().all(|c| c.is_ascii_hexdigit() || c == '-') {
        bail!(
            "Invalid ID prefix '{}': must contain only hex characters and dashes",
            prefix
        );
    }
    Ok(())
}

/// Resolve a schedule ID prefix to a full UUID.
pub async fn resolve_schedule_id(pool: &SqlitePool, prefix: &str) -> Result<Uuid> {
    if let Ok(id) = Uuid::parse_str(prefix) {
        return Ok(id);
    }

    validate_prefix(prefix)?;

    let pattern = format!("{}%", prefix.to_lowercase());
    let rows: Vec<(String,)> = sqlx::query_as(SCHEDULE_QUERY)
        .bind(&pattern)
        .fetch_all(pool)
        .await?;

    match rows.len() {
        0 => bail!("No schedule found matching '{}'", prefix),
        1 => Ok(Uuid::parse_str(&rows[0].0)?),
        n => bail!(
            "Ambiguous schedule prefix '{}': {} matches. Use more characters.",
            prefix,
            n
        ),
    }
}
