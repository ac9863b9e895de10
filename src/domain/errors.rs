//! Domain errors for the scheduler core.

use thiserror::Error;
use uuid::Uuid;

use crate::cron::CronError;

/// Domain-level errors. `MaterializationConflict` and `StoreTimeout` are
/// transient: the scheduler loop swallows the former and retries the latter
/// on the next tick. Everything else propagates to the caller.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Cron parse failure, including the defensive no-future-firing bound,
    /// which callers see as an invalid expression.
    #[error("invalid cron expression: {0}")]
    InvalidExpression(#[from] CronError),

    #[error("invalid timezone: {0}")]
    InvalidTimezone(String),

    #[error("template task not found: {0}")]
    TemplateNotFound(i64),

    #[error("schedule not found: {0}")]
    ScheduleNotFound(Uuid),

    #[error("schedule id prefix '{0}' is ambiguous")]
    AmbiguousScheduleId(String),

    #[error("schedule {schedule_id}: another worker claimed this firing")]
    MaterializationConflict { schedule_id: Uuid },

    #[error("store operation timed out")]
    StoreTimeout,

    #[error("schedule {schedule_id} is corrupt: {detail}")]
    StoreCorruption { schedule_id: Uuid, detail: String },

    #[error("database error: {0}")]
    Database(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

pub type DomainResult<T> = Result<T, SchedulerError>;

impl From<sqlx::Error> for SchedulerError {
    fn from(err: sqlx::Error) -> Self {
        SchedulerError::Database(err.to_string())
    }
}

impl From<serde_json::Error> for SchedulerError {
    fn from(err: serde_json::Error) -> Self {
        SchedulerError::Serialization(err.to_string())
    }
}

impl SchedulerError {
    /// Whether this error is a caller-side validation failure (CLI exit
    /// code 2) rather than an operational one (exit code 1).
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::InvalidExpression(_) | Self::InvalidTimezone(_))
    }

    /// Whether retrying at the next tick may succeed without intervention.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::MaterializationConflict { .. } | Self::StoreTimeout)
    }
}
