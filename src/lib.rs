//! Metronome - periodic task scheduling core
//!
//! The scheduling engine of a media-processing task queue:
//! - 5-field cron expressions evaluated in arbitrary IANA timezones
//! - SQLite-backed schedules, instances, and template-task annotations
//! - A polling scheduler loop with per-schedule overlap policies
//! - Synchronous management operations for CLIs and embedding hosts

pub mod adapters;
pub mod cli;
pub mod cron;
pub mod domain;
pub mod services;

// Re-export key types for convenience
pub use cron::{CronError, CronExpression};
pub use domain::errors::{DomainResult, SchedulerError};
pub use domain::models::{OverlapPolicy, Schedule, ScheduleInstance};
