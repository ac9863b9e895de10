//! Application services for the scheduling core.

pub mod config;
pub mod logging;
pub mod metrics;
pub mod overlap;
pub mod schedule_service;
pub mod scheduler_loop;

pub use config::{Config, ConfigError, ConfigLoader, DatabaseConfig, LoggingConfig, SchedulerConfig};
pub use metrics::MetricsService;
pub use overlap::{decide, OverlapAction};
pub use schedule_service::{
    validate_expression, CreateScheduleOptions, ScheduleService, ValidationReport,
};
pub use scheduler_loop::{SchedulerLoop, TickSummary};
