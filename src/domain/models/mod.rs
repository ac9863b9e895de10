//! Domain models
//!
//! Pure domain entities with business logic and validation rules.
//! These models are framework-agnostic and contain no infrastructure concerns.

pub mod instance;
pub mod metrics;
pub mod schedule;
pub mod template;

pub use instance::{InstanceStatus, ScheduleInstance};
pub use metrics::{InstanceStatusCounts, MetricsSnapshot, UpcomingFiring};
pub use schedule::{OverlapPolicy, Schedule, ScheduleFilter};
pub use template::TemplateTask;
