//! Domain ports (interfaces) for the scheduling core.

pub mod schedule_store;

pub use schedule_store::ScheduleStore;
