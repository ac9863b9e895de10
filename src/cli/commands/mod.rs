//! CLI command definitions and handlers
//!
//! This module contains all CLI command structures using clap derive macros
//! and their corresponding handler implementations.

use clap::{Parser, Subcommand};

pub mod metrics;
pub mod run;
pub mod schedule;

#[derive(Parser, Debug)]
#[command(
    name = "metronome",
    about = "Periodic task scheduler over the persistent task queue",
    version
)]
pub struct Cli {
    /// Emit machine-readable JSON instead of human output
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create a schedule for a template task
    Create {
        /// Template task id on the queue
        task_id: i64,

        /// 5-field cron expression (quote it: "*/5 * * * *")
        cron: String,

        /// IANA timezone the expression is evaluated in
        #[arg(long)]
        timezone: Option<String>,

        /// Create the schedule disabled
        #[arg(long)]
        disabled: bool,

        /// Upper bound on concurrent scheduled+running instances
        #[arg(long, default_value_t = 1)]
        max_instances: u32,

        /// What to do when a firing would exceed max-instances
        #[arg(long, default_value = "skip", value_parser = ["skip", "queue", "replace"])]
        overlap: String,
    },

    /// List schedules, soonest firing first
    List {
        /// Include disabled schedules
        #[arg(long)]
        all: bool,
    },

    /// Enable a schedule
    Enable {
        /// Schedule ID or unique prefix
        schedule_id: String,
    },

    /// Disable a schedule
    Disable {
        /// Schedule ID or unique prefix
        schedule_id: String,
    },

    /// Delete a schedule and all of its instances
    Delete {
        /// Schedule ID or unique prefix
        schedule_id: String,

        /// Skip the confirmation prompt
        #[arg(long)]
        force: bool,
    },

    /// Validate a cron expression and preview upcoming firings
    Validate {
        /// 5-field cron expression
        cron: String,

        /// IANA timezone to evaluate the preview in
        #[arg(long)]
        timezone: Option<String>,
    },

    /// Print a metrics snapshot
    Metrics,

    /// Run the scheduler loop in the foreground until Ctrl-C
    Run,
}
