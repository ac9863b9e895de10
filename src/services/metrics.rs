//! Read-only metrics snapshots for dashboards.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::domain::errors::DomainResult;
use crate::domain::models::MetricsSnapshot;
use crate::domain::ports::ScheduleStore;

pub struct MetricsService<S: ScheduleStore> {
    store: Arc<S>,
}

impl<S: ScheduleStore> MetricsService<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub async fn snapshot(&self) -> DomainResult<MetricsSnapshot> {
        self.snapshot_at(Utc::now()).await
    }

    pub async fn snapshot_at(&self, now: DateTime<Utc>) -> DomainResult<MetricsSnapshot> {
        self.store.metrics_snapshot(now).await
    }
}
