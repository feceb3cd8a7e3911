use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use uuid::Uuid;

/// A paste handed to the server but not yet acknowledged
#[derive(Debug, Clone)]
pub struct PendingCreation {
    pub temp_id: Uuid,
    pub title: String,
    pub issued_at: Instant,
}

/// Correlation map from `temp_id` to in-flight creations
///
/// Entries leave the map when the server answers (either way) or when
/// `purge_expired` sweeps them.
#[derive(Debug, Clone, Default)]
pub struct PendingCreations {
    inner: Arc<Mutex<HashMap<Uuid, PendingCreation>>>,
}

impl PendingCreations {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new creation and return its correlation id
    pub fn issue(&self, title: impl Into<String>) -> Uuid {
        let temp_id = Uuid::new_v4();
        self.inner.lock().insert(
            temp_id,
            PendingCreation {
                temp_id,
                title: title.into(),
                issued_at: Instant::now(),
            },
        );
        temp_id
    }

    pub fn get(&self, temp_id: &Uuid) -> Option<PendingCreation> {
        self.inner.lock().get(temp_id).cloned()
    }

    /// Remove and return the entry for `temp_id`
    pub fn complete(&self, temp_id: &Uuid) -> Option<PendingCreation> {
        self.inner.lock().remove(temp_id)
    }

    /// Drop entries older than `ttl`, returning their ids
    pub fn purge_expired(&self, ttl: Duration) -> Vec<Uuid> {
        let mut inner = self.inner.lock();
        let expired: Vec<Uuid> = inner
            .values()
            .filter(|p| p.issued_at.elapsed() >= ttl)
            .map(|p| p.temp_id)
            .collect();
        for temp_id in &expired {
            inner.remove(temp_id);
        }
        if !expired.is_empty() {
            tracing::debug!("PENDING: purged {} stale creations", expired.len());
        }
        expired
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}
