//! CQRS query handler for actor snapshot projection.
//!
//! The SnapshotQuery applies committed events to an in-memory projection
//! and publishes the updated snapshot to subscribers via a watch channel.

use super::Projection;
use async_trait::async_trait;
use cqrs_es::{EventEnvelope, Query};
use std::sync::Arc;
use tokio::sync::{watch, RwLock};

/// CQRS query handler that maintains a projection.
pub struct SnapshotQuery<V: Projection> {
    /// In-memory projection of the actor state.
    pub projection: Arc<RwLock<V>>,
    /// Watch channel for snapshot updates (latest view).
    pub snapshot_tx: watch::Sender<V>,
}

impl<V: Projection> SnapshotQuery<V> {
    /// Creates a new snapshot query handler.
    pub fn new(projection: Arc<RwLock<V>>, snapshot_tx: watch::Sender<V>) -> Self {
        Self {
            projection,
            snapshot_tx,
        }
    }
}

#[async_trait]
impl<V: Projection> Query<V::Aggregate> for SnapshotQuery<V> {
    async fn dispatch(&self, aggregate_id: &str, events: &[EventEnvelope<V::Aggregate>]) {
        let mut view = self.projection.write().await;

        for event in events {
            view.apply_event(&event.payload, event.sequence as u64);
        }
        tracing::trace!(
            address = aggregate_id,
            sequence = view.last_event_sequence(),
            "projection updated"
        );

        // send_replace never fails, even when nobody is subscribed
        self.snapshot_tx.send_replace(view.clone());
    }
}

#[cfg(test)]
#[path = "../tests/query_tests.rs"]
mod tests;
