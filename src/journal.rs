//! Durable state of one actor.
//!
//! A journal binds an actor address to its event log: commands go through
//! the CQRS framework, committed events update the in-memory projection,
//! and every new projection is published on the actor's watch channel.

use crate::config::EngineConfig;
use crate::domain::cqrs::{CommandOf, Projection, SnapshotQuery};
use crate::domain::errors::DomainError;
use crate::domain::services::DomainServices;
use crate::event_store::FileEventStore;
use crate::paths;
use cqrs_es::{Aggregate, AggregateError, CqrsFramework, EventStore};
use std::sync::Arc;
use tokio::sync::{watch, RwLock};

type Framework<V> =
    CqrsFramework<<V as Projection>::Aggregate, FileEventStore<<V as Projection>::Aggregate>>;

pub struct Journal<V: Projection> {
    address: String,
    cqrs: Framework<V>,
    store: FileEventStore<V::Aggregate>,
    projection: Arc<RwLock<V>>,
}

impl<V: Projection> Journal<V> {
    /// Opens the journal of `address`, replaying its log into the projection.
    pub async fn open(
        address: &str,
        config: &EngineConfig,
        snapshot_tx: watch::Sender<V>,
    ) -> Result<Self, DomainError> {
        let aggregate_type = <V::Aggregate as Aggregate>::aggregate_type();
        let store = FileEventStore::new(
            paths::events_path(&config.data_dir, &aggregate_type, address),
            paths::snapshot_path(&config.data_dir, &aggregate_type, address),
            config.journal.snapshot_every,
        );

        // Bootstrap the projection from existing events (if any)
        let mut initial = V::default();
        let events = store
            .load_events(address)
            .await
            .map_err(map_aggregate_error)?;
        for envelope in &events {
            initial.apply_event(&envelope.payload, envelope.sequence as u64);
        }
        if !events.is_empty() {
            tracing::debug!(
                address,
                replayed = events.len(),
                sequence = initial.last_event_sequence(),
                "journal replayed"
            );
        }
        snapshot_tx.send_replace(initial.clone());

        let projection = Arc::new(RwLock::new(initial));
        let query = SnapshotQuery::new(projection.clone(), snapshot_tx);
        let cqrs = CqrsFramework::new(
            store.clone(),
            vec![Box::new(query)],
            DomainServices::default(),
        );

        Ok(Self {
            address: address.to_string(),
            cqrs,
            store,
            projection,
        })
    }

    /// Deletes the stored log and snapshot of `address`.
    ///
    /// The actor owning it must be stopped. A missing journal is not an error.
    pub fn discard(address: &str, config: &EngineConfig) -> Result<(), DomainError> {
        let aggregate_type = <V::Aggregate as Aggregate>::aggregate_type();
        let dir = paths::actor_dir(&config.data_dir, &aggregate_type, address);
        match std::fs::remove_dir_all(&dir) {
            Ok(()) => {
                tracing::debug!(address, dir = %dir.display(), "journal discarded");
                Ok(())
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(DomainError::StorageFailure {
                message: format!("failed to discard journal of '{}': {}", address, err),
            }),
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Executes a command and returns the projection after it was applied.
    pub async fn execute(&self, command: CommandOf<V>) -> Result<V, DomainError> {
        self.cqrs
            .execute(&self.address, command)
            .await
            .map_err(map_aggregate_error)?;
        Ok(self.snapshot().await)
    }

    /// Point-in-time copy of the projection.
    pub async fn snapshot(&self) -> V {
        self.projection.read().await.clone()
    }

    /// Drops every event before the latest one.
    pub async fn compact(&self) -> Result<usize, DomainError> {
        let keep_from = self.projection.read().await.last_event_sequence();
        let removed = self
            .store
            .truncate_before(&self.address, keep_from)
            .map_err(map_aggregate_error)?;
        tracing::debug!(address = %self.address, removed, keep_from, "journal compacted");
        Ok(removed)
    }
}

fn map_aggregate_error(err: AggregateError<DomainError>) -> DomainError {
    match err {
        AggregateError::UserError(err) => err,
        AggregateError::AggregateConflict => DomainError::ConcurrencyConflict {
            message: "aggregate was modified concurrently".to_string(),
        },
        err => DomainError::StorageFailure {
            message: err.to_string(),
        },
    }
}

#[cfg(test)]
#[path = "journal_tests.rs"]
mod tests;
