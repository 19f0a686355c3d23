//! CQRS glue shared by the three actor aggregates.
//!
//! Each actor owns one aggregate (command validation and event application)
//! and one projection (the read-only snapshot its queries return). The
//! projection is kept current by [`SnapshotQuery`].

pub mod query;

pub use query::SnapshotQuery;

use crate::domain::errors::DomainError;
use crate::domain::services::DomainServices;
use cqrs_es::Aggregate;
use std::fmt::Debug;

/// Event type of the aggregate behind a projection.
pub type EventOf<V> = <<V as Projection>::Aggregate as Aggregate>::Event;

/// Command type of the aggregate behind a projection.
pub type CommandOf<V> = <<V as Projection>::Aggregate as Aggregate>::Command;

/// Read-side state derived from an aggregate's events only.
pub trait Projection: Clone + Debug + Default + Send + Sync + 'static {
    type Aggregate: Aggregate<Error = DomainError, Services = DomainServices>;

    /// Apply a committed event to the projection.
    fn apply_event(&mut self, event: &EventOf<Self>, sequence: u64);

    /// Sequence number of the last applied event.
    fn last_event_sequence(&self) -> u64;
}
