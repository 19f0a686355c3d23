//! Actors of one employee entity.
//!
//! # Layout
//!
//! - **employee**: root actor owning the identity, supervises both children
//! - **digest_scheduler**: notification digest cycle with checkpoint-restart
//! - **location_tracker**: current location/timezone record
//!
//! Every actor is registered under its address, so at most one instance per
//! address is live at a time.

pub mod digest_scheduler;
pub mod employee;
pub mod location_tracker;

pub use digest_scheduler::{DigestScheduler, DigestSchedulerArgs, DigestSchedulerMessage};
pub use employee::{EmployeeActor, EmployeeActorArgs, EmployeeMessage};
pub use location_tracker::{LocationTracker, LocationTrackerArgs, LocationTrackerMessage};

use crate::activities::DigestActivities;
use crate::config::EngineConfig;
use ractor::ActorRef;
use std::sync::Arc;

/// Dependencies shared by every actor spawned by one engine.
#[derive(Clone)]
pub struct ActorContext {
    pub config: Arc<EngineConfig>,
    pub activities: Arc<dyn DigestActivities>,
}

impl ActorContext {
    pub fn new(config: EngineConfig, activities: Arc<dyn DigestActivities>) -> Self {
        Self {
            config: Arc::new(config),
            activities,
        }
    }
}

/// Resolves a live actor by its registered address.
pub fn lookup<M: ractor::Message>(address: &str) -> Option<ActorRef<M>> {
    ractor::registry::where_is(address.to_string()).map(ActorRef::from)
}

#[cfg(test)]
#[path = "tests/support.rs"]
pub(crate) mod test_support;
