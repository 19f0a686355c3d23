//! Location tracker actor.
//!
//! Holds the current location/timezone of one employee. Apart from handling
//! updates it stays idle until its supervisor stops it.

use crate::config::EngineConfig;
use crate::domain::locations::{LocationCommand, LocationRecord};
use crate::domain::requests::{SetCurrentLocationRequest, StartLocationTrackingRequest};
use crate::journal::Journal;
use async_trait::async_trait;
use ractor::{Actor, ActorProcessingErr, ActorRef};
use std::sync::Arc;
use tokio::sync::{oneshot, watch};

/// Messages accepted by the location tracker.
pub enum LocationTrackerMessage {
    /// Overwrite the record (signal).
    SetCurrentLocation(SetCurrentLocationRequest),
    /// Read the current record (query).
    GetLocation(oneshot::Sender<LocationRecord>),
}

pub struct LocationTrackerArgs {
    /// Registered address, recorded as `source_actor_id` on every write.
    pub address: String,
    pub start: StartLocationTrackingRequest,
    pub config: Arc<EngineConfig>,
}

pub struct LocationTrackerState {
    journal: Journal<LocationRecord>,
    snapshot_rx: watch::Receiver<LocationRecord>,
}

pub struct LocationTracker;

#[async_trait]
impl Actor for LocationTracker {
    type Msg = LocationTrackerMessage;
    type State = LocationTrackerState;
    type Arguments = LocationTrackerArgs;

    async fn pre_start(
        &self,
        _myself: ActorRef<Self::Msg>,
        args: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        let (snapshot_tx, snapshot_rx) = watch::channel(LocationRecord::default());
        let journal = Journal::open(&args.address, &args.config, snapshot_tx).await?;

        if journal.snapshot().await.is_started() {
            // A recovered tracker keeps what it recorded, not the start seed
            tracing::info!(address = %args.address, "Location tracker resumed");
        } else {
            journal
                .execute(LocationCommand::StartTracking {
                    request: args.start,
                    source_actor_id: args.address.clone(),
                })
                .await?;
            tracing::info!(address = %args.address, "Location tracker started");
        }

        Ok(LocationTrackerState {
            journal,
            snapshot_rx,
        })
    }

    async fn handle(
        &self,
        _myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            LocationTrackerMessage::SetCurrentLocation(request) => {
                let address = state.journal.address().to_string();
                let record = state
                    .journal
                    .execute(LocationCommand::SetCurrentLocation {
                        request,
                        source_actor_id: address.clone(),
                    })
                    .await?;
                tracing::info!(
                    address = %address,
                    location = %record.location,
                    timezone = %record.timezone,
                    "Current location set"
                );
            }
            LocationTrackerMessage::GetLocation(reply) => {
                let record = state.snapshot_rx.borrow().clone();
                if reply.send(record).is_err() {
                    tracing::debug!("Location reply channel closed");
                }
            }
        }

        Ok(())
    }

    async fn post_stop(
        &self,
        _myself: ActorRef<Self::Msg>,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        tracing::info!(address = %state.journal.address(), "Location tracker stopped");
        Ok(())
    }
}

#[cfg(test)]
#[path = "tests/location_tracker_tests.rs"]
mod tests;
