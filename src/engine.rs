//! Client surface over the actor system.
//!
//! An `Engine` owns the shared actor context and the join handles of the
//! employee roots it started. Every signal and query is routed by address
//! through the actor registry, so a call for an employee that is not live
//! fails with [`EngineError::NotRunning`] instead of waiting.

use crate::activities::DigestActivities;
use crate::actors::{
    lookup, ActorContext, DigestSchedulerMessage, EmployeeActor, EmployeeActorArgs,
    EmployeeMessage, LocationTrackerMessage,
};
use crate::config::EngineConfig;
use crate::domain::employee::EmployeeDetails;
use crate::domain::errors::DomainError;
use crate::domain::locations::LocationRecord;
use crate::domain::notifications::NotificationSchedule;
use crate::domain::requests::{
    OnboardEmployeeRequest, RescheduleRequest, SetCurrentLocationRequest,
    UpdateEmployeeDetailsRequest,
};
use crate::domain::types::EmployeeId;
use ractor::concurrency::JoinHandle;
use ractor::{Actor, ActorRef};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{oneshot, watch, Mutex};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("failed to start '{address}': {message}")]
    Spawn { address: String, message: String },
    #[error("no live actor at '{address}'")]
    NotRunning { address: String },
    #[error("query to '{address}' timed out")]
    QueryTimeout { address: String },
    #[error("'{address}' stopped before answering")]
    QueryDropped { address: String },
    #[error("actor task for '{address}' did not complete: {message}")]
    Join { address: String, message: String },
}

/// A started employee: its root actor and a live view of its details.
pub struct EmployeeHandle {
    pub id: EmployeeId,
    pub actor: ActorRef<EmployeeMessage>,
    pub details: watch::Receiver<EmployeeDetails>,
}

impl EmployeeHandle {
    /// Latest published details, without a round trip to the actor.
    pub fn current_details(&self) -> EmployeeDetails {
        self.details.borrow().clone()
    }
}

pub struct Engine {
    context: ActorContext,
    running: Mutex<HashMap<EmployeeId, JoinHandle<()>>>,
}

impl Engine {
    pub fn new(config: EngineConfig, activities: Arc<dyn DigestActivities>) -> Self {
        Self {
            context: ActorContext::new(config, activities),
            running: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.context.config
    }

    /// Starts the employee root, which spawns both children before returning.
    pub async fn onboard(
        &self,
        request: OnboardEmployeeRequest,
    ) -> Result<EmployeeHandle, EngineError> {
        if request.id.is_empty() {
            return Err(DomainError::InvalidInput {
                message: "employee id must not be empty".to_string(),
            }
            .into());
        }

        let id = request.id.clone();
        let (snapshot_tx, details) = watch::channel(EmployeeDetails::default());
        let args = EmployeeActorArgs {
            request,
            context: self.context.clone(),
            snapshot_tx,
        };

        let (actor, handle) = EmployeeActor::spawn(Some(id.to_string()), EmployeeActor, args)
            .await
            .map_err(|err| EngineError::Spawn {
                address: id.to_string(),
                message: err.to_string(),
            })?;

        tracing::info!(address = %id, "Employee started");
        self.running.lock().await.insert(id.clone(), handle);

        Ok(EmployeeHandle { id, actor, details })
    }

    pub async fn get_details(&self, id: &EmployeeId) -> Result<EmployeeDetails, EngineError> {
        self.query(id.as_str(), EmployeeMessage::GetDetails).await
    }

    pub fn update_details(
        &self,
        id: &EmployeeId,
        request: UpdateEmployeeDetailsRequest,
    ) -> Result<(), EngineError> {
        signal(id.as_str(), EmployeeMessage::UpdateDetails(request))
    }

    pub fn offboard(&self, id: &EmployeeId) -> Result<(), EngineError> {
        signal(id.as_str(), EmployeeMessage::Offboard)
    }

    pub fn reschedule_notifications(
        &self,
        id: &EmployeeId,
        request: RescheduleRequest,
    ) -> Result<(), EngineError> {
        signal(
            &id.notifications_address(),
            DigestSchedulerMessage::Reschedule(request),
        )
    }

    pub async fn get_notifications(
        &self,
        id: &EmployeeId,
    ) -> Result<NotificationSchedule, EngineError> {
        self.query(&id.notifications_address(), DigestSchedulerMessage::GetState)
            .await
    }

    pub fn set_current_location(
        &self,
        id: &EmployeeId,
        request: SetCurrentLocationRequest,
    ) -> Result<(), EngineError> {
        signal(
            &id.locations_address(),
            LocationTrackerMessage::SetCurrentLocation(request),
        )
    }

    pub async fn get_location(&self, id: &EmployeeId) -> Result<LocationRecord, EngineError> {
        self.query(&id.locations_address(), LocationTrackerMessage::GetLocation)
            .await
    }

    /// Waits until the employee root has stopped, children included.
    pub async fn wait_for_completion(&self, id: &EmployeeId) -> Result<(), EngineError> {
        let handle = self
            .running
            .lock()
            .await
            .remove(id)
            .ok_or_else(|| EngineError::NotRunning {
                address: id.to_string(),
            })?;

        handle.await.map_err(|err| EngineError::Join {
            address: id.to_string(),
            message: err.to_string(),
        })
    }

    /// Stops every running employee without offboarding it.
    ///
    /// Persisted state is untouched; onboarding the same id again resumes it.
    pub async fn shutdown(&self) {
        let running: Vec<_> = self.running.lock().await.drain().collect();
        tracing::info!(employees = running.len(), "Engine shutting down");

        for (id, _) in &running {
            if let Some(actor) = lookup::<EmployeeMessage>(id.as_str()) {
                actor.stop(Some("engine shutdown".to_string()));
            }
        }
        for (id, handle) in running {
            if let Err(err) = handle.await {
                tracing::warn!(address = %id, error = %err, "Employee task ended abnormally");
            }
        }
    }

    async fn query<M, T>(
        &self,
        address: &str,
        build: impl FnOnce(oneshot::Sender<T>) -> M,
    ) -> Result<T, EngineError>
    where
        M: ractor::Message,
    {
        let (tx, rx) = oneshot::channel();
        signal(address, build(tx))?;

        match tokio::time::timeout(self.context.config.query_timeout(), rx).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(_)) => Err(EngineError::QueryDropped {
                address: address.to_string(),
            }),
            Err(_) => Err(EngineError::QueryTimeout {
                address: address.to_string(),
            }),
        }
    }
}

fn signal<M: ractor::Message>(address: &str, message: M) -> Result<(), EngineError> {
    let not_running = || EngineError::NotRunning {
        address: address.to_string(),
    };
    let actor = lookup::<M>(address).ok_or_else(not_running)?;
    actor.send_message(message).map_err(|_| not_running())
}

#[cfg(test)]
#[path = "engine_tests.rs"]
mod tests;
