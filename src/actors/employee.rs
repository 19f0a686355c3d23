//! Employee root actor.
//!
//! Owns the employee identity and supervises the digest scheduler and the
//! location tracker. Children are linked to the root: offboarding stops
//! them, and the root itself stops only once every child has settled.

use super::digest_scheduler::{DigestScheduler, DigestSchedulerArgs};
use super::location_tracker::{LocationTracker, LocationTrackerArgs};
use super::ActorContext;
use crate::domain::employee::{EmployeeCommand, EmployeeDetails};
use crate::domain::errors::DomainError;
use crate::domain::locations::LocationRecord;
use crate::domain::notifications::NotificationSchedule;
use crate::domain::requests::{
    OnboardEmployeeRequest, StartLocationTrackingRequest, StartScheduleRequest,
    UpdateEmployeeDetailsRequest,
};
use crate::journal::Journal;
use async_trait::async_trait;
use ractor::concurrency::JoinHandle;
use ractor::{
    Actor, ActorCell, ActorId, ActorProcessingErr, ActorRef, MessagingErr, SpawnErr,
    SupervisionEvent,
};
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{oneshot, watch};

/// Pause before retrying a child spawn that failed.
const RESPAWN_RETRY_DELAY: Duration = Duration::from_millis(50);

/// Messages accepted by the employee actor.
pub enum EmployeeMessage {
    /// Overwrite the name fields (signal).
    UpdateDetails(UpdateEmployeeDetailsRequest),
    /// Offboard the employee and wind down (signal).
    Offboard,
    /// Read the identity snapshot (query).
    GetDetails(oneshot::Sender<EmployeeDetails>),
    /// Respawn a child that exited while the employee was active.
    RestartChild(ChildKind),
}

/// The two children every employee supervises.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChildKind {
    Notifications,
    Locations,
}

#[derive(Debug, Error)]
pub enum SupervisionError {
    #[error("child '{address}' exceeded {restarts} restart(s)")]
    RestartLimitExceeded { address: String, restarts: u32 },
}

pub struct EmployeeActorArgs {
    pub request: OnboardEmployeeRequest,
    pub context: ActorContext,
    pub snapshot_tx: watch::Sender<EmployeeDetails>,
}

struct ChildEntry {
    kind: ChildKind,
    cell: ActorCell,
}

pub struct EmployeeActorState {
    journal: Journal<EmployeeDetails>,
    context: ActorContext,
    children: HashMap<ActorId, ChildEntry>,
    handles: Vec<JoinHandle<()>>,
    restarts: HashMap<ChildKind, u32>,
    respawn_timer: Option<JoinHandle<Result<(), MessagingErr<EmployeeMessage>>>>,
    winding_down: bool,
}

impl EmployeeActorState {
    fn adopt(&mut self, kind: ChildKind, cell: ActorCell, handle: JoinHandle<()>) {
        self.children.insert(cell.get_id(), ChildEntry { kind, cell });
        self.handles.push(handle);
    }
}

pub struct EmployeeActor;

impl EmployeeActor {
    fn child_address(details: &EmployeeDetails, kind: ChildKind) -> &str {
        match kind {
            ChildKind::Notifications => &details.notifications_actor_id,
            ChildKind::Locations => &details.locations_actor_id,
        }
    }

    /// Spawns one child linked to `supervisor`, addressed by its derived id.
    async fn spawn_child(
        kind: ChildKind,
        supervisor: ActorCell,
        details: &EmployeeDetails,
        context: &ActorContext,
    ) -> Result<(ActorCell, JoinHandle<()>), SpawnErr> {
        let address = Self::child_address(details, kind).to_string();
        tracing::debug!(address = %address, ?kind, "Spawning child");

        match kind {
            ChildKind::Notifications => {
                let args = DigestSchedulerArgs {
                    address: address.clone(),
                    start: StartScheduleRequest {
                        employee_id: details.id.clone(),
                        frequency: context.config.notifications.default_frequency,
                        paused: context.config.notifications.default_paused,
                    },
                    context: context.clone(),
                };
                let (actor, handle) =
                    DigestScheduler::spawn_linked(Some(address), DigestScheduler, args, supervisor)
                        .await?;
                Ok((actor.get_cell(), handle))
            }
            ChildKind::Locations => {
                let args = LocationTrackerArgs {
                    address: address.clone(),
                    start: StartLocationTrackingRequest {
                        employee_id: details.id.clone(),
                        location: details.default_location.clone(),
                        timezone: details.default_timezone.clone(),
                    },
                    config: context.config.clone(),
                };
                let (actor, handle) =
                    LocationTracker::spawn_linked(Some(address), LocationTracker, args, supervisor)
                        .await?;
                Ok((actor.get_cell(), handle))
            }
        }
    }

    /// Identity the children start from before onboarding is persisted.
    fn provisional_details(request: &OnboardEmployeeRequest) -> EmployeeDetails {
        EmployeeDetails {
            id: request.id.clone(),
            first_name: request.first_name.clone(),
            last_name: request.last_name.clone(),
            default_location: request.default_location.clone(),
            default_timezone: request.default_timezone.clone(),
            locations_actor_id: request.id.locations_address(),
            notifications_actor_id: request.id.notifications_address(),
            ..EmployeeDetails::default()
        }
    }

    /// A stored employee resumes only when started with the same identity.
    fn check_resume(
        existing: &EmployeeDetails,
        request: &OnboardEmployeeRequest,
    ) -> Result<(), DomainError> {
        if existing.offboarded {
            return Err(DomainError::AlreadyOffboarded {
                id: existing.id.to_string(),
            });
        }
        let field = if existing.first_name != request.first_name {
            Some("first_name")
        } else if existing.last_name != request.last_name {
            Some("last_name")
        } else if existing.default_location != request.default_location {
            Some("default_location")
        } else if existing.default_timezone != request.default_timezone {
            Some("default_timezone")
        } else {
            None
        };
        match field {
            Some(field) => Err(DomainError::IdentityMismatch {
                id: existing.id.to_string(),
                field,
            }),
            None => Ok(()),
        }
    }

    /// Stops children started by a failed onboarding and waits for them.
    ///
    /// When nothing was persisted for the employee yet, their journals are
    /// discarded too, so a later onboarding starts from its own request.
    async fn unwind(
        started: Vec<(ChildKind, ActorCell, JoinHandle<()>)>,
        details: &EmployeeDetails,
        context: &ActorContext,
        discard: bool,
    ) {
        for (_, cell, _) in &started {
            cell.stop(Some("onboarding failed".to_string()));
        }
        for (kind, _, handle) in started {
            let address = Self::child_address(details, kind).to_string();
            if handle.await.is_err() {
                tracing::debug!(address = %address, "Child task ended abnormally");
            }
            if !discard {
                continue;
            }
            let discarded = match kind {
                ChildKind::Notifications => {
                    Journal::<NotificationSchedule>::discard(&address, &context.config)
                }
                ChildKind::Locations => Journal::<LocationRecord>::discard(&address, &context.config),
            };
            if let Err(err) = discarded {
                tracing::warn!(address = %address, error = %err, "Child journal left behind");
            }
        }
    }

    async fn on_child_exit(
        myself: &ActorRef<EmployeeMessage>,
        state: &mut EmployeeActorState,
        child: ActorId,
        reason: String,
        failed: bool,
    ) -> Result<(), ActorProcessingErr> {
        let Some(entry) = state.children.remove(&child) else {
            return Ok(());
        };
        let details = state.journal.snapshot().await;
        let address = Self::child_address(&details, entry.kind).to_string();

        if state.winding_down {
            tracing::info!(
                address = %address,
                remaining = state.children.len(),
                "Child settled"
            );
            if state.children.is_empty() {
                tracing::info!(address = %state.journal.address(), "All children settled");
                myself.stop(Some("offboarded".to_string()));
            }
            return Ok(());
        }

        let restarts = state.restarts.entry(entry.kind).or_insert(0);
        *restarts += 1;
        let max = state.context.config.supervision.max_child_restarts;
        if *restarts > max {
            tracing::error!(address = %address, reason = %reason, "Child restart limit exceeded");
            return Err(SupervisionError::RestartLimitExceeded {
                address,
                restarts: max,
            }
            .into());
        }

        tracing::warn!(
            address = %address,
            reason = %reason,
            failed,
            attempt = *restarts,
            "Child exited while employee active, restarting"
        );
        if myself
            .send_message(EmployeeMessage::RestartChild(entry.kind))
            .is_err()
        {
            tracing::debug!(address = %address, "Employee stopping, restart dropped");
        }
        Ok(())
    }
}

#[async_trait]
impl Actor for EmployeeActor {
    type Msg = EmployeeMessage;
    type State = EmployeeActorState;
    type Arguments = EmployeeActorArgs;

    async fn pre_start(
        &self,
        myself: ActorRef<Self::Msg>,
        args: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        let address = args.request.id.to_string();
        if args.request.id.is_empty() {
            return Err(DomainError::InvalidInput {
                message: "employee id must not be empty".to_string(),
            }
            .into());
        }

        let journal = Journal::open(&address, &args.context.config, args.snapshot_tx).await?;
        let existing = journal.snapshot().await;
        let fresh = !existing.is_onboarded();
        let details = if fresh {
            Self::provisional_details(&args.request)
        } else {
            Self::check_resume(&existing, &args.request)?;
            tracing::info!(address = %address, "Employee resumed");
            existing
        };

        let (notifications, locations) = tokio::join!(
            Self::spawn_child(
                ChildKind::Notifications,
                myself.get_cell(),
                &details,
                &args.context
            ),
            Self::spawn_child(
                ChildKind::Locations,
                myself.get_cell(),
                &details,
                &args.context
            ),
        );

        let mut started = Vec::new();
        let mut failure = None;
        for (kind, result) in [
            (ChildKind::Notifications, notifications),
            (ChildKind::Locations, locations),
        ] {
            match result {
                Ok((cell, handle)) => started.push((kind, cell, handle)),
                Err(err) => {
                    tracing::error!(address = %address, ?kind, error = %err, "Child spawn failed");
                    if failure.is_none() {
                        failure = Some(err);
                    }
                }
            }
        }
        if let Some(err) = failure {
            Self::unwind(started, &details, &args.context, fresh).await;
            return Err(err.into());
        }

        // Onboarding is persisted only once both children run
        if fresh {
            match journal
                .execute(EmployeeCommand::Onboard(args.request))
                .await
            {
                Ok(details) => tracing::info!(
                    address = %address,
                    locations = %details.locations_actor_id,
                    notifications = %details.notifications_actor_id,
                    "Employee onboarded"
                ),
                Err(err) => {
                    Self::unwind(started, &details, &args.context, true).await;
                    return Err(err.into());
                }
            }
        }

        let mut state = EmployeeActorState {
            journal,
            context: args.context,
            children: HashMap::new(),
            handles: Vec::new(),
            restarts: HashMap::new(),
            respawn_timer: None,
            winding_down: false,
        };
        for (kind, cell, handle) in started {
            state.adopt(kind, cell, handle);
        }

        Ok(state)
    }

    async fn handle(
        &self,
        myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            EmployeeMessage::GetDetails(reply) => {
                let details = state.journal.snapshot().await;
                if reply.send(details).is_err() {
                    tracing::debug!("Details reply channel closed");
                }
            }

            EmployeeMessage::UpdateDetails(request) => {
                match state
                    .journal
                    .execute(EmployeeCommand::UpdateDetails(request))
                    .await
                {
                    Ok(details) => tracing::info!(
                        address = %state.journal.address(),
                        first_name = %details.first_name,
                        last_name = %details.last_name,
                        "Employee details updated"
                    ),
                    Err(err) if err.is_persistence() => return Err(err.into()),
                    Err(err) => tracing::warn!(
                        address = %state.journal.address(),
                        error = %err,
                        "Details update rejected"
                    ),
                }
            }

            EmployeeMessage::Offboard => {
                if state.winding_down {
                    tracing::debug!(address = %state.journal.address(), "Already offboarding");
                    return Ok(());
                }
                state.journal.execute(EmployeeCommand::Offboard).await?;
                state.winding_down = true;
                tracing::info!(
                    address = %state.journal.address(),
                    children = state.children.len(),
                    "Employee offboarded, cancelling children"
                );

                for entry in state.children.values() {
                    entry.cell.stop(Some("employee offboarded".to_string()));
                }
                if state.children.is_empty() {
                    myself.stop(Some("offboarded".to_string()));
                }
            }

            EmployeeMessage::RestartChild(kind) => {
                if state.winding_down {
                    return Ok(());
                }
                let details = state.journal.snapshot().await;
                match Self::spawn_child(kind, myself.get_cell(), &details, &state.context).await {
                    Ok((cell, handle)) => {
                        tracing::info!(
                            address = %Self::child_address(&details, kind),
                            "Child restarted"
                        );
                        state.adopt(kind, cell, handle);
                    }
                    Err(err) => {
                        let restarts = state.restarts.entry(kind).or_insert(0);
                        *restarts += 1;
                        let address = Self::child_address(&details, kind).to_string();
                        if *restarts > state.context.config.supervision.max_child_restarts {
                            tracing::error!(address = %address, error = %err, "Child restart failed");
                            return Err(SupervisionError::RestartLimitExceeded {
                                address,
                                restarts: state.context.config.supervision.max_child_restarts,
                            }
                            .into());
                        }
                        tracing::warn!(address = %address, error = %err, "Child restart failed, retrying");
                        state.respawn_timer = Some(myself.send_after(RESPAWN_RETRY_DELAY, move || {
                            EmployeeMessage::RestartChild(kind)
                        }));
                    }
                }
            }
        }

        Ok(())
    }

    async fn handle_supervisor_evt(
        &self,
        myself: ActorRef<Self::Msg>,
        evt: SupervisionEvent,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match evt {
            SupervisionEvent::ActorTerminated(cell, _, reason) => {
                let reason = reason.unwrap_or_else(|| "terminated".to_string());
                Self::on_child_exit(&myself, state, cell.get_id(), reason, false).await
            }
            SupervisionEvent::ActorFailed(cell, err) => {
                Self::on_child_exit(&myself, state, cell.get_id(), err.to_string(), true).await
            }
            _ => Ok(()),
        }
    }

    async fn post_stop(
        &self,
        _myself: ActorRef<Self::Msg>,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        if let Some(timer) = state.respawn_timer.take() {
            timer.abort();
        }
        // Cancel whatever is still running and wait for every child to settle
        for entry in state.children.values() {
            entry.cell.stop(Some("employee stopped".to_string()));
        }
        for handle in state.handles.drain(..) {
            if handle.await.is_err() {
                tracing::debug!(address = %state.journal.address(), "Child task ended abnormally");
            }
        }
        tracing::info!(
            address = %state.journal.address(),
            offboarded = state.winding_down,
            "Employee actor stopped"
        );
        Ok(())
    }
}

#[cfg(test)]
#[path = "tests/employee_tests.rs"]
mod tests;
