//! Employee identity: commands, events, aggregate and the details projection.
//!
//! The employee aggregate is owned by the root actor. Names are the only
//! mutable fields; `offboarded` moves from false to true exactly once.

use crate::domain::cqrs::Projection;
use crate::domain::errors::DomainError;
use crate::domain::requests::{OnboardEmployeeRequest, UpdateEmployeeDetailsRequest};
use crate::domain::services::DomainServices;
use crate::domain::types::{EmployeeId, TimestampUtc};
use async_trait::async_trait;
use cqrs_es::{Aggregate, DomainEvent};
use serde::{Deserialize, Serialize};

/// Commands that can be executed against the employee aggregate.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmployeeCommand {
    /// Materialize the identity from the onboarding request.
    Onboard(OnboardEmployeeRequest),
    /// Overwrite the mutable name fields.
    UpdateDetails(UpdateEmployeeDetailsRequest),
    /// Mark the employee as offboarded (idempotent).
    Offboard,
}

/// Events emitted by the employee aggregate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmployeeEvent {
    EmployeeOnboarded {
        id: EmployeeId,
        first_name: String,
        last_name: String,
        default_location: String,
        default_timezone: String,
        locations_actor_id: String,
        notifications_actor_id: String,
        onboarded_at: TimestampUtc,
    },
    DetailsUpdated {
        first_name: String,
        last_name: String,
        updated_at: TimestampUtc,
    },
    EmployeeOffboarded {
        offboarded_at: TimestampUtc,
    },
}

impl DomainEvent for EmployeeEvent {
    fn event_type(&self) -> String {
        match self {
            Self::EmployeeOnboarded { .. } => "EmployeeOnboarded".to_string(),
            Self::DetailsUpdated { .. } => "DetailsUpdated".to_string(),
            Self::EmployeeOffboarded { .. } => "EmployeeOffboarded".to_string(),
        }
    }

    fn event_version(&self) -> String {
        "1.0".to_string()
    }
}

/// Identity fields the aggregate needs to validate commands.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActiveEmployee {
    id: EmployeeId,
    first_name: String,
    last_name: String,
    offboarded: bool,
}

impl ActiveEmployee {
    pub fn is_offboarded(&self) -> bool {
        self.offboarded
    }
}

/// Employee aggregate state.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub enum EmployeeState {
    #[default]
    Uninitialized,
    Active(ActiveEmployee),
}

/// The employee aggregate.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EmployeeAggregate {
    pub state: EmployeeState,
}

#[async_trait]
impl Aggregate for EmployeeAggregate {
    type Command = EmployeeCommand;
    type Event = EmployeeEvent;
    type Error = DomainError;
    type Services = DomainServices;

    fn aggregate_type() -> String {
        "employee".to_string()
    }

    async fn handle(
        &self,
        command: Self::Command,
        services: &Self::Services,
    ) -> Result<Vec<Self::Event>, Self::Error> {
        let now = services.clock.now();

        match (&self.state, command) {
            (EmployeeState::Uninitialized, EmployeeCommand::Onboard(request)) => {
                if request.id.is_empty() {
                    return Err(DomainError::InvalidInput {
                        message: "employee id must not be empty".to_string(),
                    });
                }
                Ok(vec![EmployeeEvent::EmployeeOnboarded {
                    locations_actor_id: request.id.locations_address(),
                    notifications_actor_id: request.id.notifications_address(),
                    id: request.id,
                    first_name: request.first_name,
                    last_name: request.last_name,
                    default_location: request.default_location,
                    default_timezone: request.default_timezone,
                    onboarded_at: now,
                }])
            }

            (EmployeeState::Active(employee), EmployeeCommand::Onboard(_)) => {
                Err(DomainError::AlreadyOnboarded {
                    id: employee.id.to_string(),
                })
            }

            (EmployeeState::Uninitialized, _) => {
                Err(DomainError::NotInitialized { entity: "employee" })
            }

            // Same names again leave the state untouched; nothing to record.
            (EmployeeState::Active(employee), EmployeeCommand::UpdateDetails(request))
                if employee.first_name == request.first_name
                    && employee.last_name == request.last_name =>
            {
                Ok(Vec::new())
            }

            (EmployeeState::Active(_), EmployeeCommand::UpdateDetails(request)) => {
                Ok(vec![EmployeeEvent::DetailsUpdated {
                    first_name: request.first_name,
                    last_name: request.last_name,
                    updated_at: now,
                }])
            }

            (EmployeeState::Active(employee), EmployeeCommand::Offboard) if employee.offboarded => {
                Ok(Vec::new())
            }

            (EmployeeState::Active(_), EmployeeCommand::Offboard) => {
                Ok(vec![EmployeeEvent::EmployeeOffboarded { offboarded_at: now }])
            }
        }
    }

    fn apply(&mut self, event: Self::Event) {
        match (&mut self.state, event) {
            (
                EmployeeState::Uninitialized,
                EmployeeEvent::EmployeeOnboarded {
                    id,
                    first_name,
                    last_name,
                    ..
                },
            ) => {
                self.state = EmployeeState::Active(ActiveEmployee {
                    id,
                    first_name,
                    last_name,
                    offboarded: false,
                });
            }
            (
                EmployeeState::Active(employee),
                EmployeeEvent::DetailsUpdated {
                    first_name,
                    last_name,
                    ..
                },
            ) => {
                employee.first_name = first_name;
                employee.last_name = last_name;
            }
            (EmployeeState::Active(employee), EmployeeEvent::EmployeeOffboarded { .. }) => {
                employee.offboarded = true;
            }
            (state, event) => {
                tracing::warn!(
                    "Ignoring {} on employee aggregate in state {:?}",
                    event.event_type(),
                    state
                );
            }
        }
    }
}

/// Snapshot returned by the `get_details` query.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EmployeeDetails {
    pub id: EmployeeId,
    pub first_name: String,
    pub last_name: String,
    pub default_location: String,
    pub default_timezone: String,
    pub locations_actor_id: String,
    pub notifications_actor_id: String,
    pub offboarded: bool,
    pub onboarded_at: Option<TimestampUtc>,
    pub offboarded_at: Option<TimestampUtc>,
    pub last_event_sequence: u64,
}

impl EmployeeDetails {
    /// Returns true once the onboarding event has been applied.
    pub fn is_onboarded(&self) -> bool {
        self.onboarded_at.is_some()
    }
}

impl Projection for EmployeeDetails {
    type Aggregate = EmployeeAggregate;

    fn apply_event(&mut self, event: &EmployeeEvent, sequence: u64) {
        self.last_event_sequence = sequence;

        match event {
            EmployeeEvent::EmployeeOnboarded {
                id,
                first_name,
                last_name,
                default_location,
                default_timezone,
                locations_actor_id,
                notifications_actor_id,
                onboarded_at,
            } => {
                self.id = id.clone();
                self.first_name = first_name.clone();
                self.last_name = last_name.clone();
                self.default_location = default_location.clone();
                self.default_timezone = default_timezone.clone();
                self.locations_actor_id = locations_actor_id.clone();
                self.notifications_actor_id = notifications_actor_id.clone();
                self.offboarded = false;
                self.onboarded_at = Some(*onboarded_at);
                self.offboarded_at = None;
            }

            EmployeeEvent::DetailsUpdated {
                first_name,
                last_name,
                ..
            } => {
                self.first_name = first_name.clone();
                self.last_name = last_name.clone();
            }

            EmployeeEvent::EmployeeOffboarded { offboarded_at } => {
                self.offboarded = true;
                self.offboarded_at = Some(*offboarded_at);
            }
        }
    }

    fn last_event_sequence(&self) -> u64 {
        self.last_event_sequence
    }
}

#[cfg(test)]
#[path = "tests/employee_tests.rs"]
mod tests;
