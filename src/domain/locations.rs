//! Current location/timezone record of an employee.

use crate::domain::cqrs::Projection;
use crate::domain::errors::DomainError;
use crate::domain::requests::{SetCurrentLocationRequest, StartLocationTrackingRequest};
use crate::domain::services::DomainServices;
use crate::domain::types::{EmployeeId, TimestampUtc};
use async_trait::async_trait;
use cqrs_es::{Aggregate, DomainEvent};
use serde::{Deserialize, Serialize};

/// Commands that can be executed against the location aggregate.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocationCommand {
    StartTracking {
        request: StartLocationTrackingRequest,
        source_actor_id: String,
    },
    SetCurrentLocation {
        request: SetCurrentLocationRequest,
        source_actor_id: String,
    },
}

/// Events emitted by the location aggregate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocationEvent {
    TrackingStarted {
        employee_id: EmployeeId,
        location: String,
        timezone: String,
        source_actor_id: String,
        started_at: TimestampUtc,
    },
    CurrentLocationSet {
        location: String,
        timezone: String,
        source_actor_id: String,
        set_at: TimestampUtc,
    },
}

impl DomainEvent for LocationEvent {
    fn event_type(&self) -> String {
        match self {
            Self::TrackingStarted { .. } => "TrackingStarted".to_string(),
            Self::CurrentLocationSet { .. } => "CurrentLocationSet".to_string(),
        }
    }

    fn event_version(&self) -> String {
        "1.0".to_string()
    }
}

/// The location aggregate.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LocationAggregate {
    employee_id: Option<EmployeeId>,
}

#[async_trait]
impl Aggregate for LocationAggregate {
    type Command = LocationCommand;
    type Event = LocationEvent;
    type Error = DomainError;
    type Services = DomainServices;

    fn aggregate_type() -> String {
        "employee_location".to_string()
    }

    async fn handle(
        &self,
        command: Self::Command,
        services: &Self::Services,
    ) -> Result<Vec<Self::Event>, Self::Error> {
        let now = services.clock.now();

        match (&self.employee_id, command) {
            (
                None,
                LocationCommand::StartTracking {
                    request,
                    source_actor_id,
                },
            ) => Ok(vec![LocationEvent::TrackingStarted {
                employee_id: request.employee_id,
                location: request.location,
                timezone: request.timezone,
                source_actor_id,
                started_at: now,
            }]),

            (Some(employee_id), LocationCommand::StartTracking { .. }) => {
                Err(DomainError::InvalidInput {
                    message: format!("location tracking for '{}' already started", employee_id),
                })
            }

            (None, LocationCommand::SetCurrentLocation { .. }) => Err(DomainError::NotInitialized {
                entity: "location record",
            }),

            (
                Some(_),
                LocationCommand::SetCurrentLocation {
                    request,
                    source_actor_id,
                },
            ) => Ok(vec![LocationEvent::CurrentLocationSet {
                location: request.location,
                timezone: request.timezone,
                source_actor_id,
                set_at: now,
            }]),
        }
    }

    fn apply(&mut self, event: Self::Event) {
        if let LocationEvent::TrackingStarted { employee_id, .. } = event {
            self.employee_id = Some(employee_id);
        }
    }
}

/// Current location record of one employee.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LocationRecord {
    pub employee_id: EmployeeId,
    pub location: String,
    pub timezone: String,
    /// Address of the actor that last wrote this record.
    pub source_actor_id: String,
    pub updated_at: Option<TimestampUtc>,
    pub last_event_sequence: u64,
}

impl LocationRecord {
    pub fn is_started(&self) -> bool {
        self.updated_at.is_some()
    }
}

impl Projection for LocationRecord {
    type Aggregate = LocationAggregate;

    fn apply_event(&mut self, event: &LocationEvent, sequence: u64) {
        self.last_event_sequence = sequence;

        match event {
            LocationEvent::TrackingStarted {
                employee_id,
                location,
                timezone,
                source_actor_id,
                started_at,
            } => {
                self.employee_id = employee_id.clone();
                self.location = location.clone();
                self.timezone = timezone.clone();
                self.source_actor_id = source_actor_id.clone();
                self.updated_at = Some(*started_at);
            }
            LocationEvent::CurrentLocationSet {
                location,
                timezone,
                source_actor_id,
                set_at,
            } => {
                self.location = location.clone();
                self.timezone = timezone.clone();
                self.source_actor_id = source_actor_id.clone();
                self.updated_at = Some(*set_at);
            }
        }
    }

    fn last_event_sequence(&self) -> u64 {
        self.last_event_sequence
    }
}

#[cfg(test)]
#[path = "tests/locations_tests.rs"]
mod tests;
