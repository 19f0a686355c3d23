//! Inputs accepted by the actors: start inputs and signal payloads.

use crate::domain::types::{EmployeeId, Frequency};
use serde::{Deserialize, Serialize};

/// Onboarding parameters for a new employee root actor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OnboardEmployeeRequest {
    pub id: EmployeeId,
    pub first_name: String,
    pub last_name: String,
    pub default_location: String,
    pub default_timezone: String,
}

/// Payload of the `update_details` signal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateEmployeeDetailsRequest {
    pub first_name: String,
    pub last_name: String,
}

/// Start input of the digest scheduler, and the checkpoint it restarts with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartScheduleRequest {
    pub employee_id: EmployeeId,
    pub frequency: Frequency,
    pub paused: bool,
}

/// Payload of the `reschedule` signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RescheduleRequest {
    pub frequency: Frequency,
    pub paused: bool,
}

/// Start input of the location tracker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartLocationTrackingRequest {
    pub employee_id: EmployeeId,
    pub location: String,
    pub timezone: String,
}

/// Payload of the `set_current_location` signal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetCurrentLocationRequest {
    pub location: String,
    pub timezone: String,
}

/// Input of the send-digest activity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendDigestRequest {
    pub employee_id: EmployeeId,
}
