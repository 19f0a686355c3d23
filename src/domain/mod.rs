//! Domain model for the employee actors.
//!
//! Every actor mutates its durable state only through commands on its own
//! aggregate; committed events rebuild both the aggregate and the read-only
//! snapshot its queries return.
//!
//! # Layout
//!
//! - **employee**: identity owned by the root actor
//! - **notifications**: digest schedule owned by the scheduler child
//! - **locations**: location record owned by the tracker child
//! - **cqrs**: projection trait and the query handler keeping snapshots current

pub mod cqrs;
pub mod employee;
pub mod errors;
pub mod locations;
pub mod notifications;
pub mod requests;
pub mod services;
pub mod types;

pub use cqrs::{Projection, SnapshotQuery};
pub use employee::{EmployeeAggregate, EmployeeCommand, EmployeeDetails, EmployeeEvent};
pub use errors::DomainError;
pub use locations::{LocationAggregate, LocationCommand, LocationEvent, LocationRecord};
pub use notifications::{
    resolve_wait, CycleStep, DigestDelivery, NotificationSchedule, ScheduleAggregate,
    ScheduleCommand, ScheduleEvent, WaitOutcome,
};
pub use requests::{
    OnboardEmployeeRequest, RescheduleRequest, SendDigestRequest, SetCurrentLocationRequest,
    StartLocationTrackingRequest, StartScheduleRequest, UpdateEmployeeDetailsRequest,
};
pub use services::{DomainClock, DomainServices};
pub use types::{EmployeeId, Frequency, TimestampUtc};
