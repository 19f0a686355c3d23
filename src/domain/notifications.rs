//! Notification digest schedule: commands, events, aggregate and projection.
//!
//! One schedule exists per employee. Every checkpoint-restart appends a
//! `CycleStarted` event carrying only `{frequency, paused}`; everything the
//! previous cycle computed (delay, pending reschedule, delivery) is reset.

use crate::domain::cqrs::Projection;
use crate::domain::errors::DomainError;
use crate::domain::requests::{RescheduleRequest, StartScheduleRequest};
use crate::domain::services::DomainServices;
use crate::domain::types::{EmployeeId, Frequency, TimestampUtc};
use async_trait::async_trait;
use cqrs_es::{Aggregate, DomainEvent};
use serde::{Deserialize, Serialize};

/// Commands that can be executed against the schedule aggregate.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleCommand {
    /// Begin a fresh cycle from a start input or checkpoint.
    StartCycle(StartScheduleRequest),
    /// Record a reschedule signal.
    RequestReschedule(RescheduleRequest),
    /// Record the result of the delay computation.
    RecordDelay { seconds: u64 },
    /// Record a failed delay computation.
    RecordDelayFailure { reason: String },
    /// Record a delivered digest.
    RecordDigestSent,
    /// Record a digest that could not be delivered after all attempts.
    RecordDigestFailure { reason: String, attempts: u32 },
}

/// Events emitted by the schedule aggregate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleEvent {
    CycleStarted {
        employee_id: EmployeeId,
        frequency: Frequency,
        paused: bool,
        cycle: u64,
        started_at: TimestampUtc,
    },
    RescheduleRequested {
        frequency: Frequency,
        paused: bool,
        requested_at: TimestampUtc,
    },
    DelayComputed {
        seconds: u64,
        due_at: TimestampUtc,
    },
    DelayComputationFailed {
        reason: String,
        failed_at: TimestampUtc,
    },
    DigestSent {
        employee_id: EmployeeId,
        sent_at: TimestampUtc,
    },
    DigestSendFailed {
        reason: String,
        attempts: u32,
        failed_at: TimestampUtc,
    },
}

impl DomainEvent for ScheduleEvent {
    fn event_type(&self) -> String {
        match self {
            Self::CycleStarted { .. } => "CycleStarted".to_string(),
            Self::RescheduleRequested { .. } => "RescheduleRequested".to_string(),
            Self::DelayComputed { .. } => "DelayComputed".to_string(),
            Self::DelayComputationFailed { .. } => "DelayComputationFailed".to_string(),
            Self::DigestSent { .. } => "DigestSent".to_string(),
            Self::DigestSendFailed { .. } => "DigestSendFailed".to_string(),
        }
    }

    fn event_version(&self) -> String {
        "1.0".to_string()
    }
}

/// The schedule aggregate.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScheduleAggregate {
    employee_id: Option<EmployeeId>,
    cycle: u64,
}

impl ScheduleAggregate {
    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    fn started_for(&self) -> Result<&EmployeeId, DomainError> {
        self.employee_id.as_ref().ok_or(DomainError::NotInitialized {
            entity: "notification schedule",
        })
    }
}

#[async_trait]
impl Aggregate for ScheduleAggregate {
    type Command = ScheduleCommand;
    type Event = ScheduleEvent;
    type Error = DomainError;
    type Services = DomainServices;

    fn aggregate_type() -> String {
        "notification_schedule".to_string()
    }

    async fn handle(
        &self,
        command: Self::Command,
        services: &Self::Services,
    ) -> Result<Vec<Self::Event>, Self::Error> {
        let now = services.clock.now();

        match command {
            ScheduleCommand::StartCycle(request) => {
                if request.employee_id.is_empty() {
                    return Err(DomainError::InvalidInput {
                        message: "schedule requires an employee id".to_string(),
                    });
                }
                if let Some(existing) = &self.employee_id {
                    if *existing != request.employee_id {
                        return Err(DomainError::InvalidInput {
                            message: format!(
                                "schedule belongs to '{}', not '{}'",
                                existing, request.employee_id
                            ),
                        });
                    }
                }
                Ok(vec![ScheduleEvent::CycleStarted {
                    employee_id: request.employee_id,
                    frequency: request.frequency,
                    paused: request.paused,
                    cycle: self.cycle.saturating_add(1),
                    started_at: now,
                }])
            }

            ScheduleCommand::RequestReschedule(request) => {
                self.started_for()?;
                Ok(vec![ScheduleEvent::RescheduleRequested {
                    frequency: request.frequency,
                    paused: request.paused,
                    requested_at: now,
                }])
            }

            ScheduleCommand::RecordDelay { seconds } => {
                self.started_for()?;
                Ok(vec![ScheduleEvent::DelayComputed {
                    seconds,
                    due_at: now.plus_seconds(seconds),
                }])
            }

            ScheduleCommand::RecordDelayFailure { reason } => {
                self.started_for()?;
                Ok(vec![ScheduleEvent::DelayComputationFailed {
                    reason,
                    failed_at: now,
                }])
            }

            ScheduleCommand::RecordDigestSent => {
                let employee_id = self.started_for()?.clone();
                Ok(vec![ScheduleEvent::DigestSent {
                    employee_id,
                    sent_at: now,
                }])
            }

            ScheduleCommand::RecordDigestFailure { reason, attempts } => {
                self.started_for()?;
                Ok(vec![ScheduleEvent::DigestSendFailed {
                    reason,
                    attempts,
                    failed_at: now,
                }])
            }
        }
    }

    fn apply(&mut self, event: Self::Event) {
        if let ScheduleEvent::CycleStarted {
            employee_id, cycle, ..
        } = event
        {
            self.employee_id = Some(employee_id);
            self.cycle = cycle;
        }
    }
}

/// Outcome of a digest attempt within the current cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DigestDelivery {
    Sent { at: TimestampUtc },
    Failed { reason: String, attempts: u32 },
}

/// Snapshot returned by the scheduler's `get_state` query.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NotificationSchedule {
    pub employee_id: EmployeeId,
    pub frequency: Frequency,
    pub paused: bool,
    /// Delay computed for this cycle; `None` until computed.
    pub next_digest_send_in_seconds: Option<u64>,
    pub next_digest_due_at: Option<TimestampUtc>,
    /// Latest reschedule received in this cycle, cleared on restart.
    pub pending_reschedule: Option<RescheduleRequest>,
    pub cycle: u64,
    pub delivery: Option<DigestDelivery>,
    pub last_error: Option<String>,
    pub last_event_sequence: u64,
}

/// Where a cycle stands, derived from the schedule alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleStep {
    /// The cycle is over; restart with the current `{frequency, paused}`.
    Restart,
    /// Waiting for a reschedule that clears the pause.
    Paused,
    /// NEVER frequency; nothing is due until rescheduled.
    Idle,
    /// Delay computation failed; waiting for a reschedule.
    Stalled,
    /// The delay for this cycle still has to be computed.
    ComputeDelay,
    /// Racing the reschedule signal against the persisted deadline.
    AwaitDue(TimestampUtc),
}

impl NotificationSchedule {
    /// Returns true once a cycle has been started.
    pub fn is_started(&self) -> bool {
        self.cycle > 0
    }

    /// The checkpoint a restart carries forward.
    pub fn checkpoint(&self) -> StartScheduleRequest {
        StartScheduleRequest {
            employee_id: self.employee_id.clone(),
            frequency: self.frequency,
            paused: self.paused,
        }
    }

    /// Decides how to continue the current cycle, used both at cycle start
    /// and when resuming from the journal after a crash.
    pub fn next_step(&self) -> CycleStep {
        if self.pending_reschedule.is_some() || self.delivery.is_some() {
            return CycleStep::Restart;
        }
        if self.paused {
            return CycleStep::Paused;
        }
        if !self.frequency.is_scheduled() {
            return CycleStep::Idle;
        }
        if self.last_error.is_some() {
            return CycleStep::Stalled;
        }
        match self.next_digest_due_at {
            Some(due_at) => CycleStep::AwaitDue(due_at),
            None => CycleStep::ComputeDelay,
        }
    }
}

impl Projection for NotificationSchedule {
    type Aggregate = ScheduleAggregate;

    fn apply_event(&mut self, event: &ScheduleEvent, sequence: u64) {
        self.last_event_sequence = sequence;

        match event {
            ScheduleEvent::CycleStarted {
                employee_id,
                frequency,
                paused,
                cycle,
                ..
            } => {
                self.employee_id = employee_id.clone();
                self.frequency = *frequency;
                self.paused = *paused;
                self.cycle = *cycle;
                self.next_digest_send_in_seconds = None;
                self.next_digest_due_at = None;
                self.pending_reschedule = None;
                self.delivery = None;
                self.last_error = None;
            }

            // The previously computed delay stays visible until the restart.
            ScheduleEvent::RescheduleRequested {
                frequency, paused, ..
            } => {
                self.frequency = *frequency;
                self.paused = *paused;
                self.pending_reschedule = Some(RescheduleRequest {
                    frequency: *frequency,
                    paused: *paused,
                });
            }

            ScheduleEvent::DelayComputed { seconds, due_at } => {
                self.next_digest_send_in_seconds = Some(*seconds);
                self.next_digest_due_at = Some(*due_at);
                self.last_error = None;
            }

            ScheduleEvent::DelayComputationFailed { reason, .. } => {
                self.next_digest_send_in_seconds = None;
                self.next_digest_due_at = None;
                self.last_error = Some(reason.clone());
            }

            ScheduleEvent::DigestSent { sent_at, .. } => {
                self.delivery = Some(DigestDelivery::Sent { at: *sent_at });
            }

            ScheduleEvent::DigestSendFailed {
                reason, attempts, ..
            } => {
                self.delivery = Some(DigestDelivery::Failed {
                    reason: reason.clone(),
                    attempts: *attempts,
                });
                self.last_error = Some(reason.clone());
            }
        }
    }

    fn last_event_sequence(&self) -> u64 {
        self.last_event_sequence
    }
}

/// Which condition ended the wait of a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    Rescheduled,
    DeadlineElapsed,
}

/// Resolves the reschedule-vs-deadline race. A recorded reschedule wins even
/// when the deadline elapsed at the same instant.
pub fn resolve_wait(reschedule_pending: bool, deadline_elapsed: bool) -> Option<WaitOutcome> {
    if reschedule_pending {
        Some(WaitOutcome::Rescheduled)
    } else if deadline_elapsed {
        Some(WaitOutcome::DeadlineElapsed)
    } else {
        None
    }
}

#[cfg(test)]
#[path = "tests/notifications_tests.rs"]
mod tests;
