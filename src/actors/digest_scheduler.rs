//! Digest scheduler actor.
//!
//! Runs the notification digest cycle of one employee:
//!
//! 1. wait while paused (or idle for NEVER)
//! 2. compute the delay until the next digest
//! 3. race a reschedule against the persisted deadline
//! 4. send the digest if the deadline won
//! 5. restart with a fresh cycle carrying only `{frequency, paused}`
//!
//! The handler never waits on a timer or an activity. Timers are
//! `send_after` self-messages and activities run on spawned tasks; both
//! report back tagged with the cycle that started them, so results from a
//! cycle that has since been restarted are dropped.

use super::ActorContext;
use crate::activities::{execute_activity, ActivityFailure};
use crate::domain::notifications::{
    resolve_wait, CycleStep, NotificationSchedule, ScheduleCommand, WaitOutcome,
};
use crate::domain::requests::{RescheduleRequest, SendDigestRequest, StartScheduleRequest};
use crate::domain::types::TimestampUtc;
use crate::journal::Journal;
use async_trait::async_trait;
use ractor::concurrency::JoinHandle;
use ractor::{Actor, ActorProcessingErr, ActorRef, MessagingErr};
use tokio::sync::{oneshot, watch};

/// Messages accepted by the digest scheduler.
pub enum DigestSchedulerMessage {
    /// Change frequency and/or pause flag (signal).
    Reschedule(RescheduleRequest),
    /// Read the current schedule (query).
    GetState(oneshot::Sender<NotificationSchedule>),
    /// Result of the delay computation started in `cycle`.
    DelayComputed {
        cycle: u64,
        result: Result<u64, ActivityFailure>,
    },
    /// The deadline armed in `cycle` elapsed.
    DigestDue { cycle: u64 },
    /// Result of the digest send started in `cycle`.
    DigestSendFinished {
        cycle: u64,
        result: Result<(), ActivityFailure>,
    },
    /// Replace `cycle` with a fresh one.
    ContinueAsNew { cycle: u64 },
}

pub struct DigestSchedulerArgs {
    pub address: String,
    /// Start input, used only when the journal holds no cycle yet.
    pub start: StartScheduleRequest,
    pub context: ActorContext,
}

/// What the current cycle is suspended on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerPhase {
    Paused,
    Idle,
    Stalled,
    ComputingDelay,
    AwaitingDue,
    Sending,
    Restarting,
}

pub struct DigestSchedulerState {
    journal: Journal<NotificationSchedule>,
    snapshot_rx: watch::Receiver<NotificationSchedule>,
    context: ActorContext,
    phase: SchedulerPhase,
    timer: Option<JoinHandle<Result<(), MessagingErr<DigestSchedulerMessage>>>>,
    activity: Option<JoinHandle<()>>,
}

impl DigestSchedulerState {
    fn cycle(&self) -> u64 {
        self.snapshot_rx.borrow().cycle
    }

    fn cancel_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }

    fn cancel_activity(&mut self) {
        if let Some(activity) = self.activity.take() {
            activity.abort();
        }
    }
}

pub struct DigestScheduler;

impl DigestScheduler {
    /// Continues the current cycle from whatever the schedule says it needs.
    async fn drive(
        myself: &ActorRef<DigestSchedulerMessage>,
        state: &mut DigestSchedulerState,
    ) -> Result<(), ActorProcessingErr> {
        let schedule = state.journal.snapshot().await;
        let address = state.journal.address().to_string();
        let cycle = schedule.cycle;

        match schedule.next_step() {
            CycleStep::Restart => {
                Self::queue_restart(myself, state, cycle);
            }
            CycleStep::Paused => {
                state.phase = SchedulerPhase::Paused;
                tracing::info!(address = %address, cycle, "Digest schedule paused");
            }
            CycleStep::Idle => {
                state.phase = SchedulerPhase::Idle;
                tracing::info!(
                    address = %address,
                    cycle,
                    "Digest frequency is NEVER, waiting for reschedule"
                );
            }
            CycleStep::Stalled => {
                state.phase = SchedulerPhase::Stalled;
                tracing::warn!(
                    address = %address,
                    cycle,
                    error = schedule.last_error.as_deref().unwrap_or_default(),
                    "Digest cycle stalled, waiting for reschedule"
                );
            }
            CycleStep::ComputeDelay => {
                state.phase = SchedulerPhase::ComputingDelay;
                state.cancel_activity();

                let actor = myself.clone();
                let activities = state.context.activities.clone();
                let options = state.context.config.notifications.compute_delay.clone();
                let frequency = schedule.frequency.as_str();
                state.activity = Some(tokio::spawn(async move {
                    let result = execute_activity("compute_next_delay", &options, || {
                        activities.compute_next_delay(frequency)
                    })
                    .await;
                    if actor
                        .send_message(DigestSchedulerMessage::DelayComputed { cycle, result })
                        .is_err()
                    {
                        tracing::debug!(cycle, "Scheduler gone before delay was computed");
                    }
                }));
            }
            CycleStep::AwaitDue(due_at) => {
                state.phase = SchedulerPhase::AwaitingDue;
                state.cancel_timer();

                let remaining = due_at.remaining_from(TimestampUtc::now());
                tracing::info!(
                    address = %address,
                    cycle,
                    due_at = %due_at.to_rfc3339(),
                    remaining_secs = remaining.as_secs(),
                    "Digest timer armed"
                );
                state.timer = Some(myself.send_after(remaining, move || {
                    DigestSchedulerMessage::DigestDue { cycle }
                }));
            }
        }

        Ok(())
    }

    /// Queues the restart behind anything already in the mailbox.
    fn queue_restart(
        myself: &ActorRef<DigestSchedulerMessage>,
        state: &mut DigestSchedulerState,
        cycle: u64,
    ) {
        state.phase = SchedulerPhase::Restarting;
        state.cancel_timer();
        if myself
            .send_message(DigestSchedulerMessage::ContinueAsNew { cycle })
            .is_err()
        {
            tracing::debug!(cycle, "Scheduler stopping, restart dropped");
        }
    }

    fn start_send(myself: &ActorRef<DigestSchedulerMessage>, state: &mut DigestSchedulerState) {
        state.phase = SchedulerPhase::Sending;
        state.cancel_activity();

        let schedule = state.snapshot_rx.borrow().clone();
        let cycle = schedule.cycle;
        let actor = myself.clone();
        let activities = state.context.activities.clone();
        let options = state.context.config.notifications.send_digest.clone();
        let request = SendDigestRequest {
            employee_id: schedule.employee_id,
        };

        tracing::info!(
            address = %state.journal.address(),
            cycle,
            employee_id = %request.employee_id,
            "Digest due, sending"
        );
        state.activity = Some(tokio::spawn(async move {
            let result = execute_activity("send_digest", &options, || {
                activities.send_digest(request.clone())
            })
            .await;
            if actor
                .send_message(DigestSchedulerMessage::DigestSendFinished { cycle, result })
                .is_err()
            {
                tracing::debug!(cycle, "Scheduler gone before digest send finished");
            }
        }));
    }
}

#[async_trait]
impl Actor for DigestScheduler {
    type Msg = DigestSchedulerMessage;
    type State = DigestSchedulerState;
    type Arguments = DigestSchedulerArgs;

    async fn pre_start(
        &self,
        _myself: ActorRef<Self::Msg>,
        args: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        let (snapshot_tx, snapshot_rx) = watch::channel(NotificationSchedule::default());
        let journal = Journal::open(&args.address, &args.context.config, snapshot_tx).await?;

        let existing = journal.snapshot().await;
        if existing.is_started() {
            tracing::info!(
                address = %args.address,
                cycle = existing.cycle,
                frequency = %existing.frequency,
                paused = existing.paused,
                "Digest scheduler resumed"
            );
        } else {
            let schedule = journal
                .execute(ScheduleCommand::StartCycle(args.start))
                .await?;
            tracing::info!(
                address = %args.address,
                frequency = %schedule.frequency,
                paused = schedule.paused,
                "Digest scheduler started"
            );
        }

        Ok(DigestSchedulerState {
            journal,
            snapshot_rx,
            context: args.context,
            phase: SchedulerPhase::Restarting,
            timer: None,
            activity: None,
        })
    }

    async fn post_start(
        &self,
        myself: ActorRef<Self::Msg>,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        Self::drive(&myself, state).await
    }

    async fn handle(
        &self,
        myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            DigestSchedulerMessage::GetState(reply) => {
                let schedule = state.snapshot_rx.borrow().clone();
                if reply.send(schedule).is_err() {
                    tracing::debug!("Schedule reply channel closed");
                }
            }

            DigestSchedulerMessage::Reschedule(request) => {
                let schedule = state
                    .journal
                    .execute(ScheduleCommand::RequestReschedule(request))
                    .await?;
                tracing::info!(
                    address = %state.journal.address(),
                    cycle = schedule.cycle,
                    frequency = %request.frequency,
                    paused = request.paused,
                    phase = ?state.phase,
                    "Reschedule recorded"
                );

                match state.phase {
                    SchedulerPhase::Paused
                    | SchedulerPhase::Idle
                    | SchedulerPhase::Stalled
                    | SchedulerPhase::AwaitingDue => {
                        Self::queue_restart(&myself, state, schedule.cycle);
                    }
                    // Picked up when the in-flight step reports back
                    SchedulerPhase::ComputingDelay
                    | SchedulerPhase::Sending
                    | SchedulerPhase::Restarting => {}
                }
            }

            DigestSchedulerMessage::DelayComputed { cycle, result } => {
                if cycle != state.cycle() || state.phase != SchedulerPhase::ComputingDelay {
                    tracing::debug!(cycle, "Ignoring stale delay result");
                    return Ok(());
                }
                state.activity = None;

                match result {
                    Ok(seconds) => {
                        state
                            .journal
                            .execute(ScheduleCommand::RecordDelay { seconds })
                            .await?;
                        tracing::info!(
                            address = %state.journal.address(),
                            cycle,
                            next_digest_send_in_seconds = seconds,
                            "Digest delay computed"
                        );
                    }
                    Err(failure) => {
                        tracing::error!(
                            address = %state.journal.address(),
                            cycle,
                            error = %failure,
                            "Digest delay computation failed"
                        );
                        state
                            .journal
                            .execute(ScheduleCommand::RecordDelayFailure {
                                reason: failure.error.to_string(),
                            })
                            .await?;
                    }
                }

                Self::drive(&myself, state).await?;
            }

            DigestSchedulerMessage::DigestDue { cycle } => {
                if cycle != state.cycle() || state.phase != SchedulerPhase::AwaitingDue {
                    tracing::debug!(cycle, "Ignoring stale digest timer");
                    return Ok(());
                }
                state.timer = None;

                let reschedule_pending = state.snapshot_rx.borrow().pending_reschedule.is_some();
                match resolve_wait(reschedule_pending, true) {
                    Some(WaitOutcome::Rescheduled) => Self::queue_restart(&myself, state, cycle),
                    Some(WaitOutcome::DeadlineElapsed) => Self::start_send(&myself, state),
                    None => {}
                }
            }

            DigestSchedulerMessage::DigestSendFinished { cycle, result } => {
                if cycle != state.cycle() || state.phase != SchedulerPhase::Sending {
                    tracing::debug!(cycle, "Ignoring stale digest send result");
                    return Ok(());
                }
                state.activity = None;

                match result {
                    Ok(()) => {
                        state
                            .journal
                            .execute(ScheduleCommand::RecordDigestSent)
                            .await?;
                        tracing::info!(address = %state.journal.address(), cycle, "Digest sent");
                    }
                    Err(failure) => {
                        // Dead letter: the digest of this cycle is dropped
                        tracing::error!(
                            address = %state.journal.address(),
                            cycle,
                            attempts = failure.attempts,
                            error = %failure.error,
                            "Digest send failed, giving up for this cycle"
                        );
                        state
                            .journal
                            .execute(ScheduleCommand::RecordDigestFailure {
                                reason: failure.error.to_string(),
                                attempts: failure.attempts,
                            })
                            .await?;
                    }
                }

                Self::drive(&myself, state).await?;
            }

            DigestSchedulerMessage::ContinueAsNew { cycle } => {
                if cycle != state.cycle() {
                    tracing::debug!(cycle, "Ignoring duplicate restart");
                    return Ok(());
                }
                state.cancel_timer();
                state.cancel_activity();

                let checkpoint = state.journal.snapshot().await.checkpoint();
                let schedule = state
                    .journal
                    .execute(ScheduleCommand::StartCycle(checkpoint))
                    .await?;
                state.journal.compact().await?;
                tracing::info!(
                    address = %state.journal.address(),
                    cycle = schedule.cycle,
                    frequency = %schedule.frequency,
                    paused = schedule.paused,
                    "Digest cycle restarted"
                );

                Self::drive(&myself, state).await?;
            }
        }

        Ok(())
    }

    async fn post_stop(
        &self,
        _myself: ActorRef<Self::Msg>,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        state.cancel_timer();
        state.cancel_activity();
        tracing::info!(
            address = %state.journal.address(),
            phase = ?state.phase,
            "Digest scheduler stopped"
        );
        Ok(())
    }
}

#[cfg(test)]
#[path = "tests/digest_scheduler_tests.rs"]
mod tests;
