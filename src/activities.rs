//! Side-effecting calls made by the digest scheduler.
//!
//! The scheduler never calls an activity directly: it goes through
//! [`execute_activity`], which applies a start-to-close timeout per attempt
//! and the retry policy from the configuration.

use crate::config::ActivityOptions;
use crate::domain::requests::SendDigestRequest;
use async_trait::async_trait;
use std::future::Future;
use thiserror::Error;

/// Delay until the next DAILY digest.
pub const DAILY_DELAY_SECS: u64 = 86_400;
/// Delay until the next MONDAY digest. Stand-in, not a calendar computation.
pub const MONDAY_DELAY_SECS: u64 = 604_800;
/// Delay until the next FRIDAY digest. Stand-in, not a calendar computation.
pub const FRIDAY_DELAY_SECS: u64 = 1_209_600;

/// Error of a single activity attempt.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ActivityError {
    #[error("invalid frequency: {frequency}")]
    InvalidFrequency { frequency: String },

    #[error("timed out after {after_ms}ms")]
    Timeout { after_ms: u64 },

    #[error("{message}")]
    Failed { message: String },
}

impl ActivityError {
    /// Invalid input fails the same way on every attempt.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, ActivityError::InvalidFrequency { .. })
    }
}

/// Final failure of an activity after the retry policy gave up.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{activity} failed after {attempts} attempt(s): {error}")]
pub struct ActivityFailure {
    pub activity: &'static str,
    pub attempts: u32,
    pub error: ActivityError,
}

/// Operations the digest scheduler depends on.
#[async_trait]
pub trait DigestActivities: Send + Sync + 'static {
    /// Seconds until the next digest for the given frequency name.
    async fn compute_next_delay(&self, frequency: &str) -> Result<u64, ActivityError>;

    /// Delivers the notification digest of one employee.
    async fn send_digest(&self, request: SendDigestRequest) -> Result<(), ActivityError>;
}

/// Default activity implementation.
#[derive(Debug, Clone, Default)]
pub struct DigestService;

#[async_trait]
impl DigestActivities for DigestService {
    async fn compute_next_delay(&self, frequency: &str) -> Result<u64, ActivityError> {
        match frequency {
            "DAILY" => Ok(DAILY_DELAY_SECS),
            "MONDAY" => Ok(MONDAY_DELAY_SECS),
            "FRIDAY" => Ok(FRIDAY_DELAY_SECS),
            other => Err(ActivityError::InvalidFrequency {
                frequency: other.to_string(),
            }),
        }
    }

    async fn send_digest(&self, request: SendDigestRequest) -> Result<(), ActivityError> {
        tracing::info!(employee_id = %request.employee_id, "Sending notification digest");
        Ok(())
    }
}

/// Runs `call` under the timeout and retry policy of `options`.
pub async fn execute_activity<T, F, Fut>(
    activity: &'static str,
    options: &ActivityOptions,
    mut call: F,
) -> Result<T, ActivityFailure>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ActivityError>>,
{
    let max_attempts = options.retry.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;

        let error = match tokio::time::timeout(options.timeout(), call()).await {
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(error)) => error,
            Err(_) => ActivityError::Timeout {
                after_ms: options.timeout_ms,
            },
        };

        if !error.is_retryable() || attempt >= max_attempts {
            return Err(ActivityFailure {
                activity,
                attempts: attempt,
                error,
            });
        }

        let backoff = options.retry.backoff_after(attempt);
        tracing::warn!(
            activity,
            attempt,
            max_attempts,
            backoff_ms = backoff.as_millis() as u64,
            error = %error,
            "Activity attempt failed, retrying"
        );
        tokio::time::sleep(backoff).await;
    }
}

#[cfg(test)]
#[path = "activities_tests.rs"]
mod tests;
