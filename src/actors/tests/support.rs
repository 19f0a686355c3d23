//! Shared fixtures for actor and engine tests.

use crate::activities::{ActivityError, DigestActivities};
use crate::config::{EngineConfig, RetryPolicy};
use crate::domain::requests::SendDigestRequest;
use crate::domain::types::EmployeeId;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::future::Future;
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

/// Delay returned once the scripted delays are used up.
pub const FALLBACK_DELAY_SECS: u64 = 3_600;

/// Activities whose results are scripted by the test.
#[derive(Default)]
pub struct ScriptedActivities {
    delays: Mutex<VecDeque<Result<u64, ActivityError>>>,
    send_failures: Mutex<u32>,
    delay_calls: Mutex<Vec<String>>,
    send_attempts: Mutex<u32>,
    sent: Mutex<Vec<EmployeeId>>,
}

impl ScriptedActivities {
    pub fn new() -> Self {
        Self::default()
    }

    /// Results of the next delay computations, in order.
    pub fn with_delays(self, delays: Vec<Result<u64, ActivityError>>) -> Self {
        *self.delays.lock().unwrap() = delays.into();
        self
    }

    /// Number of send attempts that fail before sends succeed.
    pub fn with_send_failures(self, failures: u32) -> Self {
        *self.send_failures.lock().unwrap() = failures;
        self
    }

    pub fn delay_calls(&self) -> Vec<String> {
        self.delay_calls.lock().unwrap().clone()
    }

    pub fn send_attempts(&self) -> u32 {
        *self.send_attempts.lock().unwrap()
    }

    pub fn sent(&self) -> Vec<EmployeeId> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl DigestActivities for ScriptedActivities {
    async fn compute_next_delay(&self, frequency: &str) -> Result<u64, ActivityError> {
        self.delay_calls.lock().unwrap().push(frequency.to_string());
        self.delays
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(FALLBACK_DELAY_SECS))
    }

    async fn send_digest(&self, request: SendDigestRequest) -> Result<(), ActivityError> {
        *self.send_attempts.lock().unwrap() += 1;
        let mut failures = self.send_failures.lock().unwrap();
        if *failures > 0 {
            *failures -= 1;
            return Err(ActivityError::Failed {
                message: "mail relay unavailable".to_string(),
            });
        }
        self.sent.lock().unwrap().push(request.employee_id);
        Ok(())
    }
}

/// Config rooted at `data_dir` with fast retries.
pub fn test_config(data_dir: &Path) -> EngineConfig {
    let mut config = EngineConfig::with_data_dir(data_dir);
    config.query_timeout_ms = 2_000;
    config.notifications.compute_delay.timeout_ms = 1_000;
    config.notifications.send_digest.timeout_ms = 1_000;
    config.notifications.send_digest.retry = RetryPolicy {
        max_attempts: 2,
        backoff_ms: 1,
        backoff_coefficient: 1.0,
        max_backoff_ms: 1,
    };
    config
}

/// A process-unique employee id; the actor registry is global.
pub fn unique_id() -> EmployeeId {
    EmployeeId::from(format!("emp-{}", uuid::Uuid::new_v4()))
}

/// Polls `check` until it yields a value, panicking after five seconds.
pub async fn eventually<T, F, Fut>(what: &str, mut check: F) -> T
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Option<T>>,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        if let Some(value) = check().await {
            return value;
        }
        if tokio::time::Instant::now() >= deadline {
            panic!("timed out waiting for {}", what);
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
