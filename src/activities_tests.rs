use super::*;
use crate::config::RetryPolicy;
use crate::domain::types::{EmployeeId, Frequency};
use proptest::prelude::*;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

fn fast_options(max_attempts: u32, timeout_ms: u64) -> ActivityOptions {
    ActivityOptions {
        timeout_ms,
        retry: RetryPolicy {
            max_attempts,
            backoff_ms: 1,
            backoff_coefficient: 1.0,
            max_backoff_ms: 1,
        },
    }
}

#[tokio::test]
async fn compute_next_delay_known_frequencies() {
    let service = DigestService;
    assert_eq!(service.compute_next_delay("DAILY").await, Ok(86_400));
    assert_eq!(service.compute_next_delay("MONDAY").await, Ok(604_800));
    assert_eq!(service.compute_next_delay("FRIDAY").await, Ok(1_209_600));
}

#[tokio::test]
async fn compute_next_delay_rejects_unknown_frequency() {
    let service = DigestService;
    assert_eq!(
        service.compute_next_delay("WEDNESDAY").await,
        Err(ActivityError::InvalidFrequency {
            frequency: "WEDNESDAY".to_string()
        })
    );
    assert!(service.compute_next_delay("NEVER").await.is_err());
}

#[tokio::test]
async fn send_digest_succeeds() {
    let service = DigestService;
    let result = service
        .send_digest(SendDigestRequest {
            employee_id: EmployeeId::from("emp-1"),
        })
        .await;
    assert!(result.is_ok());
}

#[tokio::test]
async fn execute_activity_retries_until_success() {
    let calls = AtomicU32::new(0);
    let result = execute_activity("send_digest", &fast_options(3, 1_000), || {
        let attempt = calls.fetch_add(1, Ordering::SeqCst) + 1;
        async move {
            if attempt < 3 {
                Err(ActivityError::Failed {
                    message: "unavailable".to_string(),
                })
            } else {
                Ok(attempt)
            }
        }
    })
    .await;

    assert_eq!(result, Ok(3));
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn execute_activity_gives_up_after_max_attempts() {
    let calls = AtomicU32::new(0);
    let result: Result<(), _> = execute_activity("send_digest", &fast_options(2, 1_000), || {
        calls.fetch_add(1, Ordering::SeqCst);
        async {
            Err(ActivityError::Failed {
                message: "unavailable".to_string(),
            })
        }
    })
    .await;

    let failure = result.unwrap_err();
    assert_eq!(failure.activity, "send_digest");
    assert_eq!(failure.attempts, 2);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn execute_activity_does_not_retry_invalid_frequency() {
    let calls = AtomicU32::new(0);
    let result: Result<u64, _> =
        execute_activity("compute_next_delay", &fast_options(5, 1_000), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async {
                Err(ActivityError::InvalidFrequency {
                    frequency: "WEDNESDAY".to_string(),
                })
            }
        })
        .await;

    assert_eq!(result.unwrap_err().attempts, 1);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn execute_activity_times_out_each_attempt() {
    let result: Result<(), _> = execute_activity("send_digest", &fast_options(2, 10), || async {
        tokio::time::sleep(Duration::from_secs(5)).await;
        Ok(())
    })
    .await;

    let failure = result.unwrap_err();
    assert_eq!(failure.attempts, 2);
    assert_eq!(failure.error, ActivityError::Timeout { after_ms: 10 });
}

fn scheduled_frequency() -> impl Strategy<Value = Frequency> {
    prop_oneof![
        Just(Frequency::Daily),
        Just(Frequency::Monday),
        Just(Frequency::Friday),
    ]
}

fn block_on<F: std::future::Future>(future: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
        .block_on(future)
}

proptest! {
    #[test]
    fn delay_is_deterministic_for_scheduled_frequencies(frequency in scheduled_frequency()) {
        let service = DigestService;
        let first = block_on(service.compute_next_delay(frequency.as_str())).unwrap();
        let second = block_on(service.compute_next_delay(frequency.as_str())).unwrap();
        prop_assert_eq!(first, second);
        prop_assert!(first > 0);
    }

    #[test]
    fn unknown_frequency_names_are_rejected(name in "[A-Za-z]{0,12}") {
        prop_assume!(!matches!(name.as_str(), "DAILY" | "MONDAY" | "FRIDAY"));
        let service = DigestService;
        let result = block_on(service.compute_next_delay(&name));
        prop_assert_eq!(result, Err(ActivityError::InvalidFrequency { frequency: name.clone() }));
    }
}
