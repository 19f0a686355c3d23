use super::*;
use crate::actors::test_support::{
    eventually, test_config, unique_id, ScriptedActivities, FALLBACK_DELAY_SECS,
};
use crate::actors::{DigestScheduler, DigestSchedulerArgs};
use crate::domain::requests::StartScheduleRequest;
use crate::domain::types::Frequency;
use std::path::Path;
use tempfile::tempdir;

fn engine(data_dir: &Path) -> Engine {
    Engine::new(test_config(data_dir), Arc::new(ScriptedActivities::new()))
}

fn request(id: &EmployeeId, first_name: &str) -> OnboardEmployeeRequest {
    OnboardEmployeeRequest {
        id: id.clone(),
        first_name: first_name.to_string(),
        last_name: "Hopper".to_string(),
        default_location: "New York".to_string(),
        default_timezone: "America/New_York".to_string(),
    }
}

#[tokio::test]
async fn test_onboard_starts_employee_and_children() {
    let dir = tempdir().unwrap();
    let engine = engine(dir.path());
    let id = unique_id();

    let handle = engine.onboard(request(&id, "Grace")).await.unwrap();
    assert_eq!(handle.current_details().first_name, "Grace");

    let details = engine.get_details(&id).await.unwrap();
    assert_eq!(details.id, id);
    assert_eq!(details.default_location, "New York");

    let location = engine.get_location(&id).await.unwrap();
    assert_eq!(location.location, "New York");
    assert_eq!(location.timezone, "America/New_York");

    let schedule = engine.get_notifications(&id).await.unwrap();
    assert_eq!(schedule.employee_id, id);
    assert_eq!(schedule.frequency, Frequency::Daily);
    assert!(!schedule.paused);

    engine.shutdown().await;
}

#[tokio::test]
async fn test_onboard_rejects_live_duplicate() {
    let dir = tempdir().unwrap();
    let engine = engine(dir.path());
    let id = unique_id();

    engine.onboard(request(&id, "Grace")).await.unwrap();
    let err = engine.onboard(request(&id, "Grace")).await.err().unwrap();
    assert!(matches!(err, EngineError::Spawn { .. }));

    // The original is unaffected
    assert_eq!(engine.get_details(&id).await.unwrap().first_name, "Grace");
    engine.shutdown().await;
}

#[tokio::test]
async fn test_onboard_rejects_empty_id() {
    let dir = tempdir().unwrap();
    let engine = engine(dir.path());

    let err = engine
        .onboard(request(&EmployeeId::from("  "), "Grace"))
        .await
        .err()
        .unwrap();
    assert!(matches!(
        err,
        EngineError::Domain(DomainError::InvalidInput { .. })
    ));
}

#[tokio::test]
async fn test_update_details_is_visible_to_next_query() {
    let dir = tempdir().unwrap();
    let engine = engine(dir.path());
    let id = unique_id();
    let handle = engine.onboard(request(&id, "Grace")).await.unwrap();

    engine
        .update_details(
            &id,
            UpdateEmployeeDetailsRequest {
                first_name: "Amazing".to_string(),
                last_name: "Grace".to_string(),
            },
        )
        .unwrap();

    let details = engine.get_details(&id).await.unwrap();
    assert_eq!(details.first_name, "Amazing");
    assert_eq!(details.last_name, "Grace");
    assert_eq!(handle.current_details().first_name, "Amazing");

    engine.shutdown().await;
}

#[tokio::test]
async fn test_reschedule_is_routed_to_scheduler() {
    let dir = tempdir().unwrap();
    let engine = engine(dir.path());
    let id = unique_id();
    engine.onboard(request(&id, "Grace")).await.unwrap();
    let (engine, id) = (&engine, &id);

    eventually("first delay", || async move {
        let schedule = engine.get_notifications(id).await.ok()?;
        (schedule.next_digest_send_in_seconds == Some(FALLBACK_DELAY_SECS)).then_some(())
    })
    .await;

    engine
        .reschedule_notifications(
            &id,
            RescheduleRequest {
                frequency: Frequency::Never,
                paused: false,
            },
        )
        .unwrap();

    let schedule = eventually("restarted cycle", || async move {
        let schedule = engine.get_notifications(id).await.ok()?;
        (schedule.cycle == 2).then_some(schedule)
    })
    .await;
    assert_eq!(schedule.frequency, Frequency::Never);
    assert_eq!(schedule.next_digest_send_in_seconds, None);

    engine.shutdown().await;
}

#[tokio::test]
async fn test_set_current_location_is_routed_to_tracker() {
    let dir = tempdir().unwrap();
    let engine = engine(dir.path());
    let id = unique_id();
    engine.onboard(request(&id, "Grace")).await.unwrap();

    engine
        .set_current_location(
            &id,
            SetCurrentLocationRequest {
                location: "Tokyo".to_string(),
                timezone: "Asia/Tokyo".to_string(),
            },
        )
        .unwrap();

    let record = engine.get_location(&id).await.unwrap();
    assert_eq!(record.location, "Tokyo");
    assert_eq!(record.source_actor_id, id.locations_address());

    engine.shutdown().await;
}

#[tokio::test]
async fn test_offboard_completes_and_later_calls_fail() {
    let dir = tempdir().unwrap();
    let engine = engine(dir.path());
    let id = unique_id();
    engine.onboard(request(&id, "Grace")).await.unwrap();

    engine.offboard(&id).unwrap();
    engine.offboard(&id).unwrap();
    engine.wait_for_completion(&id).await.unwrap();
    let (engine, id) = (&engine, &id);

    assert!(matches!(
        engine.get_details(id).await,
        Err(EngineError::NotRunning { .. })
    ));
    eventually("children to stop", || async move {
        let location = engine.get_location(id).await;
        let schedule = engine.get_notifications(id).await;
        (matches!(location, Err(EngineError::NotRunning { .. }))
            && matches!(schedule, Err(EngineError::NotRunning { .. })))
        .then_some(())
    })
    .await;

    let err = engine
        .reschedule_notifications(
            &id,
            RescheduleRequest {
                frequency: Frequency::Daily,
                paused: true,
            },
        )
        .err()
        .unwrap();
    assert!(matches!(err, EngineError::NotRunning { .. }));
}

#[tokio::test]
async fn test_offboarded_employee_cannot_be_onboarded_again() {
    let dir = tempdir().unwrap();
    let engine = engine(dir.path());
    let id = unique_id();
    engine.onboard(request(&id, "Grace")).await.unwrap();
    engine.offboard(&id).unwrap();
    engine.wait_for_completion(&id).await.unwrap();

    let err = engine.onboard(request(&id, "Grace")).await.err().unwrap();
    assert!(matches!(err, EngineError::Spawn { .. }));
}

#[tokio::test]
async fn test_shutdown_then_onboard_resumes_state() {
    let dir = tempdir().unwrap();
    let id = unique_id();

    let first = engine(dir.path());
    first.onboard(request(&id, "Grace")).await.unwrap();
    first
        .update_details(
            &id,
            UpdateEmployeeDetailsRequest {
                first_name: "Amazing".to_string(),
                last_name: "Grace".to_string(),
            },
        )
        .unwrap();
    first
        .set_current_location(
            &id,
            SetCurrentLocationRequest {
                location: "Arlington".to_string(),
                timezone: "America/New_York".to_string(),
            },
        )
        .unwrap();
    first.get_details(&id).await.unwrap();
    first.get_location(&id).await.unwrap();
    first.shutdown().await;

    let second = engine(dir.path());
    let err = second.onboard(request(&id, "Someone")).await.err().unwrap();
    assert!(matches!(err, EngineError::Spawn { .. }));

    let mut stored = request(&id, "Amazing");
    stored.last_name = "Grace".to_string();
    second.onboard(stored).await.unwrap();
    let details = second.get_details(&id).await.unwrap();
    assert_eq!(details.first_name, "Amazing");
    assert!(!details.offboarded);
    assert_eq!(second.get_location(&id).await.unwrap().location, "Arlington");

    second.shutdown().await;
}

#[tokio::test]
async fn test_wait_for_unknown_employee_fails() {
    let dir = tempdir().unwrap();
    let engine = engine(dir.path());

    let err = engine.wait_for_completion(&unique_id()).await.err().unwrap();
    assert!(matches!(err, EngineError::NotRunning { .. }));
}

#[tokio::test]
async fn test_failed_onboarding_leaves_nothing_behind() {
    let dir = tempdir().unwrap();
    let engine = engine(dir.path());
    let id = unique_id();

    // Another scheduler holds the notifications address for a while
    let (blocker, blocker_handle) = Actor::spawn(
        Some(id.notifications_address()),
        DigestScheduler,
        DigestSchedulerArgs {
            address: id.notifications_address(),
            start: StartScheduleRequest {
                employee_id: id.clone(),
                frequency: Frequency::Never,
                paused: false,
            },
            context: ActorContext::new(
                test_config(dir.path()),
                Arc::new(ScriptedActivities::new()),
            ),
        },
    )
    .await
    .unwrap();

    let mut typo = request(&id, "Typo");
    typo.default_location = "Nowhere".to_string();
    let err = engine.onboard(typo).await.err().unwrap();
    assert!(matches!(err, EngineError::Spawn { .. }));

    blocker.stop(None);
    blocker_handle.await.unwrap();
    let (engine, id) = (&engine, &id);
    eventually("notifications address to free up", || async move {
        lookup::<DigestSchedulerMessage>(&id.notifications_address())
            .is_none()
            .then_some(())
    })
    .await;

    engine.onboard(request(id, "Grace")).await.unwrap();
    let details = engine.get_details(id).await.unwrap();
    assert_eq!(details.first_name, "Grace");
    assert_eq!(details.last_event_sequence, 1);
    assert_eq!(engine.get_location(id).await.unwrap().location, "New York");

    engine.shutdown().await;
}

#[tokio::test]
async fn test_employee_id_shaped_like_child_address_does_not_clash() {
    let dir = tempdir().unwrap();
    let engine = engine(dir.path());
    let base = unique_id();
    let lookalike = EmployeeId::from(base.notifications_address());

    engine.onboard(request(&lookalike, "Grace")).await.unwrap();
    engine.offboard(&lookalike).unwrap();
    engine.wait_for_completion(&lookalike).await.unwrap();

    engine.onboard(request(&base, "Grace")).await.unwrap();
    let schedule = engine.get_notifications(&base).await.unwrap();
    assert_eq!(schedule.employee_id, base);
    assert_eq!(schedule.cycle, 1);

    engine.shutdown().await;
}
