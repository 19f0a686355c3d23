use super::*;
use crate::actors::test_support::{eventually, test_config, unique_id, ScriptedActivities};
use crate::actors::{lookup, DigestSchedulerMessage, LocationTrackerMessage};
use crate::config::EngineConfig;
use crate::domain::types::EmployeeId;
use std::sync::Arc;
use tempfile::tempdir;

fn context(config: EngineConfig) -> ActorContext {
    ActorContext::new(config, Arc::new(ScriptedActivities::new()))
}

fn onboard_request(id: &EmployeeId, first_name: &str) -> OnboardEmployeeRequest {
    OnboardEmployeeRequest {
        id: id.clone(),
        first_name: first_name.to_string(),
        last_name: "Lovelace".to_string(),
        default_location: "London".to_string(),
        default_timezone: "Europe/London".to_string(),
    }
}

async fn spawn_employee(
    request: OnboardEmployeeRequest,
    context: ActorContext,
) -> Result<(ActorRef<EmployeeMessage>, JoinHandle<()>), SpawnErr> {
    let (snapshot_tx, _snapshot_rx) = watch::channel(EmployeeDetails::default());
    Actor::spawn(
        Some(request.id.to_string()),
        EmployeeActor,
        EmployeeActorArgs {
            request,
            context,
            snapshot_tx,
        },
    )
    .await
}

async fn get_details(actor: &ActorRef<EmployeeMessage>) -> EmployeeDetails {
    let (tx, rx) = oneshot::channel();
    actor.send_message(EmployeeMessage::GetDetails(tx)).unwrap();
    rx.await.unwrap()
}

async fn wait_until_gone(address: String) {
    eventually(&format!("{} to unregister", address), || {
        let address = address.clone();
        async move {
            lookup::<DigestSchedulerMessage>(&address)
                .is_none()
                .then_some(())
        }
    })
    .await
}

#[tokio::test]
async fn onboarding_spawns_both_children() {
    let dir = tempdir().unwrap();
    let id = unique_id();
    let (actor, handle) = spawn_employee(onboard_request(&id, "Ada"), context(test_config(dir.path())))
        .await
        .unwrap();

    let details = get_details(&actor).await;
    assert_eq!(details.id, id);
    assert_eq!(details.first_name, "Ada");
    assert_eq!(details.notifications_actor_id, id.notifications_address());
    assert_eq!(details.locations_actor_id, id.locations_address());
    assert!(lookup::<DigestSchedulerMessage>(&id.notifications_address()).is_some());
    assert!(lookup::<LocationTrackerMessage>(&id.locations_address()).is_some());

    actor.stop(None);
    handle.await.unwrap();
}

#[tokio::test]
async fn update_details_is_applied_in_mailbox_order() {
    let dir = tempdir().unwrap();
    let id = unique_id();
    let (actor, handle) = spawn_employee(onboard_request(&id, "Ada"), context(test_config(dir.path())))
        .await
        .unwrap();

    actor
        .send_message(EmployeeMessage::UpdateDetails(UpdateEmployeeDetailsRequest {
            first_name: "Augusta".to_string(),
            last_name: "King".to_string(),
        }))
        .unwrap();
    let details = get_details(&actor).await;
    assert_eq!(details.first_name, "Augusta");
    assert_eq!(details.last_name, "King");
    assert_eq!(details.last_event_sequence, 2);

    // Same names again record nothing
    actor
        .send_message(EmployeeMessage::UpdateDetails(UpdateEmployeeDetailsRequest {
            first_name: "Augusta".to_string(),
            last_name: "King".to_string(),
        }))
        .unwrap();
    assert_eq!(get_details(&actor).await.last_event_sequence, 2);

    actor.stop(None);
    handle.await.unwrap();
}

#[tokio::test]
async fn offboard_stops_children_before_root_completes() {
    let dir = tempdir().unwrap();
    let id = unique_id();
    let (actor, handle) = spawn_employee(onboard_request(&id, "Ada"), context(test_config(dir.path())))
        .await
        .unwrap();

    actor.send_message(EmployeeMessage::Offboard).unwrap();
    // A second offboard while winding down is a no-op
    let _ = actor.send_message(EmployeeMessage::Offboard);
    handle.await.unwrap();

    wait_until_gone(id.notifications_address()).await;
    wait_until_gone(id.locations_address()).await;
    assert!(lookup::<EmployeeMessage>(id.as_str()).is_none());
}

#[tokio::test]
async fn stopped_root_resumes_persisted_identity() {
    let dir = tempdir().unwrap();
    let id = unique_id();
    let ctx = context(test_config(dir.path()));

    let (actor, handle) = spawn_employee(onboard_request(&id, "Ada"), ctx.clone())
        .await
        .unwrap();
    actor
        .send_message(EmployeeMessage::UpdateDetails(UpdateEmployeeDetailsRequest {
            first_name: "Augusta".to_string(),
            last_name: "King".to_string(),
        }))
        .unwrap();
    get_details(&actor).await;
    actor.stop(None);
    handle.await.unwrap();
    wait_until_gone(id.notifications_address()).await;
    wait_until_gone(id.locations_address()).await;

    // Resuming needs the identity as stored, names updated since included
    let mut request = onboard_request(&id, "Augusta");
    request.last_name = "King".to_string();
    let (actor, handle) = spawn_employee(request, ctx).await.unwrap();
    let details = get_details(&actor).await;
    assert_eq!(details.first_name, "Augusta");
    assert_eq!(details.last_event_sequence, 2);
    assert!(!details.offboarded);

    actor.stop(None);
    handle.await.unwrap();
}

#[tokio::test]
async fn stored_employee_rejects_a_different_identity() {
    let dir = tempdir().unwrap();
    let id = unique_id();
    let ctx = context(test_config(dir.path()));

    let (actor, handle) = spawn_employee(onboard_request(&id, "Ada"), ctx.clone())
        .await
        .unwrap();
    actor.stop(None);
    handle.await.unwrap();
    wait_until_gone(id.notifications_address()).await;
    wait_until_gone(id.locations_address()).await;

    let result = spawn_employee(onboard_request(&id, "Someone Else"), ctx.clone()).await;
    assert!(matches!(result, Err(SpawnErr::StartupFailed(_))));
    assert!(lookup::<DigestSchedulerMessage>(&id.notifications_address()).is_none());

    // The stored identity is untouched
    let (actor, handle) = spawn_employee(onboard_request(&id, "Ada"), ctx)
        .await
        .unwrap();
    assert_eq!(get_details(&actor).await.first_name, "Ada");
    actor.stop(None);
    handle.await.unwrap();
}

#[tokio::test]
async fn offboarded_employee_cannot_start_again() {
    let dir = tempdir().unwrap();
    let id = unique_id();
    let ctx = context(test_config(dir.path()));

    let (actor, handle) = spawn_employee(onboard_request(&id, "Ada"), ctx.clone())
        .await
        .unwrap();
    actor.send_message(EmployeeMessage::Offboard).unwrap();
    handle.await.unwrap();
    wait_until_gone(id.notifications_address()).await;
    wait_until_gone(id.locations_address()).await;

    let result = spawn_employee(onboard_request(&id, "Ada"), ctx).await;
    assert!(matches!(result, Err(SpawnErr::StartupFailed(_))));
    assert!(lookup::<DigestSchedulerMessage>(&id.notifications_address()).is_none());
}

#[tokio::test]
async fn child_stopped_while_active_is_restarted() {
    let dir = tempdir().unwrap();
    let id = unique_id();
    let (actor, handle) = spawn_employee(onboard_request(&id, "Ada"), context(test_config(dir.path())))
        .await
        .unwrap();

    let tracker = lookup::<LocationTrackerMessage>(&id.locations_address()).unwrap();
    let old_id = tracker.get_id();
    tracker.stop(Some("crash".to_string()));

    let address = id.locations_address();
    let restarted = eventually("location tracker restart", || {
        let address = address.clone();
        async move {
            lookup::<LocationTrackerMessage>(&address).filter(|actor| actor.get_id() != old_id)
        }
    })
    .await;

    // The restarted tracker recovers the record from the journal
    let (tx, rx) = oneshot::channel();
    restarted
        .send_message(LocationTrackerMessage::GetLocation(tx))
        .unwrap();
    let record = rx.await.unwrap();
    assert_eq!(record.location, "London");
    assert_eq!(record.last_event_sequence, 1);

    actor.stop(None);
    handle.await.unwrap();
}

#[tokio::test]
async fn exceeding_restart_limit_fails_the_root() {
    let dir = tempdir().unwrap();
    let id = unique_id();
    let mut config = test_config(dir.path());
    config.supervision.max_child_restarts = 0;
    let (_actor, handle) = spawn_employee(onboard_request(&id, "Ada"), context(config))
        .await
        .unwrap();

    let scheduler = lookup::<DigestSchedulerMessage>(&id.notifications_address()).unwrap();
    scheduler.stop(Some("crash".to_string()));

    handle.await.unwrap();
    assert!(lookup::<EmployeeMessage>(id.as_str()).is_none());
    wait_until_gone(id.locations_address()).await;
}

#[tokio::test]
async fn occupied_child_address_fails_onboarding_and_cleans_up() {
    let dir = tempdir().unwrap();
    let id = unique_id();
    let ctx = context(test_config(dir.path()));

    // Another scheduler already holds the notifications address
    let (squatter, squatter_handle) = Actor::spawn(
        Some(id.notifications_address()),
        DigestScheduler,
        DigestSchedulerArgs {
            address: id.notifications_address(),
            start: StartScheduleRequest {
                employee_id: id.clone(),
                frequency: crate::domain::types::Frequency::Never,
                paused: false,
            },
            context: ctx.clone(),
        },
    )
    .await
    .unwrap();

    let mut typo = onboard_request(&id, "Typo");
    typo.default_location = "Nowhere".to_string();
    let result = spawn_employee(typo, ctx.clone()).await;
    assert!(matches!(result, Err(SpawnErr::StartupFailed(_))));
    wait_until_gone(id.locations_address()).await;
    assert!(lookup::<EmployeeMessage>(id.as_str()).is_none());

    squatter.stop(None);
    squatter_handle.await.unwrap();
    wait_until_gone(id.notifications_address()).await;

    // Nothing of the failed attempt was kept
    let (actor, handle) = spawn_employee(onboard_request(&id, "Ada"), ctx)
        .await
        .unwrap();
    let details = get_details(&actor).await;
    assert_eq!(details.first_name, "Ada");
    assert_eq!(details.last_event_sequence, 1);
    let tracker = lookup::<LocationTrackerMessage>(&id.locations_address()).unwrap();
    let (tx, rx) = oneshot::channel();
    tracker
        .send_message(LocationTrackerMessage::GetLocation(tx))
        .unwrap();
    assert_eq!(rx.await.unwrap().location, "London");

    actor.stop(None);
    handle.await.unwrap();
}
