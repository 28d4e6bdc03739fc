//! Integration tests for the event relay.
//!
//! Bridge notifications may be duplicated, arrive late, or concern legs
//! that belong to no conference.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use conference_service::models::{Conference, ConferenceStatus, ConferenceType, ConferencecallStatus};
use conference_service::relay::BridgeEvent;
use conference_test_utils::*;
use uuid::Uuid;

async fn room(h: &TestHarness) -> Conference {
    h.conference_handler
        .create(create_conference_request(ConferenceType::Conference, 0))
        .await
        .unwrap()
}

#[tokio::test]
async fn test_leg_entered_joins_conferencecall() {
    let h = TestHarness::new();
    let conference = room(&h).await;
    let leg = h
        .conferencecall_handler
        .create(create_conferencecall_request(&conference))
        .await
        .unwrap();

    let updated = h
        .relay
        .handle(BridgeEvent::LegEntered {
            reference_id: leg.reference_id,
        })
        .await
        .unwrap()
        .expect("conference leg");

    assert_eq!(updated.id, leg.id);
    assert_eq!(updated.status, ConferencecallStatus::Joined);
    assert_eq!(
        h.conference_handler
            .get(conference.id)
            .await
            .unwrap()
            .conferencecall_ids,
        vec![leg.id]
    );
}

#[tokio::test]
async fn test_leg_left_removes_member() {
    let h = TestHarness::new();
    let conference = room(&h).await;
    let leg = h.joined_leg(&conference).await;

    let updated = h
        .relay
        .handle(BridgeEvent::LegLeft {
            reference_id: leg.reference_id,
        })
        .await
        .unwrap()
        .expect("conference leg");

    assert_eq!(updated.status, ConferencecallStatus::Leaved);
    assert!(h
        .conference_handler
        .get(conference.id)
        .await
        .unwrap()
        .conferencecall_ids
        .is_empty());
}

#[tokio::test]
async fn test_unknown_reference_is_ignored() {
    let h = TestHarness::new();

    let result = h
        .relay
        .handle(BridgeEvent::LegEntered {
            reference_id: Uuid::new_v4(),
        })
        .await
        .unwrap();

    assert_eq!(result, None);
    assert!(h.publisher.events().is_empty());
}

#[tokio::test]
async fn test_malformed_payload_is_dropped() {
    let h = TestHarness::new();

    assert_eq!(h.relay.handle_payload("not json").await.unwrap(), None);
    assert_eq!(
        h.relay
            .handle_payload(r#"{"type":"leg_entered"}"#)
            .await
            .unwrap(),
        None
    );
}

#[tokio::test]
async fn test_payload_is_decoded_and_applied() {
    let h = TestHarness::new();
    let conference = room(&h).await;
    let leg = h
        .conferencecall_handler
        .create(create_conferencecall_request(&conference))
        .await
        .unwrap();
    let payload = serde_json::json!({
        "type": "leg_entered",
        "reference_id": leg.reference_id,
    })
    .to_string();

    let updated = h.relay.handle_payload(&payload).await.unwrap().unwrap();

    assert_eq!(updated.status, ConferencecallStatus::Joined);
}

#[tokio::test]
async fn test_duplicate_events_are_idempotent() {
    let h = TestHarness::new();
    let conference = room(&h).await;
    let leg = h
        .conferencecall_handler
        .create(create_conferencecall_request(&conference))
        .await
        .unwrap();
    let entered = BridgeEvent::LegEntered {
        reference_id: leg.reference_id,
    };
    let left = BridgeEvent::LegLeft {
        reference_id: leg.reference_id,
    };

    h.relay.handle(entered).await.unwrap();
    h.relay.handle(entered).await.unwrap();
    h.relay.handle(left).await.unwrap();
    h.relay.handle(left).await.unwrap();
    // A late duplicate entry must not resurrect the leg.
    let last = h.relay.handle(entered).await.unwrap().unwrap();

    assert_eq!(last.status, ConferencecallStatus::Leaved);
    assert_eq!(h.publisher.count("conferencecall_joined"), 1);
    assert_eq!(h.publisher.count("conferencecall_leaved"), 1);
    assert!(h
        .conference_handler
        .get(conference.id)
        .await
        .unwrap()
        .conferencecall_ids
        .is_empty());
}

#[tokio::test]
async fn test_room_drains_and_is_destroyed_once() {
    let h = TestHarness::new();
    let conference = room(&h).await;
    let first = h.joined_leg(&conference).await;
    let second = h.joined_leg(&conference).await;
    h.scheduler.take();

    h.conference_handler
        .delete_room(conference.id)
        .await
        .unwrap();
    h.run_scheduled().await;
    assert_eq!(h.call_control.kicks().len(), 2);

    for leg in [&first, &second] {
        h.relay
            .handle(BridgeEvent::LegLeft {
                reference_id: leg.reference_id,
            })
            .await
            .unwrap();
    }
    // Duplicate after destruction.
    h.relay
        .handle(BridgeEvent::LegLeft {
            reference_id: second.reference_id,
        })
        .await
        .unwrap();

    let destroyed = h.conference_handler.get(conference.id).await.unwrap();
    assert_eq!(destroyed.status, ConferenceStatus::Terminated);
    assert!(destroyed.conferencecall_ids.is_empty());
    assert!(destroyed.is_deleted());
    assert_eq!(
        h.call_control.deleted_bridges(),
        vec![conference.confbridge_id]
    );
    assert_eq!(h.metrics.destroyed_count(), 1);
}
