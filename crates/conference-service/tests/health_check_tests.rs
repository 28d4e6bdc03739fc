//! Integration tests for the leg health check.
//!
//! Each check is driven by hand through the recorded scheduler, so retry
//! chains run deterministically without timers.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use chrono::Duration as ChronoDuration;
use conference_service::handlers::HealthCheckOutcome;
use conference_service::models::{
    Conference, ConferenceStatus, ConferenceType, ConferencecallStatus,
};
use conference_service::services::{LegStatus, ScheduledTask};
use conference_test_utils::*;
use std::time::Duration;
use uuid::Uuid;

async fn room(h: &TestHarness) -> Conference {
    h.conference_handler
        .create(create_conference_request(ConferenceType::Conference, 0))
        .await
        .unwrap()
}

fn health_check_task(conferencecall_id: Uuid, retry_count: u32) -> (Duration, ScheduledTask) {
    (
        Duration::from_secs(5),
        ScheduledTask::ConferencecallHealthCheck {
            conferencecall_id,
            retry_count,
        },
    )
}

#[tokio::test]
async fn test_healthy_leg_resets_retry_count() {
    let h = TestHarness::new();
    let conference = room(&h).await;
    let leg = h.joined_leg(&conference).await;
    h.scheduler.take();

    let outcome = h.conferencecall_handler.health_check(leg.id, 2).await;

    assert_eq!(outcome, HealthCheckOutcome::Healthy);
    assert_eq!(h.scheduler.take_one(), health_check_task(leg.id, 0));
    assert_eq!(h.metrics.health_check_outcomes(), vec!["healthy"]);
}

#[tokio::test]
async fn test_exhausted_retries_eject_leg() {
    let h = TestHarness::new();
    let conference = room(&h).await;
    let leg = h.joined_leg(&conference).await;
    h.scheduler.take();
    h.publisher.clear();

    let outcome = h.conferencecall_handler.health_check(leg.id, 3).await;

    assert_eq!(outcome, HealthCheckOutcome::Ejected);
    assert!(h.scheduler.submitted().is_empty());
    assert_eq!(
        h.call_control.kicks(),
        vec![(conference.confbridge_id, leg.reference_id)]
    );
    assert_eq!(
        h.publisher.event_types(),
        vec![
            "conferencecall_leaving",
            "conferencecall_leaved",
            "conference_updated"
        ]
    );
    assert_eq!(
        h.conferencecall_handler.get(leg.id).await.unwrap().status,
        ConferencecallStatus::Leaved
    );
    assert!(h
        .conference_handler
        .get(conference.id)
        .await
        .unwrap()
        .conferencecall_ids
        .is_empty());
}

#[tokio::test]
async fn test_retry_count_at_limit_is_not_ejected() {
    let h = TestHarness::new();
    let conference = room(&h).await;
    let leg = h.joined_leg(&conference).await;
    h.scheduler.take();
    h.call_control
        .set_leg(leg.reference_id, LegStatus::Hangup, None);

    let outcome = h.conferencecall_handler.health_check(leg.id, 2).await;

    assert_eq!(outcome, HealthCheckOutcome::Retrying { retry_count: 3 });
    assert_eq!(h.scheduler.take_one(), health_check_task(leg.id, 3));
    assert!(h.call_control.kicks().is_empty());
}

#[tokio::test]
async fn test_missing_leg_is_unhealthy() {
    let h = TestHarness::new();
    let id = Uuid::new_v4();

    let outcome = h.conferencecall_handler.health_check(id, 0).await;

    assert_eq!(outcome, HealthCheckOutcome::Retrying { retry_count: 1 });
    assert_eq!(h.scheduler.take_one(), health_check_task(id, 1));
}

#[tokio::test]
async fn test_overdue_leg_is_unhealthy() {
    let h = TestHarness::new();
    let conference = room(&h).await;
    let leg = h.joined_leg(&conference).await;
    h.scheduler.take();
    h.clock.advance(ChronoDuration::seconds(86_401));

    let outcome = h.conferencecall_handler.health_check(leg.id, 0).await;

    assert_eq!(outcome, HealthCheckOutcome::Retrying { retry_count: 1 });
}

#[tokio::test]
async fn test_leg_at_maximum_age_is_still_healthy() {
    let h = TestHarness::new();
    let conference = room(&h).await;
    let leg = h.joined_leg(&conference).await;
    h.scheduler.take();
    h.clock.advance(ChronoDuration::seconds(86_400));

    let outcome = h.conferencecall_handler.health_check(leg.id, 0).await;

    assert_eq!(outcome, HealthCheckOutcome::Healthy);
}

#[tokio::test]
async fn test_leaved_leg_stops_the_chain() {
    let h = TestHarness::new();
    let conference = room(&h).await;
    let leg = h.joined_leg(&conference).await;
    h.conferencecall_handler.terminated(&leg).await.unwrap();
    h.scheduler.take();

    let outcome = h.conferencecall_handler.health_check(leg.id, 1).await;

    assert_eq!(outcome, HealthCheckOutcome::Stopped);
    assert!(h.scheduler.submitted().is_empty());
    assert_eq!(h.metrics.health_check_outcomes(), vec!["stopped"]);
}

#[tokio::test]
async fn test_leg_lookup_failure_is_unhealthy() {
    let h = TestHarness::new();
    let conference = room(&h).await;
    let leg = h.joined_leg(&conference).await;
    h.scheduler.take();
    h.call_control.set_failing(CallControlOp::GetLeg, true);

    let outcome = h.conferencecall_handler.health_check(leg.id, 0).await;

    assert_eq!(outcome, HealthCheckOutcome::Retrying { retry_count: 1 });
}

#[tokio::test]
async fn test_ringing_leg_is_unhealthy() {
    let h = TestHarness::new();
    let conference = room(&h).await;
    let leg = h.joined_leg(&conference).await;
    h.scheduler.take();
    h.call_control.set_leg(
        leg.reference_id,
        LegStatus::Ringing,
        Some(conference.confbridge_id),
    );

    let outcome = h.conferencecall_handler.health_check(leg.id, 0).await;

    assert_eq!(outcome, HealthCheckOutcome::Retrying { retry_count: 1 });
}

#[tokio::test]
async fn test_draining_conference_makes_leg_unhealthy() {
    let h = TestHarness::new();
    let conference = room(&h).await;
    let leg = h.joined_leg(&conference).await;
    h.conference_handler
        .terminating(conference.id)
        .await
        .unwrap();
    h.scheduler.take();

    let outcome = h.conferencecall_handler.health_check(leg.id, 0).await;

    assert_eq!(outcome, HealthCheckOutcome::Retrying { retry_count: 1 });
}

#[tokio::test]
async fn test_leg_on_another_bridge_is_unhealthy() {
    let h = TestHarness::new();
    let conference = room(&h).await;
    let leg = h.joined_leg(&conference).await;
    h.scheduler.take();
    h.call_control
        .set_leg(leg.reference_id, LegStatus::Progressing, Some(Uuid::new_v4()));

    let outcome = h.conferencecall_handler.health_check(leg.id, 0).await;

    assert_eq!(outcome, HealthCheckOutcome::Retrying { retry_count: 1 });
}

#[tokio::test]
async fn test_hung_up_leg_is_ejected_after_retries() {
    let h = TestHarness::new();
    let conference = room(&h).await;
    let leg = h.joined_leg(&conference).await;
    h.call_control
        .set_leg(leg.reference_id, LegStatus::Hangup, None);

    // The check queued by create runs first; each round queues the next.
    for _ in 0..4 {
        let ran = h.run_scheduled().await;
        assert_eq!(ran.len(), 1);
    }

    assert_eq!(
        h.metrics.health_check_outcomes(),
        vec!["retrying", "retrying", "retrying", "ejected"]
    );
    assert!(h.scheduler.submitted().is_empty());
    assert_eq!(h.call_control.kicks().len(), 1);
    assert_eq!(
        h.conferencecall_handler.get(leg.id).await.unwrap().status,
        ConferencecallStatus::Leaved
    );
    assert!(h
        .conference_handler
        .get(conference.id)
        .await
        .unwrap()
        .conferencecall_ids
        .is_empty());
}

#[tokio::test]
async fn test_room_with_ejected_leg_can_be_deleted() {
    let h = TestHarness::new();
    let conference = room(&h).await;
    let leg = h.joined_leg(&conference).await;
    h.call_control
        .set_leg(leg.reference_id, LegStatus::Hangup, None);
    for _ in 0..4 {
        h.run_scheduled().await;
    }

    let deleted = h
        .conference_handler
        .delete_room(conference.id)
        .await
        .unwrap();

    assert_eq!(deleted.status, ConferenceStatus::Terminated);
    assert!(deleted.is_deleted());
    assert_eq!(
        h.call_control.deleted_bridges(),
        vec![conference.confbridge_id]
    );
    assert!(h.scheduler.submitted().is_empty());
}

#[tokio::test]
async fn test_ejected_leg_is_finalized_when_kick_fails() {
    let h = TestHarness::new();
    let conference = room(&h).await;
    let leg = h.joined_leg(&conference).await;
    h.scheduler.take();
    h.call_control.set_failing(CallControlOp::Kick, true);

    let outcome = h.conferencecall_handler.health_check(leg.id, 3).await;

    assert_eq!(outcome, HealthCheckOutcome::Ejected);
    assert_eq!(
        h.conferencecall_handler.get(leg.id).await.unwrap().status,
        ConferencecallStatus::Leaved
    );
    assert!(h.scheduler.submitted().is_empty());
}

#[tokio::test]
async fn test_ejecting_leg_stuck_leaving_finalizes_it() {
    let h = TestHarness::new();
    let conference = room(&h).await;
    let leg = h.joined_leg(&conference).await;
    h.conferencecall_handler.terminate(leg.id).await.unwrap();
    h.scheduler.take();

    let outcome = h.conferencecall_handler.health_check(leg.id, 3).await;

    assert_eq!(outcome, HealthCheckOutcome::Ejected);
    assert_eq!(
        h.conferencecall_handler.get(leg.id).await.unwrap().status,
        ConferencecallStatus::Leaved
    );
    assert!(h
        .conference_handler
        .get(conference.id)
        .await
        .unwrap()
        .conferencecall_ids
        .is_empty());
    // The unanswered kick is not repeated.
    assert_eq!(h.call_control.kicks().len(), 1);
}

#[tokio::test]
async fn test_ejecting_last_leg_of_draining_room_destroys_it() {
    let h = TestHarness::new();
    let conference = room(&h).await;
    let leg = h.joined_leg(&conference).await;
    h.call_control.set_failing(CallControlOp::Kick, true);
    h.conference_handler
        .delete_room(conference.id)
        .await
        .unwrap();
    // The drain kick fails, leaving the leg stuck in `leaving`.
    h.run_scheduled().await;
    assert_eq!(
        h.conferencecall_handler.get(leg.id).await.unwrap().status,
        ConferencecallStatus::Leaving
    );

    h.conferencecall_handler.health_check(leg.id, 3).await;

    assert_eq!(
        h.call_control.deleted_bridges(),
        vec![conference.confbridge_id]
    );
    assert_eq!(h.metrics.destroyed_count(), 1);
}
