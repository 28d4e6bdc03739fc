//! Postgres repository tests.
//!
//! Each test gets a fresh database with the workspace migrations applied.
//! They need a reachable Postgres via `DATABASE_URL` and are ignored by
//! default; run them with `cargo test -- --ignored`.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use anyhow::Result;
use chrono::{DateTime, Duration, TimeZone, Utc};
use conference_service::errors::ConferenceError;
use conference_service::models::{
    Conference, ConferenceData, ConferenceFilter, ConferenceStatus, ConferenceType,
    ConferenceUpdate, Conferencecall, ConferencecallFilter, ConferencecallStatus,
    ConferencecallUpdate, ReferenceType,
};
use conference_service::repositories::{
    ConferenceRepository, ConferencecallRepository, PgConferenceRepository,
    PgConferencecallRepository,
};
use conference_test_utils::{RecordingMetrics, TEST_CUSTOMER_ID};
use sqlx::PgPool;
use std::sync::Arc;
use uuid::Uuid;

fn at(seconds: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::seconds(seconds)
}

fn conference(tm_create: DateTime<Utc>) -> Conference {
    let mut data = ConferenceData::new();
    data.insert("source".to_string(), serde_json::json!("repository test"));

    Conference {
        id: Uuid::new_v4(),
        customer_id: TEST_CUSTOMER_ID,
        confbridge_id: Uuid::new_v4(),
        conference_type: ConferenceType::Conference,
        status: ConferenceStatus::Progressing,
        name: "room".to_string(),
        detail: "detail".to_string(),
        data,
        timeout_seconds: 120,
        pre_flow_id: None,
        post_flow_id: Some(Uuid::new_v4()),
        conferencecall_ids: vec![],
        recording_id: None,
        recording_ids: vec![],
        transcribe_id: None,
        transcribe_ids: vec![],
        tm_end: None,
        tm_create,
        tm_update: None,
        tm_delete: None,
    }
}

fn conferencecall(conference_id: Uuid, tm_create: DateTime<Utc>) -> Conferencecall {
    Conferencecall {
        id: Uuid::new_v4(),
        customer_id: TEST_CUSTOMER_ID,
        activeflow_id: Some(Uuid::new_v4()),
        conference_id,
        reference_type: ReferenceType::Call,
        reference_id: Uuid::new_v4(),
        status: ConferencecallStatus::Joining,
        tm_create,
        tm_update: None,
        tm_delete: None,
    }
}

fn repositories(pool: PgPool) -> (PgConferenceRepository, PgConferencecallRepository) {
    let metrics = Arc::new(RecordingMetrics::new());
    (
        PgConferenceRepository::new(pool.clone(), metrics.clone()),
        PgConferencecallRepository::new(pool, metrics),
    )
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires Postgres"]
async fn test_conference_round_trip(pool: PgPool) -> Result<()> {
    let (conferences, _) = repositories(pool);
    let input = conference(at(0));

    conferences.insert(&input).await?;

    assert_eq!(conferences.get(input.id).await?, Some(input.clone()));
    assert_eq!(
        conferences.get_by_confbridge_id(input.confbridge_id).await?,
        Some(input)
    );
    assert_eq!(conferences.get(Uuid::new_v4()).await?, None);
    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires Postgres"]
async fn test_duplicate_conference_conflicts(pool: PgPool) -> Result<()> {
    let (conferences, _) = repositories(pool);
    let input = conference(at(0));
    conferences.insert(&input).await?;

    let err = conferences.insert(&input).await.unwrap_err();

    assert!(matches!(err, ConferenceError::Conflict(_)));
    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires Postgres"]
async fn test_conference_update_writes_only_set_fields(pool: PgPool) -> Result<()> {
    let (conferences, _) = repositories(pool);
    let input = conference(at(0));
    conferences.insert(&input).await?;

    let found = conferences
        .update(
            input.id,
            &ConferenceUpdate::new()
                .name("renamed")
                .status(ConferenceStatus::Terminating)
                .post_flow_id(None),
            at(10),
        )
        .await?;
    assert!(found);

    let updated = conferences.get(input.id).await?.unwrap();
    assert_eq!(updated.name, "renamed");
    assert_eq!(updated.detail, input.detail);
    assert_eq!(updated.status, ConferenceStatus::Terminating);
    assert_eq!(updated.post_flow_id, None);
    assert_eq!(updated.tm_update, Some(at(10)));

    assert!(
        !conferences
            .update(Uuid::new_v4(), &ConferenceUpdate::new(), at(10))
            .await?
    );
    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires Postgres"]
async fn test_membership_and_history_arrays(pool: PgPool) -> Result<()> {
    let (conferences, _) = repositories(pool);
    let input = conference(at(0));
    conferences.insert(&input).await?;
    let (first, second) = (Uuid::new_v4(), Uuid::new_v4());

    conferences.add_conferencecall_id(input.id, first, at(1)).await?;
    conferences.add_conferencecall_id(input.id, first, at(2)).await?;
    conferences.add_conferencecall_id(input.id, second, at(3)).await?;
    conferences
        .remove_conferencecall_id(input.id, first, at(4))
        .await?;
    let recording = Uuid::new_v4();
    conferences
        .append_recording_id(input.id, recording, at(5))
        .await?;
    let transcribe = Uuid::new_v4();
    conferences
        .append_transcribe_id(input.id, transcribe, at(6))
        .await?;

    let current = conferences.get(input.id).await?.unwrap();
    assert_eq!(current.conferencecall_ids, vec![second]);
    assert_eq!(current.recording_ids, vec![recording]);
    assert_eq!(current.transcribe_ids, vec![transcribe]);
    assert_eq!(current.tm_update, Some(at(6)));
    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires Postgres"]
async fn test_conference_list_and_count(pool: PgPool) -> Result<()> {
    let (conferences, _) = repositories(pool);
    let mut ids = vec![];
    for i in 0..3 {
        let input = conference(at(i));
        ids.push(input.id);
        conferences.insert(&input).await?;
    }
    let mut other = conference(at(5));
    other.customer_id = Uuid::new_v4();
    conferences.insert(&other).await?;

    let filter = ConferenceFilter {
        customer_id: Some(TEST_CUSTOMER_ID),
        ..Default::default()
    };
    let page = conferences.list(2, at(100), &filter).await?;
    let page_ids: Vec<Uuid> = page.iter().map(|c| c.id).collect();
    ids.reverse();
    assert_eq!(page_ids, ids.iter().take(2).copied().collect::<Vec<_>>());

    let rest = conferences.list(2, at(1), &filter).await?;
    assert_eq!(rest.len(), 1);

    if let Some(newest) = ids.first() {
        conferences.soft_delete(*newest, at(50)).await?;
    }
    assert_eq!(conferences.count_by_customer_id(TEST_CUSTOMER_ID).await?, 2);
    assert_eq!(conferences.list(10, at(100), &filter).await?.len(), 2);
    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires Postgres"]
async fn test_conferencecall_lifecycle(pool: PgPool) -> Result<()> {
    let (conferences, conferencecalls) = repositories(pool);
    let room = conference(at(0));
    conferences.insert(&room).await?;

    let old = conferencecall(room.id, at(1));
    let mut newer = conferencecall(room.id, at(2));
    newer.reference_id = old.reference_id;
    conferencecalls.insert(&old).await?;
    conferencecalls.insert(&newer).await?;

    assert_eq!(
        conferencecalls.get_by_reference_id(old.reference_id).await?,
        Some(newer.clone())
    );

    conferencecalls
        .update(
            newer.id,
            &ConferencecallUpdate::new().status(ConferencecallStatus::Joined),
            at(3),
        )
        .await?;
    let joined = conferencecalls.get(newer.id).await?.unwrap();
    assert_eq!(joined.status, ConferencecallStatus::Joined);
    assert_eq!(joined.tm_update, Some(at(3)));

    conferencecalls.soft_delete(newer.id, at(4)).await?;
    assert_eq!(
        conferencecalls
            .get_by_reference_id(old.reference_id)
            .await?
            .map(|cc| cc.id),
        Some(old.id)
    );

    let listed = conferencecalls
        .list(
            10,
            at(100),
            &ConferencecallFilter {
                conference_id: Some(room.id),
                ..Default::default()
            },
        )
        .await?;
    let listed_ids: Vec<Uuid> = listed.iter().map(|cc| cc.id).collect();
    assert_eq!(listed_ids, vec![old.id]);
    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires Postgres"]
async fn test_status_writes_are_guarded_by_current_status(pool: PgPool) -> Result<()> {
    let (conferences, conferencecalls) = repositories(pool);
    let room = conference(at(0));
    conferences.insert(&room).await?;
    let leg = conferencecall(room.id, at(1));
    conferencecalls.insert(&leg).await?;

    let leaved = ConferencecallStatus::Leaved;
    assert!(
        conferencecalls
            .update_status(leg.id, &leaved.predecessors(), leaved, at(2))
            .await?
    );
    let joined = ConferencecallStatus::Joined;
    assert!(
        !conferencecalls
            .update_status(leg.id, &joined.predecessors(), joined, at(3))
            .await?
    );
    let stored = conferencecalls.get(leg.id).await?.unwrap();
    assert_eq!(stored.status, ConferencecallStatus::Leaved);
    assert_eq!(stored.tm_update, Some(at(2)));

    let terminated = ConferenceStatus::Terminated;
    assert!(
        conferences
            .update_status(room.id, &terminated.predecessors(), terminated, Some(at(4)), at(4))
            .await?
    );
    let terminating = ConferenceStatus::Terminating;
    assert!(
        !conferences
            .update_status(room.id, &terminating.predecessors(), terminating, None, at(5))
            .await?
    );
    let stored = conferences.get(room.id).await?.unwrap();
    assert_eq!(stored.status, ConferenceStatus::Terminated);
    assert_eq!(stored.tm_end, Some(at(4)));

    assert!(
        !conferencecalls
            .update_status(Uuid::new_v4(), &joined.predecessors(), joined, at(6))
            .await?
    );
    Ok(())
}
