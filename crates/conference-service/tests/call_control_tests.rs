//! HTTP call-control client tests against a mocked call-control plane.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use conference_service::errors::ConferenceError;
use conference_service::services::{
    BridgeKind, CallControl, HttpCallControl, LegStatus, RecordingParams,
};
use conference_test_utils::RecordingMetrics;
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn client() -> (MockServer, HttpCallControl, Arc<RecordingMetrics>) {
    let server = MockServer::start().await;
    let metrics = Arc::new(RecordingMetrics::new());
    let client = HttpCallControl::new(format!("{}/", server.uri()), metrics.clone()).unwrap();
    (server, client, metrics)
}

#[tokio::test]
async fn test_create_bridge() {
    let (server, client, metrics) = client().await;
    let customer_id = Uuid::new_v4();
    let bridge_id = Uuid::new_v4();

    Mock::given(method("POST"))
        .and(path("/v1/confbridges"))
        .and(body_partial_json(json!({
            "customer_id": customer_id,
            "type": "connect",
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": bridge_id })))
        .expect(1)
        .mount(&server)
        .await;

    let created = client
        .create_bridge(customer_id, BridgeKind::Connect)
        .await
        .unwrap();

    assert_eq!(created, bridge_id);
    assert_eq!(
        metrics.call_control_requests.lock().unwrap().clone(),
        vec![("create_bridge", "success")]
    );
}

#[tokio::test]
async fn test_missing_bridge_is_not_found() {
    let (server, client, metrics) = client().await;
    let bridge_id = Uuid::new_v4();

    Mock::given(method("DELETE"))
        .and(path(format!("/v1/confbridges/{}", bridge_id)))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let err = client.delete_bridge(bridge_id).await.unwrap_err();

    assert!(err.is_not_found());
    assert_eq!(
        metrics.call_control_requests.lock().unwrap().clone(),
        vec![("delete_bridge", "error")]
    );
}

#[tokio::test]
async fn test_server_error_is_upstream() {
    let (server, client, _) = client().await;
    let bridge_id = Uuid::new_v4();
    let leg_id = Uuid::new_v4();

    Mock::given(method("DELETE"))
        .and(path(format!("/v1/confbridges/{}/calls/{}", bridge_id, leg_id)))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let err = client.kick(bridge_id, leg_id).await.unwrap_err();

    assert!(matches!(err, ConferenceError::Upstream(_)));
}

#[tokio::test]
async fn test_rejected_request_is_upstream() {
    let (server, client, _) = client().await;

    Mock::given(method("POST"))
        .and(path("/v1/confbridges"))
        .respond_with(ResponseTemplate::new(400).set_body_string("bad customer"))
        .mount(&server)
        .await;

    let err = client
        .create_bridge(Uuid::new_v4(), BridgeKind::Conference)
        .await
        .unwrap_err();

    assert!(matches!(err, ConferenceError::Upstream(_)));
}

#[tokio::test]
async fn test_get_leg() {
    let (server, client, _) = client().await;
    let leg_id = Uuid::new_v4();
    let bridge_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path(format!("/v1/calls/{}", leg_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": leg_id,
            "status": "progressing",
            "confbridge_id": bridge_id,
        })))
        .mount(&server)
        .await;

    let leg = client.get_leg(leg_id).await.unwrap();

    assert_eq!(leg.id, leg_id);
    assert_eq!(leg.status, LegStatus::Progressing);
    assert_eq!(leg.confbridge_id, Some(bridge_id));
}

#[tokio::test]
async fn test_unparseable_body_is_upstream() {
    let (server, client, _) = client().await;
    let leg_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path(format!("/v1/calls/{}", leg_id)))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
        .mount(&server)
        .await;

    let err = client.get_leg(leg_id).await.unwrap_err();

    assert!(matches!(err, ConferenceError::Upstream(_)));
}

#[tokio::test]
async fn test_start_and_stop_recording() {
    let (server, client, _) = client().await;
    let bridge_id = Uuid::new_v4();
    let recording_id = Uuid::new_v4();

    Mock::given(method("POST"))
        .and(path("/v1/recordings"))
        .and(body_partial_json(json!({
            "reference_type": "confbridge",
            "reference_id": bridge_id,
            "format": "wav",
            "duration_seconds": 0,
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "id": recording_id })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(format!("/v1/recordings/{}/stop", recording_id)))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let started = client
        .start_recording(Uuid::new_v4(), bridge_id, &RecordingParams::default())
        .await
        .unwrap();
    assert_eq!(started, recording_id);

    client.stop_recording(recording_id).await.unwrap();
}

#[tokio::test]
async fn test_start_and_stop_transcription() {
    let (server, client, _) = client().await;
    let bridge_id = Uuid::new_v4();
    let transcribe_id = Uuid::new_v4();

    Mock::given(method("POST"))
        .and(path("/v1/transcribes"))
        .and(body_partial_json(json!({
            "reference_type": "confbridge",
            "reference_id": bridge_id,
            "language": "de-DE",
            "direction": "both",
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": transcribe_id })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(format!("/v1/transcribes/{}/stop", transcribe_id)))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let started = client
        .start_transcription(Uuid::new_v4(), bridge_id, "de-DE")
        .await
        .unwrap();
    assert_eq!(started, transcribe_id);

    client.stop_transcription(transcribe_id).await.unwrap();
}
