//! Call-control plane client.
//!
//! The call-control plane owns bridges, legs, recordings and transcriptions.
//! This service only ever asks it to do things; it never mirrors its state.
//!
//! # Error mapping
//!
//! - transport failures, 5xx and unexpected 4xx: `ConferenceError::Upstream`
//! - 404: `ConferenceError::NotFound`
//! - unparseable bodies: `ConferenceError::Upstream`

use crate::errors::ConferenceError;
use crate::models::ConferenceType;
use crate::observability::MetricsSink;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, instrument, warn};
use uuid::Uuid;

/// Default timeout for call-control requests in seconds.
const CALL_CONTROL_REQUEST_TIMEOUT_SECS: u64 = 10;

/// Mixing behaviour requested for a new bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BridgeKind {
    Conference,
    Connect,
}

impl BridgeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BridgeKind::Conference => "conference",
            BridgeKind::Connect => "connect",
        }
    }
}

impl From<ConferenceType> for BridgeKind {
    fn from(conference_type: ConferenceType) -> Self {
        match conference_type {
            ConferenceType::Conference => BridgeKind::Conference,
            ConferenceType::Connect | ConferenceType::Queue => BridgeKind::Connect,
        }
    }
}

/// Leg status as reported by the call-control plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LegStatus {
    Dialing,
    Ringing,
    Progressing,
    Terminating,
    Canceling,
    Hangup,
    #[serde(other)]
    Unknown,
}

/// Current external state of a leg.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegState {
    pub id: Uuid,
    pub status: LegStatus,
    /// Bridge the leg is currently attached to, if any.
    #[serde(default)]
    pub confbridge_id: Option<Uuid>,
}

/// Recording parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordingParams {
    pub format: String,
    /// Maximum length; 0 records until stopped.
    pub duration_seconds: u32,
}

impl Default for RecordingParams {
    fn default() -> Self {
        Self {
            format: "wav".to_string(),
            duration_seconds: 0,
        }
    }
}

/// Operations consumed from the call-control plane.
#[async_trait::async_trait]
pub trait CallControl: Send + Sync {
    /// Create a bridge and return its id.
    async fn create_bridge(&self, customer_id: Uuid, kind: BridgeKind)
        -> Result<Uuid, ConferenceError>;

    async fn delete_bridge(&self, bridge_id: Uuid) -> Result<(), ConferenceError>;

    /// Remove a leg from a bridge.
    async fn kick(&self, bridge_id: Uuid, leg_id: Uuid) -> Result<(), ConferenceError>;

    async fn get_leg(&self, leg_id: Uuid) -> Result<LegState, ConferenceError>;

    /// Start recording a bridge and return the recording id.
    async fn start_recording(
        &self,
        customer_id: Uuid,
        bridge_id: Uuid,
        params: &RecordingParams,
    ) -> Result<Uuid, ConferenceError>;

    async fn stop_recording(&self, recording_id: Uuid) -> Result<(), ConferenceError>;

    /// Start transcribing a bridge and return the transcription id.
    async fn start_transcription(
        &self,
        customer_id: Uuid,
        bridge_id: Uuid,
        language: &str,
    ) -> Result<Uuid, ConferenceError>;

    async fn stop_transcription(&self, transcribe_id: Uuid) -> Result<(), ConferenceError>;
}

#[derive(Debug, Serialize)]
struct CreateBridgeRequest {
    customer_id: Uuid,
    #[serde(rename = "type")]
    kind: BridgeKind,
}

#[derive(Debug, Serialize)]
struct StartRecordingRequest<'a> {
    customer_id: Uuid,
    reference_type: &'static str,
    reference_id: Uuid,
    format: &'a str,
    duration_seconds: u32,
}

#[derive(Debug, Serialize)]
struct StartTranscriptionRequest<'a> {
    customer_id: Uuid,
    reference_type: &'static str,
    reference_id: Uuid,
    language: &'a str,
    direction: &'static str,
}

#[derive(Debug, Deserialize)]
struct IdResponse {
    id: Uuid,
}

/// HTTP client for the call-control plane.
#[derive(Clone)]
pub struct HttpCallControl {
    client: Client,
    base_url: String,
    metrics: Arc<dyn MetricsSink>,
}

impl HttpCallControl {
    /// Create a new client.
    ///
    /// # Errors
    ///
    /// Returns `ConferenceError::Internal` if the HTTP client cannot be built.
    pub fn new(base_url: String, metrics: Arc<dyn MetricsSink>) -> Result<Self, ConferenceError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(CALL_CONTROL_REQUEST_TIMEOUT_SECS))
            .connect_timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| {
                error!(target: "cs.services.call_control", error = %e, "Failed to build HTTP client");
                ConferenceError::Internal(format!("failed to build HTTP client: {}", e))
            })?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            metrics,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Send a request, record its metrics, and map non-2xx statuses.
    async fn execute(
        &self,
        operation: &'static str,
        request: RequestBuilder,
    ) -> Result<Response, ConferenceError> {
        let start = Instant::now();

        let result = match request.send().await {
            Ok(response) => Self::check_status(operation, response).await,
            Err(e) => {
                warn!(target: "cs.services.call_control", operation, error = %e, "Call-control request failed");
                Err(ConferenceError::Upstream(format!(
                    "{} request failed: {}",
                    operation, e
                )))
            }
        };

        let status = if result.is_ok() { "success" } else { "error" };
        self.metrics
            .call_control_request(operation, status, start.elapsed());

        result
    }

    async fn check_status(
        operation: &'static str,
        response: Response,
    ) -> Result<Response, ConferenceError> {
        let status = response.status();

        if status.is_success() {
            Ok(response)
        } else if status == StatusCode::NOT_FOUND {
            Err(ConferenceError::NotFound(format!(
                "{}: resource not found in call-control",
                operation
            )))
        } else if status.is_server_error() {
            warn!(target: "cs.services.call_control", operation, status = %status, "Call-control returned server error");
            Err(ConferenceError::Upstream(format!(
                "{} failed with status {}",
                operation, status
            )))
        } else {
            let body = response.text().await.unwrap_or_default();
            warn!(target: "cs.services.call_control", operation, status = %status, body = %body, "Call-control rejected request");
            Err(ConferenceError::Upstream(format!(
                "{} rejected with status {}",
                operation, status
            )))
        }
    }

    async fn parse<T: DeserializeOwned>(
        operation: &'static str,
        response: Response,
    ) -> Result<T, ConferenceError> {
        response.json().await.map_err(|e| {
            error!(target: "cs.services.call_control", operation, error = %e, "Failed to parse call-control response");
            ConferenceError::Upstream(format!("invalid {} response: {}", operation, e))
        })
    }
}

#[async_trait::async_trait]
impl CallControl for HttpCallControl {
    #[instrument(skip_all, fields(customer_id = %customer_id, kind = kind.as_str()))]
    async fn create_bridge(
        &self,
        customer_id: Uuid,
        kind: BridgeKind,
    ) -> Result<Uuid, ConferenceError> {
        let request = self
            .client
            .post(self.url("/v1/confbridges"))
            .json(&CreateBridgeRequest { customer_id, kind });

        let response = self.execute("create_bridge", request).await?;
        let body: IdResponse = Self::parse("create_bridge", response).await?;
        Ok(body.id)
    }

    #[instrument(skip_all, fields(bridge_id = %bridge_id))]
    async fn delete_bridge(&self, bridge_id: Uuid) -> Result<(), ConferenceError> {
        let request = self
            .client
            .delete(self.url(&format!("/v1/confbridges/{}", bridge_id)));

        self.execute("delete_bridge", request).await?;
        Ok(())
    }

    #[instrument(skip_all, fields(bridge_id = %bridge_id, leg_id = %leg_id))]
    async fn kick(&self, bridge_id: Uuid, leg_id: Uuid) -> Result<(), ConferenceError> {
        let request = self.client.delete(self.url(&format!(
            "/v1/confbridges/{}/calls/{}",
            bridge_id, leg_id
        )));

        self.execute("kick", request).await?;
        Ok(())
    }

    #[instrument(skip_all, fields(leg_id = %leg_id))]
    async fn get_leg(&self, leg_id: Uuid) -> Result<LegState, ConferenceError> {
        let request = self.client.get(self.url(&format!("/v1/calls/{}", leg_id)));

        let response = self.execute("get_leg", request).await?;
        Self::parse("get_leg", response).await
    }

    #[instrument(skip_all, fields(customer_id = %customer_id, bridge_id = %bridge_id))]
    async fn start_recording(
        &self,
        customer_id: Uuid,
        bridge_id: Uuid,
        params: &RecordingParams,
    ) -> Result<Uuid, ConferenceError> {
        let request = self
            .client
            .post(self.url("/v1/recordings"))
            .json(&StartRecordingRequest {
                customer_id,
                reference_type: "confbridge",
                reference_id: bridge_id,
                format: &params.format,
                duration_seconds: params.duration_seconds,
            });

        let response = self.execute("start_recording", request).await?;
        let body: IdResponse = Self::parse("start_recording", response).await?;
        Ok(body.id)
    }

    #[instrument(skip_all, fields(recording_id = %recording_id))]
    async fn stop_recording(&self, recording_id: Uuid) -> Result<(), ConferenceError> {
        let request = self
            .client
            .post(self.url(&format!("/v1/recordings/{}/stop", recording_id)));

        self.execute("stop_recording", request).await?;
        Ok(())
    }

    #[instrument(skip_all, fields(customer_id = %customer_id, bridge_id = %bridge_id))]
    async fn start_transcription(
        &self,
        customer_id: Uuid,
        bridge_id: Uuid,
        language: &str,
    ) -> Result<Uuid, ConferenceError> {
        let request = self
            .client
            .post(self.url("/v1/transcribes"))
            .json(&StartTranscriptionRequest {
                customer_id,
                reference_type: "confbridge",
                reference_id: bridge_id,
                language,
                direction: "both",
            });

        let response = self.execute("start_transcription", request).await?;
        let body: IdResponse = Self::parse("start_transcription", response).await?;
        Ok(body.id)
    }

    #[instrument(skip_all, fields(transcribe_id = %transcribe_id))]
    async fn stop_transcription(&self, transcribe_id: Uuid) -> Result<(), ConferenceError> {
        let request = self
            .client
            .post(self.url(&format!("/v1/transcribes/{}/stop", transcribe_id)));

        self.execute("stop_transcription", request).await?;
        Ok(())
    }
}
