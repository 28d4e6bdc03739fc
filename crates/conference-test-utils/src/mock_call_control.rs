//! Call-control double.
//!
//! Records every command in order and answers from configurable state.
//! Bridges and recordings get fresh ids; legs answer from whatever was
//! registered with [`MockCallControl::set_leg`].

use conference_service::errors::ConferenceError;
use conference_service::services::{BridgeKind, CallControl, LegState, LegStatus, RecordingParams};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use uuid::Uuid;

/// One command issued to the call-control plane.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallControlCommand {
    CreateBridge { customer_id: Uuid, kind: BridgeKind, bridge_id: Uuid },
    DeleteBridge { bridge_id: Uuid },
    Kick { bridge_id: Uuid, leg_id: Uuid },
    GetLeg { leg_id: Uuid },
    StartRecording { bridge_id: Uuid, recording_id: Uuid },
    StopRecording { recording_id: Uuid },
    StartTranscription { bridge_id: Uuid, language: String, transcribe_id: Uuid },
    StopTranscription { transcribe_id: Uuid },
}

/// Operations that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallControlOp {
    CreateBridge,
    DeleteBridge,
    Kick,
    GetLeg,
    StartRecording,
    StopRecording,
    StartTranscription,
    StopTranscription,
}

#[derive(Debug, Default)]
pub struct MockCallControl {
    commands: Mutex<Vec<CallControlCommand>>,
    legs: Mutex<HashMap<Uuid, LegState>>,
    failing: Mutex<HashSet<CallControlOp>>,
}

impl MockCallControl {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, op: CallControlOp, failing: bool) {
        let mut set = self.failing.lock().unwrap();
        if failing {
            set.insert(op);
        } else {
            set.remove(&op);
        }
    }

    /// Register the external state of a leg.
    pub fn set_leg(&self, leg_id: Uuid, status: LegStatus, confbridge_id: Option<Uuid>) {
        self.legs.lock().unwrap().insert(
            leg_id,
            LegState {
                id: leg_id,
                status,
                confbridge_id,
            },
        );
    }

    pub fn commands(&self) -> Vec<CallControlCommand> {
        self.commands.lock().unwrap().clone()
    }

    /// `(bridge_id, leg_id)` of every kick, in order.
    pub fn kicks(&self) -> Vec<(Uuid, Uuid)> {
        self.commands()
            .into_iter()
            .filter_map(|c| match c {
                CallControlCommand::Kick { bridge_id, leg_id } => Some((bridge_id, leg_id)),
                _ => None,
            })
            .collect()
    }

    pub fn created_bridges(&self) -> Vec<(BridgeKind, Uuid)> {
        self.commands()
            .into_iter()
            .filter_map(|c| match c {
                CallControlCommand::CreateBridge {
                    kind, bridge_id, ..
                } => Some((kind, bridge_id)),
                _ => None,
            })
            .collect()
    }

    pub fn deleted_bridges(&self) -> Vec<Uuid> {
        self.commands()
            .into_iter()
            .filter_map(|c| match c {
                CallControlCommand::DeleteBridge { bridge_id } => Some(bridge_id),
                _ => None,
            })
            .collect()
    }

    fn record(&self, op: CallControlOp, command: CallControlCommand) -> Result<(), ConferenceError> {
        self.commands.lock().unwrap().push(command);
        if self.failing.lock().unwrap().contains(&op) {
            return Err(ConferenceError::Upstream(format!(
                "injected call-control failure: {:?}",
                op
            )));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl CallControl for MockCallControl {
    async fn create_bridge(
        &self,
        customer_id: Uuid,
        kind: BridgeKind,
    ) -> Result<Uuid, ConferenceError> {
        let bridge_id = Uuid::new_v4();
        self.record(
            CallControlOp::CreateBridge,
            CallControlCommand::CreateBridge {
                customer_id,
                kind,
                bridge_id,
            },
        )?;
        Ok(bridge_id)
    }

    async fn delete_bridge(&self, bridge_id: Uuid) -> Result<(), ConferenceError> {
        self.record(
            CallControlOp::DeleteBridge,
            CallControlCommand::DeleteBridge { bridge_id },
        )
    }

    async fn kick(&self, bridge_id: Uuid, leg_id: Uuid) -> Result<(), ConferenceError> {
        self.record(
            CallControlOp::Kick,
            CallControlCommand::Kick { bridge_id, leg_id },
        )
    }

    async fn get_leg(&self, leg_id: Uuid) -> Result<LegState, ConferenceError> {
        self.record(CallControlOp::GetLeg, CallControlCommand::GetLeg { leg_id })?;
        self.legs
            .lock()
            .unwrap()
            .get(&leg_id)
            .cloned()
            .ok_or_else(|| ConferenceError::NotFound(format!("leg {} not found", leg_id)))
    }

    async fn start_recording(
        &self,
        _customer_id: Uuid,
        bridge_id: Uuid,
        _params: &RecordingParams,
    ) -> Result<Uuid, ConferenceError> {
        let recording_id = Uuid::new_v4();
        self.record(
            CallControlOp::StartRecording,
            CallControlCommand::StartRecording {
                bridge_id,
                recording_id,
            },
        )?;
        Ok(recording_id)
    }

    async fn stop_recording(&self, recording_id: Uuid) -> Result<(), ConferenceError> {
        self.record(
            CallControlOp::StopRecording,
            CallControlCommand::StopRecording { recording_id },
        )
    }

    async fn start_transcription(
        &self,
        _customer_id: Uuid,
        bridge_id: Uuid,
        language: &str,
    ) -> Result<Uuid, ConferenceError> {
        let transcribe_id = Uuid::new_v4();
        self.record(
            CallControlOp::StartTranscription,
            CallControlCommand::StartTranscription {
                bridge_id,
                language: language.to_string(),
                transcribe_id,
            },
        )?;
        Ok(transcribe_id)
    }

    async fn stop_transcription(&self, transcribe_id: Uuid) -> Result<(), ConferenceError> {
        self.record(
            CallControlOp::StopTranscription,
            CallControlCommand::StopTranscription { transcribe_id },
        )
    }
}
