//! Event relay.
//!
//! Maps inbound bridge notifications onto leg transitions. The call-control
//! plane only knows its own leg ids, so legs are looked up by reference id.
//! A bridge may host legs that belong to no conference; their events are
//! dropped quietly.

use crate::errors::ConferenceError;
use crate::handlers::ConferencecallHandler;
use crate::models::Conferencecall;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

/// Notification from the call-control plane about a leg and a bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BridgeEvent {
    LegEntered { reference_id: Uuid },
    LegLeft { reference_id: Uuid },
}

impl BridgeEvent {
    pub fn reference_id(&self) -> Uuid {
        match self {
            BridgeEvent::LegEntered { reference_id } | BridgeEvent::LegLeft { reference_id } => {
                *reference_id
            }
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            BridgeEvent::LegEntered { .. } => "leg_entered",
            BridgeEvent::LegLeft { .. } => "leg_left",
        }
    }
}

pub struct EventRelay {
    conferencecall_handler: Arc<ConferencecallHandler>,
}

impl EventRelay {
    pub fn new(conferencecall_handler: Arc<ConferencecallHandler>) -> Self {
        Self {
            conferencecall_handler,
        }
    }

    /// Apply one event. Returns the affected leg, or `None` when the
    /// reference is not a conference leg.
    #[instrument(skip_all, fields(event = event.as_str(), reference_id = %event.reference_id()))]
    pub async fn handle(
        &self,
        event: BridgeEvent,
    ) -> Result<Option<Conferencecall>, ConferenceError> {
        let conferencecall = match self
            .conferencecall_handler
            .get_by_reference_id(event.reference_id())
            .await
        {
            Ok(conferencecall) => conferencecall,
            Err(e) if e.is_not_found() => {
                debug!(target: "cs.relay", "No conferencecall for reference, ignoring");
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        let updated = match event {
            BridgeEvent::LegEntered { .. } => {
                self.conferencecall_handler.joined(&conferencecall).await?
            }
            BridgeEvent::LegLeft { .. } => {
                self.conferencecall_handler
                    .terminated(&conferencecall)
                    .await?
            }
        };

        Ok(Some(updated))
    }

    /// Decode a raw message and apply it. Malformed messages are logged and
    /// dropped.
    pub async fn handle_payload(
        &self,
        payload: &str,
    ) -> Result<Option<Conferencecall>, ConferenceError> {
        let event: BridgeEvent = match serde_json::from_str(payload) {
            Ok(event) => event,
            Err(e) => {
                warn!(target: "cs.relay", error = %e, "Dropping malformed bridge event");
                return Ok(None);
            }
        };

        self.handle(event).await
    }
}
