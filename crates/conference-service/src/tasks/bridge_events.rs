//! Bridge-event subscriber.
//!
//! Listens on the inbound bridge-event channel and feeds each message to the
//! [`EventRelay`]. Messages are handled one at a time, in arrival order. A
//! dropped subscription is re-established after a short delay.

use crate::errors::ConferenceError;
use crate::relay::EventRelay;
use futures::StreamExt;
use redis::Client;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Delay before re-subscribing after the subscription is lost.
const RESUBSCRIBE_DELAY: Duration = Duration::from_secs(1);

#[instrument(skip_all, name = "cs.task.bridge_events", fields(channel = %channel))]
pub async fn start_bridge_event_subscriber(
    client: Client,
    channel: String,
    relay: Arc<EventRelay>,
    cancel_token: CancellationToken,
) {
    info!(target: "cs.relay", "Starting bridge event subscriber");

    loop {
        match relay_messages(&client, &channel, &relay, &cancel_token).await {
            Ok(()) => break,
            Err(e) => {
                warn!(target: "cs.relay", error = %e, "Bridge event subscription lost, resubscribing");
            }
        }

        tokio::select! {
            _ = tokio::time::sleep(RESUBSCRIBE_DELAY) => {}
            _ = cancel_token.cancelled() => break,
        }
    }

    info!(target: "cs.relay", "Bridge event subscriber stopped");
}

/// Returns `Ok` only when cancelled.
async fn relay_messages(
    client: &Client,
    channel: &str,
    relay: &EventRelay,
    cancel_token: &CancellationToken,
) -> Result<(), ConferenceError> {
    let mut pubsub = client.get_async_pubsub().await?;
    pubsub.subscribe(channel).await?;
    debug!(target: "cs.relay", "Subscribed to bridge events");

    let mut messages = Box::pin(pubsub.on_message());

    loop {
        tokio::select! {
            message = messages.next() => {
                let Some(message) = message else {
                    return Err(ConferenceError::Redis("subscription stream ended".to_string()));
                };

                let payload: String = match message.get_payload() {
                    Ok(payload) => payload,
                    Err(e) => {
                        warn!(target: "cs.relay", error = %e, "Dropping non-text bridge event");
                        continue;
                    }
                };

                if let Err(e) = relay.handle_payload(&payload).await {
                    warn!(target: "cs.relay", error = %e, "Failed to apply bridge event");
                }
            }
            _ = cancel_token.cancelled() => return Ok(()),
        }
    }
}
