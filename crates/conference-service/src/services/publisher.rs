//! Domain event publishing.

use crate::models::DomainEvent;

/// Fan-out of domain events to downstream consumers.
///
/// Publishing is fire-and-forget: implementations log delivery failures and
/// never fail the operation that produced the event.
#[async_trait::async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, event: DomainEvent);
}
