//! Request fixtures.

use conference_service::handlers::{CreateConference, CreateConferencecall};
use conference_service::models::{Conference, ConferenceType, ReferenceType};
use uuid::Uuid;

/// Customer used by every fixture.
pub const TEST_CUSTOMER_ID: Uuid = Uuid::from_u128(0x5c1a_0000_0000_4000_8000_0000_0000_0001);

#[must_use]
pub fn create_conference_request(
    conference_type: ConferenceType,
    timeout_seconds: i32,
) -> CreateConference {
    CreateConference {
        customer_id: TEST_CUSTOMER_ID,
        conference_type,
        name: "test conference".to_string(),
        detail: "created by a test".to_string(),
        timeout_seconds,
        ..Default::default()
    }
}

/// Leg request for `conference` with a fresh external reference.
#[must_use]
pub fn create_conferencecall_request(conference: &Conference) -> CreateConferencecall {
    CreateConferencecall {
        customer_id: conference.customer_id,
        activeflow_id: Some(Uuid::new_v4()),
        conference_id: conference.id,
        reference_type: ReferenceType::Call,
        reference_id: Uuid::new_v4(),
    }
}
