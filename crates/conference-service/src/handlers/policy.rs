//! Post-removal policy.
//!
//! After a leg leaves a room, the room's type decides whether anything else
//! has to happen. Each policy is a pure function of the re-fetched room.

use crate::models::{Conference, ConferenceStatus, ConferenceType};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostRemovalAction {
    /// Final teardown of the room.
    Destroy,
}

pub type PostRemovalPolicy = fn(&Conference) -> Option<PostRemovalAction>;

/// Policy for a room type.
pub fn policy_for(conference_type: ConferenceType) -> PostRemovalPolicy {
    match conference_type {
        ConferenceType::Conference | ConferenceType::Connect | ConferenceType::Queue => {
            destroy_when_drained
        }
    }
}

/// Action to take for `conference` right after a leg was removed from it.
pub fn post_removal_action(conference: &Conference) -> Option<PostRemovalAction> {
    policy_for(conference.conference_type)(conference)
}

/// A terminating room with no members left has finished draining.
fn destroy_when_drained(conference: &Conference) -> Option<PostRemovalAction> {
    let drained = conference.status == ConferenceStatus::Terminating
        && conference.conferencecall_ids.is_empty();
    drained.then_some(PostRemovalAction::Destroy)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ConferenceData;
    use chrono::Utc;
    use uuid::Uuid;

    fn room(status: ConferenceStatus, members: usize) -> Conference {
        Conference {
            id: Uuid::new_v4(),
            customer_id: Uuid::new_v4(),
            confbridge_id: Uuid::new_v4(),
            conference_type: ConferenceType::Conference,
            status,
            name: String::new(),
            detail: String::new(),
            data: ConferenceData::new(),
            timeout_seconds: 0,
            pre_flow_id: None,
            post_flow_id: None,
            conferencecall_ids: (0..members).map(|_| Uuid::new_v4()).collect(),
            recording_id: None,
            recording_ids: vec![],
            transcribe_id: None,
            transcribe_ids: vec![],
            tm_end: None,
            tm_create: Utc::now(),
            tm_update: None,
            tm_delete: None,
        }
    }

    #[test]
    fn test_drained_terminating_room_is_destroyed() {
        let conference = room(ConferenceStatus::Terminating, 0);
        assert_eq!(
            post_removal_action(&conference),
            Some(PostRemovalAction::Destroy)
        );
    }

    #[test]
    fn test_terminating_room_with_members_waits() {
        let conference = room(ConferenceStatus::Terminating, 1);
        assert_eq!(post_removal_action(&conference), None);
    }

    #[test]
    fn test_progressing_room_survives_going_empty() {
        let conference = room(ConferenceStatus::Progressing, 0);
        assert_eq!(post_removal_action(&conference), None);
    }

    #[test]
    fn test_terminated_room_is_not_destroyed_again() {
        let conference = room(ConferenceStatus::Terminated, 0);
        assert_eq!(post_removal_action(&conference), None);
    }

    #[test]
    fn test_every_type_has_a_policy() {
        for conference_type in [
            ConferenceType::Conference,
            ConferenceType::Connect,
            ConferenceType::Queue,
        ] {
            let mut conference = room(ConferenceStatus::Terminating, 0);
            conference.conference_type = conference_type;
            assert_eq!(
                policy_for(conference_type)(&conference),
                Some(PostRemovalAction::Destroy)
            );
        }
    }
}
