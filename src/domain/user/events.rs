use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::event_sourcing::core::{
    decode_payload, encode_payload, AggregateRef, AggregateType, DomainEvent, EventKind, UniqueConstraint, Version,
};

// ============================================================================
// User Events - Domain Events for the User Aggregate
// ============================================================================

pub const USER_AGGREGATE_TYPE: &str = "user";
pub const USER_AGGREGATE_VERSION: &str = "v2";

pub const UNIQUE_USERNAME: &str = "username";

/// Reference to a user stream, owned by the user's org
pub fn user_aggregate(user_id: &str, org_id: &str, instance_id: &str) -> AggregateRef {
    AggregateRef::new(
        AggregateType::new(USER_AGGREGATE_TYPE),
        user_id,
        org_id,
        instance_id,
        Version::new(USER_AGGREGATE_VERSION),
    )
}

/// Usernames are unique per org
fn username_key(org_id: &str, username: &str) -> String {
    format!("{org_id}:{username}")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserKind {
    HumanAdded,
    HumanProfileChanged,
    Deactivated,
    Reactivated,
    Removed,
}

impl EventKind for UserKind {
    const ALL: &'static [Self] = &[
        UserKind::HumanAdded,
        UserKind::HumanProfileChanged,
        UserKind::Deactivated,
        UserKind::Reactivated,
        UserKind::Removed,
    ];

    fn event_type(self) -> &'static str {
        match self {
            UserKind::HumanAdded => "user.human.added",
            UserKind::HumanProfileChanged => "user.human.profile.changed",
            UserKind::Deactivated => "user.deactivated",
            UserKind::Reactivated => "user.reactivated",
            UserKind::Removed => "user.removed",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum UserEvent {
    HumanAdded(HumanAdded),
    HumanProfileChanged(ProfileChanged),
    Deactivated,
    Reactivated,
    Removed(UserRemoved),
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct HumanAdded {
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub display_name: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub preferred_language: String,
}

/// Only the changed fields are present
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct ProfileChanged {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred_language: Option<String>,
}

impl ProfileChanged {
    pub fn is_empty(&self) -> bool {
        self == &ProfileChanged::default()
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct UserRemoved {
    pub username: String,
}

impl DomainEvent for UserEvent {
    type Kind = UserKind;

    fn kind(&self) -> UserKind {
        match self {
            UserEvent::HumanAdded(_) => UserKind::HumanAdded,
            UserEvent::HumanProfileChanged(_) => UserKind::HumanProfileChanged,
            UserEvent::Deactivated => UserKind::Deactivated,
            UserEvent::Reactivated => UserKind::Reactivated,
            UserEvent::Removed(_) => UserKind::Removed,
        }
    }

    fn payload(&self) -> serde_json::Result<Option<Value>> {
        match self {
            UserEvent::HumanAdded(e) => encode_payload(e),
            UserEvent::HumanProfileChanged(e) => encode_payload(e),
            UserEvent::Deactivated | UserEvent::Reactivated => Ok(None),
            UserEvent::Removed(e) => encode_payload(e),
        }
    }

    fn decode(kind: UserKind, payload: Option<&Value>) -> serde_json::Result<Self> {
        Ok(match kind {
            UserKind::HumanAdded => UserEvent::HumanAdded(decode_payload(payload)?),
            UserKind::HumanProfileChanged => UserEvent::HumanProfileChanged(decode_payload(payload)?),
            UserKind::Deactivated => UserEvent::Deactivated,
            UserKind::Reactivated => UserEvent::Reactivated,
            UserKind::Removed => UserEvent::Removed(decode_payload(payload)?),
        })
    }

    fn unique_constraints(&self, aggregate: &AggregateRef) -> Vec<UniqueConstraint> {
        match self {
            UserEvent::HumanAdded(e) => vec![UniqueConstraint::add(
                UNIQUE_USERNAME,
                username_key(&aggregate.resource_owner, &e.username),
                format!("username {} is already taken", e.username),
            )],
            UserEvent::Removed(e) => vec![UniqueConstraint::remove(
                UNIQUE_USERNAME,
                username_key(&aggregate.resource_owner, &e.username),
            )],
            _ => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_change_omits_untouched_fields() {
        let event = UserEvent::HumanProfileChanged(ProfileChanged {
            last_name: Some("Doe".to_string()),
            ..ProfileChanged::default()
        });
        assert_eq!(event.payload().unwrap(), Some(serde_json::json!({ "last_name": "Doe" })));
    }

    #[test]
    fn test_username_is_unique_per_org() {
        let event = UserEvent::HumanAdded(HumanAdded {
            username: "jane".to_string(),
            first_name: "Jane".to_string(),
            last_name: "Doe".to_string(),
            display_name: "Jane Doe".to_string(),
            email: "jane@example.com".to_string(),
            preferred_language: String::new(),
        });
        let constraints = event.unique_constraints(&user_aggregate("user1", "org1", "instance1"));
        assert_eq!(constraints[0].unique_field, "org1:jane");
    }
}
