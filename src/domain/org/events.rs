use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::event_sourcing::core::{
    decode_payload, encode_payload, AggregateRef, AggregateType, DomainEvent, EventKind, UniqueConstraint, Version,
};
use super::value_objects::DomainValidationType;

// ============================================================================
// Org Events - Domain Events for the Org Aggregate
// ============================================================================
//
// One stream per organisation. The org is its own resource owner.
// Domains and members live in the org stream as well.
//
// ============================================================================

pub const ORG_AGGREGATE_TYPE: &str = "org";
pub const ORG_AGGREGATE_VERSION: &str = "v1";

pub const UNIQUE_ORG_NAME: &str = "org_name";
pub const UNIQUE_ORG_DOMAIN: &str = "org_domain";
pub const UNIQUE_MEMBER: &str = "member";

/// Reference to an org stream
pub fn org_aggregate(org_id: &str, instance_id: &str) -> AggregateRef {
    AggregateRef::new(
        AggregateType::new(ORG_AGGREGATE_TYPE),
        org_id,
        org_id,
        instance_id,
        Version::new(ORG_AGGREGATE_VERSION),
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrgKind {
    Added,
    Changed,
    Deactivated,
    Reactivated,
    Removed,
    DomainAdded,
    DomainVerificationAdded,
    DomainVerificationFailed,
    DomainVerified,
    DomainPrimarySet,
    DomainRemoved,
    MemberAdded,
    MemberRemoved,
}

impl EventKind for OrgKind {
    const ALL: &'static [Self] = &[
        OrgKind::Added,
        OrgKind::Changed,
        OrgKind::Deactivated,
        OrgKind::Reactivated,
        OrgKind::Removed,
        OrgKind::DomainAdded,
        OrgKind::DomainVerificationAdded,
        OrgKind::DomainVerificationFailed,
        OrgKind::DomainVerified,
        OrgKind::DomainPrimarySet,
        OrgKind::DomainRemoved,
        OrgKind::MemberAdded,
        OrgKind::MemberRemoved,
    ];

    fn event_type(self) -> &'static str {
        match self {
            OrgKind::Added => "org.added",
            OrgKind::Changed => "org.changed",
            OrgKind::Deactivated => "org.deactivated",
            OrgKind::Reactivated => "org.reactivated",
            OrgKind::Removed => "org.removed",
            OrgKind::DomainAdded => "org.domain.added",
            OrgKind::DomainVerificationAdded => "org.domain.verification.added",
            OrgKind::DomainVerificationFailed => "org.domain.verification.failed",
            OrgKind::DomainVerified => "org.domain.verified",
            OrgKind::DomainPrimarySet => "org.domain.primary.set",
            OrgKind::DomainRemoved => "org.domain.removed",
            OrgKind::MemberAdded => "org.member.added",
            OrgKind::MemberRemoved => "org.member.removed",
        }
    }
}

/// Org Event - Union type for all org events
#[derive(Debug, Clone, PartialEq)]
pub enum OrgEvent {
    Added(OrgAdded),
    Changed(OrgChanged),
    Deactivated,
    Reactivated,
    Removed(OrgRemoved),
    DomainAdded(OrgDomain),
    DomainVerificationAdded(DomainVerificationAdded),
    DomainVerificationFailed(OrgDomain),
    DomainVerified(OrgDomain),
    DomainPrimarySet(OrgDomain),
    DomainRemoved(DomainRemoved),
    MemberAdded(MemberAdded),
    MemberRemoved(MemberRemoved),
}

// ============================================================================
// Individual Event Payloads
// ============================================================================

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct OrgAdded {
    pub name: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct OrgChanged {
    pub name: String,
    /// Released from the name constraint
    pub old_name: String,
}

/// Carries everything the org still holds constraints for
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct OrgRemoved {
    pub name: String,
    #[serde(default)]
    pub verified_domains: Vec<String>,
    #[serde(default)]
    pub members: Vec<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct OrgDomain {
    pub domain: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct DomainVerificationAdded {
    pub domain: String,
    pub validation_type: DomainValidationType,
    pub validation_code: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct DomainRemoved {
    pub domain: String,
    pub was_verified: bool,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct MemberAdded {
    pub user_id: String,
    pub roles: Vec<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct MemberRemoved {
    pub user_id: String,
}

fn member_key(org_id: &str, user_id: &str) -> String {
    format!("{org_id}:{user_id}")
}

impl OrgEvent {
    pub fn domain(kind: fn(OrgDomain) -> OrgEvent, domain: &str) -> OrgEvent {
        kind(OrgDomain { domain: domain.to_string() })
    }
}

impl DomainEvent for OrgEvent {
    type Kind = OrgKind;

    fn kind(&self) -> OrgKind {
        match self {
            OrgEvent::Added(_) => OrgKind::Added,
            OrgEvent::Changed(_) => OrgKind::Changed,
            OrgEvent::Deactivated => OrgKind::Deactivated,
            OrgEvent::Reactivated => OrgKind::Reactivated,
            OrgEvent::Removed(_) => OrgKind::Removed,
            OrgEvent::DomainAdded(_) => OrgKind::DomainAdded,
            OrgEvent::DomainVerificationAdded(_) => OrgKind::DomainVerificationAdded,
            OrgEvent::DomainVerificationFailed(_) => OrgKind::DomainVerificationFailed,
            OrgEvent::DomainVerified(_) => OrgKind::DomainVerified,
            OrgEvent::DomainPrimarySet(_) => OrgKind::DomainPrimarySet,
            OrgEvent::DomainRemoved(_) => OrgKind::DomainRemoved,
            OrgEvent::MemberAdded(_) => OrgKind::MemberAdded,
            OrgEvent::MemberRemoved(_) => OrgKind::MemberRemoved,
        }
    }

    fn payload(&self) -> serde_json::Result<Option<Value>> {
        match self {
            OrgEvent::Added(e) => encode_payload(e),
            OrgEvent::Changed(e) => encode_payload(e),
            OrgEvent::Deactivated | OrgEvent::Reactivated => Ok(None),
            OrgEvent::Removed(e) => encode_payload(e),
            OrgEvent::DomainAdded(e)
            | OrgEvent::DomainVerificationFailed(e)
            | OrgEvent::DomainVerified(e)
            | OrgEvent::DomainPrimarySet(e) => encode_payload(e),
            OrgEvent::DomainVerificationAdded(e) => encode_payload(e),
            OrgEvent::DomainRemoved(e) => encode_payload(e),
            OrgEvent::MemberAdded(e) => encode_payload(e),
            OrgEvent::MemberRemoved(e) => encode_payload(e),
        }
    }

    fn decode(kind: OrgKind, payload: Option<&Value>) -> serde_json::Result<Self> {
        Ok(match kind {
            OrgKind::Added => OrgEvent::Added(decode_payload(payload)?),
            OrgKind::Changed => OrgEvent::Changed(decode_payload(payload)?),
            OrgKind::Deactivated => OrgEvent::Deactivated,
            OrgKind::Reactivated => OrgEvent::Reactivated,
            OrgKind::Removed => OrgEvent::Removed(decode_payload(payload)?),
            OrgKind::DomainAdded => OrgEvent::DomainAdded(decode_payload(payload)?),
            OrgKind::DomainVerificationAdded => OrgEvent::DomainVerificationAdded(decode_payload(payload)?),
            OrgKind::DomainVerificationFailed => OrgEvent::DomainVerificationFailed(decode_payload(payload)?),
            OrgKind::DomainVerified => OrgEvent::DomainVerified(decode_payload(payload)?),
            OrgKind::DomainPrimarySet => OrgEvent::DomainPrimarySet(decode_payload(payload)?),
            OrgKind::DomainRemoved => OrgEvent::DomainRemoved(decode_payload(payload)?),
            OrgKind::MemberAdded => OrgEvent::MemberAdded(decode_payload(payload)?),
            OrgKind::MemberRemoved => OrgEvent::MemberRemoved(decode_payload(payload)?),
        })
    }

    fn unique_constraints(&self, aggregate: &AggregateRef) -> Vec<UniqueConstraint> {
        match self {
            OrgEvent::Added(e) => vec![org_name_constraint(&e.name)],
            OrgEvent::Changed(e) => vec![
                UniqueConstraint::remove(UNIQUE_ORG_NAME, &e.old_name),
                org_name_constraint(&e.name),
            ],
            OrgEvent::Removed(e) => {
                let mut constraints = vec![UniqueConstraint::remove(UNIQUE_ORG_NAME, &e.name)];
                constraints.extend(
                    e.verified_domains
                        .iter()
                        .map(|domain| UniqueConstraint::remove(UNIQUE_ORG_DOMAIN, domain)),
                );
                constraints.extend(
                    e.members
                        .iter()
                        .map(|user_id| UniqueConstraint::remove(UNIQUE_MEMBER, member_key(&aggregate.id, user_id))),
                );
                constraints
            }
            OrgEvent::DomainVerified(e) => vec![UniqueConstraint::add(
                UNIQUE_ORG_DOMAIN,
                &e.domain,
                format!("domain {} is already taken", e.domain),
            )],
            OrgEvent::DomainRemoved(e) if e.was_verified => {
                vec![UniqueConstraint::remove(UNIQUE_ORG_DOMAIN, &e.domain)]
            }
            OrgEvent::MemberAdded(e) => vec![UniqueConstraint::add(
                UNIQUE_MEMBER,
                member_key(&aggregate.id, &e.user_id),
                "member already exists",
            )],
            OrgEvent::MemberRemoved(e) => {
                vec![UniqueConstraint::remove(UNIQUE_MEMBER, member_key(&aggregate.id, &e.user_id))]
            }
            _ => Vec::new(),
        }
    }
}

fn org_name_constraint(name: &str) -> UniqueConstraint {
    UniqueConstraint::add(UNIQUE_ORG_NAME, name, format!("org name {name} is already taken"))
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::org::value_objects::ORG_OWNER_ROLE;
    use crate::event_sourcing::core::UniqueConstraintAction;

    #[test]
    fn test_every_kind_has_a_distinct_event_type() {
        let mut types: Vec<_> = OrgKind::ALL.iter().map(|kind| kind.event_type()).collect();
        types.sort_unstable();
        types.dedup();
        assert_eq!(types.len(), OrgKind::ALL.len());
        assert_eq!(OrgKind::parse("org.domain.primary.set"), Some(OrgKind::DomainPrimarySet));
    }

    #[test]
    fn test_member_constraint_is_scoped_to_org() {
        let aggregate = org_aggregate("org2", "instance1");
        let event = OrgEvent::MemberAdded(MemberAdded {
            user_id: "user1".to_string(),
            roles: vec![ORG_OWNER_ROLE.to_string()],
        });
        let constraints = event.unique_constraints(&aggregate);
        assert_eq!(constraints.len(), 1);
        assert_eq!(constraints[0].unique_type, UNIQUE_MEMBER);
        assert_eq!(constraints[0].unique_field, "org2:user1");
        assert_eq!(constraints[0].action, UniqueConstraintAction::Add);
    }

    #[test]
    fn test_removed_org_releases_all_constraints() {
        let aggregate = org_aggregate("org2", "instance1");
        let event = OrgEvent::Removed(OrgRemoved {
            name: "Org".to_string(),
            verified_domains: vec!["org.iam-domain".to_string(), "org.example".to_string()],
            members: vec!["user1".to_string()],
        });
        let constraints = event.unique_constraints(&aggregate);
        assert_eq!(constraints.len(), 4);
        assert!(constraints.iter().all(|c| c.action == UniqueConstraintAction::Remove));
    }

    #[test]
    fn test_unverified_domain_removal_releases_nothing() {
        let aggregate = org_aggregate("org2", "instance1");
        let event = OrgEvent::DomainRemoved(DomainRemoved {
            domain: "org.example".to_string(),
            was_verified: false,
        });
        assert!(event.unique_constraints(&aggregate).is_empty());
    }

    #[test]
    fn test_payload_roundtrip_through_kind() {
        let event = OrgEvent::domain(OrgEvent::DomainVerified, "org.iam-domain");
        let payload = event.payload().unwrap();
        let decoded = OrgEvent::decode(OrgKind::DomainVerified, payload.as_ref()).unwrap();
        assert_eq!(decoded, event);
        assert_eq!(OrgEvent::decode(OrgKind::Deactivated, None).unwrap(), OrgEvent::Deactivated);
    }
}
