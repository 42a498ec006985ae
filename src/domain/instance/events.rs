use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::event_sourcing::core::{
    decode_payload, encode_payload, AggregateRef, AggregateType, DomainEvent, EventKind, UniqueConstraint, Version,
};

// ============================================================================
// Instance Events
// ============================================================================

pub const INSTANCE_AGGREGATE_TYPE: &str = "instance";
pub const INSTANCE_AGGREGATE_VERSION: &str = "v2";

/// The instance stream is owned by the instance itself
pub fn instance_aggregate(instance_id: &str) -> AggregateRef {
    AggregateRef::new(
        AggregateType::new(INSTANCE_AGGREGATE_TYPE),
        instance_id,
        instance_id,
        instance_id,
        Version::new(INSTANCE_AGGREGATE_VERSION),
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstanceKind {
    TrustedDomainAdded,
    TrustedDomainRemoved,
    Removed,
}

impl EventKind for InstanceKind {
    const ALL: &'static [Self] = &[
        InstanceKind::TrustedDomainAdded,
        InstanceKind::TrustedDomainRemoved,
        InstanceKind::Removed,
    ];

    fn event_type(self) -> &'static str {
        match self {
            InstanceKind::TrustedDomainAdded => "instance.trusted_domain.added",
            InstanceKind::TrustedDomainRemoved => "instance.trusted_domain.removed",
            InstanceKind::Removed => "instance.removed",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum InstanceEvent {
    TrustedDomainAdded(TrustedDomain),
    TrustedDomainRemoved(TrustedDomain),
    /// Releases every unique constraint held in the instance
    Removed,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct TrustedDomain {
    pub domain: String,
}

impl DomainEvent for InstanceEvent {
    type Kind = InstanceKind;

    fn kind(&self) -> InstanceKind {
        match self {
            InstanceEvent::TrustedDomainAdded(_) => InstanceKind::TrustedDomainAdded,
            InstanceEvent::TrustedDomainRemoved(_) => InstanceKind::TrustedDomainRemoved,
            InstanceEvent::Removed => InstanceKind::Removed,
        }
    }

    fn payload(&self) -> serde_json::Result<Option<Value>> {
        match self {
            InstanceEvent::TrustedDomainAdded(e) | InstanceEvent::TrustedDomainRemoved(e) => encode_payload(e),
            InstanceEvent::Removed => Ok(None),
        }
    }

    fn decode(kind: InstanceKind, payload: Option<&Value>) -> serde_json::Result<Self> {
        Ok(match kind {
            InstanceKind::TrustedDomainAdded => InstanceEvent::TrustedDomainAdded(decode_payload(payload)?),
            InstanceKind::TrustedDomainRemoved => InstanceEvent::TrustedDomainRemoved(decode_payload(payload)?),
            InstanceKind::Removed => InstanceEvent::Removed,
        })
    }

    fn unique_constraints(&self, _aggregate: &AggregateRef) -> Vec<UniqueConstraint> {
        match self {
            InstanceEvent::Removed => vec![UniqueConstraint::remove_instance()],
            _ => Vec::new(),
        }
    }
}
