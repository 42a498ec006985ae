use std::fmt;

use serde::{Deserialize, Serialize};

use super::write_model::ReplayState;

// ============================================================================
// Aggregate Identity
// ============================================================================
//
// An AggregateRef names exactly one append-only event stream:
// (instance, aggregate type, aggregate id). The resource owner and schema
// version travel with it but do not take part in stream identity.
//
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AggregateType(String);

impl AggregateType {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AggregateType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AggregateType {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Schema version of an aggregate's events, e.g. "v1"
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Version(String);

impl Version {
    pub fn new(version: impl Into<String>) -> Self {
        Self(version.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AggregateRef {
    pub aggregate_type: AggregateType,
    pub id: String,
    pub resource_owner: String,
    pub instance_id: String,
    pub version: Version,
}

impl AggregateRef {
    pub fn new(
        aggregate_type: AggregateType,
        id: impl Into<String>,
        resource_owner: impl Into<String>,
        instance_id: impl Into<String>,
        version: Version,
    ) -> Self {
        Self {
            aggregate_type,
            id: id.into(),
            resource_owner: resource_owner.into(),
            instance_id: instance_id.into(),
            version,
        }
    }

    /// Reference to the stream a hydrated write model was built from
    pub fn from_replay(aggregate_type: AggregateType, version: Version, replay: &ReplayState) -> Self {
        Self::new(
            aggregate_type,
            replay.aggregate_id.clone(),
            replay.resource_owner.clone(),
            replay.instance_id.clone(),
            version,
        )
    }

    /// Identity of the stream, independent of owner and version
    pub fn stream_key(&self) -> StreamKey {
        StreamKey {
            instance_id: self.instance_id.clone(),
            aggregate_type: self.aggregate_type.clone(),
            aggregate_id: self.id.clone(),
        }
    }
}

impl fmt::Display for AggregateRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.aggregate_type, self.id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StreamKey {
    pub instance_id: String,
    pub aggregate_type: AggregateType,
    pub aggregate_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_key_ignores_owner_and_version() {
        let a = AggregateRef::new("org".into(), "org1", "org1", "inst1", Version::new("v1"));
        let b = AggregateRef::new("org".into(), "org1", "other", "inst1", Version::new("v2"));
        assert_eq!(a.stream_key(), b.stream_key());
        assert_ne!(a, b);
    }

    #[test]
    fn test_display_names_type_and_id() {
        let a = AggregateRef::new("user".into(), "u1", "org1", "inst1", Version::new("v2"));
        assert_eq!(a.to_string(), "user/u1");
    }
}
