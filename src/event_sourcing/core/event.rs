use std::fmt;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::context::Context;
use crate::error::Result;
use super::aggregate::AggregateRef;
use super::query::SearchQuery;
use super::write_model::WriteModel;

// ============================================================================
// Events and Commands
// ============================================================================
//
// A Command is an unpersisted write intent. Push turns it into an Event by
// assigning the next sequence of its stream, a global position and a
// creation time. Payloads travel as JSON; domain code decodes them back into
// its closed event enums via DomainEvent::decode.
//
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EventType(String);

impl EventType {
    pub fn new(event_type: impl Into<String>) -> Self {
        Self(event_type.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EventType {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

// ============================================================================
// Unique Constraints
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UniqueConstraintAction {
    Add,
    Remove,
    /// Drops every constraint of the pushing instance
    InstanceRemove,
}

/// Cross-aggregate uniqueness token, e.g. ("org_domain", "acme.example")
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UniqueConstraint {
    pub unique_type: String,
    pub unique_field: String,
    pub action: UniqueConstraintAction,
    /// Reported inside the AlreadyExists error on collision
    pub error_message: String,
}

impl UniqueConstraint {
    pub fn add(
        unique_type: impl Into<String>,
        unique_field: impl Into<String>,
        error_message: impl Into<String>,
    ) -> Self {
        Self {
            unique_type: unique_type.into(),
            unique_field: unique_field.into(),
            action: UniqueConstraintAction::Add,
            error_message: error_message.into(),
        }
    }

    pub fn remove(unique_type: impl Into<String>, unique_field: impl Into<String>) -> Self {
        Self {
            unique_type: unique_type.into(),
            unique_field: unique_field.into(),
            action: UniqueConstraintAction::Remove,
            error_message: String::new(),
        }
    }

    pub fn remove_instance() -> Self {
        Self {
            unique_type: String::new(),
            unique_field: String::new(),
            action: UniqueConstraintAction::InstanceRemove,
            error_message: String::new(),
        }
    }
}

// ============================================================================
// Domain Event Traits
// ============================================================================

/// Explicit discriminant of a closed domain event enum
pub trait EventKind: Copy + Eq + fmt::Debug + Sized + 'static {
    const ALL: &'static [Self];

    fn event_type(self) -> &'static str;

    fn parse(event_type: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|kind| kind.event_type() == event_type)
    }
}

/// Closed set of events of one category (org, user, instance, ...)
pub trait DomainEvent: Sized {
    type Kind: EventKind;

    fn kind(&self) -> Self::Kind;

    fn payload(&self) -> serde_json::Result<Option<Value>>;

    fn decode(kind: Self::Kind, payload: Option<&Value>) -> serde_json::Result<Self>;

    /// Uniqueness tokens claimed or released when this event is pushed to `aggregate`
    fn unique_constraints(&self, _aggregate: &AggregateRef) -> Vec<UniqueConstraint> {
        Vec::new()
    }

    fn event_type(&self) -> EventType {
        EventType::new(self.kind().event_type())
    }

    /// Every event type of the category, for write model queries
    fn event_types() -> Vec<EventType> {
        <Self::Kind as EventKind>::ALL
            .iter()
            .map(|kind| EventType::new(kind.event_type()))
            .collect()
    }
}

pub fn encode_payload<T: Serialize>(payload: &T) -> serde_json::Result<Option<Value>> {
    Ok(Some(serde_json::to_value(payload)?))
}

pub fn decode_payload<T: DeserializeOwned>(payload: Option<&Value>) -> serde_json::Result<T> {
    match payload {
        Some(value) => T::deserialize(value),
        None => T::deserialize(&Value::Null),
    }
}

// ============================================================================
// Command
// ============================================================================

/// Optimistic concurrency expectation of the write model a command was derived from
#[derive(Debug, Clone, PartialEq)]
pub struct Precondition {
    pub query: SearchQuery,
    pub observed_sequence: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    aggregate: AggregateRef,
    event_type: EventType,
    payload: Option<Value>,
    unique_constraints: Vec<UniqueConstraint>,
    creator: String,
    precondition: Option<Precondition>,
}

impl Command {
    pub fn new<E: DomainEvent>(ctx: &Context, aggregate: &AggregateRef, event: &E) -> Result<Self> {
        Ok(Self {
            aggregate: aggregate.clone(),
            event_type: event.event_type(),
            payload: event.payload()?,
            unique_constraints: event.unique_constraints(aggregate),
            creator: ctx.caller().user_id.clone(),
            precondition: None,
        })
    }

    /// Push fails if the aggregate's stream advanced past what `write_model` observed
    pub fn guarded_by<W: WriteModel + ?Sized>(mut self, write_model: &W) -> Self {
        self.precondition = Some(Precondition {
            query: write_model.query(),
            observed_sequence: write_model.replay().processed_sequence,
        });
        self
    }

    pub fn aggregate(&self) -> &AggregateRef {
        &self.aggregate
    }

    pub fn event_type(&self) -> &EventType {
        &self.event_type
    }

    pub fn payload(&self) -> Option<&Value> {
        self.payload.as_ref()
    }

    pub fn unique_constraints(&self) -> &[UniqueConstraint] {
        &self.unique_constraints
    }

    pub fn creator(&self) -> &str {
        &self.creator
    }

    pub fn precondition(&self) -> Option<&Precondition> {
        self.precondition.as_ref()
    }

    /// Decodes the command's payload the same way a stored event would be decoded
    pub fn decode<E: DomainEvent>(&self) -> Result<Option<E>> {
        decode_known(self.event_type.as_str(), self.payload.as_ref())
    }
}

// ============================================================================
// Event
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    aggregate: AggregateRef,
    event_type: EventType,
    sequence: u64,
    position: u64,
    created_at: DateTime<Utc>,
    creator: String,
    payload: Option<Value>,
    #[serde(skip)]
    unique_constraints: Vec<UniqueConstraint>,
}

impl Event {
    /// Rebuilds an event read back from storage
    pub fn from_storage(
        aggregate: AggregateRef,
        event_type: EventType,
        sequence: u64,
        position: u64,
        created_at: DateTime<Utc>,
        creator: String,
        payload: Option<Value>,
    ) -> Self {
        Self {
            aggregate,
            event_type,
            sequence,
            position,
            created_at,
            creator,
            payload,
            unique_constraints: Vec::new(),
        }
    }

    /// The event a command becomes once the store assigned its sequence, position and time
    pub fn from_command(command: &Command, sequence: u64, position: u64, created_at: DateTime<Utc>) -> Self {
        Self {
            aggregate: command.aggregate.clone(),
            event_type: command.event_type.clone(),
            sequence,
            position,
            created_at,
            creator: command.creator.clone(),
            payload: command.payload.clone(),
            unique_constraints: command.unique_constraints.clone(),
        }
    }

    pub fn aggregate(&self) -> &AggregateRef {
        &self.aggregate
    }

    pub fn event_type(&self) -> &EventType {
        &self.event_type
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn creator(&self) -> &str {
        &self.creator
    }

    pub fn payload(&self) -> Option<&Value> {
        self.payload.as_ref()
    }

    pub fn unique_constraints(&self) -> &[UniqueConstraint] {
        &self.unique_constraints
    }

    /// Decodes into the category's event enum. Types outside the category yield `None`.
    pub fn decode<E: DomainEvent>(&self) -> Result<Option<E>> {
        decode_known(self.event_type.as_str(), self.payload.as_ref())
    }
}

fn decode_known<E: DomainEvent>(event_type: &str, payload: Option<&Value>) -> Result<Option<E>> {
    match <E::Kind as EventKind>::parse(event_type) {
        Some(kind) => Ok(Some(E::decode(kind, payload)?)),
        None => Ok(None),
    }
}

// ============================================================================
// Tests
// ============================================================================
