// ============================================================================
// Event Sourcing Core - Generic Infrastructure Abstractions
// ============================================================================
//
// Identity, events, queries and the write model replay contract.
//
// Key Principles:
// - No domain-specific code (no Org, User, Instance, ...)
// - Domains plug in through DomainEvent and WriteModel
//
// ============================================================================

pub mod aggregate;
pub mod event;
pub mod query;
pub mod write_model;

// Re-export core types for convenience
pub use aggregate::{AggregateRef, AggregateType, StreamKey, Version};
pub use event::{
    decode_payload, encode_payload, Command, DomainEvent, Event, EventKind, EventType, Precondition,
    UniqueConstraint, UniqueConstraintAction,
};
pub use query::{QueryGroup, SearchQuery, SearchQueryBuilder};
pub use write_model::{append_and_reduce, filter_to_query_reducer, hydrate, ObjectDetails, ReplayState, WriteModel};
