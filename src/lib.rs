// ============================================================================
// IAM Command Engine - Event-Sourced Write Side
// ============================================================================
//
// Commands are validated against replayed history and appended atomically
// to per-aggregate event streams:
//
//   Preparation (validate → build) → Write Models → Push → Append & Reduce
//
// Modules:
// - event_sourcing: generic engine (events, queries, write models, stores)
// - domain:         org, user and instance commands built on the engine
// - context:        tenant, caller, cancellation and deadline of a request
// - metrics:        Prometheus instrumentation of the stores
//
// ============================================================================

pub mod config;
pub mod context;
pub mod domain;
pub mod error;
pub mod event_sourcing;
pub mod id;
pub mod metrics;
pub mod utils;

pub use context::{Caller, Context, InstanceInfo};
pub use error::{Error, ErrorKind, Result};
