// ============================================================================
// Event Sourcing Infrastructure
// ============================================================================
//
// Generic, reusable event sourcing infrastructure.
// Domain-specific code is in src/domain/
//
// ============================================================================

// Core abstractions (GENERIC - works with any aggregate)
pub mod core;
pub mod preparation;
pub mod store;

// Re-export core infrastructure
pub use self::core::*;
pub use self::preparation::*;
pub use self::store::*;
