// ============================================================================
// Org Domain - Organisations, Their Domains and Members
// ============================================================================
//
// This module contains ALL org-specific code:
// - Value objects (OrgState, DomainValidationType, default domain naming)
// - Events (OrgAdded, DomainVerified, MemberAdded, ...)
// - Write models (org lifecycle, single domain, single member)
// - Preparation steps (AddOrgStep, AddOrgDomainStep, ...)
// - Errors (OrgError enum)
// - Command Handler (OrgCommandHandler)
//
// ============================================================================

pub mod value_objects;
pub mod events;
pub mod write_model;
pub mod commands;
pub mod errors;
pub mod domain_verifier;
pub mod command_handler;

// Re-export for convenience
pub use value_objects::*;
pub use events::*;
pub use write_model::*;
pub use commands::*;
pub use errors::*;
pub use domain_verifier::*;
pub use command_handler::*;
