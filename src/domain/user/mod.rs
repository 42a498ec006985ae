// ============================================================================
// User Domain - Human Users
// ============================================================================
//
// Users belong to an org (their resource owner); usernames are unique per org.
//
// ============================================================================

pub mod value_objects;
pub mod events;
pub mod write_model;
pub mod commands;
pub mod errors;
pub mod command_handler;

// Re-export for convenience
pub use value_objects::*;
pub use events::*;
pub use write_model::*;
pub use commands::*;
pub use errors::*;
pub use command_handler::*;
