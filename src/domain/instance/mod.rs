// ============================================================================
// Instance Domain - Tenant-Wide Settings
// ============================================================================

pub mod events;
pub mod write_model;
pub mod errors;
pub mod command_handler;

// Re-export for convenience
pub use events::*;
pub use write_model::*;
pub use errors::*;
pub use command_handler::*;
