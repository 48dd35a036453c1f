// ============================================================================
// Identity Types - Core Data Types
// ============================================================================
//
// Data structures exchanged over the message bus. No dependencies on
// business logic, databases, or external services.
//
// Contents:
// - Message envelope (ids, correlation, payload)
// - Commands for users and groups
// - ErrorEvent published when a consumer fails
// - Worker status vocabulary for liveness reporting
//
// ============================================================================

pub mod commands;
pub mod envelope;
pub mod error_event;
pub mod status;

// Re-exports for convenience
pub use commands::*;
pub use envelope::MessageEnvelope;
pub use error_event::ErrorEvent;
pub use status::WorkerStatus;
