// ============================================================================
// Message Consumption
// ============================================================================
//
// Received -> DedupCheck -> AlreadyConsumed: skip
//                        -> New: Recording -> Handling -> Success: telemetry
//                                                      -> Failure: error event
//                                                         -> telemetry -> Err
//
// The only swallowed conditions are "already consumed" and a failed publish
// of the error event. Everything else reaches the endpoint runner.
//
// ============================================================================

mod context;
mod error_events;
mod handler;
mod wrapper;

pub use context::ConsumeContext;
pub use error_events::{ErrorEventSink, TransportErrorEventSink, ERROR_EVENT_MESSAGE_TYPE};
pub use handler::CommandHandler;
pub use wrapper::{ConsumeError, ConsumeOutcome, MessageConsumer};
