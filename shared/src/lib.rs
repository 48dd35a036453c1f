// ============================================================================
// Identity Service Shared - Message consumption reliability layer
// ============================================================================
//
// Everything a consumer process needs between the broker and the domain
// handlers:
//
// - resilience:    limiter / retry / timeout / circuit breaker pipeline
// - deduplication: processed-message ledger guarded by a process lock
// - consumer:      per-command consumption wrapper and error events
// - liveness:      STARTING / IDLE / WORKING reporting with heartbeat
// - endpoints:     queue bindings, redelivery policy and receive loops
// - transport:     broker abstraction and the Redis Streams implementation
// - handlers:      user and group directory command handlers
// - health:        /health and /metrics HTTP surface
//
// ============================================================================

pub mod consumer;
pub mod deduplication;
pub mod endpoints;
pub mod handlers;
pub mod health;
pub mod liveness;
pub mod resilience;
pub mod telemetry;
pub mod transport;

pub use consumer::{
    CommandHandler, ConsumeContext, ConsumeError, ConsumeOutcome, ErrorEventSink, MessageConsumer,
    TransportErrorEventSink,
};
pub use deduplication::{ClaimOutcome, DeduplicationStore, ProcessedMessageRepository};
pub use endpoints::{EndpointDefinition, EndpointRunner, RedeliveryPolicy};
pub use liveness::{LivenessNotifier, LivenessStore, WorkingGuard};
pub use resilience::{ResilienceError, ResiliencePipeline, TransientError};
pub use telemetry::{MetricsTelemetry, Telemetry, TelemetryProperties};
pub use transport::{Delivery, MessageTransport};
