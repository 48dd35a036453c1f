// ============================================================================
// Liveness / Status Notifier
// ============================================================================
//
// Publishes this process's status to a shared store so that fleet monitors
// can tell busy, idle and dead consumers apart:
//
// - process key  {application_identifier}{pid}@{machine}
//     MACHINE, STATUS (STARTING/IDLE/WORKING), STATUS_TIME, LASTALIVE, owner
//     TTL refreshed on every write; expiry means the process died
// - message key  {application_identifier}working:{message_id}
//     STATUS=WORKING, STATUS_TIME, owner; deleted when processing ends
//
// Timestamps come from the store's clock, not the local one.
//
// ============================================================================

mod notifier;
mod store;

pub use notifier::{LivenessNotifier, WorkingGuard};
pub use store::{
    LivenessStore, RedisLivenessStore, FIELD_LAST_ALIVE, FIELD_MACHINE, FIELD_STATUS,
    FIELD_STATUS_TIME,
};
