// ============================================================================
// Endpoints
// ============================================================================
//
// Declarative binding of each command type to a queue:
//
// - queue name: the command's message type unless it overrides it
// - concurrency limit: always 1 per endpoint and process, which keeps
//   messages of one type strictly ordered and keeps two deliveries of the
//   same id apart across instances
// - redelivery: exponential backoff bounded by retry_limit
//
// ============================================================================

mod runner;

pub use runner::{Endpoint, EndpointRunner};

use identity_config::{BusConfig, RedeliveryConfig};
use identity_types::{
    Command, CreateOrUpdateGroup, CreateOrUpdateUser, DeleteGroup, DeleteUser, HealthCheck,
};
use std::time::Duration;

/// Messages of one type processed at a time per consumer process
pub const ENDPOINT_CONCURRENCY_LIMIT: usize = 1;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedeliveryPolicy {
    pub retry_limit: u32,
    pub min_interval: Duration,
    pub max_interval: Duration,
    pub interval_delta: Duration,
}

impl RedeliveryPolicy {
    /// Delay before redelivery `attempt` (0-based):
    /// min(min_interval + interval_delta * (2^attempt - 1), max_interval)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = (1u32 << attempt.min(20)) - 1;
        let delay = self
            .min_interval
            .saturating_add(self.interval_delta.saturating_mul(factor));
        delay.min(self.max_interval)
    }

    /// Delays for every allowed redelivery, in order
    pub fn schedule(&self) -> Vec<Duration> {
        (0..self.retry_limit).map(|n| self.delay_for(n)).collect()
    }
}

impl From<&RedeliveryConfig> for RedeliveryPolicy {
    fn from(config: &RedeliveryConfig) -> Self {
        Self {
            retry_limit: config.retry_limit,
            min_interval: config.min_interval,
            max_interval: config.max_interval,
            interval_delta: config.interval_delta,
        }
    }
}

impl Default for RedeliveryPolicy {
    fn default() -> Self {
        Self::from(&RedeliveryConfig::default())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointDefinition {
    pub message_type: &'static str,
    pub queue: String,
    pub concurrency_limit: usize,
    pub redelivery: RedeliveryPolicy,
}

impl EndpointDefinition {
    pub fn for_command<C: Command>(bus: &BusConfig) -> Self {
        Self {
            message_type: C::MESSAGE_TYPE,
            queue: C::queue_name().to_string(),
            concurrency_limit: ENDPOINT_CONCURRENCY_LIMIT,
            redelivery: RedeliveryPolicy::from(&bus.redelivery),
        }
    }
}

/// Every command endpoint this service consumes
pub fn default_endpoints(bus: &BusConfig) -> Vec<EndpointDefinition> {
    vec![
        EndpointDefinition::for_command::<CreateOrUpdateUser>(bus),
        EndpointDefinition::for_command::<DeleteUser>(bus),
        EndpointDefinition::for_command::<CreateOrUpdateGroup>(bus),
        EndpointDefinition::for_command::<DeleteGroup>(bus),
        EndpointDefinition::for_command::<HealthCheck>(bus),
    ]
}
