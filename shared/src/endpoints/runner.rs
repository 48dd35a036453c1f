// ============================================================================
// Endpoint Runner
// ============================================================================
//
// Receive loop for one endpoint. Per delivery:
//
// 1. Decode the envelope (undecodable -> dead-letter, ack)
// 2. Mark WORKING (scoped guard)
// 3. consume; on failure redeliver per the endpoint's policy
// 4. Success -> ack. Exhausted -> dead-letter + ack
// 5. Release the guard, report IDLE
//
// IDLE is only reported once no endpoint of the process holds a message.
// Liveness failures are logged and never block processing. An unacked
// delivery (process killed mid-way) is reclaimed by the transport after
// its visibility timeout.
//
// ============================================================================

use super::EndpointDefinition;
use crate::consumer::{CommandHandler, ConsumeContext, MessageConsumer};
use crate::liveness::LivenessNotifier;
use crate::transport::{Delivery, MessageTransport};
use identity_error::{AppError, AppResult};
use identity_metrics::MESSAGES_DEAD_LETTERED_TOTAL;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Pause after a transport error before receiving again
const RECEIVE_ERROR_BACKOFF: Duration = Duration::from_secs(1);

/// Type-erased endpoint, so runners of different commands can be started together
pub trait Endpoint: Send + Sync {
    fn definition(&self) -> &EndpointDefinition;

    /// Spawn the receive loops; they exit once `shutdown` turns true
    fn spawn(self: Arc<Self>, shutdown: watch::Receiver<bool>) -> Vec<JoinHandle<()>>;
}

pub struct EndpointRunner<H: CommandHandler> {
    definition: EndpointDefinition,
    consumer: Arc<MessageConsumer<H>>,
    transport: Arc<dyn MessageTransport>,
    notifier: Arc<LivenessNotifier>,
    receive_wait: Duration,
}

impl<H: CommandHandler> EndpointRunner<H> {
    pub fn new(
        definition: EndpointDefinition,
        consumer: Arc<MessageConsumer<H>>,
        transport: Arc<dyn MessageTransport>,
        notifier: Arc<LivenessNotifier>,
        receive_wait: Duration,
    ) -> Self {
        Self {
            definition,
            consumer,
            transport,
            notifier,
            receive_wait,
        }
    }

    /// Run `concurrency_limit` receive loops until shutdown
    pub async fn run(self: Arc<Self>, shutdown: watch::Receiver<bool>) {
        let handles = Endpoint::spawn(self.clone(), shutdown);
        for handle in handles {
            if let Err(e) = handle.await {
                error!(queue = %self.definition.queue, error = %e, "Receive loop panicked");
            }
        }
    }

    async fn receive_loop(&self, worker: usize, shutdown: watch::Receiver<bool>) {
        info!(
            queue = %self.definition.queue,
            message_type = self.definition.message_type,
            worker = worker,
            "Endpoint receive loop started"
        );

        // Shutdown is checked between receives only. Cancelling a receive
        // could drop an entry the transport already assigned to this
        // consumer, so shutdown waits at most one `receive_wait`.
        while !*shutdown.borrow() {
            let received = self
                .transport
                .receive(&self.definition.queue, self.receive_wait)
                .await;

            match received {
                Ok(Some(delivery)) => self.process(delivery).await,
                Ok(None) => {}
                Err(e) => {
                    error!(queue = %self.definition.queue, error = %e, "Receive failed");
                    tokio::time::sleep(RECEIVE_ERROR_BACKOFF).await;
                }
            }
        }

        info!(queue = %self.definition.queue, worker = worker, "Endpoint receive loop stopped");
    }

    /// Handle one delivery end to end; never fails
    pub async fn process(&self, delivery: Delivery) {
        let ctx = match delivery
            .envelope()
            .and_then(|envelope| ConsumeContext::<H::Command>::from_envelope(&envelope))
        {
            Ok(ctx) => ctx,
            Err(e) => {
                warn!(
                    queue = %delivery.queue,
                    delivery_tag = %delivery.delivery_tag,
                    error = %e,
                    "Undecodable message, dead-lettering"
                );
                self.dead_letter(&delivery, &format!("Undecodable message: {}", e))
                    .await;
                return;
            }
        };

        debug!(
            queue = %delivery.queue,
            message_id = %ctx.message_id,
            delivery_count = delivery.delivery_count,
            "Processing delivery"
        );

        let guard = match self.notifier.set_working(&ctx.message_id).await {
            Ok(guard) => Some(guard),
            Err(e) => {
                warn!(message_id = %ctx.message_id, error = %e, "Failed to report WORKING");
                None
            }
        };

        match self.consume_with_redelivery(&ctx).await {
            Ok(()) => {
                if let Err(e) = self.transport.ack(&delivery).await {
                    error!(message_id = %ctx.message_id, error = %e, "Failed to ack delivery");
                }
            }
            Err(e) => {
                error!(
                    queue = %delivery.queue,
                    message_id = %ctx.message_id,
                    retry_limit = self.definition.redelivery.retry_limit,
                    error = %e,
                    "Redelivery attempts exhausted, dead-lettering"
                );
                self.dead_letter(&delivery, &e.to_string()).await;
            }
        }

        if let Some(guard) = guard {
            if let Err(e) = guard.release().await {
                warn!(message_id = %ctx.message_id, error = %e, "Failed to clear WORKING marker");
            }
        }
        if let Err(e) = self.notifier.set_idle().await {
            warn!(error = %e, "Failed to report IDLE");
        }
    }

    /// consume, then redeliver on failure until the policy is exhausted.
    ///
    /// While the message id is not yet claimed (dedup failed) the retry goes
    /// through `consume` again; once claimed it goes through `redeliver`.
    async fn consume_with_redelivery(&self, ctx: &ConsumeContext<H::Command>) -> AppResult<()> {
        let policy = &self.definition.redelivery;
        let mut claimed = false;
        let mut attempt = 0;

        loop {
            let result = if claimed {
                self.consumer.redeliver(ctx).await
            } else {
                match self.consumer.consume(ctx).await {
                    Ok(_) => Ok(()),
                    Err(e) => {
                        claimed = e.is_claimed();
                        Err(AppError::from(e))
                    }
                }
            };

            let err = match result {
                Ok(()) => return Ok(()),
                Err(err) => err,
            };
            if attempt >= policy.retry_limit {
                return Err(err);
            }

            let delay = policy.delay_for(attempt);
            attempt += 1;
            warn!(
                message_id = %ctx.message_id,
                attempt = attempt,
                retry_limit = policy.retry_limit,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "Consumption failed, scheduling redelivery"
            );
            // Not interrupted by shutdown: the id may already be claimed,
            // and abandoning the delivery now would skip it for good.
            tokio::time::sleep(delay).await;
        }
    }

    async fn dead_letter(&self, delivery: &Delivery, reason: &str) {
        match self.transport.dead_letter(delivery, reason).await {
            Ok(()) => {
                MESSAGES_DEAD_LETTERED_TOTAL
                    .with_label_values(&[delivery.queue.as_str()])
                    .inc();
            }
            Err(e) => error!(
                queue = %delivery.queue,
                delivery_tag = %delivery.delivery_tag,
                error = %e,
                "Failed to dead-letter delivery"
            ),
        }
    }
}

impl<H: CommandHandler> Endpoint for EndpointRunner<H> {
    fn definition(&self) -> &EndpointDefinition {
        &self.definition
    }

    fn spawn(self: Arc<Self>, shutdown: watch::Receiver<bool>) -> Vec<JoinHandle<()>> {
        (0..self.definition.concurrency_limit.max(1))
            .map(|worker| {
                let runner = self.clone();
                let shutdown = shutdown.clone();
                tokio::spawn(async move { runner.receive_loop(worker, shutdown).await })
            })
            .collect()
    }
}
