use crate::consumer::CommandHandler;
use async_trait::async_trait;
use identity_error::AppResult;
use identity_types::HealthCheck;
use tracing::info;

/// Answers monitor probes; proves the queue is being consumed
#[derive(Debug, Default)]
pub struct HealthCheckHandler;

#[async_trait]
impl CommandHandler for HealthCheckHandler {
    type Command = HealthCheck;

    async fn handle(&self, command: &HealthCheck) -> AppResult<()> {
        info!(
            requested_by = command.requested_by.as_deref().unwrap_or("unknown"),
            "Health check received"
        );
        Ok(())
    }
}
