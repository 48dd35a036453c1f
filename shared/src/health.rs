// ============================================================================
// Health and Metrics Routes
// ============================================================================
//
// Endpoints:
// - GET /health  - PostgreSQL and Redis reachability
// - GET /metrics - Prometheus metrics
//
// ============================================================================

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Router};
use identity_db::DbPool;
use identity_error::AppResult;
use identity_redis::RedisClient;
use std::sync::Arc;

pub struct HealthState {
    pub db_pool: DbPool,
    pub redis: RedisClient,
}

impl HealthState {
    /// `SELECT 1` on PostgreSQL and `PING` on Redis
    pub async fn check(&self) -> AppResult<()> {
        identity_db::ping(&self.db_pool).await?;
        let mut redis = self.redis.clone();
        redis.ping().await?;
        Ok(())
    }
}

pub fn router(state: Arc<HealthState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(metrics))
        .with_state(state)
}

/// GET /health
pub async fn health_check(State(state): State<Arc<HealthState>>) -> impl IntoResponse {
    match state.check().await {
        Ok(()) => (StatusCode::OK, "OK"),
        Err(e) => {
            tracing::error!(error = %e, "Health check failed");
            (StatusCode::SERVICE_UNAVAILABLE, "Service Unavailable")
        }
    }
}

/// GET /metrics
pub async fn metrics() -> impl IntoResponse {
    match identity_metrics::gather_metrics() {
        Ok(metrics_data) => (
            StatusCode::OK,
            [("Content-Type", "text/plain; version=0.0.4")],
            metrics_data,
        ),
        Err(e) => {
            tracing::error!(error = %e, "Failed to gather metrics");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [("Content-Type", "text/plain")],
                "Internal Server Error".to_string(),
            )
        }
    }
}
