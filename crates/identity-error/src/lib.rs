use thiserror::Error;

pub type AppResult<T> = Result<T, AppError>;

/// PostgreSQL SQLSTATE codes worth retrying
#[cfg(feature = "database")]
const TRANSIENT_SQLSTATES: &[&str] = &[
    "40001", // serialization_failure
    "40P01", // deadlock_detected
    "53300", // too_many_connections
    "57P01", // admin_shutdown
];

/// Application error type
///
/// Covers every failure a consumer can hit: infrastructure (store, bus),
/// domain signals raised by command handlers, and pipeline conditions.
#[derive(Error, Debug)]
pub enum AppError {
    // ===== Storage Errors =====
    #[cfg(feature = "redis")]
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[cfg(feature = "database")]
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    // ===== Serialization Errors =====
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // ===== Domain Errors =====
    #[error("{entity} with {key} '{value}' was not found")]
    NotFound {
        entity: String,
        key: String,
        value: String,
    },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Resource conflict: {0}")]
    Conflict(String),

    // ===== Pipeline Errors =====
    #[error("Operation timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("Service unavailable: {0}")]
    Unavailable(String),

    #[error("Operation is not valid in the current state: {0}")]
    InvalidState(String),

    // ===== Message Bus Errors =====
    #[error("Message transport error: {0}")]
    Transport(String),

    // ===== Configuration Errors =====
    #[error("Configuration error: {0}")]
    Config(String),

    // ===== Internal Errors =====
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Unknown error: {0}")]
    Unknown(#[from] anyhow::Error),
}

impl AppError {
    /// Get error code for programmatic error handling
    pub fn error_code(&self) -> &'static str {
        match self {
            #[cfg(feature = "redis")]
            AppError::Redis(_) => "REDIS_ERROR",
            #[cfg(feature = "database")]
            AppError::Database(_) => "DATABASE_ERROR",
            AppError::Json(_) => "JSON_ERROR",
            AppError::Io(_) => "IO_ERROR",
            AppError::NotFound { .. } => "NOT_FOUND",
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::Conflict(_) => "CONFLICT",
            AppError::Timeout(_) => "TIMEOUT",
            AppError::Unavailable(_) => "UNAVAILABLE",
            AppError::InvalidState(_) => "INVALID_STATE",
            AppError::Transport(_) => "TRANSPORT_ERROR",
            AppError::Config(_) => "CONFIG_ERROR",
            AppError::Internal(_) => "INTERNAL_ERROR",
            AppError::Unknown(_) => "UNKNOWN_ERROR",
        }
    }

    /// Variant name without payload
    pub fn variant_name(&self) -> &'static str {
        match self {
            #[cfg(feature = "redis")]
            AppError::Redis(_) => "Redis",
            #[cfg(feature = "database")]
            AppError::Database(_) => "Database",
            AppError::Json(_) => "Json",
            AppError::Io(_) => "Io",
            AppError::NotFound { .. } => "NotFound",
            AppError::Validation(_) => "Validation",
            AppError::Conflict(_) => "Conflict",
            AppError::Timeout(_) => "Timeout",
            AppError::Unavailable(_) => "Unavailable",
            AppError::InvalidState(_) => "InvalidState",
            AppError::Transport(_) => "Transport",
            AppError::Config(_) => "Config",
            AppError::Internal(_) => "Internal",
            AppError::Unknown(_) => "Unknown",
        }
    }

    /// Fully qualified type name, e.g. `identity_error::AppError::NotFound`.
    ///
    /// Reported as the exception type of published error events.
    pub fn type_name(&self) -> String {
        format!("{}::{}", std::any::type_name::<AppError>(), self.variant_name())
    }

    /// Error message followed by its source chain, one cause per line
    pub fn chain(&self) -> String {
        let mut rendered = self.to_string();
        let mut source = std::error::Error::source(self);
        while let Some(cause) = source {
            rendered.push_str("\n  caused by: ");
            rendered.push_str(&cause.to_string());
            source = cause.source();
        }
        rendered
    }

    /// Whether a retry of the same operation may succeed
    pub fn is_transient(&self) -> bool {
        match self {
            #[cfg(feature = "redis")]
            AppError::Redis(err) => {
                err.is_io_error()
                    || err.is_timeout()
                    || err.is_connection_dropped()
                    || err.is_connection_refusal()
                    || matches!(
                        err.kind(),
                        redis::ErrorKind::BusyLoadingError | redis::ErrorKind::TryAgain
                    )
            }
            #[cfg(feature = "database")]
            AppError::Database(err) => match err {
                sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut => true,
                sqlx::Error::Database(db_err) => db_err
                    .code()
                    .map(|code| TRANSIENT_SQLSTATES.contains(&code.as_ref()))
                    .unwrap_or(false),
                _ => false,
            },
            AppError::Io(_) => true,
            AppError::Timeout(_) | AppError::InvalidState(_) => true,
            _ => false,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, AppError::NotFound { .. })
    }

    /// Whether this is a duplicate-key / unique-constraint violation
    pub fn is_conflict(&self) -> bool {
        match self {
            AppError::Conflict(_) => true,
            #[cfg(feature = "database")]
            AppError::Database(sqlx::Error::Database(db_err)) => db_err.is_unique_violation(),
            _ => false,
        }
    }

    /// Log this error with appropriate level and context
    pub fn log(&self) {
        let code = self.error_code();

        if self.is_not_found() || matches!(self, AppError::Validation(_)) {
            tracing::debug!(error = %self, error_code = %code, "Domain error occurred");
        } else if self.is_transient() {
            tracing::warn!(error = %self, error_code = %code, "Transient error occurred");
        } else {
            tracing::error!(error = %self, error_code = %code, "Error occurred");
        }
    }
}

// ============================================================================
// Helper functions for creating common errors
// ============================================================================

impl AppError {
    /// Create a not-found error, e.g. `not_found("user", "id", "u1")`
    pub fn not_found(
        entity: impl Into<String>,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        AppError::NotFound {
            entity: entity.into(),
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        AppError::Validation(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        AppError::Conflict(msg.into())
    }

    pub fn unavailable(msg: impl Into<String>) -> Self {
        AppError::Unavailable(msg.into())
    }

    pub fn invalid_state(msg: impl Into<String>) -> Self {
        AppError::InvalidState(msg.into())
    }

    pub fn transport(msg: impl Into<String>) -> Self {
        AppError::Transport(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        AppError::Config(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        AppError::Internal(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_not_found_message_and_type() {
        let err = AppError::not_found("user", "id", "u1");
        assert_eq!(err.to_string(), "user with id 'u1' was not found");
        assert!(err.is_not_found());
        assert!(err.type_name().ends_with("NotFound"));
        assert_eq!(err.error_code(), "NOT_FOUND");
    }

    #[test]
    fn test_transient_classification() {
        assert!(AppError::Timeout(Duration::from_secs(1)).is_transient());
        assert!(AppError::invalid_state("connection not open").is_transient());
        assert!(AppError::Io(std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset"))
            .is_transient());

        assert!(!AppError::validation("bad email").is_transient());
        assert!(!AppError::not_found("group", "id", "g1").is_transient());
        assert!(!AppError::unavailable("circuit open").is_transient());
    }

    #[cfg(feature = "redis")]
    #[test]
    fn test_redis_io_error_is_transient() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        let err = AppError::Redis(redis::RedisError::from(io));
        assert!(err.is_transient());

        let err = AppError::Redis(redis::RedisError::from((
            redis::ErrorKind::TypeError,
            "wrong type",
        )));
        assert!(!err.is_transient());
    }

    #[cfg(feature = "database")]
    #[test]
    fn test_pool_timeout_is_transient() {
        assert!(AppError::Database(sqlx::Error::PoolTimedOut).is_transient());
        assert!(!AppError::Database(sqlx::Error::RowNotFound).is_transient());
    }

    #[test]
    fn test_chain_includes_sources() {
        let err = AppError::Unknown(
            anyhow::anyhow!("root cause").context("while updating user"),
        );
        let chain = err.chain();
        assert!(chain.starts_with("Unknown error: while updating user"));
    }

    #[test]
    fn test_conflict_detection() {
        assert!(AppError::conflict("duplicate message id").is_conflict());
        assert!(!AppError::internal("boom").is_conflict());
    }
}
