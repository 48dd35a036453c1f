// ============================================================================
// Logging Configuration
// ============================================================================

use std::str::FromStr;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pretty" | "text" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("Unknown log format: {}", other)),
        }
    }
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    /// EnvFilter directives, e.g. "info,identity_service_shared=debug"
    pub rust_log: String,
    pub format: LogFormat,
}

impl LoggingConfig {
    pub(crate) fn from_env() -> anyhow::Result<Self> {
        let format = match std::env::var("LOG_FORMAT") {
            Ok(value) => value.parse().map_err(anyhow::Error::msg)?,
            Err(_) => LogFormat::default(),
        };

        Ok(Self {
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            format,
        })
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            rust_log: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}
