use serde::{Deserialize, Serialize};

/// Operational state a consumer process reports to the shared store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkerStatus {
    Starting,
    Idle,
    Working,
}

impl WorkerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkerStatus::Starting => "STARTING",
            WorkerStatus::Idle => "IDLE",
            WorkerStatus::Working => "WORKING",
        }
    }
}

impl std::str::FromStr for WorkerStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "STARTING" => Ok(WorkerStatus::Starting),
            "IDLE" => Ok(WorkerStatus::Idle),
            "WORKING" => Ok(WorkerStatus::Working),
            _ => Err(format!("Unknown worker status: {}", s)),
        }
    }
}

impl std::fmt::Display for WorkerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
