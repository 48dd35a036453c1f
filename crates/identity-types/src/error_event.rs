use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Structured failure record published when a consumer's handler fails.
///
/// Field names are PascalCase on the wire, matching what downstream
/// error dashboards already index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ErrorEvent {
    pub consumer_name: String,
    /// Logical action the handler was performing, e.g. "CreateOrUpdateUser"
    pub action: String,
    pub message_type: String,
    pub message_id: String,
    pub correlation_id: Option<String>,
    pub conversation_id: Option<String>,
    pub exception_type: String,
    pub exception_message: String,
    pub stack_trace: String,
    pub timestamp: DateTime<Utc>,
    /// Free-form context such as the entity ids involved
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}
