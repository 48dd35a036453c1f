use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// A message instructing a create/update/delete action.
///
/// `MESSAGE_TYPE` names the command on the wire; the queue it is consumed
/// from defaults to the same name unless `QUEUE_NAME` overrides it.
pub trait Command: Serialize + DeserializeOwned + Send + Sync + 'static {
    const MESSAGE_TYPE: &'static str;
    const QUEUE_NAME: Option<&'static str> = None;

    fn queue_name() -> &'static str {
        Self::QUEUE_NAME.unwrap_or(Self::MESSAGE_TYPE)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrUpdateUser {
    pub user_id: String,
    pub username: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteUser {
    pub user_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrUpdateGroup {
    pub group_id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteGroup {
    pub group_id: String,
}

/// Probe sent by monitors to verify a consumer pool end to end
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthCheck {
    #[serde(default)]
    pub requested_by: Option<String>,
}

fn default_enabled() -> bool {
    true
}

impl Command for CreateOrUpdateUser {
    const MESSAGE_TYPE: &'static str = "CreateOrUpdateUser";
}

impl Command for DeleteUser {
    const MESSAGE_TYPE: &'static str = "DeleteUser";
}

impl Command for CreateOrUpdateGroup {
    const MESSAGE_TYPE: &'static str = "CreateOrUpdateGroup";
}

impl Command for DeleteGroup {
    const MESSAGE_TYPE: &'static str = "DeleteGroup";
}

impl Command for HealthCheck {
    const MESSAGE_TYPE: &'static str = "HealthCheck";
    const QUEUE_NAME: Option<&'static str> = Some("HealthCheck.Queue");
}
