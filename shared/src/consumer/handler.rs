use async_trait::async_trait;
use identity_error::AppResult;
use identity_types::Command;
use std::collections::BTreeMap;

/// Domain logic for one command type.
///
/// Implementations may catch domain signals (e.g. `NotFound` to fall back
/// from update to create). Whatever they return as `Err` goes down the
/// failure path of the consumer.
#[async_trait]
pub trait CommandHandler: Send + Sync + 'static {
    type Command: Command;

    /// Logical action reported in error events
    fn action_name(&self) -> &'static str {
        <Self::Command as Command>::MESSAGE_TYPE
    }

    /// Entity ids and similar context attached to error events
    fn failure_metadata(&self, _command: &Self::Command) -> BTreeMap<String, String> {
        BTreeMap::new()
    }

    async fn handle(&self, command: &Self::Command) -> AppResult<()>;
}
