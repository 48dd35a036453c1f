use super::directory::DirectoryRepository;
use crate::consumer::CommandHandler;
use async_trait::async_trait;
use identity_db::GroupRecord;
use identity_error::AppResult;
use identity_types::{CreateOrUpdateGroup, DeleteGroup};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;

fn group_metadata(group_id: &str) -> BTreeMap<String, String> {
    BTreeMap::from([("GroupId".to_string(), group_id.to_string())])
}

pub struct CreateOrUpdateGroupHandler {
    repository: Arc<dyn DirectoryRepository>,
}

impl CreateOrUpdateGroupHandler {
    pub fn new(repository: Arc<dyn DirectoryRepository>) -> Self {
        Self { repository }
    }
}

#[async_trait]
impl CommandHandler for CreateOrUpdateGroupHandler {
    type Command = CreateOrUpdateGroup;

    fn failure_metadata(&self, command: &CreateOrUpdateGroup) -> BTreeMap<String, String> {
        group_metadata(&command.group_id)
    }

    async fn handle(&self, command: &CreateOrUpdateGroup) -> AppResult<()> {
        let record = GroupRecord {
            id: command.group_id.clone(),
            name: command.name.clone(),
            description: command.description.clone(),
        };

        match self.repository.update_group(&record).await {
            Ok(()) => {
                info!(group_id = %record.id, "Group updated");
                Ok(())
            }
            Err(e) if e.is_not_found() => {
                self.repository.create_group(&record).await?;
                info!(group_id = %record.id, "Group created");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}

pub struct DeleteGroupHandler {
    repository: Arc<dyn DirectoryRepository>,
}

impl DeleteGroupHandler {
    pub fn new(repository: Arc<dyn DirectoryRepository>) -> Self {
        Self { repository }
    }
}

#[async_trait]
impl CommandHandler for DeleteGroupHandler {
    type Command = DeleteGroup;

    fn failure_metadata(&self, command: &DeleteGroup) -> BTreeMap<String, String> {
        group_metadata(&command.group_id)
    }

    async fn handle(&self, command: &DeleteGroup) -> AppResult<()> {
        match self.repository.delete_group(&command.group_id).await {
            Ok(()) => {
                info!(group_id = %command.group_id, "Group deleted");
                Ok(())
            }
            Err(e) if e.is_not_found() => {
                info!(group_id = %command.group_id, "Group already deleted");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}
