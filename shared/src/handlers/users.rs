use super::directory::DirectoryRepository;
use crate::consumer::CommandHandler;
use async_trait::async_trait;
use identity_db::UserRecord;
use identity_error::AppResult;
use identity_types::{CreateOrUpdateUser, DeleteUser};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;

fn user_metadata(user_id: &str) -> BTreeMap<String, String> {
    BTreeMap::from([("UserId".to_string(), user_id.to_string())])
}

pub struct CreateOrUpdateUserHandler {
    repository: Arc<dyn DirectoryRepository>,
}

impl CreateOrUpdateUserHandler {
    pub fn new(repository: Arc<dyn DirectoryRepository>) -> Self {
        Self { repository }
    }
}

#[async_trait]
impl CommandHandler for CreateOrUpdateUserHandler {
    type Command = CreateOrUpdateUser;

    fn failure_metadata(&self, command: &CreateOrUpdateUser) -> BTreeMap<String, String> {
        let mut metadata = user_metadata(&command.user_id);
        metadata.insert("Username".to_string(), command.username.clone());
        metadata
    }

    async fn handle(&self, command: &CreateOrUpdateUser) -> AppResult<()> {
        let record = UserRecord {
            id: command.user_id.clone(),
            username: command.username.clone(),
            email: command.email.clone(),
            display_name: command.display_name.clone(),
            enabled: command.enabled,
        };

        match self.repository.update_user(&record).await {
            Ok(()) => {
                info!(user_id = %record.id, "User updated");
                Ok(())
            }
            Err(e) if e.is_not_found() => {
                self.repository.create_user(&record).await?;
                info!(user_id = %record.id, "User created");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}

pub struct DeleteUserHandler {
    repository: Arc<dyn DirectoryRepository>,
}

impl DeleteUserHandler {
    pub fn new(repository: Arc<dyn DirectoryRepository>) -> Self {
        Self { repository }
    }
}

#[async_trait]
impl CommandHandler for DeleteUserHandler {
    type Command = DeleteUser;

    fn failure_metadata(&self, command: &DeleteUser) -> BTreeMap<String, String> {
        user_metadata(&command.user_id)
    }

    async fn handle(&self, command: &DeleteUser) -> AppResult<()> {
        match self.repository.delete_user(&command.user_id).await {
            Ok(()) => {
                info!(user_id = %command.user_id, "User deleted");
                Ok(())
            }
            Err(e) if e.is_not_found() => {
                info!(user_id = %command.user_id, "User already deleted");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}
