//! Directory command handlers.
//!
//! Create-or-update commands try an update first and fall back to create
//! when the entity does not exist. Deleting a missing entity succeeds.

mod directory;
mod groups;
mod health_check;
mod users;

pub use directory::{DirectoryRepository, PgDirectoryRepository};
pub use groups::{CreateOrUpdateGroupHandler, DeleteGroupHandler};
pub use health_check::HealthCheckHandler;
pub use users::{CreateOrUpdateUserHandler, DeleteUserHandler};
