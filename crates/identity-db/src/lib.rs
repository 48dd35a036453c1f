//! # Identity Database
//!
//! Connection pooling, migrations and queries for the identity consumers:
//! the processed-message ledger and the user/group directory tables.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use identity_config::DbConfig;
use identity_error::AppResult;
use sqlx::postgres::PgPoolOptions;
use sqlx::{Pool, Postgres};
use std::time::Duration;

/// Database connection pool type
pub type DbPool = Pool<Postgres>;

/// Directory user row
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct UserRecord {
    pub id: String,
    pub username: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub enabled: bool,
}

/// Directory group row
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct GroupRecord {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
}

/// Create a PostgreSQL connection pool
pub async fn create_pool(database_url: &str, db_config: &DbConfig) -> Result<DbPool> {
    let pool = PgPoolOptions::new()
        .max_connections(db_config.max_connections)
        .acquire_timeout(Duration::from_secs(db_config.acquire_timeout_secs))
        .idle_timeout(Some(Duration::from_secs(db_config.idle_timeout_secs)))
        .test_before_acquire(true)
        .connect(database_url)
        .await
        .context("Failed to connect to PostgreSQL")?;

    Ok(pool)
}

/// Apply pending schema migrations
pub async fn run_migrations(pool: &DbPool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("Failed to run database migrations")?;
    tracing::info!("Database migrations applied");
    Ok(())
}

/// `SELECT 1`, used by the health endpoint
pub async fn ping(pool: &DbPool) -> AppResult<()> {
    sqlx::query("SELECT 1").execute(pool).await?;
    Ok(())
}

// ============================================================================
// Processed messages
// ============================================================================

pub async fn processed_message_exists(pool: &DbPool, message_id: &str) -> AppResult<bool> {
    let exists: bool = sqlx::query_scalar(
        "SELECT EXISTS(SELECT 1 FROM processed_messages WHERE message_id = $1)",
    )
    .bind(message_id)
    .fetch_one(pool)
    .await?;

    Ok(exists)
}

/// Record a consumed message id. Returns false when it was already present.
pub async fn insert_processed_message(
    pool: &DbPool,
    message_id: &str,
    processed_at: DateTime<Utc>,
) -> AppResult<bool> {
    let result = sqlx::query(
        r#"
        INSERT INTO processed_messages (message_id, processed_at)
        VALUES ($1, $2)
        ON CONFLICT (message_id) DO NOTHING
        "#,
    )
    .bind(message_id)
    .bind(processed_at)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}

// ============================================================================
// Directory users
// ============================================================================

/// Returns the number of rows updated (0 when the user does not exist)
pub async fn update_user(pool: &DbPool, user: &UserRecord) -> AppResult<u64> {
    let result = sqlx::query(
        r#"
        UPDATE directory_users
        SET username = $2, email = $3, display_name = $4, enabled = $5, updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(&user.id)
    .bind(&user.username)
    .bind(&user.email)
    .bind(&user.display_name)
    .bind(user.enabled)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

pub async fn insert_user(pool: &DbPool, user: &UserRecord) -> AppResult<()> {
    sqlx::query(
        r#"
        INSERT INTO directory_users (id, username, email, display_name, enabled)
        VALUES ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(&user.id)
    .bind(&user.username)
    .bind(&user.email)
    .bind(&user.display_name)
    .bind(user.enabled)
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn get_user(pool: &DbPool, id: &str) -> AppResult<Option<UserRecord>> {
    let user = sqlx::query_as::<_, UserRecord>(
        "SELECT id, username, email, display_name, enabled FROM directory_users WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    Ok(user)
}

/// Returns the number of rows deleted
pub async fn delete_user(pool: &DbPool, id: &str) -> AppResult<u64> {
    let result = sqlx::query("DELETE FROM directory_users WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected())
}

// ============================================================================
// Directory groups
// ============================================================================

pub async fn update_group(pool: &DbPool, group: &GroupRecord) -> AppResult<u64> {
    let result = sqlx::query(
        r#"
        UPDATE directory_groups
        SET name = $2, description = $3, updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(&group.id)
    .bind(&group.name)
    .bind(&group.description)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

pub async fn insert_group(pool: &DbPool, group: &GroupRecord) -> AppResult<()> {
    sqlx::query("INSERT INTO directory_groups (id, name, description) VALUES ($1, $2, $3)")
        .bind(&group.id)
        .bind(&group.name)
        .bind(&group.description)
        .execute(pool)
        .await?;

    Ok(())
}

pub async fn get_group(pool: &DbPool, id: &str) -> AppResult<Option<GroupRecord>> {
    let group = sqlx::query_as::<_, GroupRecord>(
        "SELECT id, name, description FROM directory_groups WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    Ok(group)
}

pub async fn delete_group(pool: &DbPool, id: &str) -> AppResult<u64> {
    let result = sqlx::query("DELETE FROM directory_groups WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected())
}
