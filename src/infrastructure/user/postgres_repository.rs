//! PostgreSQL user directory implementation

use async_trait::async_trait;
use sqlx::PgPool;

use crate::domain::user::{UserDirectory, UserId};
use crate::domain::DomainError;

/// Looks owners up in the `users` table
#[derive(Debug, Clone)]
pub struct PostgresUserDirectory {
    pool: PgPool,
}

impl PostgresUserDirectory {
    /// Create a new directory with the given connection pool
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserDirectory for PostgresUserDirectory {
    async fn exists(&self, id: UserId) -> Result<bool, DomainError> {
        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM users WHERE id = $1)")
            .bind(id.as_i64())
            .fetch_one(&self.pool)
            .await
            .map_err(|e| DomainError::storage(format!("Failed to look up user: {}", e)))?;

        Ok(exists)
    }
}
