//! API Key repository trait

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::fmt::Debug;

use super::entity::{ApiKey, KeyChanges, KeyIdentifier};
use crate::domain::user::UserId;
use crate::domain::DomainError;

/// Repository trait for API key storage.
///
/// Implementations must enforce identifier uniqueness themselves: `create`
/// fails with `DomainError::Conflict` when the identifier is taken, which
/// the service answers by generating a new identifier.
#[async_trait]
pub trait ApiKeyRepository: Send + Sync + Debug {
    /// Get an API key by its identifier
    async fn get(&self, identifier: &KeyIdentifier) -> Result<Option<ApiKey>, DomainError>;

    /// Create a new API key
    async fn create(&self, api_key: ApiKey) -> Result<ApiKey, DomainError>;

    /// Write the fields named in `changes` and `updated_at`, returning the
    /// stored key afterwards. Other columns, `last_used_at` included, keep
    /// their stored value.
    async fn update(&self, api_key: &ApiKey, changes: &KeyChanges)
        -> Result<ApiKey, DomainError>;

    /// Delete an API key
    async fn delete(&self, identifier: &KeyIdentifier) -> Result<bool, DomainError>;

    /// List API keys (optionally filtered by owner)
    async fn list(&self, owner: Option<UserId>) -> Result<Vec<ApiKey>, DomainError>;

    /// Count API keys (optionally filtered by owner)
    async fn count(&self, owner: Option<UserId>) -> Result<usize, DomainError>;

    /// Check if an identifier is taken
    async fn exists(&self, identifier: &KeyIdentifier) -> Result<bool, DomainError> {
        Ok(self.get(identifier).await?.is_some())
    }

    /// Set `last_used_at` without touching any other column
    async fn record_usage(
        &self,
        identifier: &KeyIdentifier,
        at: DateTime<Utc>,
    ) -> Result<(), DomainError>;
}
