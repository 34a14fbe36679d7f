//! Principal directory trait

use async_trait::async_trait;
use std::fmt::Debug;

use super::entity::UserId;
use crate::domain::DomainError;

/// Read-only view of the principal store used for the `owner_id`
/// referential check
#[async_trait]
pub trait UserDirectory: Send + Sync + Debug {
    /// Check whether a user with this ID exists
    async fn exists(&self, id: UserId) -> Result<bool, DomainError>;
}
