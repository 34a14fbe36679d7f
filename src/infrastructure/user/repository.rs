//! In-memory user directory implementation

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::domain::user::{UserDirectory, UserId};
use crate::domain::DomainError;

/// In-memory implementation of UserDirectory
#[derive(Debug, Clone, Default)]
pub struct InMemoryUserDirectory {
    users: Arc<RwLock<HashSet<i64>>>,
}

impl InMemoryUserDirectory {
    /// Create a new empty directory
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a directory with initial users
    pub fn with_users(users: impl IntoIterator<Item = i64>) -> Self {
        Self {
            users: Arc::new(RwLock::new(users.into_iter().collect())),
        }
    }

    pub async fn add(&self, id: UserId) {
        self.users.write().await.insert(id.as_i64());
    }

    /// Returns true if the user was present
    pub async fn remove(&self, id: UserId) -> bool {
        self.users.write().await.remove(&id.as_i64())
    }
}

#[async_trait]
impl UserDirectory for InMemoryUserDirectory {
    async fn exists(&self, id: UserId) -> Result<bool, DomainError> {
        Ok(self.users.read().await.contains(&id.as_i64()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_with_users() {
        let users = InMemoryUserDirectory::with_users([1, 42]);

        assert!(users.exists(UserId::new(42)).await.unwrap());
        assert!(!users.exists(UserId::new(7)).await.unwrap());
    }

    #[tokio::test]
    async fn test_add_and_remove() {
        let users = InMemoryUserDirectory::new();
        let id = UserId::new(3);

        users.add(id).await;
        assert!(users.exists(id).await.unwrap());

        assert!(users.remove(id).await);
        assert!(!users.remove(id).await);
        assert!(!users.exists(id).await.unwrap());
    }
}
