//! In-memory API key repository implementation

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::domain::api_key::{ApiKey, ApiKeyRepository, KeyChanges, KeyIdentifier};
use crate::domain::{DomainError, UserId};

/// In-memory implementation of ApiKeyRepository
#[derive(Debug, Default)]
pub struct InMemoryApiKeyRepository {
    keys: Arc<RwLock<HashMap<String, ApiKey>>>,
}

impl InMemoryApiKeyRepository {
    /// Create a new in-memory repository
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a repository with initial keys
    pub fn with_keys(keys: Vec<ApiKey>) -> Self {
        let keys_map: HashMap<String, ApiKey> = keys
            .into_iter()
            .map(|k| (k.identifier().as_str().to_string(), k))
            .collect();

        Self {
            keys: Arc::new(RwLock::new(keys_map)),
        }
    }
}

fn not_found(identifier: &str) -> DomainError {
    DomainError::not_found(format!("API key '{}' not found", identifier))
}

#[async_trait]
impl ApiKeyRepository for InMemoryApiKeyRepository {
    async fn get(&self, identifier: &KeyIdentifier) -> Result<Option<ApiKey>, DomainError> {
        let keys = self.keys.read().await;
        Ok(keys.get(identifier.as_str()).cloned())
    }

    async fn create(&self, api_key: ApiKey) -> Result<ApiKey, DomainError> {
        let mut keys = self.keys.write().await;
        let id = api_key.identifier().as_str().to_string();

        if keys.contains_key(&id) {
            return Err(DomainError::conflict(format!(
                "API key with identifier '{}' already exists",
                id
            )));
        }

        keys.insert(id, api_key.clone());
        Ok(api_key)
    }

    async fn update(&self, api_key: &ApiKey, changes: &KeyChanges) -> Result<ApiKey, DomainError> {
        let mut keys = self.keys.write().await;
        let id = api_key.identifier().as_str();

        let stored = keys.get_mut(id).ok_or_else(|| not_found(id))?;
        stored.apply_changes(api_key, changes);

        Ok(stored.clone())
    }

    async fn delete(&self, identifier: &KeyIdentifier) -> Result<bool, DomainError> {
        let mut keys = self.keys.write().await;
        Ok(keys.remove(identifier.as_str()).is_some())
    }

    async fn list(&self, owner: Option<UserId>) -> Result<Vec<ApiKey>, DomainError> {
        let keys = self.keys.read().await;

        let mut result: Vec<ApiKey> = keys
            .values()
            .filter(|k| owner.map(|o| k.owner_id() == o).unwrap_or(true))
            .cloned()
            .collect();

        result.sort_by(|a, b| {
            a.created_at()
                .cmp(&b.created_at())
                .then_with(|| a.identifier().cmp(b.identifier()))
        });

        Ok(result)
    }

    async fn count(&self, owner: Option<UserId>) -> Result<usize, DomainError> {
        let keys = self.keys.read().await;

        Ok(keys
            .values()
            .filter(|k| owner.map(|o| k.owner_id() == o).unwrap_or(true))
            .count())
    }

    async fn exists(&self, identifier: &KeyIdentifier) -> Result<bool, DomainError> {
        let keys = self.keys.read().await;
        Ok(keys.contains_key(identifier.as_str()))
    }

    async fn record_usage(
        &self,
        identifier: &KeyIdentifier,
        at: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        let mut keys = self.keys.write().await;

        keys.get_mut(identifier.as_str())
            .map(|key| key.record_usage_at(at))
            .ok_or_else(|| not_found(identifier.as_str()))
    }
}
