//! API Key service
//!
//! Provides high-level operations for API key management: issuing keys,
//! authenticating presented credentials and editing grants. Every write
//! passes the validation policy before it reaches the repository.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::domain::acl::ResourceKind;
use crate::domain::api_key::{
    AllowedIps, ApiKey, ApiKeyRecord, ApiKeyRepository, KeyChanges, KeyIdentifier, SecretToken,
    ValidationPolicy, WriteKind, IDENTIFIER_TAKEN,
};
use crate::domain::{DomainError, UserId};

use super::encoder::CredentialEncoder;

/// Request to issue a new API key
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateApiKeyRequest {
    pub owner_id: Option<i64>,
    pub memo: Option<String>,
    #[serde(default)]
    pub allowed_ips: Option<Vec<String>>,
    /// Initial grants by resource kind name; omitted kinds get no access
    #[serde(default)]
    pub permissions: BTreeMap<String, i64>,
}

impl CreateApiKeyRequest {
    pub fn new(owner_id: i64, memo: impl Into<String>) -> Self {
        Self {
            owner_id: Some(owner_id),
            memo: Some(memo.into()),
            ..Default::default()
        }
    }

    pub fn with_allowed_ips<I, S>(mut self, allowed_ips: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_ips = Some(allowed_ips.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_permission(mut self, kind: impl Into<String>, level: i64) -> Self {
        self.permissions.insert(kind.into(), level);
        self
    }
}

/// Changes to an existing API key. `None` leaves a field as is.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateApiKeyRequest {
    pub memo: Option<String>,
    /// `Some(None)` clears the restriction
    pub allowed_ips: Option<Option<Vec<String>>>,
    #[serde(default)]
    pub permissions: BTreeMap<String, i64>,
}

/// Result of issuing a new API key
#[derive(Debug)]
pub struct IssuedApiKey {
    /// The API key entity (ciphertext only)
    pub api_key: ApiKey,
    /// The plaintext secret, returned this once
    pub secret: SecretToken,
}

/// API Key service for managing API keys
#[derive(Debug)]
pub struct ApiKeyService<R>
where
    R: ApiKeyRepository,
{
    repository: Arc<R>,
    encoder: CredentialEncoder,
    policy: ValidationPolicy,
}

impl<R: ApiKeyRepository> ApiKeyService<R> {
    /// Create a new API key service
    pub fn new(repository: Arc<R>, encoder: CredentialEncoder, policy: ValidationPolicy) -> Self {
        Self {
            repository,
            encoder,
            policy,
        }
    }

    pub fn encoder(&self) -> &CredentialEncoder {
        &self.encoder
    }

    /// Issue a new API key.
    ///
    /// A fresh identifier is drawn when the chosen one turns out to be taken,
    /// whether the policy or the storage constraint notices it first.
    pub async fn create(&self, request: CreateApiKeyRequest) -> Result<IssuedApiKey, DomainError> {
        info!(
            "Creating API key: owner={:?}, memo={:?}",
            request.owner_id, request.memo
        );

        let (secret, token) = self.encoder.generate_secret()?;
        let attempts = self.encoder.max_identifier_attempts();

        for attempt in 1..=attempts {
            let identifier = self
                .encoder
                .generate_identifier(self.repository.as_ref())
                .await?;

            let record = ApiKeyRecord {
                identifier: Some(identifier.as_str().to_string()),
                token: Some(token.as_bytes().to_vec()),
                owner_id: request.owner_id,
                allowed_ips: request.allowed_ips.clone().map(serde_json::Value::from),
                memo: request.memo.clone(),
                permissions: request.permissions.clone(),
                ..Default::default()
            };

            match self
                .policy
                .validate(&record, WriteKind::Create, self.repository.as_ref())
                .await
            {
                Err(DomainError::IntegrityViolation { ref constraint, .. })
                    if constraint == IDENTIFIER_TAKEN =>
                {
                    debug!(attempt, "Identifier taken during validation, retrying");
                    continue;
                }
                result => result?,
            }

            let api_key = ApiKey::from_record(record)?;

            match self.repository.create(api_key).await {
                Ok(created) => {
                    info!("API key created: identifier={}", created.identifier());
                    return Ok(IssuedApiKey {
                        api_key: created,
                        secret,
                    });
                }
                Err(DomainError::Conflict { .. }) => {
                    debug!(attempt, "Identifier taken on insert, retrying");
                }
                Err(e) => return Err(e),
            }
        }

        Err(DomainError::conflict(format!(
            "Could not allocate a unique API key identifier after {} attempts",
            attempts
        )))
    }

    /// Check a presented credential pair.
    ///
    /// Returns the key on success and `None` for an unknown or malformed
    /// identifier, a wrong token, a stored row that fails validation, or a
    /// stored token that cannot be decrypted. Every rejection opens one
    /// ciphertext, real or decoy.
    /// On success `last_used_at` is recorded; failing to record it does not
    /// fail authentication.
    pub async fn authenticate(
        &self,
        identifier: &str,
        candidate: &str,
    ) -> Result<Option<ApiKey>, DomainError> {
        let Ok(identifier) = KeyIdentifier::new(identifier) else {
            debug!("Rejected malformed API key identifier");
            self.encoder.match_decoy(candidate);
            return Ok(None);
        };

        let mut api_key = match self.repository.get(&identifier).await {
            Ok(Some(api_key)) => api_key,
            Ok(None) => {
                debug!("Unknown API key identifier: {}", identifier);
                self.encoder.match_decoy(candidate);
                return Ok(None);
            }
            Err(e) if e.is_validation() => {
                warn!("Stored API key {} could not be loaded: {}", identifier, e);
                self.encoder.match_decoy(candidate);
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        match self.encoder.matches(api_key.token(), candidate) {
            Ok(true) => {}
            Ok(false) => {
                debug!("API key token mismatch: identifier={}", identifier);
                return Ok(None);
            }
            Err(e) => {
                warn!(
                    "Stored token of API key {} could not be decrypted: {}",
                    identifier, e
                );
                return Ok(None);
            }
        }

        let now = Utc::now();
        if let Err(e) = self.repository.record_usage(&identifier, now).await {
            warn!("Failed to record API key usage: {}", e);
        }
        api_key.record_usage_at(now);

        debug!("API key verified: identifier={}", identifier);
        Ok(Some(api_key))
    }

    /// Whether the credential pair is valid. Bad credentials are `false`,
    /// never an error.
    pub async fn verify(&self, identifier: &str, candidate: &str) -> Result<bool, DomainError> {
        Ok(self.authenticate(identifier, candidate).await?.is_some())
    }

    /// Get an API key by identifier
    pub async fn get(&self, identifier: &str) -> Result<Option<ApiKey>, DomainError> {
        let identifier = KeyIdentifier::new(identifier)?;
        self.repository.get(&identifier).await
    }

    async fn require(&self, identifier: &str) -> Result<ApiKey, DomainError> {
        self.get(identifier)
            .await?
            .ok_or_else(|| DomainError::not_found(format!("API key '{}' not found", identifier)))
    }

    /// Validate the whole edited entity, then write only `changes`
    async fn save(&self, api_key: ApiKey, changes: KeyChanges) -> Result<ApiKey, DomainError> {
        self.policy
            .validate(
                &api_key.to_record(),
                WriteKind::Update,
                self.repository.as_ref(),
            )
            .await?;

        if changes.is_empty() {
            return Ok(api_key);
        }

        self.repository.update(&api_key, &changes).await
    }

    /// Grant a level on a resource kind
    pub async fn grant(
        &self,
        identifier: &str,
        kind: &str,
        level: i64,
    ) -> Result<ApiKey, DomainError> {
        info!(
            "Granting API key permission: identifier={}, resource={}, level={}",
            identifier, kind, level
        );

        let kind: ResourceKind = kind.parse()?;
        let mut api_key = self.require(identifier).await?;
        api_key.grant(kind.as_str(), level)?;

        self.save(api_key, KeyChanges::permission(kind)).await
    }

    /// Drop every grant of a key back to no access
    pub async fn revoke_all(&self, identifier: &str) -> Result<ApiKey, DomainError> {
        info!("Revoking all API key permissions: identifier={}", identifier);

        let mut api_key = self.require(identifier).await?;
        api_key.revoke_all();

        self.save(api_key, KeyChanges::all_permissions()).await
    }

    /// Apply memo, IP restriction and grant changes in one write
    pub async fn update(
        &self,
        identifier: &str,
        request: UpdateApiKeyRequest,
    ) -> Result<ApiKey, DomainError> {
        info!("Updating API key: identifier={}", identifier);

        let mut api_key = self.require(identifier).await?;
        let mut changes = KeyChanges::default();

        if let Some(memo) = request.memo {
            api_key.set_memo(memo)?;
            changes.memo = true;
        }

        if let Some(allowed_ips) = request.allowed_ips {
            let allowed_ips = allowed_ips.map(AllowedIps::parse).transpose()?;
            api_key.set_allowed_ips(allowed_ips);
            changes.allowed_ips = true;
        }

        for (kind, level) in &request.permissions {
            let kind: ResourceKind = kind.parse()?;
            api_key.grant(kind.as_str(), *level)?;
            changes = changes.with_permission(kind);
        }

        self.save(api_key, changes).await
    }

    /// Delete an API key
    pub async fn delete(&self, identifier: &str) -> Result<bool, DomainError> {
        info!("Deleting API key: identifier={}", identifier);

        let identifier = KeyIdentifier::new(identifier)?;
        self.repository.delete(&identifier).await
    }

    /// List API keys (optionally filtered by owner)
    pub async fn list(&self, owner: Option<i64>) -> Result<Vec<ApiKey>, DomainError> {
        self.repository.list(owner.map(UserId::new)).await
    }

    /// Count API keys (optionally filtered by owner)
    pub async fn count(&self, owner: Option<i64>) -> Result<usize, DomainError> {
        self.repository.count(owner.map(UserId::new)).await
    }
}
