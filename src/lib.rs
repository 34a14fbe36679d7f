//! API Keyring
//!
//! Admin API keys for a hosting control panel:
//! - Public 16-character identifier plus a 32-character secret token
//! - Secret sealed with AES-256-GCM at rest, shown in plaintext once
//! - Per-resource access levels (none, read, write, delete)
//! - Two-tier validation before every write
//! - PostgreSQL storage with its own migrations

pub mod cli;
pub mod config;
pub mod domain;
pub mod infrastructure;

pub use crate::config::AppConfig;

use std::sync::Arc;

use sqlx::PgPool;
use tracing::info;

use domain::{ApiKeyRepository, DomainError, ValidationPolicy};
use infrastructure::{
    api_key::{ApiKeyService, CredentialEncoder, PostgresApiKeyRepository},
    encryption::{AesGcmCipher, EncryptionKey},
    storage::connect_pool,
    user::PostgresUserDirectory,
};

/// Open the database pool described by the configuration
pub async fn connect(config: &AppConfig) -> Result<PgPool, DomainError> {
    connect_pool(&config.database.to_postgres_config()).await
}

/// Encryption key from `encryption.key`
pub fn encryption_key(config: &AppConfig) -> Result<EncryptionKey, DomainError> {
    let encoded = config.encryption.key.as_deref().ok_or_else(|| {
        DomainError::configuration(
            "encryption.key is not set; generate one with `api-keyring generate-key`",
        )
    })?;

    EncryptionKey::from_base64(encoded)
}

/// Credential encoder over the configured key and retry bound
pub fn create_encoder(config: &AppConfig) -> Result<CredentialEncoder, DomainError> {
    let cipher = AesGcmCipher::new(&encryption_key(config)?);

    Ok(CredentialEncoder::new(Arc::new(cipher))
        .with_max_identifier_attempts(config.api_keys.max_identifier_attempts))
}

/// API key service backed by PostgreSQL
pub fn create_api_key_service(
    config: &AppConfig,
    pool: PgPool,
) -> Result<ApiKeyService<PostgresApiKeyRepository>, DomainError> {
    let encoder = create_encoder(config)?;
    let policy = ValidationPolicy::new(Arc::new(PostgresUserDirectory::new(pool.clone())));
    let repository = Arc::new(PostgresApiKeyRepository::new(pool));

    info!("Using PostgreSQL API key storage");

    Ok(ApiKeyService::new(repository, encoder, policy))
}

/// API key service over any repository, with the owner check delegated to
/// `users`
pub fn create_api_key_service_with<R>(
    config: &AppConfig,
    repository: Arc<R>,
    users: Arc<dyn domain::UserDirectory>,
) -> Result<ApiKeyService<R>, DomainError>
where
    R: ApiKeyRepository,
{
    Ok(ApiKeyService::new(
        repository,
        create_encoder(config)?,
        ValidationPolicy::new(users),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::api_key::{CreateApiKeyRequest, InMemoryApiKeyRepository};
    use crate::infrastructure::user::InMemoryUserDirectory;

    fn config_with_key() -> AppConfig {
        let mut config = AppConfig::default();
        config.encryption.key = Some(EncryptionKey::generate().to_base64());
        config.api_keys.max_identifier_attempts = 3;
        config
    }

    #[test]
    fn test_missing_encryption_key() {
        let err = encryption_key(&AppConfig::default()).unwrap_err();
        assert!(matches!(err, DomainError::Configuration { .. }));
    }

    #[test]
    fn test_invalid_encryption_key() {
        let mut config = AppConfig::default();
        config.encryption.key = Some("dG9vIHNob3J0".to_string());

        assert!(encryption_key(&config).is_err());
    }

    #[test]
    fn test_encoder_uses_configured_attempts() {
        let encoder = create_encoder(&config_with_key()).unwrap();
        assert_eq!(encoder.max_identifier_attempts(), 3);
    }

    #[tokio::test]
    async fn test_service_from_config() {
        let service = create_api_key_service_with(
            &config_with_key(),
            Arc::new(InMemoryApiKeyRepository::new()),
            Arc::new(InMemoryUserDirectory::with_users([42])),
        )
        .unwrap();

        let issued = service
            .create(CreateApiKeyRequest::new(42, "ci-bot"))
            .await
            .unwrap();

        assert!(
            service
                .verify(
                    issued.api_key.identifier().as_str(),
                    issued.secret.expose_secret()
                )
                .await
                .unwrap()
        );
    }
}
