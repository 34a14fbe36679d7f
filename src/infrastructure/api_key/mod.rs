//! API Key infrastructure implementations
//!
//! Credential encoding, in-memory and PostgreSQL storage, and the service
//! that ties them to the validation policy.

mod encoder;
mod postgres_repository;
mod repository;
mod service;

pub use encoder::{CredentialEncoder, DEFAULT_MAX_IDENTIFIER_ATTEMPTS};
pub use postgres_repository::PostgresApiKeyRepository;
pub use repository::InMemoryApiKeyRepository;
pub use service::{ApiKeyService, CreateApiKeyRequest, IssuedApiKey, UpdateApiKeyRequest};
