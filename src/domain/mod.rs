//! Domain layer - Core business logic and entities

pub mod acl;
pub mod api_key;
pub mod encryption;
pub mod error;
pub mod user;

pub use acl::{PermissionLevel, PermissionSet, ResourceKind};
pub use api_key::{
    ApiKey, ApiKeyRecord, ApiKeyRepository, ApiKeyView, KeyIdentifier, SecretToken,
    ValidationPolicy,
};
pub use encryption::TokenCipher;
pub use error::DomainError;
pub use user::{UserDirectory, UserId};
