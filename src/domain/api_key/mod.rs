//! API Key domain
//!
//! This module provides domain types and traits for admin API keys:
//! identity, encrypted secrets, per-resource permission grants and the
//! validation policy applied before every write.

mod entity;
mod policy;
mod record;
mod repository;
mod secret;
mod validation;

pub use entity::{AllowedIp, AllowedIps, ApiKey, ApiKeyView, KeyChanges, KeyIdentifier};
pub use policy::{ValidationPolicy, WriteKind, IDENTIFIER_TAKEN};
pub use record::ApiKeyRecord;
pub use repository::ApiKeyRepository;
pub use secret::{EncryptedToken, SecretToken};
pub use validation::{
    check_integrity, check_required_fields, parse_allowed_ips, validate_identifier,
    validate_memo, IDENTIFIER_LENGTH, KEY_LENGTH, MAX_MEMO_LENGTH,
};

#[cfg(test)]
pub use repository::mock::MockApiKeyRepository;
