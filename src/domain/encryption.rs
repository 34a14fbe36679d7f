//! Symmetric encryption contract for secrets at rest

use std::fmt::Debug;

use crate::domain::DomainError;

/// Cipher handed to the credential encoder at construction.
///
/// Key material and rotation are owned by the implementation. `decrypt`
/// must fail with `DomainError::Decryption` for malformed input or input
/// sealed under a different key.
pub trait TokenCipher: Send + Sync + Debug {
    fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, DomainError>;

    fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>, DomainError>;
}
