//! Credential encoding
//!
//! Generates the public identifier and the secret token of an API key, and
//! seals/opens the secret through the injected cipher.

use std::sync::Arc;

use rand::distributions::Alphanumeric;
use rand::rngs::OsRng;
use rand::Rng;
use tracing::debug;
use zeroize::Zeroize;

use crate::domain::api_key::{
    ApiKeyRepository, EncryptedToken, KeyIdentifier, SecretToken, IDENTIFIER_LENGTH, KEY_LENGTH,
};
use crate::domain::{DomainError, TokenCipher};

/// Default bound on identifier regeneration
pub const DEFAULT_MAX_IDENTIFIER_ATTEMPTS: usize = 5;

fn random_alphanumeric(len: usize) -> String {
    OsRng
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// Encoder for API key credentials
#[derive(Debug, Clone)]
pub struct CredentialEncoder {
    cipher: Arc<dyn TokenCipher>,
    max_identifier_attempts: usize,
    /// Ciphertext opened when no stored key exists, see `match_decoy`
    decoy: Option<EncryptedToken>,
}

impl CredentialEncoder {
    pub fn new(cipher: Arc<dyn TokenCipher>) -> Self {
        let decoy = cipher
            .encrypt(random_alphanumeric(KEY_LENGTH).as_bytes())
            .map(EncryptedToken::new)
            .ok();

        Self {
            cipher,
            max_identifier_attempts: DEFAULT_MAX_IDENTIFIER_ATTEMPTS,
            decoy,
        }
    }

    /// Set the bound on identifier regeneration (at least one attempt)
    pub fn with_max_identifier_attempts(mut self, attempts: usize) -> Self {
        self.max_identifier_attempts = attempts.max(1);
        self
    }

    pub fn max_identifier_attempts(&self) -> usize {
        self.max_identifier_attempts
    }

    /// A fresh identifier, not checked against storage
    pub fn random_identifier() -> Result<KeyIdentifier, DomainError> {
        KeyIdentifier::new(random_alphanumeric(IDENTIFIER_LENGTH))
    }

    /// A fresh identifier not yet present in `keys`.
    ///
    /// Fails with `Conflict` once `max_identifier_attempts` candidates were
    /// all taken.
    pub async fn generate_identifier<R>(&self, keys: &R) -> Result<KeyIdentifier, DomainError>
    where
        R: ApiKeyRepository + ?Sized,
    {
        for attempt in 1..=self.max_identifier_attempts {
            let identifier = Self::random_identifier()?;

            if !keys.exists(&identifier).await? {
                return Ok(identifier);
            }

            debug!(attempt, "Generated identifier already taken, retrying");
        }

        Err(DomainError::conflict(format!(
            "No free API key identifier after {} attempts",
            self.max_identifier_attempts
        )))
    }

    /// A fresh secret token and its ciphertext. The plaintext is returned
    /// only here.
    pub fn generate_secret(&self) -> Result<(SecretToken, EncryptedToken), DomainError> {
        let secret = SecretToken::new(random_alphanumeric(KEY_LENGTH));
        let ciphertext = self.cipher.encrypt(secret.expose_secret().as_bytes())?;

        Ok((secret, EncryptedToken::new(ciphertext)))
    }

    /// Open a stored ciphertext
    pub fn decrypt(&self, token: &EncryptedToken) -> Result<SecretToken, DomainError> {
        let plaintext = self.cipher.decrypt(token.as_bytes())?;

        String::from_utf8(plaintext)
            .map(SecretToken::new)
            .map_err(|e| {
                e.into_bytes().zeroize();
                DomainError::decryption("Decrypted token is not valid UTF-8")
            })
    }

    /// Constant-time check of a candidate against a stored ciphertext
    pub fn matches(&self, stored: &EncryptedToken, candidate: &str) -> Result<bool, DomainError> {
        Ok(self.decrypt(stored)?.matches(candidate))
    }

    /// Run the same decrypt-and-compare as `matches` against a throwaway
    /// ciphertext. Rejecting an unknown identifier then costs as much as
    /// rejecting a wrong token.
    pub fn match_decoy(&self, candidate: &str) {
        if let Some(decoy) = &self.decoy {
            let _ = self.matches(decoy, candidate);
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::domain::api_key::{ApiKey, MockApiKeyRepository};
    use crate::domain::UserId;
    use crate::infrastructure::encryption::{AesGcmCipher, EncryptionKey};
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn encoder() -> CredentialEncoder {
        CredentialEncoder::new(Arc::new(AesGcmCipher::new(&EncryptionKey::generate())))
    }

    /// Real cipher that counts decryptions
    #[derive(Debug)]
    pub(crate) struct CountingCipher {
        inner: AesGcmCipher,
        decrypts: AtomicUsize,
    }

    impl Default for CountingCipher {
        fn default() -> Self {
            Self {
                inner: AesGcmCipher::new(&EncryptionKey::generate()),
                decrypts: AtomicUsize::new(0),
            }
        }
    }

    impl CountingCipher {
        pub(crate) fn decrypts(&self) -> usize {
            self.decrypts.load(Ordering::SeqCst)
        }
    }

    impl TokenCipher for CountingCipher {
        fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, DomainError> {
            self.inner.encrypt(plaintext)
        }

        fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>, DomainError> {
            self.decrypts.fetch_add(1, Ordering::SeqCst);
            self.inner.decrypt(ciphertext)
        }
    }

    #[test]
    fn test_random_identifier_shape() {
        let identifier = CredentialEncoder::random_identifier().unwrap();

        assert_eq!(identifier.as_str().len(), IDENTIFIER_LENGTH);
        assert!(identifier.as_str().chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[tokio::test]
    async fn test_identifiers_unique_against_populated_store() {
        let encoder = encoder();
        let repo = MockApiKeyRepository::new();
        let mut seen = HashSet::new();

        for _ in 0..200 {
            let identifier = encoder.generate_identifier(&repo).await.unwrap();
            assert_eq!(identifier.as_str().len(), IDENTIFIER_LENGTH);
            assert!(seen.insert(identifier.clone()));

            repo.insert(ApiKey::new(
                identifier,
                EncryptedToken::new(vec![1]),
                UserId::new(1),
                "seed",
            ))
            .await;
        }
    }

    #[tokio::test]
    async fn test_generate_identifier_propagates_storage_errors() {
        let repo = MockApiKeyRepository::new();
        repo.set_should_fail(true).await;

        let err = encoder().generate_identifier(&repo).await.unwrap_err();
        assert!(matches!(err, DomainError::Storage { .. }));
    }

    #[test]
    fn test_max_attempts_is_at_least_one() {
        assert_eq!(
            encoder().max_identifier_attempts(),
            DEFAULT_MAX_IDENTIFIER_ATTEMPTS
        );
        assert_eq!(
            encoder()
                .with_max_identifier_attempts(0)
                .max_identifier_attempts(),
            1
        );
    }

    #[test]
    fn test_generate_secret() {
        let encoder = encoder();
        let (secret, ciphertext) = encoder.generate_secret().unwrap();

        assert_eq!(secret.len(), KEY_LENGTH);
        assert!(secret.expose_secret().chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(ciphertext.as_bytes(), secret.expose_secret().as_bytes());

        let opened = encoder.decrypt(&ciphertext).unwrap();
        assert_eq!(opened.expose_secret(), secret.expose_secret());
    }

    #[test]
    fn test_secrets_differ() {
        let encoder = encoder();
        let (first, _) = encoder.generate_secret().unwrap();
        let (second, _) = encoder.generate_secret().unwrap();

        assert_ne!(first.expose_secret(), second.expose_secret());
    }

    #[test]
    fn test_matches() {
        let encoder = encoder();
        let (secret, ciphertext) = encoder.generate_secret().unwrap();

        assert!(encoder.matches(&ciphertext, secret.expose_secret()).unwrap());
        assert!(!encoder.matches(&ciphertext, "wrong").unwrap());
        assert!(!encoder.matches(&ciphertext, "").unwrap());
    }

    #[test]
    fn test_match_decoy_opens_a_ciphertext() {
        let cipher = Arc::new(CountingCipher::default());
        let encoder = CredentialEncoder::new(cipher.clone());

        encoder.match_decoy("anything");
        encoder.match_decoy("");
        assert_eq!(cipher.decrypts(), 2);
    }

    #[test]
    fn test_decrypt_with_other_key_fails() {
        let (_, ciphertext) = encoder().generate_secret().unwrap();

        let err = encoder().decrypt(&ciphertext).unwrap_err();
        assert!(matches!(err, DomainError::Decryption { .. }));
    }
}
