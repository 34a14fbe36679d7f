//! AES-256-GCM token cipher
//!
//! Sealed layout: `version (1) || nonce (12) || ciphertext + tag`.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::{engine::general_purpose::STANDARD, Engine};
use rand::rngs::OsRng;
use rand::RngCore;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::domain::{DomainError, TokenCipher};

/// Key size in bytes
pub const ENCRYPTION_KEY_SIZE: usize = 32;

const FORMAT_VERSION: u8 = 1;
const NONCE_SIZE: usize = 12;
const TAG_SIZE: usize = 16;

/// 256-bit symmetric key, zeroed on drop
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct EncryptionKey([u8; ENCRYPTION_KEY_SIZE]);

impl EncryptionKey {
    pub fn from_bytes(bytes: [u8; ENCRYPTION_KEY_SIZE]) -> Self {
        Self(bytes)
    }

    /// Decode a base64 key as found in configuration
    pub fn from_base64(encoded: &str) -> Result<Self, DomainError> {
        let mut decoded = STANDARD.decode(encoded.trim()).map_err(|e| {
            DomainError::configuration(format!("Encryption key is not valid base64: {}", e))
        })?;

        if decoded.len() != ENCRYPTION_KEY_SIZE {
            let len = decoded.len();
            decoded.zeroize();
            return Err(DomainError::configuration(format!(
                "Encryption key must be {} bytes, got {}",
                ENCRYPTION_KEY_SIZE, len
            )));
        }

        let mut bytes = [0u8; ENCRYPTION_KEY_SIZE];
        bytes.copy_from_slice(&decoded);
        decoded.zeroize();

        Ok(Self(bytes))
    }

    /// Fresh random key from the OS CSPRNG
    pub fn generate() -> Self {
        let mut bytes = [0u8; ENCRYPTION_KEY_SIZE];
        OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    pub fn to_base64(&self) -> String {
        STANDARD.encode(self.0)
    }
}

impl std::fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("EncryptionKey([REDACTED])")
    }
}

/// AES-256-GCM implementation of `TokenCipher` with a random nonce per
/// message
#[derive(Clone)]
pub struct AesGcmCipher {
    cipher: Aes256Gcm,
}

impl AesGcmCipher {
    pub fn new(key: &EncryptionKey) -> Self {
        Self {
            cipher: Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key.0)),
        }
    }
}

impl std::fmt::Debug for AesGcmCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AesGcmCipher").finish_non_exhaustive()
    }
}

impl TokenCipher for AesGcmCipher {
    fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, DomainError> {
        let mut nonce_bytes = [0u8; NONCE_SIZE];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext)
            .map_err(|e| DomainError::internal(format!("Token encryption failed: {}", e)))?;

        let mut out = Vec::with_capacity(1 + NONCE_SIZE + ciphertext.len());
        out.push(FORMAT_VERSION);
        out.extend_from_slice(&nonce_bytes);
        out.extend_from_slice(&ciphertext);

        Ok(out)
    }

    fn decrypt(&self, sealed: &[u8]) -> Result<Vec<u8>, DomainError> {
        if sealed.len() < 1 + NONCE_SIZE + TAG_SIZE {
            return Err(DomainError::decryption("Ciphertext is too short"));
        }

        if sealed[0] != FORMAT_VERSION {
            return Err(DomainError::decryption(format!(
                "Unsupported ciphertext version {}",
                sealed[0]
            )));
        }

        let nonce = Nonce::from_slice(&sealed[1..1 + NONCE_SIZE]);

        self.cipher
            .decrypt(nonce, &sealed[1 + NONCE_SIZE..])
            .map_err(|_| {
                DomainError::decryption("Ciphertext could not be authenticated with the current key")
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip() {
        let cipher = AesGcmCipher::new(&EncryptionKey::generate());
        let sealed = cipher.encrypt(b"plaintext-secret").unwrap();

        assert_ne!(&sealed[..], b"plaintext-secret");
        assert_eq!(sealed.len(), 1 + NONCE_SIZE + 16 + TAG_SIZE);
        assert_eq!(cipher.decrypt(&sealed).unwrap(), b"plaintext-secret");
    }

    #[test]
    fn test_nonce_is_random() {
        let cipher = AesGcmCipher::new(&EncryptionKey::generate());
        let a = cipher.encrypt(b"same").unwrap();
        let b = cipher.encrypt(b"same").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_wrong_key_fails() {
        let sealed = AesGcmCipher::new(&EncryptionKey::generate())
            .encrypt(b"secret")
            .unwrap();

        let err = AesGcmCipher::new(&EncryptionKey::generate())
            .decrypt(&sealed)
            .unwrap_err();
        assert!(matches!(err, DomainError::Decryption { .. }));
    }

    #[test]
    fn test_malformed_ciphertext_fails() {
        let cipher = AesGcmCipher::new(&EncryptionKey::generate());

        assert!(matches!(cipher.decrypt(b"short"), Err(DomainError::Decryption { .. })));

        let mut sealed = cipher.encrypt(b"secret").unwrap();
        sealed[0] = 9;
        assert!(matches!(cipher.decrypt(&sealed), Err(DomainError::Decryption { .. })));

        let mut sealed = cipher.encrypt(b"secret").unwrap();
        let last = sealed.len() - 1;
        sealed[last] ^= 0xff;
        assert!(matches!(cipher.decrypt(&sealed), Err(DomainError::Decryption { .. })));
    }

    #[test]
    fn test_key_from_base64() {
        let key = EncryptionKey::generate();
        let restored = EncryptionKey::from_base64(&key.to_base64()).unwrap();
        assert_eq!(restored.to_base64(), key.to_base64());

        assert!(EncryptionKey::from_base64("not base64!").is_err());
        assert!(EncryptionKey::from_base64(&STANDARD.encode([0u8; 16])).is_err());
        assert_eq!(format!("{:?}", key), "EncryptionKey([REDACTED])");
    }
}
