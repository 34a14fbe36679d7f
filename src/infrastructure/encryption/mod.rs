//! Encryption of secrets at rest

mod cipher;

pub use cipher::{AesGcmCipher, EncryptionKey, ENCRYPTION_KEY_SIZE};
