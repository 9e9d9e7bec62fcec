//! Crypto error types.

/// Errors from field encryption and decryption.
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    /// The value carries the envelope prefix but is not a well-formed envelope.
    #[error("Invalid encrypted field format: {0}")]
    InvalidFormat(String),

    /// The authentication tag did not verify. The stored value is corrupted or
    /// was tampered with and must not be used.
    #[error("Encrypted field failed authentication")]
    AuthenticationFailed,

    #[error("Key derivation failed: {0}")]
    KeyDerivationFailed(String),
}
