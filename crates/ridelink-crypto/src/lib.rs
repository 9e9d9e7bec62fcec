//! `RideLink` field confidentiality
//!
//! Authenticated encryption for sensitive fields (tax ids and other driver or
//! rider PII) before the trip store persists them.
//!
//! ## Crypto primitives
//!
//! - **Key**: SHA-256 of the configured secret
//! - **Encryption**: AES-256-GCM, 12-byte random nonce, detached 16-byte tag
//! - **Encoding**: `enc:<nonce>:<tag>:<ciphertext>`, lowercase hex

pub mod error;
pub mod field;

pub use error::CryptoError;
pub use field::{ENVELOPE_PREFIX, FieldCipher, NONCE_SIZE, TAG_SIZE, is_encrypted};
