//! Field-level encryption for sensitive values stored by the trip store.
//!
//! Encrypted values are self-describing envelopes:
//!
//! ```text
//! enc:<nonce hex>:<tag hex>:<ciphertext hex>
//! ```
//!
//! AES-256-GCM with a 12-byte random nonce and a detached 16-byte tag, so
//! envelopes written by the Node.js server decrypt here and vice versa.
//! The key is SHA-256 of the configured secret; there is no key id, so
//! rotating the secret makes every existing envelope undecryptable.

use std::fmt;

use aes_gcm::Aes256Gcm;
use aes_gcm::aead::{AeadInPlace, Key, KeyInit, Nonce, Tag};
use rand::RngCore;
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};
use zeroize::Zeroize;

use crate::error::CryptoError;

/// Literal prefix marking an encrypted value.
pub const ENVELOPE_PREFIX: &str = "enc:";

/// GCM nonce (IV) size.
pub const NONCE_SIZE: usize = 12;

/// GCM authentication tag size.
pub const TAG_SIZE: usize = 16;

/// Whether the value is an encrypted envelope (by prefix only).
pub fn is_encrypted(value: &str) -> bool {
    value.starts_with(ENVELOPE_PREFIX)
}

/// Encrypts and decrypts individual string fields.
pub struct FieldCipher {
    cipher: Aes256Gcm,
}

impl fmt::Debug for FieldCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldCipher").finish_non_exhaustive()
    }
}

impl FieldCipher {
    /// Derive the field key from a secret. The same secret always yields the
    /// same key.
    pub fn from_secret(secret: &str) -> Result<Self, CryptoError> {
        if secret.is_empty() {
            return Err(CryptoError::KeyDerivationFailed(
                "field secret must not be empty".into(),
            ));
        }
        let mut key_bytes = [0u8; 32];
        key_bytes.copy_from_slice(&Sha256::digest(secret.as_bytes()));
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key_bytes));
        key_bytes.zeroize();
        Ok(Self { cipher })
    }

    /// Encrypt a plaintext field into an envelope.
    pub fn encrypt(&self, plaintext: &str) -> Result<String, CryptoError> {
        let mut nonce_bytes = [0u8; NONCE_SIZE];
        OsRng.fill_bytes(&mut nonce_bytes);

        let mut buffer = plaintext.as_bytes().to_vec();
        let tag = self
            .cipher
            .encrypt_in_place_detached(
                Nonce::<Aes256Gcm>::from_slice(&nonce_bytes),
                b"",
                &mut buffer,
            )
            .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))?;

        Ok(format!(
            "{ENVELOPE_PREFIX}{}:{}:{}",
            hex::encode(nonce_bytes),
            hex::encode(tag),
            hex::encode(&buffer)
        ))
    }

    /// Decrypt an envelope. Values without the envelope prefix are returned
    /// unchanged so records written before encryption was enabled keep working.
    pub fn decrypt(&self, value: &str) -> Result<String, CryptoError> {
        let Some(body) = value.strip_prefix(ENVELOPE_PREFIX) else {
            return Ok(value.to_string());
        };

        let envelope = Envelope::parse(body)?;
        let mut buffer = envelope.ciphertext;
        self.cipher
            .decrypt_in_place_detached(
                Nonce::<Aes256Gcm>::from_slice(&envelope.nonce),
                b"",
                &mut buffer,
                Tag::<Aes256Gcm>::from_slice(&envelope.tag),
            )
            .map_err(|_| CryptoError::AuthenticationFailed)?;

        String::from_utf8(buffer)
            .map_err(|_| CryptoError::InvalidFormat("plaintext is not UTF-8".into()))
    }

    /// Last four characters of a tax id, decrypting first when needed.
    pub fn mask_tax_id(&self, value: Option<&str>) -> Result<Option<String>, CryptoError> {
        let Some(value) = value else {
            return Ok(None);
        };
        let plain = self.decrypt(value)?;
        let count = plain.chars().count();
        Ok(Some(plain.chars().skip(count.saturating_sub(4)).collect()))
    }
}

/// Decoded parts of an envelope body (everything after the prefix).
struct Envelope {
    nonce: [u8; NONCE_SIZE],
    tag: [u8; TAG_SIZE],
    ciphertext: Vec<u8>,
}

impl Envelope {
    fn parse(body: &str) -> Result<Self, CryptoError> {
        let parts: Vec<&str> = body.split(':').collect();
        let [nonce_hex, tag_hex, ciphertext_hex] = parts.as_slice() else {
            return Err(CryptoError::InvalidFormat(format!(
                "expected 4 fields, got {}",
                parts.len() + 1
            )));
        };

        let nonce = decode_fixed::<NONCE_SIZE>("nonce", nonce_hex)?;
        let tag = decode_fixed::<TAG_SIZE>("tag", tag_hex)?;
        let ciphertext = hex::decode(ciphertext_hex)
            .map_err(|e| CryptoError::InvalidFormat(format!("ciphertext: {e}")))?;

        Ok(Self {
            nonce,
            tag,
            ciphertext,
        })
    }
}

fn decode_fixed<const N: usize>(field: &str, hex_str: &str) -> Result<[u8; N], CryptoError> {
    let bytes =
        hex::decode(hex_str).map_err(|e| CryptoError::InvalidFormat(format!("{field}: {e}")))?;
    <[u8; N]>::try_from(bytes.as_slice()).map_err(|_| {
        CryptoError::InvalidFormat(format!(
            "{field}: expected {N} bytes, got {}",
            bytes.len()
        ))
    })
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    fn cipher() -> FieldCipher {
        FieldCipher::from_secret("test-secret").unwrap()
    }

    /// Replace one hex digit of field `index` (1 = nonce, 2 = tag, 3 = ciphertext).
    fn flip_field(envelope: &str, index: usize) -> String {
        let mut parts: Vec<String> = envelope.split(':').map(str::to_string).collect();
        let mut bytes = hex::decode(&parts[index]).unwrap();
        bytes[0] ^= 0x01;
        parts[index] = hex::encode(bytes);
        parts.join(":")
    }

    #[test]
    fn encrypt_decrypt_roundtrip() {
        let c = cipher();
        for plaintext in ["123-45-6789", "", "Tax ID: AB 12 34 56 C", "naïve café"] {
            let envelope = c.encrypt(plaintext).unwrap();
            assert!(is_encrypted(&envelope));
            assert_eq!(c.decrypt(&envelope).unwrap(), plaintext);
        }
    }

    #[test]
    fn envelope_has_four_lowercase_hex_fields() {
        let envelope = cipher().encrypt("secret").unwrap();
        let parts: Vec<&str> = envelope.split(':').collect();
        assert_eq!(parts.len(), 4);
        assert_eq!(parts[0], "enc");
        assert_eq!(parts[1].len(), NONCE_SIZE * 2);
        assert_eq!(parts[2].len(), TAG_SIZE * 2);
        assert_eq!(parts[3].len(), "secret".len() * 2);
        for part in &parts[1..] {
            assert!(
                part.chars()
                    .all(|ch| ch.is_ascii_digit() || ('a'..='f').contains(&ch))
            );
        }
    }

    /// Written by Node's `aes-256-gcm` with key SHA-256("fixture-secret").
    const NODE_ENVELOPE: &str =
        "enc:0102030405060708090a0b0c:b4ae8890a5d365b1139242e81035c6f1:af9ececb7242278ee0227c";

    #[test]
    fn decrypts_envelopes_from_the_node_server() {
        let c = FieldCipher::from_secret("fixture-secret").unwrap();
        assert_eq!(c.decrypt(NODE_ENVELOPE).unwrap(), "123-45-6789");
        assert_eq!(c.mask_tax_id(Some(NODE_ENVELOPE)).unwrap().as_deref(), Some("6789"));
        assert!(matches!(
            cipher().decrypt(NODE_ENVELOPE),
            Err(CryptoError::AuthenticationFailed)
        ));
    }

    #[test]
    fn same_plaintext_gets_fresh_nonce() {
        let c = cipher();
        assert_ne!(c.encrypt("same").unwrap(), c.encrypt("same").unwrap());
    }

    #[test]
    fn plaintext_passes_through() {
        let c = cipher();
        assert_eq!(c.decrypt("123-45-6789").unwrap(), "123-45-6789");
        assert_eq!(c.decrypt("").unwrap(), "");
        assert_eq!(c.decrypt("ENC:upper-is-not-a-prefix").unwrap(), "ENC:upper-is-not-a-prefix");
    }

    #[test]
    fn tampered_tag_or_ciphertext_fails_authentication() {
        let c = cipher();
        let envelope = c.encrypt("123-45-6789").unwrap();
        for index in 1..=3 {
            let tampered = flip_field(&envelope, index);
            assert!(
                matches!(c.decrypt(&tampered), Err(CryptoError::AuthenticationFailed)),
                "field {index} tamper was not detected"
            );
        }
    }

    #[test]
    fn every_ciphertext_byte_is_covered_by_the_tag() {
        let c = cipher();
        let envelope = c.encrypt("abcdef").unwrap();
        let parts: Vec<&str> = envelope.split(':').collect();
        let ct = hex::decode(parts[3]).unwrap();
        for i in 0..ct.len() {
            let mut flipped = ct.clone();
            flipped[i] ^= 0x80;
            let tampered = format!("enc:{}:{}:{}", parts[1], parts[2], hex::encode(flipped));
            assert!(matches!(
                c.decrypt(&tampered),
                Err(CryptoError::AuthenticationFailed)
            ));
        }
    }

    #[test]
    fn wrong_secret_fails_authentication() {
        let envelope = cipher().encrypt("123-45-6789").unwrap();
        let other = FieldCipher::from_secret("rotated-secret").unwrap();
        assert!(matches!(
            other.decrypt(&envelope),
            Err(CryptoError::AuthenticationFailed)
        ));
    }

    #[test]
    fn malformed_envelopes_are_format_errors() {
        let c = cipher();
        let good = c.encrypt("x").unwrap();
        let parts: Vec<&str> = good.split(':').collect();
        let cases = [
            "enc:".to_string(),
            "enc:abcd".to_string(),
            format!("enc:{}:{}", parts[1], parts[2]),
            format!("{good}:extra"),
            format!("enc:zz{}:{}:{}", &parts[1][2..], parts[2], parts[3]),
            format!("enc:{}:{}:{}", &parts[1][2..], parts[2], parts[3]),
            format!("enc:{}:{}:{}", parts[1], &parts[2][2..], parts[3]),
        ];
        for case in &cases {
            assert!(
                matches!(c.decrypt(case), Err(CryptoError::InvalidFormat(_))),
                "expected format error for {case}"
            );
        }
    }

    #[test]
    fn key_derivation_is_deterministic() {
        let envelope = FieldCipher::from_secret("shared").unwrap().encrypt("v").unwrap();
        let again = FieldCipher::from_secret("shared").unwrap();
        assert_eq!(again.decrypt(&envelope).unwrap(), "v");
    }

    #[test]
    fn empty_secret_is_rejected() {
        assert!(matches!(
            FieldCipher::from_secret(""),
            Err(CryptoError::KeyDerivationFailed(_))
        ));
    }

    #[test]
    fn mask_tax_id_handles_plain_encrypted_and_short_values() {
        let c = cipher();
        assert_eq!(c.mask_tax_id(None).unwrap(), None);
        assert_eq!(c.mask_tax_id(Some("123456789")).unwrap().as_deref(), Some("6789"));
        let envelope = c.encrypt("987654321").unwrap();
        assert_eq!(c.mask_tax_id(Some(&envelope)).unwrap().as_deref(), Some("4321"));
        assert_eq!(c.mask_tax_id(Some("12")).unwrap().as_deref(), Some("12"));
    }

    #[test]
    fn debug_does_not_expose_key_material() {
        assert_eq!(format!("{:?}", cipher()), "FieldCipher { .. }");
    }
}
