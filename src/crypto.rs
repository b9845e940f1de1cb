// src/crypto.rs
//! Symmetric cipher for the stored enrichment API key.
//!
//! The key never lives in the configuration in clear text: the config carries
//! base64(nonce || ciphertext) produced by `encrypt`, and the pipeline decrypts
//! it right before calling the enrichment API.

use aes_gcm::aead::{Aead, OsRng};
use aes_gcm::{AeadCore, Aes256Gcm, Key, KeyInit, Nonce};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use thiserror::Error;

const NONCE_LEN: usize = 12;

#[derive(Debug, Error)]
pub enum DecryptionError {
    #[error("cipher key must be 32 bytes of base64: {0}")]
    InvalidKey(String),
    #[error("ciphertext is malformed: {0}")]
    MalformedCiphertext(String),
    #[error("decryption failed: wrong key or corrupted payload")]
    Failed,
    #[error("decrypted payload is not valid UTF-8")]
    NotText,
}

pub struct ApiKeyCipher {
    cipher: Aes256Gcm,
}

impl ApiKeyCipher {
    /// Build a cipher from a base64-encoded 256-bit key.
    pub fn from_base64_key(key_b64: &str) -> Result<Self, DecryptionError> {
        let key_bytes = BASE64
            .decode(key_b64.trim())
            .map_err(|e| DecryptionError::InvalidKey(e.to_string()))?;

        if key_bytes.len() != 32 {
            return Err(DecryptionError::InvalidKey(format!(
                "expected 32 bytes, got {}",
                key_bytes.len()
            )));
        }

        let key = Key::<Aes256Gcm>::from_slice(&key_bytes);
        Ok(Self {
            cipher: Aes256Gcm::new(key),
        })
    }

    /// Decrypt base64(nonce || ciphertext) back into the plain API key.
    pub fn decrypt(&self, ciphertext_b64: &str) -> Result<String, DecryptionError> {
        let payload = BASE64
            .decode(ciphertext_b64.trim())
            .map_err(|e| DecryptionError::MalformedCiphertext(e.to_string()))?;

        if payload.len() <= NONCE_LEN {
            return Err(DecryptionError::MalformedCiphertext(format!(
                "payload too short: {} bytes",
                payload.len()
            )));
        }

        let (nonce, ciphertext) = payload.split_at(NONCE_LEN);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| DecryptionError::Failed)?;

        String::from_utf8(plaintext).map_err(|_| DecryptionError::NotText)
    }

    /// Encrypt a plain API key into the base64 form stored in config.yaml.
    /// Used by the `encrypt-key` CLI subcommand when provisioning.
    pub fn encrypt(&self, plaintext: &str) -> Result<String, DecryptionError> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext.as_bytes())
            .map_err(|_| DecryptionError::Failed)?;

        let mut payload = nonce.to_vec();
        payload.extend_from_slice(&ciphertext);
        Ok(BASE64.encode(payload))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_key() -> String {
        BASE64.encode([7u8; 32])
    }

    #[test]
    fn test_roundtrip() {
        let cipher = ApiKeyCipher::from_base64_key(&test_key()).unwrap();
        let encrypted = cipher.encrypt("sk-proxycurl-secret").unwrap();
        assert_eq!(cipher.decrypt(&encrypted).unwrap(), "sk-proxycurl-secret");
    }

    #[test]
    fn test_rejects_short_key() {
        let short = BASE64.encode([1u8; 16]);
        assert!(matches!(
            ApiKeyCipher::from_base64_key(&short),
            Err(DecryptionError::InvalidKey(_))
        ));
    }

    #[test]
    fn test_rejects_garbage_ciphertext() {
        let cipher = ApiKeyCipher::from_base64_key(&test_key()).unwrap();
        assert!(matches!(
            cipher.decrypt("not base64!!"),
            Err(DecryptionError::MalformedCiphertext(_))
        ));
        assert!(matches!(
            cipher.decrypt(&BASE64.encode([0u8; 4])),
            Err(DecryptionError::MalformedCiphertext(_))
        ));
    }

    #[test]
    fn test_rejects_wrong_key() {
        let cipher = ApiKeyCipher::from_base64_key(&test_key()).unwrap();
        let other = ApiKeyCipher::from_base64_key(&BASE64.encode([9u8; 32])).unwrap();
        let encrypted = cipher.encrypt("secret").unwrap();
        assert!(matches!(other.decrypt(&encrypted), Err(DecryptionError::Failed)));
    }
}
