//! Reversible encryption of source database passwords at rest.

use crate::error::SyncError;
use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chacha20poly1305::aead::Aead;
use chacha20poly1305::{ChaCha20Poly1305, KeyInit, Nonce};
use uuid::Uuid;

const ENVELOPE_PREFIX: &str = "enc:v1:";

#[derive(Clone)]
pub struct SecretCodec {
    key: [u8; 32],
}

impl SecretCodec {
    pub fn new(key: [u8; 32]) -> Self {
        Self { key }
    }

    /// Encrypts `plaintext` into an `enc:v1:<nonce>:<ciphertext>` envelope.
    pub fn encrypt(&self, plaintext: &str) -> Result<String, SyncError> {
        let nonce_source = Uuid::new_v4().as_bytes().to_owned();
        let nonce = Nonce::from_slice(&nonce_source[..12]);
        let aead = self.cipher()?;
        let ciphertext = aead
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|error| SyncError::Secret(format!("failed to encrypt: {error}")))?;

        Ok(format!(
            "{ENVELOPE_PREFIX}{}:{}",
            URL_SAFE_NO_PAD.encode(&nonce_source[..12]),
            URL_SAFE_NO_PAD.encode(ciphertext)
        ))
    }

    pub fn decrypt(&self, stored: &str) -> Result<String, SyncError> {
        let Some(body) = stored.strip_prefix(ENVELOPE_PREFIX) else {
            return Err(SyncError::Secret("value is not an encrypted envelope".to_string()));
        };
        let Some((nonce_b64, ciphertext_b64)) = body.split_once(':') else {
            return Err(SyncError::Secret("envelope is invalid".to_string()));
        };

        let nonce_raw = URL_SAFE_NO_PAD
            .decode(nonce_b64.as_bytes())
            .map_err(|error| SyncError::Secret(format!("failed to decode nonce: {error}")))?;
        if nonce_raw.len() != 12 {
            return Err(SyncError::Secret("nonce length is invalid".to_string()));
        }
        let ciphertext = URL_SAFE_NO_PAD
            .decode(ciphertext_b64.as_bytes())
            .map_err(|error| SyncError::Secret(format!("failed to decode payload: {error}")))?;

        let decrypted = self
            .cipher()?
            .decrypt(Nonce::from_slice(&nonce_raw), ciphertext.as_ref())
            .map_err(|error| SyncError::Secret(format!("failed to decrypt: {error}")))?;
        String::from_utf8(decrypted)
            .map_err(|error| SyncError::Secret(format!("plaintext is invalid utf8: {error}")))
    }

    fn cipher(&self) -> Result<ChaCha20Poly1305, SyncError> {
        ChaCha20Poly1305::new_from_slice(&self.key)
            .map_err(|error| SyncError::Secret(format!("failed to initialize cipher: {error}")))
    }
}
