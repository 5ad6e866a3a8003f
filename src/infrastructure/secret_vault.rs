//! ChaCha20-Poly1305 sealing for stored account secrets
//!
//! Sealed values look like `enc:v1:{nonce}:{ciphertext}` with URL-safe base64
//! (no padding). Anything without the `enc:v1:` prefix is treated as legacy
//! plaintext and returned unchanged by `open`.

use base64::Engine;
use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use chacha20poly1305::aead::{Aead, AeadCore, KeyInit, OsRng};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use thiserror::Error;

use crate::domain::SecretVault;

const ENVELOPE_PREFIX: &str = "enc:v1:";
const KEY_LEN: usize = 32;
const NONCE_LEN: usize = 12;

#[derive(Debug, Error)]
pub enum VaultError {
    #[error("secret key is not valid base64: {0}")]
    KeyEncoding(#[from] base64::DecodeError),

    #[error("secret key must be {KEY_LEN} bytes, got {0}")]
    KeyLength(usize),

    #[error("sealed secret envelope is invalid")]
    Envelope,

    #[error("failed to encrypt secret")]
    Encrypt,

    #[error("failed to decrypt secret (wrong key or tampered value)")]
    Decrypt,

    #[error("decrypted secret is not valid utf8")]
    Utf8(#[from] std::string::FromUtf8Error),
}

pub struct ChaChaSecretVault {
    cipher: ChaCha20Poly1305,
}

impl ChaChaSecretVault {
    /// Build from a standard base64 encoded 32-byte key.
    pub fn from_base64_key(encoded: &str) -> Result<Self, VaultError> {
        let raw = STANDARD.decode(encoded.trim())?;
        if raw.len() != KEY_LEN {
            return Err(VaultError::KeyLength(raw.len()));
        }
        Ok(Self {
            cipher: ChaCha20Poly1305::new(Key::from_slice(&raw)),
        })
    }

    /// Fresh random key, base64 encoded, suitable for `security.secret_key`.
    pub fn generate_key() -> String {
        STANDARD.encode(ChaCha20Poly1305::generate_key(&mut OsRng))
    }

    pub fn is_sealed(value: &str) -> bool {
        value.starts_with(ENVELOPE_PREFIX)
    }

    fn seal_value(&self, plaintext: &str) -> Result<String, VaultError> {
        let nonce = ChaCha20Poly1305::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext.as_bytes())
            .map_err(|_| VaultError::Encrypt)?;
        Ok(format!(
            "{ENVELOPE_PREFIX}{}:{}",
            URL_SAFE_NO_PAD.encode(nonce),
            URL_SAFE_NO_PAD.encode(ciphertext)
        ))
    }

    fn open_value(&self, stored: &str) -> Result<String, VaultError> {
        let Some(body) = stored.strip_prefix(ENVELOPE_PREFIX) else {
            return Ok(stored.to_string());
        };
        let (nonce_b64, ciphertext_b64) = body.split_once(':').ok_or(VaultError::Envelope)?;
        if ciphertext_b64.contains(':') {
            return Err(VaultError::Envelope);
        }

        let nonce_raw = URL_SAFE_NO_PAD
            .decode(nonce_b64)
            .map_err(|_| VaultError::Envelope)?;
        if nonce_raw.len() != NONCE_LEN {
            return Err(VaultError::Envelope);
        }
        let ciphertext = URL_SAFE_NO_PAD
            .decode(ciphertext_b64)
            .map_err(|_| VaultError::Envelope)?;

        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(&nonce_raw), ciphertext.as_ref())
            .map_err(|_| VaultError::Decrypt)?;
        Ok(String::from_utf8(plaintext)?)
    }
}

impl SecretVault for ChaChaSecretVault {
    fn seal(&self, plaintext: &str) -> anyhow::Result<String> {
        Ok(self.seal_value(plaintext)?)
    }

    fn open(&self, sealed: &str) -> anyhow::Result<String> {
        Ok(self.open_value(sealed)?)
    }
}
