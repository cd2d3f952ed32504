//! Password encryption at rest, built on ChaCha20-Poly1305. The stored value
//! is a single base64 token (nonce, ciphertext, and auth tag) so it fits in
//! one dotenv entry, and the key lives in its own file next to the store.

use std::fs;
use std::path::{Path, PathBuf};

use base64::{engine::general_purpose::STANDARD_NO_PAD, Engine};
use chacha20poly1305::aead::{Aead, AeadCore, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use rand::rngs::OsRng;
use thiserror::Error;
use zeroize::Zeroize;

const KEY_LEN: usize = 32;
const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;

#[derive(Debug, Error)]
pub enum VaultError {
    #[error("key file unreadable: {0}")]
    KeyUnreadable(String),
    #[error("key file corrupt: {0}")]
    KeyCorrupt(String),
    #[error("key file unwritable: {0}")]
    KeyPersist(String),
    #[error("encryption failed: {0}")]
    Encrypt(String),
    #[error("decryption failed: {0}")]
    Decrypt(String),
}

/// Owns the symmetric key used to keep the stored password encrypted.
#[derive(Debug)]
pub struct PasswordVault {
    key: Key,
}

impl PasswordVault {
    fn from_key_bytes(bytes: &[u8]) -> Result<Self, VaultError> {
        if bytes.len() != KEY_LEN {
            return Err(VaultError::KeyCorrupt(format!(
                "expected {KEY_LEN} key bytes, found {}",
                bytes.len()
            )));
        }
        let mut key = Key::default();
        key.copy_from_slice(bytes);
        Ok(Self { key })
    }

    /// Loads the base64-encoded key from `path`, generating and persisting a
    /// fresh key on first use. An existing file that cannot be read or
    /// decoded is an error rather than a regeneration trigger: a new key
    /// would orphan every value encrypted under the old one.
    pub fn load_or_create(path: &Path) -> Result<Self, VaultError> {
        if !path.exists() {
            return Self::generate(path);
        }

        let content = fs::read_to_string(path)
            .map_err(|e| VaultError::KeyUnreadable(format!("{}: {e}", path.display())))?;
        let decoded = STANDARD_NO_PAD
            .decode(content.trim().as_bytes())
            .map_err(|e| VaultError::KeyCorrupt(format!("{e}")))?;
        Self::from_key_bytes(&decoded)
    }

    fn generate(path: &Path) -> Result<Self, VaultError> {
        let key = ChaCha20Poly1305::generate_key(&mut OsRng);
        let encoded = STANDARD_NO_PAD.encode(key.as_slice());

        // Temp-then-rename so a crash cannot leave a truncated key behind.
        let tmp = sibling_tmp(path);
        fs::write(&tmp, encoded.as_bytes())
            .map_err(|e| VaultError::KeyPersist(format!("{}: {e}", tmp.display())))?;
        fs::rename(&tmp, path)
            .map_err(|e| VaultError::KeyPersist(format!("{}: {e}", path.display())))?;

        Ok(Self { key })
    }

    /// Encrypts a plaintext password into a single base64 token laid out as
    /// nonce, ciphertext, auth tag.
    pub fn encrypt(&self, plaintext: &str) -> Result<String, VaultError> {
        let cipher = ChaCha20Poly1305::new(&self.key);
        let nonce = ChaCha20Poly1305::generate_nonce(&mut OsRng);
        let ciphertext = cipher
            .encrypt(&nonce, plaintext.as_bytes())
            .map_err(|e| VaultError::Encrypt(format!("{e}")))?;

        let mut token = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        token.extend_from_slice(&nonce);
        token.extend_from_slice(&ciphertext);
        Ok(STANDARD_NO_PAD.encode(&token))
    }

    /// Decrypts a stored token. Fails on key mismatch, truncation, or
    /// tampering; the caller decides whether that is fatal or grounds for
    /// re-prompting.
    pub fn decrypt(&self, token: &str) -> Result<String, VaultError> {
        let raw = STANDARD_NO_PAD
            .decode(token.trim().as_bytes())
            .map_err(|e| VaultError::Decrypt(format!("{e}")))?;
        if raw.len() < NONCE_LEN + TAG_LEN {
            return Err(VaultError::Decrypt(
                "token shorter than nonce and tag".to_string(),
            ));
        }

        let (nonce_bytes, ciphertext) = raw.split_at(NONCE_LEN);
        let cipher = ChaCha20Poly1305::new(&self.key);
        let plaintext = cipher
            .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
            .map_err(|e| VaultError::Decrypt(format!("{e}")))?;

        String::from_utf8(plaintext).map_err(|e| VaultError::Decrypt(format!("{e}")))
    }
}

impl Drop for PasswordVault {
    fn drop(&mut self) {
        // Zero the key material on drop to reduce its lifetime in memory.
        self.key.as_mut_slice().zeroize();
    }
}

fn sibling_tmp(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "key".into());
    name.push(".tmp");
    path.with_file_name(name)
}
