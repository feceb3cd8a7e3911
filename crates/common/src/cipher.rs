//! Per-paste encryption and decryption
//!
//! Content keys are bound to paste ids inside the [`KeyStore`], so callers
//! never handle key material. "No key for this paste" is an ordinary
//! outcome: a listing routinely mixes pastes this client wrote with pastes
//! it cannot read.

use std::fmt;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::crypto::{NONCE_SIZE, TAG_SIZE};
use crate::keystore::{KeyStore, KeyStoreError};

/// Leading byte of every envelope
pub const ENVELOPE_VERSION: u8 = 1;

/// Shown in place of a title when a paste cannot be decrypted
pub const DECRYPT_FAILED_SENTINEL: &str = "Error decrypting";
/// Shown in place of a title when a decrypted body is not the expected JSON
pub const MALFORMED_BODY_SENTINEL: &str = "Invalid JSON";

#[derive(Debug, thiserror::Error)]
pub enum CipherError {
    #[error("no content key for paste {0}")]
    KeyNotFound(String),
    #[error("failed to decrypt paste {0}")]
    Decryption(String),
    #[error("failed to encrypt paste: {0}")]
    Encryption(String),
    #[error("paste body is not valid: {0}")]
    MalformedBody(String),
    #[error("key store error: {0}")]
    KeyStore(#[from] KeyStoreError),
}

/// Why a title could not be shown for a listed paste
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TitleError {
    /// No content key for this paste here
    KeyNotFound,
    /// Key present but the envelope did not authenticate
    Decryption,
    /// Decrypted, but not a structured body
    MalformedBody,
}

impl TitleError {
    /// Display text substituted for the title
    pub fn sentinel(&self) -> &'static str {
        match self {
            TitleError::KeyNotFound | TitleError::Decryption => DECRYPT_FAILED_SENTINEL,
            TitleError::MalformedBody => MALFORMED_BODY_SENTINEL,
        }
    }
}

impl fmt::Display for TitleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.sentinel())
    }
}

impl From<&CipherError> for TitleError {
    fn from(err: &CipherError) -> Self {
        match err {
            CipherError::KeyNotFound(_) => TitleError::KeyNotFound,
            CipherError::MalformedBody(_) => TitleError::MalformedBody,
            _ => TitleError::Decryption,
        }
    }
}

/// Opaque sealed paste body
///
/// Layout: `version (1) || nonce (12) || ciphertext || tag (16)`,
/// carried as standard base64 on the wire.
#[derive(Clone, PartialEq, Eq)]
pub struct Envelope(Vec<u8>);

impl fmt::Debug for Envelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Envelope({} bytes)", self.0.len())
    }
}

impl Envelope {
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn to_base64(&self) -> String {
        STANDARD.encode(&self.0)
    }

    pub fn from_base64(encoded: &str) -> Result<Self, base64::DecodeError> {
        STANDARD.decode(encoded).map(Self)
    }
}

/// The structured plaintext of a paste
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PasteBody {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub body: String,
}

impl PasteBody {
    pub fn new(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
        }
    }

    pub fn to_json(&self) -> Result<Vec<u8>, CipherError> {
        serde_json::to_vec(self).map_err(|e| CipherError::MalformedBody(e.to_string()))
    }

    pub fn parse(plaintext: &[u8]) -> Result<Self, CipherError> {
        serde_json::from_slice(plaintext).map_err(|e| CipherError::MalformedBody(e.to_string()))
    }
}

/// Pull the `title` field out of a decrypted body. A body without one
/// has an empty title; only non-JSON or a non-string title is malformed.
pub fn extract_title(plaintext: &[u8]) -> Result<String, CipherError> {
    #[derive(Deserialize)]
    struct TitleOnly {
        #[serde(default)]
        title: String,
    }

    serde_json::from_slice::<TitleOnly>(plaintext)
        .map(|t| t.title)
        .map_err(|e| CipherError::MalformedBody(e.to_string()))
}

/// Encrypts and decrypts paste bodies with keys looked up by paste id
#[derive(Debug, Clone)]
pub struct PasteCipher {
    keys: KeyStore,
}

impl PasteCipher {
    pub fn new(keys: KeyStore) -> Self {
        Self { keys }
    }

    pub fn keys(&self) -> &KeyStore {
        &self.keys
    }

    /// Seal `plaintext` under the content key for `paste_id`, creating the
    /// key if this is the first time the paste is encrypted.
    pub async fn encrypt(&self, paste_id: &str, plaintext: &[u8]) -> Result<Envelope, CipherError> {
        let secret = self.keys.content_key_or_create(paste_id).await?;
        let sealed = secret
            .encrypt(plaintext)
            .map_err(|e| CipherError::Encryption(e.to_string()))?;

        let mut out = Vec::with_capacity(1 + sealed.len());
        out.push(ENVELOPE_VERSION);
        out.extend_from_slice(&sealed);
        Ok(Envelope(out))
    }

    /// Open an envelope for `paste_id`.
    ///
    /// # Errors
    ///
    /// - `KeyNotFound` if this client holds no key for the paste
    /// - `Decryption` if the envelope is malformed, was tampered with, or
    ///   was sealed under a different key
    pub fn decrypt(&self, paste_id: &str, envelope: &Envelope) -> Result<Vec<u8>, CipherError> {
        let secret = self
            .keys
            .lookup_content_key(paste_id)
            .ok_or_else(|| CipherError::KeyNotFound(paste_id.to_string()))?;

        let bytes = envelope.as_bytes();
        if bytes.len() < 1 + NONCE_SIZE + TAG_SIZE || bytes[0] != ENVELOPE_VERSION {
            return Err(CipherError::Decryption(paste_id.to_string()));
        }

        secret
            .decrypt(&bytes[1..])
            .map_err(|_| CipherError::Decryption(paste_id.to_string()))
    }

    /// Decrypt a base64 envelope as it arrives from the server
    pub fn decrypt_base64(&self, paste_id: &str, encoded: &str) -> Result<Vec<u8>, CipherError> {
        // check for the key first so foreign pastes report KeyNotFound
        if self.keys.lookup_content_key(paste_id).is_none() {
            return Err(CipherError::KeyNotFound(paste_id.to_string()));
        }
        let envelope = Envelope::from_base64(encoded)
            .map_err(|_| CipherError::Decryption(paste_id.to_string()))?;
        self.decrypt(paste_id, &envelope)
    }

    /// Decrypt and extract the title, collapsing every failure into the
    /// per-item [`TitleError`] used for listings.
    pub fn title(&self, paste_id: &str, encoded: &str) -> Result<String, TitleError> {
        let plaintext = self
            .decrypt_base64(paste_id, encoded)
            .map_err(|e| TitleError::from(&e))?;
        extract_title(&plaintext).map_err(|e| TitleError::from(&e))
    }
}
