//! Transport envelope for message content.
//!
//! Sealed text looks like `ENC:<b64 nonce>:<b64 ciphertext||tag>` and is
//! produced with AES-256-GCM. The key is the SHA-256 digest of the configured
//! secret. Text without the marker is legacy plaintext and opens to itself.

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use ring::aead::{AES_256_GCM, Aad, LessSafeKey, NONCE_LEN, Nonce, UnboundKey};
use ring::rand::{SecureRandom, SystemRandom};
use sha2::{Digest, Sha256};
use thiserror::Error;
use zeroize::Zeroize;

/// Prefix identifying sealed content.
pub const MARKER: &str = "ENC:";

/// Shown in place of content that cannot be opened.
pub const PLACEHOLDER: &str = "[unable to decrypt message]";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CryptoError {
    #[error("invalid envelope key")]
    Key,
    #[error("random source failure")]
    Random,
    #[error("encryption failed")]
    Seal,
    #[error("malformed envelope")]
    Malformed,
    #[error("decryption failed")]
    Open,
}

pub struct Envelope {
    key: LessSafeKey,
    rng: SystemRandom,
}

impl std::fmt::Debug for Envelope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Envelope").finish_non_exhaustive()
    }
}

impl Envelope {
    pub fn new(secret: &str) -> Result<Self, CryptoError> {
        let mut digest: [u8; 32] = Sha256::digest(secret.as_bytes()).into();
        let unbound = UnboundKey::new(&AES_256_GCM, &digest).map_err(|_| CryptoError::Key);
        digest.zeroize();

        Ok(Self {
            key: LessSafeKey::new(unbound?),
            rng: SystemRandom::new(),
        })
    }

    pub fn is_sealed(text: &str) -> bool {
        text.starts_with(MARKER)
    }

    /// Encrypt `plain` under a fresh random nonce.
    pub fn seal(&self, plain: &str) -> Result<String, CryptoError> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        self.rng
            .fill(&mut nonce_bytes)
            .map_err(|_| CryptoError::Random)?;

        let mut in_out = plain.as_bytes().to_vec();
        self.key
            .seal_in_place_append_tag(
                Nonce::assume_unique_for_key(nonce_bytes),
                Aad::empty(),
                &mut in_out,
            )
            .map_err(|_| CryptoError::Seal)?;

        Ok(format!(
            "{}{}:{}",
            MARKER,
            BASE64.encode(nonce_bytes),
            BASE64.encode(&in_out)
        ))
    }

    /// Decrypt sealed text. Unmarked text is returned unchanged.
    pub fn open(&self, text: &str) -> Result<String, CryptoError> {
        let Some(body) = text.strip_prefix(MARKER) else {
            return Ok(text.to_string());
        };

        let (nonce_b64, ct_b64) = body.split_once(':').ok_or(CryptoError::Malformed)?;
        let nonce_vec = BASE64.decode(nonce_b64).map_err(|_| CryptoError::Malformed)?;
        let nonce_bytes: [u8; NONCE_LEN] = nonce_vec
            .as_slice()
            .try_into()
            .map_err(|_| CryptoError::Malformed)?;
        let mut in_out = BASE64.decode(ct_b64).map_err(|_| CryptoError::Malformed)?;

        let plain = self
            .key
            .open_in_place(
                Nonce::assume_unique_for_key(nonce_bytes),
                Aad::empty(),
                &mut in_out,
            )
            .map_err(|_| CryptoError::Open)?;

        String::from_utf8(plain.to_vec()).map_err(|_| CryptoError::Malformed)
    }

    /// Like [`open`](Self::open), degrading failures to [`PLACEHOLDER`].
    pub fn open_or_placeholder(&self, text: &str) -> String {
        self.open(text).unwrap_or_else(|e| {
            tracing::debug!(error = %e, "Envelope could not be opened");
            PLACEHOLDER.to_string()
        })
    }
}

/// Remove every literal occurrence of the marker, including ones that only
/// appear after an inner occurrence is removed.
pub fn strip_marker(text: &str) -> String {
    let mut out = text.to_string();
    while out.contains(MARKER) {
        out = out.replace(MARKER, "");
    }
    out
}
