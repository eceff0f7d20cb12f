//! SASL PLAIN payload handling (RFC 4616).
//!
//! A PLAIN payload is `authzid NUL authcid NUL password`, base64-encoded.
//! Clients send it via `AUTHENTICATE` in chunks of [`SASL_CHUNK_SIZE`] bytes;
//! a chunk shorter than that (or a lone `+`) terminates the payload.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};

use crate::error::SaslError;

/// Maximum length of a single AUTHENTICATE chunk.
pub const SASL_CHUNK_SIZE: usize = 400;

/// Decoded PLAIN credentials.
#[derive(Clone, PartialEq, Eq)]
pub struct SaslPlain {
    pub authzid: String,
    pub authcid: String,
    pub password: String,
}

impl std::fmt::Debug for SaslPlain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SaslPlain")
            .field("authzid", &self.authzid)
            .field("authcid", &self.authcid)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Supported mechanisms.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SaslMechanism {
    Plain,
    Unknown(String),
}

impl SaslMechanism {
    pub fn parse(name: &str) -> Self {
        if name.eq_ignore_ascii_case("PLAIN") {
            Self::Plain
        } else {
            Self::Unknown(name.to_owned())
        }
    }
}

/// Decode a base64 PLAIN payload.
pub fn decode_plain(payload: &str) -> Result<SaslPlain, SaslError> {
    let raw = BASE64
        .decode(payload.trim())
        .map_err(|_| SaslError::InvalidBase64)?;

    let mut fields = raw.split(|&b| b == 0);
    let (Some(authzid), Some(authcid), Some(password), None) =
        (fields.next(), fields.next(), fields.next(), fields.next())
    else {
        return Err(SaslError::InvalidFormat);
    };

    let to_string = |bytes: &[u8]| {
        std::str::from_utf8(bytes)
            .map(str::to_owned)
            .map_err(|_| SaslError::InvalidUtf8)
    };

    let authcid = to_string(authcid)?;
    if authcid.is_empty() {
        return Err(SaslError::EmptyAuthcid);
    }

    Ok(SaslPlain {
        authzid: to_string(authzid)?,
        authcid,
        password: to_string(password)?,
    })
}

/// Encode PLAIN credentials with an empty authzid.
pub fn encode_plain(username: &str, password: &str) -> String {
    BASE64.encode(format!("\0{}\0{}", username, password).as_bytes())
}

/// True when a chunk ends the payload (shorter than a full chunk, or `+`).
pub fn is_final_chunk(chunk: &str) -> bool {
    chunk == "+" || chunk.len() < SASL_CHUNK_SIZE
}
