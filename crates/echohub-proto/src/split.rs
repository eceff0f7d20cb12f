//! Splitting long text into wire-sized chunks.
//!
//! Limits are measured in UTF-8 bytes, not characters. Cuts are made at the
//! last space at or before the limit and consume exactly that one space, so
//! `chunks.join(" ")` always reproduces the input. A single token longer than
//! the limit is emitted whole rather than cut mid-token.

/// Default chunk size in bytes.
pub const DEFAULT_SPLIT_BYTES: usize = 400;

/// Split `text` into chunks of at most `limit` UTF-8 bytes.
///
/// A limit of zero disables splitting.
pub fn split_message(text: &str, limit: usize) -> Vec<String> {
    if limit == 0 || text.len() <= limit {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut rest = text;

    while rest.len() > limit {
        let bytes = rest.as_bytes();

        // Spaces are ASCII, so every space index is a char boundary.
        let cut = bytes[1..=limit]
            .iter()
            .rposition(|&b| b == b' ')
            .map(|i| i + 1)
            .or_else(|| bytes[1..].iter().position(|&b| b == b' ').map(|i| i + 1));

        match cut {
            Some(idx) => {
                chunks.push(rest[..idx].to_string());
                rest = &rest[idx + 1..];
            }
            None => {
                chunks.push(rest.to_string());
                return chunks;
            }
        }
    }

    chunks.push(rest.to_string());
    chunks
}
