//! Channel-name case folding.
//!
//! Channel names are folded to one canonical lowercase form at every
//! boundary: IRC `#General`, hub `General` and stored `general` all name the
//! same channel.

/// Channel prefix characters accepted from clients.
pub const CHANNEL_PREFIXES: &[char] = &['#', '&'];

/// Fold a channel name to its canonical form: trimmed, prefix stripped,
/// ASCII-lowercased.
pub fn canonical_channel(name: &str) -> String {
    name.trim()
        .trim_start_matches(CHANNEL_PREFIXES)
        .to_ascii_lowercase()
}

/// Render a canonical channel name for the wire (`general` -> `#general`).
pub fn irc_channel(canonical: &str) -> String {
    format!("#{}", canonical)
}

/// Whether a message target names a channel rather than a user.
pub fn is_channel_target(target: &str) -> bool {
    target.starts_with(CHANNEL_PREFIXES)
}

/// Case-insensitive nickname comparison.
pub fn nick_eq(a: &str, b: &str) -> bool {
    a.eq_ignore_ascii_case(b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn folds_prefix_and_case() {
        assert_eq!(canonical_channel("#General"), "general");
        assert_eq!(canonical_channel("  &Random "), "random");
        assert_eq!(canonical_channel("lobby"), "lobby");
    }

    #[test]
    fn renders_wire_form() {
        assert_eq!(irc_channel("general"), "#general");
    }

    #[test]
    fn detects_channel_targets() {
        assert!(is_channel_target("#general"));
        assert!(is_channel_target("&local"));
        assert!(!is_channel_target("alice"));
    }

    #[test]
    fn nick_comparison_ignores_case() {
        assert!(nick_eq("Alice", "alice"));
        assert!(!nick_eq("alice", "alicia"));
    }
}
