//! Rendering chat messages as IRC lines.
//!
//! Text is split into wire-sized `PRIVMSG` chunks. Embeds follow as extra
//! lines: link previews as a title line plus a truncated description, images
//! as a header plus their color-art rows, files and audio as one annotated
//! line each.

use echohub_proto::{Message, irc_channel, is_blank_row, markup_to_irc, split_message};

use crate::chat::{ChatMessage, Embed};
use crate::config::LimitsConfig;

const ELLIPSIS: &str = "...";

/// Most lines one message renders to, truncation marker included.
pub const MAX_RENDERED_LINES: usize = 64;

#[derive(Debug, Clone)]
pub struct IrcFormatter {
    host_tag: String,
    split_bytes: usize,
    preview_chars: usize,
    max_art_rows: usize,
}

impl IrcFormatter {
    pub fn new(host_tag: &str, limits: &LimitsConfig) -> Self {
        Self {
            host_tag: host_tag.to_string(),
            split_bytes: limits.split_bytes,
            preview_chars: limits.preview_description_chars,
            max_art_rows: limits.max_art_rows,
        }
    }

    pub fn host_tag(&self) -> &str {
        &self.host_tag
    }

    /// `user!user@host` prefix for lines sent on behalf of `username`.
    pub fn user_prefix(&self, username: &str) -> String {
        format!("{0}!{0}@{1}", username, self.host_tag)
    }

    /// Render `message` with already-opened `plaintext` content.
    pub fn render(&self, message: &ChatMessage, plaintext: &str) -> Vec<Message> {
        let prefix = self.user_prefix(&message.username);
        let target = irc_channel(&message.channel);
        let privmsg = |text: String| {
            Message::new("PRIVMSG", [target.clone(), text])
                .with_prefix(prefix.clone())
                .with_trailing()
        };

        let mut lines: Vec<Message> = split_message(plaintext, self.split_bytes)
            .into_iter()
            .filter(|chunk| !chunk.is_empty())
            .map(&privmsg)
            .collect();

        if let Some(embed) = &message.embed {
            lines.extend(self.embed_lines(embed).into_iter().map(&privmsg));
        }

        if lines.len() > MAX_RENDERED_LINES {
            let dropped = lines.len() - (MAX_RENDERED_LINES - 1);
            lines.truncate(MAX_RENDERED_LINES - 1);
            lines.push(privmsg(format!("[... {} more lines]", dropped)));
        }
        lines
    }

    fn embed_lines(&self, embed: &Embed) -> Vec<String> {
        match embed {
            Embed::Link {
                url,
                title,
                description,
                site_name,
            } => {
                let mut lines = Vec::with_capacity(2);
                let header = match (title, site_name) {
                    (Some(title), Some(site)) => format!("[Link] {} - {}", title, site),
                    (Some(title), None) => format!("[Link] {}", title),
                    (None, _) => format!("[Link] {}", url),
                };
                lines.push(header);
                if let Some(description) = description {
                    lines.push(truncate_chars(description, self.preview_chars));
                }
                lines
            }
            Embed::Image { name, url, art } => {
                let rows: Vec<&String> = art.iter().filter(|row| !is_blank_row(row)).collect();
                let mut lines = Vec::with_capacity(rows.len().min(self.max_art_rows) + 2);
                lines.push(format!("[Image: {}] {}", name, url));
                lines.extend(
                    rows.iter()
                        .take(self.max_art_rows)
                        .map(|row| truncate_bytes(markup_to_irc(row), self.split_bytes)),
                );
                if rows.len() > self.max_art_rows {
                    lines.push(format!("[... {} more rows]", rows.len() - self.max_art_rows));
                }
                lines
            }
            Embed::File { name, url, size } => {
                let mut line = format!("[File: {}] {}", name, url);
                if let Some(size) = size {
                    line.push_str(&format!(" ({})", human_size(*size)));
                }
                vec![line]
            }
            Embed::Audio {
                name,
                url,
                duration_secs,
            } => {
                let mut line = format!("[Audio: {}] {}", name, url);
                if let Some(secs) = duration_secs {
                    line.push_str(&format!(" ({}:{:02})", secs / 60, secs % 60));
                }
                vec![line]
            }
        }
    }
}

/// Cut `text` to `max` characters, marking the cut with an ellipsis.
fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max).collect();
    out.truncate(out.trim_end().len());
    out.push_str(ELLIPSIS);
    out
}

/// Cut `text` to at most `max` bytes on a character boundary.
fn truncate_bytes(mut text: String, max: usize) -> String {
    if text.len() > max {
        let mut end = max;
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        text.truncate(end);
    }
    text
}

fn human_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} B", bytes)
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}
