//! Color markup transcoding.
//!
//! Internally, colored text (ASCII art rows) uses a printable markup:
//!
//! - `{F:RRGGBB}` sets the foreground color
//! - `{B:RRGGBB}` sets the background color
//! - `{X}` resets all formatting
//!
//! On the wire these become mIRC color codes (0x03) using the nearest of the
//! sixteen standard palette entries, and 0x0F for reset. Markup that does not
//! match exactly is left as literal text.

/// Color control character.
pub const COLOR: char = '\x03';
/// Reset control character.
pub const RESET: char = '\x0F';
/// The "default color" code understood by modern clients.
const DEFAULT_COLOR: u8 = 99;

/// The sixteen standard mIRC palette colors, indexed by code.
const PALETTE: [(u8, u8, u8); 16] = [
    (0xFF, 0xFF, 0xFF), // 0 white
    (0x00, 0x00, 0x00), // 1 black
    (0x00, 0x00, 0x7F), // 2 blue
    (0x00, 0x93, 0x00), // 3 green
    (0xFF, 0x00, 0x00), // 4 red
    (0x7F, 0x00, 0x00), // 5 brown
    (0x9C, 0x00, 0x9C), // 6 purple
    (0xFC, 0x7F, 0x00), // 7 orange
    (0xFF, 0xFF, 0x00), // 8 yellow
    (0x00, 0xFC, 0x00), // 9 light green
    (0x00, 0x93, 0x93), // 10 cyan
    (0x00, 0xFF, 0xFF), // 11 light cyan
    (0x00, 0x00, 0xFC), // 12 light blue
    (0xFF, 0x00, 0xFF), // 13 pink
    (0x7F, 0x7F, 0x7F), // 14 grey
    (0xD2, 0xD2, 0xD2), // 15 light grey
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Markup {
    Foreground(u8),
    Background(u8),
    Reset,
}

fn parse_hex_rgb(hex: &str) -> Option<(u8, u8, u8)> {
    if hex.len() != 6 || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    let r = u8::from_str_radix(&hex[0..2], 16).ok()?;
    let g = u8::from_str_radix(&hex[2..4], 16).ok()?;
    let b = u8::from_str_radix(&hex[4..6], 16).ok()?;
    Some((r, g, b))
}

/// Nearest palette index for an RGB color (squared Euclidean distance).
pub fn nearest_palette_color(r: u8, g: u8, b: u8) -> u8 {
    let distance = |&(pr, pg, pb): &(u8, u8, u8)| {
        let dr = i32::from(pr) - i32::from(r);
        let dg = i32::from(pg) - i32::from(g);
        let db = i32::from(pb) - i32::from(b);
        dr * dr + dg * dg + db * db
    };

    PALETTE
        .iter()
        .enumerate()
        .min_by_key(|(_, rgb)| distance(rgb))
        .map(|(idx, _)| idx as u8)
        .unwrap_or(DEFAULT_COLOR)
}

/// Try to read one markup token at the start of `s`, returning it and its byte length.
fn parse_markup(s: &str) -> Option<(Markup, usize)> {
    if s.starts_with("{X}") {
        return Some((Markup::Reset, 3));
    }
    let kind = s.get(0..3)?;
    if s.as_bytes().get(9) != Some(&b'}') {
        return None;
    }
    let (r, g, b) = parse_hex_rgb(s.get(3..9)?)?;
    let code = nearest_palette_color(r, g, b);
    match kind {
        "{F:" => Some((Markup::Foreground(code), 10)),
        "{B:" => Some((Markup::Background(code), 10)),
        _ => None,
    }
}

/// Transcode internal color markup into wire color escapes.
pub fn markup_to_irc(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut fg: Option<u8> = None;
    let mut bg: Option<u8> = None;
    let mut rest = input;

    while let Some(pos) = rest.find('{') {
        out.push_str(&rest[..pos]);
        rest = &rest[pos..];

        match parse_markup(rest) {
            Some((markup, len)) => {
                match markup {
                    Markup::Foreground(code) => {
                        fg = Some(code);
                        push_color(&mut out, code, bg);
                    }
                    Markup::Background(code) => {
                        bg = Some(code);
                        push_color(&mut out, fg.unwrap_or(DEFAULT_COLOR), Some(code));
                    }
                    Markup::Reset => {
                        fg = None;
                        bg = None;
                        out.push(RESET);
                    }
                }
                rest = &rest[len..];
            }
            None => {
                out.push('{');
                rest = &rest[1..];
            }
        }
    }

    out.push_str(rest);
    out
}

fn push_color(out: &mut String, fg: u8, bg: Option<u8>) {
    out.push(COLOR);
    out.push_str(&format!("{:02}", fg));
    if let Some(bg) = bg {
        out.push_str(&format!(",{:02}", bg));
    }
}

/// Remove all markup tokens, leaving only the visible text.
pub fn strip_markup(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(pos) = rest.find('{') {
        out.push_str(&rest[..pos]);
        rest = &rest[pos..];
        match parse_markup(rest) {
            Some((_, len)) => rest = &rest[len..],
            None => {
                out.push('{');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

/// A row is blank when nothing visible remains after stripping markup.
pub fn is_blank_row(row: &str) -> bool {
    strip_markup(row).trim().is_empty()
}
