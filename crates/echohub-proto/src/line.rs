//! Line-based codec for tokio.
//!
//! Reads CRLF/LF-terminated lines. Unlike a strict IRC codec this one never
//! fails on content: invalid UTF-8 is decoded lossily and lines longer than
//! the limit are dropped whole. Only I/O errors surface.
//!
//! Encoding writes a [`Message`] followed by CRLF.

use bytes::{BufMut, BytesMut};
use std::fmt::Write as _;
use tokio_util::codec::{Decoder, Encoder};

use crate::error;
use crate::message::Message;

/// Default maximum line length in bytes, terminator included.
pub const DEFAULT_MAX_LINE: usize = 4096;

/// Lenient newline-terminated line decoder.
#[derive(Debug)]
pub struct LineCodec {
    /// Index of next byte to check for newline
    next_index: usize,
    max_len: usize,
    /// Set while skipping the remainder of an over-long line
    discarding: bool,
}

impl Default for LineCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl LineCodec {
    pub fn new() -> Self {
        Self::with_max_len(DEFAULT_MAX_LINE)
    }

    pub fn with_max_len(max_len: usize) -> Self {
        Self {
            next_index: 0,
            max_len,
            discarding: false,
        }
    }

    fn finish_line(line: &[u8]) -> String {
        String::from_utf8_lossy(line)
            .trim_end_matches(['\r', '\n'])
            .to_string()
    }
}

impl Decoder for LineCodec {
    type Item = String;
    type Error = error::ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> error::Result<Option<String>> {
        loop {
            let Some(offset) = src[self.next_index..].iter().position(|b| *b == b'\n') else {
                if src.len() > self.max_len {
                    src.clear();
                    self.discarding = true;
                    self.next_index = 0;
                } else {
                    self.next_index = src.len();
                }
                return Ok(None);
            };

            let line = src.split_to(self.next_index + offset + 1);
            self.next_index = 0;

            if self.discarding {
                self.discarding = false;
                continue;
            }
            if line.len() > self.max_len {
                continue;
            }

            return Ok(Some(Self::finish_line(&line)));
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> error::Result<Option<String>> {
        if let Some(line) = self.decode(src)? {
            return Ok(Some(line));
        }
        if src.is_empty() || self.discarding {
            src.clear();
            return Ok(None);
        }
        let rest = src.split_to(src.len());
        self.next_index = 0;
        Ok(Some(Self::finish_line(&rest)))
    }
}

impl Encoder<Message> for LineCodec {
    type Error = error::ProtocolError;

    fn encode(&mut self, msg: Message, dst: &mut BytesMut) -> error::Result<()> {
        let mut line = String::with_capacity(64);
        // Writing into a String cannot fail.
        let _ = write!(line, "{}", msg);
        // Strip embedded line breaks so one message is always one line.
        line.retain(|c| c != '\r' && c != '\n');
        dst.reserve(line.len() + 2);
        dst.put_slice(line.as_bytes());
        dst.put_slice(b"\r\n");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_with_crlf() {
        let mut codec = LineCodec::new();
        let mut buf = BytesMut::new();
        codec
            .encode(Message::new("PING", vec!["srv".into()]), &mut buf)
            .unwrap();
        assert_eq!(&buf[..], b"PING srv\r\n");
    }

    #[test]
    fn encode_strips_embedded_newlines() {
        let mut codec = LineCodec::new();
        let mut buf = BytesMut::new();
        let msg = Message::new("PRIVMSG", vec!["#a".into(), "one\r\ntwo".into()]);
        codec.encode(msg, &mut buf).unwrap();
        assert_eq!(&buf[..], b"PRIVMSG #a onetwo\r\n");
    }

    #[test]
    fn decodes_crlf_line() {
        let mut codec = LineCodec::new();
        let mut buf = BytesMut::from("PING :test\r\n");
        assert_eq!(codec.decode(&mut buf).unwrap(), Some("PING :test".to_string()));
        assert!(buf.is_empty());
    }

    #[test]
    fn decodes_bare_lf_line() {
        let mut codec = LineCodec::new();
        let mut buf = BytesMut::from("NICK a\nUSER b\n");
        assert_eq!(codec.decode(&mut buf).unwrap(), Some("NICK a".to_string()));
        assert_eq!(codec.decode(&mut buf).unwrap(), Some("USER b".to_string()));
        assert_eq!(codec.decode(&mut buf).unwrap(), None);
    }

    #[test]
    fn partial_line_waits() {
        let mut codec = LineCodec::new();
        let mut buf = BytesMut::from("PING :");
        assert_eq!(codec.decode(&mut buf).unwrap(), None);
        buf.extend_from_slice(b"x\r\n");
        assert_eq!(codec.decode(&mut buf).unwrap(), Some("PING :x".to_string()));
    }

    #[test]
    fn too_long_line_is_dropped() {
        let mut codec = LineCodec::with_max_len(10);
        let mut buf = BytesMut::from("this is way too long\nPING\n");
        assert_eq!(codec.decode(&mut buf).unwrap(), Some("PING".to_string()));
    }

    #[test]
    fn too_long_partial_is_discarded_until_newline() {
        let mut codec = LineCodec::with_max_len(8);
        let mut buf = BytesMut::from("0123456789abc");
        assert_eq!(codec.decode(&mut buf).unwrap(), None);
        buf.extend_from_slice(b"def\nOK\n");
        assert_eq!(codec.decode(&mut buf).unwrap(), Some("OK".to_string()));
    }

    #[test]
    fn invalid_utf8_is_lossy() {
        let mut codec = LineCodec::new();
        let mut buf = BytesMut::from(&b"PRIVMSG #a :\xff\xfe\r\n"[..]);
        let line = codec.decode(&mut buf).unwrap().unwrap();
        assert!(line.starts_with("PRIVMSG #a :"));
        assert!(line.contains('\u{FFFD}'));
    }

    #[test]
    fn eof_flushes_unterminated_line() {
        let mut codec = LineCodec::new();
        let mut buf = BytesMut::from("QUIT :bye");
        assert_eq!(codec.decode_eof(&mut buf).unwrap(), Some("QUIT :bye".to_string()));
        assert_eq!(codec.decode_eof(&mut buf).unwrap(), None);
    }
}
