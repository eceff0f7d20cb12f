//! Line parsing and serialization.
//!
//! A line has the shape:
//!
//! ```text
//! [:prefix] <command> [params...] [:trailing]
//! ```
//!
//! The trailing parameter consumes the rest of the line verbatim, including
//! embedded colons and spaces. Comma-separated target lists are returned as a
//! single raw parameter; splitting them is the caller's job.

use std::fmt;
use std::str::FromStr;

use nom::{
    bytes::complete::take_while1,
    character::complete::{char, space0},
    combinator::opt,
    sequence::preceded,
    IResult,
};
use smallvec::SmallVec;

use crate::error::MessageParseError;
use crate::response::Response;

/// An owned protocol line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Message {
    /// Source of the line (`server.name` or `nick!user@host`).
    pub prefix: Option<String>,
    /// Command verb, uppercased on parse, or a three-digit numeric.
    pub command: String,
    /// Parameters, trailing parameter last.
    pub params: Vec<String>,
    /// Force the `:` marker on the last parameter when serializing.
    pub trailing: bool,
}

fn parse_prefix(input: &str) -> IResult<&str, &str> {
    preceded(char(':'), take_while1(|c| c != ' '))(input)
}

fn parse_command(input: &str) -> IResult<&str, &str> {
    take_while1(|c: char| c != ' ')(input)
}

/// Split the parameter section. Runs of spaces collapse into one separator.
fn parse_params(input: &str) -> (SmallVec<[&str; 8]>, bool) {
    let mut params: SmallVec<[&str; 8]> = SmallVec::new();
    let mut rest = input;
    let mut trailing = false;

    loop {
        rest = rest.trim_start_matches(' ');
        if rest.is_empty() {
            break;
        }

        if let Some(after_colon) = rest.strip_prefix(':') {
            params.push(after_colon);
            trailing = true;
            break;
        }

        let end = rest.find(' ').unwrap_or(rest.len());
        params.push(&rest[..end]);
        rest = &rest[end..];
    }

    (params, trailing)
}

fn parse_line(input: &str) -> IResult<&str, (Option<&str>, &str)> {
    let (input, prefix) = opt(parse_prefix)(input)?;
    let (input, _) = space0(input)?;
    let (input, command) = parse_command(input)?;
    Ok((input, (prefix, command)))
}

impl Message {
    /// Create a message without a prefix.
    pub fn new<C, I, P>(command: C, params: I) -> Self
    where
        C: Into<String>,
        I: IntoIterator<Item = P>,
        P: Into<String>,
    {
        Self {
            prefix: None,
            command: command.into(),
            params: params.into_iter().map(Into::into).collect(),
            trailing: false,
        }
    }

    /// Build a numeric reply from `server`.
    ///
    /// The last parameter is always sent as trailing, which is how servers
    /// conventionally render human-readable reply text.
    pub fn response(server: &str, response: Response, params: Vec<String>) -> Self {
        Self {
            prefix: Some(server.to_string()),
            command: response.code_str(),
            params,
            trailing: true,
        }
    }

    /// Set the prefix.
    #[must_use]
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    /// Mark the last parameter as trailing.
    #[must_use]
    pub fn with_trailing(mut self) -> Self {
        self.trailing = true;
        self
    }

    /// Parse one line. Trailing CR/LF is ignored.
    pub fn parse(line: &str) -> Result<Self, MessageParseError> {
        let line = line.trim_end_matches(['\r', '\n']);
        if line.trim().is_empty() {
            return Err(MessageParseError::EmptyMessage);
        }

        let (rest, (prefix, command)) = match parse_line(line) {
            Ok(parsed) => parsed,
            Err(_) => return Err(MessageParseError::MissingCommand),
        };

        if !command.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(MessageParseError::InvalidCommand(command.to_string()));
        }

        let (params, trailing) = parse_params(rest);

        Ok(Self {
            prefix: prefix.map(str::to_string),
            command: command.to_ascii_uppercase(),
            params: params.into_iter().map(str::to_string).collect(),
            trailing,
        })
    }

    /// Parameter at `index`, if present.
    pub fn arg(&self, index: usize) -> Option<&str> {
        self.params.get(index).map(String::as_str)
    }

    /// Number of parameters.
    pub fn arg_count(&self) -> usize {
        self.params.len()
    }
}

impl FromStr for Message {
    type Err = MessageParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Message::parse(s)
    }
}

impl fmt::Display for Message {
    /// Serialize without the CRLF terminator.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(prefix) = &self.prefix {
            write!(f, ":{} ", prefix)?;
        }
        f.write_str(&self.command)?;

        let Some((last, middle)) = self.params.split_last() else {
            return Ok(());
        };
        for param in middle {
            write!(f, " {}", param)?;
        }

        let needs_colon =
            self.trailing || last.is_empty() || last.contains(' ') || last.starts_with(':');
        if needs_colon {
            write!(f, " :{}", last)
        } else {
            write!(f, " {}", last)
        }
    }
}
