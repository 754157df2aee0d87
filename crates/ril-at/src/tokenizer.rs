//! Typed tokenizer for AT response lines.
//!
//! Information responses look like `+PREFIX: a,"b",,0x1F`. [`Fields`] strips
//! everything up to and including the first `:`, splits the remainder on
//! commas outside of double quotes, and hands fields out one at a time as
//! typed values. Grammar parsers for individual commands are written against
//! this cursor instead of scanning strings by hand.

use ril_core::error::{Error, Result};

/// A single field of a response line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Token<'a> {
    /// Unquoted decimal integer.
    Int(i64),
    /// Double-quoted string, quotes removed.
    Quoted(&'a str),
    /// Any other unquoted text (hex values, bare words).
    Bare(&'a str),
    /// Nothing between two commas.
    Empty,
}

#[derive(Debug, Clone, Copy)]
struct RawField<'a> {
    text: &'a str,
    quoted: bool,
}

impl<'a> RawField<'a> {
    fn token(self) -> Token<'a> {
        if self.quoted {
            Token::Quoted(self.text)
        } else if self.text.is_empty() {
            Token::Empty
        } else if let Ok(v) = self.text.parse::<i64>() {
            Token::Int(v)
        } else {
            Token::Bare(self.text)
        }
    }
}

/// Cursor over the comma-separated fields of one response line.
#[derive(Debug, Clone)]
pub struct Fields<'a> {
    line: &'a str,
    fields: Vec<RawField<'a>>,
    pos: usize,
}

impl<'a> Fields<'a> {
    /// Tokenize the part of `line` after its `+PREFIX:` header.
    pub fn parse(line: &'a str) -> Result<Self> {
        let colon = line
            .find(':')
            .ok_or_else(|| Error::InvalidResponse(format!("no ':' in {line:?}")))?;
        Self::split(line, &line[colon + 1..])
    }

    /// Tokenize a line with no header (numeric responses, raw lists).
    pub fn parse_bare(line: &'a str) -> Result<Self> {
        Self::split(line, line)
    }

    fn split(line: &'a str, body: &'a str) -> Result<Self> {
        let mut fields = Vec::new();
        let body = body.trim();
        if body.is_empty() {
            return Ok(Self {
                line,
                fields,
                pos: 0,
            });
        }

        let mut rest = body;
        loop {
            let trimmed = rest.trim_start();
            let (field, after) = if let Some(inner) = trimmed.strip_prefix('"') {
                let close = inner
                    .find('"')
                    .ok_or_else(|| Error::InvalidResponse(format!("unterminated quote in {line:?}")))?;
                let after = inner[close + 1..].trim_start();
                (
                    RawField {
                        text: &inner[..close],
                        quoted: true,
                    },
                    after,
                )
            } else {
                let end = trimmed.find(',').unwrap_or(trimmed.len());
                (
                    RawField {
                        text: trimmed[..end].trim_end(),
                        quoted: false,
                    },
                    &trimmed[end..],
                )
            };
            fields.push(field);

            match after.strip_prefix(',') {
                Some(next) => rest = next,
                None if after.is_empty() => break,
                None => {
                    return Err(Error::InvalidResponse(format!(
                        "garbage after quoted field in {line:?}"
                    )))
                }
            }
        }

        Ok(Self {
            line,
            fields,
            pos: 0,
        })
    }

    /// Total number of fields on the line.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether the line carried no fields at all.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Whether unread fields remain.
    pub fn has_more(&self) -> bool {
        self.pos < self.fields.len()
    }

    /// The next field without consuming it.
    pub fn peek(&self) -> Option<Token<'a>> {
        self.fields.get(self.pos).map(|f| f.token())
    }

    /// Consume the next field as a typed token.
    pub fn next_token(&mut self) -> Result<Token<'a>> {
        self.next_raw().map(RawField::token)
    }

    /// Skip one field.
    pub fn skip(&mut self) -> Result<()> {
        self.next_raw().map(|_| ())
    }

    /// Consume the next field as a decimal integer.
    pub fn next_int(&mut self) -> Result<i64> {
        let raw = self.next_raw()?;
        raw.text
            .trim()
            .parse()
            .map_err(|_| self.bad("integer", raw.text))
    }

    /// Consume the next field as a hexadecimal integer, quoted or not.
    pub fn next_hex(&mut self) -> Result<u32> {
        let raw = self.next_raw()?;
        let text = raw.text.trim();
        let digits = text
            .strip_prefix("0x")
            .or_else(|| text.strip_prefix("0X"))
            .unwrap_or(text);
        u32::from_str_radix(digits, 16).map_err(|_| self.bad("hex integer", raw.text))
    }

    /// Consume the next field as a string, quoted or not.
    pub fn next_str(&mut self) -> Result<&'a str> {
        self.next_raw().map(|raw| raw.text)
    }

    /// Consume the next field as a `0`/`1` flag.
    pub fn next_bool(&mut self) -> Result<bool> {
        match self.next_int()? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(self.bad("boolean", &other.to_string())),
        }
    }

    fn next_raw(&mut self) -> Result<RawField<'a>> {
        let field = self
            .fields
            .get(self.pos)
            .copied()
            .ok_or_else(|| Error::InvalidResponse(format!("missing field {} in {:?}", self.pos, self.line)))?;
        self.pos += 1;
        Ok(field)
    }

    fn bad(&self, what: &str, text: &str) -> Error {
        Error::InvalidResponse(format!("expected {what}, got {text:?} in {:?}", self.line))
    }
}
