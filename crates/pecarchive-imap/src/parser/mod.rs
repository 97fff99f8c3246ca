//! Sans-I/O response parser.
//!
//! Parses one complete server response as produced by
//! [`FramedStream::read_response`](crate::connection::FramedStream::read_response):
//! the response line with any literals already spliced in. Only the
//! responses the archiver acts on are decoded in detail; everything else is
//! surfaced as [`UntaggedResponse::Other`].

#![allow(clippy::missing_errors_doc)]

use crate::types::{Status, Tag, Uid};
use crate::{Error, Result};

/// A parsed server response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// Tagged response (command completion).
    Tagged {
        /// The command tag.
        tag: Tag,
        /// Completion status.
        status: Status,
        /// Response code text inside `[...]`, if any.
        code: Option<String>,
        /// Human-readable text.
        text: String,
    },
    /// Untagged response (server data).
    Untagged(UntaggedResponse),
    /// Continuation request.
    Continuation {
        /// Text following `+`.
        text: String,
    },
}

/// Untagged server data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UntaggedResponse {
    /// `* OK|NO|BAD|PREAUTH|BYE [code] text`.
    Status {
        /// Status keyword.
        status: Status,
        /// Response code text inside `[...]`, if any.
        code: Option<String>,
        /// Human-readable text.
        text: String,
    },
    /// `* CAPABILITY ...`.
    Capability(Vec<String>),
    /// `* n EXISTS`.
    Exists(u32),
    /// `* n RECENT`.
    Recent(u32),
    /// `* SEARCH uid uid ...`.
    Search(Vec<Uid>),
    /// `* n FETCH (...)`.
    Fetch {
        /// Message sequence number.
        seq: u32,
        /// Decoded fetch attributes.
        data: FetchData,
    },
    /// Any other untagged response, kept as text.
    Other(String),
}

/// Attributes decoded from a FETCH response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchData {
    /// `UID` attribute.
    pub uid: Option<Uid>,
    /// Full message from `BODY[]` (or `RFC822`).
    pub body: Option<Vec<u8>>,
}

/// Response parser.
pub struct ResponseParser;

impl ResponseParser {
    /// Parses a complete response.
    pub fn parse(input: &[u8]) -> Result<Response> {
        let mut cursor = Cursor::new(input);

        match cursor.peek() {
            Some(b'*') => {
                cursor.advance(1);
                cursor.expect(b' ')?;
                Self::parse_untagged(&mut cursor).map(Response::Untagged)
            }
            Some(b'+') => {
                cursor.advance(1);
                cursor.skip_spaces();
                Ok(Response::Continuation {
                    text: cursor.rest_of_line(),
                })
            }
            Some(_) => Self::parse_tagged(&mut cursor),
            None => Err(cursor.error("empty response")),
        }
    }

    fn parse_tagged(cursor: &mut Cursor<'_>) -> Result<Response> {
        let tag = cursor.atom()?;
        cursor.expect(b' ')?;
        let keyword = cursor.atom()?;
        let status = Status::parse(&keyword)
            .ok_or_else(|| cursor.error(format!("unknown status {keyword}")))?;
        let (code, text) = Self::parse_resp_text(cursor);

        Ok(Response::Tagged {
            tag: Tag::new(tag),
            status,
            code,
            text,
        })
    }

    fn parse_untagged(cursor: &mut Cursor<'_>) -> Result<UntaggedResponse> {
        let first = cursor.atom()?;

        if let Some(status) = Status::parse(&first) {
            let (code, text) = Self::parse_resp_text(cursor);
            return Ok(UntaggedResponse::Status { status, code, text });
        }

        if first.eq_ignore_ascii_case("CAPABILITY") {
            let caps = cursor
                .rest_of_line()
                .split_whitespace()
                .map(str::to_string)
                .collect();
            return Ok(UntaggedResponse::Capability(caps));
        }

        if first.eq_ignore_ascii_case("SEARCH") {
            return Ok(UntaggedResponse::Search(Self::parse_search(cursor)));
        }

        if let Ok(number) = first.parse::<u32>() {
            cursor.expect(b' ')?;
            let kind = cursor.atom()?.to_ascii_uppercase();
            return match kind.as_str() {
                "EXISTS" => Ok(UntaggedResponse::Exists(number)),
                "RECENT" => Ok(UntaggedResponse::Recent(number)),
                "FETCH" => {
                    cursor.expect(b' ')?;
                    let data = Self::parse_fetch(cursor)?;
                    Ok(UntaggedResponse::Fetch { seq: number, data })
                }
                _ => Ok(UntaggedResponse::Other(format!(
                    "{number} {kind}{}",
                    cursor.rest_of_line()
                ))),
            };
        }

        Ok(UntaggedResponse::Other(format!(
            "{first}{}",
            cursor.rest_of_line()
        )))
    }

    /// Parses `[code] text` after a status keyword.
    fn parse_resp_text(cursor: &mut Cursor<'_>) -> (Option<String>, String) {
        cursor.skip_spaces();
        let mut code = None;
        if cursor.peek() == Some(b'[') {
            cursor.advance(1);
            let raw = cursor.take_until(b']');
            cursor.advance(1);
            code = Some(raw);
            cursor.skip_spaces();
        }
        (code, cursor.rest_of_line())
    }

    fn parse_search(cursor: &mut Cursor<'_>) -> Vec<Uid> {
        cursor
            .rest_of_line()
            .split_whitespace()
            // ESEARCH-style trailers such as "(MODSEQ 123)" are ignored
            .filter_map(|token| token.parse::<Uid>().ok())
            .collect()
    }

    fn parse_fetch(cursor: &mut Cursor<'_>) -> Result<FetchData> {
        cursor.expect(b'(')?;
        let mut data = FetchData::default();

        loop {
            cursor.skip_spaces();
            match cursor.peek() {
                Some(b')') => {
                    cursor.advance(1);
                    break;
                }
                None => return Err(cursor.error("unterminated FETCH response")),
                Some(_) => {}
            }

            let name = cursor.fetch_item_name()?.to_ascii_uppercase();
            cursor.expect(b' ')?;

            match name.as_str() {
                "UID" => {
                    let n = cursor.number()?;
                    data.uid = Uid::new(n);
                }
                "BODY[]" | "RFC822" => {
                    data.body = cursor.nstring()?;
                }
                _ => cursor.skip_value()?,
            }
        }

        Ok(data)
    }
}

/// Byte cursor over a single response.
struct Cursor<'a> {
    input: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    const fn new(input: &'a [u8]) -> Self {
        Self { input, pos: 0 }
    }

    fn peek(&self) -> Option<u8> {
        self.input.get(self.pos).copied()
    }

    fn advance(&mut self, n: usize) {
        self.pos = (self.pos + n).min(self.input.len());
    }

    fn error(&self, message: impl Into<String>) -> Error {
        Error::Parse {
            position: self.pos,
            message: message.into(),
        }
    }

    fn expect(&mut self, byte: u8) -> Result<()> {
        if self.peek() == Some(byte) {
            self.advance(1);
            Ok(())
        } else {
            Err(self.error(format!("expected '{}'", byte as char)))
        }
    }

    fn skip_spaces(&mut self) {
        while self.peek() == Some(b' ') {
            self.advance(1);
        }
    }

    fn at_line_end(&self) -> bool {
        matches!(self.peek(), None | Some(b'\r' | b'\n'))
    }

    /// Reads an atom: everything up to a space, paren, or line end.
    fn atom(&mut self) -> Result<String> {
        let start = self.pos;
        while let Some(b) = self.peek() {
            if matches!(b, b' ' | b'(' | b')' | b'\r' | b'\n') {
                break;
            }
            self.advance(1);
        }
        if self.pos == start {
            return Err(self.error("expected atom"));
        }
        Ok(String::from_utf8_lossy(&self.input[start..self.pos]).into_owned())
    }

    fn number(&mut self) -> Result<u32> {
        let start = self.pos;
        while self.peek().is_some_and(|b| b.is_ascii_digit()) {
            self.advance(1);
        }
        std::str::from_utf8(&self.input[start..self.pos])
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| self.error("expected number"))
    }

    /// Reads a FETCH attribute name, including any `[section]<partial>`.
    fn fetch_item_name(&mut self) -> Result<String> {
        let start = self.pos;
        let mut depth = 0usize;
        while let Some(b) = self.peek() {
            match b {
                b'[' => depth += 1,
                b']' => depth = depth.saturating_sub(1),
                b' ' | b')' if depth == 0 => break,
                b'\r' | b'\n' => break,
                _ => {}
            }
            self.advance(1);
        }
        if self.pos == start {
            return Err(self.error("expected FETCH item name"));
        }
        Ok(String::from_utf8_lossy(&self.input[start..self.pos]).into_owned())
    }

    fn take_until(&mut self, end: u8) -> String {
        let start = self.pos;
        while let Some(b) = self.peek() {
            if b == end || b == b'\r' || b == b'\n' {
                break;
            }
            self.advance(1);
        }
        String::from_utf8_lossy(&self.input[start..self.pos]).into_owned()
    }

    fn rest_of_line(&mut self) -> String {
        let start = self.pos;
        while !self.at_line_end() {
            self.advance(1);
        }
        String::from_utf8_lossy(&self.input[start..self.pos])
            .trim_end()
            .to_string()
    }

    /// Reads `NIL`, a quoted string, or a literal.
    fn nstring(&mut self) -> Result<Option<Vec<u8>>> {
        match self.peek() {
            Some(b'{') => self.literal().map(Some),
            Some(b'"') => self.quoted().map(Some),
            Some(b'N' | b'n') => {
                let atom = self.atom()?;
                if atom.eq_ignore_ascii_case("NIL") {
                    Ok(None)
                } else {
                    Err(self.error(format!("expected NIL, got {atom}")))
                }
            }
            _ => Err(self.error("expected string")),
        }
    }

    fn literal(&mut self) -> Result<Vec<u8>> {
        self.expect(b'{')?;
        let len = self.number()? as usize;
        if self.peek() == Some(b'+') {
            self.advance(1);
        }
        self.expect(b'}')?;
        self.expect(b'\r')?;
        self.expect(b'\n')?;

        let end = self.pos + len;
        if end > self.input.len() {
            return Err(self.error(format!("literal of {len} bytes is truncated")));
        }
        let bytes = self.input[self.pos..end].to_vec();
        self.pos = end;
        Ok(bytes)
    }

    fn quoted(&mut self) -> Result<Vec<u8>> {
        self.expect(b'"')?;
        let mut out = Vec::new();
        loop {
            match self.peek() {
                Some(b'"') => {
                    self.advance(1);
                    return Ok(out);
                }
                Some(b'\\') => {
                    self.advance(1);
                    if let Some(b) = self.peek() {
                        out.push(b);
                        self.advance(1);
                    }
                }
                Some(b) => {
                    out.push(b);
                    self.advance(1);
                }
                None => return Err(self.error("unterminated quoted string")),
            }
        }
    }

    /// Skips a FETCH value of any shape.
    fn skip_value(&mut self) -> Result<()> {
        match self.peek() {
            Some(b'(') => {
                self.advance(1);
                loop {
                    self.skip_spaces();
                    match self.peek() {
                        Some(b')') => {
                            self.advance(1);
                            return Ok(());
                        }
                        None => return Err(self.error("unterminated list")),
                        Some(_) => self.skip_value()?,
                    }
                }
            }
            Some(b'{') => self.literal().map(|_| ()),
            Some(b'"') => self.quoted().map(|_| ()),
            Some(_) => self.atom().map(|_| ()),
            None => Err(self.error("expected value")),
        }
    }
}
