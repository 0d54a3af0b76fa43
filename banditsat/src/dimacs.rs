//! Parsing of DIMACS style file formats.
//!
//! This includes DIMACS CNF files as well as extensions like the weighted
//! WCNF format that use the same lexical conventions.
use std::{
    fmt::Display,
    io::{self, Read},
};

use bstr::BStr;

pub mod cnf;

/// Kinds of token in a DIMACS style file format.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum TokenKind {
    /// A whole line starting with `'c'` including the final newline.
    Comment,
    /// A newline character.
    ///
    /// Not emitted for comment lines.
    Newline,
    /// An integer that can be represented as an `i64`.
    Int,
    /// Any other sequence of non-whitespace characters.
    ///
    /// The characters `' '`, `'\t'`, `'\r'` and `'\n'` count as whitespace.
    /// This includes integers outside of the `i64` range.
    Word,
    /// Token indicating the end of file was reached without IO errors.
    EndOfFile,
    /// Token indicating an IO error occured.
    ///
    /// The error can be accessed using [`Tokenizer::check_io_error`].
    IoError,
}

/// A token of a DIMACS style file format.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub struct Token<'a> {
    /// The kind of token this represents.
    pub kind: TokenKind,
    /// Bytes of the token.
    pub bytes: &'a BStr,
    /// Value of an `Int` token, otherwise unspecified.
    pub value: i64,
    /// Line on which the token starts, counting from 1.
    pub line: usize,
}

impl<'a> Display for Token<'a> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.kind {
            TokenKind::Comment => f.write_str("comment"),
            TokenKind::Newline => f.write_str("end of line"),
            TokenKind::Int => write!(f, "{}", self.bytes),
            TokenKind::Word => write!(f, "{:?}", self.bytes),
            TokenKind::EndOfFile => f.write_str("end of file"),
            TokenKind::IoError => f.write_str("io error"),
        }
    }
}

/// Size of the chunks in which input is read.
const CHUNK_SIZE: usize = 16 << 10;

/// Scan and tokenize a file in a DIMACS style format.
///
/// Tokens are scanned one at a time into an internal buffer, so tokens of any
/// length are supported while only a bounded window of the input is resident.
pub struct Tokenizer<'a> {
    /// Source of input data.
    read: Box<dyn Read + 'a>,
    /// Most recently read chunk of input.
    chunk: Vec<u8>,
    /// Position of the next unconsumed byte in `chunk`.
    pos: usize,
    /// Did we reach EOF of `read`?
    eof_reached: bool,
    /// Did an IO error occur?
    io_error: Option<io::Error>,
    /// Bytes of the current token.
    token: Vec<u8>,
    /// Kind of the current token, if one is scanned.
    kind: Option<TokenKind>,
    /// Value of the current token when it is an `Int`.
    value: i64,
    /// Line on which the current token starts.
    token_line: usize,
    /// Line of the next byte to consume.
    line: usize,
    /// Would a `'c'` at the current position start a comment?
    at_line_start: bool,
}

impl<'a> Tokenizer<'a> {
    /// Initialize a [`Tokenizer`] with an underlying [`Read`] instance.
    pub fn from_read(read: impl Read + 'a) -> Self {
        Tokenizer {
            read: Box::new(read),
            chunk: vec![],
            pos: 0,
            eof_reached: false,
            io_error: None,
            token: vec![],
            kind: None,
            value: 0,
            token_line: 1,
            line: 1,
            at_line_start: true,
        }
    }

    /// Get the current token, processing more input when required.
    ///
    /// Any IO errors that occur while processing more input result in a
    /// [`TokenKind::IoError`] token. The corresponding error value can be
    /// accessed via [`check_io_error`][Self::check_io_error].
    pub fn current_token(&mut self) -> Token {
        if self.kind.is_none() {
            self.scan_token();
        }
        Token {
            kind: self.kind.unwrap(),
            bytes: self.token.as_slice().into(),
            value: self.value,
            line: self.token_line,
        }
    }

    /// Advance to the next token.
    ///
    /// This may be called even after reaching [`TokenKind::EndOfFile`] or
    /// [`TokenKind::IoError`], in which case the terminal token repeats.
    pub fn advance(&mut self) {
        if !matches!(self.kind, Some(TokenKind::EndOfFile | TokenKind::IoError)) {
            self.kind = None;
        }
    }

    /// Return any encountered IO error.
    pub fn check_io_error(&mut self) -> io::Result<()> {
        match self.io_error.take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Returns the next input byte without consuming it.
    fn peek_byte(&mut self) -> Option<u8> {
        while self.pos == self.chunk.len() {
            if self.eof_reached {
                return None;
            }
            self.chunk.resize(CHUNK_SIZE, 0);
            self.pos = 0;
            match self.read.read(&mut self.chunk) {
                Ok(0) => {
                    self.eof_reached = true;
                    self.chunk.clear();
                }
                Ok(n) => self.chunk.truncate(n),
                Err(err) if err.kind() == io::ErrorKind::Interrupted => self.chunk.clear(),
                Err(err) => {
                    self.io_error = Some(err);
                    self.eof_reached = true;
                    self.chunk.clear();
                }
            }
        }
        Some(self.chunk[self.pos])
    }

    /// Consumes the byte returned by the last [`peek_byte`][Self::peek_byte].
    fn bump(&mut self) {
        self.pos += 1;
    }

    /// Scans the next token into the internal buffer.
    fn scan_token(&mut self) {
        self.token.clear();
        self.value = 0;

        loop {
            let byte = match self.peek_byte() {
                Some(byte) => byte,
                None => {
                    self.token_line = self.line;
                    self.kind = Some(if self.io_error.is_some() {
                        TokenKind::IoError
                    } else {
                        TokenKind::EndOfFile
                    });
                    return;
                }
            };

            match byte {
                b' ' | b'\t' | b'\r' => {
                    self.bump();
                    self.at_line_start = false;
                }
                b'\n' => {
                    self.bump();
                    self.token.push(byte);
                    self.token_line = self.line;
                    self.line += 1;
                    self.at_line_start = true;
                    self.kind = Some(TokenKind::Newline);
                    return;
                }
                b'c' if self.at_line_start => {
                    self.token_line = self.line;
                    while let Some(byte) = self.peek_byte() {
                        self.bump();
                        self.token.push(byte);
                        if byte == b'\n' {
                            break;
                        }
                    }
                    self.line += 1;
                    self.kind = Some(TokenKind::Comment);
                    return;
                }
                _ => {
                    self.token_line = self.line;
                    while let Some(byte) = self.peek_byte() {
                        if matches!(byte, b' ' | b'\t' | b'\r' | b'\n') {
                            break;
                        }
                        self.bump();
                        self.token.push(byte);
                    }
                    self.at_line_start = false;
                    let (kind, value) = Self::classify(&self.token);
                    self.kind = Some(kind);
                    self.value = value;
                    return;
                }
            }
        }
    }

    /// Classifies a whitespace delimited token.
    fn classify(token_bytes: &[u8]) -> (TokenKind, i64) {
        let digits = &token_bytes[(token_bytes[0] == b'-') as usize..];

        if !digits.is_empty() && digits.iter().all(|digit| digit.is_ascii_digit()) {
            // Pure ASCII digits and an optional minus sign are valid UTF-8.
            let token_str = std::str::from_utf8(token_bytes).unwrap();
            if let Ok(value) = str::parse::<i64>(token_str) {
                return (TokenKind::Int, value);
            }
        }
        (TokenKind::Word, 0)
    }
}
