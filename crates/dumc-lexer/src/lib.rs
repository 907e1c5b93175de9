//! dumc-lexer — a rewindable byte-cursor lexer for the `dumc` source language.
//!
//! The lexer never builds a token array: it exposes a cursor over the raw
//! source bytes and a family of `try_token*` probes that either consume a
//! token and advance the cursor, or fail and restore the cursor to its
//! exact pre-call position. This rewind discipline is what lets the parser
//! implement speculative (try-and-backtrack) productions without a separate
//! lookahead buffer.

#![forbid(unsafe_code)]

use std::fmt;

/// The kind of a token, independent of any payload it may carry.
///
/// `Ident` and `Int` carry a payload, retrieved via [`Lexer::try_token_value`]
/// rather than [`Lexer::try_token`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    At,
    Comma,
    Colon,
    Semicolon,
    ParenL,
    ParenR,
    BraceL,
    BraceR,
    OpAdd,
    OpSub,
    OpMul,
    OpDiv,
    OpEq,
    CmpEq,
    CmpNeq,
    CmpLt,
    CmpLte,
    CmpGt,
    CmpGte,
    LogAnd,
    LogOr,
    LogNot,
    Ident,
    Int,
    KwRet,
    KwDec,
    KwIf,
    KwWhile,
    KwCont,
    KwBreak,
    TypeInt,
    Eof,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TokenKind::At => "@",
            TokenKind::Comma => ",",
            TokenKind::Colon => ":",
            TokenKind::Semicolon => ";",
            TokenKind::ParenL => "(",
            TokenKind::ParenR => ")",
            TokenKind::BraceL => "{",
            TokenKind::BraceR => "}",
            TokenKind::OpAdd => "+",
            TokenKind::OpSub => "-",
            TokenKind::OpMul => "*",
            TokenKind::OpDiv => "/",
            TokenKind::OpEq => "=",
            TokenKind::CmpEq => "==",
            TokenKind::CmpNeq => "!=",
            TokenKind::CmpLt => "<",
            TokenKind::CmpLte => "<=",
            TokenKind::CmpGt => ">",
            TokenKind::CmpGte => ">=",
            TokenKind::LogAnd => "&&",
            TokenKind::LogOr => "||",
            TokenKind::LogNot => "!",
            TokenKind::Ident => "identifier",
            TokenKind::Int => "integer literal",
            TokenKind::KwRet => "ret",
            TokenKind::KwDec => "dec",
            TokenKind::KwIf => "if",
            TokenKind::KwWhile => "while",
            TokenKind::KwCont => "continue",
            TokenKind::KwBreak => "break",
            TokenKind::TypeInt => "int",
            TokenKind::Eof => "end of file",
        };
        f.write_str(s)
    }
}

/// The payload carried by `Ident` and `Int` tokens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenValue {
    Ident(String),
    Int(i64),
}

impl TokenValue {
    pub fn into_ident(self) -> Option<String> {
        match self {
            TokenValue::Ident(s) => Some(s),
            _ => None,
        }
    }

    pub fn into_int(self) -> Option<i64> {
        match self {
            TokenValue::Int(n) => Some(n),
            _ => None,
        }
    }
}

#[inline]
fn is_ident_char(b: u8) -> bool {
    b.is_ascii_alphabetic() || b == b'_'
}

#[inline]
fn is_ident_start(b: u8) -> bool {
    is_ident_char(b)
}

/// A rewindable cursor over source bytes.
///
/// `Lexer` does not materialize a token array; callers pull tokens on demand
/// via [`try_token`](Self::try_token) / [`try_token_value`](Self::try_token_value).
pub struct Lexer<'src> {
    src: &'src [u8],
    pos: usize,
}

impl<'src> Lexer<'src> {
    pub fn new(src: &'src str) -> Self {
        Self { src: src.as_bytes(), pos: 0 }
    }

    /// Current cursor position, in bytes from the start of the source.
    #[inline]
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Restores the cursor to an arbitrary byte position.
    #[inline]
    pub fn seek(&mut self, pos: usize) {
        self.pos = pos;
    }

    fn skip_ws(&mut self) {
        while self.pos < self.src.len() && (self.src[self.pos] as char).is_whitespace() {
            self.pos += 1;
        }
    }

    fn peek(&self, offset: usize) -> Option<u8> {
        self.src.get(self.pos + offset).copied()
    }

    /// Attempts to match `kind` at the current position (after skipping
    /// leading whitespace). On success the cursor advances past the token;
    /// on failure the cursor is restored to its exact pre-call position.
    pub fn try_token(&mut self, kind: TokenKind) -> bool {
        let start = self.pos;
        self.skip_ws();
        match self.match_kind(kind) {
            Some(end) => {
                self.pos = end;
                log::trace!("try_token({kind}) matched at {start}..{end}");
                true
            },
            None => {
                self.pos = start;
                false
            },
        }
    }

    /// Like [`try_token`](Self::try_token), but for tokens that carry a
    /// payload (`Ident`, `Int`). Returns `None` and rewinds on failure.
    pub fn try_token_value(&mut self, kind: TokenKind) -> Option<TokenValue> {
        let start = self.pos;
        self.skip_ws();
        match self.match_kind_value(kind) {
            Some((end, value)) => {
                self.pos = end;
                log::trace!("try_token_value({kind}) = {value:?}");
                Some(value)
            },
            None => {
                self.pos = start;
                None
            },
        }
    }

    fn match_single(&self, b: u8) -> Option<usize> {
        if self.peek(0) == Some(b) {
            Some(self.pos + 1)
        } else {
            None
        }
    }

    fn match_str(&self, s: &str) -> Option<usize> {
        let bytes = s.as_bytes();
        if self.pos + bytes.len() <= self.src.len()
            && &self.src[self.pos..self.pos + bytes.len()] == bytes
        {
            Some(self.pos + bytes.len())
        } else {
            None
        }
    }

    /// Keyword match: the literal must be followed by a non-identifier
    /// character or EOF, so `intrinsic` is never misparsed as `int` + `rinsic`.
    fn match_keyword(&self, kw: &str) -> Option<usize> {
        let end = self.match_str(kw)?;
        match self.src.get(end) {
            Some(&b) if is_ident_char(b) => None,
            _ => Some(end),
        }
    }

    fn match_kind(&self, kind: TokenKind) -> Option<usize> {
        use TokenKind::*;
        match kind {
            At => self.match_single(b'@'),
            Comma => self.match_single(b','),
            Colon => self.match_single(b':'),
            Semicolon => self.match_single(b';'),
            ParenL => self.match_single(b'('),
            ParenR => self.match_single(b')'),
            BraceL => self.match_single(b'{'),
            BraceR => self.match_single(b'}'),
            OpAdd => self.match_single(b'+'),
            OpSub => self.match_single(b'-'),
            OpMul => self.match_single(b'*'),
            OpDiv => self.match_single(b'/'),
            OpEq => self.match_single(b'='),
            CmpEq => self.match_str("=="),
            CmpNeq => self.match_str("!="),
            CmpLt => self.match_str("<"),
            CmpLte => self.match_str("<="),
            CmpGt => self.match_str(">"),
            CmpGte => self.match_str(">="),
            LogAnd => self.match_str("&&"),
            LogOr => self.match_str("||"),
            LogNot => self.match_single(b'!'),
            KwRet => self.match_keyword("ret"),
            KwDec => self.match_keyword("dec"),
            KwIf => self.match_keyword("if"),
            KwWhile => self.match_keyword("while"),
            KwCont => self.match_keyword("continue"),
            KwBreak => self.match_keyword("break"),
            TypeInt => self.match_keyword("int"),
            Eof => {
                if self.pos >= self.src.len() {
                    Some(self.pos)
                } else {
                    None
                }
            },
            Ident | Int => None, // payload tokens: use try_token_value
        }
    }

    fn match_kind_value(&self, kind: TokenKind) -> Option<(usize, TokenValue)> {
        match kind {
            TokenKind::Ident => {
                let b0 = self.peek(0)?;
                if !is_ident_start(b0) {
                    return None;
                }
                let mut end = self.pos;
                while end < self.src.len() && is_ident_char(self.src[end]) {
                    end += 1;
                }
                let name = std::str::from_utf8(&self.src[self.pos..end]).ok()?.to_owned();
                Some((end, TokenValue::Ident(name)))
            },
            TokenKind::Int => {
                let b0 = self.peek(0)?;
                if !b0.is_ascii_digit() {
                    return None;
                }
                let mut end = self.pos;
                while end < self.src.len() && self.src[end].is_ascii_digit() {
                    end += 1;
                }
                let text = std::str::from_utf8(&self.src[self.pos..end]).ok()?;
                let value: i64 = text.parse().ok()?;
                Some((end, TokenValue::Int(value)))
            },
            _ => None,
        }
    }
}
