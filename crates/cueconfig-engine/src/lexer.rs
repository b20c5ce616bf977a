//! Lexical analyzer for configuration source text.
//!
//! Converts source text into a sequence of [`Token`]s. Newlines after a token
//! that can end an element produce an implicit comma, so declarations and
//! list elements may be separated by either. String literals are returned
//! whole, including any `\(...)` interpolations; the parser lexes the
//! interpolated expressions separately with [`lex_range`].

use crate::diagnostic::Diagnostic;
use crate::source::SourceFile;
use crate::token::{Token, TokenKind, lookup_keyword};

/// Lexes a whole source file. The result always ends with an `Eof` token.
pub fn lex(file: &SourceFile) -> Result<Vec<Token>, Diagnostic> {
    lex_range(file, 0, file.content.len())
}

/// Lexes the byte range `start..end` of a source file.
pub fn lex_range(file: &SourceFile, start: usize, end: usize) -> Result<Vec<Token>, Diagnostic> {
    let mut lexer = Lexer {
        source: file.content.as_bytes(),
        pos: start,
        end,
        file,
        tokens: Vec::new(),
    };
    lexer.lex_all()?;
    Ok(lexer.tokens)
}

struct Lexer<'a> {
    source: &'a [u8],
    pos: usize,
    end: usize,
    file: &'a SourceFile,
    tokens: Vec<Token>,
}

impl<'a> Lexer<'a> {
    fn lex_all(&mut self) -> Result<(), Diagnostic> {
        loop {
            self.skip_whitespace_and_comments();
            if self.pos >= self.end {
                self.insert_comma(self.end);
                self.tokens
                    .push(Token::new(TokenKind::Eof, self.end as u32, self.end as u32));
                return Ok(());
            }
            let token = self.next_token()?;
            self.tokens.push(token);
        }
    }

    fn peek(&self) -> u8 {
        self.peek_at(0)
    }

    fn peek_at(&self, offset: usize) -> u8 {
        let idx = self.pos + offset;
        if idx < self.end { self.source[idx] } else { 0 }
    }

    fn error(&self, offset: usize, message: impl Into<String>) -> Diagnostic {
        Diagnostic::at(self.file.pos(offset as u32), message)
    }

    fn insert_comma(&mut self, at: usize) {
        if let Some(last) = self.tokens.last() {
            if last.kind.ends_element() {
                let mut comma = Token::new(TokenKind::Comma, at as u32, at as u32);
                comma.implicit = true;
                self.tokens.push(comma);
            }
        }
    }

    fn skip_whitespace_and_comments(&mut self) {
        while self.pos < self.end {
            match self.peek() {
                b'\n' => {
                    self.insert_comma(self.pos);
                    self.pos += 1;
                }
                b' ' | b'\t' | b'\r' => self.pos += 1,
                b'/' if self.peek_at(1) == b'/' => {
                    while self.pos < self.end && self.peek() != b'\n' {
                        self.pos += 1;
                    }
                }
                _ => break,
            }
        }
    }

    fn next_token(&mut self) -> Result<Token, Diagnostic> {
        let start = self.pos;
        let c = self.peek();

        if c == b'_' && self.peek_at(1) == b'|' && self.peek_at(2) == b'_' {
            self.pos += 3;
            return Ok(self.token(TokenKind::Bottom, start));
        }
        if is_ident_start(c) {
            return Ok(self.lex_ident(start));
        }
        if c.is_ascii_digit() || (c == b'.' && self.peek_at(1).is_ascii_digit()) {
            return self.lex_number(start);
        }
        if c == b'"' {
            self.scan_string()?;
            return Ok(self.token(TokenKind::String, start));
        }

        let (kind, len) = match (c, self.peek_at(1), self.peek_at(2)) {
            (b'.', b'.', b'.') => (TokenKind::Ellipsis, 3),
            (b'.', _, _) => (TokenKind::Dot, 1),
            (b'|', b'|', _) => (TokenKind::OrOr, 2),
            (b'|', _, _) => (TokenKind::Pipe, 1),
            (b'&', b'&', _) => (TokenKind::AndAnd, 2),
            (b'&', _, _) => (TokenKind::Amp, 1),
            (b'=', b'=', _) => (TokenKind::EqEq, 2),
            (b'=', b'~', _) => (TokenKind::Match, 2),
            (b'=', _, _) => (TokenKind::Assign, 1),
            (b'!', b'=', _) => (TokenKind::NotEq, 2),
            (b'!', b'~', _) => (TokenKind::NotMatch, 2),
            (b'!', _, _) => (TokenKind::Bang, 1),
            (b'<', b'=', _) => (TokenKind::Le, 2),
            (b'<', _, _) => (TokenKind::Lt, 1),
            (b'>', b'=', _) => (TokenKind::Ge, 2),
            (b'>', _, _) => (TokenKind::Gt, 1),
            (b'{', _, _) => (TokenKind::LBrace, 1),
            (b'}', _, _) => (TokenKind::RBrace, 1),
            (b'[', _, _) => (TokenKind::LBracket, 1),
            (b']', _, _) => (TokenKind::RBracket, 1),
            (b'(', _, _) => (TokenKind::LParen, 1),
            (b')', _, _) => (TokenKind::RParen, 1),
            (b':', _, _) => (TokenKind::Colon, 1),
            (b',', _, _) => (TokenKind::Comma, 1),
            (b'?', _, _) => (TokenKind::Question, 1),
            (b'*', _, _) => (TokenKind::Star, 1),
            (b'+', _, _) => (TokenKind::Plus, 1),
            (b'-', _, _) => (TokenKind::Minus, 1),
            (b'/', _, _) => (TokenKind::Slash, 1),
            _ => {
                let ch = self.file.content[start..].chars().next().unwrap_or('\0');
                return Err(self.error(start, format!("illegal character {ch:?}")));
            }
        };
        self.pos += len;
        Ok(self.token(kind, start))
    }

    fn token(&self, kind: TokenKind, start: usize) -> Token {
        Token::new(kind, start as u32, self.pos as u32)
    }

    fn lex_ident(&mut self, start: usize) -> Token {
        self.pos += 1;
        while is_ident_continue(self.peek()) {
            self.pos += 1;
        }
        let text = &self.file.content[start..self.pos];
        let kind = if text == "_" {
            TokenKind::Underscore
        } else {
            lookup_keyword(text).unwrap_or(TokenKind::Ident)
        };
        self.token(kind, start)
    }

    fn lex_number(&mut self, start: usize) -> Result<Token, Diagnostic> {
        if self.peek() == b'0'
            && matches!(self.peek_at(1), b'x' | b'X' | b'o' | b'O' | b'b' | b'B')
        {
            self.pos += 2;
            let digits = self.pos;
            while self.peek().is_ascii_alphanumeric() || self.peek() == b'_' {
                self.pos += 1;
            }
            if self.pos == digits {
                return Err(self.error(start, "malformed integer literal"));
            }
            return Ok(self.token(TokenKind::Int, start));
        }

        let mut kind = TokenKind::Int;
        self.eat_digits();
        if self.peek() == b'.' && self.peek_at(1) != b'.' {
            kind = TokenKind::Float;
            self.pos += 1;
            self.eat_digits();
        }
        if matches!(self.peek(), b'e' | b'E') {
            let save = self.pos;
            self.pos += 1;
            if matches!(self.peek(), b'+' | b'-') {
                self.pos += 1;
            }
            if self.peek().is_ascii_digit() {
                kind = TokenKind::Float;
                self.eat_digits();
            } else {
                self.pos = save;
            }
        }
        if is_ident_start(self.peek()) {
            return Err(self.error(self.pos, "invalid character in numeric literal"));
        }
        Ok(self.token(kind, start))
    }

    fn eat_digits(&mut self) {
        while self.peek().is_ascii_digit() || self.peek() == b'_' {
            self.pos += 1;
        }
    }

    /// Scans a double-quoted string, including nested interpolations.
    fn scan_string(&mut self) -> Result<(), Diagnostic> {
        let start = self.pos;
        self.pos += 1;
        loop {
            match self.peek() {
                0 if self.pos >= self.end => {
                    return Err(self.error(start, "string literal not terminated"));
                }
                b'\n' => return Err(self.error(start, "string literal not terminated")),
                b'"' => {
                    self.pos += 1;
                    return Ok(());
                }
                b'\\' if self.peek_at(1) == b'(' => {
                    self.pos += 2;
                    self.scan_interpolation(start)?;
                }
                b'\\' => self.pos += 2,
                _ => self.pos += 1,
            }
        }
    }

    fn scan_interpolation(&mut self, string_start: usize) -> Result<(), Diagnostic> {
        let mut depth = 1usize;
        while depth > 0 {
            match self.peek() {
                0 if self.pos >= self.end => {
                    return Err(self.error(string_start, "interpolation not terminated"));
                }
                b'\n' => return Err(self.error(string_start, "interpolation not terminated")),
                b'(' => {
                    depth += 1;
                    self.pos += 1;
                }
                b')' => {
                    depth -= 1;
                    self.pos += 1;
                }
                b'"' => self.scan_string()?,
                _ => self.pos += 1,
            }
        }
        Ok(())
    }
}

fn is_ident_start(c: u8) -> bool {
    c.is_ascii_alphabetic() || c == b'_' || c == b'#' || c == b'$'
}

fn is_ident_continue(c: u8) -> bool {
    c.is_ascii_alphanumeric() || c == b'_' || c == b'$' || c == b'#'
}
