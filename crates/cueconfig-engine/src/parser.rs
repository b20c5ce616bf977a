//! Recursive descent parser for files, declarations and struct bodies.
//!
//! The [`Parser`] provides primitive token operations (advance, expect, eat)
//! plus the declaration-level rules. Expressions are parsed by the Pratt
//! parser in [`crate::expr`]. Parsing stops at the first error.

use std::sync::Arc;

use crate::ast::*;
use crate::diagnostic::Diagnostic;
use crate::lexer;
use crate::source::{Pos, SourceFile};
use crate::token::{Token, TokenKind};

/// Parses a whole source file.
pub fn parse_file(file: &SourceFile) -> Result<File, Diagnostic> {
    let tokens = lexer::lex(file)?;
    let mut parser = Parser::new(file, tokens);
    parser.parse_file()
}

pub(crate) type ParseResult<T> = Result<T, Diagnostic>;

/// Bounds nesting: one level per struct, list, parenthesis, index, call
/// argument, unary operand, interpolation and chained label.
pub const MAX_NESTING: usize = 100;

pub(crate) struct Parser<'src> {
    pub(crate) file: &'src SourceFile,
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl<'src> Parser<'src> {
    pub(crate) fn new(file: &'src SourceFile, tokens: Vec<Token>) -> Self {
        Self {
            file,
            tokens,
            pos: 0,
            depth: 0,
        }
    }

    // Primitive operations

    pub(crate) fn current(&self) -> TokenKind {
        self.tokens[self.pos].kind
    }

    pub(crate) fn current_token(&self) -> Token {
        self.tokens[self.pos]
    }

    pub(crate) fn peek_kind(&self, offset: usize) -> TokenKind {
        self.tokens
            .get(self.pos + offset)
            .map_or(TokenKind::Eof, |token| token.kind)
    }

    pub(crate) fn current_text(&self) -> &'src str {
        let token = self.current_token();
        self.file.snippet(token.start, token.end)
    }

    pub(crate) fn current_pos(&self) -> Pos {
        self.file.pos(self.current_token().start)
    }

    pub(crate) fn at(&self, kind: TokenKind) -> bool {
        self.current() == kind
    }

    pub(crate) fn advance(&mut self) {
        if !self.at(TokenKind::Eof) {
            self.pos += 1;
        }
    }

    pub(crate) fn eat(&mut self, kind: TokenKind) -> bool {
        if self.at(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    pub(crate) fn expect(&mut self, kind: TokenKind) -> ParseResult<()> {
        if self.eat(kind) {
            Ok(())
        } else {
            Err(self.expected(kind.describe()))
        }
    }

    pub(crate) fn expected(&self, what: &str) -> Diagnostic {
        let token = self.current_token();
        let found = if token.implicit {
            "newline"
        } else {
            token.kind.describe()
        };
        Diagnostic::at(self.current_pos(), format!("expected {what}, found {found}"))
    }

    /// Whether the `[` at the cursor is closed by a `]` directly followed
    /// by `:`, which makes it a pattern constraint rather than a list.
    fn at_pattern(&self) -> bool {
        let mut depth = 0usize;
        for (offset, token) in self.tokens[self.pos..].iter().enumerate() {
            match token.kind {
                TokenKind::LBracket => depth += 1,
                TokenKind::RBracket => {
                    depth = depth.saturating_sub(1);
                    if depth == 0 {
                        return self.peek_kind(offset + 1) == TokenKind::Colon;
                    }
                }
                TokenKind::Eof => return false,
                _ => {}
            }
        }
        false
    }

    /// Runs `f` one nesting level deeper, failing once the limit is reached.
    pub(crate) fn nested<T>(
        &mut self,
        f: impl FnOnce(&mut Self) -> ParseResult<T>,
    ) -> ParseResult<T> {
        if self.depth >= MAX_NESTING {
            return Err(Diagnostic::at(self.current_pos(), "nesting too deep"));
        }
        self.depth += 1;
        let result = f(self);
        self.depth -= 1;
        result
    }

    // Files and declarations

    fn parse_file(&mut self) -> ParseResult<File> {
        let pos = self.file.pos(0);
        let package = if self.eat(TokenKind::Package) {
            if !self.at(TokenKind::Ident) {
                return Err(self.expected("package name"));
            }
            let name = self.current_text().to_string();
            self.advance();
            self.end_decl(TokenKind::Eof)?;
            Some(name)
        } else {
            None
        };

        let mut decls = Vec::new();
        while !self.at(TokenKind::Eof) {
            if self.at(TokenKind::Import) {
                return Err(Diagnostic::at(
                    self.current_pos(),
                    "import declarations are not supported",
                ));
            }
            if self.at(TokenKind::Package) {
                return Err(Diagnostic::at(
                    self.current_pos(),
                    "package clause must be the first declaration",
                ));
            }
            decls.push(self.parse_decl()?);
            self.end_decl(TokenKind::Eof)?;
        }

        Ok(File {
            name: self.file.name.clone(),
            package,
            decls,
            pos,
        })
    }

    /// Requires a separator after a declaration unless the body ends.
    fn end_decl(&mut self, closing: TokenKind) -> ParseResult<()> {
        if self.at(closing) || self.eat(TokenKind::Comma) {
            Ok(())
        } else {
            Err(self.expected("',' or newline"))
        }
    }

    /// Parses the declarations of a struct literal up to and including `}`.
    pub(crate) fn parse_struct_body(&mut self, pos: Pos) -> ParseResult<StructLit> {
        let mut decls = Vec::new();
        while !self.at(TokenKind::RBrace) {
            if self.at(TokenKind::Eof) {
                return Err(self.expected("'}'"));
            }
            decls.push(self.parse_decl()?);
            self.end_decl(TokenKind::RBrace)?;
        }
        self.expect(TokenKind::RBrace)?;
        Ok(StructLit { decls, pos })
    }

    pub(crate) fn parse_decl(&mut self) -> ParseResult<Decl> {
        if self.at(TokenKind::Ellipsis) {
            let pos = self.current_pos();
            self.advance();
            return Ok(Decl::Ellipsis(pos));
        }
        if self.at_label() {
            return Ok(Decl::Field(self.parse_field()?));
        }
        if self.at(TokenKind::LBracket) {
            if let Some(pattern) = self.try_parse_pattern()? {
                return Ok(pattern);
            }
        }
        if self.at(TokenKind::Ident) && self.peek_kind(1) == TokenKind::Assign {
            return Err(Diagnostic::at(self.current_pos(), "aliases are not supported"));
        }
        Ok(Decl::Embed(Arc::new(self.parse_expr()?)))
    }

    /// Whether the parser is at `label:`, `label?:` or `label!:`.
    fn at_label(&self) -> bool {
        let label_token = matches!(
            self.current(),
            TokenKind::Ident
                | TokenKind::String
                | TokenKind::Package
                | TokenKind::Import
                | TokenKind::True
                | TokenKind::False
                | TokenKind::Null
        );
        if !label_token {
            return false;
        }
        match self.peek_kind(1) {
            TokenKind::Colon => true,
            TokenKind::Question | TokenKind::Bang => self.peek_kind(2) == TokenKind::Colon,
            _ => false,
        }
    }

    fn parse_field(&mut self) -> ParseResult<Field> {
        let pos = self.current_pos();
        let (label, label_kind, referable) = if self.at(TokenKind::String) {
            let label = self.parse_plain_string()?;
            (label, LabelKind::Regular, false)
        } else {
            let label = self.current_text().to_string();
            self.advance();
            let kind = LabelKind::of_ident(&label);
            (label, kind, true)
        };

        let optionality = if self.eat(TokenKind::Question) {
            Optionality::Optional
        } else if self.eat(TokenKind::Bang) {
            Optionality::Required
        } else {
            Optionality::Regular
        };
        self.expect(TokenKind::Colon)?;

        let value = self.parse_field_value()?;
        Ok(Field {
            label,
            label_kind,
            referable,
            optionality,
            value: Arc::new(value),
            pos,
        })
    }

    /// Parses the value of a field, desugaring `a: b: c` and `a: [K]: V`
    /// into nested single-declaration structs.
    fn parse_field_value(&mut self) -> ParseResult<Expr> {
        let pos = self.current_pos();
        if self.at_label() {
            let field = self.nested(Self::parse_field)?;
            return Ok(Expr::new(
                ExprKind::Struct(Arc::new(StructLit {
                    decls: vec![Decl::Field(field)],
                    pos: pos.clone(),
                })),
                pos,
            ));
        }
        if self.at(TokenKind::LBracket) {
            if let Some(pattern) = self.nested(Self::try_parse_pattern)? {
                return Ok(Expr::new(
                    ExprKind::Struct(Arc::new(StructLit {
                        decls: vec![pattern],
                        pos: pos.clone(),
                    })),
                    pos,
                ));
            }
        }
        self.parse_expr()
    }

    /// Parses `[matcher]: value` if the tokens form a pattern constraint.
    fn try_parse_pattern(&mut self) -> ParseResult<Option<Decl>> {
        if !self.at_pattern() {
            return Ok(None);
        }
        let pos = self.current_pos();
        self.advance();
        let matcher = self.parse_expr()?;
        self.expect(TokenKind::RBracket)?;
        self.expect(TokenKind::Colon)?;
        let value = self.parse_field_value()?;
        Ok(Some(Decl::Pattern {
            matcher: Arc::new(matcher),
            value: Arc::new(value),
            pos,
        }))
    }

    /// Parses a string token that must not contain interpolations.
    fn parse_plain_string(&mut self) -> ParseResult<String> {
        let pos = self.current_pos();
        match self.parse_string()?.kind {
            ExprKind::Str(s) => Ok(s),
            _ => Err(Diagnostic::at(pos, "interpolation not allowed in label")),
        }
    }

    /// Decodes the current string token into a literal or an interpolation.
    pub(crate) fn parse_string(&mut self) -> ParseResult<Expr> {
        let token = self.current_token();
        let pos = self.current_pos();
        self.advance();

        let content = &self.file.content;
        let body_start = token.start as usize + 1;
        let body_end = token.end as usize - 1;
        let bytes = content.as_bytes();

        let mut parts = Vec::new();
        let mut lit = String::new();
        let mut i = body_start;
        while i < body_end {
            let c = bytes[i];
            if c != b'\\' {
                let ch = content[i..].chars().next().unwrap_or('\0');
                lit.push(ch);
                i += ch.len_utf8();
                continue;
            }
            let escape_pos = self.file.pos(i as u32);
            let next = bytes.get(i + 1).copied().unwrap_or(0);
            i += 2;
            match next {
                b'n' => lit.push('\n'),
                b't' => lit.push('\t'),
                b'r' => lit.push('\r'),
                b'a' => lit.push('\u{07}'),
                b'b' => lit.push('\u{08}'),
                b'f' => lit.push('\u{0c}'),
                b'v' => lit.push('\u{0b}'),
                b'\\' => lit.push('\\'),
                b'"' => lit.push('"'),
                b'\'' => lit.push('\''),
                b'/' => lit.push('/'),
                b'u' | b'U' => {
                    let width = if next == b'u' { 4 } else { 8 };
                    let hex = content.get(i..i + width).unwrap_or("");
                    let ch = u32::from_str_radix(hex, 16)
                        .ok()
                        .filter(|_| hex.len() == width)
                        .and_then(char::from_u32)
                        .ok_or_else(|| {
                            Diagnostic::at(escape_pos.clone(), "invalid unicode escape")
                        })?;
                    lit.push(ch);
                    i += width;
                }
                b'(' => {
                    let expr_start = i;
                    let expr_end = matching_paren(bytes, expr_start, body_end)
                        .ok_or_else(|| {
                            Diagnostic::at(escape_pos.clone(), "interpolation not terminated")
                        })?;
                    if !lit.is_empty() {
                        parts.push(InterpolationPart::Lit(std::mem::take(&mut lit)));
                    }
                    let tokens = lexer::lex_range(self.file, expr_start, expr_end)?;
                    let mut sub = Parser::new(self.file, tokens);
                    sub.depth = self.depth;
                    let expr = sub.nested(Self::parse_expr)?;
                    sub.eat(TokenKind::Comma);
                    if !sub.at(TokenKind::Eof) {
                        return Err(sub.expected("')'"));
                    }
                    parts.push(InterpolationPart::Expr(Arc::new(expr)));
                    i = expr_end + 1;
                }
                _ => return Err(Diagnostic::at(escape_pos, "unknown escape sequence")),
            }
        }

        if parts.is_empty() {
            return Ok(Expr::new(ExprKind::Str(lit), pos));
        }
        if !lit.is_empty() {
            parts.push(InterpolationPart::Lit(lit));
        }
        Ok(Expr::new(ExprKind::Interpolation(parts), pos))
    }
}

/// Finds the `)` closing an interpolation that starts at `start`, skipping
/// nested parentheses and string literals.
fn matching_paren(bytes: &[u8], start: usize, end: usize) -> Option<usize> {
    let mut depth = 1usize;
    let mut i = start;
    let mut in_string = false;
    while i < end {
        match bytes[i] {
            b'\\' if in_string => i += 1,
            b'"' => in_string = !in_string,
            b'(' if !in_string => depth += 1,
            b')' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
        i += 1;
    }
    None
}
