//! Token definitions for the configuration language.

/// A token kind produced by the lexer.
///
/// Identifiers cover plain names, `#Definitions` and `_hidden` names; the
/// parser tells them apart by their leading character.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum TokenKind {
    Ident,
    /// The top value `_`.
    Underscore,
    /// The bottom value `_|_`.
    Bottom,
    Int,
    Float,
    String,

    // Keywords
    Package,
    Import,
    True,
    False,
    Null,

    // Delimiters
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    LParen,
    RParen,

    // Punctuation
    Colon,
    Comma,
    Dot,
    Ellipsis,
    Question,
    Bang,

    // Operators
    Pipe,
    Amp,
    OrOr,
    AndAnd,
    Star,
    Plus,
    Minus,
    Slash,
    EqEq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
    Match,
    NotMatch,
    Assign,

    Eof,
}

impl TokenKind {
    /// Whether a newline after this token ends the current declaration or
    /// list element.
    pub fn ends_element(self) -> bool {
        matches!(
            self,
            TokenKind::Ident
                | TokenKind::Underscore
                | TokenKind::Bottom
                | TokenKind::Int
                | TokenKind::Float
                | TokenKind::String
                | TokenKind::True
                | TokenKind::False
                | TokenKind::Null
                | TokenKind::RParen
                | TokenKind::RBracket
                | TokenKind::RBrace
                | TokenKind::Ellipsis
        )
    }

    /// Human-readable description used in parse errors.
    pub fn describe(self) -> &'static str {
        match self {
            TokenKind::Ident => "identifier",
            TokenKind::Underscore => "'_'",
            TokenKind::Bottom => "'_|_'",
            TokenKind::Int => "integer literal",
            TokenKind::Float => "float literal",
            TokenKind::String => "string literal",
            TokenKind::Package => "'package'",
            TokenKind::Import => "'import'",
            TokenKind::True => "'true'",
            TokenKind::False => "'false'",
            TokenKind::Null => "'null'",
            TokenKind::LBrace => "'{'",
            TokenKind::RBrace => "'}'",
            TokenKind::LBracket => "'['",
            TokenKind::RBracket => "']'",
            TokenKind::LParen => "'('",
            TokenKind::RParen => "')'",
            TokenKind::Colon => "':'",
            TokenKind::Comma => "',' or newline",
            TokenKind::Dot => "'.'",
            TokenKind::Ellipsis => "'...'",
            TokenKind::Question => "'?'",
            TokenKind::Bang => "'!'",
            TokenKind::Pipe => "'|'",
            TokenKind::Amp => "'&'",
            TokenKind::OrOr => "'||'",
            TokenKind::AndAnd => "'&&'",
            TokenKind::Star => "'*'",
            TokenKind::Plus => "'+'",
            TokenKind::Minus => "'-'",
            TokenKind::Slash => "'/'",
            TokenKind::EqEq => "'=='",
            TokenKind::NotEq => "'!='",
            TokenKind::Lt => "'<'",
            TokenKind::Le => "'<='",
            TokenKind::Gt => "'>'",
            TokenKind::Ge => "'>='",
            TokenKind::Match => "'=~'",
            TokenKind::NotMatch => "'!~'",
            TokenKind::Assign => "'='",
            TokenKind::Eof => "end of file",
        }
    }
}

/// A token with its byte range in the source text.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Token {
    pub kind: TokenKind,
    pub start: u32,
    pub end: u32,
    /// Set on commas the lexer inserted at a newline.
    pub implicit: bool,
}

impl Token {
    pub fn new(kind: TokenKind, start: u32, end: u32) -> Self {
        Self {
            kind,
            start,
            end,
            implicit: false,
        }
    }
}

/// Maps reserved words to their token kinds.
pub fn lookup_keyword(s: &str) -> Option<TokenKind> {
    match s {
        "package" => Some(TokenKind::Package),
        "import" => Some(TokenKind::Import),
        "true" => Some(TokenKind::True),
        "false" => Some(TokenKind::False),
        "null" => Some(TokenKind::Null),
        _ => None,
    }
}
