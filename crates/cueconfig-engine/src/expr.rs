//! Pratt expression parser.
//!
//! Binding powers, lowest to highest:
//!
//! 1. `|` disjunction
//! 2. `&` unification
//! 3. `||`
//! 4. `&&`
//! 5. `== != < <= > >= =~ !~`
//! 6. `+ -`
//! 7. `* /`
//! 8. unary prefix operators, including bounds and the `*` default marker
//!
//! Selectors, indexes and calls bind tighter than any operator.

use std::sync::Arc;

use crate::ast::*;
use crate::diagnostic::Diagnostic;
use crate::parser::{ParseResult, Parser};
use crate::token::TokenKind;

/// Binding power for binary operators, as (left, right). All operators are
/// left-associative.
fn infix_binding_power(op: BinaryOp) -> (u8, u8) {
    match op {
        BinaryOp::Disjunction => (1, 2),
        BinaryOp::Unification => (3, 4),
        BinaryOp::Or => (5, 6),
        BinaryOp::And => (7, 8),
        BinaryOp::Eq
        | BinaryOp::Ne
        | BinaryOp::Lt
        | BinaryOp::Le
        | BinaryOp::Gt
        | BinaryOp::Ge
        | BinaryOp::Match
        | BinaryOp::NotMatch => (9, 10),
        BinaryOp::Add | BinaryOp::Sub => (11, 12),
        BinaryOp::Mul | BinaryOp::Div => (13, 14),
    }
}

const PREFIX_BINDING_POWER: u8 = 15;

fn binary_op(kind: TokenKind) -> Option<BinaryOp> {
    Some(match kind {
        TokenKind::Pipe => BinaryOp::Disjunction,
        TokenKind::Amp => BinaryOp::Unification,
        TokenKind::OrOr => BinaryOp::Or,
        TokenKind::AndAnd => BinaryOp::And,
        TokenKind::EqEq => BinaryOp::Eq,
        TokenKind::NotEq => BinaryOp::Ne,
        TokenKind::Lt => BinaryOp::Lt,
        TokenKind::Le => BinaryOp::Le,
        TokenKind::Gt => BinaryOp::Gt,
        TokenKind::Ge => BinaryOp::Ge,
        TokenKind::Match => BinaryOp::Match,
        TokenKind::NotMatch => BinaryOp::NotMatch,
        TokenKind::Plus => BinaryOp::Add,
        TokenKind::Minus => BinaryOp::Sub,
        TokenKind::Star => BinaryOp::Mul,
        TokenKind::Slash => BinaryOp::Div,
        _ => return None,
    })
}

fn unary_op(kind: TokenKind) -> Option<UnaryOp> {
    Some(match kind {
        TokenKind::Minus => UnaryOp::Neg,
        TokenKind::Plus => UnaryOp::Plus,
        TokenKind::Bang => UnaryOp::Not,
        TokenKind::Star => UnaryOp::Default,
        TokenKind::Lt => UnaryOp::Lt,
        TokenKind::Le => UnaryOp::Le,
        TokenKind::Gt => UnaryOp::Gt,
        TokenKind::Ge => UnaryOp::Ge,
        TokenKind::NotEq => UnaryOp::Ne,
        TokenKind::Match => UnaryOp::Match,
        TokenKind::NotMatch => UnaryOp::NotMatch,
        _ => return None,
    })
}

impl Parser<'_> {
    pub(crate) fn parse_expr(&mut self) -> ParseResult<Expr> {
        self.parse_expr_bp(0)
    }

    /// Operands of higher-precedence operators recurse here, a bounded
    /// number of times per operand.
    fn parse_expr_bp(&mut self, min_bp: u8) -> ParseResult<Expr> {
        let mut lhs = self.parse_prefix_expr()?;

        while let Some(op) = binary_op(self.current()) {
            let (l_bp, r_bp) = infix_binding_power(op);
            if l_bp < min_bp {
                break;
            }
            let pos = self.current_pos();
            self.advance();
            let rhs = self.parse_expr_bp(r_bp)?;
            lhs = Expr::new(ExprKind::Binary(op, Arc::new(lhs), Arc::new(rhs)), pos);
        }

        Ok(lhs)
    }

    fn parse_prefix_expr(&mut self) -> ParseResult<Expr> {
        if let Some(op) = unary_op(self.current()) {
            let pos = self.current_pos();
            self.advance();
            let operand = self.nested(|parser| parser.parse_expr_bp(PREFIX_BINDING_POWER))?;
            return Ok(Expr::new(ExprKind::Unary(op, Arc::new(operand)), pos));
        }
        let primary = self.parse_primary()?;
        self.parse_postfix(primary)
    }

    fn parse_postfix(&mut self, mut expr: Expr) -> ParseResult<Expr> {
        loop {
            match self.current() {
                TokenKind::Dot => {
                    let pos = self.current_pos();
                    self.advance();
                    let name = match self.current() {
                        TokenKind::Ident => {
                            let name = self.current_text().to_string();
                            self.advance();
                            name
                        }
                        TokenKind::String => match self.parse_string()?.kind {
                            ExprKind::Str(name) => name,
                            _ => {
                                return Err(Diagnostic::at(
                                    pos,
                                    "interpolation not allowed in selector",
                                ));
                            }
                        },
                        _ => return Err(self.expected("selector")),
                    };
                    expr = Expr::new(ExprKind::Selector(Arc::new(expr), name), pos);
                }
                TokenKind::LBracket => {
                    let pos = self.current_pos();
                    self.advance();
                    let index = self.nested(Self::parse_expr)?;
                    self.expect(TokenKind::RBracket)?;
                    expr = Expr::new(ExprKind::Index(Arc::new(expr), Arc::new(index)), pos);
                }
                TokenKind::LParen => {
                    let pos = self.current_pos();
                    self.advance();
                    let mut args = Vec::new();
                    while !self.at(TokenKind::RParen) {
                        args.push(Arc::new(self.nested(Self::parse_expr)?));
                        if !self.at(TokenKind::RParen) {
                            self.expect(TokenKind::Comma)?;
                        }
                    }
                    self.expect(TokenKind::RParen)?;
                    expr = Expr::new(ExprKind::Call(Arc::new(expr), args), pos);
                }
                _ => return Ok(expr),
            }
        }
    }

    fn parse_primary(&mut self) -> ParseResult<Expr> {
        let pos = self.current_pos();
        let kind = match self.current() {
            TokenKind::Underscore => ExprKind::Top,
            TokenKind::Bottom => ExprKind::Bottom,
            TokenKind::Null => ExprKind::Null,
            TokenKind::True => ExprKind::Bool(true),
            TokenKind::False => ExprKind::Bool(false),
            TokenKind::Int => ExprKind::Int(self.parse_int()?),
            TokenKind::Float => {
                let text: String = self.current_text().chars().filter(|&c| c != '_').collect();
                let value = text
                    .parse::<f64>()
                    .map_err(|_| Diagnostic::at(pos.clone(), "malformed float literal"))?;
                ExprKind::Float(value)
            }
            TokenKind::Ident => ExprKind::Ident(self.current_text().to_string()),
            TokenKind::String => return self.parse_string(),
            TokenKind::LParen => {
                self.advance();
                let inner = self.nested(Self::parse_expr)?;
                self.expect(TokenKind::RParen)?;
                return Ok(inner);
            }
            TokenKind::LBrace => {
                self.advance();
                let lit = self.nested(|parser| parser.parse_struct_body(pos.clone()))?;
                return Ok(Expr::new(ExprKind::Struct(Arc::new(lit)), pos));
            }
            TokenKind::LBracket => {
                self.advance();
                let lit = self.nested(|parser| parser.parse_list_body(pos.clone()))?;
                return Ok(Expr::new(ExprKind::List(Arc::new(lit)), pos));
            }
            _ => return Err(self.expected("expression")),
        };
        self.advance();
        Ok(Expr::new(kind, pos))
    }

    fn parse_int(&self) -> ParseResult<i128> {
        let text: String = self.current_text().chars().filter(|&c| c != '_').collect();
        let (digits, radix) = match text.get(..2) {
            Some("0x" | "0X") => (&text[2..], 16),
            Some("0o" | "0O") => (&text[2..], 8),
            Some("0b" | "0B") => (&text[2..], 2),
            _ => (text.as_str(), 10),
        };
        i128::from_str_radix(digits, radix).map_err(|err| {
            let message = match err.kind() {
                std::num::IntErrorKind::PosOverflow | std::num::IntErrorKind::NegOverflow => {
                    "integer literal out of range"
                }
                _ => "malformed integer literal",
            };
            Diagnostic::at(self.current_pos(), message)
        })
    }

    /// Parses list elements up to and including `]`.
    fn parse_list_body(&mut self, pos: crate::source::Pos) -> ParseResult<ListLit> {
        let mut elems = Vec::new();
        let mut rest = None;
        while !self.at(TokenKind::RBracket) {
            if self.at(TokenKind::Ellipsis) {
                let ellipsis_pos = self.current_pos();
                self.advance();
                let rest_expr = if self.at(TokenKind::RBracket) || self.at(TokenKind::Comma) {
                    Expr::new(ExprKind::Top, ellipsis_pos)
                } else {
                    self.parse_expr()?
                };
                rest = Some(Arc::new(rest_expr));
                self.eat(TokenKind::Comma);
                if !self.at(TokenKind::RBracket) {
                    return Err(self.expected("']' after list ellipsis"));
                }
                break;
            }
            elems.push(Arc::new(self.parse_expr()?));
            if !self.at(TokenKind::RBracket) {
                self.expect(TokenKind::Comma)?;
            }
        }
        self.expect(TokenKind::RBracket)?;
        Ok(ListLit { elems, rest, pos })
    }
}
