//! Abstract syntax tree for configuration files.
//!
//! Nodes are shared through `Arc` so that evaluation can hold on to
//! sub-expressions (field values, pattern constraints) without copying.

use std::sync::Arc;

use crate::source::Pos;

/// A parsed source file.
#[derive(Clone, Debug)]
pub struct File {
    pub name: Arc<str>,
    pub package: Option<String>,
    pub decls: Vec<Decl>,
    pub pos: Pos,
}

/// An expression with its source position.
#[derive(Clone, Debug)]
pub struct Expr {
    pub kind: ExprKind,
    pub pos: Pos,
}

impl Expr {
    pub fn new(kind: ExprKind, pos: Pos) -> Self {
        Self { kind, pos }
    }

    /// Whether this expression is a reference that resolves to a field path.
    pub fn is_reference(&self) -> bool {
        match &self.kind {
            ExprKind::Ident(_) => true,
            ExprKind::Selector(base, _) | ExprKind::Index(base, _) => base.is_reference(),
            _ => false,
        }
    }
}

#[derive(Clone, Debug)]
pub enum ExprKind {
    /// `_`
    Top,
    /// `_|_`
    Bottom,
    Null,
    Bool(bool),
    Int(i128),
    Float(f64),
    Str(String),
    Interpolation(Vec<InterpolationPart>),
    Ident(String),
    Selector(Arc<Expr>, String),
    Index(Arc<Expr>, Arc<Expr>),
    Call(Arc<Expr>, Vec<Arc<Expr>>),
    Struct(Arc<StructLit>),
    List(Arc<ListLit>),
    Unary(UnaryOp, Arc<Expr>),
    Binary(BinaryOp, Arc<Expr>, Arc<Expr>),
}

#[derive(Clone, Debug)]
pub enum InterpolationPart {
    Lit(String),
    Expr(Arc<Expr>),
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum UnaryOp {
    Neg,
    Plus,
    Not,
    /// The `*` default marker of a disjunction alternative.
    Default,
    Lt,
    Le,
    Gt,
    Ge,
    Ne,
    Match,
    NotMatch,
}

impl UnaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            UnaryOp::Neg => "-",
            UnaryOp::Plus => "+",
            UnaryOp::Not => "!",
            UnaryOp::Default => "*",
            UnaryOp::Lt => "<",
            UnaryOp::Le => "<=",
            UnaryOp::Gt => ">",
            UnaryOp::Ge => ">=",
            UnaryOp::Ne => "!=",
            UnaryOp::Match => "=~",
            UnaryOp::NotMatch => "!~",
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum BinaryOp {
    /// `|`
    Disjunction,
    /// `&`
    Unification,
    Or,
    And,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Match,
    NotMatch,
    Add,
    Sub,
    Mul,
    Div,
}

impl BinaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Disjunction => "|",
            BinaryOp::Unification => "&",
            BinaryOp::Or => "||",
            BinaryOp::And => "&&",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::Match => "=~",
            BinaryOp::NotMatch => "!~",
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
        }
    }
}

/// A struct literal `{ ... }`, or the top level of a file or package.
#[derive(Clone, Debug)]
pub struct StructLit {
    pub decls: Vec<Decl>,
    pub pos: Pos,
}

impl StructLit {
    /// Whether an identifier reference to `name` resolves to a field of this
    /// struct.
    pub fn declares(&self, name: &str) -> bool {
        self.decls.iter().any(|decl| match decl {
            Decl::Field(field) => field.referable && field.label == name,
            _ => false,
        })
    }
}

#[derive(Clone, Debug)]
pub enum Decl {
    Field(Field),
    /// `[matcher]: value`
    Pattern {
        matcher: Arc<Expr>,
        value: Arc<Expr>,
        pos: Pos,
    },
    /// An expression embedded in a struct body.
    Embed(Arc<Expr>),
    /// `...`
    Ellipsis(Pos),
}

#[derive(Clone, Debug)]
pub struct Field {
    pub label: String,
    pub label_kind: LabelKind,
    /// Identifier labels can be referenced; quoted labels cannot.
    pub referable: bool,
    pub optionality: Optionality,
    pub value: Arc<Expr>,
    pub pos: Pos,
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum LabelKind {
    Regular,
    /// `#Name`
    Definition,
    /// `_name`
    Hidden,
}

impl LabelKind {
    /// Classifies an identifier label by its prefix.
    pub fn of_ident(name: &str) -> Self {
        if name.starts_with('#') || name.starts_with("_#") {
            LabelKind::Definition
        } else if name.starts_with('_') {
            LabelKind::Hidden
        } else {
            LabelKind::Regular
        }
    }
}

/// Field presence constraint.
///
/// Ordered so that the stronger requirement wins when two declarations of
/// the same field meet: `Regular > Required > Optional`.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum Optionality {
    /// `label?: value`
    Optional,
    /// `label!: value`
    Required,
    Regular,
}

/// A list literal `[a, b, ...T]`.
#[derive(Clone, Debug)]
pub struct ListLit {
    pub elems: Vec<Arc<Expr>>,
    /// The element type allowed beyond `elems`; `None` for a closed list.
    pub rest: Option<Arc<Expr>>,
    pub pos: Pos,
}
