//! Evaluated values.
//!
//! A [`Val`] is the result of evaluating a field: a concrete scalar, a type
//! or bound constraint, a struct or list of further values, a disjunction,
//! or one of the two failure states. Errors (`Bottom`) are terminal;
//! `Incomplete` marks values that could not be computed yet, such as a
//! reference cycle or arithmetic on a non-concrete operand.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use regex::Regex;

use crate::ast::{LabelKind, Optionality};
use crate::source::Pos;

/// A set of value kinds, used by type constraints such as `int` or `number`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct Kind(u16);

impl Kind {
    pub const NONE: Kind = Kind(0);
    pub const NULL: Kind = Kind(1);
    pub const BOOL: Kind = Kind(1 << 1);
    pub const INT: Kind = Kind(1 << 2);
    pub const FLOAT: Kind = Kind(1 << 3);
    pub const STRING: Kind = Kind(1 << 4);
    pub const BYTES: Kind = Kind(1 << 5);
    pub const LIST: Kind = Kind(1 << 6);
    pub const STRUCT: Kind = Kind(1 << 7);
    pub const NUMBER: Kind = Kind(Self::INT.0 | Self::FLOAT.0);
    pub const ANY: Kind = Kind((1 << 8) - 1);

    pub fn union(self, other: Kind) -> Kind {
        Kind(self.0 | other.0)
    }

    pub fn intersect(self, other: Kind) -> Kind {
        Kind(self.0 & other.0)
    }

    pub fn contains(self, other: Kind) -> bool {
        self.0 & other.0 == other.0 && other.0 != 0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == Kind::ANY {
            return write!(f, "_");
        }
        let mut names = Vec::new();
        let mut rest = *self;
        if rest.contains(Kind::NUMBER) {
            names.push("number");
            rest = Kind(rest.0 & !Kind::NUMBER.0);
        }
        for (kind, name) in [
            (Kind::NULL, "null"),
            (Kind::BOOL, "bool"),
            (Kind::INT, "int"),
            (Kind::FLOAT, "float"),
            (Kind::STRING, "string"),
            (Kind::BYTES, "bytes"),
            (Kind::LIST, "list"),
            (Kind::STRUCT, "struct"),
        ] {
            if rest.contains(kind) {
                names.push(name);
            }
        }
        if names.is_empty() {
            return write!(f, "_|_");
        }
        write!(f, "{}", names.join("|"))
    }
}

/// Why a value failed, and where.
#[derive(Clone, Debug)]
pub struct Conflict {
    pub message: String,
    pub positions: Vec<Pos>,
    /// Set when the value failed because of a reference cycle.
    pub cycle: bool,
}

impl Conflict {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            positions: Vec::new(),
            cycle: false,
        }
    }

    pub fn cycle() -> Self {
        Self {
            message: "reference cycle".to_string(),
            positions: Vec::new(),
            cycle: true,
        }
    }
}

/// A constraint on a scalar beyond its kind.
#[derive(Clone, Debug)]
pub enum Bound {
    Lt(Scalar),
    Le(Scalar),
    Gt(Scalar),
    Ge(Scalar),
    Ne(Val),
    Match(Arc<Regex>),
    NotMatch(Arc<Regex>),
}

impl PartialEq for Bound {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Bound::Lt(a), Bound::Lt(b))
            | (Bound::Le(a), Bound::Le(b))
            | (Bound::Gt(a), Bound::Gt(b))
            | (Bound::Ge(a), Bound::Ge(b)) => a == b,
            (Bound::Ne(a), Bound::Ne(b)) => a == b,
            (Bound::Match(a), Bound::Match(b)) | (Bound::NotMatch(a), Bound::NotMatch(b)) => {
                a.as_str() == b.as_str()
            }
            _ => false,
        }
    }
}

impl Bound {
    /// The kinds of value this bound can apply to.
    pub fn kind(&self) -> Kind {
        match self {
            Bound::Lt(s) | Bound::Le(s) | Bound::Gt(s) | Bound::Ge(s) => match s {
                Scalar::Num(_) => Kind::NUMBER,
                Scalar::Str(_) => Kind::STRING,
            },
            Bound::Ne(_) => Kind::ANY,
            Bound::Match(_) | Bound::NotMatch(_) => Kind::STRING,
        }
    }

    /// Checks a concrete value against the bound.
    pub fn admits(&self, value: &Val) -> bool {
        match self {
            Bound::Ne(other) => value != other,
            Bound::Match(re) => matches!(value, Val::Str(s) if re.is_match(s)),
            Bound::NotMatch(re) => matches!(value, Val::Str(s) if !re.is_match(s)),
            Bound::Lt(limit) | Bound::Le(limit) | Bound::Gt(limit) | Bound::Ge(limit) => {
                let Some(ordering) = Scalar::of(value).and_then(|s| s.compare(limit)) else {
                    return false;
                };
                match self {
                    Bound::Lt(_) => ordering.is_lt(),
                    Bound::Le(_) => ordering.is_le(),
                    Bound::Gt(_) => ordering.is_gt(),
                    _ => ordering.is_ge(),
                }
            }
        }
    }
}

impl fmt::Display for Bound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Bound::Lt(s) => write!(f, "<{s}"),
            Bound::Le(s) => write!(f, "<={s}"),
            Bound::Gt(s) => write!(f, ">{s}"),
            Bound::Ge(s) => write!(f, ">={s}"),
            Bound::Ne(v) => write!(f, "!={v}"),
            Bound::Match(re) => write!(f, "=~{:?}", re.as_str()),
            Bound::NotMatch(re) => write!(f, "!~{:?}", re.as_str()),
        }
    }
}

/// An ordered scalar used by comparison bounds.
#[derive(Clone, PartialEq, Debug)]
pub enum Scalar {
    Num(Number),
    Str(Arc<str>),
}

impl Scalar {
    pub fn of(value: &Val) -> Option<Scalar> {
        match value {
            Val::Int(i) => Some(Scalar::Num(Number::Int(*i))),
            Val::Float(x) => Some(Scalar::Num(Number::Float(*x))),
            Val::Str(s) => Some(Scalar::Str(s.clone())),
            _ => None,
        }
    }

    pub fn compare(&self, other: &Scalar) -> Option<std::cmp::Ordering> {
        match (self, other) {
            (Scalar::Num(a), Scalar::Num(b)) => a.compare(b),
            (Scalar::Str(a), Scalar::Str(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Num(n) => write!(f, "{n}"),
            Scalar::Str(s) => write!(f, "{s:?}"),
        }
    }
}

#[derive(Clone, Copy, PartialEq, Debug)]
pub enum Number {
    Int(i128),
    Float(f64),
}

impl Number {
    pub fn as_f64(self) -> f64 {
        match self {
            Number::Int(i) => i as f64,
            Number::Float(x) => x,
        }
    }

    pub fn compare(&self, other: &Number) -> Option<std::cmp::Ordering> {
        match (self, other) {
            (Number::Int(a), Number::Int(b)) => Some(a.cmp(b)),
            _ => self.as_f64().partial_cmp(&other.as_f64()),
        }
    }
}

impl fmt::Display for Number {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Number::Int(i) => write!(f, "{i}"),
            Number::Float(x) => write!(f, "{}", format_float(*x)),
        }
    }
}

/// Formats a float so that it always reads back as a float.
pub fn format_float(x: f64) -> String {
    if x.is_finite() && x.fract() == 0.0 && x.abs() < 1e16 {
        format!("{x:.1}")
    } else {
        format!("{x}")
    }
}

/// A struct field's evaluated value and presence constraint.
#[derive(Clone, Debug)]
pub struct FieldVal {
    pub value: Val,
    pub optionality: Optionality,
    pub label_kind: LabelKind,
    /// Declaration sites, for diagnostics. Not part of equality.
    pub positions: Vec<Pos>,
}

impl PartialEq for FieldVal {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
            && self.optionality == other.optionality
            && self.label_kind == other.label_kind
    }
}

/// A pattern constraint `[matcher]: value` kept on a struct so it applies to
/// fields added by later unification.
#[derive(Clone, PartialEq, Debug)]
pub struct PatternVal {
    pub matcher: Val,
    pub value: Val,
}

#[derive(Clone, PartialEq, Debug, Default)]
pub struct StructVal {
    pub fields: BTreeMap<String, FieldVal>,
    pub patterns: Vec<PatternVal>,
    /// Closed structs reject fields they do not declare or match by pattern.
    pub closed: bool,
}

impl StructVal {
    /// Whether a closed struct admits a field with this label.
    pub fn allows(&self, label: &str, kind: LabelKind) -> bool {
        !self.closed
            || kind != LabelKind::Regular
            || self.fields.contains_key(label)
            || self.patterns.iter().any(|p| p.matcher.matches_label(label))
    }

    /// Fields that are exported: regular labels that are not optional.
    pub fn regular_fields(&self) -> impl Iterator<Item = (&String, &FieldVal)> {
        self.fields.iter().filter(|(_, field)| {
            field.label_kind == LabelKind::Regular && field.optionality != Optionality::Optional
        })
    }
}

#[derive(Clone, PartialEq, Debug, Default)]
pub struct ListVal {
    pub elems: Vec<Val>,
    /// The constraint on elements beyond `elems`; `None` for a closed list.
    pub rest: Option<Val>,
}

#[derive(Clone, PartialEq, Debug)]
pub struct Alternative {
    pub value: Val,
    pub default: bool,
}

/// A disjunction of at least two distinct alternatives.
#[derive(Clone, PartialEq, Debug)]
pub struct Disjunction {
    pub alternatives: Vec<Alternative>,
}

impl Disjunction {
    /// Builds a disjunction from alternatives, pruning errors and duplicates.
    ///
    /// Returns the single survivor unwrapped, or a `Bottom` describing why
    /// every alternative failed.
    pub fn normalize(alternatives: Vec<Alternative>) -> Val {
        let mut kept: Vec<Alternative> = Vec::new();
        let mut errors: Vec<Conflict> = Vec::new();
        for alt in alternatives {
            if alt.value.has_error() {
                if let Some(conflict) = alt.value.first_error() {
                    errors.push(conflict);
                }
                continue;
            }
            match kept.iter_mut().find(|k| k.value == alt.value) {
                Some(existing) => existing.default |= alt.default,
                None => kept.push(alt),
            }
        }
        match kept.len() {
            0 => {
                if errors.len() == 1 {
                    return Val::Bottom(Box::new(errors.remove(0)));
                }
                let message = format!(
                    "{} errors in empty disjunction: {}",
                    errors.len(),
                    errors
                        .iter()
                        .map(|e| e.message.as_str())
                        .collect::<Vec<_>>()
                        .join("; ")
                );
                let mut conflict = Conflict::new(message);
                conflict.positions = errors.into_iter().flat_map(|e| e.positions).collect();
                Val::Bottom(Box::new(conflict))
            }
            1 => kept.remove(0).value,
            _ => Val::Disj(Arc::new(Disjunction { alternatives: kept })),
        }
    }

    /// Whether any alternative carries a default mark.
    pub fn has_defaults(&self) -> bool {
        self.alternatives.iter().any(|alt| alt.default)
    }

    /// The default value, if exactly one alternative is marked.
    pub fn default_value(&self) -> Option<&Val> {
        let mut defaults = self.alternatives.iter().filter(|alt| alt.default);
        match (defaults.next(), defaults.next()) {
            (Some(only), None) => Some(&only.value),
            _ => None,
        }
    }
}

/// An evaluated value.
#[derive(Clone, Debug)]
pub enum Val {
    /// `_`, any value.
    Top,
    Bottom(Box<Conflict>),
    Incomplete(Box<Conflict>),
    Null,
    Bool(bool),
    Int(i128),
    Float(f64),
    Str(Arc<str>),
    /// A type or bound constraint such as `int`, `>=0` or `=~"^a"`.
    Constraint { kind: Kind, bounds: Vec<Bound> },
    Struct(Arc<StructVal>),
    List(Arc<ListVal>),
    Disj(Arc<Disjunction>),
}

impl PartialEq for Val {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Val::Top, Val::Top) | (Val::Null, Val::Null) => true,
            (Val::Bottom(a), Val::Bottom(b)) | (Val::Incomplete(a), Val::Incomplete(b)) => {
                a.message == b.message
            }
            (Val::Bool(a), Val::Bool(b)) => a == b,
            (Val::Int(a), Val::Int(b)) => a == b,
            (Val::Float(a), Val::Float(b)) => a == b,
            (Val::Str(a), Val::Str(b)) => a == b,
            (
                Val::Constraint { kind: ka, bounds: ba },
                Val::Constraint { kind: kb, bounds: bb },
            ) => ka == kb && ba == bb,
            (Val::Struct(a), Val::Struct(b)) => Arc::ptr_eq(a, b) || a == b,
            (Val::List(a), Val::List(b)) => Arc::ptr_eq(a, b) || a == b,
            (Val::Disj(a), Val::Disj(b)) => Arc::ptr_eq(a, b) || a == b,
            _ => false,
        }
    }
}

impl Val {
    pub fn bottom(message: impl Into<String>) -> Val {
        Val::Bottom(Box::new(Conflict::new(message)))
    }

    pub fn incomplete(message: impl Into<String>) -> Val {
        Val::Incomplete(Box::new(Conflict::new(message)))
    }

    pub fn cycle() -> Val {
        Val::Incomplete(Box::new(Conflict::cycle()))
    }

    pub fn kind_constraint(kind: Kind) -> Val {
        Val::Constraint {
            kind,
            bounds: Vec::new(),
        }
    }

    pub fn str(s: impl Into<Arc<str>>) -> Val {
        Val::Str(s.into())
    }

    /// The kinds of value this could still become.
    pub fn kind(&self) -> Kind {
        match self {
            Val::Top | Val::Incomplete(_) => Kind::ANY,
            Val::Bottom(_) => Kind::NONE,
            Val::Null => Kind::NULL,
            Val::Bool(_) => Kind::BOOL,
            Val::Int(_) => Kind::INT,
            Val::Float(_) => Kind::FLOAT,
            Val::Str(_) => Kind::STRING,
            Val::Constraint { kind, .. } => *kind,
            Val::Struct(_) => Kind::STRUCT,
            Val::List(_) => Kind::LIST,
            Val::Disj(d) => d
                .alternatives
                .iter()
                .fold(Kind::NONE, |acc, alt| acc.union(alt.value.kind())),
        }
    }

    pub fn is_bottom(&self) -> bool {
        matches!(self, Val::Bottom(_))
    }

    pub fn is_scalar(&self) -> bool {
        matches!(
            self,
            Val::Null | Val::Bool(_) | Val::Int(_) | Val::Float(_) | Val::Str(_)
        )
    }

    /// Whether this value or any regular field or element inside it is an
    /// error.
    pub fn has_error(&self) -> bool {
        self.first_error().is_some()
    }

    /// The first error found in this value, searching regular and required
    /// fields and list elements.
    pub fn first_error(&self) -> Option<Conflict> {
        match self {
            Val::Bottom(conflict) => Some((**conflict).clone()),
            Val::Struct(s) => s
                .fields
                .values()
                .filter(|field| field.optionality != Optionality::Optional)
                .find_map(|field| field.value.first_error()),
            Val::List(l) => l.elems.iter().find_map(Val::first_error),
            _ => None,
        }
    }

    /// Whether this value, used as a pattern matcher, accepts a label.
    pub fn matches_label(&self, label: &str) -> bool {
        !matches!(
            crate::unify::unify(self, &Val::str(label)),
            Val::Bottom(_) | Val::Incomplete(_)
        )
    }

    /// The value a disjunction resolves to when a single default is marked.
    pub fn default_or_self(&self) -> &Val {
        match self {
            Val::Disj(d) => d.default_value().unwrap_or(self),
            _ => self,
        }
    }

    pub fn conflict(&self) -> Option<&Conflict> {
        match self {
            Val::Bottom(c) | Val::Incomplete(c) => Some(c),
            _ => None,
        }
    }

    /// Attaches positions to an error value that has none yet.
    pub fn with_positions(self, positions: &[Pos]) -> Val {
        match self {
            Val::Bottom(mut c) if c.positions.is_empty() && !positions.is_empty() => {
                c.positions = positions.to_vec();
                Val::Bottom(c)
            }
            Val::Incomplete(mut c) if c.positions.is_empty() && !positions.is_empty() => {
                c.positions = positions.to_vec();
                Val::Incomplete(c)
            }
            other => other,
        }
    }
}

impl fmt::Display for Val {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Val::Top => write!(f, "_"),
            Val::Bottom(_) => write!(f, "_|_"),
            Val::Incomplete(c) => write!(f, "_|_ // {}", c.message),
            Val::Null => write!(f, "null"),
            Val::Bool(b) => write!(f, "{b}"),
            Val::Int(i) => write!(f, "{i}"),
            Val::Float(x) => write!(f, "{}", format_float(*x)),
            Val::Str(s) => write!(f, "{s:?}"),
            Val::Constraint { kind, bounds } => {
                let mut parts = Vec::new();
                let implied = bounds.iter().fold(Kind::NONE, |acc, b| acc.union(b.kind()));
                if bounds.is_empty() || (*kind != Kind::ANY && *kind != implied) {
                    parts.push(kind.to_string());
                }
                parts.extend(bounds.iter().map(Bound::to_string));
                write!(f, "{}", parts.join(" & "))
            }
            Val::Struct(s) => {
                if s.fields.is_empty() {
                    return write!(f, "{{}}");
                }
                let labels: Vec<_> = s.fields.keys().map(String::as_str).collect();
                write!(f, "{{{}}}", labels.join(", "))
            }
            Val::List(l) => {
                let elems: Vec<_> = l.elems.iter().map(Val::to_string).collect();
                match &l.rest {
                    Some(rest) if elems.is_empty() => write!(f, "[...{rest}]"),
                    Some(rest) => write!(f, "[{}, ...{rest}]", elems.join(", ")),
                    None => write!(f, "[{}]", elems.join(", ")),
                }
            }
            Val::Disj(d) => {
                let alts: Vec<_> = d
                    .alternatives
                    .iter()
                    .map(|alt| {
                        if alt.default {
                            format!("*{}", alt.value)
                        } else {
                            alt.value.to_string()
                        }
                    })
                    .collect();
                write!(f, "{}", alts.join(" | "))
            }
        }
    }
}
