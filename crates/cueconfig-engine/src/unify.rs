//! Unification of evaluated values.
//!
//! Unification is commutative and associative: the result satisfies both
//! operands or is an error. Disjunctions distribute over unification and
//! keep their default marks, treating an operand without marks as if every
//! alternative were a default.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::ast::LabelKind;
use crate::value::{
    Alternative, Bound, Conflict, Disjunction, FieldVal, Kind, ListVal, PatternVal, StructVal, Val,
};

/// Unifies two values.
pub fn unify(a: &Val, b: &Val) -> Val {
    match (a, b) {
        (Val::Bottom(_), _) => a.clone(),
        (_, Val::Bottom(_)) => b.clone(),
        (Val::Top, _) => b.clone(),
        (_, Val::Top) => a.clone(),
        (Val::Incomplete(_), _) => a.clone(),
        (_, Val::Incomplete(_)) => b.clone(),
        (Val::Disj(_), _) | (_, Val::Disj(_)) => unify_disjunctions(a, b),
        (Val::Struct(x), Val::Struct(y)) => Val::Struct(Arc::new(unify_structs(x, y))),
        (Val::List(x), Val::List(y)) => unify_lists(x, y),
        (Val::Constraint { kind: ka, bounds: ba }, Val::Constraint { kind: kb, bounds: bb }) => {
            let kind = ka.intersect(*kb);
            if kind.is_empty() {
                return mismatch(a, b);
            }
            let mut bounds = ba.clone();
            for bound in bb {
                if !bounds.contains(bound) {
                    bounds.push(bound.clone());
                }
            }
            let kind = bounds
                .iter()
                .fold(kind, |acc, bound| acc.intersect(bound.kind()));
            if kind.is_empty() {
                return mismatch(a, b);
            }
            Val::Constraint { kind, bounds }
        }
        (Val::Constraint { kind, bounds }, other) | (other, Val::Constraint { kind, bounds }) => {
            check_constraint(*kind, bounds, other, a, b)
        }
        _ if a.is_scalar() && b.is_scalar() => {
            if a == b {
                a.clone()
            } else {
                mismatch(a, b)
            }
        }
        _ => mismatch(a, b),
    }
}

/// Unifies a list of values left to right.
pub fn unify_all<'a>(values: impl IntoIterator<Item = &'a Val>) -> Val {
    values
        .into_iter()
        .fold(Val::Top, |acc, value| unify(&acc, value))
}

fn mismatch(a: &Val, b: &Val) -> Val {
    let (ka, kb) = (a.kind(), b.kind());
    let message = if ka.intersect(kb).is_empty() {
        format!("conflicting values {a} and {b} (mismatched types {ka} and {kb})")
    } else {
        format!("conflicting values {a} and {b}")
    };
    Val::bottom(message)
}

fn check_constraint(kind: Kind, bounds: &[Bound], value: &Val, a: &Val, b: &Val) -> Val {
    if !kind.contains(value.kind()) {
        return mismatch(a, b);
    }
    for bound in bounds {
        if !value.is_scalar() {
            if matches!(bound, Bound::Ne(_)) {
                continue;
            }
            return mismatch(a, b);
        }
        if !bound.admits(value) {
            let reason = match bound {
                Bound::Match(_) | Bound::NotMatch(_) => format!("does not match {bound}"),
                _ => format!("out of bound {bound}"),
            };
            return Val::bottom(format!("invalid value {value} ({reason})"));
        }
    }
    value.clone()
}

fn alternatives(v: &Val) -> Vec<Alternative> {
    match v {
        Val::Disj(d) => {
            let marked = d.has_defaults();
            d.alternatives
                .iter()
                .map(|alt| Alternative {
                    value: alt.value.clone(),
                    default: alt.default || !marked,
                })
                .collect()
        }
        other => vec![Alternative {
            value: other.clone(),
            default: true,
        }],
    }
}

fn unify_disjunctions(a: &Val, b: &Val) -> Val {
    let left = alternatives(a);
    let right = alternatives(b);
    let mut product = Vec::with_capacity(left.len() * right.len());
    for x in &left {
        for y in &right {
            product.push(Alternative {
                value: unify(&x.value, &y.value),
                default: x.default && y.default,
            });
        }
    }
    // A result where every alternative is a default carries no preference.
    let survivors = product.iter().filter(|alt| !alt.value.has_error());
    let mut all_default = true;
    let mut any = false;
    for alt in survivors {
        any = true;
        all_default &= alt.default;
    }
    if any && all_default {
        for alt in &mut product {
            alt.default = false;
        }
    }
    Disjunction::normalize(product)
}

fn unify_structs(a: &StructVal, b: &StructVal) -> StructVal {
    let mut fields: BTreeMap<String, FieldVal> = BTreeMap::new();

    for (label, field) in &a.fields {
        let merged = match b.fields.get(label) {
            Some(other) => merge_fields(field, other),
            None => admit(field, label, b),
        };
        fields.insert(label.clone(), merged);
    }
    for (label, field) in &b.fields {
        if !a.fields.contains_key(label) {
            fields.insert(label.clone(), admit(field, label, a));
        }
    }

    let mut patterns = a.patterns.clone();
    for pattern in &b.patterns {
        if !patterns.contains(pattern) {
            patterns.push(pattern.clone());
        }
    }

    StructVal {
        fields,
        patterns,
        closed: a.closed || b.closed,
    }
}

fn merge_fields(a: &FieldVal, b: &FieldVal) -> FieldVal {
    let mut positions = a.positions.clone();
    for pos in &b.positions {
        if !positions.contains(pos) {
            positions.push(pos.clone());
        }
    }
    FieldVal {
        value: unify(&a.value, &b.value).with_positions(&positions),
        optionality: a.optionality.max(b.optionality),
        label_kind: a.label_kind,
        positions,
    }
}

/// Applies the other struct's patterns and closedness to a field only one
/// side declares.
fn admit(field: &FieldVal, label: &str, other: &StructVal) -> FieldVal {
    if !other.allows(label, field.label_kind) {
        let mut conflict = Conflict::new("field not allowed");
        conflict.positions = field.positions.clone();
        return FieldVal {
            value: Val::Bottom(Box::new(conflict)),
            ..field.clone()
        };
    }
    if field.label_kind != LabelKind::Regular {
        return field.clone();
    }
    let matching: Vec<&PatternVal> = other
        .patterns
        .iter()
        .filter(|p| p.matcher.matches_label(label))
        .collect();
    if matching.is_empty() {
        return field.clone();
    }
    let value = matching
        .iter()
        .fold(field.value.clone(), |acc, p| unify(&acc, &p.value));
    FieldVal {
        value: value.with_positions(&field.positions),
        ..field.clone()
    }
}

fn unify_lists(a: &ListVal, b: &ListVal) -> Val {
    let len = a.elems.len().max(b.elems.len());
    let mut elems = Vec::with_capacity(len);
    for i in 0..len {
        let x = element(a, i);
        let y = element(b, i);
        match (x, y) {
            (Some(x), Some(y)) => elems.push(unify(x, y)),
            _ => {
                return Val::bottom(format!(
                    "incompatible list lengths ({} and {})",
                    list_len(a),
                    list_len(b)
                ));
            }
        }
    }
    let rest = match (&a.rest, &b.rest) {
        (Some(x), Some(y)) => Some(unify(x, y)),
        _ => None,
    };
    Val::List(Arc::new(ListVal { elems, rest }))
}

fn element(list: &ListVal, i: usize) -> Option<&Val> {
    list.elems.get(i).or(list.rest.as_ref())
}

fn list_len(list: &ListVal) -> String {
    match list.rest {
        Some(_) => format!(">={}", list.elems.len()),
        None => list.elems.len().to_string(),
    }
}

/// Marks a struct as closed, as the `close` builtin does.
pub fn close(v: &Val) -> Val {
    match v {
        Val::Struct(s) => Val::Struct(Arc::new(StructVal {
            closed: true,
            ..(**s).clone()
        })),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Optionality;
    use crate::value::{Number, Scalar};
    use pretty_assertions::assert_eq;

    fn disj(alts: &[(Val, bool)]) -> Val {
        Val::Disj(Arc::new(Disjunction {
            alternatives: alts
                .iter()
                .map(|(value, default)| Alternative {
                    value: value.clone(),
                    default: *default,
                })
                .collect(),
        }))
    }

    fn message(v: &Val) -> String {
        v.conflict().map(|c| c.message.clone()).unwrap_or_default()
    }

    #[test]
    fn scalars() {
        assert_eq!(unify(&Val::Int(1), &Val::Int(1)), Val::Int(1));
        assert_eq!(message(&unify(&Val::Int(1), &Val::Int(2))), "conflicting values 1 and 2");
        assert_eq!(
            message(&unify(&Val::str("x"), &Val::kind_constraint(Kind::INT))),
            "conflicting values \"x\" and int (mismatched types string and int)"
        );
    }

    #[test]
    fn top_is_identity() {
        assert_eq!(unify(&Val::Top, &Val::Int(3)), Val::Int(3));
        assert_eq!(unify(&Val::Null, &Val::Top), Val::Null);
    }

    #[test]
    fn number_accepts_int_and_float() {
        let number = Val::kind_constraint(Kind::NUMBER);
        assert_eq!(unify(&number, &Val::Float(1.5)), Val::Float(1.5));
        assert_eq!(unify(&number, &Val::Int(2)), Val::Int(2));
        assert_eq!(
            unify(&number, &Val::kind_constraint(Kind::INT)),
            Val::kind_constraint(Kind::INT)
        );
    }

    #[test]
    fn bounds() {
        let positive = Val::Constraint {
            kind: Kind::NUMBER,
            bounds: vec![Bound::Gt(Scalar::Num(Number::Int(0)))],
        };
        assert_eq!(unify(&positive, &Val::Int(3)), Val::Int(3));
        assert_eq!(message(&unify(&positive, &Val::Int(0))), "invalid value 0 (out of bound >0)");
    }

    #[test]
    fn default_survives_when_compatible() {
        let d = disj(&[(Val::Int(100), true), (Val::kind_constraint(Kind::INT), false)]);
        let result = unify(&d, &Val::kind_constraint(Kind::INT));
        assert_eq!(result, d);
        assert_eq!(result.default_or_self(), &Val::Int(100));
    }

    #[test]
    fn explicit_value_beats_default() {
        let d = disj(&[(Val::Int(100), true), (Val::Top, false)]);
        assert_eq!(unify(&d, &Val::Int(7)), Val::Int(7));
    }

    #[test]
    fn disjunction_cross_product_keeps_marks() {
        let a = disj(&[(Val::Int(1), true), (Val::Int(2), false)]);
        let b = disj(&[(Val::Int(1), false), (Val::Int(2), false)]);
        let result = unify(&a, &b);
        assert_eq!(result.default_or_self(), &Val::Int(1));
    }

    #[test]
    fn empty_disjunction() {
        let d = disj(&[(Val::Int(1), false), (Val::Int(2), false)]);
        assert!(unify(&d, &Val::Int(3)).is_bottom());
    }

    #[test]
    fn closed_struct_rejects_unknown_fields() {
        let field = |v: Val| FieldVal {
            value: v,
            optionality: Optionality::Regular,
            label_kind: LabelKind::Regular,
            positions: Vec::new(),
        };
        let closed = StructVal {
            fields: [("a".to_string(), field(Val::kind_constraint(Kind::INT)))].into(),
            patterns: Vec::new(),
            closed: true,
        };
        let open = StructVal {
            fields: [("b".to_string(), field(Val::Int(1)))].into(),
            ..StructVal::default()
        };
        let merged = unify_structs(&closed, &open);
        assert_eq!(message(&merged.fields["b"].value), "field not allowed");
        assert!(merged.closed);
    }

    #[test]
    fn patterns_apply_to_new_fields() {
        let with_pattern = StructVal {
            patterns: vec![PatternVal {
                matcher: Val::kind_constraint(Kind::STRING),
                value: Val::kind_constraint(Kind::INT),
            }],
            ..StructVal::default()
        };
        let other = StructVal {
            fields: [(
                "x".to_string(),
                FieldVal {
                    value: Val::str("no"),
                    optionality: Optionality::Regular,
                    label_kind: LabelKind::Regular,
                    positions: Vec::new(),
                },
            )]
            .into(),
            ..StructVal::default()
        };
        let merged = unify_structs(&with_pattern, &other);
        assert!(merged.fields["x"].value.is_bottom());
    }

    #[test]
    fn list_lengths() {
        let closed = ListVal { elems: vec![Val::Int(1)], rest: None };
        let open = ListVal {
            elems: vec![],
            rest: Some(Val::kind_constraint(Kind::INT)),
        };
        assert_eq!(
            unify_lists(&closed, &open),
            Val::List(Arc::new(ListVal { elems: vec![Val::Int(1)], rest: None }))
        );
        let longer = ListVal { elems: vec![Val::Int(1), Val::Int(2)], rest: None };
        assert_eq!(
            message(&unify_lists(&closed, &longer)),
            "incompatible list lengths (1 and 2)"
        );
    }
}
