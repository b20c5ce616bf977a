//! Validation, finalization and export of evaluated values.

use serde_json::{Map, Number as JsonNumber, Value as Json};

use crate::ast::{LabelKind, Optionality};
use crate::diagnostic::{Diagnostic, Diagnostics};
use crate::source::Pos;
use crate::value::{Conflict, ListVal, StructVal, Val};
use std::sync::Arc;

/// Field path of the value being walked, for diagnostics.
#[derive(Default)]
struct Trail {
    labels: Vec<String>,
    errors: Vec<Diagnostic>,
}

impl Trail {
    fn path(&self) -> String {
        self.labels.join(".")
    }

    fn enter(&mut self, label: &str) {
        if is_identifier(label) {
            self.labels.push(label.to_string());
        } else {
            self.labels.push(format!("{label:?}"));
        }
    }

    fn leave(&mut self) {
        self.labels.pop();
    }

    fn conflict(&mut self, conflict: &Conflict, fallback: &[Pos]) {
        let positions = if conflict.positions.is_empty() {
            fallback
        } else {
            &conflict.positions
        };
        self.errors.push(
            Diagnostic::new(self.path(), conflict.message.clone())
                .with_positions(positions.iter().cloned()),
        );
    }

    fn error(&mut self, message: String, positions: &[Pos]) {
        self.errors
            .push(Diagnostic::new(self.path(), message).with_positions(positions.iter().cloned()));
    }

    fn finish<T>(self, value: T) -> Result<T, Diagnostics> {
        if self.errors.is_empty() {
            Ok(value)
        } else {
            Err(Diagnostics::new(self.errors))
        }
    }
}

fn is_identifier(label: &str) -> bool {
    let mut chars = label.chars();
    chars
        .next()
        .is_some_and(|c| c.is_alphabetic() || matches!(c, '_' | '#' | '$'))
        && chars.all(|c| c.is_alphanumeric() || matches!(c, '_' | '#' | '$'))
}

/// Reports every error in a value. With `concrete`, regular fields must also
/// be concrete and incomplete values count as errors.
pub(crate) fn validate(val: &Val, concrete: bool) -> Result<(), Diagnostics> {
    let mut trail = Trail::default();
    check(val, concrete, &[], &mut trail);
    trail.finish(())
}

fn check(val: &Val, concrete: bool, positions: &[Pos], trail: &mut Trail) {
    match val {
        Val::Bottom(conflict) => trail.conflict(conflict, positions),
        Val::Incomplete(conflict) if concrete => trail.conflict(conflict, positions),
        Val::Struct(s) => {
            for (label, field) in &s.fields {
                if field.optionality == Optionality::Optional {
                    continue;
                }
                let regular = field.label_kind == LabelKind::Regular;
                trail.enter(label);
                if concrete && regular && field.optionality == Optionality::Required {
                    trail.error("field is required but not present".to_string(), &field.positions);
                } else {
                    check(&field.value, concrete && regular, &field.positions, trail);
                }
                trail.leave();
            }
        }
        Val::List(l) => {
            for (i, elem) in l.elems.iter().enumerate() {
                trail.labels.push(i.to_string());
                check(elem, concrete, positions, trail);
                trail.leave();
            }
        }
        Val::Disj(d) if concrete => match d.default_value() {
            Some(default) => check(default, concrete, positions, trail),
            None => trail.error(format!("incomplete value {val}"), positions),
        },
        Val::Top | Val::Constraint { .. } if concrete => {
            trail.error(format!("incomplete value {val}"), positions)
        }
        _ => {}
    }
}

/// Resolves every disjunction with a single default to that default and
/// fails on any remaining error or reference cycle.
///
/// Constraints, optional fields and closedness are kept, so the result can
/// still be unified with further values.
pub(crate) fn finalize(val: &Val) -> Result<Val, Diagnostics> {
    let mut trail = Trail::default();
    let finalized = resolve_defaults(val, &[], &mut trail);
    trail.finish(finalized)
}

fn resolve_defaults(val: &Val, positions: &[Pos], trail: &mut Trail) -> Val {
    match val {
        Val::Bottom(conflict) => {
            trail.conflict(conflict, positions);
            val.clone()
        }
        Val::Incomplete(conflict) if conflict.cycle => {
            trail.conflict(conflict, positions);
            val.clone()
        }
        Val::Disj(d) => match d.default_value() {
            Some(default) => resolve_defaults(default, positions, trail),
            None => val.clone(),
        },
        Val::Struct(s) => {
            let mut out = StructVal {
                fields: s.fields.clone(),
                patterns: s.patterns.clone(),
                closed: s.closed,
            };
            for (label, field) in out.fields.iter_mut() {
                if field.optionality == Optionality::Optional {
                    continue;
                }
                trail.enter(label);
                field.value = resolve_defaults(&field.value, &field.positions, trail);
                trail.leave();
            }
            Val::Struct(Arc::new(out))
        }
        Val::List(l) => {
            let mut elems = Vec::with_capacity(l.elems.len());
            for (i, elem) in l.elems.iter().enumerate() {
                trail.labels.push(i.to_string());
                elems.push(resolve_defaults(elem, positions, trail));
                trail.leave();
            }
            Val::List(Arc::new(ListVal {
                elems,
                rest: l.rest.clone(),
            }))
        }
        _ => val.clone(),
    }
}

/// Converts a value to JSON. Only regular fields are exported, and every
/// exported value must be concrete.
pub(crate) fn export(val: &Val) -> Result<Json, Diagnostics> {
    let mut trail = Trail::default();
    let json = to_json(val, &[], &mut trail);
    trail.finish(json)
}

fn to_json(val: &Val, positions: &[Pos], trail: &mut Trail) -> Json {
    match val {
        Val::Null => Json::Null,
        Val::Bool(b) => Json::Bool(*b),
        Val::Int(i) => match (i64::try_from(*i), u64::try_from(*i)) {
            (Ok(i), _) => Json::Number(i.into()),
            (_, Ok(u)) => Json::Number(u.into()),
            _ => {
                trail.error(format!("cannot represent {i} in JSON"), positions);
                Json::Null
            }
        },
        Val::Float(x) => match JsonNumber::from_f64(*x) {
            Some(n) => Json::Number(n),
            None => {
                trail.error(format!("cannot represent {x} in JSON"), positions);
                Json::Null
            }
        },
        Val::Str(s) => Json::String(s.to_string()),
        Val::Struct(s) => {
            let mut map = Map::new();
            for (label, field) in &s.fields {
                if field.label_kind != LabelKind::Regular
                    || field.optionality == Optionality::Optional
                {
                    continue;
                }
                trail.enter(label);
                if field.optionality == Optionality::Required {
                    trail.error("field is required but not present".to_string(), &field.positions);
                } else {
                    map.insert(label.clone(), to_json(&field.value, &field.positions, trail));
                }
                trail.leave();
            }
            Json::Object(map)
        }
        Val::List(l) => {
            let mut elems = Vec::with_capacity(l.elems.len());
            for (i, elem) in l.elems.iter().enumerate() {
                trail.labels.push(i.to_string());
                elems.push(to_json(elem, positions, trail));
                trail.leave();
            }
            Json::Array(elems)
        }
        Val::Disj(d) => match d.default_value() {
            Some(default) => to_json(default, positions, trail),
            None => {
                trail.error(format!("incomplete value {val}"), positions);
                Json::Null
            }
        },
        Val::Bottom(conflict) | Val::Incomplete(conflict) => {
            trail.conflict(conflict, positions);
            Json::Null
        }
        Val::Top | Val::Constraint { .. } => {
            trail.error(format!("incomplete value {val}"), positions);
            Json::Null
        }
    }
}
