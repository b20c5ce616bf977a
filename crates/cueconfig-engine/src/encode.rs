//! Conversion of host data into values.

use std::sync::Arc;

use serde_json::Value as Json;

use crate::ast::{LabelKind, Optionality};
use crate::value::{FieldVal, ListVal, StructVal, Val};

/// Maps JSON to a value: objects become open structs, arrays closed lists,
/// integers (signed or unsigned 64-bit) `int` and every other number `float`.
pub(crate) fn encode(json: &Json) -> Val {
    match json {
        Json::Null => Val::Null,
        Json::Bool(b) => Val::Bool(*b),
        Json::Number(n) => match (n.as_i64(), n.as_u64()) {
            (Some(i), _) => Val::Int(i.into()),
            (None, Some(u)) => Val::Int(u.into()),
            (None, None) => Val::Float(n.as_f64().unwrap_or(f64::NAN)),
        },
        Json::String(s) => Val::str(s.as_str()),
        Json::Array(items) => Val::List(Arc::new(ListVal {
            elems: items.iter().map(encode).collect(),
            rest: None,
        })),
        Json::Object(map) => Val::Struct(Arc::new(StructVal {
            fields: map
                .iter()
                .map(|(label, value)| {
                    let field = FieldVal {
                        value: encode(value),
                        optionality: Optionality::Regular,
                        label_kind: LabelKind::Regular,
                        positions: Vec::new(),
                    };
                    (label.clone(), field)
                })
                .collect(),
            patterns: Vec::new(),
            closed: false,
        })),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn numbers_keep_their_kind() {
        assert_eq!(encode(&json!(3)), Val::Int(3));
        assert_eq!(encode(&json!(3.5)), Val::Float(3.5));
        assert_eq!(encode(&json!(u64::MAX)), Val::Int(u64::MAX.into()));
        assert_eq!(encode(&json!(i64::MIN)), Val::Int(i64::MIN.into()));
    }

    #[test]
    fn objects_are_open_structs() {
        let Val::Struct(s) = encode(&json!({"env": {"HOME": "/root"}})) else {
            panic!("expected struct");
        };
        assert!(!s.closed);
        let Val::Struct(env) = &s.fields["env"].value else {
            panic!("expected struct");
        };
        assert_eq!(env.fields["HOME"].value, Val::str("/root"));
    }
}
