//! Static reference check run when a package is built.
//!
//! Every identifier must name a field of an enclosing struct literal, a
//! predeclared type, or (in call position) a builtin function. Anything else
//! is reported with its position before evaluation starts.

use crate::ast::*;
use crate::diagnostic::Diagnostic;
use crate::eval::{BUILTIN_FUNCTIONS, predeclared};

/// Reports every unresolved identifier under `root`.
pub(crate) fn check_references(root: &StructLit) -> Vec<Diagnostic> {
    let mut errors = Vec::new();
    let mut scopes = Vec::new();
    check_struct(root, &mut scopes, &mut errors);
    errors
}

fn check_struct<'a>(
    lit: &'a StructLit,
    scopes: &mut Vec<&'a StructLit>,
    errors: &mut Vec<Diagnostic>,
) {
    scopes.push(lit);
    for decl in &lit.decls {
        match decl {
            Decl::Field(field) => check_expr(&field.value, scopes, errors),
            Decl::Pattern { matcher, value, .. } => {
                check_expr(matcher, scopes, errors);
                check_expr(value, scopes, errors);
            }
            Decl::Embed(expr) => check_expr(expr, scopes, errors),
            Decl::Ellipsis(_) => {}
        }
    }
    scopes.pop();
}

fn check_expr<'a>(expr: &'a Expr, scopes: &mut Vec<&'a StructLit>, errors: &mut Vec<Diagnostic>) {
    match &expr.kind {
        ExprKind::Top
        | ExprKind::Bottom
        | ExprKind::Null
        | ExprKind::Bool(_)
        | ExprKind::Int(_)
        | ExprKind::Float(_)
        | ExprKind::Str(_) => {}
        ExprKind::Ident(name) => {
            if !in_scope(name, scopes) && predeclared(name).is_none() {
                errors.push(not_found(name, expr));
            }
        }
        ExprKind::Interpolation(parts) => {
            for part in parts {
                if let InterpolationPart::Expr(expr) = part {
                    check_expr(expr, scopes, errors);
                }
            }
        }
        ExprKind::Selector(base, _) => check_expr(base, scopes, errors),
        ExprKind::Index(base, index) => {
            check_expr(base, scopes, errors);
            check_expr(index, scopes, errors);
        }
        ExprKind::Call(callee, args) => {
            match &callee.kind {
                ExprKind::Ident(name) if BUILTIN_FUNCTIONS.contains(&name.as_str()) => {}
                ExprKind::Ident(name) if !in_scope(name, scopes) => {
                    errors.push(not_found(name, callee));
                }
                _ => check_expr(callee, scopes, errors),
            }
            for arg in args {
                check_expr(arg, scopes, errors);
            }
        }
        ExprKind::Struct(lit) => check_struct(lit, scopes, errors),
        ExprKind::List(lit) => {
            for elem in lit.elems.iter().chain(lit.rest.iter()) {
                check_expr(elem, scopes, errors);
            }
        }
        ExprKind::Unary(_, operand) => check_expr(operand, scopes, errors),
        ExprKind::Binary(..) => {
            // Operator chains nest to the left; walk that spine without recursing.
            let mut operands = Vec::new();
            let mut node = expr;
            while let ExprKind::Binary(_, left, right) = &node.kind {
                operands.push(right.as_ref());
                node = left.as_ref();
            }
            check_expr(node, scopes, errors);
            for operand in operands.into_iter().rev() {
                check_expr(operand, scopes, errors);
            }
        }
    }
}

fn in_scope(name: &str, scopes: &[&StructLit]) -> bool {
    scopes.iter().rev().any(|scope| scope.declares(name))
}

fn not_found(name: &str, expr: &Expr) -> Diagnostic {
    Diagnostic::at(expr.pos.clone(), format!("reference {name:?} not found"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_file;
    use crate::source::SourceFile;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn unresolved(src: &str) -> Vec<String> {
        let file = SourceFile::new("test.cue", src.to_string());
        let parsed = parse_file(&file).unwrap();
        let root = StructLit {
            decls: parsed.decls,
            pos: parsed.pos,
        };
        check_references(&root)
            .into_iter()
            .map(|diagnostic| diagnostic.to_string())
            .collect()
    }

    #[rstest]
    #[case::sibling("a: 1\nb: a")]
    #[case::enclosing_scope("a: 1\nb: {c: a}")]
    #[case::declared_later("b: a.x\na: x: 1")]
    #[case::predeclared("a: int | string | bool")]
    #[case::builtins("l: [1]\nn: len(l)\nc: close({x: 1})")]
    #[case::pattern_value("#T: int\nm: [string]: #T")]
    #[case::interpolation("n: 1\ns: \"\\(n)\"")]
    #[case::definitions_and_hidden("#D: 1\n_h: #D\nx: _h")]
    fn resolvable_references(#[case] src: &str) {
        assert_eq!(unresolved(src), Vec::<String>::new());
    }

    #[test]
    fn every_unresolved_name_is_reported() {
        assert_eq!(
            unresolved("x: *nope | 3\ny: {z: \"\\(missing)\"}\nn: size(x)"),
            vec![
                "reference \"nope\" not found:\n    test.cue:1:5",
                "reference \"missing\" not found:\n    test.cue:2:11",
                "reference \"size\" not found:\n    test.cue:3:4",
            ]
        );
    }

    #[test]
    fn selector_on_unknown_base() {
        assert_eq!(
            unresolved("runtime: _\npath: *runtim.currentDirectory | _"),
            vec!["reference \"runtim\" not found:\n    test.cue:2:8"]
        );
    }

    #[test]
    fn inner_fields_are_not_visible_outside() {
        assert_eq!(
            unresolved("a: {inner: 1}\nb: inner"),
            vec!["reference \"inner\" not found:\n    test.cue:2:4"]
        );
    }

    #[test]
    fn long_operator_chains() {
        let src = format!("a: 0{}\nb: a{}", " + a".repeat(2_000), " | x".repeat(2));
        assert_eq!(
            unresolved(&src),
            vec![
                "reference \"x\" not found:\n    test.cue:2:8",
                "reference \"x\" not found:\n    test.cue:2:12",
            ]
        );
    }

    #[test]
    fn quoted_labels_are_not_referable() {
        assert_eq!(
            unresolved("\"a\": 1\nb: a"),
            vec!["reference \"a\" not found:\n    test.cue:2:4"]
        );
    }
}
