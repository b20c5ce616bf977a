//! Vertex-based evaluation.
//!
//! Every field path (a "vertex") collects the conjuncts that apply to it: the
//! values declared for that label in struct literals, matching pattern
//! constraints, embedded expressions, and the conjuncts of referenced
//! fields. References resolve lexically to a path; the conjuncts found there
//! are re-evaluated at the referring vertex, so a struct pulled in by
//! reference sees the fields it is unified with.
//!
//! Cycles never recurse without bound. A vertex that depends on its own
//! value is *incomplete* (a reference cycle). A vertex whose structure
//! contains itself is an error (a structural cycle), except below optional
//! fields, pattern constraints and list element types, where expansion
//! simply stops.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::rc::Rc;
use std::sync::Arc;

use regex::Regex;

use crate::ast::*;
use crate::source::Pos;
use crate::unify::{self, unify};
use crate::value::*;

/// Bounds the combined nesting of vertex evaluation, expression evaluation
/// and reference expansion. A reference hop costs at most a few levels, so
/// chains of well over a hundred references evaluate. Evaluation runs on a
/// stack sized for this bound (see [`crate::context`]).
pub(crate) const MAX_DEPTH: usize = 1024;

/// Functions callable by name.
pub(crate) const BUILTIN_FUNCTIONS: &[&str] = &["len", "close"];

#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub(crate) enum Label {
    Field(String),
    Index(usize),
    /// The value of the n-th pattern constraint of a struct.
    Pattern(usize),
    /// The element type of an open list.
    Rest,
    /// A struct or list literal evaluated outside any field.
    Anon(usize),
}

impl Label {
    fn is_definition(&self) -> bool {
        matches!(self, Label::Field(name) if LabelKind::of_ident(name) == LabelKind::Definition)
    }
}

pub(crate) type Path = Vec<Label>;

fn child(path: &[Label], label: Label) -> Path {
    let mut child = Vec::with_capacity(path.len() + 1);
    child.extend_from_slice(path);
    child.push(label);
    child
}

/// A lexical scope: a struct literal and the vertex it is evaluated at.
pub(crate) struct Scope {
    lit: Arc<StructLit>,
    path: Path,
    parent: Env,
}

#[derive(Clone, Default)]
pub(crate) struct Env(Option<Arc<Scope>>);

impl Env {
    fn child(&self, lit: Arc<StructLit>, path: Path) -> Env {
        Env(Some(Arc::new(Scope {
            lit,
            path,
            parent: self.clone(),
        })))
    }
}

/// The reference targets expanded to produce a conjunct.
#[derive(Clone, Default)]
pub(crate) struct Via(Option<Arc<ViaNode>>);

struct ViaNode {
    target: Path,
    parent: Via,
}

impl Via {
    fn push(&self, target: Path) -> Via {
        Via(Some(Arc::new(ViaNode {
            target,
            parent: self.clone(),
        })))
    }

    fn contains(&self, target: &[Label]) -> bool {
        let mut node = self.0.as_ref();
        while let Some(n) = node {
            if n.target == target {
                return true;
            }
            node = n.parent.0.as_ref();
        }
        false
    }

    fn is_empty(&self) -> bool {
        self.0.is_none()
    }
}

/// One constraint applying to a vertex.
#[derive(Clone)]
pub(crate) enum Conjunct {
    Expr {
        expr: Arc<Expr>,
        env: Env,
        /// Set when reached through a definition or `close`.
        closed: bool,
        via: Via,
    },
    Val(Val),
}

impl Conjunct {
    /// A conjunct for a top-level expression, such as a file body.
    pub(crate) fn root(expr: Expr) -> Conjunct {
        Conjunct::Expr {
            expr: Arc::new(expr),
            env: Env::default(),
            closed: false,
            via: Via::default(),
        }
    }

    fn via_is_empty(&self) -> bool {
        match self {
            Conjunct::Expr { via, .. } => via.is_empty(),
            Conjunct::Val(_) => true,
        }
    }

    fn rerooted(self, close: bool, via: &Via) -> Conjunct {
        match self {
            Conjunct::Expr {
                expr, env, closed, ..
            } => Conjunct::Expr {
                expr,
                env,
                closed: closed || close,
                via: via.clone(),
            },
            Conjunct::Val(val) if close => Conjunct::Val(unify::close(&val)),
            other => other,
        }
    }
}

struct FieldArc {
    conjuncts: Vec<Conjunct>,
    optionality: Optionality,
    label_kind: LabelKind,
    positions: Vec<Pos>,
}

/// Labels declared together by one struct literal and its embeddings.
#[derive(Default)]
struct Group {
    closed: bool,
    /// Set by `...`.
    open: bool,
    labels: HashSet<String>,
    patterns: Vec<usize>,
}

struct PatternArc {
    matcher: Conjunct,
    value: Conjunct,
}

enum ListSource {
    Lit {
        lit: Arc<ListLit>,
        env: Env,
        closed: bool,
        via: Via,
    },
    Val(Arc<ListVal>),
}

impl ListSource {
    fn len(&self) -> usize {
        match self {
            ListSource::Lit { lit, .. } => lit.elems.len(),
            ListSource::Val(list) => list.elems.len(),
        }
    }

    fn is_open(&self) -> bool {
        match self {
            ListSource::Lit { lit, .. } => lit.rest.is_some(),
            ListSource::Val(list) => list.rest.is_some(),
        }
    }

    fn element(&self, i: usize) -> Option<Conjunct> {
        match self {
            ListSource::Lit {
                lit,
                env,
                closed,
                via,
            } => lit.elems.get(i).or(lit.rest.as_ref()).map(|expr| Conjunct::Expr {
                expr: expr.clone(),
                env: env.clone(),
                closed: *closed,
                via: via.clone(),
            }),
            ListSource::Val(list) => list
                .elems
                .get(i)
                .or(list.rest.as_ref())
                .map(|val| Conjunct::Val(val.clone())),
        }
    }

    fn rest(&self) -> Option<Conjunct> {
        match self {
            ListSource::Lit {
                lit,
                env,
                closed,
                via,
            } => lit.rest.as_ref().map(|expr| Conjunct::Expr {
                expr: expr.clone(),
                env: env.clone(),
                closed: *closed,
                via: via.clone(),
            }),
            ListSource::Val(list) => list.rest.clone().map(Conjunct::Val),
        }
    }
}

/// The expanded conjuncts of one vertex.
#[derive(Default)]
struct Arcs {
    is_struct: bool,
    fields: BTreeMap<String, FieldArc>,
    groups: Vec<Group>,
    patterns: Vec<PatternArc>,
    lists: Vec<ListSource>,
    others: Vec<Conjunct>,
    positions: Vec<Pos>,
    /// Below an optional field, pattern constraint or list element type.
    lazy: bool,
    /// Has at least one conjunct not produced by expanding a reference.
    backed: bool,
}

impl Arcs {
    fn group(&mut self, group: Option<usize>, closed: bool) -> usize {
        match group {
            Some(id) => {
                self.groups[id].closed |= closed;
                id
            }
            None => {
                self.groups.push(Group {
                    closed,
                    ..Group::default()
                });
                self.groups.len() - 1
            }
        }
    }

    fn add_field(
        &mut self,
        label: &str,
        conjunct: Conjunct,
        optionality: Optionality,
        label_kind: LabelKind,
        positions: &[Pos],
        group: usize,
    ) {
        let field = self
            .fields
            .entry(label.to_string())
            .or_insert_with(|| FieldArc {
                conjuncts: Vec::new(),
                optionality,
                label_kind,
                positions: Vec::new(),
            });
        field.conjuncts.push(conjunct);
        field.optionality = field.optionality.max(optionality);
        for pos in positions {
            if !field.positions.contains(pos) {
                field.positions.push(pos.clone());
            }
        }
        self.groups[group].labels.insert(label.to_string());
    }

    fn add_pattern(&mut self, matcher: Conjunct, value: Conjunct, group: usize) {
        self.patterns.push(PatternArc { matcher, value });
        let index = self.patterns.len() - 1;
        self.groups[group].patterns.push(index);
    }
}

enum Lookup {
    Found(Vec<Conjunct>),
    Missing,
    Cycle,
}

enum Resolved {
    Path(Path),
    Builtin(Val),
    Error(Val),
}

/// The context an expression is evaluated in.
struct Ctx<'a> {
    env: &'a Env,
    closed: bool,
    via: &'a Via,
}

/// Evaluates one root value. Results are cached per vertex, so an evaluator
/// is used for a single evaluation and then dropped.
pub(crate) struct Evaluator {
    roots: Vec<Conjunct>,
    arcs: HashMap<Path, Rc<Arcs>>,
    arcs_in_progress: HashSet<Path>,
    values: HashMap<Path, Val>,
    in_progress: HashSet<Path>,
    matchers: HashMap<Path, Rc<Vec<Val>>>,
    anchors: HashMap<Path, Vec<Conjunct>>,
    next_anchor: usize,
    depth: usize,
}

impl Evaluator {
    pub(crate) fn new(roots: Vec<Conjunct>) -> Self {
        Self {
            roots,
            arcs: HashMap::new(),
            arcs_in_progress: HashSet::new(),
            values: HashMap::new(),
            in_progress: HashSet::new(),
            matchers: HashMap::new(),
            anchors: HashMap::new(),
            next_anchor: 0,
            depth: 0,
        }
    }

    pub(crate) fn evaluate(&mut self) -> Val {
        self.eval_vertex(&[])
    }

    /// Number of vertices evaluated so far.
    pub(crate) fn vertex_count(&self) -> usize {
        self.values.len()
    }

    // Conjunct collection

    fn vertex_conjuncts(&mut self, path: &[Label]) -> Lookup {
        let Some((last, parent)) = path.split_last() else {
            return Lookup::Found(self.roots.clone());
        };
        if let Some(conjuncts) = self.anchors.get(path) {
            return Lookup::Found(conjuncts.clone());
        }
        if self.arcs_in_progress.contains(parent) {
            return self.declared_conjuncts(parent, last);
        }

        let arcs = self.arcs(parent);
        match last {
            Label::Field(name) => {
                let Some(field) = arcs.fields.get(name) else {
                    return Lookup::Missing;
                };
                let mut conjuncts = field.conjuncts.clone();
                if field.label_kind == LabelKind::Regular && !arcs.patterns.is_empty() {
                    let matchers = self.pattern_matchers(parent, &arcs);
                    for (pattern, matcher) in arcs.patterns.iter().zip(matchers.iter()) {
                        if matcher.matches_label(name) {
                            conjuncts.push(pattern.value.clone());
                        }
                    }
                }
                Lookup::Found(conjuncts)
            }
            Label::Index(i) => {
                if !arcs.lists.iter().any(|list| *i < list.len()) {
                    return Lookup::Missing;
                }
                Lookup::Found(arcs.lists.iter().filter_map(|list| list.element(*i)).collect())
            }
            Label::Rest => Lookup::Found(arcs.lists.iter().filter_map(ListSource::rest).collect()),
            Label::Pattern(i) => match arcs.patterns.get(*i) {
                Some(pattern) => Lookup::Found(vec![pattern.value.clone()]),
                None => Lookup::Missing,
            },
            Label::Anon(_) => Lookup::Missing,
        }
    }

    /// Finds a field's conjuncts from the literal declarations of a vertex
    /// whose arcs are still being expanded.
    fn declared_conjuncts(&mut self, parent: &[Label], label: &Label) -> Lookup {
        let Label::Field(name) = label else {
            return Lookup::Cycle;
        };
        let Lookup::Found(parent_conjuncts) = self.vertex_conjuncts(parent) else {
            return Lookup::Cycle;
        };
        let mut found = Vec::new();
        for conjunct in parent_conjuncts {
            match conjunct {
                Conjunct::Expr {
                    expr,
                    env,
                    closed,
                    via,
                } => {
                    let ExprKind::Struct(lit) = &expr.kind else {
                        continue;
                    };
                    let scope = env.child(lit.clone(), parent.to_vec());
                    for decl in &lit.decls {
                        if let Decl::Field(field) = decl {
                            if &field.label == name {
                                found.push(Conjunct::Expr {
                                    expr: field.value.clone(),
                                    env: scope.clone(),
                                    closed: closed || field.label_kind == LabelKind::Definition,
                                    via: via.clone(),
                                });
                            }
                        }
                    }
                }
                Conjunct::Val(Val::Struct(s)) => {
                    if let Some(field) = s.fields.get(name) {
                        found.push(Conjunct::Val(field.value.clone()));
                    }
                }
                Conjunct::Val(_) => {}
            }
        }
        if found.is_empty() {
            Lookup::Cycle
        } else {
            Lookup::Found(found)
        }
    }

    fn pattern_matchers(&mut self, path: &[Label], arcs: &Arcs) -> Rc<Vec<Val>> {
        if let Some(matchers) = self.matchers.get(path) {
            return matchers.clone();
        }
        let matchers: Vec<Val> = arcs
            .patterns
            .iter()
            .map(|pattern| self.eval_conjunct(&pattern.matcher))
            .collect();
        let matchers = Rc::new(matchers);
        self.matchers.insert(path.to_vec(), matchers.clone());
        matchers
    }

    fn arcs(&mut self, path: &[Label]) -> Rc<Arcs> {
        if let Some(arcs) = self.arcs.get(path) {
            return arcs.clone();
        }
        let conjuncts = match self.vertex_conjuncts(path) {
            Lookup::Found(conjuncts) => conjuncts,
            Lookup::Missing => Vec::new(),
            Lookup::Cycle => vec![Conjunct::Val(Val::cycle())],
        };

        let mut arcs = Arcs {
            lazy: self.is_lazy(path),
            backed: conjuncts.iter().any(Conjunct::via_is_empty),
            ..Arcs::default()
        };
        self.arcs_in_progress.insert(path.to_vec());
        for conjunct in conjuncts {
            self.add_conjunct(&mut arcs, conjunct, path, None);
        }
        self.arcs_in_progress.remove(path);

        let arcs = Rc::new(arcs);
        self.arcs.insert(path.to_vec(), arcs.clone());
        arcs
    }

    fn is_lazy(&self, path: &[Label]) -> bool {
        let Some((last, parent)) = path.split_last() else {
            return false;
        };
        let parent_arcs = self.arcs.get(parent);
        if parent_arcs.is_some_and(|arcs| arcs.lazy) {
            return true;
        }
        match last {
            Label::Pattern(_) | Label::Rest => true,
            Label::Field(name) => parent_arcs
                .and_then(|arcs| arcs.fields.get(name))
                .is_some_and(|field| field.optionality == Optionality::Optional),
            Label::Index(_) | Label::Anon(_) => false,
        }
    }

    fn add_conjunct(
        &mut self,
        arcs: &mut Arcs,
        conjunct: Conjunct,
        path: &[Label],
        group: Option<usize>,
    ) {
        if self.depth >= MAX_DEPTH {
            arcs.others
                .push(Conjunct::Val(Val::bottom("evaluation depth exceeded")));
            return;
        }
        self.depth += 1;
        match conjunct {
            Conjunct::Val(val) => add_val(arcs, val, group),
            Conjunct::Expr {
                expr,
                env,
                closed,
                via,
            } => {
                if !arcs.positions.contains(&expr.pos) {
                    arcs.positions.push(expr.pos.clone());
                }
                match &expr.kind {
                    ExprKind::Struct(lit) => {
                        let lit = lit.clone();
                        self.add_struct(arcs, lit, &env, closed, &via, path, group);
                    }
                    ExprKind::List(lit) => arcs.lists.push(ListSource::Lit {
                        lit: lit.clone(),
                        env,
                        closed,
                        via,
                    }),
                    ExprKind::Binary(BinaryOp::Unification, left, right) => {
                        for side in [left, right] {
                            let side = Conjunct::Expr {
                                expr: side.clone(),
                                env: env.clone(),
                                closed,
                                via: via.clone(),
                            };
                            self.add_conjunct(arcs, side, path, group);
                        }
                    }
                    _ if expr.is_reference() => {
                        self.add_reference(arcs, expr, env, closed, via, path, group);
                    }
                    _ => arcs.others.push(Conjunct::Expr {
                        expr,
                        env,
                        closed,
                        via,
                    }),
                }
            }
        }
        self.depth -= 1;
    }

    #[allow(clippy::too_many_arguments)]
    fn add_struct(
        &mut self,
        arcs: &mut Arcs,
        lit: Arc<StructLit>,
        env: &Env,
        closed: bool,
        via: &Via,
        path: &[Label],
        group: Option<usize>,
    ) {
        // A literal made only of embeddings takes the shape of what it embeds.
        if lit.decls.is_empty() || lit.decls.iter().any(|d| !matches!(d, Decl::Embed(_))) {
            arcs.is_struct = true;
        }
        let group = arcs.group(group, closed);
        let scope = env.child(lit.clone(), path.to_vec());
        for decl in &lit.decls {
            match decl {
                Decl::Field(field) => {
                    let conjunct = Conjunct::Expr {
                        expr: field.value.clone(),
                        env: scope.clone(),
                        closed: closed || field.label_kind == LabelKind::Definition,
                        via: via.clone(),
                    };
                    arcs.add_field(
                        &field.label,
                        conjunct,
                        field.optionality,
                        field.label_kind,
                        std::slice::from_ref(&field.pos),
                        group,
                    );
                }
                Decl::Pattern { matcher, value, .. } => {
                    let matcher = Conjunct::Expr {
                        expr: matcher.clone(),
                        env: scope.clone(),
                        closed: false,
                        via: Via::default(),
                    };
                    let value = Conjunct::Expr {
                        expr: value.clone(),
                        env: scope.clone(),
                        closed,
                        via: via.clone(),
                    };
                    arcs.add_pattern(matcher, value, group);
                }
                Decl::Embed(expr) => {
                    let conjunct = Conjunct::Expr {
                        expr: expr.clone(),
                        env: scope.clone(),
                        closed,
                        via: via.clone(),
                    };
                    self.add_conjunct(arcs, conjunct, path, Some(group));
                }
                Decl::Ellipsis(_) => arcs.groups[group].open = true,
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn add_reference(
        &mut self,
        arcs: &mut Arcs,
        expr: Arc<Expr>,
        env: Env,
        closed: bool,
        via: Via,
        path: &[Label],
        group: Option<usize>,
    ) {
        let ctx = Ctx {
            env: &env,
            closed,
            via: &via,
        };
        let target = match self.resolve(&expr, &ctx) {
            Resolved::Path(target) => target,
            Resolved::Builtin(val) => {
                arcs.others.push(Conjunct::Val(val));
                return;
            }
            Resolved::Error(val) => {
                arcs.others.push(Conjunct::Val(val.with_positions(&[expr.pos.clone()])));
                return;
            }
        };

        // `a: a` adds no constraint.
        if target == path {
            return;
        }
        let encloses = target.len() < path.len() && path.starts_with(&target);
        if encloses || via.contains(&target) {
            let expand = !encloses && arcs.backed;
            if !expand {
                if !arcs.lazy {
                    let mut conflict = Conflict::new("structural cycle");
                    conflict.positions.push(expr.pos.clone());
                    arcs.others.push(Conjunct::Val(Val::Bottom(Box::new(conflict))));
                }
                return;
            }
        }
        if self.arcs_in_progress.contains(&target) {
            arcs.others.push(Conjunct::Val(cycle_at(&expr.pos)));
            return;
        }

        match self.vertex_conjuncts(&target) {
            Lookup::Found(conjuncts) => {
                let close = closed || target.iter().any(Label::is_definition);
                let via = via.push(target);
                for conjunct in conjuncts {
                    self.add_conjunct(arcs, conjunct.rerooted(close, &via), path, group);
                }
            }
            Lookup::Missing => arcs.others.push(Conjunct::Expr {
                expr,
                env,
                closed,
                via,
            }),
            Lookup::Cycle => arcs.others.push(Conjunct::Val(cycle_at(&expr.pos))),
        }
    }

    // Vertex evaluation

    pub(crate) fn eval_vertex(&mut self, path: &[Label]) -> Val {
        if let Some(val) = self.values.get(path) {
            return val.clone();
        }
        if self.in_progress.contains(path) {
            return Val::cycle();
        }
        if self.depth >= MAX_DEPTH {
            return Val::bottom("evaluation depth exceeded");
        }
        self.depth += 1;
        self.in_progress.insert(path.to_vec());

        let arcs = self.arcs(path);
        let val = self.build_vertex(path, &arcs);

        self.in_progress.remove(path);
        self.depth -= 1;
        self.values.insert(path.to_vec(), val.clone());
        val
    }

    fn build_vertex(&mut self, path: &[Label], arcs: &Arcs) -> Val {
        let mut result = Val::Top;
        if arcs.is_struct {
            result = Val::Struct(Arc::new(self.build_struct(path, arcs)));
        }
        if !arcs.lists.is_empty() {
            let list = self.build_list(path, arcs);
            result = unify(&result, &list);
        }
        for conjunct in &arcs.others {
            if result.is_bottom() {
                break;
            }
            let val = self.eval_conjunct(conjunct);
            result = unify(&result, &val);
        }
        match result {
            // Each vertex in a cycle cites its own conjuncts.
            Val::Incomplete(mut conflict) if conflict.cycle && !arcs.positions.is_empty() => {
                conflict.positions = arcs.positions.clone();
                Val::Incomplete(conflict)
            }
            result => result.with_positions(&arcs.positions),
        }
    }

    fn build_struct(&mut self, path: &[Label], arcs: &Arcs) -> StructVal {
        let matchers = self.pattern_matchers(path, arcs);
        let closed_groups: Vec<&Group> = arcs
            .groups
            .iter()
            .filter(|group| group.closed && !group.open)
            .collect();

        let mut fields = BTreeMap::new();
        for (label, field) in &arcs.fields {
            let mut value = self.eval_vertex(&child(path, Label::Field(label.clone())));
            let allowed = field.label_kind != LabelKind::Regular
                || closed_groups.iter().all(|group| {
                    group.labels.contains(label)
                        || group.patterns.iter().any(|&i| matchers[i].matches_label(label))
                });
            if !allowed {
                let mut conflict = Conflict::new("field not allowed");
                conflict.positions = field.positions.clone();
                value = Val::Bottom(Box::new(conflict));
            }
            fields.insert(
                label.clone(),
                FieldVal {
                    value: value.with_positions(&field.positions),
                    optionality: field.optionality,
                    label_kind: field.label_kind,
                    positions: field.positions.clone(),
                },
            );
        }

        let mut patterns: Vec<PatternVal> = Vec::new();
        for (i, matcher) in matchers.iter().enumerate() {
            let pattern = PatternVal {
                matcher: matcher.clone(),
                value: self.eval_vertex(&child(path, Label::Pattern(i))),
            };
            if !patterns.contains(&pattern) {
                patterns.push(pattern);
            }
        }

        StructVal {
            fields,
            patterns,
            closed: !closed_groups.is_empty(),
        }
    }

    fn build_list(&mut self, path: &[Label], arcs: &Arcs) -> Val {
        let len = arcs.lists.iter().map(ListSource::len).max().unwrap_or(0);
        let open = arcs.lists.iter().all(ListSource::is_open);
        if let Some(short) = arcs
            .lists
            .iter()
            .find(|list| !list.is_open() && list.len() != len)
        {
            return Val::bottom(format!(
                "incompatible list lengths ({} and {len})",
                short.len()
            ));
        }
        let elems = (0..len)
            .map(|i| self.eval_vertex(&child(path, Label::Index(i))))
            .collect();
        let rest = open.then(|| self.eval_vertex(&child(path, Label::Rest)));
        Val::List(Arc::new(ListVal { elems, rest }))
    }

    fn eval_conjunct(&mut self, conjunct: &Conjunct) -> Val {
        match conjunct {
            Conjunct::Val(val) => val.clone(),
            Conjunct::Expr {
                expr,
                env,
                closed,
                via,
            } => {
                let ctx = Ctx {
                    env,
                    closed: *closed,
                    via,
                };
                self.eval_expr(expr, &ctx)
            }
        }
    }

    /// Evaluates a struct or list literal used as an operand.
    fn eval_anchored(&mut self, expr: &Arc<Expr>, ctx: &Ctx<'_>) -> Val {
        let path = vec![Label::Anon(self.next_anchor)];
        self.next_anchor += 1;
        self.anchors.insert(
            path.clone(),
            vec![Conjunct::Expr {
                expr: expr.clone(),
                env: ctx.env.clone(),
                closed: ctx.closed,
                via: ctx.via.clone(),
            }],
        );
        self.eval_vertex(&path)
    }

    // References

    fn resolve(&mut self, expr: &Expr, ctx: &Ctx<'_>) -> Resolved {
        match &expr.kind {
            ExprKind::Ident(name) => {
                let mut scope = ctx.env.0.as_ref();
                while let Some(s) = scope {
                    if s.lit.declares(name) {
                        return Resolved::Path(child(&s.path, Label::Field(name.clone())));
                    }
                    scope = s.parent.0.as_ref();
                }
                match predeclared(name) {
                    Some(val) => Resolved::Builtin(val),
                    None => Resolved::Error(Val::bottom(format!("reference {name:?} not found"))),
                }
            }
            ExprKind::Selector(base, name) => match self.resolve(base, ctx) {
                Resolved::Path(path) => Resolved::Path(child(&path, Label::Field(name.clone()))),
                Resolved::Builtin(val) => {
                    Resolved::Error(Val::bottom(format!("invalid selector {name} on {val}")))
                }
                error => error,
            },
            ExprKind::Index(base, index) => match self.resolve(base, ctx) {
                Resolved::Path(path) => {
                    let key = self.eval_expr(index, ctx);
                    match key.default_or_self() {
                        Val::Str(s) => Resolved::Path(child(&path, Label::Field(s.to_string()))),
                        Val::Int(i) => match usize::try_from(*i) {
                            Ok(index) => Resolved::Path(child(&path, Label::Index(index))),
                            Err(_) => {
                                Resolved::Error(Val::bottom(format!("index {i} out of range")))
                            }
                        },
                        Val::Bottom(_) | Val::Incomplete(_) => Resolved::Error(key.clone()),
                        other => Resolved::Error(Val::incomplete(format!("invalid index {other}"))),
                    }
                }
                Resolved::Builtin(val) => {
                    Resolved::Error(Val::bottom(format!("cannot index {val}")))
                }
                error => error,
            },
            _ => Resolved::Error(Val::bottom("invalid reference")),
        }
    }

    fn eval_reference(&mut self, path: &[Label]) -> Val {
        match self.vertex_conjuncts(path) {
            Lookup::Found(_) => self.eval_vertex(path),
            Lookup::Cycle => Val::cycle(),
            Lookup::Missing => {
                let Some((last, parent)) = path.split_last() else {
                    return self.eval_vertex(path);
                };
                let parent_val = self.eval_reference(parent);
                select(parent_val.default_or_self(), last)
            }
        }
    }

    // Expressions

    fn eval_expr(&mut self, expr: &Arc<Expr>, ctx: &Ctx<'_>) -> Val {
        if self.depth >= MAX_DEPTH {
            return Val::bottom("evaluation depth exceeded");
        }
        self.depth += 1;
        let val = self.eval_expr_inner(expr, ctx);
        self.depth -= 1;
        val.with_positions(std::slice::from_ref(&expr.pos))
    }

    fn eval_expr_inner(&mut self, expr: &Arc<Expr>, ctx: &Ctx<'_>) -> Val {
        match &expr.kind {
            ExprKind::Top => Val::Top,
            ExprKind::Bottom => Val::bottom("explicit error (_|_ literal) in source"),
            ExprKind::Null => Val::Null,
            ExprKind::Bool(b) => Val::Bool(*b),
            ExprKind::Int(i) => Val::Int(*i),
            ExprKind::Float(x) => Val::Float(*x),
            ExprKind::Str(s) => Val::str(s.as_str()),
            ExprKind::Interpolation(parts) => self.eval_interpolation(parts, ctx),
            ExprKind::Ident(_) | ExprKind::Selector(..) | ExprKind::Index(..)
                if expr.is_reference() =>
            {
                match self.resolve(expr, ctx) {
                    Resolved::Path(path) => self.eval_reference(&path),
                    Resolved::Builtin(val) | Resolved::Error(val) => val,
                }
            }
            ExprKind::Selector(base, name) => {
                let base = self.eval_expr(base, ctx);
                select(base.default_or_self(), &Label::Field(name.clone()))
            }
            ExprKind::Index(base, index) => {
                let base = self.eval_expr(base, ctx);
                let index = self.eval_expr(index, ctx);
                match index.default_or_self() {
                    Val::Str(s) => select(base.default_or_self(), &Label::Field(s.to_string())),
                    Val::Int(i) => match usize::try_from(*i) {
                        Ok(index) => select(base.default_or_self(), &Label::Index(index)),
                        Err(_) => Val::bottom(format!("index {i} out of range")),
                    },
                    Val::Bottom(_) | Val::Incomplete(_) => index.clone(),
                    other => Val::bottom(format!("invalid index {other}")),
                }
            }
            ExprKind::Ident(_) => Val::bottom("invalid reference"),
            ExprKind::Call(callee, args) => self.eval_call(callee, args, ctx),
            ExprKind::Struct(_) | ExprKind::List(_) => self.eval_anchored(expr, ctx),
            ExprKind::Unary(op, operand) => self.eval_unary(*op, operand, ctx),
            ExprKind::Binary(BinaryOp::Disjunction, ..) => {
                let mut alternatives = Vec::new();
                self.collect_alternatives(expr, ctx, false, &mut alternatives);
                Disjunction::normalize(alternatives)
            }
            ExprKind::Binary(BinaryOp::Unification, left, right) => {
                let left = self.eval_expr(left, ctx);
                let right = self.eval_expr(right, ctx);
                unify(&left, &right)
            }
            ExprKind::Binary(op, left, right) => {
                let left = self.eval_expr(left, ctx);
                let right = self.eval_expr(right, ctx);
                binary(*op, &left, &right)
            }
        }
    }

    fn collect_alternatives(
        &mut self,
        expr: &Arc<Expr>,
        ctx: &Ctx<'_>,
        marked: bool,
        out: &mut Vec<Alternative>,
    ) {
        match &expr.kind {
            ExprKind::Binary(BinaryOp::Disjunction, left, right) => {
                self.collect_alternatives(left, ctx, marked, out);
                self.collect_alternatives(right, ctx, marked, out);
            }
            ExprKind::Unary(UnaryOp::Default, operand) => {
                self.collect_alternatives(operand, ctx, true, out);
            }
            _ => match self.eval_expr(expr, ctx) {
                Val::Disj(d) => out.extend(d.alternatives.iter().map(|alt| Alternative {
                    value: alt.value.clone(),
                    default: marked || alt.default,
                })),
                value => out.push(Alternative {
                    value,
                    default: marked,
                }),
            },
        }
    }

    fn eval_interpolation(&mut self, parts: &[InterpolationPart], ctx: &Ctx<'_>) -> Val {
        let interpolable = Kind::STRING.union(Kind::NUMBER).union(Kind::BOOL);
        let mut out = String::new();
        for part in parts {
            match part {
                InterpolationPart::Lit(s) => out.push_str(s),
                InterpolationPart::Expr(expr) => {
                    let val = self.eval_expr(expr, ctx);
                    match val.default_or_self() {
                        Val::Str(s) => out.push_str(s),
                        Val::Int(i) => out.push_str(&i.to_string()),
                        Val::Float(x) => out.push_str(&format_float(*x)),
                        Val::Bool(b) => out.push_str(&b.to_string()),
                        Val::Bottom(_) | Val::Incomplete(_) => return val,
                        other if other.kind().intersect(interpolable).is_empty() => {
                            return Val::bottom(format!(
                                "invalid interpolation: cannot use {other}"
                            ));
                        }
                        other => {
                            return Val::incomplete(format!(
                                "incomplete value {other} in interpolation"
                            ));
                        }
                    }
                }
            }
        }
        Val::str(out)
    }

    fn eval_call(&mut self, callee: &Arc<Expr>, args: &[Arc<Expr>], ctx: &Ctx<'_>) -> Val {
        let ExprKind::Ident(name) = &callee.kind else {
            return Val::bottom("cannot call non-function");
        };
        if let Resolved::Path(_) = self.resolve(callee, ctx) {
            return Val::bottom(format!("cannot call non-function {name}"));
        }
        let [arg] = args else {
            return Val::bottom(format!("{name} takes exactly one argument, got {}", args.len()));
        };
        let arg = self.eval_expr(arg, ctx);
        match name.as_str() {
            "len" => builtin_len(arg.default_or_self()),
            "close" => match arg.default_or_self() {
                Val::Struct(_) => unify::close(arg.default_or_self()),
                Val::Bottom(_) | Val::Incomplete(_) => arg.clone(),
                other => Val::bottom(format!("close requires a struct, got {other}")),
            },
            _ => Val::bottom(format!("unknown function {name}")),
        }
    }

    fn eval_unary(&mut self, op: UnaryOp, operand: &Arc<Expr>, ctx: &Ctx<'_>) -> Val {
        let val = self.eval_expr(operand, ctx);
        if op == UnaryOp::Default {
            return val;
        }
        let val = match concrete(&val, op.symbol()) {
            Ok(val) => val,
            Err(err) => return err,
        };
        let bound = |bound: Bound| Val::Constraint {
            kind: bound.kind(),
            bounds: vec![bound],
        };
        match (op, &val) {
            (UnaryOp::Neg, Val::Int(i)) => i
                .checked_neg()
                .map_or_else(|| Val::bottom("integer overflow"), Val::Int),
            (UnaryOp::Neg, Val::Float(x)) => Val::Float(-x),
            (UnaryOp::Plus, Val::Int(_) | Val::Float(_)) => val.clone(),
            (UnaryOp::Not, Val::Bool(b)) => Val::Bool(!b),
            (UnaryOp::Ne, _) => Val::Constraint {
                kind: Kind::ANY,
                bounds: vec![Bound::Ne(val.clone())],
            },
            (UnaryOp::Match | UnaryOp::NotMatch, Val::Str(pattern)) => match Regex::new(pattern) {
                Ok(re) if op == UnaryOp::Match => bound(Bound::Match(Arc::new(re))),
                Ok(re) => bound(Bound::NotMatch(Arc::new(re))),
                Err(err) => Val::bottom(format!("invalid regular expression {pattern:?}: {err}")),
            },
            (UnaryOp::Lt | UnaryOp::Le | UnaryOp::Gt | UnaryOp::Ge, _) => {
                let Some(limit) = Scalar::of(&val) else {
                    return Val::bottom(format!("invalid operand {val} for unary {}", op.symbol()));
                };
                bound(match op {
                    UnaryOp::Lt => Bound::Lt(limit),
                    UnaryOp::Le => Bound::Le(limit),
                    UnaryOp::Gt => Bound::Gt(limit),
                    _ => Bound::Ge(limit),
                })
            }
            _ => Val::bottom(format!("invalid operand {val} for unary {}", op.symbol())),
        }
    }
}

fn add_val(arcs: &mut Arcs, val: Val, group: Option<usize>) {
    match val {
        Val::Top => {}
        Val::Struct(s) => {
            arcs.is_struct = true;
            let group = arcs.group(group, s.closed);
            for (label, field) in &s.fields {
                arcs.add_field(
                    label,
                    Conjunct::Val(field.value.clone()),
                    field.optionality,
                    field.label_kind,
                    &field.positions,
                    group,
                );
            }
            for pattern in &s.patterns {
                arcs.add_pattern(
                    Conjunct::Val(pattern.matcher.clone()),
                    Conjunct::Val(pattern.value.clone()),
                    group,
                );
            }
        }
        Val::List(list) => arcs.lists.push(ListSource::Val(list)),
        other => arcs.others.push(Conjunct::Val(other)),
    }
}

fn cycle_at(pos: &Pos) -> Val {
    let mut conflict = Conflict::cycle();
    conflict.positions.push(pos.clone());
    Val::Incomplete(Box::new(conflict))
}

pub(crate) fn predeclared(name: &str) -> Option<Val> {
    let kind = match name {
        "int" => Kind::INT,
        "float" => Kind::FLOAT,
        "number" => Kind::NUMBER,
        "string" => Kind::STRING,
        "bool" => Kind::BOOL,
        "bytes" => Kind::BYTES,
        _ => return None,
    };
    Some(Val::kind_constraint(kind))
}

/// Selects a field or element from an evaluated value.
fn select(base: &Val, label: &Label) -> Val {
    match (base, label) {
        (Val::Bottom(_) | Val::Incomplete(_), _) => base.clone(),
        (Val::Struct(s), Label::Field(name)) => match s.fields.get(name) {
            Some(field) if field.optionality == Optionality::Regular => field.value.clone(),
            Some(_) => Val::incomplete(format!("cannot reference optional field: {name}")),
            None if s.closed => Val::bottom(format!("undefined field: {name}")),
            None => Val::incomplete(format!("undefined field: {name}")),
        },
        (Val::List(l), Label::Index(i)) => match l.elems.get(*i) {
            Some(elem) => elem.clone(),
            None => Val::bottom(format!("index out of range [{i}] with length {}", l.elems.len())),
        },
        (Val::Top | Val::Constraint { .. } | Val::Disj(_), Label::Field(name)) => {
            Val::incomplete(format!("undefined field: {name}"))
        }
        (Val::Top | Val::Constraint { .. } | Val::Disj(_), _) => {
            Val::incomplete("incomplete list index")
        }
        (_, Label::Field(name)) => Val::bottom(format!("invalid selector {name} on {base}")),
        _ => Val::bottom(format!("cannot index {base}")),
    }
}

/// Resolves an operand to a concrete scalar.
fn concrete(val: &Val, op: &str) -> Result<Val, Val> {
    let val = val.default_or_self();
    match val {
        Val::Bottom(_) | Val::Incomplete(_) => Err(val.clone()),
        _ if val.is_scalar() => Ok(val.clone()),
        Val::Struct(_) | Val::List(_) => Ok(val.clone()),
        other => Err(Val::incomplete(format!(
            "operand {other} of '{op}' is not concrete"
        ))),
    }
}

fn binary(op: BinaryOp, left: &Val, right: &Val) -> Val {
    let symbol = op.symbol();
    let (left, right) = match (concrete(left, symbol), concrete(right, symbol)) {
        (Ok(l), Ok(r)) => (l, r),
        (Err(err), _) | (_, Err(err)) => return err,
    };
    let invalid = || Val::bottom(format!("invalid operands {left} and {right} to '{symbol}'"));
    match op {
        BinaryOp::Or | BinaryOp::And => match (&left, &right) {
            (Val::Bool(a), Val::Bool(b)) => {
                Val::Bool(if op == BinaryOp::Or { *a || *b } else { *a && *b })
            }
            _ => invalid(),
        },
        BinaryOp::Eq | BinaryOp::Ne => {
            let equal = match (&left, &right) {
                (Val::Null, _) | (_, Val::Null) => left == right,
                _ => match (Scalar::of(&left), Scalar::of(&right)) {
                    (Some(a), Some(b)) => match a.compare(&b) {
                        Some(ordering) => ordering.is_eq(),
                        None => return invalid(),
                    },
                    _ => match (&left, &right) {
                        (Val::Bool(a), Val::Bool(b)) => a == b,
                        _ => return invalid(),
                    },
                },
            };
            Val::Bool(if op == BinaryOp::Eq { equal } else { !equal })
        }
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
            let ordering = Scalar::of(&left)
                .zip(Scalar::of(&right))
                .and_then(|(a, b)| a.compare(&b));
            match ordering {
                Some(ordering) => Val::Bool(match op {
                    BinaryOp::Lt => ordering.is_lt(),
                    BinaryOp::Le => ordering.is_le(),
                    BinaryOp::Gt => ordering.is_gt(),
                    _ => ordering.is_ge(),
                }),
                None => invalid(),
            }
        }
        BinaryOp::Match | BinaryOp::NotMatch => match (&left, &right) {
            (Val::Str(s), Val::Str(pattern)) => match Regex::new(pattern) {
                Ok(re) => Val::Bool(re.is_match(s) == (op == BinaryOp::Match)),
                Err(err) => Val::bottom(format!("invalid regular expression {pattern:?}: {err}")),
            },
            _ => invalid(),
        },
        BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div => {
            arithmetic(op, &left, &right).unwrap_or_else(invalid)
        }
        BinaryOp::Disjunction | BinaryOp::Unification => unify(&left, &right),
    }
}

fn arithmetic(op: BinaryOp, left: &Val, right: &Val) -> Option<Val> {
    if let (BinaryOp::Add, Val::Str(a), Val::Str(b)) = (op, left, right) {
        return Some(Val::str(format!("{a}{b}")));
    }
    let (Some(Scalar::Num(a)), Some(Scalar::Num(b))) = (Scalar::of(left), Scalar::of(right)) else {
        return None;
    };
    if op == BinaryOp::Div {
        if b.as_f64() == 0.0 {
            return Some(Val::bottom("division by zero"));
        }
        return Some(Val::Float(a.as_f64() / b.as_f64()));
    }
    Some(match (a, b) {
        (Number::Int(x), Number::Int(y)) => {
            let result = match op {
                BinaryOp::Add => x.checked_add(y),
                BinaryOp::Sub => x.checked_sub(y),
                _ => x.checked_mul(y),
            };
            result.map_or_else(|| Val::bottom("integer overflow"), Val::Int)
        }
        _ => {
            let (x, y) = (a.as_f64(), b.as_f64());
            Val::Float(match op {
                BinaryOp::Add => x + y,
                BinaryOp::Sub => x - y,
                _ => x * y,
            })
        }
    })
}

fn builtin_len(val: &Val) -> Val {
    match val {
        Val::Str(s) => Val::Int(s.len() as i128),
        Val::List(l) => Val::Int(l.elems.len() as i128),
        Val::Struct(s) => Val::Int(s.regular_fields().count() as i128),
        Val::Bottom(_) | Val::Incomplete(_) => val.clone(),
        Val::Top | Val::Constraint { .. } | Val::Disj(_) => {
            Val::incomplete(format!("incomplete argument {val} to len"))
        }
        other => Val::bottom(format!("invalid argument {other} to len")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_file;
    use crate::source::SourceFile;

    fn eval(src: &str) -> Val {
        let file = SourceFile::new("test.cue", src.to_string());
        let parsed = parse_file(&file).unwrap();
        let root = Expr::new(
            ExprKind::Struct(Arc::new(StructLit {
                decls: parsed.decls,
                pos: parsed.pos.clone(),
            })),
            parsed.pos,
        );
        Evaluator::new(vec![Conjunct::root(root)]).evaluate()
    }

    fn field(val: &Val, path: &str) -> Val {
        let mut current = val.clone();
        for label in path.split('.') {
            current = match &current {
                Val::Struct(s) => s.fields[label].value.clone(),
                other => panic!("cannot select {label} from {other}"),
            };
        }
        current
    }

    #[test]
    fn references_resolve_to_sibling_fields() {
        let v = eval("a: 1\nb: a + 1\nc: \"n=\\(b)\"");
        assert_eq!(field(&v, "b"), Val::Int(2));
        assert_eq!(field(&v, "c"), Val::str("n=2"));
    }

    #[test]
    fn referenced_struct_sees_new_siblings() {
        let v = eval("#T: {a: int, b: a * 2}\nx: #T & {a: 3}");
        assert_eq!(field(&v, "x.b"), Val::Int(6));
    }

    #[test]
    fn definitions_are_closed() {
        let v = eval("#T: {a: int}\nx: #T & {b: 1}");
        let b = field(&v, "x.b");
        assert_eq!(b.conflict().map(|c| c.message.as_str()), Some("field not allowed"));
    }

    #[test]
    fn ellipsis_reopens_definition() {
        let v = eval("#T: {a: int, ...}\nx: #T & {b: 1}");
        assert_eq!(field(&v, "x.b"), Val::Int(1));
    }

    #[test]
    fn embedded_definition_closes_struct() {
        let v = eval("#T: {a: int}\nx: {#T, c: 2}\ny: x & {d: 1}");
        assert_eq!(field(&v, "x.c"), Val::Int(2));
        assert!(field(&v, "y.d").is_bottom());
    }

    #[test]
    fn patterns_constrain_matching_fields() {
        let v = eval("m: [string]: int\nm: a: 1\nm: b: \"x\"");
        assert_eq!(field(&v, "m.a"), Val::Int(1));
        assert!(field(&v, "m.b").is_bottom());
    }

    #[test]
    fn reference_cycle_is_incomplete() {
        let v = eval("a: b + 1\nb: a");
        assert!(matches!(field(&v, "a"), Val::Incomplete(c) if c.cycle));
        assert!(matches!(field(&v, "b"), Val::Incomplete(c) if c.cycle));
    }

    #[test]
    fn mutual_aliases_are_top() {
        let v = eval("a: b\nb: a");
        assert_eq!(field(&v, "a"), Val::Top);
        assert_eq!(field(&v, "b"), Val::Top);
    }

    #[test]
    fn arithmetic_cycle_is_incomplete() {
        let v = eval("a: b + 1\nb: a - 1");
        assert!(matches!(field(&v, "a"), Val::Incomplete(_)));
    }

    #[test]
    fn structural_cycle_is_an_error() {
        let v = eval("x: {y: x}");
        assert_eq!(
            field(&v, "x.y").conflict().map(|c| c.message.as_str()),
            Some("structural cycle")
        );
    }

    #[test]
    fn recursive_definition_through_optional_field() {
        let v = eval("#L: {v: int, next?: #L}\nl: #L & {v: 1, next: {v: 2}}");
        assert_eq!(field(&v, "l.next.v"), Val::Int(2));
        assert!(!v.has_error());
    }

    #[test]
    fn recursive_definition_through_list() {
        let v = eval("#N: {children?: [...#N]}\nn: #N & {children: [{children: []}]}");
        assert!(!v.has_error());
    }

    #[test]
    fn regular_recursive_field_is_a_structural_cycle() {
        let v = eval("#A: {b: #A}\nx: #A");
        assert!(v.has_error());
    }

    #[test]
    fn disjunction_with_default() {
        let v = eval("a: *1 | int\nb: a & 2\nc: a + 1");
        assert_eq!(field(&v, "a").default_or_self(), &Val::Int(1));
        assert_eq!(field(&v, "b"), Val::Int(2));
        assert_eq!(field(&v, "c"), Val::Int(2));
    }

    #[test]
    fn disjunction_of_structs() {
        let v = eval("x: *{a: 1} | {b: 2}\nx: {c: 3}");
        let Val::Disj(d) = field(&v, "x") else {
            panic!("expected disjunction");
        };
        assert_eq!(d.alternatives.len(), 2);
    }

    #[test]
    fn lists() {
        let v = eval("l: [1, 2, ...int]\nl: [1, 2, 3]\nn: len(l)\ne: l[2]");
        assert_eq!(field(&v, "n"), Val::Int(3));
        assert_eq!(field(&v, "e"), Val::Int(3));
    }

    #[test]
    fn bounds_and_regex() {
        let v = eval("a: >=0 & <10\na: 5\ns: =~\"^x\"\ns: \"y\"");
        assert_eq!(field(&v, "a"), Val::Int(5));
        assert!(field(&v, "s").is_bottom());
    }

    #[test]
    fn undefined_reference() {
        let v = eval("a: nope");
        assert_eq!(
            field(&v, "a").conflict().map(|c| c.message.as_str()),
            Some("reference \"nope\" not found")
        );
    }

    #[test]
    fn hidden_and_definition_fields_bypass_closedness() {
        let v = eval("#T: {a: int}\nx: #T & {_h: 1, #D: 2}");
        assert!(!v.has_error());
    }

    #[test]
    fn chained_selection_through_reference() {
        let v = eval("y: w\nw: z: {a: 1}\nx: y.z.a");
        assert_eq!(field(&v, "x"), Val::Int(1));
    }

    #[test]
    fn embedded_scalar() {
        let v = eval("x: {1}");
        assert_eq!(field(&v, "x"), Val::Int(1));
    }

    #[test]
    fn division_yields_float() {
        let v = eval("x: 3 / 2");
        assert_eq!(field(&v, "x"), Val::Float(1.5));
    }
}
