// Probe candidate selection. Walks the tree, applies the eligibility rules,
// finds each candidate's anchor statement, and builds the probe forest with
// deterministic synthetic names.

use std::collections::{BTreeMap, HashMap};

use crate::domain::probe::{ProbeForest, ProbeId, ProbeLocation};
use crate::domain::tree::{LineSpan, NodeId, NodeKind, PrefixOp, Slot, Tree};

/// Which expressions to probe.
#[derive(Debug, Clone)]
pub enum Targets {
    /// Every eligible covered expression.
    AllEligible,
    /// Only identifiers named here, keyed by line.
    Named(HashMap<u32, Vec<String>>),
}

impl Targets {
    fn wants(&self, tree: &Tree, id: NodeId, line: u32) -> bool {
        match self {
            Targets::AllEligible => true,
            Targets::Named(by_line) => {
                let Some(text) = name_text(tree, id) else { return false };
                by_line.get(&line).map(|names| names.iter().any(|n| *n == text)).unwrap_or(false)
            }
        }
    }
}

/// Output of selection over one unit.
#[derive(Debug, Default)]
pub struct Selection {
    pub forest: ProbeForest,
    /// Non-probed identifier occurrences, keyed by (line, name).
    pub name_refs: BTreeMap<(u32, String), NodeId>,
    /// Probes on names declared without an initializer, mapped to the
    /// declaration fragment so injection can seed a default value.
    pub non_init: HashMap<ProbeId, NodeId>,
}

pub fn select(
    tree: &Tree,
    root: NodeId,
    covered: &dyn Fn(LineSpan) -> bool,
    targets: &Targets,
) -> Selection {
    let mut w = Walker {
        tree,
        covered,
        targets,
        out: Selection::default(),
        by_node: HashMap::new(),
        used_names: HashMap::new(),
        uninit: HashMap::new(),
        expr_count: 0,
    };
    w.visit(root);
    w.out
}

/// Dotted text of a (qualified) name target, used for name-based filtering
/// and as the synthetic-name base.
fn name_text(tree: &Tree, id: NodeId) -> Option<String> {
    match tree.kind(id) {
        NodeKind::Name { id: name } => Some(name.clone()),
        NodeKind::QualifiedName { qualifier, field } => {
            let q = name_text(tree, *qualifier)?;
            Some(format!("{}.{}", q, field))
        }
        _ => None,
    }
}

struct Walker<'a> {
    tree: &'a Tree,
    covered: &'a dyn Fn(LineSpan) -> bool,
    targets: &'a Targets,
    out: Selection,
    /// Every probed node, so nested targets find their enclosing probe.
    by_node: HashMap<NodeId, ProbeId>,
    used_names: HashMap<String, u32>,
    uninit: HashMap<String, NodeId>,
    expr_count: u32,
}

impl<'a> Walker<'a> {
    fn visit(&mut self, id: NodeId) {
        match self.tree.kind(id) {
            NodeKind::MethodDecl { .. } => {
                // local-variable tracking is per method body
                let saved = std::mem::take(&mut self.uninit);
                self.visit_children(id);
                self.uninit = saved;
            }
            NodeKind::VarDeclStmt { is_final, frags, .. } => {
                let is_final = *is_final;
                for f in frags.clone() {
                    if let NodeKind::VarDeclFrag { name, init } = self.tree.kind(f) {
                        if init.is_none() && !is_final {
                            self.uninit.insert(name.clone(), f);
                        }
                    }
                }
                self.visit_children(id);
            }
            kind if kind.is_expression() => {
                self.consider(id);
                self.visit_children(id);
            }
            _ => self.visit_children(id),
        }
    }

    fn visit_children(&mut self, id: NodeId) {
        for (_, _, child) in self.tree.edges(id) {
            self.visit(child);
        }
    }

    /// Try to create a probe for an expression occurrence.
    fn consider(&mut self, id: NodeId) {
        let span = self.tree.span(id);
        if span.is_none() || !(self.covered)(span) {
            return;
        }
        // ineligible identifiers (assignment targets, step operands) still
        // leave a reference behind for the monitor
        if !self.is_valid_expression(id) || !self.is_valid_position(id) {
            self.record_ref(id, span.start);
            return;
        }
        if !self.targets.wants(self.tree, id, span.start) {
            self.record_ref(id, span.start);
            return;
        }
        let location = match self.probe_location(id) {
            Some(loc) if self.is_probing_possible(loc) => loc,
            _ => {
                self.record_ref(id, span.start);
                return;
            }
        };
        // Walk up to the anchor: the nearest already-probed ancestor becomes
        // the parent, and any deferred-evaluation host in between (lazy
        // operator, ternary, closure) gets a probe of its own so injection
        // can guard this capture.
        let mut parent: Option<ProbeId> = None;
        let mut pending = Vec::new();
        let mut curr = self.tree.parent(id);
        while let Some(c) = curr {
            if location.anchor == Some(c) {
                break;
            }
            if let Some(&p) = self.by_node.get(&c) {
                parent = Some(p);
                break;
            }
            if self.is_deferred_host(c) {
                pending.push(c);
            }
            curr = self.tree.parent(c);
        }
        for host in pending.into_iter().rev() {
            let hspan = self.tree.span(host);
            if hspan.is_none() {
                continue;
            }
            let hname = self.synth_name(host, hspan.start);
            let p = match parent {
                Some(pp) => self.out.forest.add_child(pp, hname, host, location),
                None => self.out.forest.add_root(hname, host, location),
            };
            self.by_node.insert(host, p);
            parent = Some(p);
        }
        let name = self.synth_name(id, span.start);
        let probe = match parent {
            Some(pp) => self.out.forest.add_child(pp, name, id, location),
            None => self.out.forest.add_root(name, id, location),
        };
        self.by_node.insert(id, probe);
        if let NodeKind::Name { id: text } = self.tree.kind(id) {
            if let Some(frag) = self.uninit.get(text) {
                self.out.non_init.insert(probe, *frag);
            }
        }
    }

    /// Hosts whose operands must not be evaluated eagerly.
    fn is_deferred_host(&self, id: NodeId) -> bool {
        match self.tree.kind(id) {
            NodeKind::Conditional { .. } | NodeKind::Lambda { .. } => true,
            NodeKind::Infix { op, .. } => op.is_lazy(),
            _ => false,
        }
    }

    fn record_ref(&mut self, id: NodeId, line: u32) {
        if let Some(text) = name_text(self.tree, id) {
            self.out.name_refs.entry((line, text)).or_insert(id);
        }
    }

    /// Kind-level eligibility: values an observer could not capture without
    /// changing behavior, or that carry no information, are excluded.
    fn is_valid_expression(&self, id: NodeId) -> bool {
        match self.tree.kind(id) {
            NodeKind::Prefix { op, .. } => !op.is_step(),
            NodeKind::NumberLit { .. }
            | NodeKind::BoolLit { .. }
            | NodeKind::CharLit { .. }
            | NodeKind::StringLit { .. }
            | NodeKind::NullLit
            | NodeKind::This
            | NodeKind::TypeLit { .. }
            | NodeKind::Assign { .. }
            | NodeKind::ArrayCreation { .. }
            | NodeKind::ArrayInit { .. }
            | NodeKind::Cast { .. }
            | NodeKind::ClassCreation { .. }
            | NodeKind::Postfix { .. }
            | NodeKind::VarDeclExpr { .. } => false,
            _ => true,
        }
    }

    /// Position-level eligibility within the parent.
    fn is_valid_position(&self, id: NodeId) -> bool {
        let Some(parent) = self.tree.parent(id) else { return false };
        let loc = self.tree.location_in_parent(id);
        match self.tree.kind(parent) {
            NodeKind::Assign { .. } => !matches!(loc, Some((Slot::Lhs, _))),
            NodeKind::ExprStmt { .. } => !matches!(
                self.tree.kind(id),
                NodeKind::MethodCall { .. } | NodeKind::SuperMethodCall { .. }
            ),
            NodeKind::Prefix { op, .. } => !op.is_step(),
            NodeKind::Postfix { .. } => false,
            _ => true,
        }
    }

    /// Nearest ancestor usable as an anchor: a statement or field
    /// declaration sitting in a list slot, or a single-statement `if`/loop
    /// body (injection wraps those in a block first).
    fn probe_location(&self, id: NodeId) -> Option<ProbeLocation> {
        let mut curr = self.tree.parent(id);
        while let Some(c) = curr {
            let is_anchor = self.tree.kind(c).is_statement()
                || matches!(self.tree.kind(c), NodeKind::FieldDecl { .. });
            if is_anchor {
                match self.tree.location_in_parent(c) {
                    Some((_, Some(_))) => return Some(ProbeLocation::before(c)),
                    Some((Slot::ThenStmt | Slot::ElseStmt, None)) => {
                        return Some(ProbeLocation::before(c));
                    }
                    Some((Slot::Body, None)) => {
                        let parent = self.tree.parent(c)?;
                        if self.tree.kind(parent).is_loop() {
                            return Some(ProbeLocation::before(c));
                        }
                    }
                    _ => {}
                }
            }
            curr = self.tree.parent(c);
        }
        None
    }

    /// Anchors with no rewrite rule drop the probe.
    fn is_probing_possible(&self, loc: ProbeLocation) -> bool {
        let Some(anchor) = loc.anchor else { return false };
        !matches!(
            self.tree.kind(anchor),
            NodeKind::ConstructorCall { .. }
                | NodeKind::SuperConstructorCall { .. }
                | NodeKind::Try { .. }
                | NodeKind::SwitchCase { .. }
        )
    }

    fn synth_name(&mut self, id: NodeId, line: u32) -> String {
        let base = match name_text(self.tree, id) {
            Some(text) => text.replace('.', "_"),
            None => {
                self.expr_count += 1;
                format!("expr{}", self.expr_count)
            }
        };
        let name = format!("{}_line_{}", base, line);
        let count = self.used_names.entry(name.clone()).or_insert(0);
        *count += 1;
        if *count == 1 {
            name
        } else {
            format!("{}_v{}", name, *count - 1)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::printer::assign_spans;
    use crate::domain::tree::{InfixOp, Prim, Type};

    fn all() -> Targets {
        Targets::AllEligible
    }

    fn everything(_: LineSpan) -> bool {
        true
    }

    #[test]
    fn probes_names_and_calls_not_literals() {
        // { int x = a + 1; }
        let mut t = Tree::new();
        let a = t.name("a");
        let one = t.number("1");
        let sum = t.add(NodeKind::Infix { op: InfixOp::Plus, left: a, right: one, extended: vec![] });
        let decl = t.var_decl(Type::Primitive(Prim::Int), "x", Some(sum));
        let root = t.block(vec![decl]);
        assign_spans(&mut t, root);

        let sel = select(&t, root, &everything, &all());
        let names: Vec<&str> = sel.forest.iter().map(|(_, p)| p.name.as_str()).collect();
        assert_eq!(names, vec!["expr1_line_2", "a_line_2"]);
        let (_, sum_probe) = sel.forest.iter().next().unwrap();
        assert_eq!(sum_probe.target, sum);
    }

    #[test]
    fn nested_targets_become_children() {
        let mut t = Tree::new();
        let a = t.name("a");
        let b = t.name("b");
        let sum = t.add(NodeKind::Infix { op: InfixOp::Plus, left: a, right: b, extended: vec![] });
        let decl = t.var_decl(Type::Primitive(Prim::Int), "x", Some(sum));
        let root = t.block(vec![decl]);
        assign_spans(&mut t, root);

        let sel = select(&t, root, &everything, &all());
        assert_eq!(sel.forest.roots.len(), 1);
        let root_probe = sel.forest.get(sel.forest.roots[0]);
        assert_eq!(root_probe.children.len(), 2);
    }

    #[test]
    fn assignment_lhs_and_step_operands_are_skipped() {
        // { x = y; i++; ++j; }
        let mut t = Tree::new();
        let x = t.name("x");
        let y = t.name("y");
        let asg = t.assign(x, y);
        let s1 = t.expr_stmt(asg);
        let i = t.name("i");
        let inc = t.add(NodeKind::Postfix { operand: i, op: crate::domain::tree::PostfixOp::Increment });
        let s2 = t.expr_stmt(inc);
        let j = t.name("j");
        let pre = t.add(NodeKind::Prefix { op: PrefixOp::Increment, operand: j });
        let s3 = t.expr_stmt(pre);
        let root = t.block(vec![s1, s2, s3]);
        assign_spans(&mut t, root);

        let sel = select(&t, root, &everything, &all());
        let names: Vec<&str> = sel.forest.iter().map(|(_, p)| p.name.as_str()).collect();
        assert_eq!(names, vec!["y_line_2"]);
        // skipped variables are still recorded as references
        assert!(sel.name_refs.contains_key(&(2, "x".to_string())));
        assert!(sel.name_refs.contains_key(&(3, "i".to_string())));
        assert!(sel.name_refs.contains_key(&(4, "j".to_string())));
    }

    #[test]
    fn duplicate_names_on_one_line_get_version_suffixes() {
        // { int s = a + a; }
        let mut t = Tree::new();
        let a1 = t.name("a");
        let a2 = t.name("a");
        let sum = t.add(NodeKind::Infix { op: InfixOp::Plus, left: a1, right: a2, extended: vec![] });
        let decl = t.var_decl(Type::Primitive(Prim::Int), "s", Some(sum));
        let root = t.block(vec![decl]);
        assign_spans(&mut t, root);

        let sel = select(&t, root, &everything, &all());
        let names: Vec<&str> = sel.forest.iter().map(|(_, p)| p.name.as_str()).collect();
        assert_eq!(names, vec!["expr1_line_2", "a_line_2", "a_line_2_v1"]);
    }

    #[test]
    fn named_targets_filter_by_line_and_name() {
        let mut t = Tree::new();
        let a = t.name("a");
        let b = t.name("b");
        let sum = t.add(NodeKind::Infix { op: InfixOp::Plus, left: a, right: b, extended: vec![] });
        let decl = t.var_decl(Type::Primitive(Prim::Int), "x", Some(sum));
        let root = t.block(vec![decl]);
        assign_spans(&mut t, root);

        let mut by_line = HashMap::new();
        by_line.insert(2u32, vec!["a".to_string()]);
        let sel = select(&t, root, &everything, &Targets::Named(by_line));
        let names: Vec<&str> = sel.forest.iter().map(|(_, p)| p.name.as_str()).collect();
        assert_eq!(names, vec!["a_line_2"]);
        assert!(sel.name_refs.contains_key(&(2, "b".to_string())));
    }

    #[test]
    fn uncovered_lines_are_skipped() {
        let mut t = Tree::new();
        let a = t.name("a");
        let s = t.expr_stmt(a);
        let root = t.block(vec![s]);
        assign_spans(&mut t, root);

        let nothing = |_: LineSpan| false;
        let sel = select(&t, root, &nothing, &all());
        assert!(sel.forest.is_empty());
    }

    #[test]
    fn uninitialized_locals_are_linked_to_their_fragment() {
        // { int x; x = a; int y = x; }
        let mut t = Tree::new();
        let decl = t.var_decl(Type::Primitive(Prim::Int), "x", None);
        let frag = t.list(decl, Slot::Frags).unwrap()[0];
        let x1 = t.name("x");
        let a = t.name("a");
        let asg = t.assign(x1, a);
        let s = t.expr_stmt(asg);
        let x2 = t.name("x");
        let decl2 = t.var_decl(Type::Primitive(Prim::Int), "y", Some(x2));
        let root = t.block(vec![decl, s, decl2]);
        assign_spans(&mut t, root);

        let sel = select(&t, root, &everything, &all());
        let probe = sel
            .forest
            .iter()
            .find(|(_, p)| p.target == x2)
            .map(|(id, _)| id)
            .expect("x should be probed in the second declaration");
        assert_eq!(sel.non_init.get(&probe), Some(&frag));
    }

    #[test]
    fn probes_in_constructor_delegation_are_dropped() {
        // { this(a); }
        let mut t = Tree::new();
        let a = t.name("a");
        let call = t.add(NodeKind::ConstructorCall { args: vec![a] });
        let root = t.block(vec![call]);
        assign_spans(&mut t, root);

        let sel = select(&t, root, &everything, &all());
        assert!(sel.forest.is_empty());
        assert!(sel.name_refs.contains_key(&(2, "a".to_string())));
    }
}
