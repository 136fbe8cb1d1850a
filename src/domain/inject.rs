// AST rewriting engine. Consumes a probe forest and rewrites a working copy
// of the tree so every probed expression's value flows through a uniquely
// named synthetic variable, bracketing each rewritten region with paired
// line markers. Construct-specific rules keep evaluation order and laziness
// identical to the original program.

use std::collections::HashMap;

use crate::domain::probe::{ListRef, ProbeForest, ProbeId, ProbeLocation};
use crate::domain::tree::{
    InfixOp, LineSpan, NodeId, NodeKind, Prim, Slot, Tree, Type,
};
use crate::domain::tree_path::{Step, TreePath};

pub const MARKER_START: &str = "PROBE_START_LINE_";
pub const MARKER_END: &str = "PROBE_END_LINE_";
pub const DO_COND_TOGGLE: &str = "DO_COND_TOGGLE_LINE_";
pub const FOR_STMT_TOGGLE: &str = "FOR_STMT_TOGGLE_LINE_";

/// Fixed default-value table keyed by declared type. Used to seed
/// placeholder variables and uninitialized locals.
pub fn default_literal(tree: &mut Tree, ty: &Type) -> NodeId {
    match ty {
        Type::Primitive(Prim::Boolean) => tree.bool_lit(false),
        Type::Primitive(Prim::Char) => tree.char_lit(' '),
        Type::Primitive(Prim::Float) | Type::Primitive(Prim::Double) => tree.number("0.0"),
        Type::Primitive(_) => tree.number("0"),
        Type::Named(_) | Type::Array(_, _) => tree.null_lit(),
    }
}

struct Markers {
    start: NodeId,
    end: Option<NodeId>,
}

struct CondRewrite {
    break_if: NodeId,
    body: NodeId,
    span: LineSpan,
}

struct DoRewrite {
    break_if: NodeId,
    guard_then: NodeId,
    span: LineSpan,
}

#[derive(Default)]
struct ForRewrite {
    guard_then: Option<NodeId>,
    guard_else: Option<NodeId>,
    cond_if: Option<NodeId>,
    /// One relocated statement per initializer fragment (declaration form)
    /// or per initializer expression (expression form).
    init_stmts: Vec<NodeId>,
    init_is_decl: bool,
    upd_stmts: Vec<NodeId>,
}

/// The rewriting pass over one unit. Works on a clone of the tree, so node
/// handles stay valid across both and the original is never mutated.
pub struct ProbeInjector {
    tree: Tree,
    non_init: HashMap<ProbeId, NodeId>,
    markers: HashMap<u32, Markers>,
    while_rewrites: HashMap<NodeId, CondRewrite>,
    do_rewrites: HashMap<NodeId, DoRewrite>,
    for_rewrites: HashMap<NodeId, ForRewrite>,
    aux_count: u32,
}

impl ProbeInjector {
    pub fn new(tree: &Tree, non_init: HashMap<ProbeId, NodeId>) -> Self {
        ProbeInjector {
            tree: tree.clone(),
            non_init,
            markers: HashMap::new(),
            while_rewrites: HashMap::new(),
            do_rewrites: HashMap::new(),
            for_rewrites: HashMap::new(),
            aux_count: 0,
        }
    }

    /// Rewrite the working tree for every root probe, in declaration order.
    /// Probes whose paths no longer resolve are skipped silently.
    pub fn inject(&mut self, forest: &mut ProbeForest) {
        for pid in forest.roots.clone() {
            self.inject_root(forest, pid);
        }
    }

    pub fn tree(&self) -> &Tree {
        &self.tree
    }

    pub fn into_tree(self) -> Tree {
        self.tree
    }

    fn inject_root(&mut self, forest: &mut ProbeForest, pid: ProbeId) {
        let probe = forest.get(pid);
        let target = probe.target;
        let Some(anchor) = probe.location.anchor else { return };
        let anchor = self.ensure_list_anchor(anchor);
        let Some(path) = TreePath::between(&self.tree, target, anchor) else { return };
        let first = path.first().map(|s| s.slot);
        match self.tree.kind(anchor) {
            NodeKind::While { .. } if first == Some(Slot::Condition) => {
                self.root_in_while(forest, pid, anchor, &path)
            }
            NodeKind::DoWhile { .. } if first == Some(Slot::Condition) => {
                self.root_in_do(forest, pid, anchor, &path)
            }
            NodeKind::For { .. }
                if matches!(first, Some(Slot::Inits | Slot::Condition | Slot::Updates)) =>
            {
                self.root_in_for(forest, pid, anchor, &path)
            }
            NodeKind::FieldDecl { modifiers, .. } => {
                let mods = modifiers.clone();
                self.root_generic(forest, pid, anchor, &path, Some(mods))
            }
            _ => self.root_generic(forest, pid, anchor, &path, None),
        }
    }

    fn root_generic(
        &mut self,
        forest: &mut ProbeForest,
        pid: ProbeId,
        anchor: NodeId,
        path: &TreePath,
        field_mods: Option<Vec<String>>,
    ) {
        let Some(list) = self.stmt_list(anchor) else { return };
        let Some(occ) = path.resolve(&self.tree, anchor) else { return };
        if occ != forest.get(pid).target {
            return;
        }
        let org = self.tree.span(anchor);
        self.add_start_marker(list, ProbeLocation::before(anchor), org.start, org.end);
        if !self.materialize(forest, pid, occ, list, ProbeLocation::before(anchor), field_mods) {
            return;
        }
        // resume line is the anchor itself
        self.add_end_marker(list, ProbeLocation::before(anchor), org.start, org.start, org.end);
        self.inject_probe_tree(forest, pid);
    }

    /// `while(C){B}` becomes `while(true){ <region> if(!(C)){break;} B }`.
    fn root_in_while(
        &mut self,
        forest: &mut ProbeForest,
        pid: ProbeId,
        anchor: NodeId,
        path: &TreePath,
    ) {
        let NodeKind::While { cond, body } = self.tree.kind(anchor).clone() else { return };
        if !self.while_rewrites.contains_key(&anchor) {
            let body = self.ensure_block(anchor, Slot::Body, body);
            let span = self.tree.span(cond);
            let tru = self.tree.bool_lit(true);
            self.tree.set_child(anchor, Slot::Condition, tru);
            let break_if = self.build_break_if(cond);
            self.tree.insert_first(body, Slot::Statements, break_if);
            self.while_rewrites.insert(anchor, CondRewrite { break_if, body, span });
        }
        let r = &self.while_rewrites[&anchor];
        let (break_if, body, span) = (r.break_if, r.body, r.span);
        let list = ListRef { owner: body, slot: Slot::Statements };
        self.probe_relocated_cond(forest, pid, path, break_if, list, span);
    }

    /// `do{B}while(C)` becomes
    /// `<toggle decl> do{ if(toggle){ <region> if(!(C)){break;} } toggle=true; B } while(true);`
    /// so the first iteration runs the body once before any condition check.
    fn root_in_do(
        &mut self,
        forest: &mut ProbeForest,
        pid: ProbeId,
        anchor: NodeId,
        path: &TreePath,
    ) {
        let NodeKind::DoWhile { body, cond } = self.tree.kind(anchor).clone() else { return };
        if !self.do_rewrites.contains_key(&anchor) {
            let Some(outer) = self.stmt_list(anchor) else { return };
            let body = self.ensure_block(anchor, Slot::Body, body);
            let span = self.tree.span(cond);
            let dline = self.tree.span(anchor).start;
            let toggle = format!("{}{}", DO_COND_TOGGLE, span.start);

            let seed = self.tree.bool_lit(false);
            let decl =
                self.tree.var_decl(Type::Primitive(Prim::Boolean), &toggle, Some(seed));
            let before = dline.saturating_sub(1).max(1);
            self.add_start_marker(outer, ProbeLocation::before(anchor), before, before);
            self.tree.insert_before(outer.owner, outer.slot, anchor, decl);
            self.add_end_marker(outer, ProbeLocation::before(anchor), before, dline, before);

            let tru = self.tree.bool_lit(true);
            self.tree.set_child(anchor, Slot::Condition, tru);
            let break_if = self.build_break_if(cond);
            let guard_then = self.tree.block(vec![break_if]);
            let guard_cond = self.tree.name(&toggle);
            let guard = self.tree.if_stmt(guard_cond, guard_then, None);
            self.tree.insert_first(body, Slot::Statements, guard);
            let tname = self.tree.name(&toggle);
            let tval = self.tree.bool_lit(true);
            let set = self.tree.assign(tname, tval);
            let set = self.tree.expr_stmt(set);
            self.tree.insert_after(body, Slot::Statements, guard, set);

            self.do_rewrites.insert(anchor, DoRewrite { break_if, guard_then, span });
        }
        let r = &self.do_rewrites[&anchor];
        let (break_if, guard_then, span) = (r.break_if, r.guard_then, r.span);
        let list = ListRef { owner: guard_then, slot: Slot::Statements };
        self.probe_relocated_cond(forest, pid, path, break_if, list, span);
    }

    fn root_in_for(
        &mut self,
        forest: &mut ProbeForest,
        pid: ProbeId,
        anchor: NodeId,
        path: &TreePath,
    ) {
        let Some(first) = path.first().copied() else { return };
        match first.slot {
            Slot::Inits => {
                if !self.relocate_for_inits(anchor) {
                    return;
                }
                let r = &self.for_rewrites[&anchor];
                let (is_decl, init_stmts, guard_then) =
                    (r.init_is_decl, r.init_stmts.clone(), r.guard_then);
                if is_decl {
                    // path: Inits(0) / Frags(k) / Init / ...
                    let Some(frag_step) = path.steps.get(1) else { return };
                    let Some(k) = frag_step.index else { return };
                    let Some(&stmt) = init_stmts.get(k) else { return };
                    let Some(then_block) = guard_then else { return };
                    let list = ListRef { owner: then_block, slot: Slot::Statements };
                    let sub = TreePath::new(vec![
                        Step::new(Slot::Expression, None),
                        Step::new(Slot::Rhs, None),
                    ])
                    .concat(&path.slice_from(3));
                    let span = self.tree.span(forest.get(pid).target);
                    self.probe_relocated(forest, pid, &sub, stmt, list, span);
                } else {
                    let Some(i) = first.index else { return };
                    let Some(&stmt) = init_stmts.get(i) else { return };
                    let Some(list) = self.stmt_list(stmt) else { return };
                    let sub = TreePath::new(vec![Step::new(Slot::Expression, None)])
                        .concat(&path.slice_from(1));
                    let span = self.tree.span(forest.get(pid).target);
                    let span = if span.is_none() { self.tree.span(anchor) } else { span };
                    self.probe_relocated(forest, pid, &sub, stmt, list, span);
                }
            }
            Slot::Condition => {
                if !self.relocate_for_cond(anchor) {
                    return;
                }
                let r = &self.for_rewrites[&anchor];
                let Some(cond_if) = r.cond_if else { return };
                let NodeKind::For { body, .. } = self.tree.kind(anchor) else { return };
                let list = ListRef { owner: *body, slot: Slot::Statements };
                let span = self.tree.span(forest.get(pid).target);
                let span = if span.is_none() { self.tree.span(anchor) } else { span };
                self.probe_relocated_cond(forest, pid, path, cond_if, list, span);
            }
            Slot::Updates => {
                if !self.relocate_for_updates(anchor) {
                    return;
                }
                let r = &self.for_rewrites[&anchor];
                let (upd_stmts, guard_else) = (r.upd_stmts.clone(), r.guard_else);
                let Some(i) = first.index else { return };
                let Some(&stmt) = upd_stmts.get(i) else { return };
                let Some(else_block) = guard_else else { return };
                let list = ListRef { owner: else_block, slot: Slot::Statements };
                let sub = TreePath::new(vec![Step::new(Slot::Expression, None)])
                    .concat(&path.slice_from(1));
                let span = self.tree.span(forest.get(pid).target);
                let span = if span.is_none() { self.tree.span(anchor) } else { span };
                self.probe_relocated(forest, pid, &sub, stmt, list, span);
            }
            _ => {}
        }
    }

    /// Shared tail for condition rewrites: the target now lives inside
    /// `if (!(C)) { break; }` and probes go immediately before that check.
    fn probe_relocated_cond(
        &mut self,
        forest: &mut ProbeForest,
        pid: ProbeId,
        path: &TreePath,
        break_if: NodeId,
        list: ListRef,
        span: LineSpan,
    ) {
        let wrapper = TreePath::new(vec![
            Step::new(Slot::Condition, None),
            Step::new(Slot::Operand, None),
            Step::new(Slot::Expression, None),
        ]);
        let sub = wrapper.concat(&path.slice_from(1));
        self.probe_relocated(forest, pid, &sub, break_if, list, span);
    }

    /// Probe a target relocated into `stmt`; the region brackets the
    /// relocated statement, and the end marker encodes the line where the
    /// original source resumes.
    fn probe_relocated(
        &mut self,
        forest: &mut ProbeForest,
        pid: ProbeId,
        path: &TreePath,
        stmt: NodeId,
        list: ListRef,
        span: LineSpan,
    ) {
        let Some(occ) = path.resolve(&self.tree, stmt) else { return };
        self.add_start_marker(list, ProbeLocation::before(stmt), span.start, span.end);
        if !self.materialize(forest, pid, occ, list, ProbeLocation::before(stmt), None) {
            return;
        }
        self.add_end_marker(list, ProbeLocation::after(stmt), span.start, span.end + 1, span.end);
        self.inject_probe_tree(forest, pid);
    }

    // ---- for-loop relocations ----------------------------------------

    /// Toggle guard at the top of the body: the then branch runs only on the
    /// first pass, the else branch on every later pass.
    fn ensure_for_toggle(&mut self, anchor: NodeId) -> bool {
        if self.for_rewrites.get(&anchor).map(|r| r.guard_then.is_some()).unwrap_or(false) {
            return true;
        }
        let NodeKind::For { body, .. } = self.tree.kind(anchor).clone() else { return false };
        let Some(outer) = self.stmt_list(anchor) else { return false };
        let body = self.ensure_block(anchor, Slot::Body, body);
        let fline = self.tree.span(anchor).start;
        let toggle = format!("{}{}", FOR_STMT_TOGGLE, fline);

        let seed = self.tree.bool_lit(false);
        let decl = self.tree.var_decl(Type::Primitive(Prim::Boolean), &toggle, Some(seed));
        let before = fline.saturating_sub(1).max(1);
        self.add_start_marker(outer, ProbeLocation::before(anchor), before, before);
        self.tree.insert_before(outer.owner, outer.slot, anchor, decl);
        self.add_end_marker(outer, ProbeLocation::before(anchor), before, fline, before);

        let tname = self.tree.name(&toggle);
        let tval = self.tree.bool_lit(true);
        let set = self.tree.assign(tname, tval);
        let set = self.tree.expr_stmt(set);
        let guard_then = self.tree.block(vec![set]);
        let guard_else = self.tree.block(vec![]);
        let gname = self.tree.name(&toggle);
        let par = self.tree.paren(gname);
        let neg = self.tree.not(par);
        let guard = self.tree.if_stmt(neg, guard_then, Some(guard_else));

        let cond_if = self.for_rewrites.get(&anchor).and_then(|r| r.cond_if);
        match cond_if {
            Some(ci) => {
                self.tree.insert_before(body, Slot::Statements, ci, guard);
            }
            None => {
                self.tree.insert_first(body, Slot::Statements, guard);
            }
        }
        let entry = self.for_rewrites.entry(anchor).or_default();
        entry.guard_then = Some(guard_then);
        entry.guard_else = Some(guard_else);
        true
    }

    /// Declaration-form initializers turn into default-initialized header
    /// fragments plus one-shot assignments in the toggle's first-pass block;
    /// expression-form initializers are hoisted before the loop.
    fn relocate_for_inits(&mut self, anchor: NodeId) -> bool {
        if self.for_rewrites.get(&anchor).map(|r| !r.init_stmts.is_empty()).unwrap_or(false) {
            return true;
        }
        let NodeKind::For { inits, .. } = self.tree.kind(anchor).clone() else { return false };
        if inits.is_empty() {
            return false;
        }
        let is_decl = matches!(self.tree.kind(inits[0]), NodeKind::VarDeclExpr { .. });
        let mut stmts = Vec::new();
        if is_decl {
            if !self.ensure_for_toggle(anchor) {
                return false;
            }
            let Some(then_block) = self.for_rewrites[&anchor].guard_then else { return false };
            let NodeKind::VarDeclExpr { ty, frags } = self.tree.kind(inits[0]).clone() else {
                return false;
            };
            for frag in frags {
                let NodeKind::VarDeclFrag { name, init } = self.tree.kind(frag).clone() else {
                    continue;
                };
                let Some(init) = init else {
                    stmts.push(frag); // placeholder keeps fragment indices aligned
                    continue;
                };
                let dflt = default_literal(&mut self.tree, &ty);
                self.tree.set_child(frag, Slot::Init, dflt);
                let lhs = self.tree.name(&name);
                let asg = self.tree.assign(lhs, init);
                let stmt = self.tree.expr_stmt(asg);
                self.tree.insert_last(then_block, Slot::Statements, stmt);
                stmts.push(stmt);
            }
        } else {
            let Some(outer) = self.stmt_list(anchor) else { return false };
            let span = self.tree.span(inits[0]);
            let span = if span.is_none() { self.tree.span(anchor) } else { span };
            self.add_start_marker(outer, ProbeLocation::before(anchor), span.start, span.end);
            for init in self.tree.take_list(anchor, Slot::Inits) {
                let stmt = self.tree.expr_stmt(init);
                self.tree.insert_before(outer.owner, outer.slot, anchor, stmt);
                stmts.push(stmt);
            }
            self.add_end_marker(outer, ProbeLocation::before(anchor), span.start, span.start, span.end);
        }
        let entry = self.for_rewrites.entry(anchor).or_default();
        entry.init_stmts = stmts;
        entry.init_is_decl = is_decl;
        true
    }

    fn relocate_for_cond(&mut self, anchor: NodeId) -> bool {
        if self.for_rewrites.get(&anchor).map(|r| r.cond_if.is_some()).unwrap_or(false) {
            return true;
        }
        let NodeKind::For { cond, body, .. } = self.tree.kind(anchor).clone() else { return false };
        let Some(cond) = cond else { return false };
        let body = self.ensure_block(anchor, Slot::Body, body);
        let tru = self.tree.bool_lit(true);
        self.tree.set_child(anchor, Slot::Condition, tru);
        let break_if = self.build_break_if(cond);
        let guard = self.for_rewrites.get(&anchor).and_then(|r| r.guard_then);
        match guard {
            Some(_) => {
                // condition check goes after the toggle guard
                let first = self.tree.list(body, Slot::Statements).and_then(|l| l.first().copied());
                match first {
                    Some(f) => {
                        self.tree.insert_after(body, Slot::Statements, f, break_if);
                    }
                    None => {
                        self.tree.insert_first(body, Slot::Statements, break_if);
                    }
                }
            }
            None => {
                self.tree.insert_first(body, Slot::Statements, break_if);
            }
        }
        self.for_rewrites.entry(anchor).or_default().cond_if = Some(break_if);
        true
    }

    /// Updaters move into the toggle's else branch: they run at the top of
    /// every pass after the first, never before the first condition check.
    fn relocate_for_updates(&mut self, anchor: NodeId) -> bool {
        if self.for_rewrites.get(&anchor).map(|r| !r.upd_stmts.is_empty()).unwrap_or(false) {
            return true;
        }
        if !self.ensure_for_toggle(anchor) {
            return false;
        }
        let Some(else_block) = self.for_rewrites[&anchor].guard_else else { return false };
        let mut stmts = Vec::new();
        for upd in self.tree.take_list(anchor, Slot::Updates) {
            let stmt = self.tree.expr_stmt(upd);
            self.tree.insert_last(else_block, Slot::Statements, stmt);
            stmts.push(stmt);
        }
        if stmts.is_empty() {
            return false;
        }
        self.for_rewrites.entry(anchor).or_default().upd_stmts = stmts;
        true
    }

    // ---- materialization ---------------------------------------------

    /// Copy the target into a capturing declaration named for the probe,
    /// insert it, and replace the live occurrence with the synthetic name.
    fn materialize(
        &mut self,
        forest: &mut ProbeForest,
        pid: ProbeId,
        occ: NodeId,
        list: ListRef,
        loc: ProbeLocation,
        field_mods: Option<Vec<String>>,
    ) -> bool {
        let ty = self.probe_type(occ, Type::object());
        let name = forest.get(pid).name.clone();
        let copy = self.tree.copy_subtree(occ);
        let frag = self.tree.frag(&name, Some(copy));
        let stmt = match field_mods {
            Some(modifiers) => {
                self.tree.add(NodeKind::FieldDecl { modifiers, ty, frags: vec![frag] })
            }
            None => self.tree.add(NodeKind::VarDeclStmt { is_final: false, ty, frags: vec![frag] }),
        };
        if !loc.insert(&mut self.tree, list, stmt) {
            return false;
        }
        let name_node = self.tree.name(&name);
        if !self.tree.replace(occ, name_node) {
            self.tree.list_remove(stmt);
            return false;
        }
        self.seed_non_init(pid);
        let probe = forest.get_mut(pid);
        probe.probe_node = Some(stmt);
        probe.target_in_probe = Some(copy);
        true
    }

    /// A probe on a local declared without an initializer reads the variable
    /// before its declaring statement has run; give the declaration a
    /// type-driven default so the read is well defined.
    fn seed_non_init(&mut self, pid: ProbeId) {
        let Some(&frag) = self.non_init.get(&pid) else { return };
        let NodeKind::VarDeclFrag { init, .. } = self.tree.kind(frag) else { return };
        if init.is_some() {
            return;
        }
        let ty = self
            .tree
            .parent(frag)
            .and_then(|p| match self.tree.kind(p) {
                NodeKind::VarDeclStmt { ty, .. }
                | NodeKind::VarDeclExpr { ty, .. }
                | NodeKind::FieldDecl { ty, .. } => Some(ty.clone()),
                _ => None,
            })
            .unwrap_or_else(Type::object);
        let dflt = default_literal(&mut self.tree, &ty);
        self.tree.set_child(frag, Slot::Init, dflt);
    }

    /// Dispatch on the captured expression's kind: lazy operators, ternaries
    /// and lambdas need guards for their children; everything else takes
    /// plain sibling captures.
    fn inject_probe_tree(&mut self, forest: &mut ProbeForest, pid: ProbeId) {
        let Some(copy) = forest.get(pid).target_in_probe else { return };
        match self.tree.kind(copy) {
            NodeKind::Infix { op, .. } if op.is_lazy() => self.handle_short_circuit(forest, pid),
            NodeKind::Conditional { .. } => self.handle_conditional(forest, pid),
            NodeKind::Lambda { .. } => self.handle_lambda(forest, pid),
            _ => self.inject_children(forest, pid),
        }
    }

    /// Generic children: siblings before the parent's statement, in order.
    fn inject_children(&mut self, forest: &mut ProbeForest, pid: ProbeId) {
        let probe = forest.get(pid);
        let parent_target = probe.target;
        let Some(copy) = probe.target_in_probe else { return };
        let Some(pstmt) = probe.probe_node else { return };
        let Some(list) = self.stmt_list(pstmt) else { return };
        let children = probe.children.clone();
        let mut prev: Option<NodeId> = None;
        for c in children {
            let Some(path) = TreePath::between(&self.tree, forest.get(c).target, parent_target)
            else {
                continue;
            };
            let Some(occ) = path.resolve(&self.tree, copy) else { continue };
            let loc = match prev {
                Some(p) => ProbeLocation::after(p),
                None => ProbeLocation::before(pstmt),
            };
            if !self.materialize(forest, c, occ, list, loc, None) {
                continue;
            }
            prev = forest.get(c).probe_node;
            self.inject_probe_tree(forest, c);
        }
    }

    /// `p = a && b && c` becomes
    /// ```text
    /// Ta n0 = a;
    /// boolean n1 = true;  boolean n2 = true;   // seeds (false for ||)
    /// if (n0) { n1 = b; if (n1) { n2 = c; } }  // negated guards for ||
    /// T p = n0 && n1 && n2;
    /// ```
    /// so an operand is evaluated exactly when the original would have.
    fn handle_short_circuit(&mut self, forest: &mut ProbeForest, pid: ProbeId) {
        let probe = forest.get(pid);
        let ptarget = probe.target;
        let Some(copy) = probe.target_in_probe else { return };
        let Some(pstmt) = probe.probe_node else { return };
        let Some(outer) = self.stmt_list(pstmt) else { return };
        let children = probe.children.clone();

        let NodeKind::Infix { op, left, right, extended } = self.tree.kind(copy).clone() else {
            return;
        };
        let is_and = op == InfixOp::CondAnd;
        let mut ops = vec![left, right];
        ops.extend(extended);
        let orig_ops: Vec<NodeId> = match self.tree.kind(ptarget).clone() {
            NodeKind::Infix { left, right, extended, .. } => {
                let mut v = vec![left, right];
                v.extend(extended);
                v
            }
            _ => return,
        };

        // one name per operand: the child probe's name when the operand is
        // itself a target, a synthesized one otherwise
        let exact: Vec<Option<ProbeId>> = orig_ops
            .iter()
            .map(|o| children.iter().copied().find(|c| forest.get(*c).target == *o))
            .collect();
        let names: Vec<String> = ops
            .iter()
            .enumerate()
            .map(|(i, &op_node)| match exact[i] {
                Some(c) => forest.get(c).name.clone(),
                None => self.aux_name(self.tree.span(op_node).start),
            })
            .collect();

        // left operand: unconditional capture before the parent statement
        let ty0 = self.probe_type(ops[0], Type::Primitive(Prim::Boolean));
        let nm = self.tree.name(&names[0]);
        self.tree.replace(ops[0], nm);
        let frag = self.tree.frag(&names[0], Some(ops[0]));
        let decl0 =
            self.tree.add(NodeKind::VarDeclStmt { is_final: false, ty: ty0, frags: vec![frag] });
        self.tree.insert_before(outer.owner, outer.slot, pstmt, decl0);
        let mut op_stmts = vec![decl0];

        // seeds for every lazily evaluated operand, declared outside the guards
        for (i, &op_node) in ops.iter().enumerate().skip(1) {
            let nm = self.tree.name(&names[i]);
            self.tree.replace(op_node, nm);
            let seed = self.tree.bool_lit(is_and);
            let decl =
                self.tree.var_decl(Type::Primitive(Prim::Boolean), &names[i], Some(seed));
            self.tree.insert_before(outer.owner, outer.slot, pstmt, decl);
        }

        // nested guards, each gated on the previous operand's captured value
        let mut host: Option<NodeId> = None;
        for (i, &op_node) in ops.iter().enumerate().skip(1) {
            let prev = self.tree.name(&names[i - 1]);
            let cond = if is_and {
                prev
            } else {
                let par = self.tree.paren(prev);
                self.tree.not(par)
            };
            let lhs = self.tree.name(&names[i]);
            let asg = self.tree.assign(lhs, op_node);
            let asg_stmt = self.tree.expr_stmt(asg);
            let then_block = self.tree.block(vec![asg_stmt]);
            let guard = self.tree.if_stmt(cond, then_block, None);
            match host {
                Some(block) => {
                    self.tree.insert_last(block, Slot::Statements, guard);
                }
                None => {
                    self.tree.insert_before(outer.owner, outer.slot, pstmt, guard);
                }
            }
            host = Some(then_block);
            op_stmts.push(asg_stmt);
        }

        // children: exact operand probes are already captured by the hoisted
        // statements; interior probes anchor before their operand's statement
        for c in children {
            let ctarget = forest.get(c).target;
            if let Some(i) = orig_ops.iter().position(|o| *o == ctarget) {
                let probe = forest.get_mut(c);
                probe.probe_node = Some(op_stmts[i]);
                probe.target_in_probe = Some(ops[i]);
                self.inject_probe_tree(forest, c);
            } else {
                let Some(i) = orig_ops.iter().position(|o| {
                    TreePath::between(&self.tree, ctarget, *o).is_some()
                }) else {
                    continue;
                };
                let Some(path) = TreePath::between(&self.tree, ctarget, orig_ops[i]) else {
                    continue;
                };
                let Some(occ) = path.resolve(&self.tree, ops[i]) else { continue };
                let stmt = op_stmts[i];
                let Some(list) = self.stmt_list(stmt) else { continue };
                if self.materialize(forest, c, occ, list, ProbeLocation::before(stmt), None) {
                    self.inject_probe_tree(forest, c);
                }
            }
        }
    }

    /// `p = c ? t : e` becomes
    /// ```text
    /// Tc nc = c;
    /// Tt nt = <default>;  Te ne = <default>;
    /// if (nc) { nt = t; } else { ne = e; }
    /// T p = nc ? nt : ne;
    /// ```
    fn handle_conditional(&mut self, forest: &mut ProbeForest, pid: ProbeId) {
        let probe = forest.get(pid);
        let ptarget = probe.target;
        let Some(copy) = probe.target_in_probe else { return };
        let Some(pstmt) = probe.probe_node else { return };
        let Some(outer) = self.stmt_list(pstmt) else { return };
        let children = probe.children.clone();

        let NodeKind::Conditional { cond, then_expr, else_expr } = self.tree.kind(copy).clone()
        else {
            return;
        };
        let ops = [cond, then_expr, else_expr];
        let orig_ops: [NodeId; 3] = match self.tree.kind(ptarget).clone() {
            NodeKind::Conditional { cond, then_expr, else_expr } => [cond, then_expr, else_expr],
            _ => return,
        };
        let exact: Vec<Option<ProbeId>> = orig_ops
            .iter()
            .map(|o| children.iter().copied().find(|c| forest.get(*c).target == *o))
            .collect();
        let names: Vec<String> = ops
            .iter()
            .enumerate()
            .map(|(i, &op_node)| match exact[i] {
                Some(c) => forest.get(c).name.clone(),
                None => self.aux_name(self.tree.span(op_node).start),
            })
            .collect();

        // condition capture, unconditional
        let tyc = self.probe_type(ops[0], Type::Primitive(Prim::Boolean));
        let nm = self.tree.name(&names[0]);
        self.tree.replace(ops[0], nm);
        let frag = self.tree.frag(&names[0], Some(ops[0]));
        let decl0 =
            self.tree.add(NodeKind::VarDeclStmt { is_final: false, ty: tyc, frags: vec![frag] });
        self.tree.insert_before(outer.owner, outer.slot, pstmt, decl0);

        // zero-valued placeholders for both branches
        let mut branch_stmts = Vec::new();
        for (i, &op_node) in ops.iter().enumerate().skip(1) {
            let ty = self.probe_type(op_node, Type::object());
            let nm = self.tree.name(&names[i]);
            self.tree.replace(op_node, nm);
            let dflt = default_literal(&mut self.tree, &ty);
            let decl = self.tree.var_decl(ty, &names[i], Some(dflt));
            self.tree.insert_before(outer.owner, outer.slot, pstmt, decl);
            let lhs = self.tree.name(&names[i]);
            let asg = self.tree.assign(lhs, op_node);
            branch_stmts.push(self.tree.expr_stmt(asg));
        }

        let gcond = self.tree.name(&names[0]);
        let then_block = self.tree.block(vec![branch_stmts[0]]);
        let else_block = self.tree.block(vec![branch_stmts[1]]);
        let guard = self.tree.if_stmt(gcond, then_block, Some(else_block));
        self.tree.insert_before(outer.owner, outer.slot, pstmt, guard);

        let op_stmts = [decl0, branch_stmts[0], branch_stmts[1]];
        for c in children {
            let ctarget = forest.get(c).target;
            if let Some(i) = orig_ops.iter().position(|o| *o == ctarget) {
                let probe = forest.get_mut(c);
                probe.probe_node = Some(op_stmts[i]);
                probe.target_in_probe = Some(ops[i]);
                self.inject_probe_tree(forest, c);
            } else {
                let Some(i) = orig_ops.iter().position(|o| {
                    TreePath::between(&self.tree, ctarget, *o).is_some()
                }) else {
                    continue;
                };
                let Some(path) = TreePath::between(&self.tree, ctarget, orig_ops[i]) else {
                    continue;
                };
                let Some(occ) = path.resolve(&self.tree, ops[i]) else { continue };
                let stmt = op_stmts[i];
                let Some(list) = self.stmt_list(stmt) else { continue };
                if self.materialize(forest, c, occ, list, ProbeLocation::before(stmt), None) {
                    self.inject_probe_tree(forest, c);
                }
            }
        }
    }

    /// Children inside a closure body run when the closure runs, so their
    /// captures go inside the copied body. Expression bodies first become a
    /// block with a single return.
    fn handle_lambda(&mut self, forest: &mut ProbeForest, pid: ProbeId) {
        let probe = forest.get(pid);
        let ptarget = probe.target;
        let Some(copy) = probe.target_in_probe else { return };
        let children = probe.children.clone();
        let NodeKind::Lambda { body, .. } = self.tree.kind(copy).clone() else { return };

        if self.tree.kind(body).is_expression() {
            let ret = self.tree.add(NodeKind::Return { expr: Some(body) });
            let block = self.tree.block(vec![ret]);
            self.tree.set_child(copy, Slot::Body, block);
            let list = ListRef { owner: block, slot: Slot::Statements };
            for c in children {
                let ctarget = forest.get(c).target;
                let Some(path) = TreePath::between(&self.tree, ctarget, ptarget) else { continue };
                let Some(occ) = path.slice_from(1).resolve(&self.tree, body) else { continue };
                if self.materialize(forest, c, occ, list, ProbeLocation::before(ret), None) {
                    self.inject_probe_tree(forest, c);
                }
            }
        } else {
            for c in children {
                let ctarget = forest.get(c).target;
                let Some(path) = TreePath::between(&self.tree, ctarget, ptarget) else { continue };
                let Some(occ) = path.resolve(&self.tree, copy) else { continue };
                let Some(anchor) = self.list_statement_ancestor(occ) else { continue };
                let Some(list) = self.stmt_list(anchor) else { continue };
                if self.materialize(forest, c, occ, list, ProbeLocation::before(anchor), None) {
                    self.inject_probe_tree(forest, c);
                }
            }
        }
    }

    // ---- markers ------------------------------------------------------

    fn marker_stmt(&mut self, prefix: &str, enc: u32, value: u32) -> NodeId {
        let init = self.tree.number(&value.to_string());
        self.tree.var_decl(
            Type::Primitive(Prim::Int),
            &format!("{}{}", prefix, enc),
            Some(init),
        )
    }

    fn add_start_marker(&mut self, list: ListRef, loc: ProbeLocation, key: u32, org_end: u32) {
        if self.markers.contains_key(&key) {
            return;
        }
        let stmt = self.marker_stmt(MARKER_START, key, org_end);
        loc.insert(&mut self.tree, list, stmt);
        self.markers.insert(key, Markers { start: stmt, end: None });
    }

    /// The end marker's name encodes the original line at which source
    /// resumes after the region. A duplicate end marker for the same region
    /// is moved to the later position.
    fn add_end_marker(
        &mut self,
        list: ListRef,
        loc: ProbeLocation,
        key: u32,
        resume: u32,
        org_end: u32,
    ) {
        if let Some(existing) = self.markers.get(&key).and_then(|m| m.end) {
            self.tree.list_remove(existing);
            loc.insert(&mut self.tree, list, existing);
            return;
        }
        let stmt = self.marker_stmt(MARKER_END, resume, org_end);
        loc.insert(&mut self.tree, list, stmt);
        if let Some(m) = self.markers.get_mut(&key) {
            m.end = Some(stmt);
        } else {
            self.markers.insert(key, Markers { start: stmt, end: Some(stmt) });
        }
    }

    // ---- helpers -------------------------------------------------------

    fn aux_name(&mut self, line: u32) -> String {
        self.aux_count += 1;
        format!("aux{}_line_{}", self.aux_count, line)
    }

    /// `if (!(C)) { break; }` with `C` moved, not copied.
    fn build_break_if(&mut self, cond: NodeId) -> NodeId {
        let par = self.tree.paren(cond);
        let neg = self.tree.not(par);
        let brk = self.tree.add(NodeKind::Break);
        let then_block = self.tree.block(vec![brk]);
        self.tree.if_stmt(neg, then_block, None)
    }

    /// Wrap a single-statement body in a block if needed; returns the block.
    fn ensure_block(&mut self, owner: NodeId, slot: Slot, body: NodeId) -> NodeId {
        if matches!(self.tree.kind(body), NodeKind::Block { .. }) {
            return body;
        }
        let block = self.tree.block(vec![]);
        self.tree.set_child(owner, slot, block);
        self.tree.insert_first(block, Slot::Statements, body);
        block
    }

    /// Anchors that sit in a single `if`/loop body slot get a synthesized
    /// block around them so there is a list to insert into.
    fn ensure_list_anchor(&mut self, anchor: NodeId) -> NodeId {
        let Some((slot, None)) = self.tree.location_in_parent(anchor) else { return anchor };
        let Some(parent) = self.tree.parent(anchor) else { return anchor };
        let wrap = matches!(
            (self.tree.kind(parent), slot),
            (NodeKind::If { .. }, Slot::ThenStmt)
                | (NodeKind::If { .. }, Slot::ElseStmt)
                | (NodeKind::While { .. }, Slot::Body)
                | (NodeKind::DoWhile { .. }, Slot::Body)
                | (NodeKind::For { .. }, Slot::Body)
                | (NodeKind::ForEach { .. }, Slot::Body)
        );
        if wrap {
            let block = self.tree.block(vec![]);
            self.tree.replace(anchor, block);
            self.tree.insert_first(block, Slot::Statements, anchor);
        }
        anchor
    }

    /// The list a statement occupies, if any.
    fn stmt_list(&self, stmt: NodeId) -> Option<ListRef> {
        let parent = self.tree.parent(stmt)?;
        match self.tree.location_in_parent(stmt)? {
            (slot, Some(_)) => Some(ListRef { owner: parent, slot }),
            _ => None,
        }
    }

    /// Nearest ancestor (inclusive) that is a statement in a list slot.
    fn list_statement_ancestor(&self, id: NodeId) -> Option<NodeId> {
        let mut curr = Some(id);
        while let Some(c) = curr {
            if self.tree.kind(c).is_statement() {
                if let Some((_, Some(_))) = self.tree.location_in_parent(c) {
                    return Some(c);
                }
            }
            curr = self.tree.parent(c);
        }
        None
    }

    /// Declared type for a capture: node metadata when the parser resolved
    /// one, the declaration's type for initializer targets, else a fallback.
    fn probe_type(&self, occ: NodeId, fallback: Type) -> Type {
        if let Some(t) = self.tree.ty(occ) {
            return t.clone();
        }
        if let Some(p) = self.tree.parent(occ) {
            if matches!(self.tree.kind(p), NodeKind::VarDeclFrag { .. }) {
                if let Some(g) = self.tree.parent(p) {
                    match self.tree.kind(g) {
                        NodeKind::VarDeclStmt { ty, .. }
                        | NodeKind::VarDeclExpr { ty, .. }
                        | NodeKind::FieldDecl { ty, .. } => return ty.clone(),
                        _ => {}
                    }
                }
            }
        }
        fallback
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::printer::{assign_spans, print_unit};
    use crate::domain::select::{select, Targets};

    fn everything(_: LineSpan) -> bool {
        true
    }

    fn instrument(tree: &mut Tree, root: NodeId, targets: Targets) -> (Tree, ProbeForest) {
        assign_spans(tree, root);
        let sel = select(tree, root, &everything, &targets);
        let mut forest = sel.forest;
        let mut injector = ProbeInjector::new(tree, sel.non_init);
        injector.inject(&mut forest);
        (injector.into_tree(), forest)
    }

    #[test]
    fn plain_statement_probe_brackets_the_anchor() {
        // { int x = a + b; }
        let mut t = Tree::new();
        let a = t.name("a");
        let b = t.name("b");
        let sum = t.add(NodeKind::Infix { op: InfixOp::Plus, left: a, right: b, extended: vec![] });
        let decl = t.var_decl(Type::Primitive(Prim::Int), "x", Some(sum));
        let root = t.block(vec![decl]);
        let (out, _) = instrument(&mut t, root, Targets::AllEligible);
        let text = print_unit(&out, root).text;
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines,
            vec![
                "{",
                "    int PROBE_START_LINE_2 = 2;",
                "    Object a_line_2 = a;",
                "    Object b_line_2 = b;",
                "    int expr1_line_2 = a_line_2 + b_line_2;",
                "    int PROBE_END_LINE_2 = 2;",
                "    int x = expr1_line_2;",
                "}",
            ]
        );
    }

    #[test]
    fn empty_probe_set_leaves_the_tree_unchanged() {
        let mut t = Tree::new();
        let a = t.name("a");
        let s = t.expr_stmt(a);
        let root = t.block(vec![s]);
        assign_spans(&mut t, root);
        let before = print_unit(&t, root).text;
        let mut forest = ProbeForest::new();
        let mut injector = ProbeInjector::new(&t, HashMap::new());
        injector.inject(&mut forest);
        let after = print_unit(injector.tree(), root).text;
        assert_eq!(before, after);
        assert!(!after.contains(MARKER_START));
    }

    #[test]
    fn short_circuit_guard_defers_right_operand() {
        // { boolean r = a && b; }
        let mut t = Tree::new();
        let a = t.name("a");
        let b = t.name("b");
        let and =
            t.add(NodeKind::Infix { op: InfixOp::CondAnd, left: a, right: b, extended: vec![] });
        let decl = t.var_decl(Type::Primitive(Prim::Boolean), "r", Some(and));
        let root = t.block(vec![decl]);
        let (out, _) = instrument(&mut t, root, Targets::AllEligible);
        let text = print_unit(&out, root).text;
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines,
            vec![
                "{",
                "    int PROBE_START_LINE_2 = 2;",
                "    boolean a_line_2 = a;",
                "    boolean b_line_2 = true;",
                "    if (a_line_2) {",
                "        b_line_2 = b;",
                "    }",
                "    boolean expr1_line_2 = a_line_2 && b_line_2;",
                "    int PROBE_END_LINE_2 = 2;",
                "    boolean r = expr1_line_2;",
                "}",
            ]
        );
    }

    #[test]
    fn or_guard_is_negated_and_seeded_false() {
        let mut t = Tree::new();
        let a = t.name("a");
        let b = t.name("b");
        let or =
            t.add(NodeKind::Infix { op: InfixOp::CondOr, left: a, right: b, extended: vec![] });
        let decl = t.var_decl(Type::Primitive(Prim::Boolean), "r", Some(or));
        let root = t.block(vec![decl]);
        let (out, _) = instrument(&mut t, root, Targets::AllEligible);
        let text = print_unit(&out, root).text;
        assert!(text.contains("boolean b_line_2 = false;"), "seed should be false:\n{}", text);
        assert!(text.contains("if (!(a_line_2)) {"), "guard should be negated:\n{}", text);
    }

    #[test]
    fn chained_operands_nest_guards() {
        // { boolean r = a && b && c; }
        let mut t = Tree::new();
        let a = t.name("a");
        let b = t.name("b");
        let c = t.name("c");
        let and =
            t.add(NodeKind::Infix { op: InfixOp::CondAnd, left: a, right: b, extended: vec![c] });
        let decl = t.var_decl(Type::Primitive(Prim::Boolean), "r", Some(and));
        let root = t.block(vec![decl]);
        let (out, _) = instrument(&mut t, root, Targets::AllEligible);
        let text = print_unit(&out, root).text;
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines,
            vec![
                "{",
                "    int PROBE_START_LINE_2 = 2;",
                "    boolean a_line_2 = a;",
                "    boolean b_line_2 = true;",
                "    boolean c_line_2 = true;",
                "    if (a_line_2) {",
                "        b_line_2 = b;",
                "        if (b_line_2) {",
                "            c_line_2 = c;",
                "        }",
                "    }",
                "    boolean expr1_line_2 = a_line_2 && b_line_2 && c_line_2;",
                "    int PROBE_END_LINE_2 = 2;",
                "    boolean r = expr1_line_2;",
                "}",
            ]
        );
    }

    #[test]
    fn ternary_branches_fire_only_when_taken() {
        // { int r = c ? a : b; }
        let mut t = Tree::new();
        let c = t.name("c");
        let a = t.name("a");
        let b = t.name("b");
        t.set_ty(a, Type::Primitive(Prim::Int));
        t.set_ty(b, Type::Primitive(Prim::Int));
        let tern = t.add(NodeKind::Conditional { cond: c, then_expr: a, else_expr: b });
        let decl = t.var_decl(Type::Primitive(Prim::Int), "r", Some(tern));
        let root = t.block(vec![decl]);
        let (out, _) = instrument(&mut t, root, Targets::AllEligible);
        let text = print_unit(&out, root).text;
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines,
            vec![
                "{",
                "    int PROBE_START_LINE_2 = 2;",
                "    boolean c_line_2 = c;",
                "    int a_line_2 = 0;",
                "    int b_line_2 = 0;",
                "    if (c_line_2) {",
                "        a_line_2 = a;",
                "    }",
                "    else {",
                "        b_line_2 = b;",
                "    }",
                "    int expr1_line_2 = c_line_2 ? a_line_2 : b_line_2;",
                "    int PROBE_END_LINE_2 = 2;",
                "    int r = expr1_line_2;",
                "}",
            ]
        );
    }

    #[test]
    fn while_condition_moves_into_a_break_check() {
        // { while (a < b) { x; } }
        let mut t = Tree::new();
        let a = t.name("a");
        let b = t.name("b");
        let cmp = t.add(NodeKind::Infix { op: InfixOp::Less, left: a, right: b, extended: vec![] });
        let x = t.name("x");
        let s = t.expr_stmt(x);
        let body = t.block(vec![s]);
        let w = t.add(NodeKind::While { cond: cmp, body });
        let root = t.block(vec![w]);
        let (out, _) = instrument(&mut t, root, Targets::AllEligible);
        let text = print_unit(&out, root).text;
        assert!(text.contains("while (true) {"), "{}", text);
        assert!(text.contains("if (!(expr1_line_2)) {"), "{}", text);
        assert!(text.contains("break;"), "{}", text);
        // captures happen before the break check
        let probe_pos = text.find("Object a_line_2 = a;").unwrap();
        let check_pos = text.find("if (!(expr1_line_2))").unwrap();
        assert!(probe_pos < check_pos);
    }

    #[test]
    fn do_while_body_runs_before_any_condition_check() {
        // { do { x; } while (a); }
        let mut t = Tree::new();
        let x = t.name("x");
        let s = t.expr_stmt(x);
        let body = t.block(vec![s]);
        let a = t.name("a");
        let dw = t.add(NodeKind::DoWhile { body, cond: a });
        let root = t.block(vec![dw]);
        let (out, _) = instrument(&mut t, root, Targets::AllEligible);
        let text = print_unit(&out, root).text;
        let toggle = format!("{}4", DO_COND_TOGGLE);
        assert!(text.contains(&format!("boolean {} = false;", toggle)), "{}", text);
        assert!(text.contains(&format!("if ({}) {{", toggle)), "{}", text);
        assert!(text.contains(&format!("{} = true;", toggle)), "{}", text);
        assert!(text.contains("} while (true);"), "{}", text);
        // capture of the condition sits inside the toggle guard
        let guard_pos = text.find(&format!("if ({})", toggle)).unwrap();
        let capture_pos = text.find("a_line_4 = a").or(text.find("= a;")).unwrap();
        assert!(capture_pos > guard_pos, "{}", text);
    }

    #[test]
    fn for_condition_checks_at_the_top_of_the_body() {
        // { for (int i = 0; i < n; i++) { x; } }
        let mut t = Tree::new();
        let zero = t.number("0");
        let frag = t.frag("i", Some(zero));
        let init = t.add(NodeKind::VarDeclExpr {
            ty: Type::Primitive(Prim::Int),
            frags: vec![frag],
        });
        let i1 = t.name("i");
        t.set_ty(i1, Type::Primitive(Prim::Int));
        let n = t.name("n");
        let cmp =
            t.add(NodeKind::Infix { op: InfixOp::Less, left: i1, right: n, extended: vec![] });
        let i2 = t.name("i");
        let upd = t.add(NodeKind::Postfix {
            operand: i2,
            op: crate::domain::tree::PostfixOp::Increment,
        });
        let x = t.name("x");
        let s = t.expr_stmt(x);
        let body = t.block(vec![s]);
        let f = t.add(NodeKind::For { inits: vec![init], cond: Some(cmp), updates: vec![upd], body });
        let root = t.block(vec![f]);

        let mut by_line = HashMap::new();
        by_line.insert(2u32, vec!["i".to_string()]);
        let (out, _) = instrument(&mut t, root, Targets::Named(by_line));
        let text = print_unit(&out, root).text;
        assert!(text.contains("for (int i = 0; true; i++) {"), "{}", text);
        assert!(text.contains("int i_line_2 = i;"), "{}", text);
        assert!(text.contains("if (!(i_line_2 < n)) {"), "{}", text);
    }

    #[test]
    fn for_updater_runs_only_after_the_first_pass() {
        // { for (; a; step(i)) { x; } } relocates the updater call into the
        // toggle guard's else branch
        let mut t = Tree::new();
        let a = t.name("a");
        let i = t.name("i");
        let call = t.add(NodeKind::MethodCall { receiver: None, name: "step".into(), args: vec![i] });
        let x = t.name("x");
        let s = t.expr_stmt(x);
        let body = t.block(vec![s]);
        let f = t.add(NodeKind::For { inits: vec![], cond: Some(a), updates: vec![call], body });
        let root = t.block(vec![f]);
        let (out, _) = instrument(&mut t, root, Targets::AllEligible);
        let text = print_unit(&out, root).text;
        let toggle = format!("{}2", FOR_STMT_TOGGLE);
        assert!(text.contains(&format!("boolean {} = false;", toggle)), "{}", text);
        assert!(text.contains(&format!("if (!({})) {{", toggle)), "{}", text);
        assert!(text.contains(&format!("{} = true;", toggle)), "{}", text);
        // updater relocated out of the header
        assert!(!text.contains("; step("), "{}", text);
        assert!(text.contains("step(i_line_2);") || text.contains("step(i);"), "{}", text);
    }

    #[test]
    fn single_statement_bodies_get_a_block() {
        // { if (c) x = a; } with the body statement laid out on line 3
        let mut t = Tree::new();
        let c = t.name("c");
        let x = t.name("x");
        let a = t.name("a");
        let asg = t.assign(x, a);
        let s = t.expr_stmt(asg);
        let iff = t.if_stmt(c, s, None);
        let root = t.block(vec![iff]);
        let (out, _) = instrument(&mut t, root, Targets::AllEligible);
        let text = print_unit(&out, root).text;
        assert!(text.contains("if (c_line_2) {"), "{}", text);
        assert!(text.contains("Object a_line_3 = a;"), "{}", text);
        assert!(text.contains("x = a_line_3;"), "{}", text);
    }

    #[test]
    fn unresolvable_path_is_a_soft_skip() {
        let mut t = Tree::new();
        let a = t.name("a");
        let s = t.expr_stmt(a);
        let root = t.block(vec![s]);
        assign_spans(&mut t, root);
        let detached = t.name("ghost");
        let mut forest = ProbeForest::new();
        forest.add_root("ghost_line_9".into(), detached, ProbeLocation::before(s));
        let before = print_unit(&t, root).text;
        let mut injector = ProbeInjector::new(&t, HashMap::new());
        injector.inject(&mut forest);
        assert_eq!(print_unit(injector.tree(), root).text, before);
    }

    #[test]
    fn field_initializer_probes_become_sibling_fields() {
        // class C { private int f = a; }
        let mut t = Tree::new();
        let a = t.name("a");
        t.set_ty(a, Type::Primitive(Prim::Int));
        let frag = t.frag("f", Some(a));
        let field = t.add(NodeKind::FieldDecl {
            modifiers: vec!["private".into()],
            ty: Type::Primitive(Prim::Int),
            frags: vec![frag],
        });
        let class = t.add(NodeKind::TypeDecl { name: "C".into(), members: vec![field] });
        let root = t.add(NodeKind::Unit { types: vec![class] });
        let (out, _) = instrument(&mut t, root, Targets::AllEligible);
        let text = print_unit(&out, root).text;
        assert!(text.contains("private int a_line_2 = a;"), "{}", text);
        assert!(text.contains("private int f = a_line_2;"), "{}", text);
    }

    #[test]
    fn uninitialized_local_gets_a_default_before_capture() {
        // { int x; int y = x; }
        let mut t = Tree::new();
        let decl = t.var_decl(Type::Primitive(Prim::Int), "x", None);
        let x = t.name("x");
        let decl2 = t.var_decl(Type::Primitive(Prim::Int), "y", Some(x));
        let root = t.block(vec![decl, decl2]);
        let (out, _) = instrument(&mut t, root, Targets::AllEligible);
        let text = print_unit(&out, root).text;
        assert!(text.contains("int x = 0;"), "{}", text);
        assert!(text.contains("int x_line_3 = x;"), "{}", text);
    }

    #[test]
    fn marker_counts_stay_balanced() {
        let mut t = Tree::new();
        let a = t.name("a");
        let s1 = t.expr_stmt(a);
        let b = t.name("b");
        let c = t.name("c");
        let and =
            t.add(NodeKind::Infix { op: InfixOp::CondAnd, left: b, right: c, extended: vec![] });
        let brk = t.add(NodeKind::Break);
        let then = t.block(vec![brk]);
        let iff = t.if_stmt(and, then, None);
        let root = t.block(vec![s1, iff]);
        let (out, _) = instrument(&mut t, root, Targets::AllEligible);
        let text = print_unit(&out, root).text;
        let starts = text.matches(MARKER_START).count();
        let ends = text.matches(MARKER_END).count();
        assert_eq!(starts, ends, "{}", text);
        assert!(starts >= 2, "{}", text);
    }
}
