// Line reconciliation. Injection brackets every probe region with a pair of
// int declarations whose names and initializers encode original lines; this
// module scans the instrumented tree for those pairs and builds a table that
// maps instrumented lines back to original lines.

use std::collections::BTreeMap;

use anyhow::{bail, Result};

use serde::{Deserialize, Serialize};

use crate::domain::inject::{MARKER_END, MARKER_START};
use crate::domain::printer::Printed;
use crate::domain::tree::{NodeId, NodeKind, Tree};

/// One injected region mapped back to the original line it probes.
///
/// The start marker's name encodes the original start line and its
/// initializer the original end line; the end marker's name encodes the
/// original line at which source resumes after the region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProbeRange {
    /// Instrumented line of the start marker.
    pub start_line: u32,
    /// Instrumented line following the end marker.
    pub end_line: u32,
    pub org_line_start: u32,
    pub org_line_end: u32,
    /// Instrumented end of the statement the region was injected for.
    pub probed_line_end: u32,
    /// Shift applied to instrumented lines after the region.
    pub offset: i64,
}

impl ProbeRange {
    pub fn contains(&self, line: u32) -> bool {
        self.start_line <= line && line < self.end_line
    }

    /// Height difference between the original region and the probed
    /// statement after injection.
    pub fn diff(&self) -> i64 {
        (self.org_line_end as i64 - self.org_line_start as i64)
            - (self.probed_line_end as i64 - self.end_line as i64)
    }
}

/// Ordered, non-overlapping ranges keyed by instrumented start line,
/// queried by floor lookup.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(from = "Vec<ProbeRange>", into = "Vec<ProbeRange>")]
pub struct LineMatcher {
    ranges: BTreeMap<u32, ProbeRange>,
}

impl From<Vec<ProbeRange>> for LineMatcher {
    fn from(ranges: Vec<ProbeRange>) -> Self {
        LineMatcher { ranges: ranges.into_iter().map(|r| (r.start_line, r)).collect() }
    }
}

impl From<LineMatcher> for Vec<ProbeRange> {
    fn from(m: LineMatcher) -> Self {
        m.ranges.into_values().collect()
    }
}

impl LineMatcher {
    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    pub fn ranges(&self) -> impl Iterator<Item = &ProbeRange> {
        self.ranges.values()
    }

    /// Map an instrumented line back to the original line it came from.
    ///
    /// Inside a region every line answers the region's original start line,
    /// since the whole bracket captures one original statement. Past the
    /// region the governing range's offset shifts the line back, with a
    /// correction while still inside a probed statement whose height
    /// changed.
    pub fn original_line(&self, line: u32) -> u32 {
        let Some(r) = self.ranges.range(..=line).next_back().map(|(_, r)| r) else {
            return line;
        };
        if r.contains(line) {
            return r.org_line_start;
        }
        let diff = r.diff();
        if line <= r.probed_line_end && diff != 0 {
            let n = r.org_line_start as i64 + line as i64 - (r.end_line as i64 + 1);
            return n.max(1) as u32;
        }
        (line as i64 - r.offset).max(1) as u32
    }
}

/// Scan an instrumented tree for marker pairs and build the line table.
/// Markers pair up by position: a start marker opens a region and the next
/// unmatched end marker closes it.
pub fn compute_line_mapping(tree: &Tree, root: NodeId, printed: &Printed) -> Result<LineMatcher> {
    let mut open: Vec<(u32, u32, u32)> = Vec::new();
    let mut ranges = BTreeMap::new();
    for id in tree.preorder(root) {
        let Some((name, value)) = marker_parts(tree, id) else { continue };
        if let Some(enc) = name.strip_prefix(MARKER_START) {
            let Ok(org_start) = enc.parse::<u32>() else { continue };
            open.push((printed.span(id).start, org_start, value));
        } else if let Some(enc) = name.strip_prefix(MARKER_END) {
            let Ok(resume) = enc.parse::<u32>() else { continue };
            let Some((start_line, org_start, org_end)) = open.pop() else {
                bail!(
                    "end marker {} at line {} has no matching start",
                    name,
                    printed.span(id).start
                );
            };
            let end_line = printed.span(id).start + 1;
            let probed_end = following_end(tree, printed, id, org_start).unwrap_or(end_line);
            let mut offset = end_line as i64 - resume as i64;
            let diff = (org_end as i64 - org_start as i64)
                - (probed_end as i64 - end_line as i64);
            if diff != 0 {
                offset -= diff;
            }
            ranges.insert(
                start_line,
                ProbeRange {
                    start_line,
                    end_line,
                    org_line_start: org_start,
                    org_line_end: org_end,
                    probed_line_end: probed_end,
                    offset,
                },
            );
        }
    }
    if let Some((line, _, _)) = open.pop() {
        bail!("start marker at line {} has no matching end", line);
    }
    Ok(LineMatcher { ranges })
}

/// Marker statements are single-fragment int declarations initialized with a
/// number literal; anything else is ordinary code.
fn marker_parts(tree: &Tree, id: NodeId) -> Option<(&str, u32)> {
    let NodeKind::VarDeclStmt { frags, .. } = tree.kind(id) else { return None };
    let [frag] = frags.as_slice() else { return None };
    let NodeKind::VarDeclFrag { name, init } = tree.kind(*frag) else { return None };
    if !name.starts_with(MARKER_START) && !name.starts_with(MARKER_END) {
        return None;
    }
    let NodeKind::NumberLit { token } = tree.kind((*init)?) else { return None };
    Some((name.as_str(), token.parse().ok()?))
}

/// Printed end of the statement a region was injected for, found as the node
/// following the end marker in its statement list. A follower that is not the
/// region's own statement carries no height information for it; toggle
/// regions in particular sit directly before the loop they guard, and the
/// loop's growth is accounted for by its own regions.
fn following_end(tree: &Tree, printed: &Printed, id: NodeId, org_start: u32) -> Option<u32> {
    let parent = tree.parent(id)?;
    let (slot, idx) = tree.location_in_parent(id)?;
    let list = tree.list(parent, slot)?;
    let next = *list.get(idx? + 1)?;
    if tree.span(next).start != org_start {
        return None;
    }
    let span = printed.span(next);
    if span.is_none() {
        None
    } else {
        Some(span.end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::inject::ProbeInjector;
    use crate::domain::printer::{assign_spans, print_unit};
    use crate::domain::select::{select, Targets};
    use crate::domain::tree::{InfixOp, Prim, Type};

    fn everything(_: crate::domain::tree::LineSpan) -> bool {
        true
    }

    fn instrument(tree: &mut Tree, root: NodeId) -> Tree {
        assign_spans(tree, root);
        let sel = select(tree, root, &everything, &Targets::AllEligible);
        let mut forest = sel.forest;
        let mut injector = ProbeInjector::new(tree, sel.non_init);
        injector.inject(&mut forest);
        injector.into_tree()
    }

    #[test]
    fn statement_region_maps_back_to_its_line() {
        // { int x = a + b; }
        let mut t = Tree::new();
        let a = t.name("a");
        let b = t.name("b");
        let sum = t.add(NodeKind::Infix { op: InfixOp::Plus, left: a, right: b, extended: vec![] });
        let decl = t.var_decl(Type::Primitive(Prim::Int), "x", Some(sum));
        let root = t.block(vec![decl]);

        let out = instrument(&mut t, root);
        let printed = print_unit(&out, root);
        let matcher = compute_line_mapping(&out, root, &printed).unwrap();
        assert_eq!(matcher.len(), 1);

        assert_eq!(matcher.original_line(1), 1, "opening brace is untouched");
        for line in 2..=6 {
            assert_eq!(matcher.original_line(line), 2, "region line {}", line);
        }
        assert_eq!(matcher.original_line(7), 2, "rewritten declaration");
        assert_eq!(matcher.original_line(8), 3, "closing brace shifts back");
    }

    #[test]
    fn loop_condition_lines_map_to_the_loop_header() {
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

        let out = instrument(&mut t, root);
        let printed = print_unit(&out, root);
        let matcher = compute_line_mapping(&out, root, &printed).unwrap();
        assert_eq!(matcher.len(), 2);

        assert_eq!(matcher.original_line(2), 2, "loop header");
        for line in 3..=10 {
            assert_eq!(matcher.original_line(line), 2, "condition region line {}", line);
        }
        for line in 11..=14 {
            assert_eq!(matcher.original_line(line), 3, "body region line {}", line);
        }
        assert_eq!(matcher.original_line(15), 4, "body close");
        assert_eq!(matcher.original_line(16), 5, "unit close");
    }

    #[test]
    fn do_while_header_keeps_its_line_past_the_toggle_region() {
        // { do { x; } while (a); }
        let mut t = Tree::new();
        let x = t.name("x");
        let s = t.expr_stmt(x);
        let body = t.block(vec![s]);
        let a = t.name("a");
        let dw = t.add(NodeKind::DoWhile { body, cond: a });
        let root = t.block(vec![dw]);

        let out = instrument(&mut t, root);
        let printed = print_unit(&out, root);
        let matcher = compute_line_mapping(&out, root, &printed).unwrap();
        assert_eq!(matcher.len(), 3);

        // the toggle declaration region sits before the loop; the `do`
        // header right after it must still answer its original line
        assert_eq!(matcher.original_line(1), 1);
        assert_eq!(matcher.original_line(5), 2, "do header");
        for line in 7..=12 {
            assert_eq!(matcher.original_line(line), 4, "condition region line {}", line);
        }
        for line in 15..=18 {
            assert_eq!(matcher.original_line(line), 3, "body region line {}", line);
        }
        assert_eq!(matcher.original_line(19), 4, "loop close");
        assert_eq!(matcher.original_line(20), 5, "unit close");
    }

    #[test]
    fn for_toggle_region_leaves_the_header_line_intact() {
        // { for (; a; step(i)) { x; } }
        let mut t = Tree::new();
        let a = t.name("a");
        let i = t.name("i");
        let call =
            t.add(NodeKind::MethodCall { receiver: None, name: "step".into(), args: vec![i] });
        let x = t.name("x");
        let s = t.expr_stmt(x);
        let body = t.block(vec![s]);
        let f = t.add(NodeKind::For { inits: vec![], cond: Some(a), updates: vec![call], body });
        let root = t.block(vec![f]);

        let out = instrument(&mut t, root);
        let printed = print_unit(&out, root);
        let matcher = compute_line_mapping(&out, root, &printed).unwrap();
        assert_eq!(matcher.len(), 3);

        assert_eq!(matcher.original_line(5), 2, "for header");
        // condition and relocated updater share the header's merged region
        for line in 6..=15 {
            assert_eq!(matcher.original_line(line), 2, "header region line {}", line);
        }
        assert_eq!(matcher.original_line(24), 4, "body close");
        assert_eq!(matcher.original_line(25), 5, "unit close");
    }

    #[test]
    fn short_circuit_region_maps_to_its_statement_line() {
        // { boolean r = a && b; }
        let mut t = Tree::new();
        let a = t.name("a");
        let b = t.name("b");
        let and =
            t.add(NodeKind::Infix { op: InfixOp::CondAnd, left: a, right: b, extended: vec![] });
        let decl = t.var_decl(Type::Primitive(Prim::Boolean), "r", Some(and));
        let root = t.block(vec![decl]);

        let out = instrument(&mut t, root);
        let printed = print_unit(&out, root);
        let matcher = compute_line_mapping(&out, root, &printed).unwrap();
        assert_eq!(matcher.len(), 1);

        for line in 2..=10 {
            assert_eq!(matcher.original_line(line), 2, "guarded region line {}", line);
        }
        assert_eq!(matcher.original_line(11), 3, "closing brace");
    }

    #[test]
    fn ternary_region_maps_to_its_statement_line() {
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

        let out = instrument(&mut t, root);
        let printed = print_unit(&out, root);
        let matcher = compute_line_mapping(&out, root, &printed).unwrap();
        assert_eq!(matcher.len(), 1);

        for line in 2..=14 {
            assert_eq!(matcher.original_line(line), 2, "branch region line {}", line);
        }
        assert_eq!(matcher.original_line(15), 3, "closing brace");
    }

    #[test]
    fn lambda_capture_keeps_the_assignment_line() {
        // { f = () -> a; }
        let mut t = Tree::new();
        let a = t.name("a");
        let lam = t.add(NodeKind::Lambda { params: vec![], body: a });
        let f = t.name("f");
        let asg = t.assign(f, lam);
        let s = t.expr_stmt(asg);
        let root = t.block(vec![s]);

        let out = instrument(&mut t, root);
        let printed = print_unit(&out, root);
        let matcher = compute_line_mapping(&out, root, &printed).unwrap();
        assert_eq!(matcher.len(), 1);

        for line in 2..=5 {
            assert_eq!(matcher.original_line(line), 2, "closure region line {}", line);
        }
        assert_eq!(matcher.original_line(6), 3, "closing brace");
    }

    #[test]
    fn serialized_table_answers_identically() {
        let mut t = Tree::new();
        let a = t.name("a");
        let b = t.name("b");
        let cmp = t.add(NodeKind::Infix { op: InfixOp::Less, left: a, right: b, extended: vec![] });
        let x = t.name("x");
        let s = t.expr_stmt(x);
        let body = t.block(vec![s]);
        let w = t.add(NodeKind::While { cond: cmp, body });
        let root = t.block(vec![w]);

        let out = instrument(&mut t, root);
        let printed = print_unit(&out, root);
        let matcher = compute_line_mapping(&out, root, &printed).unwrap();

        let json = serde_json::to_string(&matcher).unwrap();
        let back: LineMatcher = serde_json::from_str(&json).unwrap();
        assert_eq!(back.len(), matcher.len());
        for line in 1..=20 {
            assert_eq!(back.original_line(line), matcher.original_line(line), "line {}", line);
        }
    }

    #[test]
    fn stray_end_marker_is_an_error() {
        let mut t = Tree::new();
        let init = t.number("4");
        let marker = t.var_decl(
            Type::Primitive(Prim::Int),
            &format!("{}4", MARKER_END),
            Some(init),
        );
        let root = t.block(vec![marker]);
        let printed = print_unit(&t, root);
        let err = compute_line_mapping(&t, root, &printed).unwrap_err();
        assert!(err.to_string().contains("no matching start"), "{}", err);
    }

    #[test]
    fn lines_outside_any_range_pass_through() {
        let matcher = LineMatcher::default();
        assert_eq!(matcher.original_line(1), 1);
        assert_eq!(matcher.original_line(42), 42);
    }
}
