// Serializable paths between tree nodes. A path is a chain of edge steps
// from an ancestor down to a descendant; resolving it against a congruent
// node (for example the copy of a probed subtree) finds the corresponding
// occurrence there.

use serde::{Deserialize, Serialize};

use crate::domain::tree::{NodeId, Slot, Tree};

/// One edge step: the slot taken in the parent plus the list index when the
/// slot is a list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
    pub slot: Slot,
    pub index: Option<usize>,
}

impl Step {
    pub fn new(slot: Slot, index: Option<usize>) -> Self {
        Step { slot, index }
    }
}

/// Ordered top (edge out of the ancestor) to bottom (edge into the target).
/// The empty path resolves to the starting node itself.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreePath {
    pub steps: Vec<Step>,
}

impl TreePath {
    pub fn new(steps: Vec<Step>) -> Self {
        TreePath { steps }
    }

    pub fn empty() -> Self {
        TreePath { steps: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn first(&self) -> Option<&Step> {
        self.steps.first()
    }

    pub fn last(&self) -> Option<&Step> {
        self.steps.last()
    }

    /// Path from `ancestor` down to `descendant`, or `None` when `ancestor`
    /// is not on the parent chain.
    pub fn between(tree: &Tree, descendant: NodeId, ancestor: NodeId) -> Option<TreePath> {
        let mut steps = Vec::new();
        let mut curr = descendant;
        while curr != ancestor {
            let (slot, index) = tree.location_in_parent(curr)?;
            steps.push(Step { slot, index });
            curr = tree.parent(curr)?;
        }
        steps.reverse();
        Some(TreePath { steps })
    }

    /// Walk the steps down from `from`. Soft miss returns `None`.
    pub fn resolve(&self, tree: &Tree, from: NodeId) -> Option<NodeId> {
        let mut curr = from;
        for step in &self.steps {
            curr = tree.edge_get(curr, step.slot, step.index)?;
        }
        Some(curr)
    }

    /// Resolve all but the last step; yields the node owning the bottom edge
    /// together with that edge.
    pub fn resolve_prefix(&self, tree: &Tree, from: NodeId) -> Option<(NodeId, Step)> {
        let last = *self.steps.last()?;
        let mut curr = from;
        for step in &self.steps[..self.steps.len() - 1] {
            curr = tree.edge_get(curr, step.slot, step.index)?;
        }
        Some((curr, last))
    }

    /// Replace the node at the bottom of this path (resolved from `from`)
    /// with `node`. Returns false on a soft miss; an empty path is a no-op.
    pub fn set_bottom(&self, tree: &mut Tree, from: NodeId, node: NodeId) -> bool {
        let Some((owner, last)) = self.resolve_prefix(tree, from) else { return self.is_empty() };
        tree.set_edge(owner, last.slot, last.index, node)
    }

    pub fn prepend(&self, step: Step) -> TreePath {
        let mut steps = Vec::with_capacity(self.steps.len() + 1);
        steps.push(step);
        steps.extend_from_slice(&self.steps);
        TreePath { steps }
    }

    pub fn concat(&self, tail: &TreePath) -> TreePath {
        let mut steps = self.steps.clone();
        steps.extend_from_slice(&tail.steps);
        TreePath { steps }
    }

    /// Drop the first `n` steps.
    pub fn slice_from(&self, n: usize) -> TreePath {
        TreePath { steps: self.steps.get(n..).unwrap_or(&[]).to_vec() }
    }

    /// Rewrite the slot of the first step, keeping its index.
    pub fn set_first_slot(&mut self, slot: Slot) {
        if let Some(step) = self.steps.first_mut() {
            step.slot = slot;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::tree::{InfixOp, NodeKind, Prim, Type};

    fn sample() -> (Tree, NodeId, NodeId, NodeId) {
        // { int x = a + b; }
        let mut t = Tree::new();
        let a = t.name("a");
        let b = t.name("b");
        let sum = t.add(NodeKind::Infix { op: InfixOp::Plus, left: a, right: b, extended: vec![] });
        let decl = t.var_decl(Type::Primitive(Prim::Int), "x", Some(sum));
        let block = t.block(vec![decl]);
        (t, block, a, sum)
    }

    #[test]
    fn between_and_resolve_round_trip() {
        let (t, block, a, _sum) = sample();
        let path = TreePath::between(&t, a, block).unwrap();
        assert_eq!(path.len(), 4);
        assert_eq!(path.resolve(&t, block), Some(a));
    }

    #[test]
    fn resolve_against_a_copy_finds_the_twin() {
        let (mut t, block, a, sum) = sample();
        let path = TreePath::between(&t, a, sum).unwrap();
        let copy = t.copy_subtree(sum);
        let twin = path.resolve(&t, copy).unwrap();
        assert_ne!(twin, a);
        assert!(matches!(t.kind(twin), NodeKind::Name { id } if id == "a"));
        let _ = block;
    }

    #[test]
    fn set_bottom_replaces_the_occurrence() {
        let (mut t, block, a, _sum) = sample();
        let path = TreePath::between(&t, a, block).unwrap();
        let repl = t.name("a_line_1");
        assert!(path.set_bottom(&mut t, block, repl));
        assert_eq!(path.resolve(&t, block), Some(repl));
    }

    #[test]
    fn missing_edge_is_a_soft_miss() {
        let (t, _block, _a, sum) = sample();
        let path = TreePath::new(vec![Step::new(Slot::Statements, Some(7))]);
        assert_eq!(path.resolve(&t, sum), None);
    }

    #[test]
    fn concat_and_slice_compose() {
        let (t, block, a, sum) = sample();
        let outer = TreePath::between(&t, sum, block).unwrap();
        let inner = TreePath::between(&t, a, sum).unwrap();
        let full = outer.concat(&inner);
        assert_eq!(full.resolve(&t, block), Some(a));
        assert_eq!(full.slice_from(outer.len()), inner);
    }
}
