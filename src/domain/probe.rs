// Probe model. A probe names one expression occurrence to capture; probes
// form a forest (nested targets become children of the enclosing target's
// probe) held in an arena of its own.

use serde::{Deserialize, Serialize};

use crate::domain::tree::{NodeId, Slot, Tree};
use crate::domain::tree_path::TreePath;

/// Handle into a `ProbeForest`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProbeId(pub u32);

/// Where a probe statement goes: relative to an anchor statement, or at the
/// head/tail of a statement list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Before,
    After,
    First,
    Last,
}

/// A statement list inside some owner node (a block's statements, a type's
/// members, a for-loop's initializers).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListRef {
    pub owner: NodeId,
    pub slot: Slot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeLocation {
    pub anchor: Option<NodeId>,
    pub direction: Direction,
}

impl ProbeLocation {
    pub fn before(anchor: NodeId) -> Self {
        ProbeLocation { anchor: Some(anchor), direction: Direction::Before }
    }

    pub fn after(anchor: NodeId) -> Self {
        ProbeLocation { anchor: Some(anchor), direction: Direction::After }
    }

    pub fn first() -> Self {
        ProbeLocation { anchor: None, direction: Direction::First }
    }

    pub fn last() -> Self {
        ProbeLocation { anchor: None, direction: Direction::Last }
    }

    /// Insert `node` into `list` per this location. Anchored directions fall
    /// back to append when the anchor is not in the list.
    pub fn insert(&self, tree: &mut Tree, list: ListRef, node: NodeId) -> bool {
        match (self.direction, self.anchor) {
            (Direction::Before, Some(a)) => tree.insert_before(list.owner, list.slot, a, node),
            (Direction::After, Some(a)) => tree.insert_after(list.owner, list.slot, a, node),
            (Direction::First, _) => tree.insert_first(list.owner, list.slot, node),
            _ => tree.insert_last(list.owner, list.slot, node),
        }
    }
}

/// One probe. `target` is the expression occurrence in the original tree;
/// the remaining node fields are filled in during injection against the
/// working tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Probe {
    /// Synthetic variable name; also the probe's identity.
    pub name: String,
    pub target: NodeId,
    pub location: ProbeLocation,
    pub parent: Option<ProbeId>,
    pub children: Vec<ProbeId>,
    /// Path from the parent probe's target (or the anchor for roots) down to
    /// this probe's target. Recomputed lazily when absent.
    pub path: Option<TreePath>,
    /// The materialized probe statement, once injected.
    pub probe_node: Option<NodeId>,
    /// The copy of the target inside the probe statement, once injected.
    pub target_in_probe: Option<NodeId>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProbeForest {
    probes: Vec<Probe>,
    pub roots: Vec<ProbeId>,
}

impl ProbeForest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.probes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.probes.is_empty()
    }

    pub fn add_root(&mut self, name: String, target: NodeId, location: ProbeLocation) -> ProbeId {
        let id = ProbeId(self.probes.len() as u32);
        self.probes.push(Probe {
            name,
            target,
            location,
            parent: None,
            children: Vec::new(),
            path: None,
            probe_node: None,
            target_in_probe: None,
        });
        self.roots.push(id);
        id
    }

    pub fn add_child(
        &mut self,
        parent: ProbeId,
        name: String,
        target: NodeId,
        location: ProbeLocation,
    ) -> ProbeId {
        let id = ProbeId(self.probes.len() as u32);
        self.probes.push(Probe {
            name,
            target,
            location,
            parent: Some(parent),
            children: Vec::new(),
            path: None,
            probe_node: None,
            target_in_probe: None,
        });
        self.probes[parent.0 as usize].children.push(id);
        id
    }

    pub fn get(&self, id: ProbeId) -> &Probe {
        &self.probes[id.0 as usize]
    }

    pub fn get_mut(&mut self, id: ProbeId) -> &mut Probe {
        &mut self.probes[id.0 as usize]
    }

    pub fn iter(&self) -> impl Iterator<Item = (ProbeId, &Probe)> {
        self.probes.iter().enumerate().map(|(i, p)| (ProbeId(i as u32), p))
    }

    /// The stored path, or the path from this probe's natural origin: the
    /// parent probe's target for child probes, the anchor statement for
    /// roots.
    pub fn path_or_default(&self, tree: &Tree, id: ProbeId) -> Option<TreePath> {
        let probe = self.get(id);
        if let Some(path) = &probe.path {
            return Some(path.clone());
        }
        let origin = match probe.parent {
            Some(parent) => self.get(parent).target,
            None => probe.location.anchor?,
        };
        TreePath::between(tree, probe.target, origin)
    }
}
