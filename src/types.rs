//! Type-safe wrappers for the dense per-instance indices.
//!
//! Ground atoms, nodes, ground actions and equivalence classes are all
//! numbered densely from zero inside one grounding round. These newtypes keep
//! the four index spaces apart, so that a node can never be used to look up
//! an atom by mistake.
use std::fmt;

/// Index of a ground atom in the per-instance atom table.
///
/// # Invariants
///
/// - Atom ids are assigned in discovery order (see [`crate::table::AtomTable`])
/// - Atom ids are only meaningful for the graph they were grounded against
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct AtomId(u32);

impl AtomId {
    pub fn new(index: usize) -> Self {
        AtomId(index as u32)
    }

    /// Returns the raw index as a `usize`.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for AtomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}", self.0)
    }
}

/// A node of a recorded transition graph.
///
/// Node ids come straight from the `node(I,N).` facts, which number the
/// nodes of an instance as `0..n`.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct NodeId(u32);

impl NodeId {
    pub fn new(index: usize) -> Self {
        NodeId(index as u32)
    }

    /// Returns the raw index as a `usize`.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Index of a ground action in a [`GroundModel`][crate::ground::GroundModel].
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct ActionId(u32);

impl ActionId {
    pub fn new(index: usize) -> Self {
        ActionId(index as u32)
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ActionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Index of an equivalence class of nodes.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct ClassId(u32);

impl ClassId {
    pub fn new(index: usize) -> Self {
        ClassId(index as u32)
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ClassId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "C{}", self.0)
    }
}

impl From<NodeId> for usize {
    fn from(node: NodeId) -> Self {
        node.index()
    }
}
