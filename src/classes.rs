//! Equivalence classes of nodes under a projection.
//!
//! Two nodes are equivalent when their projected valuations coincide, i.e.
//! no predicate of the candidate model tells them apart. Classes are
//! numbered in order of their lowest member, which is also the class
//! representative.

use std::collections::{BTreeSet, HashMap};

use crate::bitset::BitSet;
use crate::simulate::Projection;
use crate::types::{ClassId, NodeId};

#[derive(Debug, Clone, Default)]
pub struct EquivalenceClasses {
    class_of: Vec<ClassId>,
    /// Members of each class in increasing order.
    members: Vec<Vec<NodeId>>,
}

impl EquivalenceClasses {
    /// Partitions all nodes of `projection` in one pass.
    pub fn compute(projection: &Projection) -> Self {
        let mut index: HashMap<&BitSet, ClassId> = HashMap::new();
        let mut class_of = Vec::with_capacity(projection.len());
        let mut members: Vec<Vec<NodeId>> = Vec::new();

        for i in 0..projection.len() {
            let node = NodeId::new(i);
            let class = *index.entry(projection.valuation(node)).or_insert_with(|| {
                members.push(Vec::new());
                ClassId::new(members.len() - 1)
            });
            members[class.index()].push(node);
            class_of.push(class);
        }

        EquivalenceClasses { class_of, members }
    }

    /// Number of classes.
    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn class_of(&self, node: NodeId) -> ClassId {
        self.class_of[node.index()]
    }

    pub fn members(&self, class: ClassId) -> &[NodeId] {
        &self.members[class.index()]
    }

    /// The lowest-numbered member of `class`.
    pub fn representative(&self, class: ClassId) -> NodeId {
        self.members[class.index()][0]
    }

    /// Representative of the class containing `node`.
    pub fn representative_of(&self, node: NodeId) -> NodeId {
        self.representative(self.class_of(node))
    }

    /// Representatives of all classes, in class order.
    pub fn representatives(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.members.iter().map(|m| m[0])
    }

    /// Class-mates of `node`, including itself.
    pub fn mates(&self, node: NodeId) -> &[NodeId] {
        self.members(self.class_of(node))
    }

    /// Expands a node set to the union of the classes it touches.
    pub fn closure<'a>(&self, nodes: impl IntoIterator<Item = &'a NodeId>) -> BTreeSet<NodeId> {
        let classes: BTreeSet<ClassId> = nodes.into_iter().map(|&n| self.class_of(n)).collect();
        classes.into_iter().flat_map(|c| self.members(c).iter().copied()).collect()
    }
}
