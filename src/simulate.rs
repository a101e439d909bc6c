//! Transition simulation.
//!
//! Nodes are compared by their *projected* valuation: the true atoms whose
//! predicate belongs to the candidate model. A [`Projection`] holds those
//! valuations for every node together with the reverse lookup from a
//! projected valuation back to the lowest-numbered node carrying it.

use std::collections::HashMap;
use std::fmt;

use log::debug;

use crate::bitset::BitSet;
use crate::ground::{GroundAction, GroundModel};
use crate::graph::RawAtom;
use crate::types::NodeId;

/// Projected node valuations and their reverse index.
#[derive(Debug, Clone)]
pub struct Projection {
    valuations: Vec<BitSet>,
    lookup: HashMap<BitSet, NodeId>,
}

impl Projection {
    pub fn new(ground: &GroundModel) -> Self {
        let valuations: Vec<BitSet> = ground
            .valuations
            .iter()
            .map(|v| v.intersection(&ground.selected))
            .collect();
        let mut lookup = HashMap::with_capacity(valuations.len());
        for (i, v) in valuations.iter().enumerate() {
            lookup.entry(v.clone()).or_insert(NodeId::new(i));
        }
        Projection { valuations, lookup }
    }

    pub fn len(&self) -> usize {
        self.valuations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.valuations.is_empty()
    }

    pub fn valuation(&self, node: NodeId) -> &BitSet {
        &self.valuations[node.index()]
    }

    /// The lowest-numbered node with the given projected valuation.
    pub fn node_of(&self, valuation: &BitSet) -> Option<NodeId> {
        self.lookup.get(valuation).copied()
    }

    /// Number of distinct projected valuations.
    pub fn num_distinct(&self) -> usize {
        self.lookup.len()
    }
}

/// Why a simulated transition has no destination node.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum UnknownReason {
    /// An add effect targets an atom never observed in the graph.
    UnobservedAtom(RawAtom),
    /// An effect contradicts the static valuation.
    StaticViolation(RawAtom),
    /// The resulting valuation belongs to no node.
    OutsideGraph,
}

impl fmt::Display for UnknownReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnknownReason::UnobservedAtom(a) => write!(f, "add of unobserved atom {}", a),
            UnknownReason::StaticViolation(a) => write!(f, "change of static atom {}", a),
            UnknownReason::OutsideGraph => write!(f, "destination outside the graph"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    Known(NodeId),
    Unknown(UnknownReason),
}

/// Applies `action` at `src` and maps the result back to a node.
///
/// Effects are applied in order to a copy of the source's projected
/// valuation. The source is not required to satisfy the action's
/// preconditions; callers only simulate applicable actions.
pub fn transition(ground: &GroundModel, projection: &Projection, src: NodeId, action: &GroundAction) -> Transition {
    let mut dst = projection.valuation(src).clone();

    for effect in &action.effects {
        let Some(id) = effect.id else {
            if effect.value {
                debug!("{} at {}: add of unobserved atom {}", action, src, effect.atom);
                return Transition::Unknown(UnknownReason::UnobservedAtom(effect.atom.clone()));
            }
            debug!("{} at {}: delete of unobserved atom {} ignored", action, src, effect.atom);
            continue;
        };

        if effect.is_static {
            let holds = ground.static_true.contains(id);
            if holds != effect.value {
                debug!("{} at {}: static atom {} cannot change", action, src, effect.atom);
                return Transition::Unknown(UnknownReason::StaticViolation(effect.atom.clone()));
            }
        } else if effect.value {
            dst.insert(id);
        } else {
            dst.remove(id);
        }
    }

    match projection.node_of(&dst) {
        Some(node) => Transition::Known(node),
        None => Transition::Unknown(UnknownReason::OutsideGraph),
    }
}
