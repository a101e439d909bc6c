//! Checking a ground model against its recorded graph.
//!
//! At every node the transitions induced by the applicable ground actions
//! are compared with the recorded outgoing edges. A node verifies when
//!
//! - every applicable action lands on a known node,
//! - every simulated transition matches a recorded edge with the same label,
//! - every recorded edge is matched by some simulated transition.
//!
//! [`verify`] does this node by node after checking that the candidate's
//! predicates separate all nodes. [`verify_classes`] does it once per
//! equivalence class of nodes and attributes failures back to the concrete
//! nodes whose edges are involved.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;

use log::{debug, info, warn};

use crate::classes::EquivalenceClasses;
use crate::error::{Error, Result};
use crate::graph::Graph;
use crate::ground::GroundModel;
use crate::simulate::{transition, Projection, Transition, UnknownReason};
use crate::types::{ActionId, ClassId, NodeId};

/// Which verifier the refinement loop runs.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum VerifierKind {
    /// Node by node, with the separability check.
    Full,
    /// Once per equivalence class.
    #[default]
    EquivalenceClasses,
}

/// Why a node (or class representative) failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeReport {
    pub node: NodeId,
    pub error_transitions: Vec<(ActionId, UnknownReason)>,
    /// Simulated transitions, as (action, destination), with no matching edge.
    pub transitions_without_edge: Vec<(ActionId, NodeId)>,
    /// Recorded edges, as (label, destination), no transition reproduces.
    pub edges_without_transition: Vec<(String, NodeId)>,
}

impl NodeReport {
    fn new(node: NodeId) -> Self {
        NodeReport {
            node,
            error_transitions: Vec::new(),
            transitions_without_edge: Vec::new(),
            edges_without_transition: Vec::new(),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error_transitions.is_empty()
            && self.transitions_without_edge.is_empty()
            && self.edges_without_transition.is_empty()
    }
}

impl fmt::Display for NodeReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "node={}: err_transitions={:?}, transitions_without_edges={:?}, edges_without_transitions={:?}",
            self.node, self.error_transitions, self.transitions_without_edge, self.edges_without_transition
        )
    }
}

/// Outcome of verifying one graph.
#[derive(Debug, Clone)]
pub struct Verification {
    pub graph_name: String,
    pub instance: u32,
    pub unverified: BTreeSet<NodeId>,
    /// A pair of distinct nodes the candidate's predicates cannot tell apart.
    pub inseparable: Option<(NodeId, NodeId)>,
    /// Node pairs carrying more than one edge label.
    pub label_conflicts: Vec<(NodeId, NodeId, Vec<String>)>,
    /// Reports of the failing nodes.
    pub reports: Vec<NodeReport>,
    pub classes: EquivalenceClasses,
}

impl Verification {
    pub fn is_verified(&self) -> bool {
        self.unverified.is_empty()
    }
}

/// Runs the verifier selected by `kind`.
pub fn run(kind: VerifierKind, ground: &GroundModel, graph: &Graph) -> Result<Verification> {
    match kind {
        VerifierKind::Full => verify(ground, graph),
        VerifierKind::EquivalenceClasses => Ok(verify_classes(ground, graph)),
    }
}

fn check_labels(graph: &Graph) -> Vec<(NodeId, NodeId, Vec<String>)> {
    let conflicts = graph.conflicting_labels();
    for (src, dst, labels) in &conflicts {
        warn!(
            "Edge assumption violated in {}: edge ({},{}) has labels {:?}",
            graph.name, src, dst, labels
        );
    }
    conflicts
}

/// Node-by-node verification.
///
/// Fails with [`Error::VerificationFailed`] only if two nodes have identical
/// full valuations, which no choice of predicates can repair.
pub fn verify(ground: &GroundModel, graph: &Graph) -> Result<Verification> {
    let label_conflicts = check_labels(graph);
    let projection = Projection::new(ground);
    let classes = EquivalenceClasses::compute(&projection);

    let mut result = Verification {
        graph_name: graph.name.clone(),
        instance: graph.instance,
        unverified: BTreeSet::new(),
        inseparable: None,
        label_conflicts,
        reports: Vec::new(),
        classes,
    };

    // Separability.
    let pair = (0..result.classes.len())
        .map(|c| result.classes.members(ClassId::new(c)))
        .find(|m| m.len() > 1)
        .map(|m| (m[0], m[1]));
    if let Some((i, j)) = pair {
        warn!(
            "Nodes {} and {} in {} are equal modulo the selected predicates",
            i, j, graph.name
        );
        warn!("Projected s{}={}", i, ground.atoms.describe(projection.valuation(i)));
        warn!("Projected s{}={}", j, ground.atoms.describe(projection.valuation(j)));
        if ground.valuations[i.index()] == ground.valuations[j.index()] {
            return Err(Error::VerificationFailed {
                file: graph.name.clone(),
                first: i,
                second: j,
            });
        }
        result.inseparable = Some((i, j));
        result.unverified.extend([i, j]);
        return Ok(result);
    }

    let edges: HashSet<(&str, NodeId, NodeId)> = graph
        .edges
        .iter()
        .map(|e| (e.label.as_str(), e.src, e.dst))
        .collect();
    let mut outgoing: Vec<Vec<(&str, NodeId)>> = vec![Vec::new(); graph.num_nodes];
    for e in &graph.edges {
        outgoing[e.src.index()].push((e.label.as_str(), e.dst));
    }

    for src in graph.nodes() {
        let mut report = NodeReport::new(src);
        let mut simulated: HashSet<(&str, NodeId)> = HashSet::new();
        for &a in ground.applicable_at(src) {
            let action = ground.action(a);
            match transition(ground, &projection, src, action) {
                Transition::Known(dst) => {
                    simulated.insert((action.label.as_str(), dst));
                    if !edges.contains(&(action.label.as_str(), src, dst)) {
                        report.transitions_without_edge.push((a, dst));
                    }
                }
                Transition::Unknown(reason) => report.error_transitions.push((a, reason)),
            }
        }
        for &(label, dst) in &outgoing[src.index()] {
            if !simulated.contains(&(label, dst)) {
                report.edges_without_transition.push((label.to_string(), dst));
            }
        }

        if !report.is_ok() {
            warn!("Bad verification in {}: {}", graph.name, report);
            result.unverified.insert(src);
            result.reports.push(report);
        }
    }

    info!(
        "Verified {}: status={}, unverified_nodes={:?}",
        graph.name,
        result.is_verified(),
        result.unverified
    );
    Ok(result)
}

/// Verification over equivalence classes.
///
/// Each class representative is checked against the union of the actions
/// applicable at any member, and against the recorded edges projected onto
/// classes. Blame for a failure goes to the sources of the concrete edges
/// behind the offending projected edge, or to the representative if there
/// are none; the representative itself is always included.
pub fn verify_classes(ground: &GroundModel, graph: &Graph) -> Verification {
    let label_conflicts = check_labels(graph);
    let projection = Projection::new(ground);
    let classes = EquivalenceClasses::compute(&projection);
    debug!(
        "{}: {} node(s) in {} class(es)",
        graph.name,
        graph.num_nodes,
        classes.len()
    );

    // Projected edges, and the concrete sources behind each projected pair.
    let mut projected: HashSet<(&str, ClassId, ClassId)> = HashSet::new();
    let mut outgoing: Vec<BTreeSet<(&str, ClassId)>> = vec![BTreeSet::new(); classes.len()];
    let mut sources: HashMap<(ClassId, ClassId), BTreeSet<NodeId>> = HashMap::new();
    for e in &graph.edges {
        let (cs, cd) = (classes.class_of(e.src), classes.class_of(e.dst));
        projected.insert((e.label.as_str(), cs, cd));
        outgoing[cs.index()].insert((e.label.as_str(), cd));
        sources.entry((cs, cd)).or_default().insert(e.src);
    }

    let mut unverified = BTreeSet::new();
    let mut reports = Vec::new();

    for c in 0..classes.len() {
        let class = ClassId::new(c);
        let rep = classes.representative(class);
        let actions: BTreeSet<ActionId> = classes
            .members(class)
            .iter()
            .flat_map(|&n| ground.applicable_at(n).iter().copied())
            .collect();

        let mut report = NodeReport::new(rep);
        let mut blamed: BTreeSet<NodeId> = BTreeSet::new();
        let mut simulated: HashSet<(&str, ClassId)> = HashSet::new();

        for a in actions {
            let action = ground.action(a);
            match transition(ground, &projection, rep, action) {
                Transition::Known(dst) => {
                    let cd = classes.class_of(dst);
                    simulated.insert((action.label.as_str(), cd));
                    if !projected.contains(&(action.label.as_str(), class, cd)) {
                        warn!(
                            "Transition without matching projected edge in {}: {} at {} -> {}",
                            graph.name, action, rep, dst
                        );
                        report.transitions_without_edge.push((a, dst));
                        match sources.get(&(class, cd)) {
                            Some(srcs) => blamed.extend(srcs),
                            None => {
                                blamed.insert(rep);
                            }
                        }
                    }
                }
                Transition::Unknown(reason) => {
                    report.error_transitions.push((a, reason));
                    blamed.insert(rep);
                }
            }
        }

        for &(label, cd) in &outgoing[c] {
            if !simulated.contains(&(label, cd)) {
                warn!(
                    "Projected edge without matching transition in {}: {} at {} -> {}",
                    graph.name,
                    label,
                    rep,
                    classes.representative(cd)
                );
                report
                    .edges_without_transition
                    .push((label.to_string(), classes.representative(cd)));
                if let Some(srcs) = sources.get(&(class, cd)) {
                    blamed.extend(srcs);
                }
            }
        }

        if !report.is_ok() {
            warn!("Bad verification in {}: {}", graph.name, report);
            blamed.insert(rep);
            unverified.extend(blamed);
            reports.push(report);
        }
    }

    info!(
        "Verified {}: status={}, unverified_nodes={:?}",
        graph.name,
        unverified.is_empty(),
        unverified
    );
    Verification {
        graph_name: graph.name.clone(),
        instance: graph.instance,
        unverified,
        inseparable: None,
        label_conflicts,
        reports,
        classes,
    }
}
