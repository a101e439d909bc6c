//! Grounding of lifted models against one recorded graph.
//!
//! Grounding turns every action schema into the set of its instantiations
//! over the instance's objects, resolves each instantiated literal to a
//! ground atom id, and records at which nodes each ground action is
//! applicable. Candidates that can never fire (unobserved required
//! precondition, failing static precondition, or no applicable node) are
//! dropped right away, which keeps the tables small on large graphs.
//!
//! Everything built here lives for one verification round only.

use std::collections::BTreeSet;
use std::fmt;

use log::{debug, info, warn};

use crate::bitset::BitSet;
use crate::error::{Error, Result};
use crate::graph::{Graph, RawAtom};
use crate::model::{ActionSchema, LiftedAtom, LiftedModel, Literal, Term};
use crate::table::AtomTable;
use crate::types::{ActionId, AtomId, NodeId};

/// Knobs of the grounding step.
#[derive(Debug, Clone)]
pub struct GroundConfig {
    /// Unary predicate whose denotation is the object universe.
    pub universe_predicate: String,
    /// Instantiate schemas with tuples that repeat an object.
    pub allow_repeated_args: bool,
    /// Forget the model's constants before grounding.
    pub ignore_constants: bool,
}

impl Default for GroundConfig {
    fn default() -> Self {
        Self {
            universe_predicate: "verum".to_string(),
            allow_repeated_args: false,
            ignore_constants: false,
        }
    }
}

/// An instantiated literal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroundLiteral {
    pub atom: RawAtom,
    /// `None` if the atom never occurs in the graph.
    pub id: Option<AtomId>,
    pub value: bool,
    /// The atom's predicate is static in this instance.
    pub is_static: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroundAction {
    pub label: String,
    pub args: Vec<String>,
    pub preconditions: Vec<GroundLiteral>,
    pub effects: Vec<GroundLiteral>,
    /// Nodes where the action is applicable, in increasing order.
    pub applicable: Vec<NodeId>,
    /// False if some add effect targets an unobserved atom; such an action
    /// can fire but never lands on a known node.
    pub realizable: bool,
}

impl GroundAction {
    /// Checks the static preconditions against the instance's static valuation.
    pub fn applicable_static(&self, static_true: &BitSet) -> bool {
        self.preconditions
            .iter()
            .filter(|l| l.is_static)
            .all(|l| literal_holds(l, static_true))
    }

    /// Checks the dynamic preconditions against a node valuation.
    pub fn applicable_dynamic(&self, valuation: &BitSet) -> bool {
        self.preconditions
            .iter()
            .filter(|l| !l.is_static)
            .all(|l| literal_holds(l, valuation))
    }
}

impl fmt::Display for GroundAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.label, self.args.join(","))
    }
}

/// A required-true literal fails if absent or unobserved; a required-false
/// literal fails only if present.
fn literal_holds(literal: &GroundLiteral, valuation: &BitSet) -> bool {
    match (literal.id, literal.value) {
        (None, true) => false,
        (None, false) => true,
        (Some(id), value) => valuation.contains(id) == value,
    }
}

/// A lifted model instantiated against one graph.
#[derive(Debug, Clone)]
pub struct GroundModel {
    pub graph_name: String,
    pub instance: u32,
    pub atoms: AtomTable,
    /// Atoms whose predicate is one of the model's predicates.
    pub selected: BitSet,
    pub static_predicates: BTreeSet<String>,
    /// Statically true atoms.
    pub static_true: BitSet,
    /// Dynamic atoms true at each node (unprojected).
    pub valuations: Vec<BitSet>,
    /// Objects available as action arguments, in discovery order.
    pub objects: Vec<String>,
    pub actions: Vec<GroundAction>,
    /// Applicable actions per node.
    pub actions_at: Vec<Vec<ActionId>>,
}

impl GroundModel {
    pub fn num_nodes(&self) -> usize {
        self.valuations.len()
    }

    pub fn action(&self, id: ActionId) -> &GroundAction {
        &self.actions[id.index()]
    }

    /// Actions applicable at `node`.
    pub fn applicable_at(&self, node: NodeId) -> &[ActionId] {
        &self.actions_at[node.index()]
    }

    /// True if `atom` belongs to a predicate that is static in this instance.
    pub fn is_static(&self, atom: AtomId) -> bool {
        self.static_predicates.contains(&self.atoms.atom(atom).predicate)
    }
}

/// Instantiates `model` against `graph`.
///
/// Fails with [`Error::Grounding`] if the model mentions an undeclared
/// predicate, lacks an arity for some schema, or refers to a parameter
/// beyond a schema's arity.
pub fn ground(model: &LiftedModel, graph: &Graph, config: &GroundConfig) -> Result<GroundModel> {
    check_model(model)?;

    // Atom discovery order: static facts, then dynamic facts, in file order.
    let mut atoms = AtomTable::new();
    for (atom, _) in &graph.static_facts {
        atoms.intern(atom);
    }
    for (atom, _, _) in &graph.dynamic_facts {
        atoms.intern(atom);
    }

    let mut static_true = BitSet::new(atoms.len());
    for (atom, value) in &graph.static_facts {
        if *value {
            static_true.insert(atoms.intern(atom));
        }
    }
    let mut valuations = vec![BitSet::new(atoms.len()); graph.num_nodes];
    for (atom, node, value) in &graph.dynamic_facts {
        if *value {
            valuations[node.index()].insert(atoms.intern(atom));
        }
    }

    let stripped;
    let model = if config.ignore_constants {
        let mut m = model.clone();
        m.strip_constants();
        stripped = m;
        &stripped
    } else {
        model
    };
    let constants: BTreeSet<&str> = model.constants.iter().map(String::as_str).collect();

    let mut objects: Vec<String> = Vec::new();
    for (_, atom) in atoms.iter() {
        if atom.predicate != config.universe_predicate {
            continue;
        }
        for obj in &atom.args {
            if !constants.contains(obj.as_str()) && !objects.contains(obj) {
                objects.push(obj.clone());
            }
        }
    }
    if objects.is_empty() && atoms.iter().all(|(_, a)| a.predicate != config.universe_predicate) {
        warn!(
            "{}: no `{}` atoms, only 0-arity schemas can be grounded",
            graph.name, config.universe_predicate
        );
    }

    let selected = atoms.select(|p| model.predicates.contains(p));

    let ctx = Grounder {
        atoms: &atoms,
        static_predicates: &graph.static_predicates,
        static_true: &static_true,
        valuations: &valuations,
    };

    let mut actions = Vec::new();
    for schema in &model.actions {
        let arity = schema.arity.unwrap_or(0);
        for args in ArgTuples::new(objects.len(), arity, config.allow_repeated_args) {
            let args: Vec<String> = args.iter().map(|&i| objects[i].clone()).collect();
            if let Some(action) = ctx.instantiate(schema, args) {
                debug!("Ground action {}={}, appl={:?}", actions.len(), action, action.applicable);
                actions.push(action);
            }
        }
    }

    let mut actions_at = vec![Vec::new(); graph.num_nodes];
    for (i, action) in actions.iter().enumerate() {
        for node in &action.applicable {
            actions_at[node.index()].push(ActionId::new(i));
        }
    }

    info!(
        "Grounded {}: #nodes={}, #objects={}, #atoms={}, #actions={}",
        graph.name,
        graph.num_nodes,
        objects.len(),
        atoms.len(),
        actions.len()
    );

    Ok(GroundModel {
        graph_name: graph.name.clone(),
        instance: graph.instance,
        atoms,
        selected,
        static_predicates: graph.static_predicates.clone(),
        static_true,
        valuations,
        objects,
        actions,
        actions_at,
    })
}

fn check_model(model: &LiftedModel) -> Result<()> {
    for schema in &model.actions {
        let arity = schema
            .arity
            .ok_or_else(|| Error::Grounding(format!("action `{}` has no arity", schema.name)))?;
        for literal in schema.literals() {
            let atom = &literal.atom;
            if !model.predicates.contains(&atom.predicate) {
                return Err(Error::Grounding(format!(
                    "action `{}` refers to undeclared predicate `{}`",
                    schema.name, atom.predicate
                )));
            }
            for term in &atom.args {
                if let Term::Param(i) = term {
                    if *i > arity {
                        return Err(Error::Grounding(format!(
                            "action `{}` of arity {} refers to parameter {} in `{}`",
                            schema.name, arity, i, atom
                        )));
                    }
                }
            }
        }
    }
    Ok(())
}

struct Grounder<'a> {
    atoms: &'a AtomTable,
    static_predicates: &'a BTreeSet<String>,
    static_true: &'a BitSet,
    valuations: &'a [BitSet],
}

impl Grounder<'_> {
    fn resolve(&self, literal: &Literal, args: &[String]) -> GroundLiteral {
        let atom = substitute(&literal.atom, args);
        GroundLiteral {
            id: self.atoms.get(&atom),
            is_static: self.static_predicates.contains(&atom.predicate),
            value: literal.value,
            atom,
        }
    }

    /// Builds the ground action, or returns `None` if it is never applicable.
    fn instantiate(&self, schema: &ActionSchema, args: Vec<String>) -> Option<GroundAction> {
        let mut preconditions = Vec::with_capacity(schema.preconditions.len());
        for literal in &schema.preconditions {
            let ground = self.resolve(literal, &args);
            if ground.value && ground.id.is_none() {
                return None;
            }
            preconditions.push(ground);
        }
        let effects: Vec<GroundLiteral> = schema.effects.iter().map(|l| self.resolve(l, &args)).collect();

        let mut action = GroundAction {
            label: schema.name.clone(),
            args,
            preconditions,
            effects,
            applicable: Vec::new(),
            realizable: true,
        };
        if !action.applicable_static(self.static_true) {
            return None;
        }
        action.applicable = self
            .valuations
            .iter()
            .enumerate()
            .filter(|(_, v)| action.applicable_dynamic(v))
            .map(|(i, _)| NodeId::new(i))
            .collect();
        if action.applicable.is_empty() {
            return None;
        }

        for effect in &action.effects {
            if effect.id.is_none() {
                if effect.value {
                    warn!("{}: add effect on unobserved atom {}", action, effect.atom);
                    action.realizable = false;
                } else {
                    debug!("{}: delete effect on unobserved atom {}", action, effect.atom);
                }
            }
        }
        Some(action)
    }
}

fn substitute(atom: &LiftedAtom, args: &[String]) -> RawAtom {
    RawAtom {
        predicate: atom.predicate.clone(),
        args: atom
            .args
            .iter()
            .map(|t| match t {
                Term::Param(i) => args[i - 1].clone(),
                Term::Const(c) => c.clone(),
            })
            .collect(),
    }
}

/// Lexicographic enumeration of index tuples over `0..n`.
struct ArgTuples {
    n: usize,
    current: Option<Vec<usize>>,
    allow_repeats: bool,
}

impl ArgTuples {
    fn new(n: usize, arity: usize, allow_repeats: bool) -> Self {
        let current = if arity > 0 && n == 0 { None } else { Some(vec![0; arity]) };
        ArgTuples {
            n,
            current,
            allow_repeats,
        }
    }

    fn advance(&mut self) {
        let Some(tuple) = self.current.as_mut() else {
            return;
        };
        for pos in (0..tuple.len()).rev() {
            tuple[pos] += 1;
            if tuple[pos] < self.n {
                return;
            }
            tuple[pos] = 0;
        }
        self.current = None;
    }

    fn has_repeats(tuple: &[usize]) -> bool {
        tuple.iter().enumerate().any(|(i, x)| tuple[..i].contains(x))
    }
}

impl Iterator for ArgTuples {
    type Item = Vec<usize>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let tuple = self.current.clone()?;
            self.advance();
            if self.allow_repeats || !Self::has_repeats(&tuple) {
                return Some(tuple);
            }
        }
    }
}
