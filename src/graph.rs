//! Recorded transition graphs.
//!
//! A graph file describes one planning instance: its nodes (states), the
//! labeled edges between them, and the truth values of every feature atom,
//! either once for the whole instance (static features) or per node
//! (dynamic features).
//!
//! # Graph File Format (.lp)
//!
//! ```text
//! instance(I).
//! node(I,N).                      # nodes are numbered 0..n-1
//! tlabel(I,(S,D),Label).          # edge S -> D labeled with an action name
//! feature(P). f_arity(P,K). f_complexity(P,C).
//! f_static(I,P).                  # P is static in instance I
//! fval(I,(P,(A1,...)),V).         # static valuation
//! fval(I,(P,(A1,...)),N,V).       # dynamic valuation at node N
//! constant(C).
//! ```
//!
//! 0-arity atoms are written with the sentinel argument `(null,)`.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{self, Write as FmtWrite};
use std::fs;
use std::path::Path;

use log::{info, warn};

use crate::error::{Error, Result};
use crate::facts::{fact_body, records, AtomTerm, Record, Source};
use crate::types::NodeId;

/// A ground atom as written in a fact file, before it gets an index.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RawAtom {
    pub predicate: String,
    pub args: Vec<String>,
}

impl RawAtom {
    pub fn new(predicate: impl Into<String>, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        RawAtom {
            predicate: predicate.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// Normalizes the `(null,)`/`(0,)` sentinel to an empty tuple.
    fn from_term(term: &AtomTerm<'_>) -> Self {
        let args = if term.is_nullary() {
            Vec::new()
        } else {
            term.args.iter().map(|s| s.to_string()).collect()
        };
        RawAtom {
            predicate: term.predicate.to_string(),
            args,
        }
    }

    /// Renders the argument tuple the way fact files write it.
    fn args_term(&self) -> String {
        match self.args.len() {
            0 => "(null,)".to_string(),
            1 => format!("({},)", self.args[0]),
            _ => format!("({})", self.args.join(",")),
        }
    }
}

impl fmt::Display for RawAtom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.predicate, self.args.join(","))
    }
}

/// A labeled edge of the recorded graph.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Edge {
    pub src: NodeId,
    pub dst: NodeId,
    pub label: String,
}

/// One instance's transition graph, as read from its fact file.
#[derive(Debug, Clone, Default)]
pub struct Graph {
    /// File name the graph was read from (used in logs and fragments).
    pub name: String,
    pub instance: u32,
    pub num_nodes: usize,
    /// Edges in file order.
    pub edges: Vec<Edge>,
    /// Feature arities.
    pub features: BTreeMap<String, usize>,
    pub complexity: BTreeMap<String, u32>,
    /// Features declared static for this instance.
    pub static_predicates: BTreeSet<String>,
    pub constants: BTreeSet<String>,
    /// Static valuation facts in file order.
    pub static_facts: Vec<(RawAtom, bool)>,
    /// Dynamic valuation facts in file order.
    pub dynamic_facts: Vec<(RawAtom, NodeId, bool)>,
}

impl Graph {
    /// Reads a graph from a `.lp` fact file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Self::parse(&name, &content)
    }

    /// Parses a graph from the content of a fact file.
    ///
    /// Unrecognized records are logged and skipped.
    pub fn parse(name: &str, content: &str) -> Result<Self> {
        let src = Source::new(name);
        let mut graph = Graph {
            name: name.to_string(),
            ..Default::default()
        };
        let mut instance: Option<u32> = None;
        let mut nodes: BTreeSet<usize> = BTreeSet::new();
        let mut num_records = 0;

        for rec in records(content) {
            num_records += 1;
            let text = rec.text;
            if let Some(body) = fact_body(text, "instance") {
                let inst = src.number(rec, body)?;
                graph.set_instance(&src, rec, &mut instance, inst)?;
            } else if let Some(body) = fact_body(text, "node") {
                let f = src.fields(rec, body, &[2])?;
                graph.set_instance(&src, rec, &mut instance, src.number(rec, f[0])?)?;
                nodes.insert(src.number(rec, f[1])?);
            } else if let Some(body) = fact_body(text, "tlabel") {
                let f = src.fields(rec, body, &[3])?;
                graph.set_instance(&src, rec, &mut instance, src.number(rec, f[0])?)?;
                let pair = crate::facts::unwrap_parens(f[1])
                    .map(crate::facts::split_fields)
                    .filter(|p| p.len() == 2)
                    .ok_or_else(|| src.error(rec, format!("invalid edge `{}`", f[1])))?;
                graph.edges.push(Edge {
                    src: NodeId::new(src.number(rec, pair[0])?),
                    dst: NodeId::new(src.number(rec, pair[1])?),
                    label: f[2].to_string(),
                });
            } else if let Some(body) = fact_body(text, "f_static") {
                let f = src.fields(rec, body, &[2])?;
                graph.set_instance(&src, rec, &mut instance, src.number(rec, f[0])?)?;
                graph.static_predicates.insert(f[1].to_string());
            } else if let Some(body) = fact_body(text, "fval") {
                let f = src.fields(rec, body, &[3, 4])?;
                graph.set_instance(&src, rec, &mut instance, src.number(rec, f[0])?)?;
                let atom = RawAtom::from_term(&src.atom(rec, f[1])?);
                let value = bool_value(&src, rec, f[f.len() - 1])?;
                if f.len() == 3 {
                    graph.static_facts.push((atom, value));
                } else {
                    let node = NodeId::new(src.number(rec, f[2])?);
                    graph.dynamic_facts.push((atom, node, value));
                }
            } else if let Some(body) = fact_body(text, "feature") {
                // Declarations carry no information beyond `f_arity`.
                src.fields(rec, body, &[1])?;
            } else if let Some(body) = fact_body(text, "f_arity") {
                let f = src.fields(rec, body, &[2])?;
                let arity: usize = src.number(rec, f[1])?;
                match graph.features.get(f[0]) {
                    Some(&known) if known != arity => {
                        return Err(src.error(
                            rec,
                            format!("arity mismatch for `{}`: registered {}, got {}", f[0], known, arity),
                        ));
                    }
                    _ => {
                        graph.features.insert(f[0].to_string(), arity);
                    }
                }
            } else if let Some(body) = fact_body(text, "f_complexity") {
                let f = src.fields(rec, body, &[2])?;
                let complexity: u32 = src.number(rec, f[1])?;
                match graph.complexity.get(f[0]) {
                    Some(&known) if known != complexity => {
                        return Err(src.error(
                            rec,
                            format!("complexity mismatch for `{}`: registered {}, got {}", f[0], known, complexity),
                        ));
                    }
                    _ => {
                        graph.complexity.insert(f[0].to_string(), complexity);
                    }
                }
            } else if let Some(body) = fact_body(text, "constant") {
                let f = src.fields(rec, body, &[1])?;
                graph.constants.insert(f[0].to_string());
            } else {
                warn!("{}:{}: unrecognized record `{}`", name, rec.line, text);
            }
        }

        graph.instance = instance.unwrap_or_default();
        graph.num_nodes = nodes.len();
        if let Some((i, &n)) = nodes.iter().enumerate().find(|&(i, &n)| i != n) {
            return Err(Error::Format {
                file: name.to_string(),
                line: 0,
                record: format!("node({},{}).", graph.instance, n),
                reason: format!("nodes must be numbered 0..{}, node {} is missing", graph.num_nodes, i),
            });
        }
        graph.check_node_references()?;

        info!(
            "{} record(s) from {}: #nodes={}, #edges={}",
            num_records,
            name,
            graph.num_nodes,
            graph.edges.len()
        );
        Ok(graph)
    }

    fn set_instance(&self, src: &Source<'_>, rec: Record<'_>, current: &mut Option<u32>, inst: u32) -> Result<()> {
        match *current {
            Some(known) if known != inst => Err(src.error(
                rec,
                format!("file holds instance {} already, found instance {}", known, inst),
            )),
            _ => {
                *current = Some(inst);
                Ok(())
            }
        }
    }

    fn check_node_references(&self) -> Result<()> {
        let out_of_range = |node: NodeId| node.index() >= self.num_nodes;
        let bad = self
            .edges
            .iter()
            .flat_map(|e| [e.src, e.dst])
            .chain(self.dynamic_facts.iter().map(|(_, n, _)| *n))
            .find(|&n| out_of_range(n));
        match bad {
            Some(node) => Err(Error::Format {
                file: self.name.clone(),
                line: 0,
                record: format!("node {}", node),
                reason: format!("reference to undeclared node ({} nodes declared)", self.num_nodes),
            }),
            None => Ok(()),
        }
    }

    /// Iterates over all nodes.
    pub fn nodes(&self) -> impl Iterator<Item = NodeId> {
        (0..self.num_nodes).map(NodeId::new)
    }

    /// Nodes without outgoing edges.
    pub fn sink_nodes(&self) -> BTreeSet<NodeId> {
        let sources: BTreeSet<NodeId> = self.edges.iter().map(|e| e.src).collect();
        self.nodes().filter(|n| !sources.contains(n)).collect()
    }

    /// Node pairs that carry more than one label.
    ///
    /// Graphs are expected to label every (src,dst) pair at most once; the
    /// verifiers report violations but do not reject the graph.
    pub fn conflicting_labels(&self) -> Vec<(NodeId, NodeId, Vec<String>)> {
        let mut labels: BTreeMap<(NodeId, NodeId), BTreeSet<&str>> = BTreeMap::new();
        for e in &self.edges {
            labels.entry((e.src, e.dst)).or_default().insert(e.label.as_str());
        }
        labels
            .into_iter()
            .filter(|(_, ls)| ls.len() > 1)
            .map(|((s, d), ls)| (s, d, ls.into_iter().map(String::from).collect()))
            .collect()
    }

    /// Renders the graph back into its fact format.
    pub fn to_lp_string(&self) -> String {
        let inst = self.instance;
        let mut out = String::new();

        writeln!(out, "% Graph {}", self.name).unwrap();
        writeln!(out, "instance({}).", inst).unwrap();

        writeln!(out, "% Nodes").unwrap();
        for n in self.nodes() {
            writeln!(out, "node({},{}).", inst, n).unwrap();
        }

        writeln!(out, "% Transitions").unwrap();
        for e in &self.edges {
            writeln!(out, "tlabel({},({},{}),{}).", inst, e.src, e.dst, e.label).unwrap();
        }

        writeln!(out, "% Constants").unwrap();
        for c in &self.constants {
            writeln!(out, "constant({}).", c).unwrap();
        }

        writeln!(out, "% Features (predicates)").unwrap();
        for p in self.features.keys() {
            writeln!(out, "feature({}).", p).unwrap();
        }
        for (p, k) in &self.features {
            writeln!(out, "f_arity({},{}).", p, k).unwrap();
        }
        for (p, c) in &self.complexity {
            writeln!(out, "f_complexity({},{}).", p, c).unwrap();
        }
        for p in &self.static_predicates {
            writeln!(out, "f_static({},{}).", inst, p).unwrap();
        }

        writeln!(out, "% Valuations for static predicates").unwrap();
        for (atom, value) in &self.static_facts {
            writeln!(out, "fval({},({},{}),{}).", inst, atom.predicate, atom.args_term(), *value as u8).unwrap();
        }

        writeln!(out, "% Valuations for dynamic predicates").unwrap();
        for (atom, node, value) in &self.dynamic_facts {
            writeln!(
                out,
                "fval({},({},{}),{},{}).",
                inst,
                atom.predicate,
                atom.args_term(),
                node,
                *value as u8
            )
            .unwrap();
        }

        out
    }
}

fn bool_value(src: &Source<'_>, rec: Record<'_>, field: &str) -> Result<bool> {
    match field.trim() {
        "0" => Ok(false),
        "1" => Ok(true),
        other => Err(src.error(rec, format!("truth value must be 0 or 1, found `{}`", other))),
    }
}

/// Counts the `node` records of a graph file without parsing the rest.
///
/// Used to order held-out files from smallest to largest.
pub fn count_nodes<P: AsRef<Path>>(path: P) -> Result<usize> {
    let path = path.as_ref();
    let content = fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
    Ok(records(&content).filter(|r| fact_body(r.text, "node").is_some()).count())
}
