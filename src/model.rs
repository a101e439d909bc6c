//! Lifted action models.
//!
//! A lifted model is what the solver returns: a set of selected predicates,
//! a set of constants, and action schemas whose preconditions and effects
//! are atom patterns over the schema's parameters.
//!
//! # Model File Format (.lp)
//!
//! ```text
//! pred(P).
//! constant(C).
//! a_arity(Action,K).
//! prec(Action,(P,(T1,...)),V).    # V in {0,1}
//! eff(Action,(P,(T1,...)),V).
//! ```
//!
//! A pattern argument `1..=K` refers to the schema parameter at that
//! position; any other name is a fixed constant. The sentinel `(null,)`
//! denotes a 0-arity pattern.

use std::collections::BTreeSet;
use std::fmt::{self, Write as FmtWrite};
use std::fs;
use std::path::Path;

use log::{info, warn};

use crate::error::{Error, Result};
use crate::facts::{fact_body, records, AtomTerm, Record, Source};

/// A position in a lifted atom pattern.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Term {
    /// Schema parameter, 1-based.
    Param(usize),
    /// A fixed object.
    Const(String),
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Term::Param(i) => write!(f, "{}", i),
            Term::Const(c) => write!(f, "{}", c),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LiftedAtom {
    pub predicate: String,
    pub args: Vec<Term>,
}

impl fmt::Display for LiftedAtom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let args: Vec<String> = self.args.iter().map(Term::to_string).collect();
        write!(f, "{}({})", self.predicate, args.join(","))
    }
}

/// An atom pattern with the truth value it is required to have (for
/// preconditions) or is given (for effects).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Literal {
    pub atom: LiftedAtom,
    pub value: bool,
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.atom, self.value as u8)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ActionSchema {
    pub name: String,
    /// `None` until an `a_arity` fact is seen.
    pub arity: Option<usize>,
    pub preconditions: Vec<Literal>,
    pub effects: Vec<Literal>,
}

impl ActionSchema {
    /// The schema head, e.g. `move(1,2,3)`.
    pub fn head(&self) -> String {
        let params: Vec<String> = (1..=self.arity.unwrap_or(0)).map(|i| i.to_string()).collect();
        format!("{}({})", self.name, params.join(","))
    }

    /// All literals, preconditions first.
    pub fn literals(&self) -> impl Iterator<Item = &Literal> {
        self.preconditions.iter().chain(self.effects.iter())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LiftedModel {
    /// Schemas in order of first mention.
    pub actions: Vec<ActionSchema>,
    pub predicates: BTreeSet<String>,
    pub constants: BTreeSet<String>,
    /// Predicates the solver reported as static (only used for display).
    pub static_predicates: BTreeSet<String>,
}

impl LiftedModel {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        Self::parse(&path.display().to_string(), &content)
    }

    /// Parses model facts. Unrecognized records are logged and skipped.
    pub fn parse(name: &str, content: &str) -> Result<Self> {
        let src = Source::new(name);
        let mut model = LiftedModel::default();

        for rec in records(content) {
            let text = rec.text;
            if let Some(body) = fact_body(text, "a_arity") {
                let f = src.fields(rec, body, &[2])?;
                let arity = src.number(rec, f[1])?;
                model.action_mut(f[0]).arity = Some(arity);
            } else if let Some(body) = fact_body(text, "pred") {
                let f = src.fields(rec, body, &[1])?;
                model.predicates.insert(f[0].to_string());
            } else if let Some(body) = fact_body(text, "p_static") {
                let f = src.fields(rec, body, &[1])?;
                model.static_predicates.insert(f[0].to_string());
            } else if let Some(body) = fact_body(text, "prec") {
                let (action, literal) = parse_literal(&src, rec, body)?;
                model.action_mut(action).preconditions.push(literal);
            } else if let Some(body) = fact_body(text, "eff") {
                let (action, literal) = parse_literal(&src, rec, body)?;
                model.action_mut(action).effects.push(literal);
            } else if let Some(body) = fact_body(text, "constant") {
                let f = src.fields(rec, body, &[1])?;
                model.constants.insert(f[0].to_string());
            } else {
                warn!("{}:{}: unrecognized record `{}`", name, rec.line, text);
            }
        }

        info!(
            "Model {}: {} action(s), {} predicate(s), {} constant(s)",
            name,
            model.actions.len(),
            model.predicates.len(),
            model.constants.len()
        );
        Ok(model)
    }

    fn action_mut(&mut self, name: &str) -> &mut ActionSchema {
        let pos = match self.actions.iter().position(|a| a.name == name) {
            Some(pos) => pos,
            None => {
                self.actions.push(ActionSchema {
                    name: name.to_string(),
                    ..Default::default()
                });
                self.actions.len() - 1
            }
        };
        &mut self.actions[pos]
    }

    pub fn action(&self, name: &str) -> Option<&ActionSchema> {
        self.actions.iter().find(|a| a.name == name)
    }

    /// Forgets the constants, making them ordinary objects.
    pub fn strip_constants(&mut self) {
        if !self.constants.is_empty() {
            info!("Ignoring constants {:?} in model", self.constants);
            self.constants.clear();
        }
    }

    /// Renders the model as facts, in the format [`LiftedModel::parse`] reads.
    pub fn to_lp_string(&self) -> String {
        let mut out = String::new();
        for c in &self.constants {
            writeln!(out, "constant({}).", c).unwrap();
        }
        for p in &self.predicates {
            writeln!(out, "pred({}).", p).unwrap();
        }
        for a in &self.actions {
            if let Some(arity) = a.arity {
                writeln!(out, "a_arity({},{}).", a.name, arity).unwrap();
            }
            for l in &a.preconditions {
                writeln!(out, "prec({},{},{}).", a.name, literal_term(l), l.value as u8).unwrap();
            }
            for l in &a.effects {
                writeln!(out, "eff({},{},{}).", a.name, literal_term(l), l.value as u8).unwrap();
            }
        }
        out
    }
}

/// Human-readable dump, one block per schema.
impl fmt::Display for LiftedModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let join = |set: &BTreeSet<String>| set.iter().cloned().collect::<Vec<_>>().join(", ");
        writeln!(f, "{} constant(s): {}", self.constants.len(), join(&self.constants))?;
        writeln!(f, "{} predicate(s): {}", self.predicates.len(), join(&self.predicates))?;
        writeln!(
            f,
            "{} static predicate(s): {}",
            self.static_predicates.len(),
            join(&self.static_predicates)
        )?;
        for a in &self.actions {
            let (statics, precs): (Vec<&Literal>, Vec<&Literal>) = a
                .preconditions
                .iter()
                .partition(|l| self.static_predicates.contains(&l.atom.predicate));
            let render = |ls: &[&Literal]| ls.iter().map(|l| l.to_string()).collect::<Vec<_>>().join(", ");
            writeln!(f)?;
            writeln!(f, "{}:", a.head())?;
            writeln!(f, "   static: {}", render(&statics))?;
            writeln!(f, "    precs: {}", render(&precs))?;
            let effects: Vec<&Literal> = a.effects.iter().collect();
            writeln!(f, "  effects: {}", render(&effects))?;
        }
        Ok(())
    }
}

fn literal_term(l: &Literal) -> String {
    let args: Vec<String> = l.atom.args.iter().map(Term::to_string).collect();
    let args = match args.len() {
        0 => "null,".to_string(),
        1 => format!("{},", args[0]),
        _ => args.join(","),
    };
    format!("({},({}))", l.atom.predicate, args)
}

fn parse_literal<'r>(src: &Source<'_>, rec: Record<'_>, body: &'r str) -> Result<(&'r str, Literal)> {
    let f = src.fields(rec, body, &[3])?;
    let term = src.atom(rec, f[1])?;
    let atom = lift_atom(src, rec, &term)?;
    let value = match f[2].trim() {
        "0" => false,
        "1" => true,
        other => return Err(src.error(rec, format!("truth value must be 0 or 1, found `{}`", other))),
    };
    Ok((f[0], Literal { atom, value }))
}

fn lift_atom(src: &Source<'_>, rec: Record<'_>, term: &AtomTerm<'_>) -> Result<LiftedAtom> {
    let args = if term.is_nullary() {
        Vec::new()
    } else {
        term.args
            .iter()
            .map(|arg| {
                if arg.bytes().all(|b| b.is_ascii_digit()) {
                    match src.number::<usize>(rec, arg)? {
                        0 => Err(src.error(rec, "parameter 0 is only valid as the sole argument")),
                        i => Ok(Term::Param(i)),
                    }
                } else if *arg == "null" {
                    Err(src.error(rec, "`null` is only valid as the sole argument"))
                } else {
                    Ok(Term::Const(arg.to_string()))
                }
            })
            .collect::<Result<Vec<_>>>()?
    };
    Ok(LiftedAtom {
        predicate: term.predicate.to_string(),
        args,
    })
}
