//! # strips-learn: learning STRIPS action models from state graphs
//!
//! **`strips-learn`** learns lifted STRIPS action models from recorded
//! state-transition graphs. An external answer-set solver proposes a model
//! from a small training set; the model is then grounded and checked against
//! held-out graphs, and the nodes where it fails are fed back to the solver
//! until a model explains every held-out graph.
//!
//! ## Pipeline
//!
//! - **[`graph`]**: parses graph fact files (nodes, labelled edges, atom valuations).
//! - **[`model`]**: parses and prints lifted action models.
//! - **[`ground`]**: instantiates a lifted model over the objects of a graph.
//! - **[`simulate`]**: applies ground actions to node valuations.
//! - **[`verify`]**: checks that the ground model reproduces exactly the recorded edges.
//! - **[`solver`]**: drives the external solver and parses its answers.
//! - **[`learn`]**: the counterexample-guided refinement loop.
//!
//! ## Example
//!
//! ```rust
//! use strips_learn::graph::Graph;
//! use strips_learn::ground::{ground, GroundConfig};
//! use strips_learn::model::LiftedModel;
//! use strips_learn::verify::verify;
//!
//! let graph = Graph::parse("g.lp", "\
//! node(1,0). node(1,1).
//! tlabel(1,(0,1),drop).
//! f_static(1,verum). fval(1,(verum,(a,)),1).
//! fval(1,(holding,(a,)),0,1).
//! fval(1,(holding,(a,)),1,0).
//! ").unwrap();
//! let model = LiftedModel::parse("model.lp", "\
//! pred(holding).
//! a_arity(drop,1).
//! prec(drop,(holding,(1,)),1).
//! eff(drop,(holding,(1,)),0).
//! ").unwrap();
//!
//! let ground_model = ground(&model, &graph, &GroundConfig::default()).unwrap();
//! assert!(verify(&ground_model, &graph).unwrap().is_verified());
//! ```

pub mod bitset;
pub mod classes;
pub mod domain;
pub mod error;
pub mod facts;
pub mod fragment;
pub mod graph;
pub mod ground;
pub mod learn;
pub mod model;
pub mod simulate;
pub mod solver;
pub mod table;
pub mod types;
pub mod verify;

pub use error::{Error, Result};
