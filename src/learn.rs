//! The counterexample-guided refinement loop.
//!
//! ```text
//! Solve ──model──> GroundAndVerify ──all verified──> Done
//!   ^  │                  │
//!   │  │                  └──unverified──> InjectCounterexamples ──┐
//!   │  └──no model──> ExpandSinks ─────────────────────────────────┤
//!   └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Each round the synthesizer proposes a model from the training facts in
//! the solve directory. The model is checked against the held-out graphs,
//! smallest first, stopping at the first graph with unverified nodes. Those
//! nodes are appended to the partial-training fragment and the loop goes
//! round again. If a round's unverified nodes were all injected before, the
//! loop is stalled and gives up.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{error, info, warn};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::domain::{copy_into, lp_files, PARTIAL_FILE, SOLUTION_FILE};
use crate::error::{Error, Result};
use crate::fragment::Fragment;
use crate::graph::Graph;
use crate::ground::{ground, GroundConfig};
use crate::model::LiftedModel;
use crate::solver::{SolverStats, Synthesizer, BEST_MODEL_FILE};
use crate::types::NodeId;
use crate::verify::{self, Verification, VerifierKind};

#[derive(Debug, Clone)]
pub struct LearnConfig {
    pub verifier: VerifierKind,
    pub ground: GroundConfig,
    /// Counterexamples injected per round; 0 means all of them.
    pub max_nodes_per_round: usize,
    /// Seed for shuffling counterexamples; `None` seeds from entropy.
    pub seed: Option<u64>,
    /// On "no model", inject class-mates of already injected sink nodes.
    pub expand_sinks: bool,
    /// Extra fact files passed to every solver call.
    pub include: Vec<PathBuf>,
    /// Round cap; 0 means unlimited.
    pub max_rounds: usize,
}

impl Default for LearnConfig {
    fn default() -> Self {
        Self {
            verifier: VerifierKind::default(),
            ground: GroundConfig::default(),
            max_nodes_per_round: 5,
            seed: None,
            expand_sinks: true,
            include: Vec::new(),
            max_rounds: 0,
        }
    }
}

#[derive(Debug)]
enum State {
    Solve,
    GroundAndVerify(LiftedModel),
    InjectCounterexamples(Failure),
    ExpandSinks,
    Done(LiftedModel),
}

/// The first held-out graph a model failed on.
#[derive(Debug, Clone)]
struct Failure {
    file: String,
    path: PathBuf,
    verification: Verification,
}

#[derive(Debug, Clone, Default)]
pub struct RunStats {
    pub rounds: usize,
    /// Held-out files copied into the training set.
    pub added_files: Vec<String>,
    /// Nodes injected per injection.
    pub added_nodes: Vec<usize>,
    pub solver: SolverStats,
    pub verify_time: Duration,
    pub elapsed: Duration,
}

impl fmt::Display for RunStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "#rounds={}, added_files={:?}, #added_nodes={} in {:?}, {}, verify_time={:.2}, elapsed_time={:.2}",
            self.rounds,
            self.added_files,
            self.added_nodes.iter().sum::<usize>(),
            self.added_nodes,
            self.solver,
            self.verify_time.as_secs_f64(),
            self.elapsed.as_secs_f64()
        )
    }
}

#[derive(Debug, Clone)]
pub struct Outcome {
    pub model: LiftedModel,
    pub stats: RunStats,
}

pub struct Learner<S> {
    synthesizer: S,
    config: LearnConfig,
    solve_dir: PathBuf,
    /// Files in the solve directory that are not training facts.
    exclude: Vec<String>,
    test_files: Vec<PathBuf>,
    fragment: Fragment,
    rng: StdRng,
    injected: BTreeMap<String, BTreeSet<NodeId>>,
    sinks: BTreeMap<String, BTreeSet<NodeId>>,
    last_failure: Option<Failure>,
    interrupt: Option<Arc<AtomicBool>>,
    stats: RunStats,
}

impl<S: Synthesizer> Learner<S> {
    /// Sets up a loop over `solve_dir`, which must already hold the training
    /// facts and the solver program `solver_name`.
    ///
    /// Nodes recorded in an existing fragment count as already injected.
    pub fn new(
        synthesizer: S,
        solve_dir: impl Into<PathBuf>,
        solver_name: &str,
        test_files: Vec<PathBuf>,
        config: LearnConfig,
    ) -> Result<Self> {
        let solve_dir = solve_dir.into();
        let fragment = Fragment::new(solve_dir.join(PARTIAL_FILE));
        let injected = fragment.injected()?;
        for (file, nodes) in &injected {
            info!("Restored {} injected node(s) of {}", nodes.len(), file);
        }
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Ok(Learner {
            synthesizer,
            config,
            solve_dir,
            exclude: vec![
                solver_name.to_string(),
                BEST_MODEL_FILE.to_string(),
                SOLUTION_FILE.to_string(),
            ],
            test_files,
            fragment,
            rng,
            injected,
            sinks: BTreeMap::new(),
            last_failure: None,
            interrupt: None,
            stats: RunStats::default(),
        })
    }

    /// Stops the loop between steps once `flag` is set.
    pub fn with_interrupt(mut self, flag: Arc<AtomicBool>) -> Self {
        self.interrupt = Some(flag);
        self
    }

    pub fn stats(&self) -> &RunStats {
        &self.stats
    }

    pub fn injected(&self) -> &BTreeMap<String, BTreeSet<NodeId>> {
        &self.injected
    }

    /// Runs the loop until a model verifies on every held-out graph.
    ///
    /// On success the model is written to `solution.lp`.
    pub fn run(&mut self) -> Result<Outcome> {
        let start = Instant::now();
        let result = self.drive();
        self.stats.elapsed = start.elapsed();
        self.stats.solver = self.synthesizer.stats();

        info!("{}", self.stats);
        match &result {
            Ok(_) => info!("status=OK"),
            Err(e) => error!("status=Failed: {}", e),
        }
        result.map(|model| Outcome {
            model,
            stats: self.stats.clone(),
        })
    }

    /// Checks the stored solution against the held-out graphs, without
    /// solving or injecting anything.
    ///
    /// Returns the verification of the first graph that fails, if any.
    pub fn verify_solution(&mut self) -> Result<Option<Verification>> {
        let path = self.solve_dir.join(SOLUTION_FILE);
        let model = LiftedModel::load(&path)?;
        let failure = self.check(&model)?;
        match &failure {
            Some(f) => warn!("Solution fails on {}: unverified nodes {:?}", f.file, f.verification.unverified),
            None => info!("Solution verifies on all {} held-out file(s)", self.test_files.len()),
        }
        Ok(failure.map(|f| f.verification))
    }

    fn interrupted(&self) -> bool {
        self.interrupt.as_ref().map_or(false, |f| f.load(Ordering::SeqCst))
    }

    fn drive(&mut self) -> Result<LiftedModel> {
        let mut state = State::Solve;
        loop {
            if self.interrupted() {
                return Err(Error::Interrupted);
            }
            state = match state {
                State::Solve => self.solve()?,
                State::GroundAndVerify(model) => match self.check(&model)? {
                    None => State::Done(model),
                    Some(failure) => State::InjectCounterexamples(failure),
                },
                State::InjectCounterexamples(failure) => self.inject(failure)?,
                State::ExpandSinks => self.expand_sinks()?,
                State::Done(model) => {
                    self.accept(&model)?;
                    return Ok(model);
                }
            };
        }
    }

    fn training_files(&self) -> Result<Vec<PathBuf>> {
        let exclude: Vec<&str> = self.exclude.iter().map(String::as_str).collect();
        let mut files = lp_files(&self.solve_dir, &exclude)?;
        for include in &self.config.include {
            if include.exists() {
                files.push(include.clone());
            } else {
                warn!("Include file {} doesn't exist; skipping it", include.display());
            }
        }
        Ok(files)
    }

    fn solve(&mut self) -> Result<State> {
        if self.config.max_rounds > 0 && self.stats.rounds >= self.config.max_rounds {
            return Err(Error::RoundLimit {
                rounds: self.stats.rounds,
            });
        }
        self.stats.rounds += 1;

        let files = self.training_files()?;
        info!("**** ROUND {} ****", self.stats.rounds);
        info!("Files={:?}", files.iter().map(|f| f.display().to_string()).collect::<Vec<_>>());

        let found = self.synthesizer.synthesize(&files, &self.solve_dir)?;
        Ok(match found {
            Some(model) => State::GroundAndVerify(model),
            None => State::ExpandSinks,
        })
    }

    /// Grounds and verifies `model` on each held-out graph, smallest first.
    fn check(&mut self, model: &LiftedModel) -> Result<Option<Failure>> {
        for path in self.test_files.clone() {
            let graph = Graph::load(&path)?;
            self.sinks.entry(graph.name.clone()).or_insert_with(|| {
                let sinks = graph.sink_nodes();
                info!("{}: sinks={:?}", graph.name, sinks);
                sinks
            });

            let start = Instant::now();
            let ground_model = ground(model, &graph, &self.config.ground)?;
            let verification = verify::run(self.config.verifier, &ground_model, &graph)?;
            self.stats.verify_time += start.elapsed();

            if !verification.is_verified() {
                let failure = Failure {
                    file: graph.name.clone(),
                    path,
                    verification,
                };
                self.last_failure = Some(failure.clone());
                return Ok(Some(failure));
            }
        }
        Ok(None)
    }

    fn inject(&mut self, failure: Failure) -> Result<State> {
        let injected = self.injected.entry(failure.file.clone()).or_default();
        let fresh: Vec<NodeId> = failure
            .verification
            .unverified
            .iter()
            .filter(|n| !injected.contains(*n))
            .copied()
            .collect();

        if fresh.is_empty() {
            error!(
                "Looping on {} with nodes {:?}; already injected {:?}",
                failure.file, failure.verification.unverified, injected
            );
            return Err(Error::Stalled {
                file: failure.file,
                nodes: failure.verification.unverified.into_iter().collect(),
            });
        }

        self.add_nodes(&failure, fresh)?;
        Ok(State::Solve)
    }

    /// Handles a round without model.
    ///
    /// Injected sink nodes may need their class-mates as well: a sink has no
    /// outgoing edges to constrain the synthesizer, so its mates are the only
    /// further evidence the failing graph offers.
    fn expand_sinks(&mut self) -> Result<State> {
        if !self.config.expand_sinks {
            return Err(Error::SolverUnavailable("no model found".to_string()));
        }
        let Some(failure) = self.last_failure.clone() else {
            return Err(Error::SolverUnavailable(
                "no model found for the initial training set".to_string(),
            ));
        };

        let injected = self.injected.get(&failure.file).cloned().unwrap_or_default();
        let sinks = self.sinks.get(&failure.file).cloned().unwrap_or_default();
        let classes = &failure.verification.classes;
        let mates: BTreeSet<NodeId> = injected
            .intersection(&sinks)
            .flat_map(|&sink| classes.mates(sink).iter().copied())
            .filter(|n| !injected.contains(n))
            .collect();

        if mates.is_empty() {
            return Err(Error::SolverUnavailable(format!(
                "no model found and no class-mates of injected sinks of {} left to inject",
                failure.file
            )));
        }
        info!("No model found; injecting class-mates {:?} of sink nodes of {}", mates, failure.file);
        self.add_nodes(&failure, mates.into_iter().collect())?;
        Ok(State::Solve)
    }

    fn add_nodes(&mut self, failure: &Failure, mut nodes: Vec<NodeId>) -> Result<()> {
        if !self.solve_dir.join(&failure.file).exists() {
            copy_into(&failure.path, &self.solve_dir)?;
            self.stats.added_files.push(failure.file.clone());
        }

        nodes.shuffle(&mut self.rng);
        if self.config.max_nodes_per_round > 0 {
            nodes.truncate(self.config.max_nodes_per_round);
        }
        self.fragment
            .append(&failure.file, failure.verification.instance, &nodes)?;
        self.injected
            .entry(failure.file.clone())
            .or_default()
            .extend(nodes.iter().copied());
        self.stats.added_nodes.push(nodes.len());
        Ok(())
    }

    fn accept(&self, model: &LiftedModel) -> Result<()> {
        let solution = self.solve_dir.join(SOLUTION_FILE);
        fs::write(&solution, model.to_lp_string()).map_err(|e| Error::io(&solution, e))?;
        let best = self.solve_dir.join(BEST_MODEL_FILE);
        if best.exists() {
            fs::remove_file(&best).map_err(|e| Error::io(&best, e))?;
        }
        info!("Solution written to {}", solution.display());
        Ok(())
    }

    pub fn solve_dir(&self) -> &Path {
        &self.solve_dir
    }
}
